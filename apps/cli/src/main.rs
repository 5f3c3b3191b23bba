mod args;
mod config;
mod dirs;

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use quota_app::{AppConfig, AppPaths, AppState, ensure_app_data_dir};
use quota_core::{
    QuotaCheck, QuotaPeriod, UsageReport, format_duration_short, format_gpu_hours,
    format_pct_change, render_progress_bar,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let command = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let config = config::load_or_create().map_err(io::Error::other)?;
    if config.created {
        eprintln!("Created config at {}.", config.paths.file.display());
    }

    let data_dir = dirs::resolve_app_data_dir().map_err(io::Error::other)?;
    let paths = AppPaths::new(data_dir.dir.clone());
    ensure_app_data_dir(&paths)?;

    let mut app_config = AppConfig::new(&paths);
    app_config.sacct_binary = config.config.sacct_binary.clone();
    app_config.notify_command = config.config.notify_command.clone();
    app_config.monitor = config.config.monitor;
    app_config.report = config.config.report;

    match command {
        args::Command::QuotaCheck { account, partition } => {
            let state = build_state(app_config, None)?;
            let account = match account {
                Some(account) => account,
                None => std::env::var("USER")
                    .map_err(|_| io::Error::other("cannot resolve account: set --account"))?,
            };
            let check = state.services.check.run(
                state.accounting_source().as_ref(),
                &account,
                partition,
                Utc::now(),
            )?;
            print_quota_check(&check);
        }
        args::Command::MonitorAdmin { dry_run, data_dir } => {
            let state = build_state(app_config, data_dir)?;
            let stats = state.services.monitor.run(
                state.accounting_source().as_ref(),
                state.notifier(dry_run).as_ref(),
                Utc::now(),
            )?;
            println!(
                "Evaluated {} accounts over {} records: {} sent, {} failed, {} skipped.",
                stats.accounts_evaluated,
                stats.records_seen,
                stats.notifications_sent,
                stats.notifications_failed,
                stats.keys_skipped
            );
        }
        args::Command::ReportAdmin {
            data_dir,
            use_cached_data,
        } => {
            let cache_dir = match (data_dir, use_cached_data) {
                (Some(dir), _) => Some(dir),
                (None, true) => Some(paths.app_data_dir.clone()),
                (None, false) => None,
            };
            let state = build_state(app_config, cache_dir)?;
            let report = state
                .services
                .report
                .run(state.accounting_source().as_ref(), Utc::now())?;
            print_usage_report(&report);
        }
        args::Command::Dashboard {
            rewrite_history_up_to_days,
            data_dir,
        } => {
            let state = build_state(app_config, data_dir)?;
            let metrics = state.services.dashboard.run(
                state.accounting_source().as_ref(),
                &state.metrics_sink(),
                rewrite_history_up_to_days,
                Utc::now(),
            )?;
            println!(
                "Spooled {} metric records to {}.",
                metrics.len(),
                state.config.metrics_spool_path.display()
            );
        }
    }

    Ok(())
}

fn build_state(
    mut config: AppConfig,
    cached_data_dir: Option<PathBuf>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    config.data_dir = cached_data_dir;
    let state = AppState::new(config);
    state.initialize()?;
    Ok(state)
}

fn print_quota_check(check: &QuotaCheck) {
    let period = match check.quota_period {
        QuotaPeriod::RollingDays(days) => format!("rolling {days} days"),
        QuotaPeriod::CalendarMonth => "calendar month".to_string(),
    };
    println!(
        "GPU quota for {} on {} ({period})",
        check.account,
        check.partition.as_str()
    );
    if check.quota_gpu_hours <= 0.0 {
        println!(
            "  no quota configured; {} GPU-hours used this period",
            format_gpu_hours(check.used_gpu_hours)
        );
        return;
    }
    let fraction = check.used_gpu_hours / check.quota_gpu_hours;
    println!(
        "  {} {:>3.0}% used",
        render_progress_bar(fraction, 20),
        fraction * 100.0
    );
    println!(
        "  used {} of {} GPU-hours, {} remaining",
        format_gpu_hours(check.used_gpu_hours),
        format_gpu_hours(check.quota_gpu_hours),
        format_gpu_hours(check.remaining_gpu_hours)
    );
    if !check.forecast.is_empty() {
        println!("Quota freeing up:");
        for point in &check.forecast {
            println!(
                "  in {:>4}: {} GPU-hours available",
                format!("{}h", point.hours_ahead),
                format_gpu_hours(point.available_gpu_hours)
            );
        }
    }
}

fn print_usage_report(report: &UsageReport) {
    println!(
        "GPU utilization {} .. {} (vs previous 30 days)",
        report.window.start.format("%Y-%m-%d"),
        report.window.end.format("%Y-%m-%d")
    );
    println!("  {:<8} {:>10} {:>8} {:>7} {:>8}", "part", "GPU-hours", "change", "jobs", "change");
    for row in &report.utilization {
        println!(
            "  {:<8} {:>10} {:>8} {:>7} {:>8}",
            row.partition.as_str(),
            format_gpu_hours(row.gpu_hours),
            format_pct_change(row.gpu_hours, row.gpu_hours_prev),
            row.job_count,
            format_pct_change(row.job_count as f64, row.job_count_prev as f64)
        );
    }
    println!("Wait times by job size:");
    println!(
        "  {:<8} {:<6} {:>6} {:>12} {:>11}",
        "part", "size", "jobs", "median wait", "long waits"
    );
    for row in &report.waits {
        let median = row
            .median_wait_hours
            .map(format_duration_short)
            .unwrap_or_else(|| "-".to_string());
        let long = row
            .pct_long_wait
            .map(|pct| format!("{pct:.0}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<8} {:<6} {:>6} {:>12} {:>11}",
            row.partition.as_str(),
            row.size_class.as_str(),
            row.job_count,
            median,
            long
        );
    }
}
