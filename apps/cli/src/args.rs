use std::env;
use std::path::PathBuf;

use quota_core::Partition;

#[derive(Debug)]
pub enum Command {
    /// Self-check: quota standing for one account.
    QuotaCheck {
        account: Option<String>,
        partition: Option<Partition>,
    },
    /// Cron entry point: evaluate every account and deliver notifications.
    MonitorAdmin {
        dry_run: bool,
        data_dir: Option<PathBuf>,
    },
    /// Periodic utilization and wait-time report.
    ReportAdmin {
        data_dir: Option<PathBuf>,
        use_cached_data: bool,
    },
    /// Spool per-day dashboard metrics.
    Dashboard {
        rewrite_history_up_to_days: u32,
        data_dir: Option<PathBuf>,
    },
}

pub fn parse_args() -> Result<Command, String> {
    let mut args = env::args().skip(1);
    let Some(subcommand) = args.next() else {
        return Err("missing subcommand".to_string());
    };

    match subcommand.as_str() {
        "cp-quota-check" => {
            let mut account = None;
            let mut partition = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--account" => account = Some(required_value(&mut args, "--account")?),
                    "--partition" => {
                        let value = required_value(&mut args, "--partition")?;
                        partition = Some(
                            Partition::parse(&value)
                                .ok_or_else(|| format!("unknown partition: {value}"))?,
                        );
                    }
                    other => return unknown(other),
                }
            }
            Ok(Command::QuotaCheck { account, partition })
        }
        "cp-monitor-admin" => {
            let mut dry_run = false;
            let mut data_dir = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--dry-run" => dry_run = true,
                    "--data-dir" => {
                        data_dir = Some(PathBuf::from(required_value(&mut args, "--data-dir")?));
                    }
                    other => return unknown(other),
                }
            }
            Ok(Command::MonitorAdmin { dry_run, data_dir })
        }
        // monthly-report is the historical name for the same report.
        "cp-quota-report-admin" | "monthly-report" => {
            let mut data_dir = None;
            let mut use_cached_data = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--use-cached-data" => use_cached_data = true,
                    "--data-dir" => {
                        data_dir = Some(PathBuf::from(required_value(&mut args, "--data-dir")?));
                    }
                    other => return unknown(other),
                }
            }
            Ok(Command::ReportAdmin {
                data_dir,
                use_cached_data,
            })
        }
        "wandb-dashboard" => {
            let mut rewrite_history_up_to_days = 0u32;
            let mut data_dir = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--rewrite-history-up-to-days" => {
                        let value = required_value(&mut args, "--rewrite-history-up-to-days")?;
                        rewrite_history_up_to_days = value
                            .parse::<u32>()
                            .map_err(|_| format!("invalid day count: {value}"))?;
                    }
                    "--data-dir" => {
                        data_dir = Some(PathBuf::from(required_value(&mut args, "--data-dir")?));
                    }
                    other => return unknown(other),
                }
            }
            Ok(Command::Dashboard {
                rewrite_history_up_to_days,
                data_dir,
            })
        }
        "--help" | "-h" | "help" => {
            print_help();
            std::process::exit(0);
        }
        other => Err(format!("unknown subcommand: {other}")),
    }
}

fn required_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("missing value for {flag}"))
}

fn unknown(arg: &str) -> Result<Command, String> {
    match arg {
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        other => Err(format!("unknown argument: {other}")),
    }
}

pub fn print_help() {
    println!(
        "PLI GPU quota tracker\n\n\
Usage:\n  pli-quota <subcommand> [options]\n\n\
Subcommands:\n  \
cp-quota-check [--account <name>] [--partition <name>]\n      \
Show quota standing for an account (defaults to $USER).\n  \
cp-monitor-admin [--dry-run] [--data-dir <dir>]\n      \
Evaluate all accounts and deliver due notifications.\n  \
cp-quota-report-admin [--use-cached-data] [--data-dir <dir>]\n      \
Print the utilization and wait-time report (alias: monthly-report).\n  \
wandb-dashboard [--rewrite-history-up-to-days <n>] [--data-dir <dir>]\n      \
Spool per-day dashboard metrics.\n\n\
Options:\n  -h, --help     Show this help message\n"
    );
}
