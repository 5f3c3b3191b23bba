use std::io::Write;
use std::process::{Command, Stdio};

use quota_core::{Notification, NotificationKind, QuotaStatus};

use crate::error::{AppError, Result};

/// A rendered notification ready for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub recipient: String,
    pub severity: QuotaStatus,
    pub subject: String,
    pub body: String,
}

/// Delivery boundary. The pipeline decides whether and what to send; the
/// notifier decides how.
pub trait Notifier {
    fn notify(&self, dispatch: &Dispatch) -> Result<()>;
}

pub fn render_dispatch(notification: &Notification) -> Dispatch {
    let partition = notification.partition.as_str();
    let subject = match notification.kind {
        NotificationKind::Escalation | NotificationKind::Reminder => format!(
            "[{}] GPU quota {}",
            partition,
            match notification.severity {
                QuotaStatus::Breach => "exceeded",
                _ => "warning",
            }
        ),
        NotificationKind::Resolved => {
            format!("[{}] GPU quota back under limit", partition)
        }
    };
    let mut body = format!(
        "Account: {}\nPartition: {}\nGPU hours used: {:.2} of {:.2} ({:.0}%)\n",
        notification.account,
        partition,
        notification.gpu_hours_used,
        notification.quota_gpu_hours,
        notification.usage_fraction * 100.0,
    );
    match notification.kind {
        NotificationKind::Escalation if notification.severity == QuotaStatus::Breach => {
            body.push_str("You have exceeded your GPU-hour quota for this partition.\n");
        }
        NotificationKind::Escalation | NotificationKind::Reminder => {
            body.push_str("You are approaching your GPU-hour quota for this partition.\n");
        }
        NotificationKind::Resolved => {
            body.push_str("Your usage has dropped back under the quota. No action needed.\n");
        }
    }
    Dispatch {
        recipient: notification.account.clone(),
        severity: notification.severity,
        subject,
        body,
    }
}

/// Pipes the message to a sendmail-style command; recipient and subject are
/// appended as trailing arguments.
pub struct CommandNotifier {
    command: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, dispatch: &Dispatch) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(AppError::InvalidInput("empty notifier command".to_string()));
        };
        let mut child = Command::new(program)
            .args(args)
            .arg(&dispatch.recipient)
            .arg(&dispatch.subject)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|err| AppError::Message(format!("spawn notifier {}: {}", program, err)))?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(dispatch.body.as_bytes())?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(AppError::Message(format!(
                "notifier {} exited with {}",
                program, status
            )));
        }
        Ok(())
    }
}

/// Prints instead of delivering; the dry-run mode.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, dispatch: &Dispatch) -> Result<()> {
        println!(
            "--- {} -> {} ---\n{}\n{}",
            dispatch.severity.as_str(),
            dispatch.recipient,
            dispatch.subject,
            dispatch.body
        );
        Ok(())
    }
}
