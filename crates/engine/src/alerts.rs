// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The alert pipeline: a single consumer drains the alert queue, filters
//! by level, appends to the hourly alert log, and mails recipients.
//!
//! Mail goes through the [`Mailer`] seam; production pipes an HTML
//! message to `sendmail -t`, tests inject a recording fake. SMTP errors
//! are logged and never stop the loop.

use crate::logs::HourlyLog;
use chrono::Local;
use ics_core::alert::{Alert, AlertLevel};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Runtime alert configuration, shared between the handler, the RPC
/// surface, and the config persister.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub level: AlertLevel,
    pub recipients: Vec<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            level: AlertLevel::NotSet,
            recipients: Vec::new(),
        }
    }
}

impl AlertSettings {
    pub fn set_level(&mut self, level: AlertLevel) {
        info!(from = %self.level, to = %level, "alert level changed");
        self.level = level;
    }

    pub fn add_recipient(&mut self, recipient: String) {
        info!(recipient = %recipient, "adding mail recipient");
        self.recipients.push(recipient);
    }

    pub fn remove_recipient(&mut self, recipient: &str) -> bool {
        let before = self.recipients.len();
        self.recipients.retain(|existing| existing != recipient);
        self.recipients.len() != before
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sendmail exited with {0}")]
    Failed(i32),
}

/// Delivery seam for alert mail.
pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Pipes an HTML message to the local sendmail binary. The SMTP
/// submission itself stays outside the engine.
pub struct SendmailMailer {
    sendmail: PathBuf,
    sender: String,
}

impl SendmailMailer {
    pub fn new() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        Self {
            sendmail: PathBuf::from("/usr/sbin/sendmail"),
            sender: format!("ics@{}", host),
        }
    }
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailer for SendmailMailer {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let mut child = Command::new(&self.sendmail)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(stdin) = child.stdin.as_mut() {
            write!(
                stdin,
                "To: {}\r\nFrom: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
                 Content-Type: text/html; charset=utf-8\r\n\r\n{}\r\n",
                recipient, self.sender, subject, body
            )?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(MailError::Failed(status.code().unwrap_or(-1)));
        }
        Ok(())
    }
}

/// Recording mailer for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct FakeMailer {
    pub sent: Arc<Mutex<Vec<(String, String, String)>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl Mailer for FakeMailer {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent.lock().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

/// Built-in mail template, overridable by `$ICS_HOME/etc/alert.html`.
const DEFAULT_TEMPLATE: &str = r#"<html>
<body>
<h2>ICS Alert</h2>
<p>{message}</p>
<table>
<tr><td>Cluster</td><td>{system_name}</td></tr>
<tr><td>Node</td><td>{host_name}</td></tr>
<tr><td>Group</td><td>{group_name}</td></tr>
<tr><td>Resource</td><td>{resource_name}</td></tr>
<tr><td>Time</td><td>{event_time}</td></tr>
</table>
</body>
</html>
"#;

/// Format the alert timestamp for the log line and the mail template.
fn format_time(epoch_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%m/%d/%Y %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}

/// One alert log line:
/// `MM/DD/YYYY HH:MM:SS LEVEL CLUSTER GROUP RESOURCE "msg"`.
pub fn format_alert(alert: &Alert) -> String {
    format!(
        "{} {} {} {} {} \"{}\"",
        format_time(alert.epoch_ms),
        alert.level,
        alert.cluster_name,
        alert.group_name,
        alert.resource_name,
        alert.message
    )
}

/// Fill the mail template placeholders.
pub fn render_template(template: &str, alert: &Alert) -> String {
    template
        .replace("{message}", &alert.message)
        .replace("{system_name}", &alert.cluster_name)
        .replace("{host_name}", &alert.node_name)
        .replace("{group_name}", &alert.group_name)
        .replace("{resource_name}", &alert.resource_name)
        .replace("{event_time}", &format_time(alert.epoch_ms))
}

/// Single-consumer alert loop.
pub struct AlertHandler {
    rx: mpsc::UnboundedReceiver<Alert>,
    settings: Arc<Mutex<AlertSettings>>,
    log: HourlyLog,
    template: String,
    mailer: Box<dyn Mailer>,
}

impl AlertHandler {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Alert>,
        settings: Arc<Mutex<AlertSettings>>,
        log_dir: &Path,
        template_path: Option<&Path>,
        mailer: Box<dyn Mailer>,
    ) -> Self {
        let template = template_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        Self {
            rx,
            settings,
            log: HourlyLog::new(log_dir, "alerts.log"),
            template,
            mailer,
        }
    }

    pub async fn run(mut self) {
        while let Some(alert) = self.rx.recv().await {
            self.handle(&alert);
        }
    }

    /// Filter, log, and mail one alert.
    pub fn handle(&self, alert: &Alert) {
        let (threshold, recipients) = {
            let settings = self.settings.lock();
            (settings.level, settings.recipients.clone())
        };
        if alert.level < threshold {
            return;
        }

        if let Err(err) = self.log.append_line(&format_alert(alert)) {
            error!(error = %err, "unable to write alert log");
        }

        if recipients.is_empty() {
            warn!("alert recipient list is empty, no alerts sent");
            return;
        }
        for recipient in &recipients {
            let subject = format!("ICS {} Alert - {}", alert.level, alert.resource_name);
            let body = render_template(&self.template, alert);
            if let Err(err) = self.mailer.send(recipient, &subject, &body) {
                error!(recipient = %recipient, error = %err, "unable to send mail");
            }
        }
    }
}

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;
