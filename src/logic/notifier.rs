//! Outbound alert seam.
//!
//! The engine only decides *whether* an alert fires; presentation (tray
//! balloons, toasts) belongs to the embedding layer, which plugs in its own
//! `Notifier`. The default implementation mirrors alerts to the diagnostic
//! log so the daemon is usable headless.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
}

/// Structured payload handed to the embedding layer.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Notification {
    pub fn new(severity: Severity, title: &str, body: String) -> Self {
        Notification {
            severity,
            title: title.to_string(),
            body,
            process: None,
            pid: None,
        }
    }

    pub fn for_process(mut self, name: &str, pid: u32) -> Self {
        self.process = Some(name.to_string());
        self.pid = Some(pid);
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Fallback notifier: emits the alert as a structured log record.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        let payload = serde_json::to_string(notification)
            .unwrap_or_else(|_| notification.title.clone());
        match notification.severity {
            Severity::Info => log::info!("[notify] {}", payload),
            Severity::Warning => log::warn!("[notify] {}", payload),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_without_empty_fields() {
        let n = Notification::new(Severity::Warning, "Test", "body".to_string());
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"title\":\"Test\""));
        assert!(!json.contains("process"));

        let n = n.for_process("x.exe", 42);
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"pid\":42"));
    }
}
