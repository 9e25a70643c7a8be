//! User-facing notices (toasts). Rendering is the UI's business; the client only
//! decides when a notice is due and with which message.

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Default notifier: notices only reach the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => info!(target: "panel_client::notice", "{}", message),
            NoticeLevel::Warning | NoticeLevel::Error => warn!(target: "panel_client::notice", level = ?level, "{}", message),
        }
    }
}

/// Forwards notices over a channel to whatever renders them.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        // receiver gone means nobody is rendering; nothing to do
        let _ = self.tx.send(Notice { level, message: message.to_string() });
    }
}
