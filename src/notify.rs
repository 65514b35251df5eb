use std::sync::{Arc, Mutex};
use log::info;

/// Forwards a short message to the user outside of the main window. Delivery may fail silently.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that writes to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "notification", "{}", message);
    }
}

/// Logs every message and keeps the newest one for the window to show as a banner.
#[derive(Debug, Default, Clone)]
pub struct BannerNotifier {
    latest: Arc<Mutex<Option<String>>>,
}

impl BannerNotifier {
    /// The message posted since the last call, if any.
    pub fn take(&self) -> Option<String> {
        self.latest.lock().expect("Failed to lock banner").take()
    }
}

impl Notifier for BannerNotifier {
    fn notify(&self, message: &str) {
        LogNotifier.notify(message);
        *self.latest.lock().expect("Failed to lock banner") = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_keeps_the_newest_message_once() {
        let notifier = BannerNotifier::default();
        let shared = notifier.clone();
        assert_eq!(notifier.take(), None);

        shared.notify("Status normal: Baby predicted NOT AT RISK (Label 0).");
        shared.notify("Warning: Baby predicted to be AT RISK (Label 1).");

        assert_eq!(notifier.take(), Some("Warning: Baby predicted to be AT RISK (Label 1).".to_string()));
        assert_eq!(notifier.take(), None);
    }
}
