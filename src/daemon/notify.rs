use notify_rust::{Notification, Timeout};
use tracing::{error, info, warn};

use super::focus::state::{WarningNotice, WARNING_TITLE};

/// Delivers break reminders to the user. Dispatching is fire-and-forget: the focus loop never waits
/// for the user to see the reminder.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send {
    fn dispatch_warning(&mut self, notice: &WarningNotice);
}

/// Only writes reminders to the log. Used when desktop notifications are unavailable.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn dispatch_warning(&mut self, notice: &WarningNotice) {
        warn!("{WARNING_TITLE}: {}", notice.message);
    }
}

/// Shows reminders through the desktop notification service.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl NotificationSink for DesktopNotifier {
    fn dispatch_warning(&mut self, notice: &WarningNotice) {
        let mut notification = Notification::new();
        notification
            .summary(WARNING_TITLE)
            .body(&notice.message)
            .appname(&self.app_name);
        // A full screen reminder stays until the user dismisses it.
        if notice.full_screen {
            notification.timeout(Timeout::Never);
            #[cfg(all(unix, not(target_os = "macos")))]
            notification.urgency(notify_rust::Urgency::Critical);
        }

        let minutes = notice.minutes;
        // Showing a notification may block on the notification service.
        tokio::task::spawn_blocking(move || match notification.show() {
            Ok(_) => info!("Shown break reminder after {minutes} minutes"),
            Err(e) => error!("Failed to show break reminder {e:?}"),
        });
    }
}
