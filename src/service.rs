use std::sync::Arc;

use serde::Serialize;

use crate::{
    notifications::{NotificationBitmap, NotificationStyle, NotificationType},
    overlays::OverlayHandle,
    registry::OverlayRegistry,
};

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = 1;

/// Reply body handed to network clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub status: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Machine name reported by `get_status`.
pub fn resolve_host(configured: Option<&str>) -> String {
    configured
        .map(str::to_owned)
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| "localhost".into())
}

/// Entry points used by whatever accepts knock requests from the network.
pub struct KnockService {
    registry: Arc<OverlayRegistry>,
    overlay: OverlayHandle,
    host: String,
    kind: NotificationType,
    style: NotificationStyle,
    icon: Option<NotificationBitmap>,
    default_message: String,
}

impl KnockService {
    pub fn new(registry: Arc<OverlayRegistry>, overlay: OverlayHandle, host: String) -> Self {
        Self {
            registry,
            overlay,
            host,
            kind: NotificationType::default(),
            style: NotificationStyle::default(),
            icon: None,
            default_message: "Knock Knock!".into(),
        }
    }

    pub fn with_notification(mut self, kind: NotificationType, style: NotificationStyle) -> Self {
        self.kind = kind;
        self.style = style;
        self
    }

    pub fn with_icon(mut self, icon: Option<NotificationBitmap>) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = message.into();
        self
    }

    pub fn get_status(&self) -> Status {
        let (status, message) = if self.registry.is_running() {
            (STATUS_OK, "Server & VR Controller Running!")
        } else {
            (STATUS_ERROR, "VR Controller not running")
        };
        Status {
            status,
            message: message.into(),
            host: Some(self.host.clone()),
        }
    }

    /// Pops up `message`, or the default message, on the knock overlay.
    pub fn trigger_knock(&self, code: &str, message: Option<&str>) -> Status {
        let message = message.unwrap_or(&self.default_message);
        log::info!("Knock received, code: {code}, message: {message}");

        match self.registry.display_notification(
            message,
            self.overlay,
            self.kind,
            self.style,
            self.icon.as_ref(),
        ) {
            Ok(_) => Status {
                status: STATUS_OK,
                message: "Notification sent!".into(),
                host: None,
            },
            Err(e) => {
                log::error!("Failed to display knock: {e}");
                Status {
                    status: STATUS_ERROR,
                    message: e.to_string(),
                    host: None,
                }
            }
        }
    }
}
