use std::{collections::HashSet, fmt, path::Path};

use anyhow::Context;
use serde::Deserialize;

use crate::{
    backend::{BackendError, Compositor, NotificationRequest},
    ids,
    overlays::OverlayHandle,
    registry::OverlayRegistry,
};

/// Identifier of an active notification popup. Lives in its own namespace,
/// separate from overlay handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub u32);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notif#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[default]
    Transient,
    Persistent,
    TransientSystemWithUserValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStyle {
    None,
    #[default]
    Application,
    ContactDisabled,
    ContactEnabled,
    ContactActive,
}

/// Icon shown next to a notification message, RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl NotificationBitmap {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("Could not load notification icon {}", path.display()))?
            .to_rgba8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            rgba: img.into_raw(),
        })
    }
}

/// Removes every tracked notification from the compositor. The caller holds
/// the registry lock.
pub(crate) fn clear_tracked(compositor: &dyn Compositor, tracked: &mut HashSet<NotificationId>) {
    for id in tracked.drain() {
        if let Err(e) = compositor.remove_notification(id) {
            log::warn!("Failed to remove notification {}: {}", id, e);
        }
    }
}

impl OverlayRegistry {
    /// Pops up `message` anchored to `overlay` and starts tracking it.
    pub fn display_notification(
        &self,
        message: &str,
        overlay: OverlayHandle,
        kind: NotificationType,
        style: NotificationStyle,
        icon: Option<&NotificationBitmap>,
    ) -> Result<NotificationId, BackendError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let tracked = &inner.notifications;
        let candidate = ids::allocate(inner.notification_ids.as_mut(), |c| {
            u32::try_from(c).map_or(true, |c| tracked.contains(&NotificationId(c)))
        });
        let id = NotificationId(u32::try_from(candidate).map_err(anyhow::Error::from)?);

        let request = NotificationRequest {
            id,
            overlay,
            kind,
            style,
            message,
            icon,
        };
        let id = self.compositor.create_notification(&request)?;
        inner.notifications.insert(id);

        log::info!("Displayed notification {} on {}: {}", id, overlay, message);
        Ok(id)
    }

    /// Removes a popup. Ids that are not tracked are ignored.
    pub fn close_notification(&self, id: NotificationId) {
        let mut inner = self.inner.lock();
        if !inner.notifications.remove(&id) {
            log::debug!("Notification {} is not active, nothing to close", id);
            return;
        }
        if let Err(e) = self.compositor.remove_notification(id) {
            log::warn!("Failed to remove notification {}: {}", id, e);
        }
        log::debug!("Closed notification {}", id);
    }

    pub fn clear_notifications(&self) {
        let mut inner = self.inner.lock();
        if !inner.notifications.is_empty() {
            log::debug!("Clearing {} notifications", inner.notifications.len());
        }
        clear_tracked(self.compositor.as_ref(), &mut inner.notifications);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        backend::{
            headless::{CompositorCall, HeadlessCompositor},
            ApplicationType,
        },
        overlays::notification::NotificationOverlay,
        registry::RegistryOptions,
    };

    fn setup() -> (Arc<OverlayRegistry>, Arc<HeadlessCompositor>, OverlayHandle) {
        let headless = Arc::new(HeadlessCompositor::new());
        let registry = Arc::new(OverlayRegistry::new(
            headless.clone(),
            RegistryOptions::default(),
        ));
        headless.init(ApplicationType::Overlay).unwrap();
        let handle = registry
            .register(Box::new(NotificationOverlay::new("knock", 1.0)))
            .unwrap();
        (registry, headless, handle)
    }

    fn display(registry: &OverlayRegistry, handle: OverlayHandle, msg: &str) -> NotificationId {
        registry
            .display_notification(
                msg,
                handle,
                NotificationType::Transient,
                NotificationStyle::Application,
                None,
            )
            .unwrap()
    }

    #[test]
    fn display_then_close_removes_exactly_once() {
        let (registry, headless, handle) = setup();

        let id = display(&registry, handle, "Knock Knock!");
        assert_ne!(id.0, 0);
        assert_eq!(registry.notification_ids(), vec![id]);
        assert_eq!(headless.notifications(), vec![(id, "Knock Knock!".into())]);

        registry.close_notification(id);
        assert!(registry.notification_ids().is_empty());
        assert_eq!(headless.removals_of(id), 1);

        // a second close is a no-op and does not reach the compositor
        registry.close_notification(id);
        assert_eq!(headless.removals_of(id), 1);
    }

    #[test]
    fn close_of_unknown_id_is_soft() {
        let (registry, headless, _) = setup();
        registry.close_notification(NotificationId(12345));
        assert_eq!(
            headless.count_calls(|c| matches!(c, CompositorCall::RemoveNotification(_))),
            0
        );
    }

    #[test]
    fn clear_removes_every_tracked_id() {
        let (registry, headless, handle) = setup();
        let removals =
            || headless.count_calls(|c| matches!(c, CompositorCall::RemoveNotification(_)));

        registry.clear_notifications();
        assert!(registry.notification_ids().is_empty());
        assert_eq!(removals(), 0);

        let ids: HashSet<_> = (0..5)
            .map(|i| display(&registry, handle, &format!("msg {i}")))
            .collect();
        assert_eq!(ids.len(), 5);

        registry.clear_notifications();
        assert!(registry.notification_ids().is_empty());
        assert_eq!(removals(), 5);
        for id in ids {
            assert_eq!(headless.removals_of(id), 1);
        }
    }

    #[test]
    fn failed_display_is_not_tracked() {
        let (registry, _headless, _) = setup();
        let err = registry.display_notification(
            "nobody home",
            OverlayHandle(0xdead),
            NotificationType::Persistent,
            NotificationStyle::None,
            None,
        );
        assert!(matches!(err, Err(BackendError::UnknownOverlay(_))));
        assert!(registry.notification_ids().is_empty());
    }

    #[test]
    fn icon_is_passed_through() {
        let (registry, headless, handle) = setup();
        let icon = NotificationBitmap {
            width: 1,
            height: 1,
            rgba: vec![255, 0, 0, 255],
        };
        registry
            .display_notification(
                "with icon",
                handle,
                NotificationType::Transient,
                NotificationStyle::ContactActive,
                Some(&icon),
            )
            .unwrap();
        assert_eq!(
            headless.count_calls(|c| matches!(
                c,
                CompositorCall::CreateNotification {
                    with_icon: true,
                    ..
                }
            )),
            1
        );
    }
}
