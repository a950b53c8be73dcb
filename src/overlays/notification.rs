use std::sync::Arc;

use super::{Overlay, OverlayKind, OverlayState};

/// Overlay without content of its own. Notifications are anchored to it.
pub struct NotificationOverlay {
    state: OverlayState,
}

impl NotificationOverlay {
    pub fn new(name: impl Into<Arc<str>>, width: f32) -> Self {
        Self {
            state: OverlayState::new(name, OverlayKind::Notification, width),
        }
    }
}

impl Overlay for NotificationOverlay {
    fn state(&self) -> &OverlayState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OverlayState {
        &mut self.state
    }

    fn on_overlay_shown(&mut self) {
        log::debug!("{}: shown", self.state.name);
    }

    fn on_quit(&mut self) {
        log::info!("{}: compositor requested quit", self.state.name);
    }
}
