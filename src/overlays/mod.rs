use std::{fmt, sync::Arc};

use crate::backend::{
    event::{ControllerData, MouseData, OverlayEvent, ScrollData, TouchPadData},
    BackendError, Compositor,
};

pub mod notification;
pub mod surface;

/// Compositor-facing overlay identifier. Zero means "not registered".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OverlayHandle(pub u64);

impl OverlayHandle {
    pub const UNASSIGNED: Self = Self(0);

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for OverlayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OverlayKind {
    Surface,
    Notification,
}

/// Value identity of a registered item. Two items with the same key cannot
/// be registered at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverlayKey {
    pub name: Arc<str>,
    pub kind: OverlayKind,
}

pub struct OverlayState {
    pub handle: OverlayHandle,
    pub name: Arc<str>,
    pub kind: OverlayKind,
    pub width: f32, // meters
}

impl OverlayState {
    pub fn new(name: impl Into<Arc<str>>, kind: OverlayKind, width: f32) -> Self {
        Self {
            handle: OverlayHandle::UNASSIGNED,
            name: name.into(),
            kind,
            width,
        }
    }

    pub fn key(&self) -> OverlayKey {
        OverlayKey {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    pub fn compositor_key(&self) -> String {
        format!("vrknock.{}.{}", self.kind, self.name)
    }

    /// Creates the compositor-side overlay for an assigned handle.
    pub fn create(&self, compositor: &dyn Compositor) -> Result<(), BackendError> {
        let key = self.compositor_key();
        log::debug!("{}: create overlay {} with key {}", self.name, self.handle, key);
        compositor.create_overlay(self.handle, &key, &self.name)?;

        if let Err(e) = compositor.set_overlay_width(self.handle, self.width) {
            log::error!("{}: Failed to set overlay width: {}", self.name, e);
        }
        Ok(())
    }

    /// Clears the displayed texture and destroys the compositor-side overlay.
    pub fn destroy(&self, compositor: &dyn Compositor) {
        log::debug!("{}: destroy", self.name);
        if let Err(e) = compositor.clear_overlay_texture(self.handle) {
            log::error!("{}: Failed to clear overlay texture: {}", self.name, e);
        }
        if let Err(e) = compositor.destroy_overlay(self.handle) {
            log::error!("{}: Failed to destroy overlay: {}", self.name, e);
        }
    }
}

/// Handed to an overlay's init callback.
///
/// The registry lock is held while `init` runs and is not reentrant, so the
/// registry itself is not reachable from here. Overlays that need to know
/// whether they are attached keep that state themselves.
pub struct RegistryContext<'a> {
    pub compositor: &'a Arc<dyn Compositor>,
}

/// A registered item. Event handlers default to no-ops; concrete overlays
/// override the ones they care about.
pub trait Overlay: Send {
    fn state(&self) -> &OverlayState;
    fn state_mut(&mut self) -> &mut OverlayState;

    /// Called once, right after the registry assigned a handle.
    fn init(&mut self, ctx: &RegistryContext<'_>) -> anyhow::Result<()> {
        self.state().create(ctx.compositor.as_ref())?;
        Ok(())
    }

    /// Called after the compositor-side overlay was destroyed.
    fn on_destroyed(&mut self) {}

    fn on_mouse_move(&mut self, _mouse: &MouseData) {}
    fn on_mouse_button_down(&mut self, _mouse: &MouseData) {}
    fn on_mouse_button_up(&mut self, _mouse: &MouseData) {}
    fn on_overlay_shown(&mut self) {}
    fn on_quit(&mut self) {}
    fn on_button_press(&mut self, _data: &ControllerData) {}
    fn on_button_touch(&mut self, _data: &ControllerData) {}
    fn on_button_unpress(&mut self, _data: &ControllerData) {}
    fn on_button_untouch(&mut self, _data: &ControllerData) {}
    fn on_touch_pad_move(&mut self, _data: &TouchPadData) {}
    fn on_scroll(&mut self, _data: &ScrollData) {}
}

pub fn dispatch_event(overlay: &mut dyn Overlay, event: &OverlayEvent) {
    match event {
        OverlayEvent::MouseMove(m) => overlay.on_mouse_move(m),
        OverlayEvent::MouseButtonDown(m) => overlay.on_mouse_button_down(m),
        OverlayEvent::MouseButtonUp(m) => overlay.on_mouse_button_up(m),
        OverlayEvent::OverlayShown => overlay.on_overlay_shown(),
        OverlayEvent::Quit => overlay.on_quit(),
        OverlayEvent::ButtonPress(c) => overlay.on_button_press(c),
        OverlayEvent::ButtonTouch(c) => overlay.on_button_touch(c),
        OverlayEvent::ButtonUnpress(c) => overlay.on_button_unpress(c),
        OverlayEvent::ButtonUntouch(c) => overlay.on_button_untouch(c),
        OverlayEvent::TouchPadMove(t) => overlay.on_touch_pad_move(t),
        OverlayEvent::Scroll(s) => overlay.on_scroll(s),
        OverlayEvent::Other(kind) => {
            log::trace!("{}: ignoring event kind {}", overlay.state().name, kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;

    /// Records the name of every handler that fires, in order.
    struct Recorder {
        state: OverlayState,
        hits: Vec<&'static str>,
    }

    impl Overlay for Recorder {
        fn state(&self) -> &OverlayState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut OverlayState {
            &mut self.state
        }
        fn on_mouse_move(&mut self, _mouse: &MouseData) {
            self.hits.push("mouse_move");
        }
        fn on_mouse_button_down(&mut self, _mouse: &MouseData) {
            self.hits.push("mouse_button_down");
        }
        fn on_mouse_button_up(&mut self, _mouse: &MouseData) {
            self.hits.push("mouse_button_up");
        }
        fn on_overlay_shown(&mut self) {
            self.hits.push("overlay_shown");
        }
        fn on_quit(&mut self) {
            self.hits.push("quit");
        }
        fn on_button_press(&mut self, _data: &ControllerData) {
            self.hits.push("button_press");
        }
        fn on_button_touch(&mut self, _data: &ControllerData) {
            self.hits.push("button_touch");
        }
        fn on_button_unpress(&mut self, _data: &ControllerData) {
            self.hits.push("button_unpress");
        }
        fn on_button_untouch(&mut self, _data: &ControllerData) {
            self.hits.push("button_untouch");
        }
        fn on_touch_pad_move(&mut self, _data: &TouchPadData) {
            self.hits.push("touch_pad_move");
        }
        fn on_scroll(&mut self, _data: &ScrollData) {
            self.hits.push("scroll");
        }
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let mut recorder = Recorder {
            state: OverlayState::new("recorder", OverlayKind::Surface, 1.0),
            hits: Vec::new(),
        };
        let mouse = MouseData {
            uv: vec2(0.5, 0.5),
            button: 1,
        };
        let pad = ControllerData {
            device: 2,
            button: 32,
        };

        let cases = [
            (OverlayEvent::MouseMove(mouse), "mouse_move"),
            (OverlayEvent::MouseButtonDown(mouse), "mouse_button_down"),
            (OverlayEvent::MouseButtonUp(mouse), "mouse_button_up"),
            (OverlayEvent::OverlayShown, "overlay_shown"),
            (OverlayEvent::Quit, "quit"),
            (OverlayEvent::ButtonPress(pad), "button_press"),
            (OverlayEvent::ButtonTouch(pad), "button_touch"),
            (OverlayEvent::ButtonUnpress(pad), "button_unpress"),
            (OverlayEvent::ButtonUntouch(pad), "button_untouch"),
            (
                OverlayEvent::TouchPadMove(TouchPadData::default()),
                "touch_pad_move",
            ),
            (OverlayEvent::Scroll(ScrollData::default()), "scroll"),
        ];

        for (event, expected) in cases {
            recorder.hits.clear();
            dispatch_event(&mut recorder, &event);
            assert_eq!(recorder.hits, [expected], "{event:?}");
        }

        recorder.hits.clear();
        dispatch_event(&mut recorder, &OverlayEvent::Other(9999));
        assert!(recorder.hits.is_empty());
    }

    #[test]
    fn handle_zero_is_unassigned() {
        assert!(!OverlayHandle::UNASSIGNED.is_assigned());
        assert!(OverlayHandle(1).is_assigned());
        let state = OverlayState::new("x", OverlayKind::Notification, 1.0);
        assert_eq!(state.handle, OverlayHandle::UNASSIGNED);
    }

    #[test]
    fn key_includes_kind() {
        let a = OverlayState::new("same", OverlayKind::Surface, 1.0);
        let b = OverlayState::new("same", OverlayKind::Notification, 1.0);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.compositor_key(), b.compositor_key());
        assert_eq!(a.compositor_key(), "vrknock.surface.same");
    }
}
