use glam::Vec2;

/// Mouse payload. `uv` is normalized to `[0,1]x[0,1]` over the overlay,
/// `button` is the device-reported button code.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MouseData {
    pub uv: Vec2,
    pub button: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerData {
    pub device: u32,
    pub button: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchPadData {
    pub device: u32,
    pub finger_down: bool,
    pub first: Vec2,
    pub raw: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollData {
    pub delta: Vec2,
    pub viewport_scale: f32,
}

/// A pending compositor event for one overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayEvent {
    MouseMove(MouseData),
    MouseButtonDown(MouseData),
    MouseButtonUp(MouseData),
    OverlayShown,
    Quit,
    ButtonPress(ControllerData),
    ButtonTouch(ControllerData),
    ButtonUnpress(ControllerData),
    ButtonUntouch(ControllerData),
    TouchPadMove(TouchPadData),
    Scroll(ScrollData),
    /// Any event kind without a handler; dropped on dispatch.
    Other(u32),
}
