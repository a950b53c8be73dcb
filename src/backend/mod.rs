use serde::Deserialize;
use thiserror::Error;

use crate::{
    graphics::TextureId,
    notifications::{NotificationBitmap, NotificationId, NotificationStyle, NotificationType},
    overlays::OverlayHandle,
};

use self::event::OverlayEvent;

pub mod event;
pub mod headless;
#[cfg(feature = "openvr")]
pub mod openvr;
pub mod queue;

/// How the process presents itself to the VR runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Other,
    Scene,
    #[default]
    Overlay,
    Background,
    Utility,
}

/// Runtime subsystems brought up by `Compositor::init`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum Subsystem {
    Runtime,
    Compositor,
    Overlay,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to initialize {subsystem}: {reason}")]
    Init { subsystem: Subsystem, reason: String },
    #[error("unknown overlay {0}")]
    UnknownOverlay(OverlayHandle),
    #[error("notification error: {0}")]
    Notification(String),
    #[error("Fatal: {0:?}")]
    Fatal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureApi {
    #[default]
    OpenGl,
    Vulkan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Auto,
    Gamma,
    Linear,
}

/// What the compositor is told to display on an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTexture {
    pub texture: TextureId,
    pub api: TextureApi,
    pub color_space: ColorSpace,
}

impl OverlayTexture {
    pub const fn gl(texture: TextureId) -> Self {
        Self {
            texture,
            api: TextureApi::OpenGl,
            color_space: ColorSpace::Auto,
        }
    }
}

/// Everything a notification popup is created from.
#[derive(Debug, Clone)]
pub struct NotificationRequest<'a> {
    pub id: NotificationId,
    pub overlay: OverlayHandle,
    pub kind: NotificationType,
    pub style: NotificationStyle,
    pub message: &'a str,
    pub icon: Option<&'a NotificationBitmap>,
}

/// The VR compositor as seen by this crate.
///
/// Calls arrive from the poll thread and from whichever thread repaints a
/// surface, so implementations synchronize internally.
pub trait Compositor: Send + Sync {
    /// Brings up runtime, compositor and overlay subsystems in that order.
    fn init(&self, app_type: ApplicationType) -> Result<(), BackendError>;

    fn create_overlay(
        &self,
        handle: OverlayHandle,
        key: &str,
        name: &str,
    ) -> Result<(), BackendError>;
    fn destroy_overlay(&self, handle: OverlayHandle) -> Result<(), BackendError>;
    fn set_overlay_width(&self, handle: OverlayHandle, width: f32) -> Result<(), BackendError>;
    fn set_overlay_texture(
        &self,
        handle: OverlayHandle,
        texture: &OverlayTexture,
    ) -> Result<(), BackendError>;
    fn clear_overlay_texture(&self, handle: OverlayHandle) -> Result<(), BackendError>;

    fn poll_next_event(&self, handle: OverlayHandle) -> Option<OverlayEvent>;
    /// Returns true if `device` now drives this overlay as a mouse.
    fn handle_controller_interaction_as_mouse(&self, handle: OverlayHandle, device: u32) -> bool;

    /// Returns the id the compositor assigned to the popup.
    fn create_notification(
        &self,
        request: &NotificationRequest<'_>,
    ) -> Result<NotificationId, BackendError>;
    fn remove_notification(&self, id: NotificationId) -> Result<(), BackendError>;
}
