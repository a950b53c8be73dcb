use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use strum::IntoEnumIterator;

use crate::{notifications::NotificationId, overlays::OverlayHandle};

use super::{
    event::OverlayEvent, queue::EventQueues, ApplicationType, BackendError, Compositor, NotificationRequest,
    OverlayTexture, Subsystem,
};

const MOUSE_QUERY_HISTORY: usize = 256;

/// Mutating calls received, in order. Polls are not recorded here.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositorCall {
    CreateOverlay { handle: OverlayHandle, key: String },
    DestroyOverlay(OverlayHandle),
    SetWidth(OverlayHandle, f32),
    SetTexture(OverlayHandle, OverlayTexture),
    ClearTexture(OverlayHandle),
    CreateNotification {
        id: NotificationId,
        overlay: OverlayHandle,
        message: String,
        with_icon: bool,
    },
    RemoveNotification(NotificationId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessOverlay {
    pub key: String,
    pub name: String,
    pub width: f32,
    pub texture: Option<OverlayTexture>,
}

#[derive(Default)]
struct HeadlessState {
    app_type: Option<ApplicationType>,
    fail_at: Option<Subsystem>,
    overlays: HashMap<OverlayHandle, HeadlessOverlay>,
    mouse_owner: HashMap<OverlayHandle, u32>,
    mouse_queries: VecDeque<(OverlayHandle, u32)>,
    notifications: HashMap<NotificationId, String>,
    calls: Vec<CompositorCall>,
}

/// Compositor that lives in-process. Overlays, textures and notifications
/// are kept in memory and input is injected with [`HeadlessCompositor::push_event`].
#[derive(Default)]
pub struct HeadlessCompositor {
    state: Mutex<HeadlessState>,
    events: EventQueues,
}

impl HeadlessCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A compositor whose `init` fails when it reaches `subsystem`.
    pub fn failing_at(subsystem: Subsystem) -> Self {
        let me = Self::default();
        me.state.lock().fail_at = Some(subsystem);
        me
    }

    pub fn push_event(&self, handle: OverlayHandle, event: OverlayEvent) {
        self.events.push(handle, event);
    }

    /// Makes `device` claim mouse interaction on `handle`.
    pub fn claim_mouse(&self, handle: OverlayHandle, device: u32) {
        self.state.lock().mouse_owner.insert(handle, device);
    }

    pub fn mouse_queries(&self) -> Vec<(OverlayHandle, u32)> {
        self.state.lock().mouse_queries.iter().copied().collect()
    }

    /// Application type passed to the last successful `init`.
    pub fn app_type(&self) -> Option<ApplicationType> {
        self.state.lock().app_type
    }

    pub fn pending_events(&self, handle: OverlayHandle) -> usize {
        self.events.pending(handle)
    }

    pub fn overlay(&self, handle: OverlayHandle) -> Option<HeadlessOverlay> {
        self.state.lock().overlays.get(&handle).cloned()
    }

    pub fn overlay_count(&self) -> usize {
        self.state.lock().overlays.len()
    }

    pub fn notifications(&self) -> Vec<(NotificationId, String)> {
        let mut list: Vec<_> = self
            .state
            .lock()
            .notifications
            .iter()
            .map(|(id, msg)| (*id, msg.clone()))
            .collect();
        list.sort_by_key(|(id, _)| *id);
        list
    }

    pub fn calls(&self) -> Vec<CompositorCall> {
        self.state.lock().calls.clone()
    }

    pub fn texture_binds(&self) -> usize {
        self.count_calls(|c| matches!(c, CompositorCall::SetTexture(..)))
    }

    pub fn removals_of(&self, id: NotificationId) -> usize {
        self.count_calls(|c| *c == CompositorCall::RemoveNotification(id))
    }

    pub fn count_calls<F>(&self, pred: F) -> usize
    where
        F: Fn(&CompositorCall) -> bool,
    {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

impl Compositor for HeadlessCompositor {
    fn init(&self, app_type: ApplicationType) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        for subsystem in Subsystem::iter() {
            if state.fail_at == Some(subsystem) {
                return Err(BackendError::Init {
                    subsystem,
                    reason: "headless runtime refused".into(),
                });
            }
            log::debug!("headless: {subsystem} up");
        }
        state.app_type = Some(app_type);
        log::info!("Headless compositor ready as {app_type} application");
        Ok(())
    }

    fn create_overlay(
        &self,
        handle: OverlayHandle,
        key: &str,
        name: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.overlays.values().any(|o| o.key == key) || state.overlays.contains_key(&handle) {
            return Err(BackendError::Fatal(anyhow::anyhow!(
                "overlay key {key} already in use"
            )));
        }
        state.overlays.insert(
            handle,
            HeadlessOverlay {
                key: key.into(),
                name: name.into(),
                width: 1.0,
                texture: None,
            },
        );
        self.events.open(handle);
        state.calls.push(CompositorCall::CreateOverlay {
            handle,
            key: key.into(),
        });
        Ok(())
    }

    fn destroy_overlay(&self, handle: OverlayHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.overlays.remove(&handle).is_none() {
            return Err(BackendError::UnknownOverlay(handle));
        }
        self.events.close(handle);
        state.mouse_owner.remove(&handle);
        state.calls.push(CompositorCall::DestroyOverlay(handle));
        Ok(())
    }

    fn set_overlay_width(&self, handle: OverlayHandle, width: f32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let Some(overlay) = state.overlays.get_mut(&handle) else {
            return Err(BackendError::UnknownOverlay(handle));
        };
        overlay.width = width;
        state.calls.push(CompositorCall::SetWidth(handle, width));
        Ok(())
    }

    fn set_overlay_texture(
        &self,
        handle: OverlayHandle,
        texture: &OverlayTexture,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let Some(overlay) = state.overlays.get_mut(&handle) else {
            return Err(BackendError::UnknownOverlay(handle));
        };
        overlay.texture = Some(*texture);
        state.calls.push(CompositorCall::SetTexture(handle, *texture));
        Ok(())
    }

    fn clear_overlay_texture(&self, handle: OverlayHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let Some(overlay) = state.overlays.get_mut(&handle) else {
            return Err(BackendError::UnknownOverlay(handle));
        };
        overlay.texture = None;
        state.calls.push(CompositorCall::ClearTexture(handle));
        Ok(())
    }

    fn poll_next_event(&self, handle: OverlayHandle) -> Option<OverlayEvent> {
        self.events.pop(handle)
    }

    fn handle_controller_interaction_as_mouse(&self, handle: OverlayHandle, device: u32) -> bool {
        let mut state = self.state.lock();
        if state.mouse_queries.len() >= MOUSE_QUERY_HISTORY {
            state.mouse_queries.pop_front();
        }
        state.mouse_queries.push_back((handle, device));
        state.mouse_owner.get(&handle) == Some(&device)
    }

    fn create_notification(
        &self,
        request: &NotificationRequest<'_>,
    ) -> Result<NotificationId, BackendError> {
        let mut state = self.state.lock();
        if !state.overlays.contains_key(&request.overlay) {
            return Err(BackendError::UnknownOverlay(request.overlay));
        }
        log::info!(
            "headless: notification {} on {}: {}",
            request.id,
            request.overlay,
            request.message
        );
        state
            .notifications
            .insert(request.id, request.message.to_owned());
        state.calls.push(CompositorCall::CreateNotification {
            id: request.id,
            overlay: request.overlay,
            message: request.message.to_owned(),
            with_icon: request.icon.is_some(),
        });
        Ok(request.id)
    }

    fn remove_notification(&self, id: NotificationId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.push(CompositorCall::RemoveNotification(id));
        if state.notifications.remove(&id).is_none() {
            return Err(BackendError::Notification(format!(
                "notification {id} does not exist"
            )));
        }
        Ok(())
    }
}
