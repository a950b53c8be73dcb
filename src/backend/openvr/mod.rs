use std::{
    collections::HashMap,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;
use glam::{vec3, Affine3A};
use ovr_overlay::{
    overlay::{OverlayHandle as OvrHandle, OverlayManager},
    pose::Matrix3x4,
    sys::{ETrackingUniverseOrigin, EVRApplicationType, EVREventType},
};
use parking_lot::Mutex;

use crate::{graphics::SoftwareGpu, notifications::NotificationId, overlays::OverlayHandle};

use self::helpers::{friendly_name, rows_top_down, Affine3AConvert};

use super::{
    event::OverlayEvent, queue::EventQueues, ApplicationType, BackendError, Compositor,
    NotificationRequest, OverlayTexture, Subsystem, TextureApi,
};

mod helpers;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(20);

const POPUP_WIDTH: f32 = 0.3;
/// Shown when a popup has no icon of its own.
const POPUP_CARD: [u8; 4] = [32, 32, 40, 230];

struct RawImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

enum Request {
    Create {
        handle: OverlayHandle,
        key: String,
        name: String,
    },
    Destroy(OverlayHandle),
    Width(OverlayHandle, f32),
    Image(OverlayHandle, RawImage),
    Hide(OverlayHandle),
    Popup {
        id: NotificationId,
        message: String,
        image: RawImage,
    },
    ClosePopup(NotificationId),
}

type Reply = mpsc::Sender<Result<(), BackendError>>;

struct Worker {
    requests: mpsc::Sender<(Request, Reply)>,
    thread: JoinHandle<()>,
}

/// Compositor backed by a local OpenVR runtime.
///
/// `ovr_overlay` managers borrow their context and are not `Send`, so a
/// dedicated thread owns the context and serves requests over a channel.
/// Texture contents are read back from the [`SoftwareGpu`] surfaces render
/// into and handed to OpenVR as raw pixels.
pub struct OpenVrCompositor {
    gpu: Arc<SoftwareGpu>,
    events: Arc<EventQueues>,
    worker: Mutex<Option<Worker>>,
}

impl OpenVrCompositor {
    pub fn new(gpu: Arc<SoftwareGpu>) -> Self {
        Self {
            gpu,
            events: Arc::new(EventQueues::new()),
            worker: Mutex::new(None),
        }
    }

    fn call(&self, request: Request) -> Result<(), BackendError> {
        let (reply, result) = mpsc::channel();
        self.worker
            .lock()
            .as_ref()
            .ok_or_else(|| BackendError::Fatal(anyhow!("OpenVR is not initialized")))?
            .requests
            .send((request, reply))
            .map_err(|_| BackendError::Fatal(anyhow!("OpenVR thread has exited")))?;
        result
            .recv()
            .map_err(|_| BackendError::Fatal(anyhow!("OpenVR thread has exited")))?
    }
}

impl Drop for OpenVrCompositor {
    fn drop(&mut self) {
        if let Some(Worker { requests, thread }) = self.worker.get_mut().take() {
            drop(requests);
            if thread.join().is_err() {
                log::error!("OpenVR thread panicked");
            }
        }
    }
}

const fn ovr_app_type(app_type: ApplicationType) -> EVRApplicationType {
    match app_type {
        ApplicationType::Other => EVRApplicationType::VRApplication_Other,
        ApplicationType::Scene => EVRApplicationType::VRApplication_Scene,
        ApplicationType::Overlay => EVRApplicationType::VRApplication_Overlay,
        ApplicationType::Background => EVRApplicationType::VRApplication_Background,
        ApplicationType::Utility => EVRApplicationType::VRApplication_Utility,
    }
}

impl Compositor for OpenVrCompositor {
    fn init(&self, app_type: ApplicationType) -> Result<(), BackendError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::warn!("OpenVR already initialized");
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (requests, incoming) = mpsc::channel();
        let events = self.events.clone();
        let thread = thread::Builder::new()
            .name("openvr".into())
            .spawn(move || run_worker(app_type, &incoming, &ready_tx, &events))
            .map_err(|e| BackendError::Init {
                subsystem: Subsystem::Runtime,
                reason: e.to_string(),
            })?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(BackendError::Init {
                subsystem: Subsystem::Runtime,
                reason: "OpenVR thread exited during startup".into(),
            })
        });
        if let Err(e) = ready {
            let _ = thread.join();
            return Err(e);
        }

        *worker = Some(Worker { requests, thread });
        Ok(())
    }

    fn create_overlay(
        &self,
        handle: OverlayHandle,
        key: &str,
        name: &str,
    ) -> Result<(), BackendError> {
        self.call(Request::Create {
            handle,
            key: key.into(),
            name: name.into(),
        })?;
        self.events.open(handle);
        Ok(())
    }

    fn destroy_overlay(&self, handle: OverlayHandle) -> Result<(), BackendError> {
        self.events.close(handle);
        self.call(Request::Destroy(handle))
    }

    fn set_overlay_width(&self, handle: OverlayHandle, width: f32) -> Result<(), BackendError> {
        self.call(Request::Width(handle, width))
    }

    fn set_overlay_texture(
        &self,
        handle: OverlayHandle,
        texture: &OverlayTexture,
    ) -> Result<(), BackendError> {
        if texture.api != TextureApi::OpenGl {
            return Err(BackendError::Fatal(anyhow!(
                "{:?} textures are not supported",
                texture.api
            )));
        }
        let Some(stored) = self.gpu.texture(texture.texture) else {
            return Err(BackendError::Fatal(anyhow!(
                "texture {} has no contents",
                texture.texture
            )));
        };
        self.call(Request::Image(
            handle,
            RawImage {
                width: stored.width,
                height: stored.height,
                rgba: rows_top_down(&stored.rgba, stored.width),
            },
        ))
    }

    fn clear_overlay_texture(&self, handle: OverlayHandle) -> Result<(), BackendError> {
        self.call(Request::Hide(handle))
    }

    fn poll_next_event(&self, handle: OverlayHandle) -> Option<OverlayEvent> {
        self.events.pop(handle)
    }

    // ovr_overlay exposes no per-overlay mouse routing
    fn handle_controller_interaction_as_mouse(&self, _handle: OverlayHandle, _device: u32) -> bool {
        false
    }

    fn create_notification(
        &self,
        request: &NotificationRequest<'_>,
    ) -> Result<NotificationId, BackendError> {
        let image = request.icon.map_or_else(
            || RawImage {
                width: 1,
                height: 1,
                rgba: POPUP_CARD.to_vec(),
            },
            |icon| RawImage {
                width: icon.width,
                height: icon.height,
                rgba: icon.rgba.clone(),
            },
        );
        log::info!(
            "OpenVR: popup {} for {}: {}",
            request.id,
            request.overlay,
            request.message
        );
        self.call(Request::Popup {
            id: request.id,
            message: request.message.into(),
            image,
        })?;
        Ok(request.id)
    }

    fn remove_notification(&self, id: NotificationId) -> Result<(), BackendError> {
        self.call(Request::ClosePopup(id))
    }
}

fn run_worker(
    app_type: ApplicationType,
    incoming: &mpsc::Receiver<(Request, Reply)>,
    ready: &mpsc::SyncSender<Result<(), BackendError>>,
    events: &EventQueues,
) {
    const EV_QUIT: u32 = EVREventType::VREvent_Quit as u32;

    let Ok(context) = ovr_overlay::Context::init(ovr_app_type(app_type)) else {
        log::warn!("Will not use OpenVR: Context init failed");
        let _ = ready.send(Err(BackendError::Init {
            subsystem: Subsystem::Runtime,
            reason: "Context init failed".into(),
        }));
        return;
    };

    log::info!("Using OpenVR runtime as {app_type} application");

    let mut system_mgr = context.system_mngr();
    let mut overlay_mgr = context.overlay_mngr();
    let mut overlays = OvrOverlays::default();
    let _ = ready.send(Ok(()));

    loop {
        match incoming.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok((request, reply)) => {
                let _ = reply.send(overlays.apply(&mut overlay_mgr, request));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        while let Some(event) = system_mgr.poll_next_event() {
            if event.event_type == EV_QUIT {
                log::warn!("Received quit event, notifying overlays.");
                events.broadcast(OverlayEvent::Quit);
            }
        }
    }

    overlays.destroy_all(&mut overlay_mgr);
    log::info!("OpenVR thread exiting");
}

fn ovr_error(what: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Fatal(anyhow!("Failed to {what}: {e}"))
}

#[derive(Default)]
struct OvrOverlays {
    overlays: HashMap<OverlayHandle, OvrHandle>,
    popups: HashMap<NotificationId, OvrHandle>,
}

impl OvrOverlays {
    fn get(&self, handle: OverlayHandle) -> Result<OvrHandle, BackendError> {
        self.overlays
            .get(&handle)
            .copied()
            .ok_or(BackendError::UnknownOverlay(handle))
    }

    fn apply(
        &mut self,
        overlay: &mut OverlayManager,
        request: Request,
    ) -> Result<(), BackendError> {
        match request {
            Request::Create { handle, key, name } => {
                if self.overlays.contains_key(&handle) {
                    return Err(BackendError::Fatal(anyhow!(
                        "overlay {handle} already exists"
                    )));
                }
                log::debug!("Create overlay with key: {}", &key);
                let ovr = overlay
                    .create_overlay(&key, friendly_name(&name))
                    .map_err(|e| ovr_error("create overlay", e))?;
                self.overlays.insert(handle, ovr);
            }
            Request::Destroy(handle) => {
                let ovr = self.get(handle)?;
                self.overlays.remove(&handle);
                overlay
                    .destroy_overlay(ovr)
                    .map_err(|e| ovr_error("destroy overlay", e))?;
            }
            Request::Width(handle, width) => {
                overlay
                    .set_width(self.get(handle)?, width)
                    .map_err(|e| ovr_error("set overlay width", e))?;
            }
            Request::Image(handle, mut image) => {
                let ovr = self.get(handle)?;
                upload_raw(overlay, ovr, &mut image)?;
                overlay
                    .set_visibility(ovr, true)
                    .map_err(|e| ovr_error("show overlay", e))?;
            }
            Request::Hide(handle) => {
                overlay
                    .set_visibility(self.get(handle)?, false)
                    .map_err(|e| ovr_error("hide overlay", e))?;
            }
            Request::Popup {
                id,
                message,
                mut image,
            } => {
                let key = format!("vrknock.popup.{}", id.0);
                let ovr = overlay
                    .create_overlay(&key, friendly_name(&message))
                    .map_err(|e| BackendError::Notification(format!("{key}: {e}")))?;
                if let Err(e) = show_popup(overlay, ovr, &mut image) {
                    let _ = overlay.destroy_overlay(ovr);
                    return Err(e);
                }
                self.popups.insert(id, ovr);
            }
            Request::ClosePopup(id) => {
                let ovr = self.popups.remove(&id).ok_or_else(|| {
                    BackendError::Notification(format!("notification {id} does not exist"))
                })?;
                overlay
                    .destroy_overlay(ovr)
                    .map_err(|e| BackendError::Notification(format!("{id}: {e}")))?;
            }
        }
        Ok(())
    }

    fn destroy_all(&mut self, overlay: &mut OverlayManager) {
        for (handle, ovr) in self.overlays.drain() {
            if let Err(e) = overlay.destroy_overlay(ovr) {
                log::error!("{handle}: Failed to destroy overlay: {e}");
            }
        }
        for (id, ovr) in self.popups.drain() {
            if let Err(e) = overlay.destroy_overlay(ovr) {
                log::error!("{id}: Failed to destroy popup: {e}");
            }
        }
    }
}

fn upload_raw(
    overlay: &mut OverlayManager,
    ovr: OvrHandle,
    image: &mut RawImage,
) -> Result<(), BackendError> {
    log::trace!("UploadRaw {}x{}", image.width, image.height);
    overlay
        .set_raw_data(
            ovr,
            &mut image.rgba,
            image.width as usize,
            image.height as usize,
            4,
        )
        .map_err(|e| ovr_error("set overlay texture", e))
}

fn show_popup(
    overlay: &mut OverlayManager,
    ovr: OvrHandle,
    image: &mut RawImage,
) -> Result<(), BackendError> {
    let transform = Matrix3x4::from_affine(&Affine3A::from_translation(vec3(0.0, 1.5, -1.0)));
    overlay
        .set_width(ovr, POPUP_WIDTH)
        .map_err(|e| ovr_error("set popup width", e))?;
    overlay
        .set_transform_absolute(
            ovr,
            ETrackingUniverseOrigin::TrackingUniverseStanding,
            &transform,
        )
        .map_err(|e| ovr_error("place popup", e))?;
    upload_raw(overlay, ovr, image)?;
    overlay
        .set_visibility(ovr, true)
        .map_err(|e| ovr_error("show popup", e))
}
