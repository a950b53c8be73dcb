use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    backend::{ApplicationType, BackendError, Compositor},
    ids::{self, IdAllocation, IdSource},
    notifications::{self, NotificationId},
    overlays::{dispatch_event, Overlay, OverlayHandle, OverlayKind, RegistryContext},
};

/// Controller indices offered to the mouse-claim query, in order.
const MOUSE_DEVICES: std::ops::Range<u32> = 1..5;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{kind} overlay \"{name}\" is already registered")]
    DuplicateRegistration { name: String, kind: OverlayKind },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("overlay init failed: {0:?}")]
    Init(anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    pub poll_interval: Duration,
    pub id_allocation: IdAllocation,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            id_allocation: IdAllocation::Random,
        }
    }
}

pub(crate) struct RegistryInner {
    pub(crate) overlays: Vec<Box<dyn Overlay>>,
    pub(crate) notifications: HashSet<NotificationId>,
    handle_ids: Box<dyn IdSource>,
    pub(crate) notification_ids: Box<dyn IdSource>,
}

/// Owns every registered overlay and active notification.
///
/// One lock guards both collections. The poll thread holds it for a whole
/// iteration, so registration and [`OverlayRegistry::stop`] never interleave
/// with event dispatch.
pub struct OverlayRegistry {
    pub(crate) compositor: Arc<dyn Compositor>,
    pub(crate) inner: Mutex<RegistryInner>,
    running: AtomicBool,
    generation: AtomicU64,
    poll_interval: Duration,
}

impl OverlayRegistry {
    pub fn new(compositor: Arc<dyn Compositor>, options: RegistryOptions) -> Self {
        Self {
            compositor,
            inner: Mutex::new(RegistryInner {
                overlays: Vec::new(),
                notifications: HashSet::new(),
                handle_ids: options.id_allocation.source(u64::MAX),
                notification_ids: options.id_allocation.source(u64::from(u32::MAX)),
            }),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            poll_interval: options.poll_interval,
        }
    }

    /// Brings up the compositor and starts the poll thread. The thread is
    /// detached and exits once the registry stops or is dropped.
    pub fn init(self: &Arc<Self>, app_type: ApplicationType) -> Result<(), BackendError> {
        if self.is_running() {
            log::warn!("Registry already running, ignoring init");
            return Ok(());
        }

        self.compositor.init(app_type)?;

        self.running.store(true, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);

        if let Err(e) = thread::Builder::new()
            .name("overlay-poll".into())
            .spawn(move || poll_loop(&weak, generation))
        {
            self.running.store(false, Ordering::SeqCst);
            return Err(BackendError::Fatal(
                anyhow::Error::from(e).context("Could not spawn poll thread"),
            ));
        }
        Ok(())
    }

    /// Assigns a handle to `item` and runs its init callback.
    pub fn register(&self, mut item: Box<dyn Overlay>) -> Result<OverlayHandle, RegistryError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let key = item.state().key();
        if inner.overlays.iter().any(|o| o.state().key() == key) {
            log::warn!("{}: {} overlay already registered", key.name, key.kind);
            return Err(RegistryError::DuplicateRegistration {
                name: key.name.to_string(),
                kind: key.kind,
            });
        }

        let live = &inner.overlays;
        let handle = OverlayHandle(ids::allocate(inner.handle_ids.as_mut(), |c| {
            live.iter().any(|o| o.state().handle.0 == c)
        }));
        item.state_mut().handle = handle;

        let ctx = RegistryContext {
            compositor: &self.compositor,
        };
        if let Err(e) = item.init(&ctx) {
            log::error!("{}: init failed, rolling back", key.name);
            item.state_mut().handle = OverlayHandle::UNASSIGNED;
            return Err(RegistryError::Init(e));
        }

        log::debug!("{}: registered as {}", key.name, handle);
        inner.overlays.push(item);
        Ok(handle)
    }

    /// Destroys every overlay and notification. Does nothing when stopped.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !self.running.load(Ordering::SeqCst) {
            log::debug!("Registry already stopped");
            return;
        }

        for mut overlay in inner.overlays.drain(..) {
            overlay.state().destroy(self.compositor.as_ref());
            overlay.on_destroyed();
        }
        notifications::clear_tracked(self.compositor.as_ref(), &mut inner.notifications);

        self.running.store(false, Ordering::SeqCst);
        log::info!("Registry stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One pass over every overlay: mouse claims first, then pending events.
    pub fn poll_once(&self) {
        let mut inner = self.inner.lock();
        for overlay in inner.overlays.iter_mut() {
            let handle = overlay.state().handle;

            for device in MOUSE_DEVICES {
                if self
                    .compositor
                    .handle_controller_interaction_as_mouse(handle, device)
                {
                    log::trace!("{}: device {} claimed mouse", overlay.state().name, device);
                    break;
                }
            }

            while let Some(event) = self.compositor.poll_next_event(handle) {
                dispatch_event(overlay.as_mut(), &event);
            }
        }
    }

    /// Handles in registration order.
    pub fn handles(&self) -> Vec<OverlayHandle> {
        self.inner
            .lock()
            .overlays
            .iter()
            .map(|o| o.state().handle)
            .collect()
    }

    pub fn overlay_count(&self) -> usize {
        self.inner.lock().overlays.len()
    }

    pub fn notification_ids(&self) -> Vec<NotificationId> {
        let mut ids: Vec<_> = self.inner.lock().notifications.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }
}

fn poll_loop(registry: &Weak<OverlayRegistry>, generation: u64) {
    log::info!("Poll loop started");
    loop {
        let Some(reg) = registry.upgrade() else {
            break;
        };
        if !reg.is_current(generation) {
            break;
        }
        reg.poll_once();
        let interval = reg.poll_interval;
        drop(reg);
        thread::sleep(interval);
    }
    log::info!("Poll loop exited");
}
