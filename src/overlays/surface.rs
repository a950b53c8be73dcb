use std::sync::{Arc, Weak};

use anyhow::Context;
use glam::{IVec2, UVec2, Vec2};
use image::{imageops, ImageBuffer, Rgba};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    backend::{event::MouseData, Compositor, OverlayTexture},
    graphics::{Gpu, TextureId, TextureUpload},
};

use super::{Overlay, OverlayHandle, OverlayKind, OverlayState, RegistryContext};

/// One host-side pixel, channels in B, G, R, A order. Borrows `Rgba`'s
/// layout so the `image` blending and flipping routines apply unchanged;
/// only the alpha channel position matters to them.
pub type Bgra8 = Rgba<u8>;

/// Host-side pixel buffer of [`Bgra8`] pixels.
pub type Raster = ImageBuffer<Bgra8, Vec<u8>>;

/// Region of a surface that needs to be redrawn, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn full(size: UVec2) -> Self {
        Self::new(0, 0, size.x, size.y)
    }
}

#[derive(Error, Debug)]
#[error("could not draw {region:?}: {reason}")]
pub struct DrawError {
    pub region: DirtyRect,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const CODE_LEFT: u32 = 0x0001;
    pub const CODE_RIGHT: u32 = 0x0002;
    pub const CODE_MIDDLE: u32 = 0x0004;

    /// Unrecognized codes map to `None`.
    pub const fn from_code(code: u32) -> Self {
        match code {
            Self::CODE_LEFT => Self::Left,
            Self::CODE_RIGHT => Self::Right,
            Self::CODE_MIDDLE => Self::Middle,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Move,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceMouseEvent {
    pub kind: MouseEventKind,
    pub button: MouseButton,
    pub pos: IVec2,
}

pub type RepaintListener = Box<dyn Fn(DirtyRect) + Send + Sync>;

/// A UI surface that can draw itself into a pixel buffer and accept
/// synthesized mouse input.
pub trait Surface: Send + Sync {
    fn size(&self) -> UVec2;
    /// B, G, R, A.
    fn background(&self) -> [u8; 4];
    /// Draws `region` into `target`, which is sized to the region.
    fn draw(&self, region: DirtyRect, target: &mut Raster) -> Result<(), DrawError>;
    fn simulate_mouse(&self, event: SurfaceMouseEvent);
    /// Registers a callback invoked whenever part of the surface repaints.
    fn subscribe_repaint(&self, listener: RepaintListener);
}

/// Maps normalized overlay coordinates onto surface pixels.
pub fn surface_position(uv: Vec2, size: UVec2) -> IVec2 {
    (uv.as_dvec2() * size.as_dvec2()).floor().as_ivec2()
}

struct Attachment {
    handle: OverlayHandle,
    compositor: Arc<dyn Compositor>,
}

#[derive(Default)]
struct RenderTarget {
    backing: Option<Raster>,
    texture: Option<TextureId>,
    attachment: Option<Attachment>,
}

struct RenderBridge {
    name: Arc<str>,
    surface: Arc<dyn Surface>,
    gpu: Arc<dyn Gpu>,
    target: Mutex<RenderTarget>,
}

impl RenderBridge {
    fn repaint(&self, region: DirtyRect) -> anyhow::Result<()> {
        let mut target = self.target.lock();

        if let Some(old) = target.texture.take() {
            self.gpu.delete_texture(old);
        }
        let texture = self
            .gpu
            .generate_texture()
            .context("Failed to generate texture")?;
        target.texture = Some(texture);

        let size = self.surface.size();
        let backing = match target.backing.take() {
            Some(raster) if raster.width() == size.x && raster.height() == size.y => raster,
            _ => {
                log::debug!(
                    "{}: allocating backing raster at {}x{}",
                    self.name,
                    size.x,
                    size.y
                );
                Raster::from_pixel(size.x, size.y, Bgra8::from(self.surface.background()))
            }
        };
        let backing = target.backing.insert(backing);

        {
            let mut partial = Raster::new(region.width, region.height);
            match self.surface.draw(region, &mut partial) {
                Ok(()) => imageops::overlay(
                    backing,
                    &partial,
                    i64::from(region.x),
                    i64::from(region.y),
                ),
                Err(e) => {
                    log::warn!("{}: {}; keeping stale content", self.name, e);
                }
            }
        }

        {
            let flipped = imageops::flip_vertical(&*backing);
            let upload =
                TextureUpload::bgra_nearest(flipped.width(), flipped.height(), flipped.as_raw());
            self.gpu
                .upload_texture_2d(texture, &upload)
                .with_context(|| format!("{}: Failed to upload texture {}", self.name, texture))?;
            log::trace!(
                "{}: UploadTex {}, {}x{}",
                self.name,
                texture,
                flipped.width(),
                flipped.height()
            );
        }

        match target.attachment.as_ref() {
            Some(attachment) => {
                if let Err(e) = attachment
                    .compositor
                    .set_overlay_texture(attachment.handle, &OverlayTexture::gl(texture))
                {
                    log::error!("{}: Failed to set overlay texture: {}", self.name, e);
                }
            }
            None => log::trace!("{}: not attached, texture left unbound", self.name),
        }

        Ok(())
    }

    fn detach(&self) {
        let mut target = self.target.lock();
        target.attachment = None;
        if let Some(texture) = target.texture.take() {
            self.gpu.delete_texture(texture);
        }
    }
}

impl Drop for RenderBridge {
    fn drop(&mut self) {
        if let Some(texture) = self.target.get_mut().texture.take() {
            self.gpu.delete_texture(texture);
        }
    }
}

/// Overlay that streams a UI surface into a texture and feeds VR mouse input
/// back into the surface.
pub struct SurfaceOverlay {
    state: OverlayState,
    surface: Arc<dyn Surface>,
    bridge: Arc<RenderBridge>,
}

impl SurfaceOverlay {
    pub fn new(
        name: impl Into<Arc<str>>,
        width: f32,
        surface: Arc<dyn Surface>,
        gpu: Arc<dyn Gpu>,
    ) -> Self {
        let state = OverlayState::new(name, OverlayKind::Surface, width);
        let bridge = Arc::new(RenderBridge {
            name: state.name.clone(),
            surface: surface.clone(),
            gpu,
            target: Mutex::new(RenderTarget::default()),
        });

        Self {
            state,
            surface,
            bridge,
        }
    }

    /// Redraws `region` and uploads a fresh texture. Runs on the calling
    /// thread and blocks until the upload is done.
    pub fn repaint(&self, region: DirtyRect) -> anyhow::Result<()> {
        self.bridge.repaint(region)
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.bridge.target.lock().texture
    }

    pub fn is_attached(&self) -> bool {
        self.bridge.target.lock().attachment.is_some()
    }

    /// Copy of the backing raster, if one was allocated.
    pub fn backing(&self) -> Option<Raster> {
        self.bridge.target.lock().backing.clone()
    }

    fn forward_mouse(&self, kind: MouseEventKind, mouse: &MouseData) {
        let event = SurfaceMouseEvent {
            kind,
            button: MouseButton::from_code(mouse.button),
            pos: surface_position(mouse.uv, self.surface.size()),
        };
        log::trace!("{}: {:?}", self.state.name, event);
        self.surface.simulate_mouse(event);
    }
}

impl Overlay for SurfaceOverlay {
    fn state(&self) -> &OverlayState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OverlayState {
        &mut self.state
    }

    fn init(&mut self, ctx: &RegistryContext<'_>) -> anyhow::Result<()> {
        self.state.create(ctx.compositor.as_ref())?;
        self.bridge.target.lock().attachment = Some(Attachment {
            handle: self.state.handle,
            compositor: ctx.compositor.clone(),
        });

        let weak: Weak<RenderBridge> = Arc::downgrade(&self.bridge);
        self.surface.subscribe_repaint(Box::new(move |region| {
            let Some(bridge) = weak.upgrade() else {
                return;
            };
            if let Err(e) = bridge.repaint(region) {
                log::error!("{}: repaint failed: {:?}", bridge.name, e);
            }
        }));
        Ok(())
    }

    fn on_destroyed(&mut self) {
        self.bridge.detach();
    }

    fn on_mouse_move(&mut self, mouse: &MouseData) {
        self.forward_mouse(MouseEventKind::Move, mouse);
    }

    fn on_mouse_button_down(&mut self, mouse: &MouseData) {
        self.forward_mouse(MouseEventKind::Down, mouse);
    }

    fn on_mouse_button_up(&mut self, mouse: &MouseData) {
        self.forward_mouse(MouseEventKind::Up, mouse);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::{uvec2, vec2};

    use super::*;
    use crate::{
        backend::{headless::HeadlessCompositor, ApplicationType},
        graphics::SoftwareGpu,
    };

    /// Solid-color test surface. Regions whose x equals `broken_x` fail to
    /// draw, and the region-local column `hole` is left fully transparent.
    pub(crate) struct FakeSurface {
        pub size: Mutex<UVec2>,
        pub fill: [u8; 4],
        pub broken_x: Option<i32>,
        pub hole: Option<u32>,
        pub listeners: Mutex<Vec<RepaintListener>>,
        pub mouse: Mutex<Vec<SurfaceMouseEvent>>,
    }

    pub(crate) const BG: [u8; 4] = [10, 20, 30, 255];

    impl FakeSurface {
        pub(crate) fn new(size: UVec2, fill: [u8; 4]) -> Self {
            Self {
                size: Mutex::new(size),
                fill,
                broken_x: None,
                hole: None,
                listeners: Mutex::new(Vec::new()),
                mouse: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn emit(&self, region: DirtyRect) {
            for listener in self.listeners.lock().iter() {
                listener(region);
            }
        }
    }

    impl Surface for FakeSurface {
        fn size(&self) -> UVec2 {
            *self.size.lock()
        }
        fn background(&self) -> [u8; 4] {
            BG
        }
        fn draw(&self, region: DirtyRect, target: &mut Raster) -> Result<(), DrawError> {
            if self.broken_x == Some(region.x) {
                return Err(DrawError {
                    region,
                    reason: "control not visible".into(),
                });
            }
            for (x, _, px) in target.enumerate_pixels_mut() {
                *px = if self.hole == Some(x) {
                    Bgra8::from([0; 4])
                } else {
                    Bgra8::from(self.fill)
                };
            }
            Ok(())
        }
        fn simulate_mouse(&self, event: SurfaceMouseEvent) {
            self.mouse.lock().push(event);
        }
        fn subscribe_repaint(&self, listener: RepaintListener) {
            self.listeners.lock().push(listener);
        }
    }

    fn overlay_with(surface: Arc<FakeSurface>) -> (SurfaceOverlay, Arc<SoftwareGpu>) {
        let gpu = Arc::new(SoftwareGpu::new());
        let overlay = SurfaceOverlay::new("panel", 1.0, surface, gpu.clone());
        (overlay, gpu)
    }

    fn attach(overlay: &mut SurfaceOverlay, handle: u64) -> Arc<HeadlessCompositor> {
        let headless = Arc::new(HeadlessCompositor::new());
        headless.init(ApplicationType::Overlay).unwrap();
        let compositor: Arc<dyn Compositor> = headless.clone();
        overlay.state_mut().handle = OverlayHandle(handle);
        overlay
            .init(&RegistryContext {
                compositor: &compositor,
            })
            .unwrap();
        headless
    }

    #[test]
    fn button_codes_map_to_buttons() {
        assert_eq!(MouseButton::from_code(1), MouseButton::Left);
        assert_eq!(MouseButton::from_code(2), MouseButton::Right);
        assert_eq!(MouseButton::from_code(4), MouseButton::Middle);
        for code in [0, 3, 5, 8, 0x10, u32::MAX] {
            assert_eq!(MouseButton::from_code(code), MouseButton::None);
        }
    }

    #[test]
    fn position_is_floor_of_scaled_uv() {
        let size = uvec2(640, 480);
        assert_eq!(surface_position(vec2(0.0, 0.0), size), IVec2::new(0, 0));
        assert_eq!(surface_position(vec2(0.5, 0.25), size), IVec2::new(320, 120));
        assert_eq!(surface_position(vec2(0.999, 0.999), size), IVec2::new(639, 479));
        assert_eq!(surface_position(vec2(1.0, 1.0), size), IVec2::new(640, 480));
        assert_eq!(surface_position(vec2(0.1, 0.3), uvec2(3, 7)), IVec2::new(0, 2));

        for i in 0..=100 {
            let uv = vec2(i as f32 / 100.0, 1.0 - i as f32 / 100.0);
            let expected = IVec2::new(
                (f64::from(uv.x) * 333.0).floor() as i32,
                (f64::from(uv.y) * 77.0).floor() as i32,
            );
            assert_eq!(surface_position(uv, uvec2(333, 77)), expected);
        }
    }

    #[test]
    fn mouse_events_keep_their_kind() {
        let surface = Arc::new(FakeSurface::new(uvec2(200, 100), [0; 4]));
        let (mut overlay, _gpu) = overlay_with(surface.clone());
        let mouse = MouseData {
            uv: vec2(0.25, 0.5),
            button: MouseButton::CODE_RIGHT,
        };

        overlay.on_mouse_move(&mouse);
        overlay.on_mouse_button_down(&mouse);
        overlay.on_mouse_button_up(&MouseData { button: 77, ..mouse });

        let seen = surface.mouse.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].kind, MouseEventKind::Move);
        assert_eq!(seen[1].kind, MouseEventKind::Down);
        assert_eq!(seen[2].kind, MouseEventKind::Up);
        assert_eq!(seen[1].button, MouseButton::Right);
        assert_eq!(seen[2].button, MouseButton::None);
        assert!(seen.iter().all(|e| e.pos == IVec2::new(50, 50)));
    }

    #[test]
    fn repaint_composites_and_flips() {
        let surface = Arc::new(FakeSurface::new(uvec2(4, 2), [1, 2, 3, 255]));
        let (overlay, gpu) = overlay_with(surface);

        overlay.repaint(DirtyRect::new(0, 0, 4, 1)).unwrap();

        let backing = overlay.backing().unwrap();
        assert_eq!(backing.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(backing.get_pixel(3, 1).0, BG);

        // uploaded texture is flipped and swizzled to RGBA
        let tex = gpu.texture(overlay.texture().unwrap()).unwrap();
        assert_eq!((tex.width, tex.height), (4, 2));
        assert_eq!(&tex.rgba[0..4], &[BG[2], BG[1], BG[0], BG[3]]);
        assert_eq!(&tex.rgba[16..20], &[3, 2, 1, 255]);
    }

    #[test]
    fn transparent_paint_keeps_background() {
        let mut fake = FakeSurface::new(uvec2(2, 1), [0, 0, 255, 255]);
        fake.hole = Some(1);
        let (overlay, _gpu) = overlay_with(Arc::new(fake));

        overlay.repaint(DirtyRect::new(0, 0, 2, 1)).unwrap();

        let backing = overlay.backing().unwrap();
        assert_eq!(backing.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(backing.get_pixel(1, 0).0, BG);
    }

    #[test]
    fn repaint_replaces_texture() {
        let surface = Arc::new(FakeSurface::new(uvec2(2, 2), [0, 0, 0, 255]));
        let (overlay, gpu) = overlay_with(surface);

        overlay.repaint(DirtyRect::new(0, 0, 1, 1)).unwrap();
        let first = overlay.texture().unwrap();
        overlay.repaint(DirtyRect::new(1, 1, 1, 1)).unwrap();
        let second = overlay.texture().unwrap();

        assert_ne!(first, second);
        assert_eq!(gpu.live_textures(), 1);
        assert!(gpu.texture(first).is_none());
    }

    #[test]
    fn resize_reallocates_with_background() {
        let surface = Arc::new(FakeSurface::new(uvec2(2, 2), [9, 9, 9, 255]));
        let (overlay, _gpu) = overlay_with(surface.clone());

        overlay.repaint(DirtyRect::full(uvec2(2, 2))).unwrap();
        assert_eq!(overlay.backing().unwrap().get_pixel(1, 1).0, [9, 9, 9, 255]);

        *surface.size.lock() = uvec2(3, 5);
        overlay.repaint(DirtyRect::new(0, 0, 1, 1)).unwrap();

        let backing = overlay.backing().unwrap();
        assert_eq!(backing.dimensions(), (3, 5));
        assert_eq!(backing.get_pixel(0, 0).0, [9, 9, 9, 255]);
        assert_eq!(backing.get_pixel(1, 1).0, BG);
        assert_eq!(backing.get_pixel(2, 4).0, BG);
    }

    #[test]
    fn failed_draw_keeps_stale_content_and_still_uploads() {
        let mut fake = FakeSurface::new(uvec2(2, 1), [5, 5, 5, 255]);
        fake.broken_x = Some(1);
        let surface = Arc::new(fake);
        let (overlay, gpu) = overlay_with(surface);

        overlay.repaint(DirtyRect::new(1, 0, 1, 1)).unwrap();

        let backing = overlay.backing().unwrap();
        assert_eq!(backing.get_pixel(1, 0).0, BG);
        assert!(gpu.texture(overlay.texture().unwrap()).is_some());
    }

    #[test]
    fn texture_binds_only_when_attached() {
        let surface = Arc::new(FakeSurface::new(uvec2(2, 2), [1, 1, 1, 255]));
        let (mut overlay, _gpu) = overlay_with(surface.clone());

        overlay.repaint(DirtyRect::full(uvec2(2, 2))).unwrap();
        assert!(overlay.texture().is_some());
        assert!(!overlay.is_attached());

        let headless = attach(&mut overlay, 42);
        assert!(overlay.is_attached());
        assert_eq!(headless.texture_binds(), 0);

        surface.emit(DirtyRect::new(0, 0, 1, 1));
        let bound = headless.overlay(OverlayHandle(42)).unwrap().texture.unwrap();
        assert_eq!(bound.texture, overlay.texture().unwrap());
        assert_eq!(headless.texture_binds(), 1);

        overlay.on_destroyed();
        assert!(!overlay.is_attached());
        assert!(overlay.texture().is_none());
    }

    #[test]
    fn repaint_listener_is_added_by_init() {
        let surface = Arc::new(FakeSurface::new(uvec2(2, 2), [1, 1, 1, 255]));
        let (mut overlay, gpu) = overlay_with(surface.clone());
        assert_eq!(surface.listeners.lock().len(), 0);

        surface.emit(DirtyRect::full(uvec2(2, 2)));
        assert!(overlay.texture().is_none());
        assert_eq!(gpu.live_textures(), 0);

        let _headless = attach(&mut overlay, 7);
        assert_eq!(surface.listeners.lock().len(), 1);
    }

    #[test]
    fn dropped_overlay_ignores_repaint_signal() {
        let surface = Arc::new(FakeSurface::new(uvec2(2, 2), [1, 1, 1, 255]));
        let (mut overlay, gpu) = overlay_with(surface.clone());
        let _headless = attach(&mut overlay, 9);
        surface.emit(DirtyRect::full(uvec2(2, 2)));
        assert_eq!(gpu.live_textures(), 1);
        drop(overlay);

        assert_eq!(gpu.live_textures(), 0);
        surface.emit(DirtyRect::full(uvec2(2, 2)));
        assert_eq!(gpu.live_textures(), 0);
    }
}
