use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("unknown texture {0}")]
    UnknownTexture(TextureId),
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrap {
    #[default]
    Repeat,
    ClampToEdge,
}

/// A full 2D image upload with its sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap: Wrap,
    pub pixels: &'a [u8],
}

impl<'a> TextureUpload<'a> {
    /// BGRA8 source, RGBA storage, nearest filtering, repeat wrapping.
    pub const fn bgra_nearest(width: u32, height: u32, pixels: &'a [u8]) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Bgra8,
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            wrap: Wrap::Repeat,
            pixels,
        }
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// GPU texture operations. Implementations must be usable from the thread
/// that repaints a surface; any required context is expected to be current.
pub trait Gpu: Send + Sync {
    fn generate_texture(&self) -> Result<TextureId, GraphicsError>;
    fn delete_texture(&self, id: TextureId);
    fn upload_texture_2d(
        &self,
        id: TextureId,
        upload: &TextureUpload<'_>,
    ) -> Result<(), GraphicsError>;
}

/// Texture contents as stored by [`SoftwareGpu`], always RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTexture {
    pub width: u32,
    pub height: u32,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap: Wrap,
    pub rgba: Vec<u8>,
}

/// Keeps textures in host memory. Used by the headless backend and in tests.
#[derive(Default)]
pub struct SoftwareGpu {
    next_id: AtomicU32,
    textures: Mutex<HashMap<TextureId, Option<StoredTexture>>>,
}

impl SoftwareGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn texture(&self, id: TextureId) -> Option<StoredTexture> {
        self.textures.lock().get(&id).cloned().flatten()
    }
}

impl Gpu for SoftwareGpu {
    fn generate_texture(&self) -> Result<TextureId, GraphicsError> {
        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.textures.lock().insert(id, None);
        Ok(id)
    }

    fn delete_texture(&self, id: TextureId) {
        if self.textures.lock().remove(&id).is_none() {
            log::debug!("delete of unknown texture {id}");
        }
    }

    fn upload_texture_2d(
        &self,
        id: TextureId,
        upload: &TextureUpload<'_>,
    ) -> Result<(), GraphicsError> {
        let expected = upload.expected_len();
        if upload.pixels.len() != expected {
            return Err(GraphicsError::SizeMismatch {
                expected,
                actual: upload.pixels.len(),
            });
        }

        let mut textures = self.textures.lock();
        let Some(slot) = textures.get_mut(&id) else {
            return Err(GraphicsError::UnknownTexture(id));
        };

        let mut rgba = upload.pixels.to_vec();
        if upload.format == PixelFormat::Bgra8 {
            for px in rgba.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }

        *slot = Some(StoredTexture {
            width: upload.width,
            height: upload.height,
            min_filter: upload.min_filter,
            mag_filter: upload.mag_filter,
            wrap: upload.wrap,
            rgba,
        });
        Ok(())
    }
}
