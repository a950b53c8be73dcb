#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default
)]
pub mod backend;
pub mod config;
pub mod config_io;
pub mod graphics;
pub mod ids;
pub mod notifications;
pub mod overlays;
pub mod registry;
pub mod service;

pub use registry::{OverlayRegistry, RegistryError, RegistryOptions};
pub use service::{KnockService, Status};
