use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use log::error;
use serde::Deserialize;

use crate::{
    backend::ApplicationType,
    config_io::{self, CONFIG_ROOT_PATH},
    ids::IdAllocation,
    notifications::{NotificationStyle, NotificationType},
    registry::RegistryOptions,
};

const ENV_PREFIX: &str = "VRKNOCK";

fn def_poll_interval_ms() -> u64 {
    20
}

fn def_overlay_name() -> String {
    "VRKnock".into()
}

fn def_one() -> f32 {
    1.0
}

fn def_message() -> String {
    "Knock Knock!".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "def_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub application_type: ApplicationType,

    #[serde(default)]
    pub id_allocation: IdAllocation,

    #[serde(default = "def_overlay_name")]
    pub overlay_name: String,

    #[serde(default = "def_one")]
    pub overlay_width: f32,

    #[serde(default)]
    pub notification_type: NotificationType,

    #[serde(default)]
    pub notification_style: NotificationStyle,

    #[serde(default)]
    pub notification_icon: Option<PathBuf>,

    #[serde(default = "def_message")]
    pub default_message: String,

    #[serde(default)]
    pub host_name: Option<String>,
}

impl GeneralConfig {
    fn sanitize_range<T>(name: &str, val: &mut T, ok: bool, default: T)
    where
        T: std::fmt::Display + Copy,
    {
        if !ok {
            error!(
                "GeneralConfig: {} = {} is out of range, using {}",
                name, val, default
            );
            *val = default;
        }
    }

    fn post_load(&mut self) {
        let poll_ok = (1..=1000).contains(&self.poll_interval_ms);
        Self::sanitize_range(
            "poll_interval_ms",
            &mut self.poll_interval_ms,
            poll_ok,
            def_poll_interval_ms(),
        );
        let width_ok = self.overlay_width.is_finite() && self.overlay_width > 0.0;
        Self::sanitize_range(
            "overlay_width",
            &mut self.overlay_width,
            width_ok,
            def_one(),
        );
    }

    pub fn load_from_disk() -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        for path in config_io::config_files(&CONFIG_ROOT_PATH) {
            log::info!("Loading config file: {}", path.to_string_lossy());
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let mut config: Self = builder
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Failed to deserialize settings")?;
        config.post_load();
        Ok(config)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            id_allocation: self.id_allocation,
        }
    }
}
