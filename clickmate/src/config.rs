use crate::injector::ClickSettings;
use control::DEFAULT_SOCKET_PATH;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use input::{DeviceIdentity, BTN_LEFT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CLICKMATE_";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub device: Option<PathBuf>,
    pub socket_path: PathBuf,
    pub settle_delay_ms: u64,
    pub click_interval_ms: u64,
    pub click_button: u16,
    pub poll_interval_ms: u64,
    pub virtual_device: DeviceIdentity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: None,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            settle_delay_ms: 200,
            click_interval_ms: 100,
            click_button: BTN_LEFT,
            poll_interval_ms: 250,
            virtual_device: DeviceIdentity::default(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` if there is one, then `CLICKMATE_*` variables.
    /// `__` in a variable name descends into a table, e.g. `CLICKMATE_VIRTUAL_DEVICE__NAME`.
    pub fn new(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().replace("__", ".").replace('_', "-").into()
            }))
            .extract()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn click_settings(&self) -> ClickSettings {
        ClickSettings {
            button: self.click_button,
            interval: Duration::from_millis(self.click_interval_ms),
        }
    }
}
