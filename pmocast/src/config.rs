//! # pmocast configuration
//!
//! The configuration is built in three layers:
//! - the embedded default (`pmocast.yaml`)
//! - `config.yaml` from the configuration directory, merged over it
//! - `PMOCAST_CONFIG__SECTION__KEY` environment variables, parsed as YAML
//!
//! The configuration directory is searched in this order:
//! 1. The directory passed to [`CastConfig::load`]
//! 2. The `PMOCAST_CONFIG` environment variable
//! 3. `.pmocast` in the current directory
//! 4. `.pmocast` in the user's home directory
//!
//! ```no_run
//! use pmocast::CastConfig;
//!
//! let config = CastConfig::load(None)?;
//! let session = config.session_config();
//! # Ok::<(), pmocast::CastError>(())
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::cast::ChannelSettings;
use crate::discovery::chromecast_discovery::MdnsSettings;
use crate::errors::CastError;
use crate::model::DiscoveryFilter;
use crate::session::SessionConfig;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmocast.yaml");

const ENV_CONFIG_DIR: &str = "PMOCAST_CONFIG";
const ENV_PREFIX: &str = "PMOCAST_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmocast";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastSection {
    pub receiver_app_id: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    pub connect_timeout_secs: u64,
    pub launch_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySection {
    pub active_interval_secs: u64,
    pub passive_interval_secs: u64,
    pub device_max_age_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastConfig {
    pub cast: CastSection,
    pub session: SessionSection,
    pub discovery: DiscoverySection,
}

impl CastConfig {
    /// The embedded default configuration.
    pub fn embedded() -> Result<Self, CastError> {
        Self::from_value(serde_yaml::from_str(DEFAULT_CONFIG)?)
    }

    /// Loads the configuration, honouring the process environment.
    pub fn load(directory: Option<&Path>) -> Result<Self, CastError> {
        let config_dir = find_config_dir(directory);
        Self::load_with(config_dir.as_deref(), env::vars())
    }

    /// Loads from `config_dir` (if any) with `vars` as the environment.
    pub fn load_with<I>(config_dir: Option<&Path>, vars: I) -> Result<Self, CastError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if let Some(dir) = config_dir {
            let path = dir.join(CONFIG_FILE_NAME);
            match fs::read(&path) {
                Ok(data) => {
                    info!(config_file = %path.display(), "Loaded config file");
                    let external: Value = serde_yaml::from_slice(&data)?;
                    merge_yaml(&mut value, &lower_keys_value(external));
                }
                Err(_) => {
                    info!(config_file = %path.display(), "Config file not found, using default embedded config");
                }
            }
        }

        apply_env_overrides(&mut value, vars);
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, CastError> {
        let config: CastConfig = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CastError> {
        if self.cast.receiver_app_id.trim().is_empty() {
            return Err(CastError::Config("cast.receiver_app_id is empty".into()));
        }
        if self.cast.port == 0 {
            return Err(CastError::Config("cast.port must not be 0".into()));
        }

        let durations = [
            ("session.connect_timeout_secs", self.session.connect_timeout_secs),
            ("session.launch_timeout_secs", self.session.launch_timeout_secs),
            ("session.request_timeout_secs", self.session.request_timeout_secs),
            ("session.heartbeat_interval_secs", self.session.heartbeat_interval_secs),
            ("discovery.active_interval_secs", self.discovery.active_interval_secs),
            ("discovery.passive_interval_secs", self.discovery.passive_interval_secs),
            ("discovery.device_max_age_secs", self.discovery.device_max_age_secs),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(CastError::Config(format!("{} must be at least 1", key)));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            receiver_app_id: self.cast.receiver_app_id.clone(),
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            launch_timeout: Duration::from_secs(self.session.launch_timeout_secs),
        }
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.session.request_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.session.heartbeat_interval_secs),
        }
    }

    pub fn mdns_settings(&self) -> MdnsSettings {
        MdnsSettings {
            active_interval: Duration::from_secs(self.discovery.active_interval_secs),
            passive_interval: Duration::from_secs(self.discovery.passive_interval_secs),
            device_max_age: Duration::from_secs(self.discovery.device_max_age_secs),
        }
    }

    pub fn discovery_filter(&self) -> DiscoveryFilter {
        DiscoveryFilter::for_application(self.cast.receiver_app_id.clone())
    }

    /// Writes the effective configuration to `<dir>/config.yaml`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, CastError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, serde_yaml::to_string(self)?)?;
        debug!(config_file = %path.display(), "Saved configuration");
        Ok(path)
    }
}

/// Finds an existing configuration directory; `None` means defaults only.
pub fn find_config_dir(directory: Option<&Path>) -> Option<PathBuf> {
    // 1. Répertoire explicite
    if let Some(dir) = directory {
        return Some(dir.to_path_buf());
    }

    // 2. Variable d'environnement
    if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
        info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
        return Some(PathBuf::from(env_path));
    }

    // 3. Répertoire courant
    let local = Path::new(CONFIG_DIR_NAME);
    if local.is_dir() {
        return Some(local.to_path_buf());
    }

    // 4. Répertoire personnel
    home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME))
        .filter(|dir| dir.is_dir())
}

fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key_path: Vec<String> = path.split("__").map(str::to_lowercase).collect();
        debug!(variable = %key, "Applying configuration override");
        set_value(config, &key_path, convert_env_value(&value));
    }
}

fn set_value(data: &mut Value, path: &[String], value: Value) {
    let Some((key, rest)) = path.split_first() else {
        *data = value;
        return;
    };
    if !matches!(data, Value::Mapping(_)) {
        *data = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = data {
        let entry = map
            .entry(Value::String(key.clone()))
            .or_insert(Value::Null);
        set_value(entry, rest, value);
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges `external` into `default`: mappings key by key, anything else replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
