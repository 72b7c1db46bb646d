//! Settings for talking to the synths, read from a json file (alles.json by default)
//!
//! Every value has a built in default so the file is optional.  Its main use
//! is picking the network interface on machines with more than one.
use json::JsonValue;
use log::{info, warn};
use regex::Regex;
use std::{
    error::Error,
    fmt,
    fs::File,
    io::{ErrorKind, Write},
};

use crate::common::multicast_sock::{
    ALLES_LATENCY_MS, ALLES_MULTICAST_GROUP, ALLES_PORT, ALLES_VOICES, MIN_MULTICAST_TTL,
};

/// default name of the settings file
pub const SETTINGS_FILE: &str = "alles.json";

#[derive(Debug)]
pub struct MissingConfigError {
    key: String,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Required configuration value '{}' is missing", self.key)
    }
}

impl Error for MissingConfigError {}

pub struct Config {
    filename: String,
    settings: JsonValue,
    defaults: JsonValue,
}

impl Config {
    /// The defaults the controller ships with
    pub fn defaults() -> JsonValue {
        let group = ALLES_MULTICAST_GROUP.to_string();
        json::object! {
            "multicast_group": group,
            "port": ALLES_PORT,
            "local_ip": "auto",
            "ttl": MIN_MULTICAST_TTL,
            "latency_ms": ALLES_LATENCY_MS,
            "voices": ALLES_VOICES
        }
    }

    /// Build a config from a settings file.  A missing or unparsable file is
    /// not an error, the defaults just win.
    pub fn build(filename: String, defaults: JsonValue) -> Result<Config, std::io::Error> {
        let filename_regex = Regex::new(r"^[a-zA-Z0-9_\-\.]+\.json$")
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        if !filename_regex.is_match(&filename) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid filename '{}' - must contain only letters, numbers, underscore, dash, dot and end in .json",
                    filename
                ),
            ));
        }

        let mut config = Config {
            filename,
            settings: json::object! {},
            defaults,
        };

        if let Err(err) = config.load_from_file() {
            info!("Using default settings: {}", err);
        }

        Ok(config)
    }

    fn load_from_file(&mut self) -> std::io::Result<()> {
        let raw_data = std::fs::read_to_string(&self.filename)?;
        match json::parse(&raw_data) {
            Ok(parsed) => {
                self.settings = parsed;
                info!("Loaded settings from {}: {}", self.filename, self.settings.dump());
            }
            Err(err) => {
                warn!("Failed to parse config file {}: {}", self.filename, err);
            }
        }
        Ok(())
    }

    pub fn get_filename(&self) -> &str {
        &self.filename
    }

    pub fn get_str_value(&self, key: &str, default: Option<String>) -> Result<String, MissingConfigError> {
        if let Some(val) = self.settings[key].as_str() {
            return Ok(val.to_string());
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_str() {
            return Ok(val.to_string());
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn get_u32_value(&self, key: &str, default: Option<u32>) -> Result<u32, MissingConfigError> {
        if let Some(val) = self.settings[key].as_u32() {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_u32() {
            return Ok(val);
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn set_value(&mut self, key: &str, val: impl Into<JsonValue>) -> Result<(), String> {
        let json_val = val.into();
        match json_val {
            JsonValue::Short(_) | JsonValue::String(_) | JsonValue::Boolean(_) | JsonValue::Number(_) => {
                self.settings[key] = json_val;
                Ok(())
            }
            _ => Err(format!("Unsupported value type for key: {}", key)),
        }
    }

    pub fn dump(&self) -> String {
        self.settings.pretty(2)
    }

    /// write the explicitly set values back to the settings file
    pub fn save_settings(&self) -> std::io::Result<()> {
        let mut f = File::create(self.filename.as_str())?;
        f.write_all(self.settings.pretty(2).as_bytes())?;
        f.sync_all()?;
        Ok(())
    }
}
