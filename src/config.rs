//! Gateway configuration
//!
//! Loaded from a YAML document; every field is optional.
//!
//! ```yaml
//! listen: 0.0.0.0:5441
//! fifo_length: 100
//! renew_secs: 300
//! save_interval_secs: 600
//! dump_path: coelink.dump
//! schema:
//!   analogue: config_analogue.json
//!   digital: config_digital.json
//! control:
//!   shell: true
//!   telnet: 127.0.0.1:5442
//! send_to: 192.168.1.20:5441
//! fhem:
//!   address: 192.168.1.10:7072
//!   device: heating
//!   create_device: true
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::buffer::DEFAULT_CAPACITY;
use crate::{CoeError, Result};

/// Default UDP port CoE nodes send to.
pub const DEFAULT_PORT: u16 = 5441;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// UDP address frames are received on.
    pub listen: SocketAddr,
    /// Frame buffer capacity.
    pub fifo_length: usize,
    /// Heartbeat interval for unchanged channels, in seconds.
    pub renew_secs: u64,
    /// Periodic dump interval in seconds; 0 disables it.
    pub save_interval_secs: u64,
    pub dump_path: PathBuf,
    pub schema: SchemaPaths,
    pub control: ControlConfig,
    /// Target for outbound frames built by the `send` command.
    pub send_to: Option<SocketAddr>,
    /// Forward changes to an FHEM server; disabled when absent.
    pub fhem: Option<FhemConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaPaths {
    pub analogue: PathBuf,
    pub digital: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Read commands from stdin.
    pub shell: bool,
    /// Serve the same commands over TCP.
    pub telnet: Option<SocketAddr>,
    pub prompt: String,
}

/// Connection and device settings of the FHEM bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FhemConfig {
    /// `host:port` of FHEM's telnet port.
    pub address: String,
    /// Connect and prompt timeout in seconds.
    pub timeout_secs: u64,
    pub prompt: String,
    /// Dummy device the readings are set on.
    pub device: String,
    /// Define the device (and its attributes) before the first update.
    pub create_device: bool,
    pub alias: Option<String>,
    pub group: Option<String>,
    pub room: Option<String>,
    /// Forwarded batches per second and kind; 0 forwards every frame.
    pub rate_hz: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            fifo_length: DEFAULT_CAPACITY,
            renew_secs: 300,
            save_interval_secs: 600,
            dump_path: PathBuf::from("coelink.dump"),
            schema: SchemaPaths::default(),
            control: ControlConfig::default(),
            send_to: None,
            fhem: None,
        }
    }
}

impl Default for SchemaPaths {
    fn default() -> Self {
        Self {
            analogue: PathBuf::from("config_analogue.json"),
            digital: PathBuf::from("config_digital.json"),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { shell: true, telnet: None, prompt: "  > ".to_string() }
    }
}

impl Default for FhemConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7072".to_string(),
            timeout_secs: 5,
            prompt: "fhem> ".to_string(),
            device: "coe".to_string(),
            create_device: false,
            alias: None,
            group: None,
            room: None,
            rate_hz: 1,
        }
    }
}

impl FhemConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GatewayConfig {
    /// Read and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoeError::file_error(path, e))?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a YAML document. An empty document yields defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: GatewayConfig = if text.trim().is_empty() {
            GatewayConfig::default()
        } else {
            serde_yaml_ng::from_str(text)
                .map_err(|e| CoeError::parse_error("gateway config", e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fifo_length == 0 {
            return Err(CoeError::Config { reason: "fifo_length must be at least 1".into() });
        }
        if self.control.telnet.is_some_and(|addr| addr == self.listen) {
            return Err(CoeError::Config {
                reason: format!("control.telnet and listen both use {}", self.listen),
            });
        }
        if let Some(fhem) = &self.fhem {
            if fhem.prompt.is_empty() {
                return Err(CoeError::Config { reason: "fhem.prompt must not be empty".into() });
            }
            if fhem.device.is_empty() || fhem.device.contains(char::is_whitespace) {
                return Err(CoeError::Config {
                    reason: format!("fhem.device '{}' is not a valid device name", fhem.device),
                });
            }
        }
        Ok(())
    }

    pub fn renew(&self) -> Duration {
        Duration::from_secs(self.renew_secs)
    }

    /// `None` when periodic saving is disabled.
    pub fn save_interval(&self) -> Option<Duration> {
        (self.save_interval_secs > 0).then(|| Duration::from_secs(self.save_interval_secs))
    }
}
