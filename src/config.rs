//! Configuration file for the bridge.
//!
//! Settings are read from TOML:
//!
//! ```toml
//! [serial]
//! serial_device = "/dev/ttyACM0,/dev/ttyACM1"
//! timeout_seconds = 0.1
//! usb_switch_mode = "relay"
//! relay_gpio = 17
//!
//! [mqtt]
//! host = "broker.local"
//! state_topic = "neato/state"
//! command_topic = "neato/command"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::client::{SessionConfig, Timings};
use crate::error::{Error, Result};
use crate::power::{HubPort, Relay, UsbSwitchMode};
use crate::transport::SerialConfig;

/// Complete configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Device and power switching settings.
    pub serial: SerialSettings,
    /// Broker and topic settings.
    pub mqtt: MqttSettings,
}

impl Config {
    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("reading {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialSettings {
    /// Comma separated device candidates, tried in order.
    pub serial_device: String,
    /// Read timeout in seconds. Must be positive.
    pub timeout_seconds: f64,
    /// Power-cycle mechanism.
    #[serde(default)]
    pub usb_switch_mode: UsbSwitchMode,
    /// Reboot the host after switching the hub port.
    #[serde(default)]
    pub reboot_after_usb_switch: bool,
    /// BCM pin driving the relay.
    #[serde(default = "default_relay_gpio")]
    pub relay_gpio: u32,
    /// Hub number passed to the hub control tool.
    #[serde(default)]
    pub hub: u32,
    /// Hub port the Neato is plugged into.
    #[serde(default = "default_hub_port")]
    pub hub_port: u32,
    /// Hub control program and leading arguments.
    #[serde(default = "default_hub_ctrl")]
    pub hub_ctrl: Vec<String>,
    /// Resend a clean command once if the vacuum is not spinning after it.
    #[serde(default)]
    pub resend_if_not_cleaning: bool,
    /// Power-cycle and resend `Clean` when the device reports error 220.
    #[serde(default = "default_true")]
    pub recover_on_unplug_error: bool,
    /// Settle delays.
    #[serde(default)]
    pub timings: TimingSettings,
}

fn default_relay_gpio() -> u32 {
    17
}
fn default_hub_port() -> u32 {
    2
}
fn default_hub_ctrl() -> Vec<String> {
    crate::power::hub::DEFAULT_HUB_CTRL
        .iter()
        .map(ToString::to_string)
        .collect()
}
fn default_true() -> bool {
    true
}

impl SerialSettings {
    /// Builds the transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeoutNotConfigured`] if the timeout is zero and
    /// [`Error::Config`] if it is negative or not a number.
    pub fn serial_config(&self) -> Result<SerialConfig> {
        let timeout =
            Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| Error::Config {
                message: format!("invalid timeout_seconds {}: {e}", self.timeout_seconds),
            })?;
        SerialConfig::from_device_list(&self.serial_device, timeout)
    }

    /// Builds the session configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .timings(self.timings.to_timings())
            .resend_if_not_cleaning(self.resend_if_not_cleaning)
            .recover_on_unplug_error(self.recover_on_unplug_error)
    }

    /// Builds the hub port switch used in direct mode.
    #[must_use]
    pub fn hub_switch(&self) -> HubPort {
        let hub = HubPort::new(self.hub, self.hub_port)
            .tool(self.hub_ctrl.clone())
            .off_time(Duration::from_millis(self.timings.hub_port_off_ms));
        if self.reboot_after_usb_switch {
            hub.reboot_after_switch()
        } else {
            hub
        }
    }

    /// Builds the relay switch used in relay mode.
    #[must_use]
    pub fn relay_switch(&self) -> Relay {
        Relay::new(self.relay_gpio).off_time(Duration::from_millis(self.timings.relay_off_ms))
    }
}

/// `[serial.timings]` section, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Wait after the wake probe.
    pub wake_settle_ms: u64,
    /// Wait after a command before reading.
    pub command_settle_ms: u64,
    /// Wait before reopening the port.
    pub reconnect_settle_ms: u64,
    /// Wait after a power cycle before reconnecting.
    pub toggle_settle_ms: u64,
    /// Wait for the device to boot after a clean power cycle.
    pub clean_boot_ms: u64,
    /// Time the relay stays open.
    pub relay_off_ms: u64,
    /// Time the hub port stays unpowered.
    pub hub_port_off_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let timings = Timings::default();
        Self {
            wake_settle_ms: millis(timings.wake_settle),
            command_settle_ms: millis(timings.command_settle),
            reconnect_settle_ms: millis(timings.reconnect_settle),
            toggle_settle_ms: millis(timings.toggle_settle),
            clean_boot_ms: millis(timings.clean_boot),
            relay_off_ms: millis(crate::power::relay::DEFAULT_OFF_TIME),
            hub_port_off_ms: millis(crate::power::hub::DEFAULT_OFF_TIME),
        }
    }
}

impl TimingSettings {
    /// Converts to session timings.
    #[must_use]
    pub const fn to_timings(self) -> Timings {
        Timings {
            wake_settle: Duration::from_millis(self.wake_settle_ms),
            command_settle: Duration::from_millis(self.command_settle_ms),
            reconnect_settle: Duration::from_millis(self.reconnect_settle_ms),
            toggle_settle: Duration::from_millis(self.toggle_settle_ms),
            clean_boot: Duration::from_millis(self.clean_boot_ms),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `[mqtt]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// User name, if the broker requires authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password, if the broker requires authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic carrying raw commands for the device.
    #[serde(default = "default_command_topic")]
    pub command_topic: String,
    /// Topic the status snapshot is published to.
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
    /// Topic command output is published to.
    #[serde(default = "default_response_topic")]
    pub response_topic: String,
    /// Topic carrying `online`/`offline`.
    #[serde(default = "default_availability_topic")]
    pub availability_topic: String,
    /// Pause between status snapshots.
    #[serde(default = "default_publish_wait")]
    pub publish_wait_seconds: u64,
    /// MQTT keep-alive interval.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "neato-serial".to_string()
}
fn default_command_topic() -> String {
    "neato/command".to_string()
}
fn default_state_topic() -> String {
    "neato/state".to_string()
}
fn default_response_topic() -> String {
    "neato/response".to_string()
}
fn default_availability_topic() -> String {
    "neato/availability".to_string()
}
fn default_publish_wait() -> u64 {
    30
}
fn default_keep_alive() -> u64 {
    30
}
