//! Status snapshot published by the MQTT bridge.

use serde::Serialize;

/// One polling cycle worth of telemetry.
///
/// The fields are collected by independent device round trips, so they may
/// describe slightly different moments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Battery charge in percent.
    pub battery_level: u8,
    /// External power present.
    pub docked: bool,
    /// Vacuum fan is spinning.
    pub cleaning: bool,
    /// Battery is charging.
    pub charging: bool,
    /// Vacuum fan speed in RPM.
    pub fan_speed: u32,
    /// Current device error message, if any.
    pub error: Option<String>,
}
