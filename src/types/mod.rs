//! Data types for Neato telemetry.
//!
//! - Raw key/value records
//! - Typed charger and motor status
//! - Device error codes
//! - The status snapshot published over MQTT

pub mod charger;
pub mod device_error;
pub mod motors;
pub mod record;
pub mod status;

pub use charger::ChargerStatus;
pub use device_error::{DeviceError, USB_UNPLUG_REQUIRED};
pub use motors::MotorStatus;
pub use record::Record;
pub use status::Status;
