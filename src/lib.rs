//! # neato-serial
//!
//! A Rust driver for the serial console of Neato robot vacuums.
//!
//! The vacuum exposes a line-based text console over USB. This library keeps
//! a session with it, recovers from connection loss, and works around the
//! firmware refusing to start cleaning while powered over USB by
//! power-cycling the USB connection after a clean command.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - One serialized session per device, safe to share between tasks
//! - Typed charger and motor telemetry with raw fallback fields
//! - USB power-cycling through a hub port or a GPIO driven relay
//! - Lifecycle events for availability reporting
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use neato_serial::{HubPort, Neato, SerialConfig, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), neato_serial::Error> {
//!     let serial = SerialConfig::from_device_list(
//!         "/dev/ttyACM0,/dev/ttyACM1",
//!         Duration::from_millis(100),
//!     )?;
//!     let neato = Neato::serial(serial, Box::new(HubPort::new(0, 2)), SessionConfig::new());
//!     neato.connect().await;
//!
//!     println!("Battery: {}%", neato.get_battery_level().await);
//!     if let Some(output) = neato.send("PlaySound 1").await {
//!         println!("{output}");
//!     }
//!
//!     neato.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Command validation and response parsing
//! - [`types`] - Telemetry records, device errors, status snapshot
//! - [`transport`] - Transport implementations (currently USB/Serial)
//! - [`power`] - USB power-cycle mechanisms
//! - [`event`] - Session lifecycle events
//! - [`config`] - TOML configuration for the bridge
//! - [`client`] - The [`Neato`] session

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod power;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{Neato, SessionConfig, Timings};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventDispatcher, Subscription};
pub use power::{HubPort, PowerSwitch, Relay, UsbSwitchMode};
pub use protocol::{Command, Query, parse_error, parse_record};
pub use transport::{SerialConfig, SerialTransport, Transport, serial::list_ports};
pub use types::{ChargerStatus, DeviceError, MotorStatus, Record, Status};
