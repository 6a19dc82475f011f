//! USB power-cycling.
//!
//! The Neato firmware refuses to start cleaning while it is powered over
//! USB. Cutting USB power briefly after sending `Clean` kicks the clean-start
//! logic. Two mechanisms are supported:
//!
//! - [`HubPort`]: switch the port off and on through the hub control tool
//! - [`Relay`]: open and close a relay in the USB power line via GPIO

pub mod hub;
pub mod relay;

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::Result;

pub use hub::HubPort;
pub use relay::Relay;

/// Mechanism used to power-cycle the USB connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsbSwitchMode {
    /// Switch the USB hub port directly.
    #[default]
    Direct,
    /// Switch a relay wired into the USB power line.
    Relay,
}

/// Trait for power-cycle implementations.
pub trait PowerSwitch: Send + Sync {
    /// Cuts power to the device and restores it.
    fn toggle(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
