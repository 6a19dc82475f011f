//! Transport layer for Neato communication.
//!
//! This module provides the abstraction the session drives. The only real
//! implementation is USB/Serial.

pub mod serial;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

/// Trait for transport implementations.
pub trait Transport: Send {
    /// Opens the first available device and returns its path.
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Closes the device. Closing a closed transport is a no-op.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes raw bytes to the device.
    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Reads everything the device has already sent.
    fn drain(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>>;

    /// Returns true if a device is open.
    fn is_connected(&self) -> bool;
}

pub use serial::{SerialConfig, SerialTransport};
