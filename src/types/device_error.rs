//! Device error codes reported by `GetErr`.

use std::fmt;

/// Error code the firmware reports when cleaning was requested while
/// powered over USB.
pub const USB_UNPLUG_REQUIRED: u16 = 220;

/// An error reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// Error code as printed by the device.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl DeviceError {
    /// Creates a device error from its code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the numeric error code, if the code is numeric.
    #[must_use]
    pub fn code_number(&self) -> Option<u16> {
        self.code.trim().parse().ok()
    }

    /// Returns true if the device asks for USB to be unplugged before it
    /// starts cleaning.
    #[must_use]
    pub fn requires_usb_unplug(&self) -> bool {
        self.code_number() == Some(USB_UNPLUG_REQUIRED)
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code, self.message)
    }
}
