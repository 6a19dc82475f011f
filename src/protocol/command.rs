//! Commands for the Neato serial console.
//!
//! The console accepts one ASCII command per line. Commands are sent as text
//! terminated by a line feed; there is no framing or acknowledgment.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Throwaway command sent to prime the device before a real command.
pub const WAKE_PROBE: &str = "wake-up";

/// Command that starts a house cleaning cycle.
pub const CLEAN: &str = "Clean";

/// Status queries used by the typed accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// Accelerometer readings.
    GetAccel,
    /// Analog sensor readings.
    GetAnalogSensors,
    /// Button states.
    GetButtons,
    /// Calibration info.
    GetCalInfo,
    /// Battery and charger state.
    GetCharger,
    /// Digital sensor readings.
    GetDigitalSensors,
    /// Current error, if any.
    GetErr,
    /// Lidar scan.
    GetLDSScan,
    /// Motor state.
    GetMotors,
    /// Firmware and hardware versions.
    GetVersion,
}

impl Query {
    /// Returns the command text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetAccel => "GetAccel",
            Self::GetAnalogSensors => "GetAnalogSensors",
            Self::GetButtons => "GetButtons",
            Self::GetCalInfo => "GetCalInfo",
            Self::GetCharger => "GetCharger",
            Self::GetDigitalSensors => "GetDigitalSensors",
            Self::GetErr => "GetErr",
            Self::GetLDSScan => "GetLDSScan",
            Self::GetMotors => "GetMotors",
            Self::GetVersion => "GetVersion",
        }
    }
}

/// A single validated command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Creates a command from text.
    ///
    /// Surrounding whitespace is trimmed. The remaining text must be
    /// non-empty ASCII without line breaks.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(Error::InvalidCommand {
                reason: "command is empty".into(),
            });
        }
        if !text.is_ascii() {
            return Err(Error::InvalidCommand {
                reason: format!("command {text:?} is not ASCII"),
            });
        }
        if text.contains(['\r', '\n']) {
            return Err(Error::InvalidCommand {
                reason: format!("command {text:?} spans multiple lines"),
            });
        }
        Ok(Self(text.to_owned()))
    }

    /// Returns the command text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this command starts a cleaning cycle.
    ///
    /// Matches `Clean` and `Clean <mode>` case-insensitively, except
    /// `Clean Stop`.
    #[must_use]
    pub fn starts_cleaning(&self) -> bool {
        let mut words = self.0.split_ascii_whitespace();
        let is_clean = words
            .next()
            .is_some_and(|word| word.eq_ignore_ascii_case(CLEAN));
        let is_stop = words
            .next()
            .is_some_and(|word| word.eq_ignore_ascii_case("stop"));
        is_clean && !is_stop
    }

    /// Encodes the command as a line-feed terminated line.
    #[must_use]
    pub fn to_line(&self) -> Bytes {
        encode_line(&self.0)
    }
}

impl From<Query> for Command {
    fn from(query: Query) -> Self {
        Self(query.as_str().to_owned())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes text as a line-feed terminated line.
#[must_use]
pub fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}
