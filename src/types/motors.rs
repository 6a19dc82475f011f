//! Motor state from `GetMotors`.

use crate::types::Record;

/// Typed view of the `GetMotors` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorStatus {
    /// Main brush speed.
    pub brush_rpm: Option<i32>,
    /// Main brush current.
    pub brush_ma: Option<i32>,
    /// Vacuum fan speed.
    pub vacuum_rpm: Option<u32>,
    /// Vacuum fan current.
    pub vacuum_ma: Option<i32>,
    /// Left wheel speed.
    pub left_wheel_rpm: Option<i32>,
    /// Left wheel load in percent.
    pub left_wheel_load: Option<i32>,
    /// Right wheel speed.
    pub right_wheel_rpm: Option<i32>,
    /// Right wheel load in percent.
    pub right_wheel_load: Option<i32>,
    /// Side brush current.
    pub side_brush_ma: Option<i32>,
    /// All fields as printed by the device.
    pub raw: Record,
}

impl MotorStatus {
    /// Builds the typed view from a parsed record.
    #[must_use]
    pub fn from_record(raw: Record) -> Self {
        Self {
            brush_rpm: raw.parse("Brush_RPM"),
            brush_ma: raw.parse("Brush_mA"),
            vacuum_rpm: raw.parse("Vacuum_RPM"),
            vacuum_ma: raw.parse("Vacuum_mA"),
            left_wheel_rpm: raw.parse("LeftWheel_RPM"),
            left_wheel_load: raw.parse("LeftWheel_Load%"),
            right_wheel_rpm: raw.parse("RightWheel_RPM"),
            right_wheel_load: raw.parse("RightWheel_Load%"),
            side_brush_ma: raw.parse("SideBrush_mA"),
            raw,
        }
    }

    /// Vacuum fan speed, 0 if unknown.
    #[must_use]
    pub fn vacuum_rpm(&self) -> u32 {
        self.vacuum_rpm.unwrap_or(0)
    }

    /// True if the vacuum fan is spinning.
    #[must_use]
    pub fn is_cleaning(&self) -> bool {
        self.vacuum_rpm() > 0
    }
}
