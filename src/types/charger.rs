//! Battery and charger state from `GetCharger`.

use crate::types::Record;

/// Typed view of the `GetCharger` response.
///
/// Every field is optional because firmware revisions print different
/// subsets. Unrecognized fields stay available through [`Self::raw`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargerStatus {
    /// Battery charge in percent.
    pub fuel_percent: Option<u8>,
    /// Battery is too hot to charge.
    pub battery_over_temp: Option<bool>,
    /// Battery is charging.
    pub charging_active: Option<bool>,
    /// Charging is allowed.
    pub charging_enabled: Option<bool>,
    /// Fuel gauge is calibrated.
    pub confident_on_fuel: Option<bool>,
    /// Battery is on its reserve.
    pub on_reserved_fuel: Option<bool>,
    /// Battery is empty.
    pub empty_fuel: Option<bool>,
    /// Battery fault detected.
    pub battery_failure: Option<bool>,
    /// External power (dock or USB) is present.
    pub ext_pwr_present: Option<bool>,
    /// Battery voltage in volts.
    pub battery_volts: Option<f32>,
    /// External supply voltage in volts.
    pub external_volts: Option<f32>,
    /// Charge delivered in mAh.
    pub charger_mah: Option<i32>,
    /// All fields as printed by the device.
    pub raw: Record,
}

impl ChargerStatus {
    /// Builds the typed view from a parsed record.
    #[must_use]
    pub fn from_record(raw: Record) -> Self {
        Self {
            fuel_percent: raw.parse("FuelPercent"),
            battery_over_temp: raw.flag("BatteryOverTemp"),
            charging_active: raw.flag("ChargingActive"),
            charging_enabled: raw.flag("ChargingEnabled"),
            confident_on_fuel: raw.flag("ConfidentOnFuel"),
            on_reserved_fuel: raw.flag("OnReservedFuel"),
            empty_fuel: raw.flag("EmptyFuel"),
            battery_failure: raw.flag("BatteryFailure"),
            ext_pwr_present: raw.flag("ExtPwrPresent"),
            battery_volts: raw.parse("VBattV"),
            external_volts: raw.parse("VExtV"),
            charger_mah: raw.parse("Charger_mAH"),
            raw,
        }
    }

    /// Battery level in percent, 0 if unknown.
    #[must_use]
    pub fn battery_level(&self) -> u8 {
        self.fuel_percent.unwrap_or(0)
    }

    /// True if the battery is charging.
    #[must_use]
    pub fn is_charging(&self) -> bool {
        self.charging_active.unwrap_or(false)
    }

    /// True if the robot is docked or otherwise externally powered.
    #[must_use]
    pub fn is_docked(&self) -> bool {
        self.ext_pwr_present.unwrap_or(false)
    }
}
