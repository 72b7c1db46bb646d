//! Battery state reported by a synth in its sync reply (the `y` field).
//!
//! The byte is a bitmask: the low nibble holds charge state flags, the high
//! nibble holds voltage level flags.  If more than one flag in a nibble is
//! set the last one checked wins, in the same order the synth firmware and
//! existing tooling check them.
use serde::Serialize;
use std::fmt;

pub const BATTERY_STATE_CHARGING: u8 = 0x01;
pub const BATTERY_STATE_CHARGED: u8 = 0x02;
pub const BATTERY_STATE_DISCHARGING: u8 = 0x04;
pub const BATTERY_STATE_LOW: u8 = 0x08;
pub const BATTERY_VOLTAGE_4: u8 = 0x10;
pub const BATTERY_VOLTAGE_3: u8 = 0x20;
pub const BATTERY_VOLTAGE_2: u8 = 0x40;
pub const BATTERY_VOLTAGE_1: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeState {
    Unknown,
    Charging,
    Charged,
    Discharging,
    Low,
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ChargeState::Unknown => "unknown",
            ChargeState::Charging => "charging",
            ChargeState::Charged => "charged",
            ChargeState::Discharging => "discharging",
            ChargeState::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// Decoded battery byte.  level is 0 (unknown) to 4 (full)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryStatus {
    pub state: ChargeState,
    pub level: u8,
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}/4)", self.state, self.level)
    }
}

pub fn decode_battery_mask(mask: u8) -> BatteryStatus {
    let mut state = ChargeState::Unknown;
    let mut level = 0;
    if mask & BATTERY_STATE_CHARGING != 0 {
        state = ChargeState::Charging;
    }
    if mask & BATTERY_STATE_CHARGED != 0 {
        state = ChargeState::Charged;
    }
    if mask & BATTERY_STATE_DISCHARGING != 0 {
        state = ChargeState::Discharging;
    }
    if mask & BATTERY_STATE_LOW != 0 {
        state = ChargeState::Low;
    }
    if mask & BATTERY_VOLTAGE_4 != 0 {
        level = 4;
    }
    if mask & BATTERY_VOLTAGE_3 != 0 {
        level = 3;
    }
    if mask & BATTERY_VOLTAGE_2 != 0 {
        level = 2;
    }
    if mask & BATTERY_VOLTAGE_1 != 0 {
        level = 1;
    }
    BatteryStatus { state, level }
}
