//! Unit codes carried in analogue frames

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit code byte paired with each analogue value.
///
/// The core never converts units; the description table is display data only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCode(pub u8);

/// Static description of a known unit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitInfo {
    /// Decimals the device usually transmits with this unit.
    pub decimals: u8,
    pub name: &'static str,
    pub symbol: &'static str,
}

const KNOWN_UNITS: &[(u8, UnitInfo)] = &[
    (0, UnitInfo { decimals: 0, name: "None", symbol: "" }),
    (1, UnitInfo { decimals: 1, name: "Temperature", symbol: "°C" }),
    (4, UnitInfo { decimals: 0, name: "Seconds", symbol: "s" }),
    (10, UnitInfo { decimals: 1, name: "KiloWatt", symbol: "kW" }),
    (11, UnitInfo { decimals: 1, name: "KiloWattHours", symbol: "kWh" }),
    (12, UnitInfo { decimals: 0, name: "MegaWattHours", symbol: "MWh" }),
    (23, UnitInfo { decimals: 2, name: "Pressure", symbol: "Bar" }),
];

impl UnitCode {
    pub const NONE: UnitCode = UnitCode(0);
    /// Default unit written by outbound analogue encodes.
    pub const TEMPERATURE: UnitCode = UnitCode(1);

    /// Get the raw code byte.
    pub fn code(self) -> u8 {
        self.0
    }

    /// Look up the description for this code, if it is a known one.
    pub fn info(self) -> Option<&'static UnitInfo> {
        KNOWN_UNITS.iter().find(|(code, _)| *code == self.0).map(|(_, info)| info)
    }
}

impl Default for UnitCode {
    fn default() -> Self {
        UnitCode::TEMPERATURE
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Some(info) if !info.symbol.is_empty() => f.write_str(info.symbol),
            Some(info) => f.write_str(info.name),
            None => write!(f, "unit#{}", self.0),
        }
    }
}
