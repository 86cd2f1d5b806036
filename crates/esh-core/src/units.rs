//! Unit convention and conversions.
//!
//! Every normalized quantity is expressed in one declared convention: power in
//! MW, energy in MWh, cost in a declared currency and emissions in tonnes of
//! CO2-equivalent. Native frameworks may declare other units as plain strings;
//! those are parsed into the typed units below and converted through `uom`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uom::si::f64::{Energy as UomEnergy, Mass as UomMass, Power as UomPower, Time as UomTime};

use crate::{CoreError, CoreResult};

// Public canonical unit types (SI, f64)
pub type Power = UomPower;
pub type Energy = UomEnergy;
pub type Mass = UomMass;
pub type Time = UomTime;

#[inline]
pub fn mw(v: f64) -> Power {
    use uom::si::power::megawatt;
    Power::new::<megawatt>(v)
}

#[inline]
pub fn mwh(v: f64) -> Energy {
    use uom::si::energy::megawatt_hour;
    Energy::new::<megawatt_hour>(v)
}

#[inline]
pub fn tonnes(v: f64) -> Mass {
    use uom::si::mass::megagram;
    Mass::new::<megagram>(v)
}

#[inline]
pub fn hours(v: f64) -> Time {
    use uom::si::time::hour;
    Time::new::<hour>(v)
}

/// Power (and capacity) units a framework may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PowerUnit {
    W,
    KW,
    MW,
    GW,
    TW,
}

impl PowerUnit {
    pub fn quantity(self, v: f64) -> Power {
        use uom::si::power::{gigawatt, kilowatt, megawatt, terawatt, watt};
        match self {
            PowerUnit::W => Power::new::<watt>(v),
            PowerUnit::KW => Power::new::<kilowatt>(v),
            PowerUnit::MW => Power::new::<megawatt>(v),
            PowerUnit::GW => Power::new::<gigawatt>(v),
            PowerUnit::TW => Power::new::<terawatt>(v),
        }
    }

    pub fn value_of(self, p: Power) -> f64 {
        use uom::si::power::{gigawatt, kilowatt, megawatt, terawatt, watt};
        match self {
            PowerUnit::W => p.get::<watt>(),
            PowerUnit::KW => p.get::<kilowatt>(),
            PowerUnit::MW => p.get::<megawatt>(),
            PowerUnit::GW => p.get::<gigawatt>(),
            PowerUnit::TW => p.get::<terawatt>(),
        }
    }

    /// Convert `v` expressed in `self` into `target`.
    pub fn convert(self, v: f64, target: PowerUnit) -> f64 {
        target.value_of(self.quantity(v))
    }

    /// The energy unit obtained by integrating this power unit over one hour.
    pub fn hourly_energy(self) -> EnergyUnit {
        match self {
            PowerUnit::W => EnergyUnit::Wh,
            PowerUnit::KW => EnergyUnit::KWh,
            PowerUnit::MW => EnergyUnit::MWh,
            PowerUnit::GW => EnergyUnit::GWh,
            PowerUnit::TW => EnergyUnit::TWh,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PowerUnit::W => "W",
            PowerUnit::KW => "kW",
            PowerUnit::MW => "MW",
            PowerUnit::GW => "GW",
            PowerUnit::TW => "TW",
        }
    }
}

impl FromStr for PowerUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim() {
            "W" | "watt" => Ok(PowerUnit::W),
            "kW" | "KW" | "kilowatt" => Ok(PowerUnit::KW),
            "MW" | "megawatt" => Ok(PowerUnit::MW),
            "GW" | "gigawatt" => Ok(PowerUnit::GW),
            "TW" | "terawatt" => Ok(PowerUnit::TW),
            other => Err(CoreError::UnknownUnit {
                unit: other.to_string(),
                quantity: "power",
            }),
        }
    }
}

/// Energy (and storage capacity) units a framework may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnergyUnit {
    Wh,
    KWh,
    MWh,
    GWh,
    TWh,
}

impl EnergyUnit {
    pub fn quantity(self, v: f64) -> Energy {
        use uom::si::energy::{gigawatt_hour, kilowatt_hour, megawatt_hour, terawatt_hour, watt_hour};
        match self {
            EnergyUnit::Wh => Energy::new::<watt_hour>(v),
            EnergyUnit::KWh => Energy::new::<kilowatt_hour>(v),
            EnergyUnit::MWh => Energy::new::<megawatt_hour>(v),
            EnergyUnit::GWh => Energy::new::<gigawatt_hour>(v),
            EnergyUnit::TWh => Energy::new::<terawatt_hour>(v),
        }
    }

    pub fn value_of(self, e: Energy) -> f64 {
        use uom::si::energy::{gigawatt_hour, kilowatt_hour, megawatt_hour, terawatt_hour, watt_hour};
        match self {
            EnergyUnit::Wh => e.get::<watt_hour>(),
            EnergyUnit::KWh => e.get::<kilowatt_hour>(),
            EnergyUnit::MWh => e.get::<megawatt_hour>(),
            EnergyUnit::GWh => e.get::<gigawatt_hour>(),
            EnergyUnit::TWh => e.get::<terawatt_hour>(),
        }
    }

    pub fn convert(self, v: f64, target: EnergyUnit) -> f64 {
        target.value_of(self.quantity(v))
    }

    pub fn symbol(self) -> &'static str {
        match self {
            EnergyUnit::Wh => "Wh",
            EnergyUnit::KWh => "kWh",
            EnergyUnit::MWh => "MWh",
            EnergyUnit::GWh => "GWh",
            EnergyUnit::TWh => "TWh",
        }
    }
}

impl FromStr for EnergyUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim() {
            "Wh" => Ok(EnergyUnit::Wh),
            "kWh" | "KWh" => Ok(EnergyUnit::KWh),
            "MWh" => Ok(EnergyUnit::MWh),
            "GWh" => Ok(EnergyUnit::GWh),
            "TWh" => Ok(EnergyUnit::TWh),
            other => Err(CoreError::UnknownUnit {
                unit: other.to_string(),
                quantity: "energy",
            }),
        }
    }
}

/// Emission mass units (CO2-equivalent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MassUnit {
    Kg,
    T,
    Kt,
    Mt,
}

impl MassUnit {
    pub fn quantity(self, v: f64) -> Mass {
        use uom::si::mass::{gigagram, kilogram, megagram, teragram};
        match self {
            MassUnit::Kg => Mass::new::<kilogram>(v),
            MassUnit::T => Mass::new::<megagram>(v),
            MassUnit::Kt => Mass::new::<gigagram>(v),
            MassUnit::Mt => Mass::new::<teragram>(v),
        }
    }

    pub fn value_of(self, m: Mass) -> f64 {
        use uom::si::mass::{gigagram, kilogram, megagram, teragram};
        match self {
            MassUnit::Kg => m.get::<kilogram>(),
            MassUnit::T => m.get::<megagram>(),
            MassUnit::Kt => m.get::<gigagram>(),
            MassUnit::Mt => m.get::<teragram>(),
        }
    }

    pub fn convert(self, v: f64, target: MassUnit) -> f64 {
        target.value_of(self.quantity(v))
    }

    pub fn symbol(self) -> &'static str {
        match self {
            MassUnit::Kg => "kg",
            MassUnit::T => "t",
            MassUnit::Kt => "kt",
            MassUnit::Mt => "Mt",
        }
    }
}

impl FromStr for MassUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        // Emission units are often suffixed with the gas, e.g. "t CO2" or "kt_CO2eq".
        let head = s
            .trim()
            .split(|c: char| c.is_whitespace() || c == '_')
            .next()
            .unwrap_or_default();
        match head {
            "kg" => Ok(MassUnit::Kg),
            "t" | "tonne" | "tonnes" => Ok(MassUnit::T),
            "kt" => Ok(MassUnit::Kt),
            "Mt" => Ok(MassUnit::Mt),
            _ => Err(CoreError::UnknownUnit {
                unit: s.to_string(),
                quantity: "mass",
            }),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = CoreError;

                fn try_from(s: String) -> CoreResult<Self> {
                    s.parse()
                }
            }

            impl From<$ty> for String {
                fn from(unit: $ty) -> String {
                    unit.symbol().to_string()
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.symbol())
                }
            }
        )*
    };
}

string_conversions!(PowerUnit, EnergyUnit, MassUnit);

/// A possibly scaled currency, e.g. `"EUR"` or `"1e6 Euro"`.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyUnit {
    pub scale: f64,
    pub code: String,
}

impl FromStr for CurrencyUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let mut parts = s.split_whitespace();
        let first = parts.next().ok_or_else(|| CoreError::UnknownUnit {
            unit: s.to_string(),
            quantity: "currency",
        })?;
        match (first.parse::<f64>(), parts.next()) {
            (Ok(scale), Some(code)) if scale.is_finite() && scale > 0.0 => Ok(Self {
                scale,
                code: code.to_string(),
            }),
            (Err(_), None) => Ok(Self {
                scale: 1.0,
                code: first.to_string(),
            }),
            _ => Err(CoreError::UnknownUnit {
                unit: s.to_string(),
                quantity: "currency",
            }),
        }
    }
}

/// The declared unit convention all normalized results are expressed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConvention {
    pub power: PowerUnit,
    pub energy: EnergyUnit,
    pub currency: String,
    pub emissions: MassUnit,
}

impl Default for UnitConvention {
    fn default() -> Self {
        Self {
            power: PowerUnit::MW,
            energy: EnergyUnit::MWh,
            currency: "EUR".to_string(),
            emissions: MassUnit::T,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_smoke() {
        let _p = mw(10.0);
        let _e = mwh(10.0);
        let _m = tonnes(1.0);
        let _h = hours(1.0);
    }

    #[test]
    fn power_conversion_goes_through_uom() {
        assert!((PowerUnit::GW.convert(1.5, PowerUnit::MW) - 1500.0).abs() < 1e-9);
        assert!((PowerUnit::KW.convert(2500.0, PowerUnit::MW) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn energy_and_mass_conversion() {
        assert!((EnergyUnit::GWh.convert(2.0, EnergyUnit::MWh) - 2000.0).abs() < 1e-9);
        assert!((MassUnit::Kt.convert(1.0, MassUnit::T) - 1000.0).abs() < 1e-9);
        assert!((MassUnit::Kg.convert(500.0, MassUnit::T) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn units_parse_from_native_strings() {
        assert_eq!("MW".parse::<PowerUnit>().unwrap(), PowerUnit::MW);
        assert_eq!("kWh".parse::<EnergyUnit>().unwrap(), EnergyUnit::KWh);
        assert_eq!("kt CO2".parse::<MassUnit>().unwrap(), MassUnit::Kt);
        assert!("furlong".parse::<PowerUnit>().is_err());
    }

    #[test]
    fn currency_with_scale() {
        let c: CurrencyUnit = "1e6 Euro".parse().unwrap();
        assert_eq!(c.scale, 1e6);
        assert_eq!(c.code, "Euro");

        let plain: CurrencyUnit = "EUR".parse().unwrap();
        assert_eq!(plain.scale, 1.0);
        assert!("1e6".parse::<CurrencyUnit>().is_err());
    }

    #[test]
    fn power_units_round_trip_through_serde_strings() {
        let s: String = PowerUnit::GW.into();
        assert_eq!(PowerUnit::try_from(s).unwrap(), PowerUnit::GW);
    }
}
