//! Unit newtypes and the per-unit base used by the network's normalized view.
//!
//! The network stores every quantity in engineering units (MW, Mvar, kV, Ω, S,
//! A, degrees). When the per-unit view is active, snapshots are divided by the
//! bases below and batched updates are multiplied back.
//!
//! | Quantity  | Base                                  |
//! |-----------|---------------------------------------|
//! | Power     | `sn` (MVA)                            |
//! | Voltage   | nominal voltage of the voltage level  |
//! | Impedance | `nominal_v² / sn`                     |
//! | Admittance| `sn / nominal_v²`                     |
//! | Current   | `sn / (√3 · nominal_v)` (kA)          |
//! | Angle     | radians                               |
//!
//! ```
//! use gridopf_core::units::{Degrees, Megawatts, PerUnitBase};
//!
//! let base = PerUnitBase::default();
//! assert_eq!(base.power(Megawatts(50.0)).value(), 0.5);
//! assert!((Degrees(180.0).to_radians().value() - std::f64::consts::PI).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nominal apparent power used as the network-wide power base.
pub const NOMINAL_APPARENT_POWER: f64 = 100.0;

macro_rules! unit {
    ($(#[$doc:meta])* $name:ident, $symbol:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub f64);

        impl $name {
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.0, $symbol)
            }
        }
    };
}

unit!(
    /// Active or reactive power, MW / Mvar
    Megawatts,
    "MW"
);
unit!(MegavoltAmperes, "MVA");
unit!(Kilovolts, "kV");
unit!(Ohms, "Ω");
unit!(Siemens, "S");
unit!(Amperes, "A");
unit!(
    /// Normalized quantity, see the module table for its base
    PerUnit,
    "pu"
);
unit!(Radians, "rad");
unit!(Degrees, "°");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

/// Bases for converting between engineering units and per-unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerUnitBase {
    pub sn: MegavoltAmperes,
}

impl Default for PerUnitBase {
    fn default() -> Self {
        Self {
            sn: MegavoltAmperes(NOMINAL_APPARENT_POWER),
        }
    }
}

impl PerUnitBase {
    #[inline]
    pub fn power(&self, p: Megawatts) -> PerUnit {
        PerUnit(p.0 / self.sn.0)
    }

    #[inline]
    pub fn power_from_pu(&self, p: PerUnit) -> Megawatts {
        Megawatts(p.0 * self.sn.0)
    }

    #[inline]
    pub fn voltage(&self, v: Kilovolts, nominal_v: Kilovolts) -> PerUnit {
        PerUnit(v.0 / nominal_v.0)
    }

    #[inline]
    pub fn voltage_from_pu(&self, v: PerUnit, nominal_v: Kilovolts) -> Kilovolts {
        Kilovolts(v.0 * nominal_v.0)
    }

    #[inline]
    pub fn impedance(&self, z: Ohms, nominal_v: Kilovolts) -> PerUnit {
        PerUnit(z.0 * self.sn.0 / (nominal_v.0 * nominal_v.0))
    }

    #[inline]
    pub fn admittance(&self, y: Siemens, nominal_v: Kilovolts) -> PerUnit {
        PerUnit(y.0 * nominal_v.0 * nominal_v.0 / self.sn.0)
    }

    /// Base current in kA for a voltage level.
    #[inline]
    pub fn base_current_ka(&self, nominal_v: Kilovolts) -> f64 {
        self.sn.0 / (3f64.sqrt() * nominal_v.0)
    }

    #[inline]
    pub fn current(&self, i: Amperes, nominal_v: Kilovolts) -> PerUnit {
        PerUnit(i.0 / 1000.0 / self.base_current_ka(nominal_v))
    }

    #[inline]
    pub fn current_from_pu(&self, i: PerUnit, nominal_v: Kilovolts) -> Amperes {
        Amperes(i.0 * self.base_current_ka(nominal_v) * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_base() {
        let base = PerUnitBase::default();
        assert_eq!(base.power(Megawatts(250.0)), PerUnit(2.5));
        assert_eq!(base.power_from_pu(PerUnit(-0.5)).to_string(), "-50 MW");
    }

    #[test]
    fn test_impedance_and_admittance_are_reciprocal_bases() {
        let base = PerUnitBase::default();
        let nominal = Kilovolts(400.0);
        // z_base = 400² / 100 = 1600 Ω
        assert!((base.impedance(Ohms(16.0), nominal).value() - 0.01).abs() < 1e-12);
        assert!((base.admittance(Siemens(1.0 / 1600.0), nominal).value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_current_round_trip() {
        let base = PerUnitBase::default();
        let nominal = Kilovolts(225.0);
        let i = Amperes(1200.0);
        let back = base.current_from_pu(base.current(i, nominal), nominal);
        assert!((back.value() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_conversion() {
        let rad = Degrees(90.0).to_radians();
        assert!((rad.value() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((rad.to_degrees().value() - 90.0).abs() < 1e-12);
    }
}
