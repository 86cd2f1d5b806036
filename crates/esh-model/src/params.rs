//! Parameter value types shared by nodes and flows.
//!
//! Every parameter validates itself on construction, so a built
//! [`EnergySystem`](crate::EnergySystem) never carries inverted bounds,
//! negative efficiencies or NaN.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("minimum {min} must be finite and non-negative")]
    InvalidMinimum { min: f64 },
    #[error("maximum {max} is below minimum {min}")]
    Inverted { min: f64, max: f64 },
    #[error("{what} must be finite and non-negative, got {value}")]
    Negative { what: &'static str, value: f64 },
    #[error("efficiency must be finite and positive, got {value}")]
    Efficiency { value: f64 },
    #[error("fraction {what} must lie in [0, 1], got {value}")]
    Fraction { what: &'static str, value: f64 },
    #[error("profile series have different lengths ({min} vs {max})")]
    ProfileShape { min: usize, max: usize },
    #[error("efficiency series is empty")]
    EmptySeries,
}

pub(crate) fn non_negative(what: &'static str, value: f64) -> Result<f64, ParamError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ParamError::Negative { what, value })
    }
}

pub(crate) fn fraction(what: &'static str, value: f64) -> Result<f64, ParamError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParamError::Fraction { what, value })
    }
}

pub(crate) fn efficiency(value: f64) -> Result<f64, ParamError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ParamError::Efficiency { value })
    }
}

/// Serialized form of an optionally infinite upper limit.
///
/// `max: null` (or a missing `max`) means unbounded, since JSON has no
/// infinity literal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RawBounds {
    #[serde(default)]
    min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
}

/// Closed interval `[min, max]` with `0 <= min <= max`; `max` may be infinite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct Bounds {
    min: f64,
    max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Result<Self, ParamError> {
        if !min.is_finite() || min < 0.0 {
            return Err(ParamError::InvalidMinimum { min });
        }
        if max.is_nan() || max < min {
            return Err(ParamError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    pub fn up_to(max: f64) -> Result<Self, ParamError> {
        Self::new(0.0, max)
    }

    pub fn fixed(value: f64) -> Result<Self, ParamError> {
        Self::new(value, value)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// True when the upper limit is finite.
    pub fn is_bounded(&self) -> bool {
        self.max.is_finite()
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, value: f64, abs_tol: f64) -> bool {
        value >= self.min - abs_tol && value <= self.max + abs_tol
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TryFrom<RawBounds> for Bounds {
    type Error = ParamError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Bounds::new(raw.min, raw.max.unwrap_or(f64::INFINITY))
    }
}

impl From<Bounds> for RawBounds {
    fn from(bounds: Bounds) -> Self {
        RawBounds {
            min: bounds.min,
            max: bounds.is_bounded().then_some(bounds.max),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RawExpansion {
    #[serde(default)]
    costs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_capacity: Option<f64>,
}

/// Capacity expansion option: specific cost per unit of added capacity and
/// the largest total capacity allowed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpansion", into = "RawExpansion")]
pub struct Expansion {
    costs: f64,
    max_capacity: f64,
}

impl Expansion {
    pub fn new(costs: f64, max_capacity: f64) -> Result<Self, ParamError> {
        let costs = non_negative("expansion costs", costs)?;
        if max_capacity.is_nan() || max_capacity < 0.0 {
            return Err(ParamError::Negative {
                what: "maximum capacity",
                value: max_capacity,
            });
        }
        Ok(Self {
            costs,
            max_capacity,
        })
    }

    pub fn costs(&self) -> f64 {
        self.costs
    }

    pub fn max_capacity(&self) -> f64 {
        self.max_capacity
    }
}

impl TryFrom<RawExpansion> for Expansion {
    type Error = ParamError;

    fn try_from(raw: RawExpansion) -> Result<Self, Self::Error> {
        Expansion::new(raw.costs, raw.max_capacity.unwrap_or(f64::INFINITY))
    }
}

impl From<Expansion> for RawExpansion {
    fn from(expansion: Expansion) -> Self {
        RawExpansion {
            costs: expansion.costs,
            max_capacity: expansion
                .max_capacity
                .is_finite()
                .then_some(expansion.max_capacity),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawEfficiency {
    Constant(f64),
    Varying(Vec<f64>),
}

/// Conversion efficiency, constant or one value per timestep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEfficiency", into = "RawEfficiency")]
pub enum Efficiency {
    Constant(f64),
    Varying(Vec<f64>),
}

impl Efficiency {
    pub fn constant(value: f64) -> Result<Self, ParamError> {
        Ok(Self::Constant(efficiency(value)?))
    }

    pub fn varying(values: Vec<f64>) -> Result<Self, ParamError> {
        if values.is_empty() {
            return Err(ParamError::EmptySeries);
        }
        for v in &values {
            efficiency(*v)?;
        }
        Ok(Self::Varying(values))
    }

    /// Value at timestep `t`; constant efficiencies ignore `t`.
    pub fn at(&self, t: usize) -> f64 {
        match self {
            Efficiency::Constant(v) => *v,
            Efficiency::Varying(values) => values.get(t).copied().unwrap_or(f64::NAN),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Efficiency::Constant(v) => *v,
            Efficiency::Varying(values) => esh_core::mean(values).unwrap_or(f64::NAN),
        }
    }

    pub fn is_varying(&self) -> bool {
        matches!(self, Efficiency::Varying(values) if values.windows(2).any(|w| w[0] != w[1]))
    }

    /// Series length, `None` for a constant.
    pub fn series_len(&self) -> Option<usize> {
        match self {
            Efficiency::Constant(_) => None,
            Efficiency::Varying(values) => Some(values.len()),
        }
    }
}

impl TryFrom<RawEfficiency> for Efficiency {
    type Error = ParamError;

    fn try_from(raw: RawEfficiency) -> Result<Self, Self::Error> {
        match raw {
            RawEfficiency::Constant(v) => Efficiency::constant(v),
            RawEfficiency::Varying(values) => Efficiency::varying(values),
        }
    }
}

impl From<Efficiency> for RawEfficiency {
    fn from(efficiency: Efficiency) -> Self {
        match efficiency {
            Efficiency::Constant(v) => RawEfficiency::Constant(v),
            Efficiency::Varying(values) => RawEfficiency::Varying(values),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RawProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fix: Option<Vec<f64>>,
}

/// Absolute per-timestep flow limits of a source or sink.
///
/// A profile whose minimum equals its maximum at every step is fixed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile", into = "RawProfile")]
pub struct Profile {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Profile {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self, ParamError> {
        if min.len() != max.len() {
            return Err(ParamError::ProfileShape {
                min: min.len(),
                max: max.len(),
            });
        }
        for (lo, hi) in min.iter().zip(&max) {
            Bounds::new(*lo, *hi)?;
        }
        Ok(Self { min, max })
    }

    pub fn fixed(values: Vec<f64>) -> Result<Self, ParamError> {
        Self::new(values.clone(), values)
    }

    pub fn upper(values: Vec<f64>) -> Result<Self, ParamError> {
        Self::new(vec![0.0; values.len()], values)
    }

    pub fn len(&self) -> usize {
        self.max.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max.is_empty()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn has_positive_minimum(&self) -> bool {
        self.min.iter().any(|v| *v > 0.0)
    }

    pub fn is_all_zero(&self) -> bool {
        self.max.iter().all(|v| *v == 0.0)
    }
}

impl TryFrom<RawProfile> for Profile {
    type Error = ParamError;

    fn try_from(raw: RawProfile) -> Result<Self, Self::Error> {
        match (raw.fix, raw.min, raw.max) {
            (Some(fix), _, _) => Profile::fixed(fix),
            (None, min, Some(max)) => {
                let min = min.unwrap_or_else(|| vec![0.0; max.len()]);
                Profile::new(min, max)
            }
            (None, Some(min), None) => {
                let max = vec![f64::INFINITY; min.len()];
                Profile::new(min, max)
            }
            (None, None, None) => Err(ParamError::EmptySeries),
        }
    }
}

impl From<Profile> for RawProfile {
    fn from(profile: Profile) -> Self {
        if profile.is_fixed() {
            RawProfile {
                fix: Some(profile.max),
                ..RawProfile::default()
            }
        } else {
            RawProfile {
                min: Some(profile.min),
                max: Some(profile.max),
                fix: None,
            }
        }
    }
}

/// A value with distinct forward and backward settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directional<T> {
    pub forward: T,
    pub backward: T,
}

impl<T: Clone> Directional<T> {
    pub fn symmetric(value: T) -> Self {
        Self {
            forward: value.clone(),
            backward: value,
        }
    }
}

/// What happens to the storage level between the last and first timestep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocPolicy {
    /// Final level must equal the initial level.
    Cyclic,
    /// Final level is free.
    #[default]
    Free,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_reject_inverted_and_negative() {
        assert!(matches!(
            Bounds::new(5.0, 1.0),
            Err(ParamError::Inverted { .. })
        ));
        assert!(matches!(
            Bounds::new(-1.0, 1.0),
            Err(ParamError::InvalidMinimum { .. })
        ));
        assert!(Bounds::new(0.0, f64::NAN).is_err());
        assert!(Bounds::new(0.0, f64::INFINITY).is_ok());
    }

    #[test]
    fn unbounded_max_round_trips_through_json() {
        let json = serde_json::to_string(&Bounds::unbounded()).unwrap();
        assert_eq!(json, r#"{"min":0.0}"#);
        let back: Bounds = serde_json::from_str(&json).unwrap();
        assert!(!back.is_bounded());

        let err = serde_json::from_str::<Bounds>(r#"{"min":3,"max":1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn efficiency_accepts_scalar_or_series() {
        let c: Efficiency = serde_json::from_str("0.42").unwrap();
        assert_eq!(c, Efficiency::Constant(0.42));
        let v: Efficiency = serde_json::from_str("[0.4, 0.5]").unwrap();
        assert!(v.is_varying());
        assert!((v.mean() - 0.45).abs() < 1e-12);
        assert!(serde_json::from_str::<Efficiency>("-0.1").is_err());
        assert!(serde_json::from_str::<Efficiency>("[]").is_err());
    }

    #[test]
    fn profile_shortcuts() {
        let p: Profile = serde_json::from_str(r#"{"fix":[10,10]}"#).unwrap();
        assert!(p.is_fixed());
        assert!(p.has_positive_minimum());

        let p: Profile = serde_json::from_str(r#"{"max":[0,0]}"#).unwrap();
        assert!(p.is_all_zero());
        assert!(!p.has_positive_minimum());

        assert!(matches!(
            Profile::new(vec![0.0], vec![1.0, 2.0]),
            Err(ParamError::ProfileShape { .. })
        ));
    }

    #[test]
    fn soc_policy_defaults_to_free() {
        assert_eq!(SocPolicy::default(), SocPolicy::Free);
        let p: SocPolicy = serde_json::from_str(r#""cyclic""#).unwrap();
        assert_eq!(p, SocPolicy::Cyclic);
    }
}
