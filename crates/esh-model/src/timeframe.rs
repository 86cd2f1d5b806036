use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Ordered, uniformly spaced sequence of timesteps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NaiveDateTime>", into = "Vec<NaiveDateTime>")]
pub struct Timeframe {
    steps: Vec<NaiveDateTime>,
}

impl Timeframe {
    pub fn new(steps: Vec<NaiveDateTime>) -> ModelResult<Self> {
        if steps.is_empty() {
            return Err(ModelError::Timeframe {
                what: "timeframe has no timesteps".into(),
            });
        }
        if let Some(w) = steps.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ModelError::Timeframe {
                what: format!("timestep {} does not follow {}", w[1], w[0]),
            });
        }
        if steps.len() > 2 {
            let first = steps[1] - steps[0];
            if steps.windows(2).any(|w| w[1] - w[0] != first) {
                return Err(ModelError::Timeframe {
                    what: "timesteps are not uniformly spaced".into(),
                });
            }
        }
        Ok(Self { steps })
    }

    /// `periods` steps of `step_hours` starting at `start`.
    pub fn uniform(start: NaiveDateTime, periods: usize, step_hours: f64) -> ModelResult<Self> {
        if !step_hours.is_finite() || step_hours <= 0.0 {
            return Err(ModelError::Timeframe {
                what: format!("step length {step_hours} h must be positive"),
            });
        }
        let step = TimeDelta::seconds((step_hours * 3600.0).round() as i64);
        let steps = (0..periods)
            .map(|i| start + step * i as i32)
            .collect::<Vec<_>>();
        Self::new(steps)
    }

    pub fn hourly(start: NaiveDateTime, periods: usize) -> ModelResult<Self> {
        Self::uniform(start, periods, 1.0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[NaiveDateTime] {
        &self.steps
    }

    pub fn start(&self) -> NaiveDateTime {
        self.steps[0]
    }

    /// Duration of one timestep in hours; a single step counts as one hour.
    pub fn step_hours(&self) -> f64 {
        match self.steps.as_slice() {
            [first, second, ..] => (*second - *first).num_seconds() as f64 / 3600.0,
            _ => 1.0,
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.step_hours() * self.len() as f64
    }
}

impl TryFrom<Vec<NaiveDateTime>> for Timeframe {
    type Error = ModelError;

    fn try_from(steps: Vec<NaiveDateTime>) -> Result<Self, Self::Error> {
        Timeframe::new(steps)
    }
}

impl From<Timeframe> for Vec<NaiveDateTime> {
    fn from(timeframe: Timeframe) -> Self {
        timeframe.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn hourly_frame_has_one_hour_steps() {
        let tf = Timeframe::hourly(start(), 5).unwrap();
        assert_eq!(tf.len(), 5);
        assert_eq!(tf.step_hours(), 1.0);
        assert_eq!(tf.total_hours(), 5.0);
    }

    #[test]
    fn quarter_hour_steps() {
        let tf = Timeframe::uniform(start(), 4, 0.25).unwrap();
        assert_eq!(tf.step_hours(), 0.25);
    }

    #[test]
    fn rejects_empty_and_unordered() {
        assert!(Timeframe::new(vec![]).is_err());
        let s = start();
        assert!(Timeframe::new(vec![s, s]).is_err());
        let uneven = vec![s, s + TimeDelta::hours(1), s + TimeDelta::hours(3)];
        assert!(Timeframe::new(uneven).is_err());
    }
}
