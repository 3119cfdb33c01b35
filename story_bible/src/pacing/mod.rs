//! Pacing primitives: tension levels, categories, and the thresholds between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Tension on the 0-10 scale. Always within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct TensionLevel(u8);

impl TensionLevel {
    pub const MIN: TensionLevel = TensionLevel(0);
    pub const MAX: TensionLevel = TensionLevel(10);

    /// Build a level, clamping into `0..=10`.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 10) as u8)
    }

    /// Round a continuous score onto the scale.
    pub fn from_score(score: f32) -> Self {
        if score.is_nan() {
            return Self::MIN;
        }
        Self::new(score.round() as i64)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<i64> for TensionLevel {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<TensionLevel> for u8 {
    fn from(level: TensionLevel) -> Self {
        level.0
    }
}

impl fmt::Display for TensionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse tension bucket derived from a [`TensionLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensionCategory {
    Calm,
    Rising,
    High,
    Climactic,
}

impl TensionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensionCategory::Calm => "calm",
            TensionCategory::Rising => "rising",
            TensionCategory::High => "high",
            TensionCategory::Climactic => "climactic",
        }
    }
}

impl fmt::Display for TensionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for threshold sets that do not partition the scale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("tension thresholds must increase strictly: calm_max {calm_max} < rising_max {rising_max} < high_max {high_max}")]
    NotIncreasing {
        calm_max: u8,
        rising_max: u8,
        high_max: u8,
    },

    #[error("high_max {0} leaves no room for the climactic band (must be < 10)")]
    NoClimacticBand(u8),
}

/// Inclusive upper bounds of the lower three categories.
///
/// Levels `0..=calm_max` are calm, `..=rising_max` rising, `..=high_max` high,
/// and everything above is climactic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensionThresholds {
    pub calm_max: u8,
    pub rising_max: u8,
    pub high_max: u8,
}

impl Default for TensionThresholds {
    fn default() -> Self {
        Self {
            calm_max: 3,
            rising_max: 6,
            high_max: 8,
        }
    }
}

impl TensionThresholds {
    /// Check that the bands cover `0..=10` with no gaps or overlaps.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if !(self.calm_max < self.rising_max && self.rising_max < self.high_max) {
            return Err(ThresholdError::NotIncreasing {
                calm_max: self.calm_max,
                rising_max: self.rising_max,
                high_max: self.high_max,
            });
        }
        if self.high_max >= TensionLevel::MAX.value() {
            return Err(ThresholdError::NoClimacticBand(self.high_max));
        }
        Ok(())
    }

    pub fn categorize(&self, level: TensionLevel) -> TensionCategory {
        let value = level.value();
        if value <= self.calm_max {
            TensionCategory::Calm
        } else if value <= self.rising_max {
            TensionCategory::Rising
        } else if value <= self.high_max {
            TensionCategory::High
        } else {
            TensionCategory::Climactic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partitions(thresholds: TensionThresholds) {
        thresholds.validate().unwrap();
        let mut previous = TensionCategory::Calm;
        let mut seen = std::collections::HashSet::new();
        for value in 0..=10 {
            let category = thresholds.categorize(TensionLevel::new(value));
            // Categories never go backwards as the level rises.
            assert!(category >= previous);
            previous = category;
            seen.insert(category);
        }
        assert_eq!(seen.len(), 4, "every band should be reachable");
    }

    #[test]
    fn test_level_clamping() {
        assert_eq!(TensionLevel::new(-4).value(), 0);
        assert_eq!(TensionLevel::new(42).value(), 10);
        assert_eq!(TensionLevel::from_score(6.5).value(), 7);
        assert_eq!(TensionLevel::from_score(f32::NAN).value(), 0);
    }

    #[test]
    fn test_default_thresholds_partition() {
        assert_partitions(TensionThresholds::default());
    }

    #[test]
    fn test_custom_thresholds_partition() {
        assert_partitions(TensionThresholds {
            calm_max: 0,
            rising_max: 1,
            high_max: 2,
        });
        assert_partitions(TensionThresholds {
            calm_max: 5,
            rising_max: 7,
            high_max: 9,
        });
    }

    #[test]
    fn test_invalid_thresholds() {
        let overlapping = TensionThresholds {
            calm_max: 4,
            rising_max: 4,
            high_max: 8,
        };
        assert!(matches!(
            overlapping.validate(),
            Err(ThresholdError::NotIncreasing { .. })
        ));

        let no_top = TensionThresholds {
            calm_max: 3,
            rising_max: 6,
            high_max: 10,
        };
        assert_eq!(no_top.validate(), Err(ThresholdError::NoClimacticBand(10)));
    }

    #[test]
    fn test_level_serde_clamps() {
        let level: TensionLevel = serde_json::from_str("14").unwrap();
        assert_eq!(level, TensionLevel::MAX);
        assert_eq!(serde_json::to_string(&TensionLevel::new(7)).unwrap(), "7");
    }
}
