// ng_demand - Natural gas demand index from api.weather.gov forecasts
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::index::DemandIndex;
use serde::Serialize;
use std::fmt;

const BULLISH_PCT: f64 = 5.0;
const MILD_BULLISH_PCT: f64 = 2.0;
const NEUTRAL_FLOOR_PCT: f64 = -2.0;
const MILD_BEARISH_FLOOR_PCT: f64 = -5.0;

const STRONG_BULLISH_INDEX: f64 = 70.0;
const BULLISH_INDEX: f64 = 55.0;

/// Qualitative trader bias, ordered from most bearish to most bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BiasLabel {
    Bearish,
    MildBearish,
    Neutral,
    MildBullish,
    Bullish,
    StrongBullish,
}

impl fmt::Display for BiasLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bearish => "Bearish",
            Self::MildBearish => "Mild Bearish",
            Self::Neutral => "Neutral",
            Self::MildBullish => "Mild Bullish",
            Self::Bullish => "Bullish",
            Self::StrongBullish => "Strong Bullish",
        };

        write!(f, "{}", s)
    }
}

/// Strategy for deriving a bias label from the demand index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiasPolicy {
    /// Percent change of demand between the next 24 hours and the following 24 hours.
    #[default]
    Relative,
    /// Fixed thresholds on the index for the next 24 hours.
    Absolute,
}

impl BiasPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
        }
    }

    /// Label the demand trend. `current` covers the next 24 hours and `next` the 24 hours after
    /// that. The relative policy falls back to neutral when there is no second window.
    pub fn label(&self, current: &DemandIndex, next: Option<&DemandIndex>) -> BiasLabel {
        match self {
            Self::Relative => next
                .and_then(|n| pct_change(current.weighted_mean, n.weighted_mean))
                .map(label_pct_change)
                .unwrap_or(BiasLabel::Neutral),
            Self::Absolute => label_index(current.value),
        }
    }
}

/// Percent change from `previous` to `next`, or `None` when `previous` is zero.
pub fn pct_change(previous: f64, next: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !next.is_finite() {
        None
    } else {
        Some((next - previous) / previous * 100.0)
    }
}

pub fn label_pct_change(pct: f64) -> BiasLabel {
    if pct > BULLISH_PCT {
        BiasLabel::Bullish
    } else if pct > MILD_BULLISH_PCT {
        BiasLabel::MildBullish
    } else if pct >= NEUTRAL_FLOOR_PCT {
        BiasLabel::Neutral
    } else if pct >= MILD_BEARISH_FLOOR_PCT {
        BiasLabel::MildBearish
    } else {
        BiasLabel::Bearish
    }
}

pub fn label_index(value: f64) -> BiasLabel {
    if value >= STRONG_BULLISH_INDEX {
        BiasLabel::StrongBullish
    } else if value >= BULLISH_INDEX {
        BiasLabel::Bullish
    } else {
        BiasLabel::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::{label_index, label_pct_change, pct_change, BiasLabel, BiasPolicy};
    use crate::index::DemandIndex;

    fn index(weighted_mean: f64, value: f64) -> DemandIndex {
        DemandIndex {
            weighted_mean,
            value,
            total_weight: 1.0,
        }
    }

    #[test]
    fn test_label_pct_change() {
        assert_eq!(BiasLabel::Bullish, label_pct_change(6.0));
        assert_eq!(BiasLabel::MildBullish, label_pct_change(5.0));
        assert_eq!(BiasLabel::MildBullish, label_pct_change(2.5));
        assert_eq!(BiasLabel::Neutral, label_pct_change(2.0));
        assert_eq!(BiasLabel::Neutral, label_pct_change(0.0));
        assert_eq!(BiasLabel::Neutral, label_pct_change(-2.0));
        assert_eq!(BiasLabel::MildBearish, label_pct_change(-2.1));
        assert_eq!(BiasLabel::MildBearish, label_pct_change(-5.0));
        assert_eq!(BiasLabel::Bearish, label_pct_change(-6.0));
    }

    #[test]
    fn test_label_index() {
        assert_eq!(BiasLabel::StrongBullish, label_index(70.0));
        assert_eq!(BiasLabel::Bullish, label_index(69.9));
        assert_eq!(BiasLabel::Bullish, label_index(55.0));
        assert_eq!(BiasLabel::Neutral, label_index(54.0));
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(Some(25.0), pct_change(40.0, 50.0));
        assert_eq!(None, pct_change(0.0, 3.0));
    }

    #[test]
    fn test_relative_policy() {
        let policy = BiasPolicy::Relative;
        assert_eq!(BiasLabel::Bullish, policy.label(&index(1.0, 60.0), Some(&index(1.06, 63.6))));
        assert_eq!(BiasLabel::Neutral, policy.label(&index(1.0, 60.0), Some(&index(1.0, 60.0))));
        assert_eq!(BiasLabel::Bearish, policy.label(&index(1.0, 60.0), Some(&index(0.94, 56.4))));
        assert_eq!(BiasLabel::Neutral, policy.label(&index(1.0, 60.0), None));
        assert_eq!(BiasLabel::Neutral, policy.label(&index(0.0, 0.0), Some(&index(4.0, 100.0))));
    }

    #[test]
    fn test_relative_policy_uses_unclamped_mean() {
        // Both windows saturate the index at 100 but demand still rises
        let policy = BiasPolicy::Relative;
        assert_eq!(BiasLabel::Bullish, policy.label(&index(10.0, 100.0), Some(&index(12.0, 100.0))));
    }

    #[test]
    fn test_absolute_policy() {
        let policy = BiasPolicy::Absolute;
        assert_eq!(BiasLabel::StrongBullish, policy.label(&index(1.25, 75.0), None));
        assert_eq!(BiasLabel::Neutral, policy.label(&index(0.9, 54.0), Some(&index(2.0, 100.0))));
    }

    #[test]
    fn test_labels_ordered() {
        assert!(BiasLabel::Bearish < BiasLabel::MildBearish);
        assert!(BiasLabel::Neutral < BiasLabel::Bullish);
        assert_eq!("Mild Bullish", BiasLabel::MildBullish.to_string());
    }
}
