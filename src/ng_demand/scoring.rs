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

use serde::Serialize;
use std::fmt;

pub const DEFAULT_COLD_THRESHOLD: f64 = -5.0;
pub const DEFAULT_HEAT_THRESHOLD: f64 = 35.0;
pub const DEFAULT_BASE_HEAT: f64 = 18.0;
pub const DEFAULT_BASE_COOL: f64 = 22.0;

const HEATING_FACTOR: f64 = 1.3;
const COOLING_FACTOR: f64 = 0.7;

const SCORE_COLD: f64 = 1.5;
const SCORE_HEAT: f64 = 1.1;
const SCORE_NORMAL: f64 = 1.0;

/// Coarse classification of a temperature sample, reported alongside the demand score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Risk {
    Coldwave,
    Normal,
    Heatwave,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coldwave => write!(f, "Coldwave"),
            Self::Normal => write!(f, "Normal"),
            Self::Heatwave => write!(f, "Heatwave"),
        }
    }
}

/// Heating and cooling degrees for a single sample, in degrees celsius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DegreeDays {
    pub heating: f64,
    pub cooling: f64,
}

impl DegreeDays {
    pub fn new(temp_c: f64, base_heat: f64, base_cool: f64) -> Self {
        DegreeDays {
            heating: (base_heat - temp_c).max(0.0),
            cooling: (temp_c - base_cool).max(0.0),
        }
    }

    pub fn demand(&self) -> f64 {
        self.heating * HEATING_FACTOR + self.cooling * COOLING_FACTOR
    }
}

/// Strategy for turning a temperature sample (celsius) into a unitless demand score.
///
/// The policy is picked once from configuration and applied to every sample in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoringPolicy {
    /// Flat score of 1.0 with fixed bumps at or beyond the cold and heat thresholds.
    Threshold { cold: f64, heat: f64 },
    /// Weighted heating and cooling degrees relative to the two base temperatures.
    DegreeDay { base_heat: f64, base_cool: f64 },
}

impl ScoringPolicy {
    pub fn threshold() -> Self {
        Self::Threshold {
            cold: DEFAULT_COLD_THRESHOLD,
            heat: DEFAULT_HEAT_THRESHOLD,
        }
    }

    pub fn degree_day() -> Self {
        Self::DegreeDay {
            base_heat: DEFAULT_BASE_HEAT,
            base_cool: DEFAULT_BASE_COOL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::DegreeDay { .. } => "degree-day",
        }
    }

    pub fn score(&self, temp_c: f64) -> f64 {
        match *self {
            Self::Threshold { cold, heat } => {
                if temp_c <= cold {
                    SCORE_COLD
                } else if temp_c >= heat {
                    SCORE_HEAT
                } else {
                    SCORE_NORMAL
                }
            }
            Self::DegreeDay { base_heat, base_cool } => DegreeDays::new(temp_c, base_heat, base_cool).demand(),
        }
    }

    /// Heating and cooling degrees for the sample, only meaningful for the degree-day policy.
    pub fn degree_days(&self, temp_c: f64) -> Option<DegreeDays> {
        match *self {
            Self::Threshold { .. } => None,
            Self::DegreeDay { base_heat, base_cool } => Some(DegreeDays::new(temp_c, base_heat, base_cool)),
        }
    }

    /// Score for a window of samples, `None` when the window is empty.
    ///
    /// The threshold policy scores the mean temperature of the window once. The degree-day
    /// policy averages the score of every sample.
    pub fn window_score(&self, temps_c: &[f64]) -> Option<f64> {
        if temps_c.is_empty() {
            return None;
        }

        let n = temps_c.len() as f64;
        match self {
            Self::Threshold { .. } => Some(self.score(temps_c.iter().sum::<f64>() / n)),
            Self::DegreeDay { .. } => Some(temps_c.iter().map(|t| self.score(*t)).sum::<f64>() / n),
        }
    }

    /// Policy used for daily demand totals: this one if it's degree-day, the default degree-day otherwise.
    pub fn daily(&self) -> Self {
        match self {
            Self::DegreeDay { .. } => *self,
            Self::Threshold { .. } => Self::degree_day(),
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::threshold()
    }
}

/// Classify a sample using cold and heat thresholds, both inclusive.
pub fn classify(temp_c: f64, cold: f64, heat: f64) -> Risk {
    if temp_c >= heat {
        Risk::Heatwave
    } else if temp_c <= cold {
        Risk::Coldwave
    } else {
        Risk::Normal
    }
}
