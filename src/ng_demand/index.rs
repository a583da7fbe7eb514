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

use crate::scoring::ScoringPolicy;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;

pub const DEFAULT_SCALE: f64 = 60.0;
pub const MAX_INDEX: f64 = 100.0;
pub const WINDOW_HOURS: i64 = 24;
pub const WINDOW_COUNT: usize = 2;

const MONTHLY_ESCALATION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// Total population weight was zero, usually because every region fetch failed.
    Unavailable,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "demand index unavailable: total population weight is zero"),
        }
    }
}

impl error::Error for IndexError {}

/// A single region's demand score and population weight for one time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedScore {
    pub region: String,
    pub score: f64,
    pub weight: f64,
}

impl WeightedScore {
    pub fn new<S: Into<String>>(region: S, score: f64, weight: f64) -> Self {
        WeightedScore {
            region: region.into(),
            score,
            weight,
        }
    }

    pub fn contribution(&self) -> f64 {
        self.score * self.weight
    }
}

/// Population weighted demand, scaled into the range 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemandIndex {
    /// Weighted mean score before scaling and clamping.
    pub weighted_mean: f64,
    /// Scaled index, always within `[0, 100]`.
    pub value: f64,
    pub total_weight: f64,
}

impl DemandIndex {
    /// Index truncated to a whole number, as shown on the dashboard.
    pub fn whole(&self) -> u32 {
        self.value as u32
    }
}

/// Combine per-region scores for a single window into a population weighted index.
///
/// The weighted mean is multiplied by `scale` and clamped to `[0, 100]`. Returns
/// `IndexError::Unavailable` instead of dividing when the total weight is zero.
pub fn aggregate(scores: &[WeightedScore], scale: f64) -> Result<DemandIndex, IndexError> {
    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 || !total_weight.is_finite() {
        return Err(IndexError::Unavailable);
    }

    let weighted: f64 = scores.iter().map(WeightedScore::contribution).sum();
    let weighted_mean = weighted / total_weight;

    Ok(DemandIndex {
        weighted_mean,
        value: (weighted_mean * scale).clamp(0.0, MAX_INDEX),
        total_weight,
    })
}

/// A scored forecast hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedScore {
    pub time: DateTime<FixedOffset>,
    pub temp_c: f64,
    pub score: f64,
}

/// Every scored forecast hour fetched for a region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionScores {
    pub region: String,
    pub weight: f64,
    pub scores: Vec<TimedScore>,
}

/// Earliest sample start time across all regions, the start of the first window.
pub fn window_start(regions: &[RegionScores]) -> Option<DateTime<FixedOffset>> {
    regions.iter().flat_map(|r| r.scores.iter().map(|s| s.time)).min()
}

/// Window a sample falls into: 0 for `[start, start+24h)`, 1 for `[start+24h, start+48h)`.
pub fn window_of(start: DateTime<FixedOffset>, time: DateTime<FixedOffset>) -> Option<usize> {
    if time < start {
        return None;
    }

    let idx = ((time - start).num_seconds() / Duration::hours(WINDOW_HOURS).num_seconds()) as usize;
    if idx < WINDOW_COUNT {
        Some(idx)
    } else {
        None
    }
}

/// Score per region for each window, computed by `policy` from the temperatures inside the
/// window. Regions with no samples inside a window are left out of that window entirely so
/// they don't contribute weight.
pub fn window_scores(
    regions: &[RegionScores],
    start: DateTime<FixedOffset>,
    policy: &ScoringPolicy,
) -> [Vec<WeightedScore>; WINDOW_COUNT] {
    let mut out: [Vec<WeightedScore>; WINDOW_COUNT] = Default::default();

    for r in regions {
        let mut temps: [Vec<f64>; WINDOW_COUNT] = Default::default();
        for s in r.scores.iter() {
            if let Some(w) = window_of(start, s.time) {
                temps[w].push(s.temp_c);
            }
        }

        for (w, window) in temps.iter().enumerate() {
            if let Some(score) = policy.window_score(window) {
                out[w].push(WeightedScore::new(r.region.clone(), score, r.weight));
            }
        }
    }

    out
}

/// Population weighted mean demand at a single forecast hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyDemand {
    pub time: DateTime<FixedOffset>,
    pub demand: f64,
    pub regions: usize,
}

/// Population weighted mean score per forecast hour, across regions that have a sample at that hour.
pub fn hourly_series(regions: &[RegionScores]) -> Vec<HourlyDemand> {
    let mut by_time: BTreeMap<DateTime<FixedOffset>, (f64, f64, usize)> = BTreeMap::new();
    for r in regions {
        for s in r.scores.iter() {
            let e = by_time.entry(s.time).or_insert((0.0, 0.0, 0));
            e.0 += s.score * r.weight;
            e.1 += r.weight;
            e.2 += 1;
        }
    }

    by_time
        .into_iter()
        .filter(|(_, (_, weight, _))| *weight > 0.0)
        .map(|(time, (weighted, weight, regions))| HourlyDemand {
            time,
            demand: weighted / weight,
            regions,
        })
        .collect()
}

/// Population weighted demand for a calendar date, observed and forecast, next to the
/// daily close for the same date when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyDemand {
    pub date: NaiveDate,
    pub observed: Option<f64>,
    pub forecast: Option<f64>,
    pub close: Option<f64>,
}

/// Sum of weighted demand per calendar date.
pub fn daily_totals<I>(weighted: I) -> BTreeMap<NaiveDate, f64>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut totals = BTreeMap::new();
    for (date, demand) in weighted {
        *totals.entry(date).or_insert(0.0) += demand;
    }

    totals
}

/// Join observed totals, forecast totals, and daily closes on date, ordered by date.
pub fn daily_series(
    observed: &BTreeMap<NaiveDate, f64>,
    forecast: &BTreeMap<NaiveDate, f64>,
    closes: &[(NaiveDate, f64)],
) -> Vec<DailyDemand> {
    fn row(by_date: &mut BTreeMap<NaiveDate, DailyDemand>, date: NaiveDate) -> &mut DailyDemand {
        by_date.entry(date).or_insert(DailyDemand {
            date,
            observed: None,
            forecast: None,
            close: None,
        })
    }

    let mut by_date = BTreeMap::new();
    for (date, v) in observed.iter() {
        row(&mut by_date, *date).observed = Some(*v);
    }
    for (date, v) in forecast.iter() {
        row(&mut by_date, *date).forecast = Some(*v);
    }
    for (date, v) in closes.iter() {
        row(&mut by_date, *date).close = Some(*v);
    }

    by_date.into_values().collect()
}

/// Short range projection from the two daily indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outlook {
    pub day1: u32,
    pub day2: u32,
    pub week: u32,
    pub month: u32,
}

impl Outlook {
    /// The weekly figure is the mean of both days; the monthly figure assumes the weather
    /// persists with a small escalation.
    pub fn new(day1: u32, day2: u32) -> Self {
        let week = ((day1 + day2) as f64 / 2.0).round() as u32;
        let month = (week + MONTHLY_ESCALATION).min(MAX_INDEX as u32);
        Outlook { day1, day2, week, month }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        aggregate, daily_series, daily_totals, hourly_series, window_of, window_scores, window_start, DailyDemand,
        IndexError, Outlook, RegionScores, TimedScore, WeightedScore,
    };
    use crate::scoring::ScoringPolicy;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate};

    fn at(hours: i64) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-15T06:00:00-05:00").unwrap() + Duration::hours(hours)
    }

    fn region(name: &str, weight: f64, temps: &[(i64, f64)]) -> RegionScores {
        let policy = ScoringPolicy::threshold();
        RegionScores {
            region: name.to_owned(),
            weight,
            scores: temps
                .iter()
                .map(|(h, t)| TimedScore {
                    time: at(*h),
                    temp_c: *t,
                    score: policy.score(*t),
                })
                .collect(),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_aggregate_example() {
        let scores = vec![WeightedScore::new("A", 1.5, 10.0), WeightedScore::new("B", 1.0, 10.0)];
        let idx = aggregate(&scores, 60.0).unwrap();
        assert_eq!(1.25, idx.weighted_mean);
        assert_eq!(75.0, idx.value);
        assert_eq!(75, idx.whole());
        assert_eq!(20.0, idx.total_weight);
    }

    #[test]
    fn test_aggregate_clamped() {
        let scores = vec![WeightedScore::new("A", 13.0, 5.0)];
        let idx = aggregate(&scores, 60.0).unwrap();
        assert_eq!(100.0, idx.value);
        assert_eq!(13.0, idx.weighted_mean);
    }

    #[test]
    fn test_aggregate_zero_weight() {
        assert_eq!(Err(IndexError::Unavailable), aggregate(&[], 60.0));
        let scores = vec![WeightedScore::new("A", 1.5, 0.0)];
        assert_eq!(Err(IndexError::Unavailable), aggregate(&scores, 60.0));
    }

    #[test]
    fn test_aggregate_always_in_range() {
        let scores = [0.0, 0.3, 1.0, 1.1, 1.5, 4.2, 26.0];
        let weights = [0.1, 1.0, 7.5, 39.0];
        for a in scores {
            for b in scores {
                for w in weights {
                    let input = vec![WeightedScore::new("A", a, w), WeightedScore::new("B", b, 10.0)];
                    let v = aggregate(&input, 60.0).unwrap().value;
                    assert!((0.0..=100.0).contains(&v), "{} out of range for {} {} {}", v, a, b, w);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_monotonic_in_single_score() {
        let mut previous = 0.0;
        for step in 0..=40 {
            let score = step as f64 * 0.05;
            let input = vec![
                WeightedScore::new("A", score, 12.5),
                WeightedScore::new("B", 1.0, 30.0),
                WeightedScore::new("C", 1.1, 3.0),
            ];
            let v = aggregate(&input, 60.0).unwrap().value;
            assert!(v >= previous, "index decreased from {} to {} at score {}", previous, v, score);
            previous = v;
        }
    }

    #[test]
    fn test_window_of() {
        let start = at(0);
        assert_eq!(Some(0), window_of(start, at(0)));
        assert_eq!(Some(0), window_of(start, at(23)));
        assert_eq!(Some(1), window_of(start, at(24)));
        assert_eq!(Some(1), window_of(start, at(47)));
        assert_eq!(None, window_of(start, at(48)));
        assert_eq!(None, window_of(start, at(-1)));
    }

    #[test]
    fn test_window_scores() {
        let regions = vec![
            region("A", 10.0, &[(0, -10.0), (1, -6.0), (24, 40.0)]),
            region("B", 5.0, &[(2, 20.0)]),
        ];

        let start = window_start(&regions).unwrap();
        assert_eq!(at(0), start);

        let [first, second] = window_scores(&regions, start, &ScoringPolicy::threshold());
        assert_eq!(vec![WeightedScore::new("A", 1.5, 10.0), WeightedScore::new("B", 1.0, 5.0)], first);
        assert_eq!(vec![WeightedScore::new("A", 1.1, 10.0)], second);
    }

    #[test]
    fn test_window_scores_mixed_day() {
        // Twelve coldwave hours then twelve mild ones average to -2.5C
        let mut temps: Vec<(i64, f64)> = (0..12).map(|h| (h, -10.0)).collect();
        temps.extend((12..24).map(|h| (h, 5.0)));
        let regions = vec![region("A", 10.0, &temps), region("B", 10.0, &temps)];
        let start = window_start(&regions).unwrap();

        let [first, _] = window_scores(&regions, start, &ScoringPolicy::threshold());
        assert_eq!(vec![WeightedScore::new("A", 1.0, 10.0), WeightedScore::new("B", 1.0, 10.0)], first);
        assert_eq!(60.0, aggregate(&first, 60.0).unwrap().value);

        let [first, _] = window_scores(&regions, start, &ScoringPolicy::degree_day());
        // (12 * 36.4 + 12 * 16.9) / 24
        assert!((first[0].score - 26.65).abs() < 1e-9);
    }

    #[test]
    fn test_window_start_empty() {
        assert_eq!(None, window_start(&[]));
        assert_eq!(None, window_start(&[region("A", 1.0, &[])]));
    }

    #[test]
    fn test_hourly_series() {
        let regions = vec![
            region("A", 10.0, &[(0, -10.0), (1, 0.0)]),
            region("B", 30.0, &[(0, 0.0)]),
        ];

        let series = hourly_series(&regions);
        assert_eq!(2, series.len());
        assert_eq!(at(0), series[0].time);
        assert!((series[0].demand - 1.125).abs() < 1e-9);
        assert_eq!(2, series[0].regions);
        assert_eq!(1.0, series[1].demand);
        assert_eq!(1, series[1].regions);
    }

    #[test]
    fn test_daily_totals() {
        let totals = daily_totals(vec![(date(15), 1.5), (date(16), 2.0), (date(15), 0.5)]);
        assert_eq!(2, totals.len());
        assert_eq!(Some(&2.0), totals.get(&date(15)));
        assert_eq!(Some(&2.0), totals.get(&date(16)));
    }

    #[test]
    fn test_daily_series_joins_on_date() {
        let observed = daily_totals(vec![(date(13), 10.0), (date(14), 12.0)]);
        let forecast = daily_totals(vec![(date(15), 15.0), (date(16), 9.0)]);
        let closes = vec![(date(12), 3.1), (date(14), 3.3)];

        let series = daily_series(&observed, &forecast, &closes);
        assert_eq!(5, series.len());
        assert_eq!(
            DailyDemand {
                date: date(12),
                observed: None,
                forecast: None,
                close: Some(3.1),
            },
            series[0]
        );
        assert_eq!(Some(12.0), series[2].observed);
        assert_eq!(Some(3.3), series[2].close);
        assert_eq!(None, series[2].forecast);
        assert_eq!(Some(9.0), series[4].forecast);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_outlook() {
        let o = Outlook::new(62, 67);
        assert_eq!(65, o.week);
        assert_eq!(70, o.month);

        let o = Outlook::new(98, 100);
        assert_eq!(99, o.week);
        assert_eq!(100, o.month);
    }
}
