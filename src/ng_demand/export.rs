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

use crate::convert::round_to;
use crate::dashboard::Report;
use crate::scoring::{DegreeDays, Risk};
use std::error;
use std::fmt;
use std::io;
use std::string::FromUtf8Error;

const DISPLAY_PLACES: u32 = 2;

#[derive(Debug)]
pub enum ExportError {
    Csv(csv::Error),
    Io(io::Error),
    Utf8(FromUtf8Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(e) => write!(f, "unable to write CSV: {}", e),
            Self::Io(e) => write!(f, "unable to write export: {}", e),
            Self::Utf8(e) => write!(f, "export is not valid UTF-8: {}", e),
        }
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Utf8(e) => Some(e),
        }
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Headers for the columns that depend on the scoring policy.
fn policy_headers(scoring: &str) -> &'static [&'static str] {
    if scoring == "degree-day" {
        &["HDD", "CDD"]
    } else {
        &["Risk"]
    }
}

fn policy_values(risk: Risk, degree_days: Option<DegreeDays>) -> Vec<String> {
    match degree_days {
        Some(dd) => vec![
            round_to(dd.heating, DISPLAY_PLACES).to_string(),
            round_to(dd.cooling, DISPLAY_PLACES).to_string(),
        ],
        None => vec![risk.to_string()],
    }
}

fn number(v: f64) -> String {
    round_to(v, DISPLAY_PLACES).to_string()
}

/// Write one row per region with current conditions and demand.
pub fn write_summary<W: io::Write>(writer: W, report: &Report) -> Result<(), ExportError> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header = vec!["State", "City", "Temp (°C)"];
    header.extend_from_slice(policy_headers(report.scoring));
    header.extend_from_slice(&["Population Weight", "Demand Score", "Weighted Demand"]);
    w.write_record(&header)?;

    for r in report.regions.iter() {
        let mut record = vec![r.region.clone(), r.city.clone(), number(r.temp_c)];
        record.extend(policy_values(r.risk, r.degree_days));
        record.extend([number(r.weight), number(r.score), number(r.weighted)]);
        w.write_record(&record)?;
    }

    w.flush().map_err(ExportError::Io)
}

/// Write one row per region per forecast hour.
pub fn write_hourly<W: io::Write>(writer: W, report: &Report) -> Result<(), ExportError> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header = vec!["State", "City", "Time", "Temp (°C)", "Forecast"];
    header.extend_from_slice(policy_headers(report.scoring));
    header.extend_from_slice(&["Demand Score", "Weighted Demand"]);
    w.write_record(&header)?;

    for h in report.hourly.iter() {
        let mut record = vec![
            h.region.clone(),
            h.city.clone(),
            h.time.to_rfc3339(),
            number(h.temp_c),
            h.description.clone(),
        ];
        record.extend(policy_values(h.risk, h.degree_days));
        record.extend([number(h.score), number(h.weighted)]);
        w.write_record(&record)?;
    }

    w.flush().map_err(ExportError::Io)
}

/// Write one row per date with observed and forecast demand and the daily close.
pub fn write_daily<W: io::Write>(writer: W, report: &Report) -> Result<(), ExportError> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(["Date", "Observed Demand", "Forecast Demand", "Close"])?;

    let optional = |v: Option<f64>| v.map(number).unwrap_or_default();
    for d in report.daily.iter() {
        w.write_record([
            d.date.to_string(),
            optional(d.observed),
            optional(d.forecast),
            optional(d.close),
        ])?;
    }

    w.flush().map_err(ExportError::Io)
}

pub fn summary_csv(report: &Report) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_summary(&mut buf, report)?;
    String::from_utf8(buf).map_err(ExportError::Utf8)
}

pub fn hourly_csv(report: &Report) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_hourly(&mut buf, report)?;
    String::from_utf8(buf).map_err(ExportError::Utf8)
}

pub fn daily_csv(report: &Report) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_daily(&mut buf, report)?;
    String::from_utf8(buf).map_err(ExportError::Utf8)
}

#[cfg(test)]
mod tests {
    use super::{daily_csv, hourly_csv, summary_csv};
    use crate::dashboard::tests::{coord, now, settings, table, two_days, FakeSource};
    use crate::dashboard::{Dashboard, Report, Settings};
    use crate::scoring::ScoringPolicy;
    use std::sync::Arc;

    async fn report(settings: Settings) -> Report {
        let source = FakeSource::new(&[(coord(40.0), two_days(14.0, 14.0)), (coord(30.0), two_days(68.0, 68.0))]);
        Dashboard::new(table(), Arc::new(source), settings)
            .build_report(now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_summary_threshold() {
        let csv = summary_csv(&report(settings()).await).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(3, lines.len());
        assert_eq!(
            "State,City,Temp (°C),Risk,Population Weight,Demand Score,Weighted Demand",
            lines[0]
        );
        assert_eq!("A,Alpha,-10,Coldwave,10,1.5,15", lines[1]);
        assert_eq!("B,Beta,20,Normal,10,1,10", lines[2]);
    }

    #[tokio::test]
    async fn test_summary_degree_day() {
        let settings = Settings {
            scoring: ScoringPolicy::degree_day(),
            ..settings()
        };

        let csv = summary_csv(&report(settings).await).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            "State,City,Temp (°C),HDD,CDD,Population Weight,Demand Score,Weighted Demand",
            lines[0]
        );
        // -10C is 28 heating degrees, 28 * 1.3 = 36.4
        assert_eq!("A,Alpha,-10,28,0,10,36.4,364", lines[1]);
    }

    #[tokio::test]
    async fn test_summary_row_scored_from_displayed_temperature() {
        // First hour 14F (-10C), the rest of the day mild
        let mut temps = vec![14.0; 12];
        temps.extend(vec![41.0; 36]);
        let source = FakeSource::new(&[(coord(40.0), temps)]);
        let report = Dashboard::new(table(), Arc::new(source), settings())
            .build_report(now())
            .await
            .unwrap();

        let csv = summary_csv(&report).unwrap();
        let row: Vec<&str> = csv.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(vec!["A", "Alpha", "-10", "Coldwave", "10", "1.5", "15"], row);

        let temp: f64 = row[2].parse().unwrap();
        let score: f64 = row[5].parse().unwrap();
        let weight: f64 = row[4].parse().unwrap();
        let weighted: f64 = row[6].parse().unwrap();
        assert_eq!(settings().scoring.score(temp), score);
        assert_eq!(score * weight, weighted);
    }

    #[tokio::test]
    async fn test_daily() {
        let source = FakeSource::new(&[(coord(40.0), two_days(50.0, 50.0))])
            .with_observations(coord(40.0), &[("2024-01-14T12:00:00+00:00", 10.0)]);
        let csv = daily_csv(
            &Dashboard::new(table(), Arc::new(source), settings())
                .build_report(now())
                .await
                .unwrap(),
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!("Date,Observed Demand,Forecast Demand,Close", lines[0]);
        assert_eq!("2024-01-14,104,,", lines[1]);
        assert_eq!("2024-01-15,,1872,", lines[2]);
        assert_eq!(5, lines.len());
    }

    #[tokio::test]
    async fn test_hourly() {
        let csv = hourly_csv(&report(settings()).await).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(97, lines.len());
        assert_eq!(
            "State,City,Time,Temp (°C),Forecast,Risk,Demand Score,Weighted Demand",
            lines[0]
        );
        assert_eq!("A,Alpha,2024-01-15T06:00:00-05:00,-10,Sunny,Coldwave,1.5,15", lines[1]);
        assert!(lines[49].starts_with("B,Beta,2024-01-15T06:00:00-05:00,20,"));
    }
}
