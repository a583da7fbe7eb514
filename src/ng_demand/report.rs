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
use std::fmt::Write;

const NA: &str = "NA";

fn or_na<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| NA.to_owned())
}

fn signed_pct(v: f64) -> String {
    format!("{:+.2}%", v)
}

/// Render a report as plain text: index cards, market context, the region table, and daily demand.
pub fn render(report: &Report) -> String {
    let mut out = String::new();

    // Writing to a String can't fail
    let _ = write_cards(&mut out, report);
    let _ = write_market(&mut out, report);
    let _ = write_regions(&mut out, report);
    let _ = write_daily(&mut out, report);
    out
}

fn write_cards(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "NG Weather Demand Index")?;
    writeln!(
        out,
        "Generated {} ({} scoring, {} bias)",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.scoring,
        report.bias_policy
    )?;
    writeln!(out)?;

    writeln!(out, "{:<12}{:>8}", "Day 1", report.day1.whole())?;
    writeln!(out, "{:<12}{:>8}", "Day 2", or_na(report.day2.map(|d| d.whole())))?;
    writeln!(out, "{:<12}{:>8}", "Week", or_na(report.outlook.map(|o| o.week)))?;
    writeln!(out, "{:<12}{:>8}", "Month", or_na(report.outlook.map(|o| o.month)))?;
    writeln!(out, "{:<12}{:>8}", "Change", or_na(report.change_pct.map(signed_pct)))?;
    writeln!(out, "{:<12}{:>8}", "Bias", report.bias.to_string())?;

    if !report.unavailable.is_empty() {
        writeln!(out)?;
        writeln!(out, "Unavailable: {}", report.unavailable.join(", "))?;
    }

    Ok(())
}

fn write_market(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out)?;
    match &report.price {
        Some(p) => writeln!(
            out,
            "{} close {} ({})",
            p.instrument,
            or_na(p.latest.map(|b| b.close)),
            or_na(p.change_pct.map(signed_pct))
        )?,
        None => writeln!(out, "Price {}", NA)?,
    }

    if report.news.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "News")?;
    for item in report.news.iter() {
        match item.date {
            Some(d) => writeln!(out, "  {} {}", d, item.headline)?,
            None => writeln!(out, "  {:<10} {}", "", item.headline)?,
        }
    }

    Ok(())
}

fn write_regions(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(
        out,
        "{:<16}{:<16}{:>10}{:>10}{:>8}{:>8}{:>10}",
        "State", "City", "Temp (°C)", "Risk", "Weight", "Score", "Weighted"
    )?;

    for r in report.regions.iter() {
        writeln!(
            out,
            "{:<16}{:<16}{:>10}{:>10}{:>8}{:>8}{:>10}",
            r.region,
            r.city,
            round_to(r.temp_c, 1),
            r.risk.to_string(),
            round_to(r.weight, 2),
            round_to(r.score, 2),
            round_to(r.weighted, 2)
        )?;
    }

    Ok(())
}

fn write_daily(out: &mut String, report: &Report) -> std::fmt::Result {
    if report.daily.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "{:<12}{:>12}{:>12}{:>10}", "Date", "Observed", "Forecast", "Close")?;
    for d in report.daily.iter() {
        writeln!(
            out,
            "{:<12}{:>12}{:>12}{:>10}",
            d.date.to_string(),
            or_na(d.observed.map(|v| round_to(v, 1))),
            or_na(d.forecast.map(|v| round_to(v, 1))),
            or_na(d.close)
        )?;
    }

    Ok(())
}
