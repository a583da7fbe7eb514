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

//! Natural gas demand index from api.weather.gov forecasts
//!
//! ## Features
//!
//! `ng_demand` fetches hourly temperature forecasts for a fixed set of population weighted locations
//! (one representative city per U.S. state by default) using the [api.weather.gov] API, turns each
//! forecast hour into a demand score, and combines the scores into a single index between 0 and 100.
//! The index is split into two 24 hour windows and the change between them is labeled with a trading
//! bias (Bearish through Strong Bullish). Recent natural gas futures prices and news headlines are
//! shown next to the index when available.
//!
//! Observed temperatures from the nearest station over the last week and the full forecast are
//! also summed into weighted degree-day demand per calendar date, lined up against daily closes.
//!
//! Two scoring policies are available:
//!
//! * `threshold` - The mean temperature of each 24 hour window scores 1.0, bumped to 1.5 at or below the
//!   cold threshold and to 1.1 at or above the heat threshold.
//! * `degree-day` - Heating and cooling degrees relative to two base temperatures, weighted 1.3 and 0.7.
//!
//! When running as a server, the following Prometheus metrics are emitted after each refresh.
//!
//! * `ng_demand_index{window=$WINDOW}` - Demand index (0-100) for `day1` and `day2`.
//! * `ng_demand_weighted_mean{window=$WINDOW}` - Population weighted mean score before scaling.
//! * `ng_demand_outlook{horizon=$HORIZON}` - Projected index for the `week` and `month`.
//! * `ng_demand_bias{bias=$BIAS}` - Current bias label, always 1.
//! * `ng_region_score{region=$REGION}` - Demand score for the first 24 hour window.
//! * `ng_region_temperature_degrees{region=$REGION}` - Forecast temperature in degrees celsius.
//! * `ng_regions_unavailable` - Regions left out of the index because their forecast failed.
//! * `ng_price_close{instrument=$INSTRUMENT}` - Latest daily close.
//! * `ng_demand_last_refresh_timestamp_seconds` - Time of the last successful refresh.
//!
//! [api.weather.gov]: https://www.weather.gov/documentation/services-web-api
//!
//! ## Build
//!
//! `ng_demand` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### One-shot report
//!
//! Fetch forecasts for every region, print the index, and write both CSV exports.
//!
//! ```text
//! ./ng_demand report --summary-csv summary.csv --hourly-csv hourly.csv
//! ```
//!
//! Use a custom location table (a JSON array of `name`, `city`, `latitude`, `longitude`, and
//! `weight` records) and the degree-day policy.
//!
//! ```text
//! ./ng_demand report --regions regions.json --scoring degree-day --bias absolute
//! ```
//!
//! ### Server
//!
//! Serve the report, CSV exports, and Prometheus metrics, refreshing every five minutes. An alert is
//! pushed to each Telegram chat when the index for the next 24 hours reaches the alert level.
//!
//! ```text
//! NG_DEMAND_TELEGRAM_TOKEN=123:abc ./ng_demand serve --telegram-chat 1111 --telegram-chat 2222
//! ```
//!
//! The following routes are available. When `--users` points to a JSON object of usernames to
//! SHA-256 password hashes, every route except `/metrics` requires HTTP Basic credentials.
//!
//! * `GET /` - Plain text report.
//! * `GET /report` - JSON report.
//! * `GET /summary.csv` - One row per region.
//! * `GET /hourly.csv` - One row per region per forecast hour.
//! * `GET /daily.csv` - Observed and forecast demand per date with the daily close.
//! * `POST /refresh` - Discard the cached report and compute a new one.
//! * `GET /metrics` - Prometheus metrics.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `9783` at `/metrics`. Add the host running `ng_demand`
//! as a target under the Prometheus `scrape_configs` section as described by the example below.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: ng_demand
//!   static_configs:
//!   - targets: ['example:9783']
//! ```
//!

pub mod alert;
pub mod auth;
pub mod bias;
pub mod client;
pub mod convert;
pub mod dashboard;
pub mod export;
pub mod http;
pub mod index;
pub mod metrics;
pub mod news;
pub mod notify;
pub mod price;
pub mod regions;
pub mod report;
pub mod retry;
pub mod scoring;
