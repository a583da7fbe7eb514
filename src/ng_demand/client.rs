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

use crate::convert::{c_to_f, f_to_c};
use crate::regions::Coordinate;
use crate::retry::Transient;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

pub const DEFAULT_API_URL: &str = "https://api.weather.gov/";
pub const DEFAULT_HORIZON: usize = 48;
pub const MAX_HORIZON: usize = 168;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    InvalidLocation(Coordinate),
    Unexpected(StatusCode, Url),
    Malformed(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid URL {}", u),
            Self::InvalidLocation(c) => write!(f, "no forecast grid for location {}", c),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Malformed(reason) => write!(f, "malformed response: {}", reason),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

impl Transient for ClientError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Internal(e) => !e.is_decode() && !e.is_builder(),
            Self::Unexpected(status, _) => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

/// One hour of forecast for a single location, temperature in fahrenheit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSample {
    pub time: DateTime<FixedOffset>,
    pub temp_f: f64,
    pub description: String,
}

impl ForecastSample {
    pub fn temp_c(&self) -> f64 {
        f_to_c(self.temp_f)
    }
}

/// Observed temperature at a station near a location, in celsius.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSample {
    pub time: DateTime<FixedOffset>,
    pub temp_c: f64,
}

/// Source of hourly temperature forecasts and recent observations for a coordinate.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Return up to `horizon` hourly samples for `coordinate`, ordered by start time.
    async fn hourly_forecast(&self, coordinate: Coordinate, horizon: usize) -> Result<Vec<ForecastSample>, ClientError>;

    /// Return observed temperatures between `start` and `end` from the station nearest to
    /// `coordinate`, ordered by time. Observations without a temperature are skipped.
    async fn observations(
        &self,
        coordinate: Coordinate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ObservationSample>, ClientError>;
}

#[derive(Debug)]
pub struct WeatherGovClient {
    client: Client,
    base_url: Url,
}

impl WeatherGovClient {
    const USER_AGENT: &'static str = concat!("ng_demand/", env!("CARGO_PKG_VERSION"), " (natural gas demand index)");
    const JSON_RESPONSE: &'static str = "application/geo+json";

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        // Relative joins replace the last path segment unless the base ends with a slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{}/", base_url)
        };

        let base_url = Url::parse(&normalized).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(normalized));
        }

        Ok(WeatherGovClient { client, base_url })
    }

    /// Look up the forecast office grid for a coordinate.
    pub async fn point(&self, coordinate: Coordinate) -> Result<Point, ClientError> {
        let point_url = self.point_url(coordinate)?;
        tracing::debug!(message = "making point lookup request", url = %point_url);

        let res = self.make_request(Some(coordinate), point_url).await?;
        res.json::<Point>().await.map_err(ClientError::Internal)
    }

    /// Fetch the hourly forecast from the URL returned by a point lookup.
    pub async fn hourly(&self, forecast_url: &str) -> Result<HourlyForecast, ClientError> {
        let request_url = Url::parse(forecast_url).map_err(|_| ClientError::InvalidUrl(forecast_url.to_owned()))?;
        tracing::debug!(message = "making hourly forecast request", url = %request_url);

        let res = self.make_request(None, request_url).await?;
        res.json::<HourlyForecast>().await.map_err(ClientError::Internal)
    }

    /// Fetch the observation stations for a location from the URL returned by a point lookup.
    pub async fn stations(&self, stations_url: &str) -> Result<StationCollection, ClientError> {
        let request_url = Url::parse(stations_url).map_err(|_| ClientError::InvalidUrl(stations_url.to_owned()))?;
        tracing::debug!(message = "making observation stations request", url = %request_url);

        let res = self.make_request(None, request_url).await?;
        res.json::<StationCollection>().await.map_err(ClientError::Internal)
    }

    /// Fetch observations for a station between `start` and `end`.
    pub async fn station_observations(
        &self,
        station: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ObservationCollection, ClientError> {
        let request_url = observations_url(station, start, end)?;
        tracing::debug!(message = "making observations request", url = %request_url);

        let res = self.make_request(None, request_url).await?;
        res.json::<ObservationCollection>().await.map_err(ClientError::Internal)
    }

    async fn make_request(&self, coordinate: Option<Coordinate>, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::NOT_FOUND {
            match coordinate {
                Some(c) => Err(ClientError::InvalidLocation(c)),
                None => Err(ClientError::Unexpected(status, url)),
            }
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn point_url(&self, coordinate: Coordinate) -> Result<Url, ClientError> {
        let path = format!("points/{}", coordinate);
        self.base_url
            .join(&path)
            .map_err(|_| ClientError::InvalidUrl(format!("{}{}", self.base_url, path)))
    }
}

fn observations_url(station: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Url, ClientError> {
    let mut url = Url::parse(station).map_err(|_| ClientError::InvalidUrl(station.to_owned()))?;
    url.path_segments_mut()
        .map(|mut p| {
            p.pop_if_empty().push("observations");
        })
        .map_err(|_| ClientError::InvalidUrl(station.to_owned()))?;
    url.query_pairs_mut()
        .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
        .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Secs, true));
    Ok(url)
}

#[async_trait]
impl ForecastSource for WeatherGovClient {
    async fn hourly_forecast(&self, coordinate: Coordinate, horizon: usize) -> Result<Vec<ForecastSample>, ClientError> {
        let point = self.point(coordinate).await?;
        let forecast_url = point
            .properties
            .forecast_hourly
            .ok_or_else(|| ClientError::Malformed(format!("no hourly forecast for {}", coordinate)))?;

        let forecast = self.hourly(&forecast_url).await?;
        forecast.samples(horizon)
    }

    async fn observations(
        &self,
        coordinate: Coordinate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ObservationSample>, ClientError> {
        let point = self.point(coordinate).await?;
        let stations_url = point
            .properties
            .observation_stations
            .ok_or_else(|| ClientError::Malformed(format!("no observation stations for {}", coordinate)))?;

        let stations = self.stations(&stations_url).await?;
        let station = stations
            .features
            .first()
            .ok_or_else(|| ClientError::Malformed(format!("empty observation station list for {}", coordinate)))?;

        let observations = self.station_observations(&station.id, start, end).await?;
        observations.samples()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Point {
    #[serde(alias = "id")]
    pub id: Option<String>,
    #[serde(alias = "properties")]
    pub properties: PointProperties,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PointProperties {
    #[serde(alias = "gridId")]
    pub grid_id: Option<String>,
    #[serde(alias = "gridX")]
    pub grid_x: Option<i64>,
    #[serde(alias = "gridY")]
    pub grid_y: Option<i64>,
    #[serde(alias = "forecastHourly")]
    pub forecast_hourly: Option<String>,
    #[serde(alias = "timeZone")]
    pub time_zone: Option<String>,
    #[serde(alias = "observationStations")]
    pub observation_stations: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HourlyForecast {
    #[serde(alias = "properties")]
    pub properties: HourlyProperties,
}

impl HourlyForecast {
    /// Convert the first `horizon` periods into samples, rejecting the whole forecast when any
    /// period has an unparseable start time.
    pub fn samples(&self, horizon: usize) -> Result<Vec<ForecastSample>, ClientError> {
        self.properties
            .periods
            .iter()
            .take(horizon.min(MAX_HORIZON))
            .map(Period::sample)
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HourlyProperties {
    #[serde(alias = "updateTime")]
    pub update_time: Option<String>,
    #[serde(alias = "periods")]
    pub periods: Vec<Period>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Period {
    #[serde(alias = "number")]
    pub number: Option<u32>,
    #[serde(alias = "startTime")]
    pub start_time: String,
    #[serde(alias = "temperature")]
    pub temperature: f64,
    #[serde(alias = "temperatureUnit")]
    pub temperature_unit: Option<String>,
    #[serde(alias = "shortForecast")]
    pub short_forecast: Option<String>,
}

impl Period {
    pub fn temp_f(&self) -> f64 {
        match self.temperature_unit.as_deref() {
            Some("C") => c_to_f(self.temperature),
            _ => self.temperature,
        }
    }

    fn sample(&self) -> Result<ForecastSample, ClientError> {
        let time = DateTime::parse_from_rfc3339(&self.start_time)
            .map_err(|e| ClientError::Malformed(format!("start time {}: {}", self.start_time, e)))?;

        Ok(ForecastSample {
            time,
            temp_f: self.temp_f(),
            description: self.short_forecast.clone().unwrap_or_default(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StationCollection {
    #[serde(alias = "features")]
    pub features: Vec<Station>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Station {
    #[serde(alias = "id")]
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ObservationCollection {
    #[serde(alias = "features")]
    pub features: Vec<Observation>,
}

impl ObservationCollection {
    /// Convert observations with a temperature into samples ordered by time.
    pub fn samples(&self) -> Result<Vec<ObservationSample>, ClientError> {
        let mut out = Vec::with_capacity(self.features.len());
        for o in self.features.iter() {
            if let Some(sample) = o.properties.sample()? {
                out.push(sample);
            }
        }

        out.sort_by_key(|s| s.time);
        Ok(out)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Observation {
    #[serde(alias = "properties")]
    pub properties: ObservationProperties,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ObservationProperties {
    #[serde(alias = "timestamp")]
    pub timestamp: String,
    #[serde(alias = "temperature")]
    pub temperature: Measurement,
}

impl ObservationProperties {
    fn sample(&self) -> Result<Option<ObservationSample>, ClientError> {
        let temp_c = match self.temperature.celsius() {
            Some(t) => t,
            None => return Ok(None),
        };

        let time = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| ClientError::Malformed(format!("timestamp {}: {}", self.timestamp, e)))?;

        Ok(Some(ObservationSample { time, temp_c }))
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Measurement {
    #[serde(alias = "value")]
    pub value: Option<f64>,
    #[serde(alias = "unitCode")]
    pub unit_code: Option<String>,
}

impl Measurement {
    /// Value in celsius, `None` when the station didn't report one.
    pub fn celsius(&self) -> Option<f64> {
        let value = self.value?;
        match self.unit_code.as_deref() {
            Some("wmoUnit:degF") => Some(f_to_c(value)),
            _ => Some(value),
        }
    }
}
