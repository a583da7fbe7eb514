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

use crate::auth::Session;
use crate::bias::{pct_change, BiasLabel, BiasPolicy};
use crate::client::{ForecastSample, ForecastSource, ObservationSample, DEFAULT_HORIZON};
use crate::convert::round_to;
use crate::index::{
    aggregate, daily_series, daily_totals, hourly_series, window_scores, window_start, DailyDemand, DemandIndex,
    HourlyDemand, Outlook, RegionScores, TimedScore, DEFAULT_SCALE,
};
use crate::news::{GoogleNewsClient, NewsItem};
use crate::price::{Instrument, PriceSummary, StooqClient};
use crate::regions::{Region, RegionTable};
use crate::retry::RetryPolicy;
use crate::scoring::{classify, DegreeDays, Risk, ScoringPolicy, DEFAULT_COLD_THRESHOLD, DEFAULT_HEAT_THRESHOLD};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument as _, Level};

pub const DEFAULT_ALERT_LEVEL: u32 = 65;
pub const DEFAULT_HISTORY_DAYS: u32 = 7;

#[derive(Debug)]
pub enum DashboardError {
    /// No region returned a usable forecast so there is no population weight to aggregate.
    WeatherUnavailable { attempted: usize },
    Unauthenticated,
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeatherUnavailable { attempted } => write!(
                f,
                "weather data unavailable for all {} regions, cannot compute demand index",
                attempted
            ),
            Self::Unauthenticated => write!(f, "session is not authenticated"),
        }
    }
}

impl error::Error for DashboardError {}

/// Policies and constants used to compute a report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub scoring: ScoringPolicy,
    pub bias: BiasPolicy,
    /// Thresholds used for the coldwave and heatwave classification, regardless of scoring policy.
    pub cold_threshold: f64,
    pub heat_threshold: f64,
    pub scale: f64,
    pub horizon: usize,
    pub alert_level: u32,
    /// Days of observed temperatures used for daily demand, zero to skip observations.
    pub history_days: u32,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            scoring: ScoringPolicy::default(),
            bias: BiasPolicy::default(),
            cold_threshold: DEFAULT_COLD_THRESHOLD,
            heat_threshold: DEFAULT_HEAT_THRESHOLD,
            scale: DEFAULT_SCALE,
            horizon: DEFAULT_HORIZON,
            alert_level: DEFAULT_ALERT_LEVEL,
            history_days: DEFAULT_HISTORY_DAYS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Current conditions and demand for a single region.
///
/// `temp_c`, `risk`, `score`, and `weighted` all describe the first forecast hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub city: String,
    pub weight: f64,
    pub temp_c: f64,
    pub risk: Risk,
    pub degree_days: Option<DegreeDays>,
    pub score: f64,
    pub weighted: f64,
    /// Score for the first 24 hour window, as used in the index.
    pub day1_score: Option<f64>,
}

/// A single forecast hour for a single region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRow {
    pub region: String,
    pub city: String,
    pub time: DateTime<FixedOffset>,
    pub temp_c: f64,
    pub description: String,
    pub risk: Risk,
    pub degree_days: Option<DegreeDays>,
    pub score: f64,
    pub weighted: f64,
}

/// Everything computed in a single run. Recomputed from scratch on every refresh.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub scoring: &'static str,
    pub bias_policy: &'static str,
    pub window_start: DateTime<FixedOffset>,
    pub day1: DemandIndex,
    pub day2: Option<DemandIndex>,
    pub change_pct: Option<f64>,
    pub bias: BiasLabel,
    pub outlook: Option<Outlook>,
    pub regions: Vec<RegionSummary>,
    pub unavailable: Vec<String>,
    pub hourly: Vec<HourlyRow>,
    pub series: Vec<HourlyDemand>,
    pub daily: Vec<DailyDemand>,
    pub price: Option<PriceSummary>,
    pub news: Vec<NewsItem>,
}

impl Report {
    pub fn is_alert(&self, level: u32) -> bool {
        self.day1.whole() >= level
    }

    /// Text of the push notification sent when demand reaches the alert level.
    pub fn alert_message(&self) -> String {
        format!(
            "NG ALERT\nDate: {}\nNG Index: {}\nBias: {}\nWeather driven demand",
            self.window_start.date_naive(),
            self.day1.whole(),
            self.bias
        )
    }
}

/// Single slot cache for the last computed report, only ever cleared wholesale.
#[derive(Debug, Default)]
pub struct ReportCache {
    report: Option<Arc<Report>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Report>> {
        self.report.clone()
    }

    pub fn put(&mut self, report: Arc<Report>) {
        self.report = Some(report);
    }

    pub fn clear(&mut self) {
        self.report = None;
    }
}

/// Best effort price lookup shown next to the demand index.
#[derive(Debug)]
pub struct PriceFeed {
    pub client: StooqClient,
    pub instrument: Instrument,
    pub bars: usize,
}

/// Best effort headline lookup shown next to the demand index.
#[derive(Debug)]
pub struct NewsFeed {
    pub client: GoogleNewsClient,
    pub query: String,
    pub items: usize,
}

/// Demand index pipeline: fetch, score, aggregate, and label.
pub struct Dashboard {
    regions: RegionTable,
    weather: Arc<dyn ForecastSource>,
    prices: Option<PriceFeed>,
    news: Option<NewsFeed>,
    settings: Settings,
}

impl fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dashboard")
            .field("regions", &self.regions.len())
            .field("prices", &self.prices)
            .field("news", &self.news)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Dashboard {
    pub fn new(regions: RegionTable, weather: Arc<dyn ForecastSource>, settings: Settings) -> Self {
        Dashboard {
            regions,
            weather,
            prices: None,
            news: None,
            settings,
        }
    }

    pub fn with_prices(mut self, prices: PriceFeed) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn with_news(mut self, news: NewsFeed) -> Self {
        self.news = Some(news);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Clear the cache and compute a new report, recording the refresh time in the session.
    pub async fn refresh(
        &self,
        session: &mut Session,
        cache: &mut ReportCache,
        now: DateTime<Utc>,
    ) -> Result<Arc<Report>, DashboardError> {
        if !session.is_authenticated() {
            return Err(DashboardError::Unauthenticated);
        }

        cache.clear();
        let report = Arc::new(self.build_report(now).await?);
        cache.put(report.clone());
        session.mark_refreshed(now);
        Ok(report)
    }

    /// Return the cached report unless it's older than `max_age`, refreshing otherwise.
    pub async fn current(
        &self,
        session: &mut Session,
        cache: &mut ReportCache,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Arc<Report>, DashboardError> {
        if !session.is_authenticated() {
            return Err(DashboardError::Unauthenticated);
        }

        match cache.get() {
            Some(report) if !session.is_stale(now, max_age) => Ok(report),
            _ => self.refresh(session, cache, now).await,
        }
    }

    /// Fetch forecasts for every region in table order, one at a time, and compute a report.
    ///
    /// Regions whose forecast can't be fetched are left out of the aggregate. The report
    /// fails only when no region at all returned a forecast.
    pub async fn build_report(&self, now: DateTime<Utc>) -> Result<Report, DashboardError> {
        let s = &self.settings;
        let mut fetched: Vec<(&Region, Vec<ForecastSample>)> = Vec::with_capacity(self.regions.len());
        let mut unavailable = Vec::new();

        for region in self.regions.iter() {
            match self.fetch_region(region).await {
                Some(samples) => fetched.push((region, samples)),
                None => unavailable.push(region.name.clone()),
            }
        }

        tracing::info!(
            message = "fetched regional forecasts",
            available = fetched.len(),
            unavailable = unavailable.len(),
        );

        let mut scores = Vec::with_capacity(fetched.len());
        let mut hourly = Vec::new();
        let daily_policy = s.scoring.daily();
        let mut forecast_daily = Vec::new();

        for (region, samples) in fetched.iter() {
            let mut timed = Vec::with_capacity(samples.len());
            for sample in samples {
                let temp_c = sample.temp_c();
                let score = s.scoring.score(temp_c);
                timed.push(TimedScore {
                    time: sample.time,
                    temp_c,
                    score,
                });
                forecast_daily.push((sample.time.date_naive(), daily_policy.score(temp_c) * region.weight));

                hourly.push(HourlyRow {
                    region: region.name.clone(),
                    city: region.city.clone(),
                    time: sample.time,
                    temp_c: round_to(temp_c, 2),
                    description: sample.description.clone(),
                    risk: classify(temp_c, s.cold_threshold, s.heat_threshold),
                    degree_days: s.scoring.degree_days(temp_c),
                    score,
                    weighted: score * region.weight,
                });
            }

            scores.push(RegionScores {
                region: region.name.clone(),
                weight: region.weight,
                scores: timed,
            });
        }

        let attempted = self.regions.len();
        let start = window_start(&scores).ok_or(DashboardError::WeatherUnavailable { attempted })?;
        let [first, second] = window_scores(&scores, start, &s.scoring);
        let day1 = aggregate(&first, s.scale).map_err(|_| DashboardError::WeatherUnavailable { attempted })?;
        let day2 = aggregate(&second, s.scale).ok();

        let bias = s.bias.label(&day1, day2.as_ref());
        let change_pct = day2.and_then(|d| pct_change(day1.weighted_mean, d.weighted_mean));
        let outlook = day2.map(|d| Outlook::new(day1.whole(), d.whole()));

        let regions = fetched
            .iter()
            .filter_map(|(region, samples)| {
                let current = samples.first()?;
                let temp_c = current.temp_c();
                let score = s.scoring.score(temp_c);

                Some(RegionSummary {
                    region: region.name.clone(),
                    city: region.city.clone(),
                    weight: region.weight,
                    temp_c: round_to(temp_c, 2),
                    risk: classify(temp_c, s.cold_threshold, s.heat_threshold),
                    degree_days: s.scoring.degree_days(temp_c),
                    score,
                    weighted: score * region.weight,
                    day1_score: first.iter().find(|w| w.region == region.name).map(|w| w.score),
                })
            })
            .collect();

        let observed = self.observed_daily(&fetched, now).await;
        let price = self.fetch_price().await;
        let closes: Vec<_> = price
            .iter()
            .flat_map(|p| p.bars.iter().map(|b| (b.date, b.close)))
            .collect();
        let daily = daily_series(&observed, &daily_totals(forecast_daily), &closes);

        tracing::info!(
            message = "computed demand index",
            day1 = day1.value,
            day2 = ?day2.map(|d| d.value),
            bias = %bias,
        );

        Ok(Report {
            generated_at: now,
            scoring: s.scoring.name(),
            bias_policy: s.bias.name(),
            window_start: start,
            day1,
            day2,
            change_pct,
            bias,
            outlook,
            regions,
            unavailable,
            series: hourly_series(&scores),
            hourly,
            daily,
            price,
            news: self.fetch_news().await,
        })
    }

    async fn fetch_region(&self, region: &Region) -> Option<Vec<ForecastSample>> {
        let res = self
            .settings
            .retry
            .run("hourly_forecast", || {
                self.weather.hourly_forecast(region.coordinate, self.settings.horizon)
            })
            .instrument(tracing::span!(Level::DEBUG, "nws_forecast", region = %region.name))
            .await;

        match res {
            Ok(samples) if samples.is_empty() => {
                tracing::warn!(message = "empty forecast", region = %region.name);
                None
            }
            Ok(samples) => Some(samples),
            Err(e) => {
                tracing::warn!(message = "failed to fetch forecast", region = %region.name, error = %e);
                None
            }
        }
    }

    /// Weighted degree-day demand per date from recent observations, for regions that had a forecast.
    async fn observed_daily(
        &self,
        fetched: &[(&Region, Vec<ForecastSample>)],
        now: DateTime<Utc>,
    ) -> BTreeMap<NaiveDate, f64> {
        let days = self.settings.history_days;
        if days == 0 {
            return BTreeMap::new();
        }

        let policy = self.settings.scoring.daily();
        let start = now - Duration::days(i64::from(days));
        let mut weighted = Vec::new();

        for (region, _) in fetched.iter() {
            if let Some(samples) = self.fetch_observations(region, start, now).await {
                weighted.extend(
                    samples
                        .iter()
                        .map(|o| (o.time.date_naive(), policy.score(o.temp_c) * region.weight)),
                );
            }
        }

        daily_totals(weighted)
    }

    async fn fetch_observations(
        &self,
        region: &Region,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<ObservationSample>> {
        let res = self
            .settings
            .retry
            .run("observations", || self.weather.observations(region.coordinate, start, end))
            .instrument(tracing::span!(Level::DEBUG, "nws_observations", region = %region.name))
            .await;

        match res {
            Ok(samples) => Some(samples),
            Err(e) => {
                tracing::warn!(message = "failed to fetch observations", region = %region.name, error = %e);
                None
            }
        }
    }

    async fn fetch_price(&self) -> Option<PriceSummary> {
        let feed = self.prices.as_ref()?;
        match self
            .settings
            .retry
            .run("daily_bars", || feed.client.daily_bars(&feed.instrument, feed.bars))
            .await
        {
            Ok(bars) => Some(PriceSummary::from_bars(feed.instrument.clone(), &bars)),
            Err(e) => {
                tracing::warn!(message = "failed to fetch prices", instrument = %feed.instrument, error = %e);
                None
            }
        }
    }

    async fn fetch_news(&self) -> Vec<NewsItem> {
        let feed = match self.news.as_ref() {
            Some(f) => f,
            None => return Vec::new(),
        };

        self.settings
            .retry
            .run("headlines", || feed.client.headlines(&feed.query, feed.items))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(message = "failed to fetch news", query = %feed.query, error = %e);
                Vec::new()
            })
    }
}
