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

use crate::bias::pct_change;
use crate::retry::Transient;
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

pub const DEFAULT_PRICE_URL: &str = "https://stooq.com/q/d/l/";
pub const DEFAULT_SYMBOL: &str = "ng.f";
pub const DEFAULT_BARS: usize = 30;

const NO_DATA: &str = "No data";
const SYMBOL: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

#[derive(Debug)]
pub enum PriceError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
    Parse(csv::Error),
}

impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid URL {}", u),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Parse(e) => write!(f, "unable to parse price data: {}", e),
        }
    }
}

impl error::Error for PriceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl Transient for PriceError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Internal(e) => !e.is_decode() && !e.is_builder(),
            Self::Unexpected(status, _) => status.is_server_error(),
            _ => false,
        }
    }
}

/// A traded instrument, e.g. `ng` on the futures exchange `f`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    pub symbol: String,
    pub exchange: Option<String>,
}

impl Instrument {
    pub fn new<S: Into<String>>(symbol: S, exchange: Option<S>) -> Self {
        Instrument {
            symbol: symbol.into(),
            exchange: exchange.map(Into::into),
        }
    }

    /// Parse `symbol.exchange` notation, the exchange being optional.
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once('.') {
            Some((symbol, exchange)) if !symbol.is_empty() && !exchange.is_empty() => {
                Self::new(symbol.to_owned(), Some(exchange.to_owned()))
            }
            _ => Self::new(s.to_owned(), None),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exchange {
            Some(e) => write!(f, "{}.{}", self.symbol, e),
            None => write!(f, "{}", self.symbol),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Close")]
    pub close: f64,
}

/// Latest close and day over day change for an instrument, with the bars they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub instrument: Instrument,
    pub latest: Option<DailyBar>,
    pub change_pct: Option<f64>,
    pub bars: Vec<DailyBar>,
}

impl PriceSummary {
    pub fn from_bars(instrument: Instrument, bars: &[DailyBar]) -> Self {
        let latest = bars.last().copied();
        let change_pct = match bars {
            [.., prev, last] => pct_change(prev.close, last.close),
            _ => None,
        };

        PriceSummary {
            instrument,
            latest,
            change_pct,
            bars: bars.to_vec(),
        }
    }
}

/// Parse a daily history CSV (`Date,Open,High,Low,Close[,Volume]`) keeping the last `limit` bars.
///
/// An empty body or the provider's "No data" marker is an empty result rather than an error.
pub fn parse_daily_csv(body: &str, limit: usize) -> Result<Vec<DailyBar>, PriceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with(NO_DATA) {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(trimmed.as_bytes());
    let mut bars = reader
        .deserialize::<DailyBar>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(PriceError::Parse)?;

    bars.sort_by_key(|b| b.date);
    let skip = bars.len().saturating_sub(limit);
    Ok(bars.split_off(skip))
}

/// Daily price bars from Stooq's CSV download endpoint.
#[derive(Debug)]
pub struct StooqClient {
    client: Client,
    base_url: String,
}

impl StooqClient {
    const USER_AGENT: &'static str = concat!("ng_demand/", env!("CARGO_PKG_VERSION"));

    pub fn new(client: Client, base_url: &str) -> Self {
        StooqClient {
            client,
            base_url: base_url.to_owned(),
        }
    }

    pub async fn daily_bars(&self, instrument: &Instrument, limit: usize) -> Result<Vec<DailyBar>, PriceError> {
        let url = self.bars_url(instrument)?;
        tracing::debug!(message = "making daily price request", url = %url);

        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .send()
            .await
            .map_err(PriceError::Internal)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(PriceError::Unexpected(status, url));
        }

        let body = res.text().await.map_err(PriceError::Internal)?;
        parse_daily_csv(&body, limit)
    }

    fn bars_url(&self, instrument: &Instrument) -> Result<Url, PriceError> {
        let symbol = instrument.to_string().to_lowercase();
        let raw = format!(
            "{}?s={}&i=d",
            self.base_url,
            utf8_percent_encode(&symbol, SYMBOL)
        );

        Url::parse(&raw).map_err(|_| PriceError::InvalidUrl(raw))
    }
}
