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

use crate::retry::Transient;
use chrono::{DateTime, NaiveDate};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::error;
use std::fmt;

pub const DEFAULT_NEWS_URL: &str = "https://news.google.com/rss/search";
pub const DEFAULT_QUERY: &str = "natural gas LNG weather";
pub const DEFAULT_ITEMS: usize = 5;

#[derive(Debug)]
pub enum NewsError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
    Parse(rss::Error),
}

impl fmt::Display for NewsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid URL {}", u),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Parse(e) => write!(f, "unable to parse news feed: {}", e),
        }
    }
}

impl error::Error for NewsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl Transient for NewsError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Internal(e) => !e.is_decode() && !e.is_builder(),
            Self::Unexpected(status, _) => status.is_server_error(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsItem {
    pub date: Option<NaiveDate>,
    pub headline: String,
}

/// Parse an RSS document into at most `limit` items, preserving feed order.
///
/// Items without a title are skipped. Publication dates that aren't valid RFC 2822 are left empty.
pub fn parse_feed(body: &[u8], limit: usize) -> Result<Vec<NewsItem>, NewsError> {
    let channel = rss::Channel::read_from(body).map_err(NewsError::Parse)?;

    Ok(channel
        .items()
        .iter()
        .filter_map(|item| {
            let headline = item.title()?.trim().to_owned();
            let date = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.date_naive());

            Some(NewsItem { date, headline })
        })
        .take(limit)
        .collect())
}

/// Headlines from the Google News RSS search feed.
#[derive(Debug)]
pub struct GoogleNewsClient {
    client: Client,
    base_url: String,
}

impl GoogleNewsClient {
    const USER_AGENT: &'static str = concat!("ng_demand/", env!("CARGO_PKG_VERSION"));

    pub fn new(client: Client, base_url: &str) -> Self {
        GoogleNewsClient {
            client,
            base_url: base_url.to_owned(),
        }
    }

    pub async fn headlines(&self, query: &str, limit: usize) -> Result<Vec<NewsItem>, NewsError> {
        let url = self.search_url(query)?;
        tracing::debug!(message = "making news search request", url = %url);

        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .send()
            .await
            .map_err(NewsError::Internal)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(NewsError::Unexpected(status, url));
        }

        let body = res.bytes().await.map_err(NewsError::Internal)?;
        parse_feed(&body[..], limit)
    }

    fn search_url(&self, query: &str) -> Result<Url, NewsError> {
        let raw = format!(
            "{}?q={}&hl=en-US&gl=US&ceid=US:en",
            self.base_url,
            utf8_percent_encode(query, NON_ALPHANUMERIC)
        );

        Url::parse(&raw).map_err(|_| NewsError::InvalidUrl(raw))
    }
}
