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

use crate::retry::{RetryPolicy, Transient};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::error;
use std::fmt;

pub const DEFAULT_TELEGRAM_URL: &str = "https://api.telegram.org/";

#[derive(Debug)]
pub enum NotifyError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Unexpected(StatusCode, String),
    Rejected(String, String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(base) => write!(f, "invalid messaging URL {}", base),
            Self::Unexpected(status, recipient) => write!(f, "unexpected status {} sending to {}", status, recipient),
            Self::Rejected(recipient, reason) => write!(f, "message to {} rejected: {}", recipient, reason),
        }
    }
}

impl error::Error for NotifyError {}

impl Transient for NotifyError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Internal(e) => !e.is_decode() && !e.is_builder(),
            Self::Unexpected(status, _) => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            _ => false,
        }
    }
}

/// Outcome of delivering a message to a single recipient.
#[derive(Debug)]
pub struct Delivery {
    pub recipient: String,
    pub result: Result<(), NotifyError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Something that can push a text message to a recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;

    /// Attempt delivery to every recipient. A failure for one recipient never prevents
    /// delivery to the others; each outcome is reported and logged separately.
    async fn broadcast(&self, message: &str, recipients: &[String]) -> Vec<Delivery> {
        let mut out = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let result = self.deliver(recipient, message).await;
            match &result {
                Ok(_) => tracing::info!(message = "delivered notification", recipient = %recipient),
                Err(e) => tracing::warn!(message = "failed to deliver notification", recipient = %recipient, error = %e),
            }

            out.push(Delivery {
                recipient: recipient.clone(),
                result,
            });
        }

        out
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends messages using the Telegram bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(client: Client, base_url: &str, token: &str, retry: RetryPolicy) -> Result<Self, NotifyError> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{}/", base_url)
        };

        if Url::parse(&base_url).is_err() {
            return Err(NotifyError::InvalidUrl(base_url));
        }

        Ok(TelegramNotifier {
            client,
            base_url,
            token: token.to_owned(),
            retry,
        })
    }

    fn send_url(&self) -> Result<Url, NotifyError> {
        Url::parse(&format!("{}bot{}/sendMessage", self.base_url, self.token))
            .map_err(|_| NotifyError::InvalidUrl(self.base_url.clone()))
    }

    async fn send_once(&self, url: &Url, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let res = self
            .client
            .post(url.clone())
            .form(&[("chat_id", recipient), ("text", message)])
            .send()
            .await
            // The request URL contains the bot token so it's stripped from errors
            .map_err(|e| NotifyError::Internal(e.without_url()))?;

        let status = res.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(NotifyError::Unexpected(status, recipient.to_owned()));
        }

        let body = res
            .json::<TelegramResponse>()
            .await
            .map_err(|e| NotifyError::Internal(e.without_url()))?;
        if body.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                recipient.to_owned(),
                body.description.unwrap_or_else(|| status.to_string()),
            ))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let url = self.send_url()?;
        self.retry
            .run("telegram_send", || self.send_once(&url, recipient, message))
            .await
    }
}
