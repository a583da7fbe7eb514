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

use crate::dashboard::Report;
use crate::notify::{Delivery, Notifier};
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;

/// Pushes a message to every recipient when the next 24 hour index reaches `level`.
///
/// At most one alert is sent per forecast day so that timed refreshes don't repeat it.
pub struct Alerter {
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
    level: u32,
    last_alerted: Option<NaiveDate>,
}

impl fmt::Debug for Alerter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alerter")
            .field("recipients", &self.recipients)
            .field("level", &self.level)
            .field("last_alerted", &self.last_alerted)
            .finish()
    }
}

impl Alerter {
    pub fn new(notifier: Arc<dyn Notifier>, recipients: Vec<String>, level: u32) -> Self {
        Alerter {
            notifier,
            recipients,
            level,
            last_alerted: None,
        }
    }

    /// Send the alert for this report if it's at or above the alert level and no alert has
    /// been sent for the same forecast day. Returns the per-recipient outcomes when sent.
    pub async fn check(&mut self, report: &Report) -> Option<Vec<Delivery>> {
        let day = report.window_start.date_naive();
        if !report.is_alert(self.level) || self.last_alerted == Some(day) {
            return None;
        }

        let deliveries = self.send(report).await;
        if deliveries.iter().any(Delivery::is_ok) {
            self.last_alerted = Some(day);
        }

        Some(deliveries)
    }

    /// Send the alert for this report unconditionally.
    pub async fn send(&self, report: &Report) -> Vec<Delivery> {
        tracing::info!(
            message = "demand index at alert level",
            index = report.day1.whole(),
            level = self.level,
            recipients = self.recipients.len(),
        );

        self.notifier.broadcast(&report.alert_message(), &self.recipients).await
    }
}

#[cfg(test)]
mod tests {
    use super::Alerter;
    use crate::dashboard::tests::{coord, now, settings, table, two_days, FakeSource};
    use crate::dashboard::{Dashboard, Report};
    use crate::notify::{Notifier, NotifyError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_owned(), message.to_owned()));
            Ok(())
        }
    }

    async fn report(first: f64) -> Report {
        let source = FakeSource::new(&[(coord(40.0), two_days(first, first)), (coord(30.0), two_days(68.0, 68.0))]);
        Dashboard::new(table(), Arc::new(source), settings())
            .build_report(now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_alert_once_per_day() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut alerter = Alerter::new(notifier.clone(), vec!["1".to_owned(), "2".to_owned()], 65);
        let report = report(14.0).await;

        let deliveries = alerter.check(&report).await.unwrap();
        assert_eq!(2, deliveries.len());
        assert!(alerter.check(&report).await.is_none());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(2, sent.len());
        assert!(sent[0].1.starts_with("NG ALERT"));
        assert!(sent[0].1.contains("NG Index: 75"));
    }

    #[tokio::test]
    async fn test_below_level() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut alerter = Alerter::new(notifier.clone(), vec!["1".to_owned()], 65);

        // Both regions normal, index 60
        assert!(alerter.check(&report(68.0).await).await.is_none());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
