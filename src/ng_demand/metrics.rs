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
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

const WINDOW_DAY1: &str = "day1";
const WINDOW_DAY2: &str = "day2";
const HORIZON_WEEK: &str = "week";
const HORIZON_MONTH: &str = "month";

type FloatGauge = Gauge<f64, AtomicU64>;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WindowLabels {
    window: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HorizonLabels {
    horizon: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RegionLabels {
    region: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BiasLabels {
    bias: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct InstrumentLabels {
    instrument: String,
}

/// Holder for metrics that can be set from a `Report`.
///
/// All metrics are created and registered upon call to `DemandMetrics::new()` and share
/// the prefix "ng_". Every call to `observe` replaces the previous values entirely so that
/// regions or windows missing from the latest report stop being exported.
#[derive(Debug)]
pub struct DemandMetrics {
    index: Family<WindowLabels, FloatGauge>,
    weighted_mean: Family<WindowLabels, FloatGauge>,
    outlook: Family<HorizonLabels, FloatGauge>,
    bias: Family<BiasLabels, FloatGauge>,
    region_score: Family<RegionLabels, FloatGauge>,
    region_temperature: Family<RegionLabels, FloatGauge>,
    unavailable: FloatGauge,
    price_close: Family<InstrumentLabels, FloatGauge>,
    last_refresh: FloatGauge,
}

impl DemandMetrics {
    /// Create a new `DemandMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let index = Family::<WindowLabels, FloatGauge>::default();
        let weighted_mean = Family::<WindowLabels, FloatGauge>::default();
        let outlook = Family::<HorizonLabels, FloatGauge>::default();
        let bias = Family::<BiasLabels, FloatGauge>::default();
        let region_score = Family::<RegionLabels, FloatGauge>::default();
        let region_temperature = Family::<RegionLabels, FloatGauge>::default();
        let unavailable = FloatGauge::default();
        let price_close = Family::<InstrumentLabels, FloatGauge>::default();
        let last_refresh = FloatGauge::default();

        reg.register("ng_demand_index", "Demand index (0-100) per 24 hour window", index.clone());
        reg.register(
            "ng_demand_weighted_mean",
            "Population weighted mean demand score per 24 hour window",
            weighted_mean.clone(),
        );
        reg.register("ng_demand_outlook", "Projected demand index (0-100)", outlook.clone());
        reg.register("ng_demand_bias", "Current bias label, always 1", bias.clone());
        reg.register("ng_region_score", "Demand score for the first 24 hour window", region_score.clone());
        reg.register(
            "ng_region_temperature_degrees",
            "Forecast temperature for the first hour in celsius",
            region_temperature.clone(),
        );
        reg.register(
            "ng_regions_unavailable",
            "Regions excluded from the index because their forecast failed",
            unavailable.clone(),
        );
        reg.register("ng_price_close", "Latest daily close", price_close.clone());
        reg.register(
            "ng_demand_last_refresh_timestamp_seconds",
            "Time of the last successful refresh",
            last_refresh.clone(),
        );

        Self {
            index,
            weighted_mean,
            outlook,
            bias,
            region_score,
            region_temperature,
            unavailable,
            price_close,
            last_refresh,
        }
    }

    pub fn observe(&self, report: &Report) {
        self.index.clear();
        self.weighted_mean.clear();
        self.set_window(WINDOW_DAY1, report.day1.value, report.day1.weighted_mean);
        if let Some(d) = report.day2 {
            self.set_window(WINDOW_DAY2, d.value, d.weighted_mean);
        }

        self.outlook.clear();
        if let Some(o) = report.outlook {
            self.set_horizon(HORIZON_WEEK, o.week as f64);
            self.set_horizon(HORIZON_MONTH, o.month as f64);
        }

        self.bias.clear();
        self.bias
            .get_or_create(&BiasLabels {
                bias: report.bias.to_string(),
            })
            .set(1.0);

        self.region_score.clear();
        self.region_temperature.clear();
        for r in report.regions.iter() {
            let labels = RegionLabels {
                region: r.region.clone(),
            };

            if let Some(score) = r.day1_score {
                self.region_score.get_or_create(&labels).set(score);
            }
            self.region_temperature.get_or_create(&labels).set(r.temp_c);
        }

        self.unavailable.set(report.unavailable.len() as f64);

        self.price_close.clear();
        if let Some((price, latest)) = report.price.as_ref().and_then(|p| p.latest.map(|b| (p, b))) {
            self.price_close
                .get_or_create(&InstrumentLabels {
                    instrument: price.instrument.to_string(),
                })
                .set(latest.close);
        }

        self.last_refresh.set(report.generated_at.timestamp() as f64);
    }

    fn set_window(&self, window: &str, value: f64, weighted_mean: f64) {
        let labels = WindowLabels {
            window: window.to_owned(),
        };

        self.index.get_or_create(&labels).set(value);
        self.weighted_mean.get_or_create(&labels).set(weighted_mean);
    }

    fn set_horizon(&self, horizon: &str, value: f64) {
        self.outlook
            .get_or_create(&HorizonLabels {
                horizon: horizon.to_owned(),
            })
            .set(value);
    }
}
