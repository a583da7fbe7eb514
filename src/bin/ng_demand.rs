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

use clap::{Args, Parser, Subcommand, ValueEnum};
use ng_demand::alert::Alerter;
use ng_demand::auth::{Session, UserTable};
use ng_demand::bias::BiasPolicy;
use ng_demand::client::{WeatherGovClient, DEFAULT_API_URL, DEFAULT_HORIZON, MAX_HORIZON};
use ng_demand::dashboard::{
    Dashboard, NewsFeed, PriceFeed, ReportCache, Settings, DEFAULT_ALERT_LEVEL, DEFAULT_HISTORY_DAYS,
};
use ng_demand::export;
use ng_demand::http::{router, RequestContext};
use ng_demand::index::DEFAULT_SCALE;
use ng_demand::news::{GoogleNewsClient, DEFAULT_ITEMS, DEFAULT_NEWS_URL, DEFAULT_QUERY};
use ng_demand::notify::{TelegramNotifier, DEFAULT_TELEGRAM_URL};
use ng_demand::price::{Instrument, StooqClient, DEFAULT_BARS, DEFAULT_PRICE_URL, DEFAULT_SYMBOL};
use ng_demand::regions::RegionTable;
use ng_demand::report;
use ng_demand::retry::{RetryPolicy, DEFAULT_DELAY_MILLIS, DEFAULT_MAX_ATTEMPTS};
use ng_demand::scoring::{
    ScoringPolicy, DEFAULT_BASE_COOL, DEFAULT_BASE_HEAT, DEFAULT_COLD_THRESHOLD, DEFAULT_HEAT_THRESHOLD,
};
use reqwest::Client;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::{Instrument as _, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, Parser)]
#[clap(name = "ng_demand", version = clap::crate_version!())]
struct NgDemandApplication {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch forecasts once, print the demand index, and optionally write CSV exports
    Report(ReportOptions),
    /// Serve the demand index, CSV exports, and Prometheus metrics, refreshing periodically
    Serve(ServeOptions),
}

impl Command {
    fn common(&self) -> &CommonOptions {
        match self {
            Self::Report(o) => &o.common,
            Self::Serve(o) => &o.common,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScoringArg {
    Threshold,
    DegreeDay,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BiasArg {
    Relative,
    Absolute,
}

#[derive(Debug, Args)]
struct CommonOptions {
    /// Base URL for the Weather.gov API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// JSON file of regions (name, city, latitude, longitude, weight). Defaults to one
    /// capital city per U.S. state weighted by population
    #[clap(long)]
    regions: Option<PathBuf>,

    /// How each forecast hour is turned into a demand score
    #[clap(long, value_enum, default_value_t = ScoringArg::Threshold)]
    scoring: ScoringArg,

    /// Temperatures at or below this (celsius) are a coldwave
    #[clap(long, default_value_t = DEFAULT_COLD_THRESHOLD, allow_hyphen_values = true)]
    cold_threshold: f64,

    /// Temperatures at or above this (celsius) are a heatwave
    #[clap(long, default_value_t = DEFAULT_HEAT_THRESHOLD, allow_hyphen_values = true)]
    heat_threshold: f64,

    /// Base temperature (celsius) for heating degrees with the degree-day policy
    #[clap(long, default_value_t = DEFAULT_BASE_HEAT, allow_hyphen_values = true)]
    base_heat: f64,

    /// Base temperature (celsius) for cooling degrees with the degree-day policy
    #[clap(long, default_value_t = DEFAULT_BASE_COOL, allow_hyphen_values = true)]
    base_cool: f64,

    /// Multiplier applied to the weighted mean score before clamping to 0-100
    #[clap(long, default_value_t = DEFAULT_SCALE)]
    scale: f64,

    /// How the demand trend is labeled
    #[clap(long, value_enum, default_value_t = BiasArg::Relative)]
    bias: BiasArg,

    /// Number of forecast hours to fetch per region, at most 168
    #[clap(long, default_value_t = DEFAULT_HORIZON)]
    horizon: usize,

    /// Timeout for each request to an external service, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Number of attempts for each request to an external service
    #[clap(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    retries: u32,

    /// Delay between attempts, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_DELAY_MILLIS)]
    retry_delay_millis: u64,

    /// Send an alert when the index for the next 24 hours is at or above this level
    #[clap(long, default_value_t = DEFAULT_ALERT_LEVEL)]
    alert_level: u32,

    /// Days of observed temperatures to include in daily demand, 0 to skip observations
    #[clap(long, default_value_t = DEFAULT_HISTORY_DAYS)]
    history_days: u32,

    /// Don't fetch futures prices or news headlines
    #[clap(long)]
    skip_market: bool,

    /// Futures symbol to show prices for, in `symbol.exchange` notation
    #[clap(long, default_value_t = DEFAULT_SYMBOL.into())]
    price_symbol: String,

    /// Base URL for daily price history
    #[clap(long, default_value_t = DEFAULT_PRICE_URL.into())]
    price_url: String,

    /// Search query for news headlines
    #[clap(long, default_value_t = DEFAULT_QUERY.into())]
    news_query: String,

    /// Base URL for the news search feed
    #[clap(long, default_value_t = DEFAULT_NEWS_URL.into())]
    news_url: String,

    /// Telegram bot token used to send alerts
    #[clap(long, env = "NG_DEMAND_TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Telegram chat ID to send alerts to. May be repeated
    #[clap(long)]
    telegram_chat: Vec<String>,

    /// Base URL for the Telegram bot API
    #[clap(long, default_value_t = DEFAULT_TELEGRAM_URL.into())]
    telegram_url: String,

    /// JSON object of usernames to SHA-256 password hashes (optionally `salt$hash`)
    #[clap(long)]
    users: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[derive(Debug, Args)]
struct ReportOptions {
    #[clap(flatten)]
    common: CommonOptions,

    /// Username to log in with when a user table is configured
    #[clap(long)]
    username: Option<String>,

    /// Password to log in with when a user table is configured
    #[clap(long, env = "NG_DEMAND_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Write the per-region summary to this CSV file
    #[clap(long)]
    summary_csv: Option<PathBuf>,

    /// Write every forecast hour to this CSV file
    #[clap(long)]
    hourly_csv: Option<PathBuf>,

    /// Write observed and forecast demand per date to this CSV file
    #[clap(long)]
    daily_csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeOptions {
    #[clap(flatten)]
    common: CommonOptions,

    /// Recompute the demand index at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    refresh_secs: u64,

    /// Address to bind to. By default, ng_demand will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = NgDemandApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.command.common().log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    match opts.command {
        Command::Report(o) => run_report(o).await,
        Command::Serve(o) => run_serve(o).await,
    }
}

async fn run_report(opts: ReportOptions) -> Result<(), Box<dyn Error + Send + Sync>> {
    let http_client = http_client(&opts.common);
    let dashboard = dashboard(&opts.common, &http_client);

    let mut session = match load_users(&opts.common) {
        None => Session::trusted(),
        Some(users) => {
            let mut session = Session::new();
            let username = opts.username.as_deref().unwrap_or_default();
            let password = opts.password.as_deref().unwrap_or_default();
            if let Err(e) = session.login(&users, username, password) {
                tracing::error!(message = "unable to log in", error = %e);
                process::exit(1)
            }

            session
        }
    };

    let mut cache = ReportCache::new();
    let report = dashboard
        .refresh(&mut session, &mut cache, chrono::Utc::now())
        .instrument(tracing::span!(Level::DEBUG, "ng_report"))
        .await
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to compute demand index", error = %e);
            process::exit(1)
        });

    print!("{}", report::render(&report));

    if let Some(path) = opts.summary_csv.as_ref() {
        export::write_summary(create_file(path)?, &report)?;
        tracing::info!(message = "wrote summary export", path = %path.display());
    }

    if let Some(path) = opts.hourly_csv.as_ref() {
        export::write_hourly(create_file(path)?, &report)?;
        tracing::info!(message = "wrote hourly export", path = %path.display());
    }

    if let Some(path) = opts.daily_csv.as_ref() {
        export::write_daily(create_file(path)?, &report)?;
        tracing::info!(message = "wrote daily export", path = %path.display());
    }

    if let Some(alerter) = alerter(&opts.common, &http_client, dashboard.settings().retry) {
        if report.is_alert(opts.common.alert_level) {
            let deliveries = alerter.send(&report).await;
            let failed = deliveries.iter().filter(|d| !d.is_ok()).count();
            tracing::info!(message = "sent alerts", sent = deliveries.len() - failed, failed = failed);
        }
    }

    Ok(())
}

async fn run_serve(opts: ServeOptions) -> Result<(), Box<dyn Error + Send + Sync>> {
    let http_client = http_client(&opts.common);
    let dashboard = dashboard(&opts.common, &http_client);
    let retry = dashboard.settings().retry;

    let mut context = RequestContext::new(dashboard, chrono::Duration::seconds(opts.refresh_secs as i64));
    if let Some(users) = load_users(&opts.common) {
        context = context.with_users(users);
    }

    if let Some(alerter) = alerter(&opts.common, &http_client, retry) {
        context = context.with_alerter(alerter);
    }

    let context = Arc::new(context);
    let refresh_context = context.clone();
    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));
    let api_url = opts.common.api_url.clone();

    tokio::spawn(async move {
        tracing::info!(message = "forecast polling started", api_url = %api_url);

        loop {
            let _ = interval.tick().await;
            match refresh_context
                .refresh()
                .instrument(tracing::span!(Level::DEBUG, "ng_refresh"))
                .await
            {
                Ok(report) => {
                    tracing::info!(message = "refreshed demand index", index = report.day1.whole(), bias = %report.bias);
                }
                Err(e) => {
                    tracing::error!(message = "failed to refresh demand index", error = %e);
                }
            }
        }
    });

    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(router(context).into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

fn http_client(opts: &CommonOptions) -> Client {
    let timeout = Duration::from_millis(opts.timeout_millis);
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    })
}

fn settings(opts: &CommonOptions) -> Settings {
    let scoring = match opts.scoring {
        ScoringArg::Threshold => ScoringPolicy::Threshold {
            cold: opts.cold_threshold,
            heat: opts.heat_threshold,
        },
        ScoringArg::DegreeDay => ScoringPolicy::DegreeDay {
            base_heat: opts.base_heat,
            base_cool: opts.base_cool,
        },
    };

    let bias = match opts.bias {
        BiasArg::Relative => BiasPolicy::Relative,
        BiasArg::Absolute => BiasPolicy::Absolute,
    };

    if opts.horizon > MAX_HORIZON {
        tracing::warn!(message = "forecast horizon too long, truncating", horizon = opts.horizon, max = MAX_HORIZON);
    }

    Settings {
        scoring,
        bias,
        cold_threshold: opts.cold_threshold,
        heat_threshold: opts.heat_threshold,
        scale: opts.scale,
        horizon: opts.horizon.min(MAX_HORIZON),
        alert_level: opts.alert_level,
        history_days: opts.history_days,
        retry: RetryPolicy::new(opts.retries, Duration::from_millis(opts.retry_delay_millis)),
    }
}

fn dashboard(opts: &CommonOptions, http_client: &Client) -> Dashboard {
    let regions = match opts.regions.as_ref() {
        Some(path) => RegionTable::from_path(path),
        None => RegionTable::bundled(),
    }
    .unwrap_or_else(|e| {
        tracing::error!(message = "unable to load regions", error = %e);
        process::exit(1)
    });

    let weather = WeatherGovClient::new(http_client.clone(), &opts.api_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid weather API URL", error = %e);
        process::exit(1)
    });

    tracing::debug!(message = "loaded regions", regions = regions.len(), total_weight = regions.total_weight());
    let dashboard = Dashboard::new(regions, Arc::new(weather), settings(opts));
    if opts.skip_market {
        return dashboard;
    }

    dashboard
        .with_prices(PriceFeed {
            client: StooqClient::new(http_client.clone(), &opts.price_url),
            instrument: Instrument::parse(&opts.price_symbol),
            bars: DEFAULT_BARS,
        })
        .with_news(NewsFeed {
            client: GoogleNewsClient::new(http_client.clone(), &opts.news_url),
            query: opts.news_query.clone(),
            items: DEFAULT_ITEMS,
        })
}

fn load_users(opts: &CommonOptions) -> Option<UserTable> {
    let path = opts.users.as_ref()?;
    let users = UserTable::from_path(path).unwrap_or_else(|e| {
        tracing::error!(message = "unable to load users", path = %path.display(), error = %e);
        process::exit(1)
    });

    if users.is_empty() {
        tracing::warn!(message = "user table is empty, every login will be rejected", path = %path.display());
    }

    Some(users)
}

fn alerter(opts: &CommonOptions, http_client: &Client, retry: RetryPolicy) -> Option<Alerter> {
    let token = opts.telegram_token.as_ref()?;
    if opts.telegram_chat.is_empty() {
        tracing::warn!(message = "telegram token set without any chats, alerts disabled");
        return None;
    }

    let notifier = TelegramNotifier::new(http_client.clone(), &opts.telegram_url, token, retry).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize notifier", error = %e);
        process::exit(1)
    });

    Some(Alerter::new(
        Arc::new(notifier),
        opts.telegram_chat.clone(),
        opts.alert_level,
    ))
}

fn create_file(path: &Path) -> io::Result<BufWriter<File>> {
    File::create(path).map(BufWriter::new)
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Command, NgDemandApplication};
    use clap::Parser;

    #[test]
    fn test_refresh_secs_must_be_positive() {
        assert!(NgDemandApplication::try_parse_from(["ng_demand", "serve", "--refresh-secs", "0"]).is_err());

        let opts = NgDemandApplication::try_parse_from(["ng_demand", "serve", "--refresh-secs", "1"]).unwrap();
        match opts.command {
            Command::Serve(o) => assert_eq!(1, o.refresh_secs),
            Command::Report(_) => panic!("expected serve options"),
        }
    }

    #[test]
    fn test_default_refresh_secs() {
        let opts = NgDemandApplication::try_parse_from(["ng_demand", "serve"]).unwrap();
        match opts.command {
            Command::Serve(o) => assert_eq!(super::DEFAULT_REFRESH_SECS, o.refresh_secs),
            Command::Report(_) => panic!("expected serve options"),
        }
    }
}
