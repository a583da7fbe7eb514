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

use crate::alert::Alerter;
use crate::auth::{Session, UserTable};
use crate::dashboard::{Dashboard, DashboardError, Report, ReportCache};
use crate::export::{self, ExportError};
use crate::metrics::DemandMetrics;
use crate::report;
use axum::extract::State;
use axum::headers::authorization::Basic;
use axum::headers::Authorization;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, TypedHeader};
use chrono::{Duration, Utc};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";
const CSV_TEXT: &str = "text/csv; charset=utf-8";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";
const BASIC_REALM: &str = "Basic realm=\"ng_demand\"";

/// Mutable state shared by every request and the timed refresh loop.
#[derive(Debug)]
struct RefreshState {
    session: Session,
    cache: ReportCache,
    alerter: Option<Alerter>,
}

/// Everything a request handler needs: the pipeline, the single report slot, and the
/// metrics registry that each refresh updates.
#[derive(Debug)]
pub struct RequestContext {
    dashboard: Dashboard,
    state: Mutex<RefreshState>,
    registry: Registry,
    metrics: DemandMetrics,
    users: Option<UserTable>,
    max_age: Duration,
}

impl RequestContext {
    pub fn new(dashboard: Dashboard, max_age: Duration) -> Self {
        let mut registry = Registry::default();
        let metrics = DemandMetrics::new(&mut registry);

        RequestContext {
            dashboard,
            state: Mutex::new(RefreshState {
                session: Session::trusted(),
                cache: ReportCache::new(),
                alerter: None,
            }),
            registry,
            metrics,
            users: None,
            max_age,
        }
    }

    /// Require HTTP Basic credentials from this table for every route except `/metrics`.
    pub fn with_users(mut self, users: UserTable) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_alerter(mut self, alerter: Alerter) -> Self {
        self.state.get_mut().alerter = Some(alerter);
        self
    }

    /// Clear the cached report and compute a new one, updating metrics and sending alerts.
    pub async fn refresh(&self) -> Result<Arc<Report>, DashboardError> {
        let mut state = self.state.lock().await;
        let RefreshState {
            session,
            cache,
            alerter,
        } = &mut *state;

        let report = self.dashboard.refresh(session, cache, Utc::now()).await?;
        self.after_refresh(&report, alerter).await;
        Ok(report)
    }

    /// Cached report, computing a new one when there is none or it's older than the refresh interval.
    pub async fn current(&self) -> Result<Arc<Report>, DashboardError> {
        let mut state = self.state.lock().await;
        let RefreshState {
            session,
            cache,
            alerter,
        } = &mut *state;

        let before = session.last_refresh();
        let report = self.dashboard.current(session, cache, Utc::now(), self.max_age).await?;
        if session.last_refresh() != before {
            self.after_refresh(&report, alerter).await;
        }

        Ok(report)
    }

    async fn after_refresh(&self, report: &Report, alerter: &mut Option<Alerter>) {
        self.metrics.observe(report);
        if let Some(a) = alerter.as_mut() {
            a.check(report).await;
        }
    }
}

#[derive(Debug)]
enum HttpError {
    Dashboard(DashboardError),
    Export(ExportError),
}

impl From<DashboardError> for HttpError {
    fn from(e: DashboardError) -> Self {
        Self::Dashboard(e)
    }
}

impl From<ExportError> for HttpError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            Self::Dashboard(e @ DashboardError::WeatherUnavailable { .. }) => {
                tracing::warn!(message = "unable to compute report", error = %e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            Self::Dashboard(DashboardError::Unauthenticated) => unauthorized(),
            Self::Export(e) => {
                tracing::error!(message = "unable to export report", error = %e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, BASIC_REALM)], "unauthorized").into_response()
}

/// Build the router: `/metrics` is always public, everything else requires credentials
/// when a user table is configured.
pub fn router(context: Arc<RequestContext>) -> Router {
    let protected = Router::new()
        .route("/", get(text_report))
        .route("/report", get(json_report))
        .route("/summary.csv", get(summary_csv))
        .route("/hourly.csv", get(hourly_csv))
        .route("/daily.csv", get(daily_csv))
        .route("/refresh", post(refresh))
        .route_layer(middleware::from_fn_with_state(context.clone(), require_auth));

    Router::new()
        .route("/metrics", get(text_metrics))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn require_auth<B>(
    State(context): State<Arc<RequestContext>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    if let Some(users) = context.users.as_ref() {
        let verified = auth
            .map(|TypedHeader(Authorization(basic))| users.verify(basic.username(), basic.password()).is_ok())
            .unwrap_or(false);

        if !verified {
            tracing::debug!(message = "rejected request without valid credentials", path = %req.uri().path());
            return unauthorized();
        }
    }

    next.run(req).await
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics to text format", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn text_report(State(context): State<Arc<RequestContext>>) -> Result<Response, HttpError> {
    let report = context.current().await?;
    Ok(([(CONTENT_TYPE, PLAIN_TEXT)], report::render(&report)).into_response())
}

async fn json_report(State(context): State<Arc<RequestContext>>) -> Result<Json<Arc<Report>>, HttpError> {
    Ok(Json(context.current().await?))
}

async fn summary_csv(State(context): State<Arc<RequestContext>>) -> Result<Response, HttpError> {
    let report = context.current().await?;
    Ok(csv_response("summary.csv", export::summary_csv(&report)?))
}

async fn hourly_csv(State(context): State<Arc<RequestContext>>) -> Result<Response, HttpError> {
    let report = context.current().await?;
    Ok(csv_response("hourly.csv", export::hourly_csv(&report)?))
}

async fn daily_csv(State(context): State<Arc<RequestContext>>) -> Result<Response, HttpError> {
    let report = context.current().await?;
    Ok(csv_response("daily.csv", export::daily_csv(&report)?))
}

async fn refresh(State(context): State<Arc<RequestContext>>) -> Result<Json<Arc<Report>>, HttpError> {
    Ok(Json(context.refresh().await?))
}

fn csv_response(name: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, CSV_TEXT.to_owned()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::{router, RequestContext};
    use crate::auth::{hash_password, UserTable};
    use crate::dashboard::tests::{coord, settings, table, two_days, FakeSource};
    use crate::dashboard::Dashboard;
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    // "alice:hunter2"
    const ALICE: &str = "Basic YWxpY2U6aHVudGVyMg==";
    // "alice:wrong"
    const ALICE_WRONG: &str = "Basic YWxpY2U6d3Jvbmc=";

    fn context(source: FakeSource) -> RequestContext {
        let dashboard = Dashboard::new(table(), Arc::new(source), settings());
        RequestContext::new(dashboard, Duration::seconds(300))
    }

    fn healthy() -> FakeSource {
        FakeSource::new(&[(coord(40.0), two_days(14.0, 14.0)), (coord(30.0), two_days(68.0, 68.0))])
    }

    fn users() -> UserTable {
        let mut users = HashMap::new();
        users.insert("alice".to_owned(), hash_password("", "hunter2"));
        UserTable::new(users)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_as(uri: &str, auth: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_report_json() {
        let app = router(Arc::new(context(healthy())));
        let (status, body) = send(app, get("/report")).await;

        assert_eq!(StatusCode::OK, status);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(75.0, value["day1"]["value"]);
        assert_eq!("Neutral", value["bias"]);
        assert_eq!("threshold", value["scoring"]);
    }

    #[tokio::test]
    async fn test_summary_csv() {
        let app = router(Arc::new(context(healthy())));
        let res = app.oneshot(get("/summary.csv")).await.unwrap();

        assert_eq!(StatusCode::OK, res.status());
        assert_eq!("text/csv; charset=utf-8", res.headers()[CONTENT_TYPE].to_str().unwrap());
    }

    #[tokio::test]
    async fn test_daily_csv() {
        let app = router(Arc::new(context(healthy())));
        let (status, body) = send(app, get("/daily.csv")).await;

        assert_eq!(StatusCode::OK, status);
        assert!(body.starts_with("Date,Observed Demand,Forecast Demand,Close"));
        assert!(body.contains("2024-01-16,"));
    }

    #[tokio::test]
    async fn test_weather_unavailable() {
        let app = router(Arc::new(context(FakeSource::new(&[]))));
        let (status, body) = send(app, get("/report")).await;

        assert_eq!(StatusCode::SERVICE_UNAVAILABLE, status);
        assert!(body.contains("weather data unavailable"));
    }

    #[tokio::test]
    async fn test_metrics_after_report() {
        let context = Arc::new(context(healthy()));
        let (status, _) = send(router(context.clone()), get("/report")).await;
        assert_eq!(StatusCode::OK, status);

        let (status, body) = send(router(context), get("/metrics")).await;
        assert_eq!(StatusCode::OK, status);
        assert!(body.contains(r#"ng_demand_index{window="day1"} 75.0"#));
    }

    #[tokio::test]
    async fn test_auth_required() {
        let context = Arc::new(context(healthy()).with_users(users()));

        let (status, _) = send(router(context.clone()), get("/report")).await;
        assert_eq!(StatusCode::UNAUTHORIZED, status);

        let (status, wrong) = send(router(context.clone()), get_as("/report", ALICE_WRONG)).await;
        assert_eq!(StatusCode::UNAUTHORIZED, status);

        let (status, unknown) = send(router(context.clone()), get_as("/report", "Basic Ym9iOmh1bnRlcjI=")).await;
        assert_eq!(StatusCode::UNAUTHORIZED, status);
        assert_eq!(wrong, unknown);

        let (status, _) = send(router(context.clone()), get_as("/report", ALICE)).await;
        assert_eq!(StatusCode::OK, status);

        let (status, _) = send(router(context), get("/metrics")).await;
        assert_eq!(StatusCode::OK, status);
    }

    #[tokio::test]
    async fn test_refresh() {
        let app = router(Arc::new(context(healthy())));
        let req = Request::builder()
            .method("POST")
            .uri("/refresh")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, req).await;
        assert_eq!(StatusCode::OK, status);
        assert!(body.contains("\"day1\""));
    }
}
