use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::adapters::report_html::render_month_report;
use crate::app::collector::ingest_event;
use crate::app::pricing::{self, PriceOutcome};
use crate::app::reconcile;
use crate::app::runtime::PipelineContext;
use crate::app::services::{ChargeQueryHandler, ServiceError, SqliteChargeService};
use crate::domain::session::parse_timestamp;

#[derive(Clone)]
pub struct ApiState {
    pub queries: SqliteChargeService,
    pub pipeline: Option<Arc<PipelineContext>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub schema_version: u32,
    pub raw_logs_count: i64,
    pub charge_events_count: i64,
    pub charge_hours_count: i64,
    pub unpriced_hours_count: i64,
    pub latest_raw_log_timestamp: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargeHourResponse {
    pub id: i64,
    pub hour: String,
    pub start_at: Option<String>,
    pub stop_at: Option<String>,
    pub position: Option<String>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
    pub soc: Option<i64>,
    pub mileage: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentHoursQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawLogAgeQuery {
    pub threshold_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub fn configure_common_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}

pub fn configure_service_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(status_endpoint)
        .service(recent_charge_hours_endpoint)
        .service(rawlog_age_endpoint)
        .service(ingest_event_endpoint)
        .service(collect_charges_endpoint)
        .service(find_charges_endpoint)
        .service(process_all_amounts_endpoint)
        .service(process_all_start_ranges_endpoint)
        .service(fix_negative_amounts_endpoint)
        .service(update_charges_endpoint)
        .service(update_all_charges_endpoint);
}

pub fn configure_report_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(month_report_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/status")]
async fn status_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let schema_version = match state.queries.get_schema_version() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let raw_logs_count = match state.queries.count_raw_logs() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let charge_events_count = match state.queries.count_charge_events() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let charge_hours_count = match state.queries.count_charge_hours() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let unpriced_hours_count = match state.queries.count_unpriced_hours() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let latest_raw_log_timestamp = match state.queries.latest_raw_log_timestamp() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };

    HttpResponse::Ok().json(StatusResponse {
        schema_version,
        raw_logs_count,
        charge_events_count,
        charge_hours_count,
        unpriced_hours_count,
        latest_raw_log_timestamp,
    })
}

#[get("/charges")]
async fn recent_charge_hours_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<RecentHoursQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    match state.queries.recent_charge_hours(limit) {
        Ok(hours) => {
            let mapped: Vec<ChargeHourResponse> = hours
                .into_iter()
                .map(|hour| ChargeHourResponse {
                    id: hour.id,
                    hour: hour.log_timestamp,
                    start_at: hour.start_at,
                    stop_at: hour.stop_at,
                    position: hour.position,
                    amount: hour.amount,
                    price: hour.price,
                    soc: hour.soc,
                    mileage: hour.mileage,
                })
                .collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

/// Freshness probe for the ingestion side: 404 when no raw logs exist yet,
/// 503 when the newest one is older than the threshold.
#[get("/health/rawlogs/age")]
async fn rawlog_age_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<RawLogAgeQuery>,
) -> impl Responder {
    let threshold_seconds = query.threshold_seconds.unwrap_or(3600).max(1);

    let latest = match state.queries.latest_raw_log_timestamp() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let Some(latest) = latest else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "no raw logs recorded yet"
        }));
    };
    let Some(latest_at) = parse_timestamp(&latest) else {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("latest raw log timestamp does not parse: {latest}")
        }));
    };

    let age_seconds = (Utc::now().naive_utc() - latest_at).num_seconds();
    let body = serde_json::json!({
        "latestTimestamp": latest,
        "ageSeconds": age_seconds,
        "thresholdSeconds": threshold_seconds,
    });

    if age_seconds > threshold_seconds {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

#[post("/ingest-event")]
async fn ingest_event_endpoint(
    state: web::Data<ApiState>,
    payload: web::Json<serde_json::Value>,
) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    let connection = match ctx.lock_connection() {
        Ok(connection) => connection,
        Err(error) => return service_error_response(error),
    };

    match ingest_event(&connection, Utc::now().naive_utc(), &payload) {
        Ok(charging_related) => HttpResponse::Ok().json(serde_json::json!({
            "stored": true,
            "chargingRelated": charging_related,
        })),
        Err(error) => service_error_response(ServiceError::from(error)),
    }
}

/// Kicks off a full reconcile cycle in the background and returns
/// immediately. The cycle logs its own outcome.
#[get("/collect-charges")]
async fn collect_charges_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    let ctx = Arc::clone(ctx);
    std::thread::spawn(move || match reconcile::run_cycle(&ctx) {
        Ok(outcome) => {
            tracing::info!(
                events_found = outcome.events_found,
                events_linked = outcome.events_linked,
                amounts_written = outcome.amounts_written,
                start_ranges_written = outcome.start_ranges_written,
                "manual charge collection finished"
            );
        }
        Err(error) => tracing::error!(%error, "manual charge collection failed"),
    });

    HttpResponse::Ok().body("Charge collection initiated.")
}

#[get("/find-charges")]
async fn find_charges_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    let result = ctx
        .lock_connection()
        .and_then(|connection| {
            crate::app::collector::find_charges(&connection).map_err(ServiceError::from)
        });

    match result {
        Ok(events_found) => HttpResponse::Ok().json(serde_json::json!({
            "eventsFound": events_found
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/process-all-amounts")]
async fn process_all_amounts_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    match reconcile::process_all_amounts(ctx) {
        Ok(report) => {
            if report.processed > 0 {
                reconcile::trigger_bulk_pricing(ctx);
            }
            HttpResponse::Ok().json(serde_json::json!({
                "processed": report.processed,
                "markedUnrecoverable": report.marked_unrecoverable,
            }))
        }
        Err(error) => service_error_response(error),
    }
}

#[get("/process-all-start-ranges")]
async fn process_all_start_ranges_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    match reconcile::process_all_start_ranges(ctx) {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "processed": report.processed,
            "markedUnrecoverable": report.marked_unrecoverable,
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/fix-negative-amounts")]
async fn fix_negative_amounts_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    match reconcile::fix_negative_values(ctx) {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "amountsRepaired": report.amounts_repaired,
            "pricesCleared": report.prices_cleared,
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/update-charges")]
async fn update_charges_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    match pricing::update_one(ctx) {
        Ok(PriceOutcome::Updated { hour_id, price }) => {
            HttpResponse::Ok().json(serde_json::json!({
                "outcome": "updated",
                "hourId": hour_id,
                "price": price,
            }))
        }
        Ok(PriceOutcome::NothingToPrice) => HttpResponse::Ok().json(serde_json::json!({
            "outcome": "nothingToPrice"
        })),
        Ok(PriceOutcome::SpotUnavailable) => HttpResponse::Ok().json(serde_json::json!({
            "outcome": "spotUnavailable"
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/update-all-charges")]
async fn update_all_charges_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let Some(ctx) = &state.pipeline else {
        return pipeline_unavailable_response();
    };

    match pricing::update_all(ctx) {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "updated": report.updated,
            "remaining": report.remaining,
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/")]
async fn month_report_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<ReportQuery>,
) -> impl Responder {
    let now = Utc::now().naive_utc().date();
    let year = query.year.unwrap_or_else(|| chrono::Datelike::year(&now));
    let month = query
        .month
        .unwrap_or_else(|| chrono::Datelike::month(&now))
        .clamp(1, 12);

    let from_inclusive = format!("{year:04}-{month:02}-01 00:00:00");
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let to_exclusive = format!("{next_year:04}-{next_month:02}-01 00:00:00");

    let rows = match state.queries.month_hours(&from_inclusive, &to_exclusive) {
        Ok(rows) => rows,
        Err(error) => return service_error_response(error),
    };

    match render_month_report(&rows, year, month) {
        Ok(html) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html),
        Err(error) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("report rendering failed: {error}")
        })),
    }
}

fn pipeline_unavailable_response() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "error": "background pipeline is not running in this mode"
    }))
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, body::to_bytes, http::StatusCode, test, web};

    use crate::adapters::db;
    use crate::app::runtime::PipelineContext;
    use crate::app::services::SqliteChargeService;
    use crate::domain::session::format_timestamp;
    use crate::test_support::{open_test_connection, test_pipeline_context};

    use super::{
        ApiState, configure_common_routes, configure_report_routes, configure_service_routes,
    };

    fn build_state(name: &str) -> (ApiState, Arc<PipelineContext>) {
        let ctx = test_pipeline_context(open_test_connection(name));
        let queries = SqliteChargeService::new(ctx.connection_handle());

        (
            ApiState {
                queries,
                pipeline: Some(Arc::clone(&ctx)),
            },
            ctx,
        )
    }

    macro_rules! build_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure_common_routes)
                    .configure(configure_service_routes)
                    .configure(configure_report_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_endpoint_returns_ok() {
        let (state, _ctx) = build_state("api-health");
        let app = build_app!(state);

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn status_reports_counts_and_schema_version() {
        let (state, ctx) = build_state("api-status");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            db::insert_raw_log(&connection, "2025-03-01 10:00:00", "Charging event detected.")
                .expect("insert should succeed");
            db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
                .expect("locate should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get().uri("/status").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["rawLogsCount"], 1);
        assert_eq!(json["chargeHoursCount"], 1);
        assert_eq!(json["latestRawLogTimestamp"], "2025-03-01 10:00:00");
    }

    #[actix_web::test]
    async fn rawlog_age_returns_404_when_empty() {
        let (state, _ctx) = build_state("api-rawlog-age-empty");
        let app = build_app!(state);

        let req = test::TestRequest::get()
            .uri("/health/rawlogs/age")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn rawlog_age_returns_ok_for_fresh_data() {
        let (state, ctx) = build_state("api-rawlog-age-fresh");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            let now = format_timestamp(chrono::Utc::now().naive_utc());
            db::insert_raw_log(&connection, &now, "Charging event detected.")
                .expect("insert should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get()
            .uri("/health/rawlogs/age?threshold_seconds=3600")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn rawlog_age_returns_503_for_stale_data() {
        let (state, ctx) = build_state("api-rawlog-age-stale");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            db::insert_raw_log(&connection, "2020-01-01 00:00:00", "Charging event detected.")
                .expect("insert should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get()
            .uri("/health/rawlogs/age?threshold_seconds=60")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn ingest_event_stores_payload() {
        let (state, ctx) = build_state("api-ingest-event");
        let app = build_app!(state);

        let payload = serde_json::json!({
            "event": {
                "name": "charging-status-changed",
                "data": { "soc": 55, "chargedRange": 210 }
            }
        });
        let req = test::TestRequest::post()
            .uri("/ingest-event")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let connection = ctx.lock_connection().expect("lock should work");
        assert!(db::count_raw_logs(&connection).expect("count should succeed") >= 1);
    }

    #[actix_web::test]
    async fn process_all_amounts_reports_unrecoverable_rows() {
        let (state, ctx) = build_state("api-process-amounts");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            // Closed hour with no start timestamp, so no window to compute.
            db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
                .expect("locate should succeed");
            db::close_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:40:00")
                .expect("close should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get()
            .uri("/process-all-amounts")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(json["processed"], 0);
        assert_eq!(json["markedUnrecoverable"], 1);
    }

    #[actix_web::test]
    async fn update_charges_prices_oldest_unpriced_hour() {
        let (state, ctx) = build_state("api-update-charges");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            let id = db::locate_charge_hour(&connection, "2025-06-10 12:00:00")
                .expect("locate should succeed");
            db::set_amount(&connection, id, 2.0).expect("set amount should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get().uri("/update-charges").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(json["outcome"], "updated");
    }

    #[actix_web::test]
    async fn pipeline_endpoints_refuse_report_only_mode() {
        let ctx = test_pipeline_context(open_test_connection("api-report-only"));
        let state = ApiState {
            queries: SqliteChargeService::new(ctx.connection_handle()),
            pipeline: None,
        };
        let app = build_app!(state);

        let req = test::TestRequest::get().uri("/find-charges").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn month_report_renders_html() {
        let (state, ctx) = build_state("api-month-report");
        {
            let connection = ctx.lock_connection().expect("lock should work");
            let id = db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
                .expect("locate should succeed");
            db::start_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:05:00")
                .expect("start should succeed");
            db::close_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:59:59")
                .expect("close should succeed");
            db::set_amount(&connection, id, 5.25).expect("set amount should succeed");
            db::set_price(&connection, id, 9.5).expect("set price should succeed");
        }
        let app = build_app!(state);

        let req = test::TestRequest::get()
            .uri("/?year=2025&month=3")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let html = String::from_utf8(body.to_vec()).expect("body should be utf-8");
        assert!(html.contains("5.25"));
        assert!(html.contains("2025"));
    }
}
