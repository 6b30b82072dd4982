//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;
use vocab_delivery_core::{
    dispatcher::run_dispatcher,
    domain::DeliveryStatusRecord,
    health::{compute_health, run_repair, HealthSnapshot, RepairAction},
    scheduler::run_scheduler,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        run_scheduler_handler,
        run_dispatcher_handler,
        health_handler,
        repair_handler,
        delivery_status_webhook_handler,
    ),
    components(
        schemas(
            SchedulerRunResponse,
            SchedulerFailure,
            DispatchRunResponse,
            HealthResponse,
            AlertResponse,
            RepairResponse,
            DeliveryStatusPayload,
        )
    ),
    tags(
        (name = "Vocab Delivery API", description = "Operational endpoints for the word delivery pipeline.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The outcome of one scheduler run.
#[derive(Serialize, ToSchema)]
pub struct SchedulerRunResponse {
    subscribers_processed: u32,
    jobs_created: u32,
    skipped_already_scheduled: u32,
    skipped_invalid: u32,
    failures: Vec<SchedulerFailure>,
}

#[derive(Serialize, ToSchema)]
pub struct SchedulerFailure {
    subscriber_id: Uuid,
    reason: String,
}

/// The outcome of one dispatcher run.
#[derive(Serialize, ToSchema)]
pub struct DispatchRunResponse {
    examined: u32,
    sent: u32,
    failed: u32,
    deferred: u32,
    skipped_not_queued: u32,
}

#[derive(Serialize, ToSchema)]
pub struct AlertResponse {
    severity: String,
    code: String,
    message: String,
}

/// The aggregate health view of the delivery pipeline.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    overall: String,
    scheduler_ran_today: bool,
    queued_backlog: i64,
    sent_in_window: i64,
    failed_in_window: i64,
    failure_rate: f64,
    active_subscribers: i64,
    subscribers_covered_today: i64,
    coverage: f64,
    alerts: Vec<AlertResponse>,
}

impl HealthResponse {
    fn from_snapshot(snapshot: HealthSnapshot) -> Self {
        Self {
            overall: snapshot.overall.as_str().to_string(),
            scheduler_ran_today: snapshot.scheduler_ran_today,
            queued_backlog: snapshot.queued_backlog,
            sent_in_window: snapshot.sent_in_window,
            failed_in_window: snapshot.failed_in_window,
            failure_rate: snapshot.failure_rate,
            active_subscribers: snapshot.active_subscribers,
            subscribers_covered_today: snapshot.subscribers_covered_today,
            coverage: snapshot.coverage,
            alerts: snapshot
                .alerts
                .into_iter()
                .map(|a| AlertResponse {
                    severity: a.severity.as_str().to_string(),
                    code: a.code.to_string(),
                    message: a.message,
                })
                .collect(),
        }
    }
}

/// The outcome of one repair action.
#[derive(Serialize, ToSchema)]
pub struct RepairResponse {
    action: String,
    affected: u64,
    detail: String,
}

/// A provider delivery-status callback (delivered, read, bounced, ...).
#[derive(Deserialize, ToSchema)]
pub struct DeliveryStatusPayload {
    pub provider: String,
    pub provider_message_id: String,
    pub status: String,
    pub job_id: Option<Uuid>,
    pub occurred_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Run the outbox scheduler for today.
///
/// Idempotent: subscribers that already have jobs for today are skipped.
#[utoipa::path(
    post,
    path = "/scheduler/run",
    responses(
        (status = 200, description = "Scheduler run completed", body = SchedulerRunResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn run_scheduler_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Utc::now();
    let summary = run_scheduler(
        app_state.store.as_ref(),
        app_state.generator.as_ref(),
        now.date_naive(),
        now,
        rand::random(),
    )
    .await
    .map_err(|e| {
        error!("Scheduler run failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Scheduler run failed".to_string(),
        )
    })?;

    Ok(Json(SchedulerRunResponse {
        subscribers_processed: summary.subscribers_processed,
        jobs_created: summary.jobs_created,
        skipped_already_scheduled: summary.skipped_already_scheduled,
        skipped_invalid: summary.skipped_invalid,
        failures: summary
            .failures
            .into_iter()
            .map(|f| SchedulerFailure {
                subscriber_id: f.subscriber_id,
                reason: f.reason,
            })
            .collect(),
    }))
}

/// Run the delivery dispatcher once, draining currently due jobs.
#[utoipa::path(
    post,
    path = "/dispatcher/run",
    responses(
        (status = 200, description = "Dispatcher run completed", body = DispatchRunResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn run_dispatcher_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let summary = run_dispatcher(
        app_state.store.as_ref(),
        app_state.whatsapp.as_ref(),
        app_state.email.as_ref(),
        Utc::now(),
    )
    .await
    .map_err(|e| {
        error!("Dispatcher run failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Dispatcher run failed".to_string(),
        )
    })?;

    Ok(Json(DispatchRunResponse {
        examined: summary.examined,
        sent: summary.sent,
        failed: summary.failed,
        deferred: summary.deferred,
        skipped_not_queued: summary.skipped_not_queued,
    }))
}

/// Report the aggregate health of the delivery pipeline.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health snapshot", body = HealthResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn health_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Utc::now();
    let snapshot = compute_health(app_state.store.as_ref(), now.date_naive(), now)
        .await
        .map_err(|e| {
            error!("Health computation failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Health computation failed".to_string(),
            )
        })?;
    Ok(Json(HealthResponse::from_snapshot(snapshot)))
}

/// Execute one named repair action.
#[utoipa::path(
    post,
    path = "/repairs/{action}",
    responses(
        (status = 200, description = "Repair completed", body = RepairResponse),
        (status = 400, description = "Unknown repair action"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("action" = String, Path, description = "One of: rerun-scheduler, requeue-failed, backfill-defaults, purge-unreachable")
    )
)]
pub async fn repair_handler(
    State(app_state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let action: RepairAction = action
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;

    let now = Utc::now();
    let outcome = run_repair(
        action,
        app_state.store.as_ref(),
        app_state.generator.as_ref(),
        now.date_naive(),
        now,
        rand::random(),
    )
    .await
    .map_err(|e| {
        error!("Repair action failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Repair action failed".to_string(),
        )
    })?;

    Ok(Json(RepairResponse {
        action: outcome.action.as_str().to_string(),
        affected: outcome.affected,
        detail: outcome.detail,
    }))
}

/// Record a provider delivery-status callback.
///
/// Append-only: statuses are kept for audit, they never mutate job state.
#[utoipa::path(
    post,
    path = "/webhooks/delivery-status",
    request_body = DeliveryStatusPayload,
    responses(
        (status = 202, description = "Status recorded"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delivery_status_webhook_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<DeliveryStatusPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let record = DeliveryStatusRecord {
        id: Uuid::new_v4(),
        job_id: payload.job_id,
        provider_message_id: payload.provider_message_id,
        provider: payload.provider,
        status: payload.status,
        occurred_at: payload.occurred_at.unwrap_or_else(Utc::now),
    };

    app_state
        .store
        .append_delivery_status(&record)
        .await
        .map_err(|e| {
            error!("Failed to record delivery status: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to record delivery status".to_string(),
            )
        })?;

    Ok(StatusCode::ACCEPTED)
}
