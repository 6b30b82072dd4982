//! crates/vocab_delivery_core/src/health.rs
//!
//! The Health/Reconciliation Monitor: aggregate signals over the outbox and
//! delivery state, plus the named repair actions operators can invoke. The
//! snapshot is read-only; repairs are explicit and never auto-triggered.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::str::FromStr;
use tracing::info;

use crate::ports::{DeliveryStore, PortResult, WordGenerationService};
use crate::scheduler::run_scheduler;

/// Queued jobs above this count raise a warning.
pub const BACKLOG_WARNING_THRESHOLD: i64 = 100;
/// Failure rate over the trailing window above this raises a warning.
pub const FAILURE_RATE_WARNING: f64 = 0.10;
/// ...and above this, a critical alert.
pub const FAILURE_RATE_CRITICAL: f64 = 0.20;
/// Fraction of active subscribers with a job today below this is a warning.
pub const COVERAGE_WARNING: f64 = 0.80;
/// Trailing window for the failure-rate metric.
pub const FAILURE_RATE_WINDOW_HOURS: i64 = 24;

/// Overall severity, the max of all alert severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

/// One threshold breach, with a stable code for alerting rules.
#[derive(Debug, Clone)]
pub struct HealthAlert {
    pub severity: HealthStatus,
    pub code: &'static str,
    pub message: String,
}

/// Read-only aggregate view of the delivery system's state.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub scheduler_ran_today: bool,
    pub queued_backlog: i64,
    pub sent_in_window: i64,
    pub failed_in_window: i64,
    /// `failed / (sent + failed)` over the trailing window; 0 when idle.
    pub failure_rate: f64,
    pub active_subscribers: i64,
    pub subscribers_covered_today: i64,
    /// Fraction of active subscribers with at least one job today; 1 when
    /// there are no active subscribers.
    pub coverage: f64,
    pub alerts: Vec<HealthAlert>,
    pub overall: HealthStatus,
}

/// Computes the health snapshot for one delivery day.
pub async fn compute_health(
    store: &dyn DeliveryStore,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> PortResult<HealthSnapshot> {
    let jobs_today = store.jobs_created_on(today).await?;
    let queued_backlog = store.queued_backlog().await?;
    let window_start = now - Duration::hours(FAILURE_RATE_WINDOW_HOURS);
    let counts = store.delivery_counts_since(window_start).await?;
    let active_subscribers = store.count_active_subscribers().await?;
    let covered = store.subscribers_with_jobs_on(today).await?;

    let attempted = counts.sent + counts.failed;
    let failure_rate = if attempted > 0 {
        counts.failed as f64 / attempted as f64
    } else {
        0.0
    };
    let coverage = if active_subscribers > 0 {
        covered as f64 / active_subscribers as f64
    } else {
        1.0
    };
    let scheduler_ran_today = jobs_today > 0;

    let mut alerts = Vec::new();
    if !scheduler_ran_today {
        alerts.push(HealthAlert {
            severity: HealthStatus::Critical,
            code: "scheduler-silent",
            message: format!("scheduler produced no jobs for {today}"),
        });
    }
    if queued_backlog > BACKLOG_WARNING_THRESHOLD {
        alerts.push(HealthAlert {
            severity: HealthStatus::Warning,
            code: "backlog-high",
            message: format!(
                "queued backlog is {queued_backlog} (threshold {BACKLOG_WARNING_THRESHOLD})"
            ),
        });
    }
    if failure_rate > FAILURE_RATE_CRITICAL {
        alerts.push(HealthAlert {
            severity: HealthStatus::Critical,
            code: "failure-rate-critical",
            message: format!("delivery failure rate is {:.1}%", failure_rate * 100.0),
        });
    } else if failure_rate > FAILURE_RATE_WARNING {
        alerts.push(HealthAlert {
            severity: HealthStatus::Warning,
            code: "failure-rate-high",
            message: format!("delivery failure rate is {:.1}%", failure_rate * 100.0),
        });
    }
    if active_subscribers > 0 && coverage < COVERAGE_WARNING {
        alerts.push(HealthAlert {
            severity: HealthStatus::Warning,
            code: "coverage-low",
            message: format!(
                "only {covered} of {active_subscribers} active subscribers have a job today"
            ),
        });
    }

    let overall = alerts
        .iter()
        .map(|a| a.severity)
        .max()
        .unwrap_or(HealthStatus::Ok);

    Ok(HealthSnapshot {
        scheduler_ran_today,
        queued_backlog,
        sent_in_window: counts.sent,
        failed_in_window: counts.failed,
        failure_rate,
        active_subscribers,
        subscribers_covered_today: covered,
        coverage,
        alerts,
        overall,
    })
}

//=========================================================================================
// Repair Actions
//=========================================================================================

/// The repair operations exposed to operators. Each is independently
/// invocable and idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    /// Re-run the Outbox Scheduler for today (idempotent re-run).
    RerunScheduler,
    /// Put today's failed jobs back in the queue.
    RequeueFailed,
    /// Fill in missing per-subscriber delivery-settings defaults.
    BackfillDefaults,
    /// Remove subscriptions with no usable delivery target.
    PurgeUnreachable,
}

impl RepairAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairAction::RerunScheduler => "rerun-scheduler",
            RepairAction::RequeueFailed => "requeue-failed",
            RepairAction::BackfillDefaults => "backfill-defaults",
            RepairAction::PurgeUnreachable => "purge-unreachable",
        }
    }
}

impl FromStr for RepairAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rerun-scheduler" => Ok(RepairAction::RerunScheduler),
            "requeue-failed" => Ok(RepairAction::RequeueFailed),
            "backfill-defaults" => Ok(RepairAction::BackfillDefaults),
            "purge-unreachable" => Ok(RepairAction::PurgeUnreachable),
            other => Err(format!("unknown repair action '{other}'")),
        }
    }
}

/// What a repair run did.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub action: RepairAction,
    /// Rows or jobs affected by the repair.
    pub affected: u64,
    pub detail: String,
}

/// Executes one repair action.
pub async fn run_repair(
    action: RepairAction,
    store: &dyn DeliveryStore,
    generator: &dyn WordGenerationService,
    today: NaiveDate,
    now: DateTime<Utc>,
    seed: u64,
) -> PortResult<RepairOutcome> {
    info!(action = action.as_str(), day = %today, "repair action requested");
    let outcome = match action {
        RepairAction::RerunScheduler => {
            let summary = run_scheduler(store, generator, today, now, seed).await?;
            RepairOutcome {
                action,
                affected: u64::from(summary.jobs_created),
                detail: format!(
                    "scheduler re-run: {} jobs created, {} subscribers already scheduled",
                    summary.jobs_created, summary.skipped_already_scheduled
                ),
            }
        }
        RepairAction::RequeueFailed => {
            let requeued = store.requeue_failed_on(today).await?;
            RepairOutcome {
                action,
                affected: requeued,
                detail: format!("{requeued} failed jobs re-queued for {today}"),
            }
        }
        RepairAction::BackfillDefaults => {
            let updated = store.backfill_delivery_defaults().await?;
            RepairOutcome {
                action,
                affected: updated,
                detail: format!("{updated} subscribers backfilled with default settings"),
            }
        }
        RepairAction::PurgeUnreachable => {
            let purged = store.purge_unreachable_subscribers().await?;
            RepairOutcome {
                action,
                affected: purged,
                detail: format!("{purged} unreachable subscriptions purged"),
            }
        }
    };
    info!(action = action.as_str(), affected = outcome.affected, "repair action finished");
    Ok(outcome)
}
