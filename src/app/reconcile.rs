//! The reconciliation loop: drains unlinked charge events through the
//! builder, backfills missing amounts and start ranges in bounded batches,
//! repairs negative values at startup, and triggers pricing when new
//! amounts land.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::adapters::db;
use crate::app::collector::{self, AmountOutcome};
use crate::app::pricing;
use crate::app::runtime::{PipelineContext, sleep_with_stop};
use crate::app::services::ServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub events_found: usize,
    pub events_linked: usize,
    pub amounts_written: usize,
    pub start_ranges_written: usize,
}

impl CycleOutcome {
    pub fn made_progress(&self) -> bool {
        self.events_found > 0
            || self.events_linked > 0
            || self.amounts_written > 0
            || self.start_ranges_written > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub marked_unrecoverable: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub amounts_repaired: usize,
    pub prices_cleared: usize,
}

pub fn run_cycle(ctx: &Arc<PipelineContext>) -> Result<CycleOutcome, ServiceError> {
    let events_found = {
        let connection = ctx.lock_connection()?;
        collector::find_charges(&connection)?
    };

    let events_linked = drain_unlinked_events(ctx)?;
    let amounts = process_all_amounts(ctx)?;
    let start_ranges = process_all_start_ranges(ctx)?;

    if amounts.processed > 0 {
        trigger_bulk_pricing(ctx);
    }

    Ok(CycleOutcome {
        events_found,
        events_linked,
        amounts_written: amounts.processed,
        start_ranges_written: start_ranges.processed,
    })
}

/// Processes unlinked events oldest first, stopping on the first failure so
/// a poison record delays the rest until the next cycle instead of spinning.
pub fn drain_unlinked_events(ctx: &PipelineContext) -> Result<usize, ServiceError> {
    let mut linked = 0;

    loop {
        let next = {
            let connection = ctx.lock_connection()?;
            db::next_unlinked_event(&connection)?
        };
        let Some(event) = next else {
            break;
        };

        let result = {
            let connection = ctx.lock_connection()?;
            let mut state = ctx.lock_session_state()?;
            collector::process_event(&connection, &mut state, &ctx.settings.home, &event)
        };

        match result {
            Ok(()) => linked += 1,
            Err(error) => {
                tracing::warn!(
                    event_id = event.id,
                    %error,
                    "event processing failed, retrying next cycle"
                );
                break;
            }
        }
    }

    Ok(linked)
}

/// Backfills amounts for closed hours. Hours with `stop_at` still NULL are
/// not scanned at all; sentineling a charge in progress would lose its
/// energy for good once the stop event lands.
pub fn process_all_amounts(ctx: &PipelineContext) -> Result<BatchReport, ServiceError> {
    let mut report = BatchReport::default();
    let mut consecutive_failures = 0_u32;

    loop {
        let connection = ctx.lock_connection()?;
        let Some(hour) = db::next_hour_missing_amount(&connection)? else {
            break;
        };

        match collector::compute_amount(&connection, &hour, ctx.settings.battery_capacity_kwh)? {
            AmountOutcome::Computed(result) => {
                db::set_amount(&connection, hour.id, result.kwh)?;
                tracing::info!(
                    hour = %hour.log_timestamp,
                    kwh = result.kwh,
                    source = ?result.source,
                    "amount backfilled"
                );
                report.processed += 1;
                consecutive_failures = 0;
            }
            AmountOutcome::MissingBounds => {
                db::mark_amount_unrecoverable(&connection, hour.id)?;
                tracing::warn!(
                    hour = %hour.log_timestamp,
                    "hour has no usable start/stop, marked unrecoverable"
                );
                report.marked_unrecoverable += 1;
                consecutive_failures += 1;
                if consecutive_failures >= ctx.settings.max_consecutive_failures {
                    tracing::warn!(
                        failures = consecutive_failures,
                        "too many consecutive amount failures, stopping batch"
                    );
                    break;
                }
            }
        }
    }

    Ok(report)
}

pub fn process_all_start_ranges(ctx: &PipelineContext) -> Result<BatchReport, ServiceError> {
    let mut report = BatchReport::default();
    let mut consecutive_failures = 0_u32;

    loop {
        let connection = ctx.lock_connection()?;
        let Some(hour) = db::next_hour_missing_start_range(&connection)? else {
            break;
        };

        match collector::lookup_start_range(&connection, &hour)? {
            Some(start_range) => {
                db::set_start_range(&connection, hour.id, start_range)?;
                tracing::info!(hour = %hour.log_timestamp, start_range, "start range backfilled");
                report.processed += 1;
                consecutive_failures = 0;
            }
            None => {
                db::mark_start_range_unrecoverable(&connection, hour.id)?;
                tracing::warn!(
                    hour = %hour.log_timestamp,
                    "no prior range reading found, marked unrecoverable"
                );
                report.marked_unrecoverable += 1;
                consecutive_failures += 1;
                if consecutive_failures >= ctx.settings.max_consecutive_failures {
                    tracing::warn!(
                        failures = consecutive_failures,
                        "too many consecutive start-range failures, stopping batch"
                    );
                    break;
                }
            }
        }
    }

    Ok(report)
}

/// Startup repair pass. Recomputes hours whose amount went negative and
/// clears negative prices so the price loop recomputes them. Rows carrying
/// the -1 unrecoverable sentinel keep it when their bounds are still unusable.
pub fn fix_negative_values(ctx: &PipelineContext) -> Result<RepairReport, ServiceError> {
    let mut report = RepairReport::default();

    let connection = ctx.lock_connection()?;

    for hour in db::hours_with_negative_amount(&connection)? {
        match collector::compute_amount(&connection, &hour, ctx.settings.battery_capacity_kwh)? {
            AmountOutcome::Computed(result) => {
                db::set_amount(&connection, hour.id, result.kwh)?;
                tracing::info!(
                    hour = %hour.log_timestamp,
                    old_amount = hour.amount,
                    kwh = result.kwh,
                    "negative amount repaired"
                );
                report.amounts_repaired += 1;
            }
            AmountOutcome::MissingBounds => {
                tracing::debug!(hour = %hour.log_timestamp, "unrecoverable row left as is");
            }
        }
    }

    for hour_id in db::hour_ids_with_negative_price(&connection)? {
        db::clear_price(&connection, hour_id)?;
        tracing::info!(hour_id, "negative price cleared for recompute");
        report.prices_cleared += 1;
    }

    Ok(report)
}

/// Fire-and-forget bulk pricing. Runs detached with its own error logging;
/// a failure never reaches the cycle that triggered it.
pub fn trigger_bulk_pricing(ctx: &Arc<PipelineContext>) {
    let ctx = Arc::clone(ctx);
    std::thread::spawn(move || match pricing::update_all(&ctx) {
        Ok(report) => {
            tracing::info!(
                updated = report.updated,
                remaining = report.remaining,
                "bulk price update finished"
            );
        }
        Err(error) => tracing::error!(%error, "bulk price update failed"),
    });
}

pub fn spawn_reconcile_loop(
    ctx: Arc<PipelineContext>,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        match fix_negative_values(&ctx) {
            Ok(report) => {
                tracing::info!(
                    amounts_repaired = report.amounts_repaired,
                    prices_cleared = report.prices_cleared,
                    "startup negative-value repair finished"
                );
            }
            Err(error) => tracing::error!(%error, "startup negative-value repair failed"),
        }
        trigger_bulk_pricing(&ctx);

        while !stop_flag.load(Ordering::Relaxed) {
            let interval = match run_cycle(&ctx) {
                Ok(outcome) if outcome.made_progress() => {
                    tracing::info!(
                        events_found = outcome.events_found,
                        events_linked = outcome.events_linked,
                        amounts_written = outcome.amounts_written,
                        start_ranges_written = outcome.start_ranges_written,
                        "reconcile cycle made progress"
                    );
                    ctx.settings.retry_interval
                }
                Ok(_) => ctx.settings.reconcile_interval,
                Err(error) => {
                    tracing::error!(%error, "reconcile cycle failed");
                    ctx.settings.reconcile_interval
                }
            };
            sleep_with_stop(interval, &stop_flag);
        }
    })
}
