use std::time::Duration;

use chrono::{Datelike, NaiveDate, Timelike, Utc};
use tokio::time::sleep;

use crate::services::billing_batch::{next_billing_month, run_monthly_billing};
use crate::state::AppState;

/// Spawn the background scheduler that generates next month's bills.
///
/// The run fires once per calendar month, at or after `BILLING_RUN_DAY`
/// `BILLING_RUN_HOUR` in the billing timezone. Each run is its own
/// `tokio::spawn` so a failed run never stops the loop. A restart later in
/// the month triggers another run, which only picks up missing bills.
pub async fn run_background_scheduler(state: AppState) {
    let store = match state.store() {
        Ok(store) => store,
        Err(_) => {
            tracing::warn!("Scheduler: no database pool configured, exiting");
            return;
        }
    };

    let config = state.config.clone();
    tracing::info!(
        run_day = config.billing_run_day,
        run_hour = config.billing_run_hour,
        timezone = %config.billing_timezone,
        "Billing scheduler started"
    );

    let mut last_run_month: Option<(i32, u32)> = None;

    loop {
        sleep(Duration::from_secs(60)).await;

        let now_local = Utc::now().with_timezone(&config.billing_timezone);
        let today = now_local.date_naive();
        let Some((year, month)) = scheduled_billing_month(
            today,
            now_local.hour(),
            config.billing_run_day,
            config.billing_run_hour,
            last_run_month,
        ) else {
            continue;
        };

        last_run_month = Some((today.year(), today.month()));
        tracing::info!(year, month, "Scheduler: running monthly billing");

        let store = store.clone();
        let options = config.assembly_options(None);
        tokio::spawn(async move {
            match run_monthly_billing(&store, year, month, &options).await {
                Ok(stats) => tracing::info!(
                    run_id = %stats.run_id,
                    management_bills = stats.management_bills_created,
                    parking_bills = stats.parking_bills_created,
                    errors = stats.errors.len(),
                    "Scheduler: monthly billing completed"
                ),
                Err(error) => tracing::error!(
                    year,
                    month,
                    error = %error,
                    "Scheduler: monthly billing failed"
                ),
            }
        });
    }
}

/// Month to bill if the scheduled slot for `today` has been reached and
/// this calendar month has not run yet.
fn scheduled_billing_month(
    today: NaiveDate,
    hour: u32,
    run_day: u32,
    run_hour: u32,
    last_run_month: Option<(i32, u32)>,
) -> Option<(i32, u32)> {
    if last_run_month == Some((today.year(), today.month())) {
        return None;
    }
    if today.day() < run_day || (today.day() == run_day && hour < run_hour) {
        return None;
    }
    Some(next_billing_month(today))
}
