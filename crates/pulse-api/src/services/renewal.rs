//! Background subscription renewal sweep.
//!
//! Each tick charges due subscriptions for another period or lets them
//! lapse. Concurrent instances are safe: rows are claimed with
//! `FOR UPDATE SKIP LOCKED`.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use pulse_db::{RenewalReport, SubscriptionRepository};

use crate::metrics;

/// Subscriptions processed per sweep batch.
const RENEWAL_BATCH: u32 = 200;

/// Upper bound on batches per tick.
const MAX_BATCHES_PER_TICK: u32 = 50;

/// Renewal sweep service.
pub struct SubscriptionRenewalTask {
    subscriptions: SubscriptionRepository,
    interval: Duration,
    enabled: bool,
}

impl SubscriptionRenewalTask {
    pub fn new(subscriptions: SubscriptionRepository, interval: Duration, enabled: bool) -> Self {
        Self {
            subscriptions,
            interval,
            enabled,
        }
    }

    /// Start the background loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Subscription renewal is disabled");
            return;
        }

        info!("Starting subscription renewal sweep (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_once().await {
                error!("Subscription renewal error: {:#}", e);
            }
        }
    }

    /// Sweep everything due right now, batch by batch.
    pub async fn run_once(&self) -> anyhow::Result<RenewalReport> {
        let now = Utc::now();
        let mut total = RenewalReport::default();

        for _ in 0..MAX_BATCHES_PER_TICK {
            let report = self.subscriptions.renew_due(now, RENEWAL_BATCH).await?;
            total.renewed += report.renewed;
            total.expired += report.expired;
            total.skipped += report.skipped;
            total.failed += report.failed;

            // Stop on a short batch, or when nothing moved (failures keep rows due).
            if report.total() < RENEWAL_BATCH || report.renewed + report.expired == 0 {
                break;
            }
        }

        if total.total() > 0 {
            metrics::record_renewals(total.renewed, total.expired, total.failed);
        }
        Ok(total)
    }
}
