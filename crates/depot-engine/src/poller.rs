//! Manual-tick polling of pending deposits.
//!
//! [`PollingDriver::advance`] checks every pending deposit once. Callers
//! decide when to tick; [`wait_for`] is a ready-made loop that ticks, sleeps
//! and backs off according to a [`PollPolicy`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use depot_store::IngestBackend;
use depot_types::DepositId;

use crate::error::EngineResult;
use crate::submitter::{DepositStatus, DepositSubmitter};

/// How long and how often to poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Number of ticks before giving up.
    pub max_attempts: u32,
    /// Sleep after the first unsuccessful tick.
    pub interval_ms: u64,
    /// Multiplier applied to the interval after each tick. `1.0` keeps it fixed.
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 100,
            backoff_factor: 1.5,
            max_interval_ms: 2_000,
        }
    }
}

impl PollPolicy {
    /// A fixed interval with no backoff.
    pub fn fixed(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
            backoff_factor: 1.0,
            max_interval_ms: interval_ms,
        }
    }

    /// Sleep to use after `attempt` (1-based) unsuccessful ticks.
    pub fn interval_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let millis = (self.interval_ms as f64 * factor.powi(exponent)).min(self.max_interval_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// What one [`PollingDriver::advance`] tick observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub checked: usize,
    pub deposited: Vec<DepositId>,
    pub failed: Vec<DepositId>,
    pub still_pending: Vec<DepositId>,
    /// Deposits whose check hit an error; they stay pending.
    pub errors: Vec<(DepositId, String)>,
}

impl AdvanceReport {
    pub fn is_idle(&self) -> bool {
        self.checked == 0
    }
}

/// How a [`wait_for`] loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Deposited,
    Failed { reason: String },
    /// Still pending when the attempt budget ran out.
    TimedOut { attempts: u32 },
}

pub struct PollingDriver<B: IngestBackend + ?Sized> {
    submitter: Arc<DepositSubmitter<B>>,
}

impl<B: IngestBackend + ?Sized> Clone for PollingDriver<B> {
    fn clone(&self) -> Self {
        Self {
            submitter: Arc::clone(&self.submitter),
        }
    }
}

impl<B: IngestBackend + ?Sized> PollingDriver<B> {
    pub fn new(submitter: Arc<DepositSubmitter<B>>) -> Self {
        Self { submitter }
    }

    pub fn submitter(&self) -> &DepositSubmitter<B> {
        &self.submitter
    }

    /// Check every pending deposit once.
    pub fn advance(&self) -> EngineResult<AdvanceReport> {
        let mut report = AdvanceReport::default();
        for deposit_id in self.submitter.pending()? {
            report.checked += 1;
            match self.submitter.check(&deposit_id) {
                Ok(DepositStatus::Deposited) => report.deposited.push(deposit_id),
                Ok(DepositStatus::Failed) => report.failed.push(deposit_id),
                Ok(DepositStatus::Pending) => report.still_pending.push(deposit_id),
                Err(e) => {
                    warn!(deposit = %deposit_id, error = %e, "progress check failed; deposit stays pending");
                    report.errors.push((deposit_id, e.to_string()));
                }
            }
        }
        if !report.is_idle() {
            debug!(
                checked = report.checked,
                deposited = report.deposited.len(),
                failed = report.failed.len(),
                pending = report.still_pending.len(),
                "advanced deposits"
            );
        }
        Ok(report)
    }
}

/// Tick `driver` until `deposit_id` is final or `policy` runs out.
pub async fn wait_for<B: IngestBackend + ?Sized>(
    driver: &PollingDriver<B>,
    deposit_id: &DepositId,
    policy: &PollPolicy,
) -> EngineResult<WaitOutcome> {
    for attempt in 1..=policy.max_attempts {
        driver.advance()?;
        let record = driver.submitter().record(deposit_id)?;
        match record.status {
            DepositStatus::Deposited => return Ok(WaitOutcome::Deposited),
            DepositStatus::Failed => {
                return Ok(WaitOutcome::Failed {
                    reason: record.failure.unwrap_or_default(),
                })
            }
            DepositStatus::Pending => {}
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval_after(attempt)).await;
        }
    }
    Ok(WaitOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}
