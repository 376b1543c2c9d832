//! Bounded fixed-delay polling of chain observations.

use backon::Retryable;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::blockchain::traits::{LegReceipt, Observation};
use crate::core::config::PollPolicy;
use crate::core::errors::{BridgeError, Result};

#[derive(Debug)]
enum PollError {
    NotReady,
    Transient(BridgeError),
    Stop(BridgeError),
}

impl PollError {
    fn should_retry(&self) -> bool {
        matches!(self, PollError::NotReady | PollError::Transient(_))
    }
}

/// Looks at the chain until the observation is final.
///
/// `Pending` and RPC errors are retried after `policy.interval()`, at most
/// `policy.max_attempts` looks in total. A chain-reported failure stops
/// immediately with `Rejected`, a dropped leg with `Reconciliation`.
/// Cancelling `cancel` interrupts the wait with `Cancelled`.
pub async fn poll_observation<F, Fut>(
    what: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut observe: F,
) -> Result<LegReceipt>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation>>,
{
    if cancel.is_cancelled() {
        return Err(BridgeError::Cancelled);
    }

    let backoff = backon::ConstantBuilder::default()
        .with_delay(policy.interval())
        .with_max_times(policy.max_attempts.saturating_sub(1));

    let attempt = || {
        let observation = observe();
        async move {
            match observation.await {
                Ok(Observation::Confirmed(receipt)) => Ok(receipt),
                Ok(Observation::Pending) => Err(PollError::NotReady),
                Ok(Observation::Failed(reason)) => Err(PollError::Stop(BridgeError::Rejected(reason))),
                Ok(Observation::Dropped(reason)) => {
                    Err(PollError::Stop(BridgeError::Reconciliation(reason)))
                }
                Err(err @ BridgeError::Rpc(_)) => Err(PollError::Transient(err)),
                Err(err) => Err(PollError::Stop(err)),
            }
        }
    };

    let polling = attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(PollError::should_retry)
        .notify(|err, delay| debug!(what, ?err, ?delay, "observation not final, polling again"));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BridgeError::Cancelled),
        result = polling => result.map_err(|err| match err {
            PollError::NotReady => BridgeError::Timeout {
                what: what.to_string(),
                attempts: policy.max_attempts,
            },
            PollError::Transient(err) | PollError::Stop(err) => err,
        }),
    }
}
