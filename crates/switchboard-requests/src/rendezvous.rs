//! Suspending until a request settles.

use std::time::Duration;

use switchboard_core::RequestId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::RequestError;
use crate::registry::OrchestratorRequestRegistry;
use crate::types::OrchestratorRequestRecord;

/// Why a wait stopped suspending.
enum WaitOutcome {
    Settled(OrchestratorRequestRecord),
    Released,
    Cancelled,
    Elapsed,
}

impl OrchestratorRequestRegistry {
    /// Wait for a request to reach a terminal state.
    ///
    /// Returns at once for a terminal request. Otherwise suspends until the
    /// first of:
    /// - any terminal transition, returning the settled record;
    /// - the request's own deadline, which forces it to `timeout` and returns
    ///   that record;
    /// - `timeout` elapsing first, returning [`RequestError::WaitTimedOut`];
    /// - `cancel` firing, returning [`RequestError::WaitCancelled`].
    ///
    /// The last two leave the record untouched. Any number of callers may
    /// wait on the same request; all of them see the same terminal record.
    pub async fn wait_for_resolution(
        &self,
        request_id: &RequestId,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<OrchestratorRequestRecord, RequestError> {
        let (mut rx, until_deadline) = {
            let mut state = self.state.lock();
            let record = state
                .records
                .get(request_id)
                .ok_or_else(|| RequestError::NotFound(request_id.clone()))?;
            if record.is_terminal() {
                return Ok(record.clone());
            }
            let remaining = (record.timeout_at - self.clock.now_ms()).max(0);
            let until_deadline = Duration::from_millis(u64::try_from(remaining).unwrap_or(0));
            (state.subscribe(request_id), until_deadline)
        };

        let deadline_first = until_deadline <= timeout;
        let cancel = cancel.cloned().unwrap_or_default();
        debug!(
            request_id = %request_id,
            wait_ms = until_deadline.min(timeout).as_millis(),
            deadline_first,
            "waiting for orchestrator request"
        );

        let outcome = tokio::select! {
            biased;
            settled = rx.wait_for(Option::is_some) => match settled {
                Ok(value) => (*value).clone().map_or(WaitOutcome::Released, WaitOutcome::Settled),
                Err(_) => WaitOutcome::Released,
            },
            () = cancel.cancelled() => WaitOutcome::Cancelled,
            () = tokio::time::sleep(until_deadline.min(timeout)) => WaitOutcome::Elapsed,
        };

        drop(rx);
        self.state.lock().release(request_id);

        match outcome {
            WaitOutcome::Settled(record) => Ok(record),
            WaitOutcome::Cancelled => {
                debug!(request_id = %request_id, "wait for orchestrator request cancelled");
                Err(RequestError::WaitCancelled {
                    request_id: request_id.clone(),
                })
            }
            WaitOutcome::Elapsed if deadline_first => match self.timeout(request_id) {
                Some(record) => Ok(record),
                // lost the race to another terminal transition
                None => self.settled_or(
                    request_id,
                    RequestError::WaitCancelled {
                        request_id: request_id.clone(),
                    },
                ),
            },
            WaitOutcome::Elapsed => Err(RequestError::WaitTimedOut {
                request_id: request_id.clone(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            WaitOutcome::Released => self.settled_or(
                request_id,
                RequestError::WaitCancelled {
                    request_id: request_id.clone(),
                },
            ),
        }
    }

    /// The terminal record if there is one, `NotFound` if the record is gone,
    /// `otherwise` if it is still open.
    fn settled_or(
        &self,
        request_id: &RequestId,
        otherwise: RequestError,
    ) -> Result<OrchestratorRequestRecord, RequestError> {
        match self.get(request_id) {
            Some(record) if record.is_terminal() => Ok(record),
            Some(_) => Err(otherwise),
            None => Err(RequestError::NotFound(request_id.clone())),
        }
    }
}
