//! Human-confirmation gate. A confirmable tool call suspends its turn
//! here until the caller resolves it out-of-band; the suspension holds no
//! lock besides the session's own turn lock and no ledger reservation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::models::{ConfirmChoice, ConfirmResolution, ConfirmationOption};

#[derive(Debug)]
pub enum ConfirmationOutcome {
    /// The chosen option's payload; it becomes the arguments the tool
    /// executes with.
    Chosen(Value),
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("option index {index} out of range ({available} options presented)")]
    InvalidOptionIndex { index: usize, available: usize },
}

struct PendingConfirmation {
    session_id: Uuid,
    options: Vec<ConfirmationOption>,
    resolve_tx: oneshot::Sender<ConfirmationOutcome>,
}

#[derive(Default)]
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<Uuid, PendingConfirmation>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending gate and hand back the receiver the turn awaits.
    pub fn begin(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
        options: Vec<ConfirmationOption>,
    ) -> oneshot::Receiver<ConfirmationOutcome> {
        let (resolve_tx, resolve_rx) = oneshot::channel();
        self.lock_pending().insert(
            tool_call_id,
            PendingConfirmation {
                session_id,
                options,
                resolve_tx,
            },
        );
        resolve_rx
    }

    /// Resolve a pending gate. Unknown or already-resolved ids report
    /// `AlreadyResolved` instead of erroring the turn; only an
    /// out-of-range option index is a caller error.
    pub fn resolve(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
        choice: ConfirmChoice,
    ) -> Result<ConfirmResolution, ConfirmError> {
        let mut pending = self.lock_pending();

        let is_match = pending
            .get(&tool_call_id)
            .is_some_and(|entry| entry.session_id == session_id);
        if !is_match {
            return Ok(ConfirmResolution::AlreadyResolved);
        }

        if let ConfirmChoice::Option { index } = choice {
            let available = pending[&tool_call_id].options.len();
            if index >= available {
                return Err(ConfirmError::InvalidOptionIndex { index, available });
            }
        }

        let Some(entry) = pending.remove(&tool_call_id) else {
            return Ok(ConfirmResolution::AlreadyResolved);
        };
        drop(pending);

        let outcome = match choice {
            ConfirmChoice::Option { index } => {
                ConfirmationOutcome::Chosen(entry.options[index].payload.clone())
            }
            ConfirmChoice::Cancel => ConfirmationOutcome::Cancelled,
        };

        // A dropped receiver means the turn already gave up on this gate.
        match entry.resolve_tx.send(outcome) {
            Ok(()) => Ok(ConfirmResolution::Resolved),
            Err(_) => Ok(ConfirmResolution::AlreadyResolved),
        }
    }

    /// Cancel every gate belonging to a session (used when a turn aborts).
    pub fn cancel_session(&self, session_id: Uuid) {
        let mut pending = self.lock_pending();
        let ids: Vec<Uuid> = pending
            .iter()
            .filter(|(_, entry)| entry.session_id == session_id)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(entry) = pending.remove(&id) {
                let _ = entry.resolve_tx.send(ConfirmationOutcome::Cancelled);
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingConfirmation>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options() -> Vec<ConfirmationOption> {
        vec![
            ConfirmationOption {
                label: "Proceed".to_string(),
                payload: json!({ "go": true }),
            },
            ConfirmationOption {
                label: "Proceed later".to_string(),
                payload: json!({ "go": "later" }),
            },
        ]
    }

    #[tokio::test]
    async fn chosen_option_delivers_its_payload() {
        let broker = ConfirmationBroker::new();
        let session = Uuid::new_v4();
        let call = Uuid::new_v4();
        let rx = broker.begin(session, call, options());

        let resolution = broker
            .resolve(session, call, ConfirmChoice::Option { index: 1 })
            .unwrap();
        assert_eq!(resolution, ConfirmResolution::Resolved);

        match rx.await.unwrap() {
            ConfirmationOutcome::Chosen(payload) => assert_eq!(payload["go"], "later"),
            ConfirmationOutcome::Cancelled => panic!("expected a chosen payload"),
        }
    }

    #[tokio::test]
    async fn cancel_resolves_as_cancelled() {
        let broker = ConfirmationBroker::new();
        let session = Uuid::new_v4();
        let call = Uuid::new_v4();
        let rx = broker.begin(session, call, options());

        broker.resolve(session, call, ConfirmChoice::Cancel).unwrap();
        assert!(matches!(rx.await.unwrap(), ConfirmationOutcome::Cancelled));
    }

    #[tokio::test]
    async fn second_resolution_reports_already_resolved() {
        let broker = ConfirmationBroker::new();
        let session = Uuid::new_v4();
        let call = Uuid::new_v4();
        let _rx = broker.begin(session, call, options());

        broker
            .resolve(session, call, ConfirmChoice::Option { index: 0 })
            .unwrap();
        let second = broker.resolve(session, call, ConfirmChoice::Cancel).unwrap();
        assert_eq!(second, ConfirmResolution::AlreadyResolved);
    }

    #[tokio::test]
    async fn unknown_id_and_wrong_session_are_no_ops() {
        let broker = ConfirmationBroker::new();
        let session = Uuid::new_v4();
        let call = Uuid::new_v4();
        let _rx = broker.begin(session, call, options());

        let unknown = broker
            .resolve(session, Uuid::new_v4(), ConfirmChoice::Cancel)
            .unwrap();
        assert_eq!(unknown, ConfirmResolution::AlreadyResolved);

        let wrong_session = broker
            .resolve(Uuid::new_v4(), call, ConfirmChoice::Cancel)
            .unwrap();
        assert_eq!(wrong_session, ConfirmResolution::AlreadyResolved);
    }

    #[tokio::test]
    async fn out_of_range_index_is_a_caller_error() {
        let broker = ConfirmationBroker::new();
        let session = Uuid::new_v4();
        let call = Uuid::new_v4();
        let _rx = broker.begin(session, call, options());

        let err = broker
            .resolve(session, call, ConfirmChoice::Option { index: 5 })
            .unwrap_err();
        assert!(matches!(
            err,
            ConfirmError::InvalidOptionIndex {
                index: 5,
                available: 2
            }
        ));
    }
}
