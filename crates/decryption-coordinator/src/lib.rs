//! Decryption Coordinator
//!
//! This crate is the oracle side of the decryption gateway:
//! 1. Accepting decryption requests for encrypted handles with a deadline
//! 2. Decrypting them through a [`Decrypt`] capability
//! 3. Producing the callback payload, at most once per request
//!
//! The payload is delivered to the auction by the host, with the
//! coordinator's [`DecryptionCoordinator::identity`] as sender.

use auction_crypto::Decrypt;
use auction_types::{compute_request_id, Address, DecryptionGateway, EncU64, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during decryption coordination.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Request not found: {0}")]
    UnknownRequest(String),

    #[error("Request already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Request {request_id} expired at block {deadline}")]
    Expired { request_id: String, deadline: u64 },

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// State of a decryption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecryptionState {
    /// Waiting for the oracle
    Pending,
    /// Cleartext produced
    Completed,
    /// Deadline passed before fulfilment
    Expired,
}

/// A single decryption request being coordinated.
#[derive(Debug, Clone)]
pub struct DecryptionRequest {
    pub request_id: RequestId,
    /// Handles to decrypt, in callback order
    pub handles: Vec<EncU64>,
    /// Last block at which the request may be fulfilled
    pub deadline: u64,
    pub state: DecryptionState,
}

/// Callback payload for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfilment {
    pub request_id: RequestId,
    pub values: Vec<u64>,
}

/// Coordinator for decryption requests issued by one auction.
#[derive(Debug)]
pub struct DecryptionCoordinator {
    /// Address the callbacks are sent from
    identity: Address,
    /// Monotonic counter feeding request ids
    nonce: u64,
    requests: HashMap<RequestId, DecryptionRequest>,
}

impl DecryptionCoordinator {
    /// Create a new decryption coordinator sending callbacks as `identity`.
    pub fn new(identity: Address) -> Self {
        Self {
            identity,
            nonce: 0,
            requests: HashMap::new(),
        }
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Decrypt a pending request.
    ///
    /// A request past its deadline is marked expired instead; the auction may
    /// reissue it under a new identifier.
    pub fn fulfil<D: Decrypt>(
        &mut self,
        request_id: RequestId,
        decryptor: &D,
        now: u64,
    ) -> Result<Fulfilment, CoordinatorError> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| CoordinatorError::UnknownRequest(hex::encode(request_id)))?;

        match request.state {
            DecryptionState::Completed => {
                return Err(CoordinatorError::AlreadyCompleted(hex::encode(request_id)))
            }
            DecryptionState::Expired => {
                return Err(CoordinatorError::Expired {
                    request_id: hex::encode(request_id),
                    deadline: request.deadline,
                })
            }
            DecryptionState::Pending => {}
        }

        if now > request.deadline {
            request.state = DecryptionState::Expired;
            warn!(
                request_id = hex::encode(request_id),
                deadline = request.deadline,
                now,
                "Decryption request expired"
            );
            return Err(CoordinatorError::Expired {
                request_id: hex::encode(request_id),
                deadline: request.deadline,
            });
        }

        let values = request
            .handles
            .iter()
            .map(|handle| decryptor.decrypt(*handle))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoordinatorError::DecryptionFailed(e.to_string()))?;

        request.state = DecryptionState::Completed;

        info!(
            request_id = hex::encode(request_id),
            values = values.len(),
            "Decryption completed"
        );

        Ok(Fulfilment { request_id, values })
    }

    /// Fulfil every pending request, earliest deadline first.
    pub fn fulfil_pending<D: Decrypt>(
        &mut self,
        decryptor: &D,
        now: u64,
    ) -> Vec<(RequestId, Result<Fulfilment, CoordinatorError>)> {
        self.pending_requests()
            .into_iter()
            .map(|id| (id, self.fulfil(id, decryptor, now)))
            .collect()
    }

    /// Mark every pending request past its deadline as expired.
    pub fn expire(&mut self, now: u64) -> Vec<RequestId> {
        let mut expired: Vec<RequestId> = self
            .requests
            .values_mut()
            .filter(|r| r.state == DecryptionState::Pending && now > r.deadline)
            .map(|r| {
                r.state = DecryptionState::Expired;
                r.request_id
            })
            .collect();
        expired.sort_unstable();

        if !expired.is_empty() {
            warn!(count = expired.len(), now, "Expired decryption requests");
        }
        expired
    }

    /// Get the state of a decryption request.
    pub fn get_state(&self, request_id: &RequestId) -> Option<DecryptionState> {
        self.requests.get(request_id).map(|r| r.state)
    }

    /// Get all pending request IDs, earliest deadline first.
    pub fn pending_requests(&self) -> Vec<RequestId> {
        let mut pending: Vec<(u64, RequestId)> = self
            .requests
            .values()
            .filter(|r| r.state == DecryptionState::Pending)
            .map(|r| (r.deadline, r.request_id))
            .collect();
        pending.sort_unstable();
        pending.into_iter().map(|(_, id)| id).collect()
    }
}

impl DecryptionGateway for DecryptionCoordinator {
    fn request_decryption(&mut self, handles: &[EncU64], deadline: u64) -> RequestId {
        self.nonce += 1;
        let request_id = compute_request_id(self.nonce, handles);

        debug!(
            request_id = hex::encode(request_id),
            handles = handles.len(),
            deadline,
            "Accepted decryption request"
        );

        self.requests.insert(
            request_id,
            DecryptionRequest {
                request_id,
                handles: handles.to_vec(),
                deadline,
                state: DecryptionState::Pending,
            },
        );
        request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_crypto::{ClearBackend, ObliviousBackend};

    const ORACLE: Address = [0x0A; 32];

    fn setup(values: &[u64]) -> (DecryptionCoordinator, ClearBackend, Vec<EncU64>) {
        let mut backend = ClearBackend::default();
        let handles = values
            .iter()
            .map(|v| backend.encrypt(*v).unwrap())
            .collect();
        (DecryptionCoordinator::new(ORACLE), backend, handles)
    }

    #[test]
    fn test_coordinator_creation() {
        let coordinator = DecryptionCoordinator::new(ORACLE);
        assert_eq!(coordinator.identity(), ORACLE);
        assert!(coordinator.pending_requests().is_empty());
    }

    #[test]
    fn test_request_and_fulfil() {
        let (mut coordinator, backend, handles) = setup(&[200, 400_000, 200]);
        let request_id = coordinator.request_decryption(&handles, 50);

        assert_eq!(coordinator.pending_requests(), vec![request_id]);
        assert_eq!(
            coordinator.get_state(&request_id),
            Some(DecryptionState::Pending)
        );

        let fulfilment = coordinator.fulfil(request_id, &backend, 10).unwrap();
        assert_eq!(fulfilment.values, vec![200, 400_000, 200]);
        assert_eq!(
            coordinator.get_state(&request_id),
            Some(DecryptionState::Completed)
        );
        assert!(coordinator.pending_requests().is_empty());
    }

    #[test]
    fn test_fulfil_at_most_once() {
        let (mut coordinator, backend, handles) = setup(&[1]);
        let request_id = coordinator.request_decryption(&handles, 50);

        coordinator.fulfil(request_id, &backend, 10).unwrap();
        assert_eq!(
            coordinator.fulfil(request_id, &backend, 11),
            Err(CoordinatorError::AlreadyCompleted(hex::encode(request_id)))
        );
    }

    #[test]
    fn test_same_handles_get_distinct_ids() {
        let (mut coordinator, _, handles) = setup(&[1, 2]);
        let first = coordinator.request_decryption(&handles, 50);
        let second = coordinator.request_decryption(&handles, 50);
        assert_ne!(first, second);
        assert_eq!(coordinator.pending_requests().len(), 2);
    }

    #[test]
    fn test_late_fulfilment_expires() {
        let (mut coordinator, backend, handles) = setup(&[1]);
        let request_id = coordinator.request_decryption(&handles, 50);

        assert!(matches!(
            coordinator.fulfil(request_id, &backend, 51),
            Err(CoordinatorError::Expired { deadline: 50, .. })
        ));
        assert_eq!(
            coordinator.get_state(&request_id),
            Some(DecryptionState::Expired)
        );
    }

    #[test]
    fn test_unknown_request() {
        let (mut coordinator, backend, _) = setup(&[]);
        assert!(matches!(
            coordinator.fulfil([7u8; 32], &backend, 0),
            Err(CoordinatorError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_unknown_handle_fails_decryption() {
        let (mut coordinator, backend, _) = setup(&[]);
        let request_id = coordinator.request_decryption(&[EncU64(999)], 50);

        assert!(matches!(
            coordinator.fulfil(request_id, &backend, 0),
            Err(CoordinatorError::DecryptionFailed(_))
        ));
        assert_eq!(
            coordinator.get_state(&request_id),
            Some(DecryptionState::Pending)
        );
    }

    #[test]
    fn test_expire_and_fulfil_pending() {
        let (mut coordinator, backend, handles) = setup(&[5, 6]);
        let early = coordinator.request_decryption(&handles[..1], 10);
        let late = coordinator.request_decryption(&handles[1..], 100);

        assert_eq!(coordinator.expire(20), vec![early]);

        let results = coordinator.fulfil_pending(&backend, 20);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, late);
        assert_eq!(results[0].1.as_ref().unwrap().values, vec![6]);
    }
}
