//! Correlates outgoing JSON requests (keyed by `reqId`) with the
//! `REQACK`/`REQNACK`/`REPLY` responses a background poll loop feeds back in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::channel::oneshot;
use serde_json::Value;

use crate::error::{CurveZmqError, Result};

/// Normalizes a `reqId` JSON value (either a string or a number, both appear
/// in practice) into the string key the in-flight table is indexed by.
pub(crate) fn canonical_req_id(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(CurveZmqError::MissingReqId),
    }
}

struct Entry {
    acked: Arc<AtomicBool>,
    sender: oneshot::Sender<Result<Value>>,
}

/// A handle returned by [`Correlator::register`]. Awaiting
/// [`PendingHandle::result`] resolves once a matching `REPLY` or `REQNACK`
/// arrives. Dropping the handle before that cancels the request: the table
/// entry is removed immediately, so a late response for it is ignored
/// rather than erroring.
pub struct PendingHandle {
    req_id: String,
    acked: Arc<AtomicBool>,
    receiver: Option<oneshot::Receiver<Result<Value>>>,
    pending: Arc<DashMap<String, Entry>>,
}

impl PendingHandle {
    #[must_use]
    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    #[must_use]
    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Awaits the final result: the `result` object of a `REPLY`, or the
    /// rejection reason of a `REQNACK`.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::Disconnected`] if the connection is lost (or
    /// the correlator dropped) before a response arrives.
    pub async fn result(mut self) -> Result<Value> {
        let receiver = self.receiver.take().expect("receiver taken once");
        receiver.await.map_err(|_| CurveZmqError::Disconnected)?
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.pending.remove(&self.req_id);
    }
}

/// The in-flight request table plus REQACK/REQNACK/REPLY dispatch logic.
pub struct Correlator {
    pending: Arc<DashMap<String, Entry>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Registers a new pending request under `req_id`.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::DuplicateReqId`] if `req_id` is already
    /// pending.
    pub fn register(&self, req_id: String) -> Result<PendingHandle> {
        if self.pending.contains_key(&req_id) {
            return Err(CurveZmqError::DuplicateReqId(req_id));
        }
        let (sender, receiver) = oneshot::channel();
        let acked = Arc::new(AtomicBool::new(false));
        self.pending.insert(
            req_id.clone(),
            Entry {
                acked: acked.clone(),
                sender,
            },
        );
        Ok(PendingHandle {
            req_id,
            acked,
            receiver: Some(receiver),
            pending: Arc::clone(&self.pending),
        })
    }

    /// Dispatches one decoded JSON response from the poll loop.
    ///
    /// # Errors
    /// Returns [`CurveZmqError::InvalidResponse`] if the shape is wrong or
    /// an unmatched `REPLY` arrives, or [`CurveZmqError::Rejected`] if an
    /// unmatched `REQNACK` arrives (both are protocol errors the caller
    /// should propagate to every other pending request). An unmatched
    /// `REQACK` is silently ignored.
    pub fn dispatch(&self, response: &Value) -> Result<()> {
        let obj = response
            .as_object()
            .ok_or_else(|| CurveZmqError::InvalidResponse("response is not a JSON object".into()))?;
        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| CurveZmqError::InvalidResponse("missing op".into()))?;

        match op {
            "REQACK" => {
                if let Some(req_id) = obj.get("reqId").and_then(|v| canonical_req_id(v).ok()) {
                    if let Some(entry) = self.pending.get(&req_id) {
                        entry.acked.store(true, Ordering::Release);
                    }
                }
                Ok(())
            }
            "REQNACK" => {
                let reason = obj
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("request rejected")
                    .to_string();
                let req_id = obj.get("reqId").and_then(|v| canonical_req_id(v).ok());
                match req_id.and_then(|id| self.pending.remove(&id)) {
                    Some((_, entry)) => {
                        let _ = entry.sender.send(Err(CurveZmqError::Rejected(reason.clone())));
                        Ok(())
                    }
                    None => Err(CurveZmqError::Rejected(reason)),
                }
            }
            "REPLY" => {
                let result = obj
                    .get("result")
                    .ok_or_else(|| CurveZmqError::InvalidResponse("missing result".into()))?;
                let req_id = result
                    .get("reqId")
                    .and_then(|v| canonical_req_id(v).ok());
                match req_id.and_then(|id| self.pending.remove(&id)) {
                    Some((_, entry)) => {
                        let _ = entry.sender.send(Ok(result.clone()));
                        Ok(())
                    }
                    None => Err(CurveZmqError::InvalidResponse(
                        "REPLY with no matching reqId".into(),
                    )),
                }
            }
            other => Err(CurveZmqError::InvalidResponse(format!(
                "unhandled operation: {other}"
            ))),
        }
    }

    /// Resolves every still-pending request with a disconnect error and
    /// empties the table. Called once the connection is known to be gone.
    pub fn fail_all(&self) {
        let req_ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for req_id in req_ids {
            if let Some((_, entry)) = self.pending.remove(&req_id) {
                let _ = entry.sender.send(Err(CurveZmqError::Disconnected));
            }
        }
    }
}
