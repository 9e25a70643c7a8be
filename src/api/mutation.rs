//! Optimistic mutation state.
//!
//! `Idle -> Optimistic -> Committed | RolledBack`. Entering `Optimistic`
//! remembers the value shown before the mutation, so a rollback can restore
//! it when no explicit rollback value is given.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, NoticeLevel, RequestConfig};
use crate::envelope::CanonicalResult;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Optimistic,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone)]
pub struct Mutation<T> {
    phase: MutationPhase,
    data: Option<T>,
    previous: Option<T>,
    error: Option<String>,
}

impl<T> Default for Mutation<T> {
    fn default() -> Self { Self { phase: MutationPhase::Idle, data: None, previous: None, error: None } }
}

impl<T: Clone> Mutation<T> {
    pub fn new(initial: Option<T>) -> Self { Self { data: initial, ..Self::default() } }

    pub fn phase(&self) -> MutationPhase { self.phase }

    pub fn data(&self) -> Option<&T> { self.data.as_ref() }

    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    pub fn is_loading(&self) -> bool { self.phase == MutationPhase::Optimistic }

    pub fn is_success(&self) -> bool { self.phase == MutationPhase::Committed }

    /// Start a mutation, optionally showing `optimistic` right away.
    pub fn begin(&mut self, optimistic: Option<T>) {
        self.previous = self.data.clone();
        if let Some(v) = optimistic {
            self.data = Some(v);
        }
        self.error = None;
        self.phase = MutationPhase::Optimistic;
    }

    /// Like [`begin`](Self::begin) with the optimistic value derived from the current one.
    pub fn begin_with(&mut self, derive: impl FnOnce(Option<&T>) -> T) {
        let v = derive(self.data.as_ref());
        self.begin(Some(v));
    }

    /// Accept the server's value. Only valid while `Optimistic`.
    pub fn commit(&mut self, value: T) -> bool {
        if self.phase != MutationPhase::Optimistic {
            debug!(target: "panel_client::mutation", phase = ?self.phase, "commit ignored");
            return false;
        }
        self.data = Some(value);
        self.previous = None;
        self.phase = MutationPhase::Committed;
        true
    }

    /// Undo the optimistic value. `rollback_data` wins over the remembered one.
    pub fn rollback(&mut self, error: &ApiError, rollback_data: Option<T>) -> bool {
        if self.phase != MutationPhase::Optimistic {
            debug!(target: "panel_client::mutation", phase = ?self.phase, "rollback ignored");
            return false;
        }
        self.data = rollback_data.or_else(|| self.previous.take());
        self.previous = None;
        self.error = Some(error.message().to_string());
        self.phase = MutationPhase::RolledBack;
        true
    }

    pub fn reset(&mut self) { *self = Self::default(); }

    /// `begin`, await `request`, then `commit` or `rollback` on its outcome.
    pub async fn run<F>(&mut self, optimistic: Option<T>, request: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.begin(optimistic);
        match request.await {
            Ok(v) => {
                self.commit(v.clone());
                Ok(v)
            }
            Err(e) => {
                self.rollback(&e, None);
                Err(e)
            }
        }
    }

    /// [`run`](Self::run) over a raw transport call. The payload is decoded
    /// through the typed helpers, and on success the server's message is
    /// raised as a success notice.
    pub async fn run_announced<F>(&mut self, client: &ApiClient, optimistic: Option<T>, request: F) -> ApiResult<T>
    where
        T: DeserializeOwned,
        F: Future<Output = ApiResult<CanonicalResult<Value>>>,
    {
        self.begin(optimistic);
        let outcome = async {
            let canonical = request.await?;
            let message = canonical.message.clone();
            let value = client.unwrap_canonical::<T>(canonical, &RequestConfig::default())?;
            Ok::<_, ApiError>((value, message))
        }
        .await;
        match outcome {
            Ok((v, message)) => {
                self.commit(v.clone());
                client.notify(NoticeLevel::Success, &message);
                Ok(v)
            }
            Err(e) => {
                self.rollback(&e, None);
                Err(e)
            }
        }
    }
}
