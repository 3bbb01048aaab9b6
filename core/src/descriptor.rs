//! Request descriptors: one logical HTTP call plus its retry state and
//! completion.
//!
//! # Design
//! A descriptor is owned by the dispatcher from submission until its
//! terminal outcome. The completion is consumed when it fires
//! (`RequestDescriptor::finish` takes `self`), so a descriptor can resolve
//! at most once and never after it has been discarded.
//!
//! Callers pick the delivery style: a boxed `FnOnce` callback, or a
//! one-shot channel surfaced as a `Ticket` future.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::error;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::http::HttpRequest;

/// Terminal result of a request: the response body, or the last error.
pub type Outcome = Result<String, DispatchError>;

pub type Callback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Where a terminal outcome is delivered.
pub enum Completion {
    Callback(Callback),
    Channel(oneshot::Sender<Outcome>),
}

impl Completion {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Completion::Callback(Box::new(f))
    }

    pub fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Completion::Channel(tx), rx)
    }

    /// Deliver `outcome`. A panicking callback is contained so the worker
    /// that resolved it keeps draining the queue.
    pub(crate) fn resolve(self, id: Uuid, outcome: Outcome) {
        match self {
            Completion::Callback(callback) => {
                if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
                    error!(%id, "completion callback panicked");
                }
            }
            Completion::Channel(tx) => {
                // The ticket may have been dropped; nobody is listening then.
                let _ = tx.send(outcome);
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Completion::Callback"),
            Completion::Channel(_) => f.write_str("Completion::Channel"),
        }
    }
}

/// Lifecycle of a descriptor.
///
/// `Queued → Executing → {Succeeded | Retrying → Executing | Failed}`.
/// A descriptor never returns to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Executing,
    Retrying,
    Succeeded,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Succeeded | RequestState::Failed)
    }
}

#[derive(Debug)]
pub struct RequestDescriptor {
    id: Uuid,
    request: HttpRequest,
    retry_count: u32,
    state: RequestState,
    completion: Completion,
}

impl RequestDescriptor {
    pub(crate) fn new(request: HttpRequest, completion: Completion) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            retry_count: 0,
            state: RequestState::Queued,
            completion,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn begin_attempt(&mut self) {
        debug_assert!(matches!(
            self.state,
            RequestState::Queued | RequestState::Retrying
        ));
        self.state = RequestState::Executing;
    }

    /// Claim one retry from the budget. Returns `false` once `retry_count`
    /// has reached `max_retries`; the counter never goes past it.
    pub(crate) fn schedule_retry(&mut self, max_retries: u32) -> bool {
        debug_assert_eq!(self.state, RequestState::Executing);
        if self.retry_count >= max_retries {
            return false;
        }
        self.retry_count += 1;
        self.state = RequestState::Retrying;
        true
    }

    /// Fire the completion with a terminal outcome, consuming the descriptor.
    pub(crate) fn finish(self, outcome: Outcome) -> RequestState {
        let state = if outcome.is_ok() {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        };
        let RequestDescriptor { id, completion, .. } = self;
        completion.resolve(id, outcome);
        state
    }
}

/// Future side of a submission. Resolves exactly once with the request's
/// outcome, or with `DispatchError::Discarded` if the request was cleared
/// from the queue before it ran.
///
/// Dropping a ticket does not cancel the request.
#[derive(Debug)]
pub struct Ticket {
    id: Uuid,
    rx: oneshot::Receiver<Outcome>,
}

impl Ticket {
    pub(crate) fn new(id: Uuid, rx: oneshot::Receiver<Outcome>) -> Self {
        Self { id, rx }
    }

    /// Id of the descriptor behind this ticket. Nil for requests rejected
    /// at submission.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for Ticket {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Discarded)))
    }
}
