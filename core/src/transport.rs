//! The seam between the dispatcher and whatever performs network I/O.
//!
//! # Design
//! The core never opens a socket. A `Transport` receives one attempt's
//! request and timeout and answers with the raw response or a connection
//! error; interpreting status codes, retrying and enforcing the timeout all
//! stay in the dispatcher. Hosts with a synchronous HTTP stack (a C
//! callback, a blocking client) wrap it in `BlockingTransport`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::http::{HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single attempt. Non-2xx statuses are returned as responses,
    /// not errors.
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, DispatchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, DispatchError> {
        (**self).execute(request, timeout).await
    }
}

/// Adapts a blocking function into a `Transport` by running each attempt on
/// tokio's blocking pool.
pub struct BlockingTransport<F> {
    exec: Arc<F>,
}

impl<F> BlockingTransport<F>
where
    F: Fn(&HttpRequest, Duration) -> Result<HttpResponse, DispatchError> + Send + Sync + 'static,
{
    pub fn new(exec: F) -> Self {
        Self {
            exec: Arc::new(exec),
        }
    }
}

#[async_trait]
impl<F> Transport for BlockingTransport<F>
where
    F: Fn(&HttpRequest, Duration) -> Result<HttpResponse, DispatchError> + Send + Sync + 'static,
{
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, DispatchError> {
        let exec = Arc::clone(&self.exec);
        let request = request.clone();
        tokio::task::spawn_blocking(move || exec(&request, timeout))
            .await
            .map_err(|e| DispatchError::Transport(format!("transport task failed: {e}")))?
    }
}
