//! Serialized request dispatcher with bounded retries.
//!
//! # Design
//! `Dispatcher` is a cheap, cloneable handle over shared state: a FIFO of
//! waiting descriptors and a `processing` flag. Submitting appends to the
//! queue and, if no worker is running, spawns one on the runtime captured at
//! construction. The worker pops one descriptor at a time and drives it to a
//! terminal outcome before touching the next:
//!
//! - each attempt is bounded by the policy timeout, enforced here with
//!   `tokio::time::timeout` regardless of what the transport does;
//! - a failed attempt with budget left sleeps `retry_delay` and re-executes
//!   the same descriptor, so it keeps the head of the line;
//! - on constrained platforms the worker pauses `request_spacing` after
//!   every resolved descriptor.
//!
//! Appending and the worker's "pop or stop" step share one mutex, so a
//! submission racing the worker's final emptiness check is either picked up
//! by that worker or starts a fresh one.
//!
//! Every failed attempt counts against the retry budget, whatever the
//! transport reported; a transport that panics is treated as a failed
//! attempt.
//!
//! Retrying in place means a persistently failing request holds up
//! everything queued behind it for up to
//! `(max_retries + 1) * request_timeout + max_retries * retry_delay`.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{DispatcherConfig, RetryPolicy};
use crate::descriptor::{Completion, Outcome, RequestDescriptor, Ticket};
use crate::error::DispatchError;
use crate::http::{merge_headers, Headers, HttpMethod, HttpRequest};
use crate::network::{NetworkReachability, ReachabilitySource};
use crate::platform::{CapabilitySource, PlatformType};
use crate::transport::Transport;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const USER_AGENT: &str = "User-Agent";

/// `"{app}/{version} ({platform})"`, e.g. `GameApp/1.0.0 (Android)`.
pub fn user_agent(app_name: &str, app_version: &str, platform: PlatformType) -> String {
    format!("{app_name}/{app_version} ({platform})")
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<RequestDescriptor>,
    processing: bool,
}

struct Inner {
    queue: Mutex<QueueState>,
    default_headers: RwLock<Headers>,
    policy: RetryPolicy,
    platform: PlatformType,
    transport: Arc<dyn Transport>,
    reachability: Arc<dyn ReachabilitySource>,
    runtime: Handle,
}

/// Handle to a request queue and its single worker.
///
/// Clones share the same queue. Construct one per application with
/// [`Dispatcher::builder`] and pass it to whoever needs to issue requests.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    capabilities: Arc<dyn CapabilitySource>,
    reachability: Arc<dyn ReachabilitySource>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to `PlatformType::detect()`.
    pub fn capabilities(mut self, source: impl CapabilitySource + 'static) -> Self {
        self.capabilities = Arc::new(source);
        self
    }

    /// Defaults to reporting a local-area connection.
    pub fn reachability(mut self, source: impl ReachabilitySource + 'static) -> Self {
        self.reachability = Arc::new(source);
        self
    }

    /// Runtime the worker is spawned on. Defaults to the ambient runtime of
    /// the thread calling `build`.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| DispatchError::NoRuntime(e.to_string()))?,
        };

        let platform = self.capabilities.platform();
        let constrained = self.capabilities.is_constrained_platform();
        let policy = self.config.resolve(constrained);

        if platform == PlatformType::WeixinMiniGame {
            warn!("Weixin mini-game hosts only reach request domains allow-listed in the host console");
        }

        let mut default_headers = Headers::new();
        default_headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
        default_headers.insert(
            USER_AGENT.to_string(),
            user_agent(&self.config.app_name, &self.config.app_version, platform),
        );
        default_headers.extend(self.config.default_headers);

        info!(
            %platform,
            constrained,
            timeout_secs = policy.request_timeout.as_secs(),
            max_retries = policy.max_retries,
            "dispatcher ready"
        );

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                queue: Mutex::new(QueueState::default()),
                default_headers: RwLock::new(default_headers),
                policy,
                platform,
                transport: self.transport,
                reachability: self.reachability,
                runtime,
            }),
        })
    }
}

impl Dispatcher {
    pub fn builder(transport: impl Transport + 'static) -> DispatcherBuilder {
        DispatcherBuilder {
            transport: Arc::new(transport),
            config: DispatcherConfig::default(),
            capabilities: Arc::new(PlatformType::detect()),
            reachability: Arc::new(NetworkReachability::ReachableViaLocalAreaNetwork),
            runtime: None,
        }
    }

    pub fn get<F>(&self, url: impl Into<String>, headers: Option<Headers>, callback: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.send_with_callback(HttpMethod::Get, url, None, headers, callback);
    }

    pub fn post<F>(
        &self,
        url: impl Into<String>,
        body: impl Into<String>,
        headers: Option<Headers>,
        callback: F,
    ) where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.send_with_callback(HttpMethod::Post, url, Some(body.into()), headers, callback);
    }

    pub fn put<F>(
        &self,
        url: impl Into<String>,
        body: impl Into<String>,
        headers: Option<Headers>,
        callback: F,
    ) where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.send_with_callback(HttpMethod::Put, url, Some(body.into()), headers, callback);
    }

    pub fn delete<F>(&self, url: impl Into<String>, headers: Option<Headers>, callback: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.send_with_callback(HttpMethod::Delete, url, None, headers, callback);
    }

    /// Queue a request and get a future for its outcome.
    ///
    /// Malformed requests never reach the queue; their ticket is already
    /// resolved with the validation error.
    pub fn send(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        body: Option<String>,
        headers: Option<Headers>,
    ) -> Ticket {
        let (completion, rx) = Completion::channel();
        let id = self.submit(method, url.into(), body, headers, completion);
        Ticket::new(id, rx)
    }

    /// Queue a request whose outcome is delivered to `callback`, exactly
    /// once. Malformed requests invoke `callback` before this returns.
    pub fn send_with_callback<F>(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        body: Option<String>,
        headers: Option<Headers>,
        callback: F,
    ) -> Uuid
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.submit(method, url.into(), body, headers, Completion::callback(callback))
    }

    fn submit(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<String>,
        headers: Option<Headers>,
        completion: Completion,
    ) -> Uuid {
        let mut request = HttpRequest {
            method,
            url,
            headers: Headers::new(),
            body,
        };
        if let Err(err) = request.validate() {
            warn!(%method, url = %request.url, error = %err, "rejecting malformed request");
            completion.resolve(Uuid::nil(), Err(err));
            return Uuid::nil();
        }
        request.headers = merge_headers(&self.inner.default_headers.read(), headers.as_ref());

        let descriptor = RequestDescriptor::new(request, completion);
        let id = descriptor.id();
        let start_worker = {
            let mut queue = self.inner.queue.lock();
            queue.pending.push_back(descriptor);
            !std::mem::replace(&mut queue.processing, true)
        };
        debug!(%id, %method, "request queued");

        if start_worker {
            self.inner.runtime.spawn(Arc::clone(&self.inner).drain());
        }
        id
    }

    /// Affects submissions made after this call only.
    pub fn set_default_header(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .default_headers
            .write()
            .insert(key.into(), value.into());
    }

    pub fn remove_default_header(&self, key: &str) -> Option<String> {
        self.inner.default_headers.write().remove(key)
    }

    pub fn default_headers(&self) -> Headers {
        self.inner.default_headers.read().clone()
    }

    /// Drop every waiting descriptor without running its callback. The
    /// request currently executing, if any, is unaffected. Returns how many
    /// were discarded.
    pub fn clear_queue(&self) -> usize {
        let discarded: Vec<RequestDescriptor> = self.inner.queue.lock().pending.drain(..).collect();
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "cleared request queue");
        }
        discarded.len()
    }

    /// Number of descriptors waiting, excluding the one executing.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.queue.lock().processing
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    pub fn platform(&self) -> PlatformType {
        self.inner.platform
    }

    pub fn is_network_available(&self) -> bool {
        self.inner.reachability.reachability().is_available()
    }

    pub fn network_type(&self) -> &'static str {
        self.inner.reachability.reachability().network_type()
    }

    pub fn network_info(&self) -> String {
        let reachability = self.inner.reachability.reachability();
        format!(
            "Network Available: {}, Network Type: {}, Queue Size: {}, Timeout: {}s",
            reachability.is_available(),
            reachability.network_type(),
            self.queue_len(),
            self.inner.policy.request_timeout.as_secs()
        )
    }

    /// Fetch `url` once and write the body to `path`. Runs beside the queue,
    /// not through it, and is not retried. Resolves with the path written.
    pub fn download_file(&self, url: impl Into<String>, path: impl Into<PathBuf>) -> Ticket {
        let (completion, rx) = Completion::channel();
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: url.into(),
            headers: self.default_headers(),
            body: None,
        };
        if let Err(err) = request.validate() {
            completion.resolve(Uuid::nil(), Err(err));
            return Ticket::new(Uuid::nil(), rx);
        }

        let id = Uuid::new_v4();
        let path = path.into();
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let outcome = match inner.attempt(&request).await {
                Ok(body) => match tokio::fs::write(&path, body.as_bytes()).await {
                    Ok(()) => Ok(path.display().to_string()),
                    Err(e) => Err(DispatchError::Io(e.to_string())),
                },
                Err(err) => Err(err),
            };
            if let Err(err) = &outcome {
                warn!(%id, url = %request.url, error = %err, "download failed");
            }
            completion.resolve(id, outcome);
        });
        Ticket::new(id, rx)
    }
}

/// Clears `processing` if the worker unwinds, so the next submission
/// starts a fresh worker.
struct WorkerGuard<'a>(&'a Inner);

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.queue.lock().processing = false;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        let _guard = WorkerGuard(&self);
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(descriptor) => descriptor,
                    None => {
                        queue.processing = false;
                        return;
                    }
                }
            };
            self.run(next).await;
            if let Some(spacing) = self.policy.request_spacing {
                tokio::time::sleep(spacing).await;
            }
        }
    }

    #[instrument(
        skip_all,
        fields(
            id = %descriptor.id(),
            method = %descriptor.request().method,
            url = %descriptor.request().url
        )
    )]
    async fn run(&self, mut descriptor: RequestDescriptor) {
        let outcome = loop {
            descriptor.begin_attempt();
            debug!(attempt = descriptor.retry_count() + 1, "sending request");
            match self.attempt(descriptor.request()).await {
                Ok(body) => break Ok(body),
                Err(err) => {
                    if descriptor.schedule_retry(self.policy.max_retries) {
                        warn!(
                            error = %err,
                            retry = descriptor.retry_count(),
                            max_retries = self.policy.max_retries,
                            "request failed, retrying"
                        );
                        if !self.policy.retry_delay.is_zero() {
                            tokio::time::sleep(self.policy.retry_delay).await;
                        }
                    } else {
                        warn!(
                            error = %err,
                            attempts = descriptor.retry_count() + 1,
                            "request failed"
                        );
                        break Err(err);
                    }
                }
            }
        };
        let state = descriptor.finish(outcome);
        debug!(?state, "request resolved");
    }

    async fn attempt(&self, request: &HttpRequest) -> Outcome {
        let timeout = self.policy.request_timeout;
        let execute = AssertUnwindSafe(self.transport.execute(request, timeout)).catch_unwind();
        match tokio::time::timeout(timeout, execute).await {
            Ok(Ok(Ok(response))) => response.into_outcome(),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                error!(url = %request.url, panic = %message, "transport panicked");
                Err(DispatchError::Transport(format!("transport panicked: {message}")))
            }
            Err(_) => Err(DispatchError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }
}
