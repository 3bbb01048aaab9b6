//! C-ABI wrapper around `dispatch-core`.
//!
//! # Overview
//! Exposes the request dispatcher through `extern "C"` functions so a game
//! engine or mini-game host can queue HTTP requests without linking against
//! Rust's async runtime. The host supplies the HTTP stack as a transport
//! callback; the library owns the queue, the retry policy and the single
//! worker thread that drives it.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `dispatch_new` builds a one-worker tokio runtime per dispatcher. The
//!   transport callback runs on that runtime's blocking pool, and completion
//!   callbacks run on the worker, never on the submitting thread. The one
//!   exception is a request rejected before it is queued: its completion
//!   fires before the submitting call returns.
//! - Strings passed in are copied before the call returns. Strings passed
//!   to callbacks are only valid during the callback. Strings returned from
//!   `dispatch_network_type`/`dispatch_network_info` are owned by the caller
//!   and released with `dispatch_free_string`.

pub mod types;

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use dispatch_core::{BlockingTransport, Dispatcher, DispatcherConfig, HttpMethod};
use tracing::error;
use tracing_subscriber::EnvFilter;

use types::*;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber writing to stderr, filtered by `RUST_LOG`
/// (default `info`). Returns false if a subscriber was already installed.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_init_logging() -> bool {
    catch_unwind(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

/// Create a dispatcher.
///
/// `config_json` may be null for defaults; `DISPATCH_*` environment
/// overrides apply either way. `platform` is a platform code (0 Unknown,
/// 1 Windows, 2 Mac, 3 Linux, 4 Android, 5 iOS, 6 WebGL, 7 WeixinMiniGame,
/// 8 DouyinMiniGame, 9 Editor; negative detects from the build target).
/// `reachability` is 0 none, 1 mobile data, 2 LAN/WiFi.
///
/// Returns null if `transport` is null, the configuration is invalid, the
/// runtime cannot start, or an internal panic occurs. The caller must free
/// the returned pointer with `dispatch_free`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_new(
    config_json: *const c_char,
    platform: i32,
    reachability: i32,
    transport: Option<FfiTransportFn>,
    user_data: *mut c_void,
) -> *mut FfiDispatcher {
    catch_unwind(|| {
        let Some(transport) = transport else {
            return std::ptr::null_mut();
        };
        let config = match unsafe { read_str(config_json) } {
            Some(raw) => DispatcherConfig::from_json(&raw),
            None => Ok(DispatcherConfig::default()),
        }
        .and_then(DispatcherConfig::with_env_overrides);
        let config = match config {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "rejecting dispatcher configuration");
                return std::ptr::null_mut();
            }
        };

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("dispatch-worker")
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "failed to start dispatcher runtime");
                return std::ptr::null_mut();
            }
        };

        let host = HostReachability::new(reachability_from_code(reachability));
        let user_data = SendPtr::new(user_data);
        let exec = move |req: &dispatch_core::HttpRequest, timeout: Duration| {
            let strings = RequestStrings::new(req);
            let headers = strings.header_views();
            let view = strings.view(&headers);
            let mut response = FfiTransportResponse::default();
            let timeout_secs = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
            transport(user_data.get(), &view, timeout_secs, &mut response);
            response.into_core()
        };

        let built = Dispatcher::builder(BlockingTransport::new(exec))
            .config(config)
            .capabilities(platform_from_code(platform))
            .reachability(host.clone())
            .runtime(runtime.handle().clone())
            .build();
        match built {
            Ok(inner) => Box::into_raw(Box::new(FfiDispatcher {
                runtime,
                inner,
                reachability: host,
            })),
            Err(e) => {
                error!(error = %e, "failed to build dispatcher");
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a dispatcher created by `dispatch_new`. Safe to call with null.
///
/// Requests still queued are dropped without their callbacks; an attempt
/// already in the host transport is given a second to return. Must not be
/// called from inside a transport or completion callback.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_free(dispatcher: *mut FfiDispatcher) {
    if !dispatcher.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let FfiDispatcher { runtime, inner, .. } = *unsafe { Box::from_raw(dispatcher) };
            inner.clear_queue();
            drop(inner);
            runtime.shutdown_timeout(Duration::from_secs(1));
        }));
    }
}

// ---------------------------------------------------------------------------
// Transport response
// ---------------------------------------------------------------------------

/// Record the result of one attempt. Called by the host transport before it
/// returns. A non-null `error` marks a connection-level failure and wins
/// over `status`; otherwise `status` and `body` (null reads as empty) are
/// the HTTP response, whatever the status. Calling it again overwrites the
/// earlier result.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_response_write(
    response: *mut FfiTransportResponse,
    status: u16,
    body: *const c_char,
    error: *const c_char,
) {
    if response.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let response = unsafe { &mut *response };
        response.written = true;
        response.status = status;
        response.body = unsafe { read_str(body) }.unwrap_or_default();
        response.error = unsafe { read_str(error) };
    }));
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Queue a request. `method` is 0 GET, 1 POST, 2 PUT, 3 DELETE. `body`,
/// `headers` and `callback` may be null; `headers` overrides the default
/// headers key by key for this request only.
///
/// Returns true if the request was queued. A request rejected up front
/// (unknown method, empty URL, body on GET/DELETE) reports its error through
/// `callback` before this returns, and false is returned. A null
/// `dispatcher` returns false without invoking `callback`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_request(
    dispatcher: *const FfiDispatcher,
    method: u32,
    url: *const c_char,
    body: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return false;
        }
        let dispatcher = unsafe { &*dispatcher };
        let target = CompletionTarget::new(callback, user_data);
        let method = match method_from_code(method) {
            Ok(m) => m,
            Err(e) => {
                target.deliver(Err(e));
                return false;
            }
        };
        submit(dispatcher, method, url, body, headers, headers_len, target)
    }))
    .unwrap_or(false)
}

/// `dispatch_request` with GET.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_get(
    dispatcher: *const FfiDispatcher,
    url: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    dispatch_request(
        dispatcher,
        FfiHttpMethod::Get as u32,
        url,
        std::ptr::null(),
        headers,
        headers_len,
        callback,
        user_data,
    )
}

/// `dispatch_request` with POST.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_post(
    dispatcher: *const FfiDispatcher,
    url: *const c_char,
    body: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    dispatch_request(
        dispatcher,
        FfiHttpMethod::Post as u32,
        url,
        body,
        headers,
        headers_len,
        callback,
        user_data,
    )
}

/// `dispatch_request` with PUT.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_put(
    dispatcher: *const FfiDispatcher,
    url: *const c_char,
    body: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    dispatch_request(
        dispatcher,
        FfiHttpMethod::Put as u32,
        url,
        body,
        headers,
        headers_len,
        callback,
        user_data,
    )
}

/// `dispatch_request` with DELETE.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_delete(
    dispatcher: *const FfiDispatcher,
    url: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    dispatch_request(
        dispatcher,
        FfiHttpMethod::Delete as u32,
        url,
        std::ptr::null(),
        headers,
        headers_len,
        callback,
        user_data,
    )
}

fn submit(
    dispatcher: &FfiDispatcher,
    method: HttpMethod,
    url: *const c_char,
    body: *const c_char,
    headers: *const FfiHeader,
    headers_len: u32,
    target: CompletionTarget,
) -> bool {
    let url = unsafe { read_str(url) }.unwrap_or_default();
    let body = unsafe { read_str(body) };
    let headers = unsafe { read_headers(headers, headers_len) };
    let id = dispatcher
        .inner
        .send_with_callback(method, url, body, headers, move |outcome| {
            target.deliver(outcome)
        });
    !id.is_nil()
}

/// Fetch `url` once, outside the queue and without retries, and write the
/// body to the file at `path`. On success `callback` receives the path.
/// Returns false if `dispatcher` or `path` is null.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_download_file(
    dispatcher: *const FfiDispatcher,
    url: *const c_char,
    path: *const c_char,
    callback: Option<FfiCompletionFn>,
    user_data: *mut c_void,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || path.is_null() {
            return false;
        }
        let dispatcher = unsafe { &*dispatcher };
        let url = unsafe { read_str(url) }.unwrap_or_default();
        let path = unsafe { read_str(path) }.unwrap_or_default();
        let target = CompletionTarget::new(callback, user_data);
        let ticket = dispatcher.inner.download_file(url, path);
        dispatcher.runtime.spawn(async move {
            target.deliver(ticket.await);
        });
        true
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Headers and queue
// ---------------------------------------------------------------------------

/// Set a default header for requests submitted after this call. Returns
/// false if any argument is null.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_default_header(
    dispatcher: *const FfiDispatcher,
    key: *const c_char,
    value: *const c_char,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || key.is_null() || value.is_null() {
            return false;
        }
        let dispatcher = unsafe { &*dispatcher };
        let (Some(key), Some(value)) = (unsafe { read_str(key) }, unsafe { read_str(value) })
        else {
            return false;
        };
        dispatcher.inner.set_default_header(key, value);
        true
    }))
    .unwrap_or(false)
}

/// Remove a default header. Returns true if it was present.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_remove_default_header(
    dispatcher: *const FfiDispatcher,
    key: *const c_char,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || key.is_null() {
            return false;
        }
        let dispatcher = unsafe { &*dispatcher };
        unsafe { read_str(key) }
            .and_then(|key| dispatcher.inner.remove_default_header(&key))
            .is_some()
    }))
    .unwrap_or(false)
}

/// Discard every queued request without invoking its callback. The request
/// currently executing still completes. Returns how many were discarded.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_clear_queue(dispatcher: *const FfiDispatcher) -> u32 {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return 0;
        }
        let dispatcher = unsafe { &*dispatcher };
        u32::try_from(dispatcher.inner.clear_queue()).unwrap_or(u32::MAX)
    }))
    .unwrap_or(0)
}

/// Number of requests waiting, not counting the one executing.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_queue_len(dispatcher: *const FfiDispatcher) -> u32 {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return 0;
        }
        let dispatcher = unsafe { &*dispatcher };
        u32::try_from(dispatcher.inner.queue_len()).unwrap_or(u32::MAX)
    }))
    .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Network status
// ---------------------------------------------------------------------------

/// Update the reachability the host reports. Same codes as `dispatch_new`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_reachability(dispatcher: *const FfiDispatcher, reachability: i32) {
    if dispatcher.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let dispatcher = unsafe { &*dispatcher };
        dispatcher
            .reachability
            .set(reachability_from_code(reachability));
    }));
}

#[unsafe(no_mangle)]
pub extern "C" fn dispatch_is_network_available(dispatcher: *const FfiDispatcher) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return false;
        }
        unsafe { &*dispatcher }.inner.is_network_available()
    }))
    .unwrap_or(false)
}

/// "WiFi", "Mobile Data" or "No Network". Free with `dispatch_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_network_type(dispatcher: *const FfiDispatcher) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return std::ptr::null_mut();
        }
        let dispatcher = unsafe { &*dispatcher };
        to_cstring(dispatcher.inner.network_type()).into_raw()
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// One-line status summary for diagnostics. Free with
/// `dispatch_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_network_info(dispatcher: *const FfiDispatcher) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return std::ptr::null_mut();
        }
        let dispatcher = unsafe { &*dispatcher };
        to_cstring(&dispatcher.inner.network_info()).into_raw()
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::DispatchError;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;

    type Completed = (bool, String);

    /// Answers `200 "{METHOD} {url} x-test={value}"`, except URLs ending in
    /// `/fail`, which report a connection error. Counts attempts.
    extern "C" fn fake_transport(
        user_data: *mut c_void,
        request: *const FfiHttpRequest,
        _timeout_secs: u32,
        response: *mut FfiTransportResponse,
    ) {
        let attempts = unsafe { &*(user_data as *const AtomicU32) };
        attempts.fetch_add(1, Ordering::SeqCst);

        let req = unsafe { &*request };
        let url = unsafe { CStr::from_ptr(req.url) }.to_str().unwrap();
        if url.ends_with("/fail") {
            let err = CString::new("connection refused").unwrap();
            dispatch_response_write(response, 0, std::ptr::null(), err.as_ptr());
            return;
        }

        let headers = if req.headers.is_null() {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(req.headers, req.headers_len as usize) }
        };
        let x_test = headers
            .iter()
            .find(|h| unsafe { CStr::from_ptr(h.key) }.to_str().unwrap() == "X-Test")
            .map(|h| unsafe { CStr::from_ptr(h.value) }.to_str().unwrap().to_string())
            .unwrap_or_default();
        let method = match req.method {
            FfiHttpMethod::Get => "GET",
            FfiHttpMethod::Post => "POST",
            FfiHttpMethod::Put => "PUT",
            FfiHttpMethod::Delete => "DELETE",
        };
        let body = CString::new(format!("{method} {url} x-test={x_test}")).unwrap();
        dispatch_response_write(response, 200, body.as_ptr(), std::ptr::null());
    }

    /// Forwards the outcome to the `mpsc::Sender` behind `user_data`. If
    /// the unused side is not a non-null empty string, says so in place of
    /// the text so the comparing test fails.
    extern "C" fn record(
        user_data: *mut c_void,
        success: bool,
        data: *const c_char,
        error: *const c_char,
    ) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<Completed>) };
        let (text, unused) = if success { (data, error) } else { (error, data) };
        let text = unsafe { CStr::from_ptr(text) }.to_str().unwrap().to_string();
        let unused_is_empty =
            !unused.is_null() && unsafe { CStr::from_ptr(unused) }.to_bytes().is_empty();
        if unused_is_empty {
            tx.send((success, text)).unwrap();
        } else {
            tx.send((success, format!("unused side not empty: {text}"))).unwrap();
        }
    }

    type Captured = Vec<(bool, Option<String>, Option<String>)>;

    /// Appends the raw arguments to the `Captured` behind `user_data`.
    extern "C" fn capture(
        user_data: *mut c_void,
        success: bool,
        data: *const c_char,
        error: *const c_char,
    ) {
        let seen = unsafe { &mut *(user_data as *mut Captured) };
        let read = |p: *const c_char| {
            (!p.is_null()).then(|| unsafe { CStr::from_ptr(p) }.to_str().unwrap().to_string())
        };
        seen.push((success, read(data), read(error)));
    }

    struct Fixture {
        dispatcher: *mut FfiDispatcher,
        attempts: Box<AtomicU32>,
        tx: Box<mpsc::Sender<Completed>>,
        rx: mpsc::Receiver<Completed>,
    }

    impl Fixture {
        fn new(config: &str, platform: i32) -> Self {
            let attempts = Box::new(AtomicU32::new(0));
            let config = CString::new(config).unwrap();
            let dispatcher = dispatch_new(
                config.as_ptr(),
                platform,
                2,
                Some(fake_transport),
                &*attempts as *const AtomicU32 as *mut c_void,
            );
            assert!(!dispatcher.is_null());
            let (tx, rx) = mpsc::channel();
            Self {
                dispatcher,
                attempts,
                tx: Box::new(tx),
                rx,
            }
        }

        fn user_data(&self) -> *mut c_void {
            &*self.tx as *const mpsc::Sender<Completed> as *mut c_void
        }

        fn next(&self) -> Completed {
            self.rx.recv_timeout(Duration::from_secs(5)).unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            dispatch_free(self.dispatcher);
        }
    }

    const NO_DELAY: &str = r#"{"retry_delay_ms": 0}"#;

    #[test]
    fn new_and_free() {
        let attempts = AtomicU32::new(0);
        let d = dispatch_new(
            std::ptr::null(),
            3,
            2,
            Some(fake_transport),
            &attempts as *const AtomicU32 as *mut c_void,
        );
        assert!(!d.is_null());
        dispatch_free(d);
    }

    #[test]
    fn new_without_transport_returns_null() {
        let d = dispatch_new(std::ptr::null(), 3, 2, None, std::ptr::null_mut());
        assert!(d.is_null());
    }

    #[test]
    fn new_with_invalid_config_returns_null() {
        let config = CString::new(r#"{"request_timeout_secs": 0}"#).unwrap();
        let d = dispatch_new(config.as_ptr(), 3, 2, Some(fake_transport), std::ptr::null_mut());
        assert!(d.is_null());

        let config = CString::new("not json").unwrap();
        let d = dispatch_new(config.as_ptr(), 3, 2, Some(fake_transport), std::ptr::null_mut());
        assert!(d.is_null());
    }

    #[test]
    fn free_null_is_safe() {
        dispatch_free(std::ptr::null_mut());
    }

    #[test]
    fn get_delivers_body_to_callback() {
        let f = Fixture::new(NO_DELAY, 3);
        let url = CString::new("http://game.test/profile").unwrap();
        let queued = dispatch_get(
            f.dispatcher,
            url.as_ptr(),
            std::ptr::null(),
            0,
            Some(record),
            f.user_data(),
        );
        assert!(queued);
        assert_eq!(
            f.next(),
            (true, "GET http://game.test/profile x-test=".to_string())
        );
    }

    #[test]
    fn requests_complete_in_submission_order() {
        let f = Fixture::new(NO_DELAY, 3);
        let urls: Vec<CString> = (0..4)
            .map(|i| CString::new(format!("http://game.test/{i}")).unwrap())
            .collect();
        for url in &urls {
            dispatch_get(f.dispatcher, url.as_ptr(), std::ptr::null(), 0, Some(record), f.user_data());
        }
        for i in 0..4 {
            let (ok, body) = f.next();
            assert!(ok);
            assert_eq!(body, format!("GET http://game.test/{i} x-test="));
        }
    }

    #[test]
    fn connection_error_is_retried_then_reported() {
        let f = Fixture::new(r#"{"retry_delay_ms": 0, "max_retries": 1}"#, 3);
        let url = CString::new("http://game.test/fail").unwrap();
        dispatch_get(f.dispatcher, url.as_ptr(), std::ptr::null(), 0, Some(record), f.user_data());

        assert_eq!(
            f.next(),
            (false, "request failed: connection refused".to_string())
        );
        assert_eq!(f.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mini_game_caps_retries() {
        let f = Fixture::new(r#"{"retry_delay_ms": 0, "max_retries": 5}"#, 7);
        let url = CString::new("http://game.test/fail").unwrap();
        dispatch_get(f.dispatcher, url.as_ptr(), std::ptr::null(), 0, Some(record), f.user_data());

        let (ok, _) = f.next();
        assert!(!ok);
        assert_eq!(f.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn per_request_headers_override_defaults() {
        let f = Fixture::new(NO_DELAY, 3);
        let key = CString::new("X-Test").unwrap();
        let default = CString::new("1").unwrap();
        assert!(dispatch_set_default_header(f.dispatcher, key.as_ptr(), default.as_ptr()));

        let url = CString::new("http://game.test/h").unwrap();
        let body = CString::new("{}").unwrap();
        dispatch_post(
            f.dispatcher,
            url.as_ptr(),
            body.as_ptr(),
            std::ptr::null(),
            0,
            Some(record),
            f.user_data(),
        );
        assert_eq!(f.next().1, "POST http://game.test/h x-test=1");

        let value = CString::new("2").unwrap();
        let overrides = [FfiHeader {
            key: key.as_ptr(),
            value: value.as_ptr(),
        }];
        dispatch_put(
            f.dispatcher,
            url.as_ptr(),
            body.as_ptr(),
            overrides.as_ptr(),
            1,
            Some(record),
            f.user_data(),
        );
        assert_eq!(f.next().1, "PUT http://game.test/h x-test=2");

        assert!(dispatch_remove_default_header(f.dispatcher, key.as_ptr()));
        assert!(!dispatch_remove_default_header(f.dispatcher, key.as_ptr()));
        dispatch_delete(f.dispatcher, url.as_ptr(), std::ptr::null(), 0, Some(record), f.user_data());
        assert_eq!(f.next().1, "DELETE http://game.test/h x-test=");
    }

    #[test]
    fn unknown_method_is_rejected_synchronously() {
        let f = Fixture::new(NO_DELAY, 3);
        let url = CString::new("http://game.test/x").unwrap();
        let queued = dispatch_request(
            f.dispatcher,
            9,
            url.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            0,
            Some(record),
            f.user_data(),
        );
        assert!(!queued);
        let (ok, error) = f.rx.try_recv().unwrap();
        assert!(!ok);
        assert_eq!(error, "unsupported HTTP method: 9");
        assert_eq!(f.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_url_is_rejected_synchronously() {
        let f = Fixture::new(NO_DELAY, 3);
        let queued = dispatch_get(
            f.dispatcher,
            std::ptr::null(),
            std::ptr::null(),
            0,
            Some(record),
            f.user_data(),
        );
        assert!(!queued);
        assert_eq!(
            f.rx.try_recv().unwrap(),
            (false, "request url is empty".to_string())
        );
    }

    #[test]
    fn null_dispatcher_is_rejected() {
        let url = CString::new("http://game.test/x").unwrap();
        assert!(!dispatch_get(
            std::ptr::null(),
            url.as_ptr(),
            std::ptr::null(),
            0,
            None,
            std::ptr::null_mut()
        ));
        assert_eq!(dispatch_clear_queue(std::ptr::null()), 0);
        assert_eq!(dispatch_queue_len(std::ptr::null()), 0);
        assert!(dispatch_network_info(std::ptr::null()).is_null());
    }

    #[test]
    fn requests_without_callback_still_run() {
        let f = Fixture::new(NO_DELAY, 3);
        let url = CString::new("http://game.test/silent").unwrap();
        assert!(dispatch_get(f.dispatcher, url.as_ptr(), std::ptr::null(), 0, None, std::ptr::null_mut()));

        let marker = CString::new("http://game.test/marker").unwrap();
        dispatch_get(f.dispatcher, marker.as_ptr(), std::ptr::null(), 0, Some(record), f.user_data());
        f.next();
        assert_eq!(f.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn network_status_follows_host_updates() {
        let f = Fixture::new(NO_DELAY, 3);
        assert!(dispatch_is_network_available(f.dispatcher));

        let kind = dispatch_network_type(f.dispatcher);
        assert_eq!(unsafe { CStr::from_ptr(kind) }.to_str().unwrap(), "WiFi");
        dispatch_free_string(kind);

        dispatch_set_reachability(f.dispatcher, 0);
        assert!(!dispatch_is_network_available(f.dispatcher));

        let info = dispatch_network_info(f.dispatcher);
        assert_eq!(
            unsafe { CStr::from_ptr(info) }.to_str().unwrap(),
            "Network Available: false, Network Type: No Network, Queue Size: 0, Timeout: 30s"
        );
        dispatch_free_string(info);
    }

    #[test]
    fn clear_queue_on_idle_dispatcher_is_zero() {
        let f = Fixture::new(NO_DELAY, 3);
        assert_eq!(dispatch_clear_queue(f.dispatcher), 0);
        assert_eq!(dispatch_queue_len(f.dispatcher), 0);
    }

    #[test]
    fn download_writes_the_body() {
        let f = Fixture::new(NO_DELAY, 3);
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("save.txt");

        let url = CString::new("http://game.test/save").unwrap();
        let path = CString::new(file.to_str().unwrap()).unwrap();
        assert!(dispatch_download_file(
            f.dispatcher,
            url.as_ptr(),
            path.as_ptr(),
            Some(record),
            f.user_data()
        ));

        assert_eq!(f.next(), (true, file.display().to_string()));
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "GET http://game.test/save x-test="
        );
    }

    #[test]
    fn unused_callback_argument_is_an_empty_string() {
        let mut seen = Captured::new();
        let target = CompletionTarget::new(Some(capture), &mut seen as *mut Captured as *mut c_void);
        target.deliver(Ok("body".to_string()));
        target.deliver(Err(DispatchError::Transport("down".to_string())));

        assert_eq!(
            seen,
            [
                (true, Some("body".to_string()), Some(String::new())),
                (false, Some(String::new()), Some("request failed: down".to_string())),
            ]
        );
    }

    #[test]
    fn response_write_null_is_safe() {
        dispatch_response_write(std::ptr::null_mut(), 200, std::ptr::null(), std::ptr::null());
    }

    #[test]
    fn unwritten_response_is_a_transport_error() {
        let err = FfiTransportResponse::default().into_core().unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn free_string_null_is_safe() {
        dispatch_free_string(std::ptr::null_mut());
    }

    #[test]
    fn codes_decode_to_core_enums() {
        use dispatch_core::{NetworkReachability, PlatformType};
        assert_eq!(platform_from_code(7), PlatformType::WeixinMiniGame);
        assert_eq!(platform_from_code(42), PlatformType::Unknown);
        assert_eq!(platform_from_code(-1), PlatformType::detect());
        assert_eq!(reachability_from_code(1), NetworkReachability::ReachableViaCarrierDataNetwork);
        assert!(method_from_code(4).is_err());
        assert_eq!(method_from_code(2).unwrap(), HttpMethod::Put);
    }

    #[test]
    fn interior_nul_is_stripped() {
        assert_eq!(to_cstring("a\0b").to_str().unwrap(), "ab");
    }
}
