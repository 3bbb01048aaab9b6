//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Requests handed to the host transport are borrowed views: every pointer
//! in an `FfiHttpRequest` stays valid only for the duration of the
//! transport call. Responses travel the other way through the opaque
//! `FfiTransportResponse`, which the host fills with
//! `dispatch_response_write` so no allocation ever crosses the boundary in
//! the host-to-Rust direction. Platform and reachability arrive as plain
//! integers and are decoded here; an out-of-range value is never
//! reinterpreted as a Rust enum.

use std::collections::BTreeMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use dispatch_core::{
    DispatchError, Dispatcher, Headers, HttpMethod, NetworkReachability, Outcome, PlatformType,
    ReachabilitySource,
};
use tokio::runtime::Runtime;

/// Opaque handle owning a dispatcher and the runtime its worker runs on.
/// C callers receive a pointer to this and pass it back into every
/// `dispatch_*` function.
pub struct FfiDispatcher {
    pub(crate) runtime: Runtime,
    pub(crate) inner: Dispatcher,
    pub(crate) reachability: HostReachability,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

/// Decode a method code passed in from C.
pub(crate) fn method_from_code(code: u32) -> Result<HttpMethod, DispatchError> {
    match code {
        0 => Ok(HttpMethod::Get),
        1 => Ok(HttpMethod::Post),
        2 => Ok(HttpMethod::Put),
        3 => Ok(HttpMethod::Delete),
        other => Err(DispatchError::UnsupportedMethod(other.to_string())),
    }
}

/// A single HTTP header as a key-value pair of borrowed C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// One attempt, as handed to the host transport. Borrowed for the duration
/// of the call; the host must copy anything it keeps.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *const c_char,
    pub headers: *const FfiHeader,
    pub headers_len: u32,
    /// Null for requests without a body.
    pub body: *const c_char,
}

/// Owned C strings backing an `FfiHttpRequest` view.
pub(crate) struct RequestStrings {
    method: FfiHttpMethod,
    url: CString,
    headers: Vec<(CString, CString)>,
    body: Option<CString>,
}

impl RequestStrings {
    pub(crate) fn new(req: &dispatch_core::HttpRequest) -> Self {
        Self {
            method: req.method.into(),
            url: to_cstring(&req.url),
            headers: req
                .headers
                .iter()
                .map(|(k, v)| (to_cstring(k), to_cstring(v)))
                .collect(),
            body: req.body.as_deref().map(to_cstring),
        }
    }

    /// Header views borrowing from `self`.
    pub(crate) fn header_views(&self) -> Vec<FfiHeader> {
        self.headers
            .iter()
            .map(|(k, v)| FfiHeader {
                key: k.as_ptr(),
                value: v.as_ptr(),
            })
            .collect()
    }

    /// Request view borrowing from `self` and `headers`.
    pub(crate) fn view(&self, headers: &[FfiHeader]) -> FfiHttpRequest {
        FfiHttpRequest {
            method: self.method,
            url: self.url.as_ptr(),
            headers: if headers.is_empty() {
                std::ptr::null()
            } else {
                headers.as_ptr()
            },
            headers_len: headers.len() as u32,
            body: self
                .body
                .as_ref()
                .map_or(std::ptr::null(), |b| b.as_ptr()),
        }
    }
}

// ---------------------------------------------------------------------------
// Response input
// ---------------------------------------------------------------------------

/// Filled by the host transport through `dispatch_response_write`. Opaque
/// to C.
#[derive(Debug, Default)]
pub struct FfiTransportResponse {
    pub(crate) written: bool,
    pub(crate) status: u16,
    pub(crate) body: String,
    pub(crate) error: Option<String>,
}

impl FfiTransportResponse {
    pub(crate) fn into_core(self) -> Result<dispatch_core::HttpResponse, DispatchError> {
        if let Some(error) = self.error {
            return Err(DispatchError::Transport(error));
        }
        if !self.written {
            return Err(DispatchError::Transport(
                "transport returned without writing a response".to_string(),
            ));
        }
        Ok(dispatch_core::HttpResponse {
            status: self.status,
            headers: Vec::new(),
            body: self.body,
        })
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Host HTTP stack. Performs one attempt and reports it with
/// `dispatch_response_write(response, ...)` before returning. Called from a
/// worker thread, never from the thread that submitted the request.
pub type FfiTransportFn = extern "C" fn(
    user_data: *mut c_void,
    request: *const FfiHttpRequest,
    timeout_secs: u32,
    response: *mut FfiTransportResponse,
);

/// Completion callback. On success `data` is the response body and `error`
/// is the empty string; on failure `data` is the empty string and `error`
/// is the message. Neither pointer is null. Both strings are only valid
/// during the call.
pub type FfiCompletionFn = extern "C" fn(
    user_data: *mut c_void,
    success: bool,
    data: *const c_char,
    error: *const c_char,
);

/// Host-owned pointer carried across threads. The host promises it may be
/// used from the worker thread.
#[derive(Clone, Copy)]
pub(crate) struct SendPtr(*mut c_void);

unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

impl SendPtr {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(self) -> *mut c_void {
        self.0
    }
}

const EMPTY: &CStr = c"";

/// A completion callback plus its user data.
#[derive(Clone, Copy)]
pub(crate) struct CompletionTarget {
    callback: Option<FfiCompletionFn>,
    user_data: SendPtr,
}

impl CompletionTarget {
    pub(crate) fn new(callback: Option<FfiCompletionFn>, user_data: *mut c_void) -> Self {
        Self {
            callback,
            user_data: SendPtr::new(user_data),
        }
    }

    pub(crate) fn deliver(self, outcome: Outcome) {
        let Some(callback) = self.callback else {
            return;
        };
        match outcome {
            Ok(data) => {
                let data = to_cstring(&data);
                callback(self.user_data.get(), true, data.as_ptr(), EMPTY.as_ptr());
            }
            Err(err) => {
                let error = to_cstring(&err.to_string());
                callback(self.user_data.get(), false, EMPTY.as_ptr(), error.as_ptr());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Platform and reachability
// ---------------------------------------------------------------------------

/// Decode a platform code. Negative values ask for detection from the
/// compile target.
pub(crate) fn platform_from_code(code: i32) -> PlatformType {
    match code {
        c if c < 0 => PlatformType::detect(),
        1 => PlatformType::Windows,
        2 => PlatformType::Mac,
        3 => PlatformType::Linux,
        4 => PlatformType::Android,
        5 => PlatformType::Ios,
        6 => PlatformType::WebGl,
        7 => PlatformType::WeixinMiniGame,
        8 => PlatformType::DouyinMiniGame,
        9 => PlatformType::Editor,
        _ => PlatformType::Unknown,
    }
}

pub(crate) fn reachability_from_code(code: i32) -> NetworkReachability {
    match code {
        0 => NetworkReachability::NotReachable,
        1 => NetworkReachability::ReachableViaCarrierDataNetwork,
        _ => NetworkReachability::ReachableViaLocalAreaNetwork,
    }
}

fn reachability_to_code(reachability: NetworkReachability) -> i32 {
    match reachability {
        NetworkReachability::NotReachable => 0,
        NetworkReachability::ReachableViaCarrierDataNetwork => 1,
        NetworkReachability::ReachableViaLocalAreaNetwork => 2,
    }
}

/// Reachability pushed by the host with `dispatch_set_reachability`.
#[derive(Clone)]
pub(crate) struct HostReachability(Arc<AtomicI32>);

impl HostReachability {
    pub(crate) fn new(initial: NetworkReachability) -> Self {
        Self(Arc::new(AtomicI32::new(reachability_to_code(initial))))
    }

    pub(crate) fn set(&self, reachability: NetworkReachability) {
        self.0
            .store(reachability_to_code(reachability), Ordering::Relaxed);
    }
}

impl ReachabilitySource for HostReachability {
    fn reachability(&self) -> NetworkReachability {
        reachability_from_code(self.0.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// String helpers
// ---------------------------------------------------------------------------

/// `CString` from arbitrary text. Interior NULs are dropped rather than
/// failing the call.
pub(crate) fn to_cstring(s: &str) -> CString {
    CString::new(s).unwrap_or_else(|_| {
        let cleaned: String = s.chars().filter(|&c| c != '\0').collect();
        CString::new(cleaned).unwrap_or_default()
    })
}

/// Copy a borrowed C string. Null reads as `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copy a header array. Null or empty reads as `None`; entries with a null
/// key are skipped and a null value reads as empty.
///
/// # Safety
/// `ptr` must be null or point to `len` valid `FfiHeader`s.
pub(crate) unsafe fn read_headers(ptr: *const FfiHeader, len: u32) -> Option<Headers> {
    if ptr.is_null() || len == 0 {
        return None;
    }
    let entries = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    let headers: BTreeMap<String, String> = entries
        .iter()
        .filter_map(|h| {
            let key = unsafe { read_str(h.key) }?;
            let value = unsafe { read_str(h.value) }.unwrap_or_default();
            Some((key, value))
        })
        .collect();
    Some(headers)
}
