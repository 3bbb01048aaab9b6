//! HTTP request and response types exchanged with the transport.
//!
//! # Design
//! These types describe one HTTP attempt as plain data. The dispatcher owns
//! the `HttpRequest` for a descriptor's whole lifetime and hands the
//! transport a borrowed view per attempt; the transport answers with an
//! `HttpResponse`. Nothing here touches the network.
//!
//! Headers are kept in a `BTreeMap` so the merged set has a stable order
//! when it crosses the C boundary or shows up in logs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Header map attached to a request. Keys are stored as given.
pub type Headers = BTreeMap<String, String>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only POST and PUT carry a request body.
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = DispatchError;

    /// Case-insensitive; anything outside the four supported verbs is
    /// reported as `UnsupportedMethod`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(DispatchError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// An HTTP request described as plain data.
///
/// Headers are the merged set captured at submission time; they are not
/// recomputed when the request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Check the invariants a request must satisfy before it may be queued.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.url.trim().is_empty() {
            return Err(DispatchError::EmptyUrl);
        }
        if self.body.is_some() && !self.method.allows_body() {
            return Err(DispatchError::BodyNotAllowed(self.method));
        }
        Ok(())
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the transport after a round-trip completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn the response into the body on 2xx, or an `HttpStatus` failure.
    pub fn into_outcome(self) -> Result<String, DispatchError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(DispatchError::HttpStatus {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Start from a copy of `defaults` and overlay `overrides`; override keys
/// replace default keys of the same name.
pub fn merge_headers(defaults: &Headers, overrides: Option<&Headers>) -> Headers {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
