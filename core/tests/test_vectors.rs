//! Replay the JSON vectors stored in `test-vectors/`.
//!
//! Each file lists named cases with their inputs and expected results.
//! Header maps are compared as parsed maps, not raw strings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::dispatcher::user_agent;
use dispatch_core::{
    merge_headers, DispatchError, Dispatcher, DispatcherConfig, Headers, HttpMethod, HttpRequest,
    HttpResponse, PlatformType, Transport,
};
use serde_json::Value;

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn platform(case: &Value) -> PlatformType {
    serde_json::from_value(case["platform"].clone()).unwrap()
}

fn config(case: &Value) -> DispatcherConfig {
    DispatcherConfig::from_json(&case["config"].to_string()).unwrap()
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn policy_test_vectors() {
    for case in load(include_str!("../../test-vectors/policy.json")) {
        let name = case["name"].as_str().unwrap();
        let platform = platform(&case);
        let config = config(&case);
        let expected = &case["expected"];

        let policy = config.resolve(platform.is_mini_game());
        assert_eq!(
            policy.request_timeout,
            Duration::from_secs(expected["timeout_secs"].as_u64().unwrap()),
            "{name}: timeout"
        );
        assert_eq!(
            u64::from(policy.max_retries),
            expected["max_retries"].as_u64().unwrap(),
            "{name}: max_retries"
        );
        assert_eq!(
            policy.retry_delay,
            Duration::from_millis(expected["retry_delay_ms"].as_u64().unwrap()),
            "{name}: retry_delay"
        );
        assert_eq!(
            policy.request_spacing,
            expected["spacing_ms"].as_u64().map(Duration::from_millis),
            "{name}: spacing"
        );

        let agent = user_agent(&config.app_name, &config.app_version, platform);
        assert_eq!(agent, case["expected_user_agent"], "{name}: user agent");

        // The dispatcher resolves the same policy from its capability source.
        let d = Dispatcher::builder(Replay::new(Vec::new()))
            .config(config)
            .capabilities(platform)
            .build()
            .unwrap();
        assert_eq!(d.policy(), policy, "{name}: dispatcher policy");
        assert_eq!(d.default_headers()["User-Agent"], agent, "{name}: default header");
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

#[test]
fn header_merge_test_vectors() {
    for case in load(include_str!("../../test-vectors/headers.json")) {
        let name = case["name"].as_str().unwrap();
        let defaults: Headers = serde_json::from_value(case["defaults"].clone()).unwrap();
        let overrides: Option<Headers> = serde_json::from_value(case["overrides"].clone()).unwrap();
        let expected: Headers = serde_json::from_value(case["expected"].clone()).unwrap();

        let merged = merge_headers(&defaults, overrides.as_ref());
        assert_eq!(merged, expected, "{name}: merged headers");
    }
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

/// Plays back one scripted response per attempt; the last one repeats.
struct Replay {
    script: Vec<Value>,
    attempts: Arc<AtomicUsize>,
}

impl Replay {
    fn new(script: Vec<Value>) -> Self {
        Self {
            script,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Transport for Replay {
    async fn execute(
        &self,
        _request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = &self.script[attempt.min(self.script.len() - 1)];
        if let Some(error) = step["error"].as_str() {
            return Err(DispatchError::Transport(error.to_string()));
        }
        Ok(HttpResponse {
            status: step["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: step["body"].as_str().unwrap().to_string(),
        })
    }
}

#[tokio::test]
async fn retry_test_vectors() {
    for case in load(include_str!("../../test-vectors/retries.json")) {
        let name = case["name"].as_str().unwrap();
        let script = case["responses"].as_array().unwrap().clone();
        let expected = &case["expected"];

        let transport = Replay::new(script);
        let attempts = Arc::clone(&transport.attempts);
        let d = Dispatcher::builder(transport)
            .config(config(&case))
            .capabilities(platform(&case))
            .build()
            .unwrap();

        let outcome = d
            .send(HttpMethod::Get, "http://vectors.test/item", None, None)
            .await;
        assert_eq!(
            attempts.load(Ordering::SeqCst) as u64,
            expected["attempts"].as_u64().unwrap(),
            "{name}: attempts"
        );
        if expected["success"].as_bool().unwrap() {
            assert_eq!(
                outcome.unwrap(),
                expected["data"].as_str().unwrap(),
                "{name}: data"
            );
        } else {
            assert_eq!(
                outcome.unwrap_err().to_string(),
                expected["error"].as_str().unwrap(),
                "{name}: error"
            );
        }
    }
}
