//! Reliable delivery of one encoded reading to one collector endpoint.
//!
//! Every try is classified from the transport result and the HTTP status:
//!
//! | observation                          | class      |
//! |--------------------------------------|------------|
//! | connect/DNS/reset error, timeout     | retryable  |
//! | 2xx                                  | success    |
//! | 4xx                                  | fatal      |
//! | 5xx and above                        | retryable  |
//! | anything else (1xx, 3xx)             | retryable, flagged as unrecognized |
//!
//! Retryable tries are repeated until the [`RetryPolicy`] runs out, sleeping
//! `base_backoff * multiplier^n` (capped at `max_backoff`) after try `n`.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{redirect, Client, StatusCode};
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use wire::{RawPayload, SensorKind};

pub const DEVICE_ID_HEADER: &str = "x-device-id";

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("base_backoff must be positive")]
    ZeroBackoff,

    #[error("backoff_multiplier must be a finite number >= 1, got {0}")]
    InvalidMultiplier(f64),

    #[error("max_backoff ({max:?}) must not be below base_backoff ({base:?})")]
    CeilingBelowBase { base: Duration, max: Duration },

    #[error("request_timeout must be positive")]
    ZeroTimeout,
}

/// Retry tuning for [`UplinkClient::send`]. Always valid once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    backoff_multiplier: f64,
    max_backoff: Duration,
    request_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_backoff: Duration,
        backoff_multiplier: f64,
        max_backoff: Duration,
        request_timeout: Duration,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if base_backoff.is_zero() {
            return Err(PolicyError::ZeroBackoff);
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(backoff_multiplier));
        }
        if max_backoff < base_backoff {
            return Err(PolicyError::CeilingBelowBase {
                base: base_backoff,
                max: max_backoff,
            });
        }
        if request_timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }

        Ok(Self {
            max_attempts,
            base_backoff,
            backoff_multiplier,
            max_backoff,
            request_timeout,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Wait after the failed try with 0-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // Overflow lands on the ceiling
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }
}

/// Why a single try did not succeed but may on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error: {0}")]
    ServerError(StatusCode),

    #[error("unrecognized status: {0}")]
    UnexpectedStatus(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { status: StatusCode, body: String },
    Retryable(AttemptError),
    Fatal { status: StatusCode, body: String },
}

/// One try of a delivery. Only lives for the duration of [`UplinkClient::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub index: u32,
    /// Backoff slept before this try; zero for the first one.
    pub waited: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("rejected by collector with {status}: {body}")]
    ClientRejected { status: StatusCode, body: String },

    #[error("retries exhausted, last error: {last_error}{}", unrecognized_note(.unrecognized_status))]
    Exhausted {
        last_error: AttemptError,
        /// Last status outside the known table seen during the delivery, if any.
        unrecognized_status: Option<StatusCode>,
    },
}

fn unrecognized_note(status: &Option<StatusCode>) -> String {
    match status {
        Some(status) => format!(" (unrecognized status {} was seen)", status),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { body: String, attempts: u32 },
    Failed { reason: FailureReason, attempts_made: u32 },
}

#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    ClientError,
    ServerError,
    Unrecognized,
}

fn classify(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=299 => StatusClass::Success,
        400..=499 => StatusClass::ClientError,
        500..=u16::MAX => StatusClass::ServerError,
        _ => StatusClass::Unrecognized,
    }
}

/// Headers every uplink request carries.
pub fn default_headers(api_key: &str, device_id: &str) -> Result<HeaderMap, UplinkError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| UplinkError::InvalidHeader { name: "authorization" })?,
    );
    headers.insert(
        DEVICE_ID_HEADER,
        HeaderValue::from_str(device_id)
            .map_err(|_| UplinkError::InvalidHeader { name: DEVICE_ID_HEADER })?,
    );
    Ok(headers)
}

pub fn endpoint_for(server_url: &str, kind: SensorKind) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), kind.route())
}

/// HTTP uplink. Build once and share; the connection pool lives inside.
#[derive(Debug, Clone)]
pub struct UplinkClient {
    http: Client,
}

impl UplinkClient {
    pub fn new() -> Result<Self, UplinkError> {
        // Redirects are reported as unrecognized statuses rather than followed
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { http })
    }

    /// Delivers `payload` to `endpoint`. Never returns an error: every way the
    /// delivery can end is a [`DeliveryOutcome`].
    pub async fn send(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        payload: &RawPayload,
        policy: &RetryPolicy,
    ) -> DeliveryOutcome {
        let mut index = 0;
        let mut waited = Duration::ZERO;
        let mut unrecognized_status = None;

        loop {
            let attempt = DeliveryAttempt {
                index,
                waited,
                outcome: self.attempt(endpoint, headers, payload, policy).await,
            };
            debug!(
                "Attempt {}/{} to {} after {:?}: {:?}",
                attempt.index + 1,
                policy.max_attempts(),
                endpoint,
                attempt.waited,
                attempt.outcome
            );

            match attempt.outcome {
                AttemptOutcome::Success { status, body } => {
                    if index > 0 {
                        info!("Delivered to {} ({}) after {} attempts", endpoint, status, index + 1);
                    }
                    return DeliveryOutcome::Delivered {
                        body,
                        attempts: index + 1,
                    };
                }
                AttemptOutcome::Fatal { status, body } => {
                    error!("Collector rejected payload with {}, not retrying: {}", status, body);
                    return DeliveryOutcome::Failed {
                        reason: FailureReason::ClientRejected { status, body },
                        attempts_made: index + 1,
                    };
                }
                AttemptOutcome::Retryable(last_error) => {
                    if let AttemptError::UnexpectedStatus(status) = &last_error {
                        unrecognized_status = Some(*status);
                    }

                    if index + 1 >= policy.max_attempts() {
                        error!(
                            "Delivery to {} failed after {} attempts: {}",
                            endpoint,
                            policy.max_attempts(),
                            last_error
                        );
                        return DeliveryOutcome::Failed {
                            reason: FailureReason::Exhausted {
                                last_error,
                                unrecognized_status,
                            },
                            attempts_made: policy.max_attempts(),
                        };
                    }

                    let delay = policy.backoff(index);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {}ms...",
                        index + 1,
                        policy.max_attempts(),
                        last_error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;

                    waited = delay;
                    index += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        payload: &RawPayload,
        policy: &RetryPolicy,
    ) -> AttemptOutcome {
        let response = match self
            .http
            .post(endpoint)
            .headers(headers.clone())
            .timeout(policy.request_timeout())
            .body(payload.as_str().to_owned())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Retryable(transport_error(&e)),
        };

        let status = response.status();
        match classify(status) {
            StatusClass::Success => match response.text().await {
                Ok(body) => AttemptOutcome::Success { status, body },
                Err(e) => AttemptOutcome::Retryable(transport_error(&e)),
            },
            StatusClass::ClientError => AttemptOutcome::Fatal {
                status,
                body: response.text().await.unwrap_or_default(),
            },
            StatusClass::ServerError => AttemptOutcome::Retryable(AttemptError::ServerError(status)),
            StatusClass::Unrecognized => {
                warn!("Unrecognized status {} from {}", status, endpoint);
                AttemptOutcome::Retryable(AttemptError::UnexpectedStatus(status))
            }
        }
    }
}

fn transport_error(err: &reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        return AttemptError::Timeout;
    }

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    AttemptError::Transport(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap as AxumHeaders, routing::post, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    struct MockState {
        statuses: Vec<u16>,
        delay: Duration,
        hits: Mutex<Vec<Instant>>,
        last_auth: Mutex<Option<String>>,
    }

    async fn mock_handler(
        State(state): State<Arc<MockState>>,
        headers: AxumHeaders,
        _body: String,
    ) -> (axum::http::StatusCode, String) {
        let n = {
            let mut hits = state.hits.lock().unwrap();
            hits.push(Instant::now());
            hits.len() - 1
        };
        *state.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !state.delay.is_zero() {
            tokio::time::sleep(state.delay).await;
        }

        let code = state
            .statuses
            .get(n)
            .or(state.statuses.last())
            .copied()
            .unwrap_or(200);
        (
            axum::http::StatusCode::from_u16(code).unwrap(),
            format!("reply {}", n),
        )
    }

    /// Collector stand-in answering with `statuses` in order, repeating the last.
    async fn spawn_mock(statuses: &[u16], delay: Duration) -> (String, Arc<MockState>) {
        let state = Arc::new(MockState {
            statuses: statuses.to_vec(),
            delay,
            hits: Mutex::new(Vec::new()),
            last_auth: Mutex::new(None),
        });
        let app = Router::new()
            .route("/dht22", post(mock_handler))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), state)
    }

    fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(base_ms),
            2.0,
            Duration::from_secs(10),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn payload() -> RawPayload {
        wire::encode(SensorKind::Thermal, &["22.5", "60", "41.2", "OK"]).unwrap()
    }

    fn headers() -> HeaderMap {
        default_headers("secret", "test-device").unwrap()
    }

    fn hit_count(state: &MockState) -> usize {
        state.hits.lock().unwrap().len()
    }

    #[test]
    fn test_policy_rejects_invalid_settings() {
        let second = Duration::from_secs(1);
        assert_eq!(
            RetryPolicy::new(0, second, 2.0, second, second),
            Err(PolicyError::ZeroAttempts)
        );
        assert_eq!(
            RetryPolicy::new(3, Duration::ZERO, 2.0, second, second),
            Err(PolicyError::ZeroBackoff)
        );
        assert_eq!(
            RetryPolicy::new(3, second, 0.5, second, second),
            Err(PolicyError::InvalidMultiplier(0.5))
        );
        assert!(matches!(
            RetryPolicy::new(3, second, f64::NAN, second, second),
            Err(PolicyError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, second, 2.0, Duration::from_millis(10), second),
            Err(PolicyError::CeilingBelowBase { .. })
        ));
        assert_eq!(
            RetryPolicy::new(3, second, 2.0, second, Duration::ZERO),
            Err(PolicyError::ZeroTimeout)
        );
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(500),
            2.0,
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_fractional_multiplier() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(500),
            1.5,
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(policy.backoff(1), Duration::from_millis(750));
        assert_eq!(policy.backoff(2), Duration::from_millis(1125));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(
            100,
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(99), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_multiplier_of_one_is_constant() {
        let policy = RetryPolicy::new(
            4,
            Duration::from_millis(250),
            1.0,
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .unwrap();

        for attempt in 0..4 {
            assert_eq!(policy.backoff(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), StatusClass::Success);
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusClass::ClientError);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusClass::ClientError);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::ClientError);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), StatusClass::ServerError);
        assert_eq!(classify(StatusCode::GATEWAY_TIMEOUT), StatusClass::ServerError);
        assert_eq!(classify(StatusCode::FOUND), StatusClass::Unrecognized);
        assert_eq!(classify(StatusCode::CONTINUE), StatusClass::Unrecognized);
    }

    #[test]
    fn test_default_headers() {
        let headers = headers();
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
        assert_eq!(headers[DEVICE_ID_HEADER], "test-device");

        assert!(matches!(
            default_headers("bad\nkey", "dev"),
            Err(UplinkError::InvalidHeader { name: "authorization" })
        ));
    }

    #[test]
    fn test_endpoint_for() {
        assert_eq!(
            endpoint_for("http://pi5.local:8080/", SensorKind::Thermal),
            "http://pi5.local:8080/dht22"
        );
        assert_eq!(
            endpoint_for("http://pi5.local:8080", SensorKind::AirQuality),
            "http://pi5.local:8080/ens160"
        );
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Exhausted {
            last_error: AttemptError::ServerError(StatusCode::SERVICE_UNAVAILABLE),
            unrecognized_status: Some(StatusCode::FOUND),
        };
        let text = reason.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("unrecognized status 302"));
    }

    #[tokio::test]
    async fn test_delivered_first_try() {
        let (base, state) = spawn_mock(&[200], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(3, 10))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Delivered {
                body: "reply 0".to_string(),
                attempts: 1,
            }
        );
        assert_eq!(hit_count(&state), 1);
        assert_eq!(
            state.last_auth.lock().unwrap().as_deref(),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (base, state) = spawn_mock(&[503, 500, 200], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(5, 10))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Delivered {
                body: "reply 2".to_string(),
                attempts: 3,
            }
        );
        assert_eq!(hit_count(&state), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        for code in [400, 401, 404] {
            let (base, state) = spawn_mock(&[code], Duration::ZERO).await;
            let client = UplinkClient::new().unwrap();

            let outcome = client
                .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(5, 10))
                .await;

            assert_eq!(
                outcome,
                DeliveryOutcome::Failed {
                    reason: FailureReason::ClientRejected {
                        status: StatusCode::from_u16(code).unwrap(),
                        body: "reply 0".to_string(),
                    },
                    attempts_made: 1,
                }
            );
            assert_eq!(hit_count(&state), 1);
        }
    }

    #[tokio::test]
    async fn test_exhausted_on_persistent_503() {
        let (base, state) = spawn_mock(&[503], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(4, 5))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                reason: FailureReason::Exhausted {
                    last_error: AttemptError::ServerError(StatusCode::SERVICE_UNAVAILABLE),
                    unrecognized_status: None,
                },
                attempts_made: 4,
            }
        );
        assert_eq!(hit_count(&state), 4);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let (base, state) = spawn_mock(&[500], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(1, 1000))
            .await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Failed { attempts_made: 1, .. }
        ));
        assert_eq!(hit_count(&state), 1);
    }

    #[tokio::test]
    async fn test_backoff_spacing_between_attempts() {
        let (base, state) = spawn_mock(&[503], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();
        let policy = policy(4, 50);

        client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy)
            .await;

        let hits = state.hits.lock().unwrap().clone();
        assert_eq!(hits.len(), 4);
        for i in 0..3 {
            let gap = hits[i + 1] - hits[i];
            let expected = policy.backoff(i as u32);
            assert!(gap >= expected, "gap {} was {:?}, expected {:?}", i, gap, expected);
            assert!(
                gap < expected + Duration::from_millis(250),
                "gap {} was {:?}, expected about {:?}",
                i,
                gap,
                expected
            );
        }
    }

    #[tokio::test]
    async fn test_unrecognized_status_is_retried_and_flagged() {
        let (base, state) = spawn_mock(&[302], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(2, 5))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                reason: FailureReason::Exhausted {
                    last_error: AttemptError::UnexpectedStatus(StatusCode::FOUND),
                    unrecognized_status: Some(StatusCode::FOUND),
                },
                attempts_made: 2,
            }
        );
        assert_eq!(hit_count(&state), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_status_flag_survives_later_errors() {
        let (base, _state) = spawn_mock(&[302, 503], Duration::ZERO).await;
        let client = UplinkClient::new().unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy(3, 5))
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                reason: FailureReason::Exhausted {
                    last_error: AttemptError::ServerError(StatusCode::SERVICE_UNAVAILABLE),
                    unrecognized_status: Some(StatusCode::FOUND),
                },
                attempts_made: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UplinkClient::new().unwrap();
        let outcome = client
            .send(&format!("http://{}/dht22", addr), &headers(), &payload(), &policy(3, 5))
            .await;

        match outcome {
            DeliveryOutcome::Failed {
                reason:
                    FailureReason::Exhausted {
                        last_error: AttemptError::Transport(_),
                        unrecognized_status: None,
                    },
                attempts_made: 3,
            } => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_timeout_is_retried() {
        let (base, state) = spawn_mock(&[200], Duration::from_millis(500)).await;
        let client = UplinkClient::new().unwrap();
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(5),
            2.0,
            Duration::from_millis(5),
            Duration::from_millis(50),
        )
        .unwrap();

        let outcome = client
            .send(&format!("{}/dht22", base), &headers(), &payload(), &policy)
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed {
                reason: FailureReason::Exhausted {
                    last_error: AttemptError::Timeout,
                    unrecognized_status: None,
                },
                attempts_made: 2,
            }
        );
        assert_eq!(hit_count(&state), 2);
    }
}
