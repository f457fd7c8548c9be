use super::{AuthTransport, Grant};
use crate::config::{AuthRequest, TransportConfig};
use crate::error::AuthError;
use crate::lease::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LOCAL_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Statuses that mean the service refused these credentials. Any other
/// non-success status is reported as [`AuthError::Network`].
const REJECTION_STATUSES: [u16; 4] = [400, 401, 403, 422];

/// Authenticates over HTTP(S) with a JSON `POST`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
    clock: Arc<dyn Clock>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| AuthError::config(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    /// Clock used to turn an absolute `expires_at` into a lease.
    ///
    /// The resulting lease is counted from the cache's own clock, so both
    /// should be the same source. `TokenCache::http_with_clock` wires them.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn grant_from(&self, body: &str, timezone: Tz) -> Result<Grant, AuthError> {
        let resp: AuthResponse = serde_json::from_str(body)
            .map_err(|e| AuthError::malformed(format!("Invalid JSON: {}", e)))?;

        let token = resp
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::malformed("missing token"))?;

        let lease_seconds = match (resp.lease_seconds, resp.expires_at) {
            (Some(lease), _) => lease,
            (None, Some(expires_at)) => {
                let expiry = parse_expiry(&expires_at, timezone)?;
                expiry
                    .signed_duration_since(self.clock.now())
                    .num_seconds()
            }
            (None, None) => {
                return Err(AuthError::malformed(
                    "missing lease_seconds or expires_at",
                ));
            }
        };

        Ok(Grant {
            token,
            lease_seconds,
        })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    totp_code: Option<&'a str>,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
    lease_seconds: Option<i64>,
    expires_at: Option<String>,
}

/// Accepts RFC 3339, or a naive local time in the configured timezone.
fn parse_expiry(value: &str, timezone: Tz) -> Result<DateTime<Tz>, AuthError> {
    if let Ok(expiry) = DateTime::parse_from_rfc3339(value) {
        return Ok(expiry.with_timezone(&timezone));
    }

    let naive = NaiveDateTime::parse_from_str(value, LOCAL_EXPIRY_FORMAT)
        .map_err(|e| AuthError::malformed(format!("Invalid expires_at format: {}", e)))?;

    timezone.from_local_datetime(&naive).single().ok_or_else(|| {
        AuthError::malformed(format!(
            "expires_at {} is ambiguous or invalid in {}",
            value, timezone
        ))
    })
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Grant, AuthError> {
        let url = self.config.url(request);
        tracing::debug!(%url, username = %request.username, "Sending authentication request");

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &request.username,
                password: &request.password,
                totp_code: request.totp_code.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if REJECTION_STATUSES.contains(&status.as_u16()) {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthenticationRejected {
                status: status.as_u16(),
                message: body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Network(format!(
                "authentication service returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        self.grant_from(&body, request.timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::ManualClock;
    use chrono::Utc;

    fn transport_at(now: DateTime<chrono::Utc>) -> HttpTransport {
        HttpTransport::new(TransportConfig::default().scheme("http"))
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(now)))
    }

    #[test]
    fn test_lease_seconds_response() {
        let transport = transport_at(Utc::now());
        let grant = transport
            .grant_from(r#"{"token": "abc", "lease_seconds": 3600}"#, Tz::UTC)
            .unwrap();
        assert_eq!(grant.token, "abc");
        assert_eq!(grant.lease_seconds, 3600);
    }

    #[test]
    fn test_local_expires_at_is_read_in_timezone() {
        // 10:00 UTC is 12:00 in Paris during summer time.
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let transport = transport_at(now);
        let paris: Tz = "Europe/Paris".parse().unwrap();

        let grant = transport
            .grant_from(
                r#"{"token": "abc", "expires_at": "2024-07-01 15:00:00"}"#,
                paris,
            )
            .unwrap();
        assert_eq!(grant.lease_seconds, 3 * 3600);
    }

    #[test]
    fn test_rfc3339_expires_at() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let grant = transport_at(now)
            .grant_from(
                r#"{"token": "abc", "expires_at": "2024-07-01T10:00:30Z"}"#,
                Tz::UTC,
            )
            .unwrap();
        assert_eq!(grant.lease_seconds, 30);
    }

    #[test]
    fn test_lease_seconds_wins_over_expires_at() {
        let grant = transport_at(Utc::now())
            .grant_from(
                r#"{"token": "abc", "lease_seconds": 5, "expires_at": "2099-01-01 00:00:00"}"#,
                Tz::UTC,
            )
            .unwrap();
        assert_eq!(grant.lease_seconds, 5);
    }

    #[test]
    fn test_malformed_bodies() {
        let transport = transport_at(Utc::now());
        let bodies = [
            "not json",
            r#"{"lease_seconds": 10}"#,
            r#"{"token": "", "lease_seconds": 10}"#,
            r#"{"token": "abc"}"#,
            r#"{"token": "abc", "expires_at": "tomorrow"}"#,
        ];
        for body in bodies {
            assert!(
                matches!(
                    transport.grant_from(body, Tz::UTC),
                    Err(AuthError::MalformedResponse(_))
                ),
                "{} should be malformed",
                body
            );
        }
    }

    #[test]
    fn test_nonexistent_local_time_is_malformed() {
        // Clocks jump from 02:00 to 03:00 in Paris on this date.
        let paris: Tz = "Europe/Paris".parse().unwrap();
        let result = parse_expiry("2024-03-31 02:30:00", paris);
        assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
    }

    #[test]
    fn test_new_rejects_unknown_scheme() {
        let result = HttpTransport::new(TransportConfig::default().scheme("gopher"));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_login_request_omits_missing_totp() {
        let body = serde_json::to_value(LoginRequest {
            username: "admin",
            password: "pw",
            totp_code: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"username": "admin", "password": "pw"}));
    }
}
