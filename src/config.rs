use crate::error::AuthError;
use chrono_tz::Tz;
use std::fmt;
use std::time::Duration;

const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_SCHEME: &str = "https";
const DEFAULT_AUTH_PATH: &str = "/auth";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials supplied by the caller, not yet validated.
#[derive(Clone, Default)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// IANA timezone name, `UTC` when unset.
    pub timezone: Option<String>,
    /// One-time code, sent with the initial handshake only.
    pub totp_code: Option<String>,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            timezone: None,
            totp_code: None,
        }
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn totp_code(mut self, code: impl Into<String>) -> Self {
        self.totp_code = Some(code.into());
        self
    }

    /// Read `PPAUTH_HOST`, `PPAUTH_PORT`, `PPAUTH_USERNAME`, `PPAUTH_PASSWORD`,
    /// `PPAUTH_TIMEZONE` and `PPAUTH_TOTP_CODE`.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| AuthError::config(format!("{} not set", key)))
        };

        let port = required("PPAUTH_PORT")?;
        let port = port
            .trim()
            .parse()
            .map_err(|_| AuthError::config(format!("PPAUTH_PORT is not a valid port: {}", port)))?;

        Ok(Self {
            host: required("PPAUTH_HOST")?,
            port,
            username: required("PPAUTH_USERNAME")?,
            password: required("PPAUTH_PASSWORD")?,
            timezone: lookup("PPAUTH_TIMEZONE"),
            totp_code: lookup("PPAUTH_TOTP_CODE"),
        })
    }

    /// Check every field and parse the timezone.
    pub fn validate(self) -> Result<AuthRequest, AuthError> {
        let host = self.host.trim().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(AuthError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(AuthError::config("port must be in 1..=65535"));
        }
        if self.username.is_empty() {
            return Err(AuthError::config("username must not be empty"));
        }
        if self.password.is_empty() {
            return Err(AuthError::config("password must not be empty"));
        }

        let tz_name = self
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE);
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| AuthError::config(format!("unknown timezone: {}", tz_name)))?;

        let totp_code = self
            .totp_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "null")
            .map(str::to_string);

        Ok(AuthRequest {
            host,
            port: self.port,
            username: self.username,
            password: self.password,
            timezone,
            totp_code,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timezone", &self.timezone)
            .field("totp_code", &self.totp_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated credentials, as handed to an [`AuthTransport`](crate::AuthTransport).
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timezone: Tz,
    pub totp_code: Option<String>,
}

impl AuthRequest {
    /// Same credentials without the one-time code.
    pub(crate) fn for_renewal(&self) -> Self {
        Self {
            totp_code: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

/// Settings for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub scheme: String,
    pub path: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            path: DEFAULT_AUTH_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Defaults overridden by `PPAUTH_SCHEME`, `PPAUTH_AUTH_PATH`,
    /// `PPAUTH_TIMEOUT_SECS` and `PPAUTH_ACCEPT_INVALID_CERTS`.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let mut config = Self::default();

        if let Some(scheme) = lookup("PPAUTH_SCHEME") {
            config.scheme = scheme;
        }
        if let Some(path) = lookup("PPAUTH_AUTH_PATH") {
            config.path = path;
        }
        if let Some(secs) = lookup("PPAUTH_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AuthError::config(format!("PPAUTH_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(accept) = lookup("PPAUTH_ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = accept.trim().parse().map_err(|_| {
                AuthError::config(format!(
                    "PPAUTH_ACCEPT_INVALID_CERTS must be true or false: {}",
                    accept
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(AuthError::config(format!(
                "unsupported scheme: {}",
                self.scheme
            )));
        }
        if self.timeout.is_zero() {
            return Err(AuthError::config("timeout must be greater than zero"));
        }
        Ok(())
    }

    pub(crate) fn url(&self, request: &AuthRequest) -> String {
        format!(
            "{}://{}:{}/{}",
            self.scheme,
            request.host,
            request.port,
            self.path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_validate_defaults_timezone_to_utc() {
        let request = Credentials::new("proxy.local", 8080, "admin", "admin123")
            .validate()
            .unwrap();
        assert_eq!(request.timezone, Tz::UTC);
        assert!(request.totp_code.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let cases = [
            Credentials::new("", 8080, "admin", "pw"),
            Credentials::new("host", 0, "admin", "pw"),
            Credentials::new("host", 8080, "", "pw"),
            Credentials::new("host", 8080, "admin", ""),
            Credentials::new("host", 8080, "admin", "pw").timezone("Mars/Olympus"),
        ];
        for creds in cases {
            assert!(matches!(
                creds.validate(),
                Err(AuthError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_blank_and_null_totp_are_dropped() {
        for code in ["", "  ", "null"] {
            let request = Credentials::new("host", 1, "u", "p")
                .totp_code(code)
                .validate()
                .unwrap();
            assert!(request.totp_code.is_none());
        }
        let request = Credentials::new("host", 1, "u", "p")
            .totp_code(" 123456 ")
            .validate()
            .unwrap();
        assert_eq!(request.totp_code.as_deref(), Some("123456"));
        assert!(request.for_renewal().totp_code.is_none());
    }

    #[test]
    fn test_trailing_slash_is_trimmed_from_host() {
        let request = Credentials::new("proxy.local/", 443, "u", "p")
            .validate()
            .unwrap();
        assert_eq!(request.host, "proxy.local");
        assert_eq!(
            TransportConfig::default().url(&request),
            "https://proxy.local:443/auth"
        );
    }

    #[test]
    fn test_credentials_from_lookup() {
        let creds = Credentials::from_lookup(lookup(&[
            ("PPAUTH_HOST", "127.0.0.1"),
            ("PPAUTH_PORT", "8080"),
            ("PPAUTH_USERNAME", "admin"),
            ("PPAUTH_PASSWORD", "admin123"),
            ("PPAUTH_TIMEZONE", "Europe/Paris"),
        ]))
        .unwrap();
        assert_eq!(creds.port, 8080);
        assert_eq!(creds.timezone.as_deref(), Some("Europe/Paris"));

        let missing = Credentials::from_lookup(lookup(&[("PPAUTH_PORT", "8080")]));
        assert!(matches!(missing, Err(AuthError::Configuration(_))));

        let bad_port = Credentials::from_lookup(lookup(&[("PPAUTH_PORT", "99999")]));
        assert!(matches!(bad_port, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_transport_config_from_lookup() {
        let config = TransportConfig::from_lookup(lookup(&[
            ("PPAUTH_SCHEME", "http"),
            ("PPAUTH_TIMEOUT_SECS", "3"),
            ("PPAUTH_ACCEPT_INVALID_CERTS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.scheme, "http");
        assert_eq!(config.path, "/auth");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(config.accept_invalid_certs);

        let bad = TransportConfig::from_lookup(lookup(&[("PPAUTH_SCHEME", "ftp")]));
        assert!(matches!(bad, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("h", 1, "admin", "hunter2").totp_code("654321");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("654321"));

        let request = creds.validate().unwrap();
        assert!(!format!("{:?}", request).contains("hunter2"));
    }
}
