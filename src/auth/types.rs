// Authentication types

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login identity for the Bayes portal.
/// Read once from configuration and never written to disk.
#[derive(Debug, Clone)]
pub struct Credential {
    pub identity: String,
    secret: SecretString,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Bearer token with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// A token is usable strictly before its expiry instant
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left until expiry, zero once stale
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Portal login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Portal login response.
/// Everything besides the token and its lifetime is kept as-is so it can be persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk token record
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedRecord {
    pub access_token: String,
    #[serde(with = "unix_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `expiresAt` is written as whole UNIX seconds.
/// Fractional values from older tooling are accepted and truncated.
mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(at.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = serde_json::Number::deserialize(deserializer)?;
        let secs = match raw.as_i64() {
            Some(secs) => secs,
            None => raw
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| D::Error::custom(format!("invalid expiresAt: {}", raw)))?,
        };
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| D::Error::custom(format!("expiresAt out of range: {}", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_freshness_boundary_is_stale() {
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };
        assert!(token.is_fresh(at(1_699_999_999)));
        assert!(!token.is_fresh(at(1_700_000_000)));
        assert!(!token.is_fresh(at(1_700_000_001)));
    }

    #[test]
    fn test_remaining_clamps_to_zero() {
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };
        assert_eq!(token.remaining(at(1_699_999_400)), Duration::seconds(600));
        assert_eq!(token.remaining(at(1_700_000_500)), Duration::zero());
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let credential = Credential::new("analyst", "hunter2");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("analyst"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(credential.secret(), "hunter2");
    }

    #[test]
    fn test_login_response_keeps_unknown_fields() {
        let body = json!({
            "accessToken": "abc123",
            "expiresIn": 3600,
            "refreshToken": "r-1",
            "userName": "analyst"
        });
        let response: LoginResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.access_token, "abc123");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.extra.len(), 2);
        assert_eq!(response.extra["refreshToken"], "r-1");
    }

    #[test]
    fn test_record_accepts_fractional_expiry() {
        let record: PersistedRecord = serde_json::from_value(json!({
            "accessToken": "abc",
            "expiresAt": 1_700_000_000.75_f64
        }))
        .unwrap();
        assert_eq!(record.expires_at, at(1_700_000_000));
    }

    #[test]
    fn test_record_rejects_missing_or_mistyped_fields() {
        assert!(serde_json::from_value::<PersistedRecord>(json!({ "accessToken": "abc" })).is_err());
        assert!(serde_json::from_value::<PersistedRecord>(json!({
            "accessToken": "abc",
            "expiresAt": "tomorrow"
        }))
        .is_err());
        assert!(serde_json::from_value::<PersistedRecord>(json!({ "expiresAt": 1 })).is_err());
    }

    #[test]
    fn test_record_serializes_whole_seconds() {
        let record = PersistedRecord {
            access_token: "abc".to_string(),
            expires_at: at(1_700_003_600),
            extra: Map::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({ "accessToken": "abc", "expiresAt": 1_700_003_600 }));
    }
}
