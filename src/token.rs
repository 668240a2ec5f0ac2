//! Vendor access-token cache.
//!
//! The speech endpoints authenticate with a short-lived service token rather
//! than per-request signing. Tokens are issued by a metadata endpoint and
//! carry an absolute expiry, so the gateway keeps a single cached token and
//! reuses it until it is within [`SAFETY_MARGIN_MS`] of expiring.
//!
//! The cache is one slot behind an async `RwLock`. Concurrent callers that
//! both observe a stale slot will both contact the issuer and the last writer
//! wins; the vendor tolerates redundant issuance, so the slot does not
//! coalesce in-flight requests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::GatewayError;

/// A token within this many milliseconds of expiry is treated as stale.
pub const SAFETY_MARGIN_MS: i64 = 60_000;

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Epoch-millisecond clock. Injectable so tests can pin and advance time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ─── Issuer ──────────────────────────────────────────────────────────────────

/// A freshly issued vendor token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at_ms: i64,
}

/// Source of fresh tokens. The production implementation talks to the
/// vendor's metadata endpoint; tests substitute a scripted issuer.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<IssuedToken, GatewayError>;
}

/// Issues tokens from the vendor's token metadata endpoint.
///
/// The endpoint takes the access key pair as a JSON body and answers with
/// `{"Token": {"Id": ..., "ExpireTime": ...}}` where `ExpireTime` is epoch
/// seconds.
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    access_key_secret: String,
}

impl HttpTokenIssuer {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self) -> Result<IssuedToken, GatewayError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "AccessKeyId": self.access_key_id,
                "AccessKeySecret": self.access_key_secret,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::AuthToken(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        decode_token_payload(&body)
    }
}

#[derive(Deserialize)]
struct TokenEnvelope {
    #[serde(rename = "Token")]
    token: Option<TokenBody>,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "ExpireTime")]
    expire_time: Option<i64>,
}

/// Decode the issuer response, rejecting any payload that lacks the token id
/// or expiry instead of caching a half-formed token.
fn decode_token_payload(body: &str) -> Result<IssuedToken, GatewayError> {
    let envelope: TokenEnvelope = serde_json::from_str(body)
        .map_err(|e| GatewayError::AuthToken(format!("token payload is not valid JSON: {e}")))?;

    let token = envelope
        .token
        .ok_or_else(|| GatewayError::AuthToken("token payload missing Token object".to_string()))?;
    let value = token
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GatewayError::AuthToken("token payload missing Token.Id".to_string()))?;
    let expire_time = token.expire_time.ok_or_else(|| {
        GatewayError::AuthToken("token payload missing Token.ExpireTime".to_string())
    })?;

    Ok(IssuedToken {
        value,
        // ExpireTime arrives as epoch seconds.
        expires_at_ms: expire_time * 1000,
    })
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Single-slot token cache with a freshness margin.
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<IssuedToken>>,
}

impl TokenCache {
    pub fn new(issuer: Arc<dyn TokenIssuer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer,
            clock,
            slot: RwLock::new(None),
        }
    }

    /// Return a token valid for at least the safety margin, issuing a fresh
    /// one when the slot is empty or stale. Issue failures leave the slot
    /// untouched, so the next call retries.
    pub async fn get(&self) -> Result<String, GatewayError> {
        if let Some(value) = self.fresh_from_slot().await {
            debug!("reusing cached vendor token");
            return Ok(value);
        }

        let issued = self.issuer.issue().await?;
        let expires_in_s = (issued.expires_at_ms - self.clock.now_ms()) / 1000;
        info!(expires_in_s, "vendor token refreshed");

        let value = issued.value.clone();
        let mut slot = self.slot.write().await;
        *slot = Some(issued);
        Ok(value)
    }

    /// Drop the cached token. The next `get` re-issues.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    async fn fresh_from_slot(&self) -> Option<String> {
        let slot = self.slot.read().await;
        let token = slot.as_ref()?;
        // Strictly more than the margin left on the clock, otherwise stale.
        if token.expires_at_ms - SAFETY_MARGIN_MS > self.clock.now_ms() {
            Some(token.value.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeClock {
        now_ms: AtomicI64,
    }

    impl FakeClock {
        fn at(now_ms: i64) -> Arc<Self> {
            Arc::new(Self {
                now_ms: AtomicI64::new(now_ms),
            })
        }

        fn advance(&self, delta_ms: i64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }

    /// Replays a scripted sequence of issuer outcomes and counts calls.
    struct ScriptedIssuer {
        calls: AtomicU32,
        script: Mutex<VecDeque<Result<IssuedToken, String>>>,
    }

    impl ScriptedIssuer {
        fn new(script: Vec<Result<IssuedToken, String>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenIssuer for ScriptedIssuer {
        async fn issue(&self) -> Result<IssuedToken, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("issuer script exhausted");
            next.map_err(GatewayError::AuthToken)
        }
    }

    fn token(value: &str, expires_at_ms: i64) -> IssuedToken {
        IssuedToken {
            value: value.to_string(),
            expires_at_ms,
        }
    }

    #[tokio::test]
    async fn first_get_issues_then_reuses() {
        let clock = FakeClock::at(1_000_000);
        let issuer = ScriptedIssuer::new(vec![Ok(token("tok-1", 1_000_000 + 3_600_000))]);
        let cache = TokenCache::new(issuer.clone(), clock);

        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(issuer.calls(), 1, "second get must hit the cache");
    }

    #[tokio::test]
    async fn stale_token_is_replaced() {
        let clock = FakeClock::at(0);
        let issuer = ScriptedIssuer::new(vec![
            Ok(token("tok-1", 3_600_000)),
            Ok(token("tok-2", 7_200_000)),
        ]);
        let cache = TokenCache::new(issuer.clone(), clock.clone());

        assert_eq!(cache.get().await.unwrap(), "tok-1");
        // Move inside the safety margin: 59s of validity left.
        clock.advance(3_600_000 - 59_000);
        assert_eq!(cache.get().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn exactly_margin_left_counts_as_stale() {
        let clock = FakeClock::at(0);
        let issuer = ScriptedIssuer::new(vec![
            Ok(token("tok-1", 3_600_000)),
            Ok(token("tok-2", 7_200_000)),
        ]);
        let cache = TokenCache::new(issuer.clone(), clock.clone());

        cache.get().await.unwrap();
        // Exactly 60s of validity left. The freshness check is strict.
        clock.advance(3_600_000 - SAFETY_MARGIN_MS);
        assert_eq!(cache.get().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn failed_issue_caches_nothing() {
        let clock = FakeClock::at(0);
        let issuer = ScriptedIssuer::new(vec![
            Err("issuer down".to_string()),
            Ok(token("tok-1", 3_600_000)),
        ]);
        let cache = TokenCache::new(issuer.clone(), clock);

        assert!(cache.get().await.is_err());
        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(issuer.calls(), 2, "failure must not populate the slot");
    }

    #[tokio::test]
    async fn invalidate_forces_reissue() {
        let clock = FakeClock::at(0);
        let issuer = ScriptedIssuer::new(vec![
            Ok(token("tok-1", 3_600_000)),
            Ok(token("tok-2", 3_600_000)),
        ]);
        let cache = TokenCache::new(issuer.clone(), clock);

        cache.get().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap(), "tok-2");
        assert_eq!(issuer.calls(), 2);
    }

    #[test]
    fn decode_converts_expiry_seconds_to_millis() {
        let body = r#"{"Token":{"Id":"abc123","ExpireTime":1700000000}}"#;
        let issued = decode_token_payload(body).unwrap();
        assert_eq!(issued.value, "abc123");
        assert_eq!(issued.expires_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn decode_rejects_missing_pieces() {
        for (body, missing) in [
            (r#"{}"#, "Token"),
            (r#"{"Token":{}}"#, "Id"),
            (r#"{"Token":{"Id":""}}"#, "Id"),
            (r#"{"Token":{"Id":"abc"}}"#, "ExpireTime"),
            (r#"{"Token":{"ExpireTime":1700000000}}"#, "Id"),
        ] {
            let err = decode_token_payload(body).unwrap_err();
            assert!(
                matches!(err, GatewayError::AuthToken(_)),
                "{body} should fail as a token error: {err}"
            );
            let msg = err.to_string();
            assert!(msg.contains(missing), "{body} should report {missing}: {msg}");
        }
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_token_payload("<html>gateway error</html>").unwrap_err();
        assert!(matches!(err, GatewayError::AuthToken(_)));
    }
}
