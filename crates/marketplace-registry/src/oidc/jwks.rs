//! Cached signing keys of the identity provider.
//!
//! The whole key set is fetched at once and replaced wholesale. One async
//! mutex covers check-expiry → fetch → replace, so only one refresh is in
//! flight and readers never see a half-updated mapping. Callers queued
//! behind a refresh adopt its outcome instead of fetching again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upper bound on a key set document.
const MAX_JWKS_BYTES: usize = 512 * 1024;

/// RSA verification key identified by `kid`.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: DecodingKey,
}

impl SigningKey {
    /// Build from base64url-encoded modulus and exponent.
    ///
    /// Returns `None` for undecodable components or a zero exponent.
    pub fn from_components(kid: &str, n: &str, e: &str) -> Option<Self> {
        let modulus = URL_SAFE_NO_PAD.decode(n.trim_end_matches('=')).ok()?;
        let exponent = URL_SAFE_NO_PAD.decode(e.trim_end_matches('=')).ok()?;
        if modulus.is_empty() || exponent.iter().all(|b| *b == 0) {
            return None;
        }
        Some(Self {
            kid: kid.to_string(),
            key: DecodingKey::from_rsa_raw_components(&modulus, &exponent),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// Key lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyLookupError {
    /// The key set does not contain the requested `kid`.
    #[error("unknown kid: {kid}")]
    NotFound { kid: String },

    /// The key set could not be fetched.
    #[error("key set unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    #[serde(default)]
    keys: Vec<Jwk>,
}

#[derive(Debug, Default)]
struct KeySetState {
    keys: HashMap<String, Arc<SigningKey>>,

    /// `None` until the first successful fetch.
    expires_at: Option<Instant>,

    /// Start of the most recent fetch attempt.
    last_attempt: Option<Instant>,

    /// Error of the most recent attempt, cleared on success.
    last_error: Option<String>,
}

/// Time-bounded cache of the identity provider's key set.
///
/// Construct one per verifier and share it behind an `Arc`.
#[derive(Debug)]
pub struct KeySetCache {
    client: Client,
    jwks_url: String,
    ttl: Duration,
    refresh_cooldown: Duration,

    /// Completed fetch attempts; lets queued callers detect that a
    /// refresh finished while they waited.
    attempts: AtomicU64,

    state: Mutex<KeySetState>,
}

impl KeySetCache {
    /// Create a cache for the key set at `jwks_url`.
    pub fn new(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self, KeyLookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("marketplace-registry/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| KeyLookupError::Unavailable {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            client,
            jwks_url: jwks_url.into(),
            ttl: Duration::from_secs(30 * 60),
            refresh_cooldown: Duration::from_secs(30),
            attempts: AtomicU64::new(0),
            state: Mutex::new(KeySetState::default()),
        })
    }

    /// Lifetime of a fetched key set (default 30 minutes).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Minimum spacing of refreshes caused by unknown key ids (default 30s).
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Look up a key, refreshing the set on expiry or miss.
    pub async fn get(&self, kid: &str) -> Result<Arc<SigningKey>, KeyLookupError> {
        let observed = self.attempts.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let fresh = state.expires_at.is_some_and(|at| now < at);

        // Fast path: unexpired set holds the key.
        if fresh {
            if let Some(key) = state.keys.get(kid) {
                return Ok(Arc::clone(key));
            }
        }

        // Someone else refreshed while we queued on the lock: share the outcome.
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(message) = &state.last_error {
                return Err(KeyLookupError::Unavailable {
                    message: message.clone(),
                });
            }
            if fresh {
                return Err(not_found(kid));
            }
        }

        if fresh
            && state
                .last_attempt
                .is_some_and(|at| now.duration_since(at) < self.refresh_cooldown)
        {
            debug!(event = "jwks_miss_cooldown", kid = %kid);
            return Err(not_found(kid));
        }

        state.last_attempt = Some(now);
        let outcome = self.fetch().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(keys) => {
                info!(event = "jwks_refreshed", keys = keys.len());
                state.keys = keys;
                state.expires_at = Some(Instant::now() + self.ttl);
                state.last_error = None;
                state.keys.get(kid).cloned().ok_or_else(|| not_found(kid))
            }
            Err(message) => {
                // Keep the previous mapping; it stays usable until it expires.
                warn!(event = "jwks_refresh_failed", uri = %self.jwks_url, error = %message);
                state.last_error = Some(message.clone());
                Err(KeyLookupError::Unavailable { message })
            }
        }
    }

    async fn fetch(&self) -> Result<HashMap<String, Arc<SigningKey>>, String> {
        info!(event = "jwks_refresh", uri = %self.jwks_url);

        let resp = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| format!("jwks fetch failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("jwks fetch failed: HTTP {}", resp.status().as_u16()));
        }

        if let Some(len) = resp.content_length() {
            if len > MAX_JWKS_BYTES as u64 {
                return Err(format!("jwks response too large: {len} bytes"));
            }
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| format!("failed to read jwks body: {e}"))?;
        if body.len() > MAX_JWKS_BYTES {
            return Err(format!("jwks response too large: {} bytes", body.len()));
        }

        parse_key_set(&body)
    }
}

/// Parse a JWKS document, skipping entries that cannot be used.
fn parse_key_set(body: &[u8]) -> Result<HashMap<String, Arc<SigningKey>>, String> {
    let jwks: JwksResponse =
        serde_json::from_slice(body).map_err(|e| format!("failed to parse jwks: {e}"))?;

    let mut keys = HashMap::new();
    for jwk in jwks.keys {
        if jwk.kty.as_deref().is_some_and(|kty| kty != "RSA") {
            continue;
        }
        let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
            continue;
        };
        if kid.is_empty() {
            continue;
        }
        match SigningKey::from_components(&kid, &n, &e) {
            Some(key) => {
                keys.insert(kid, Arc::new(key));
            }
            None => debug!(event = "jwks_key_skipped", kid = %kid),
        }
    }

    if keys.is_empty() {
        return Err("no jwks keys found".to_string());
    }
    Ok(keys)
}

fn not_found(kid: &str) -> KeyLookupError {
    KeyLookupError::NotFound {
        kid: kid.to_string(),
    }
}
