use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use super::claims::IdentityClaims;
use super::jwks::{KeyLookupError, KeySetCache};
use crate::config::OidcConfig;
use crate::error::{RegistryError, RegistryResult};

/// Header parameters that would let a token pick its own verification key.
const KEY_EMBEDDING_HEADERS: &[&str] = &["jku", "jwk", "x5u", "x5c"];

/// Validates CI identity tokens against the provider's key set.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(
        keys: Arc<KeySetCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs: 30,
        }
    }

    /// Build the verifier and its key cache from configuration.
    pub fn from_config(config: &OidcConfig) -> RegistryResult<Self> {
        let keys = KeySetCache::new(config.jwks_url.clone(), config.http_timeout)
            .map_err(|e| RegistryError::KeySetUnavailable {
                message: e.to_string(),
            })?
            .with_ttl(config.key_set_ttl)
            .with_refresh_cooldown(config.refresh_cooldown);

        Ok(Self::new(Arc::new(keys), &config.issuer, &config.audience)
            .with_leeway(config.clock_skew_leeway.as_secs()))
    }

    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Verify a raw token and return its claims.
    ///
    /// Cheap structural checks run before the key lookup so unverifiable
    /// input never triggers a key set fetch.
    pub async fn verify(&self, raw_token: &str) -> RegistryResult<IdentityClaims> {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(RegistryError::invalid_token("missing oidc token"));
        }

        check_header_parameters(token)?;

        let header = decode_header(token)
            .map_err(|e| RegistryError::invalid_token(format!("malformed header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(RegistryError::invalid_token(format!(
                "algorithm {:?} not allowed (only RS256)",
                header.alg
            )));
        }

        let kid = match header.kid.as_deref().map(str::trim) {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => return Err(RegistryError::invalid_token("missing kid")),
        };

        let key = self.keys.get(&kid).await.map_err(|e| match e {
            KeyLookupError::NotFound { kid } => {
                RegistryError::invalid_token(format!("unknown kid: {kid}"))
            }
            KeyLookupError::Unavailable { message } => RegistryError::KeySetUnavailable { message },
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let claims = decode::<IdentityClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| RegistryError::invalid_token(format!("validation failed: {e}")))?
            .claims;

        let missing = claims.missing_required();
        if !missing.is_empty() {
            return Err(RegistryError::invalid_token(format!(
                "missing required oidc claims: {}",
                missing.join(", ")
            )));
        }

        debug!(
            event = "oidc_token_verified",
            repository = %claims.repository,
            git_ref = %claims.git_ref,
            kid = %kid
        );
        Ok(claims)
    }
}

/// Reject critical extensions and key-embedding header parameters.
fn check_header_parameters(token: &str) -> RegistryResult<()> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, _, _] = parts.as_slice() else {
        return Err(RegistryError::invalid_token("invalid JWT format"));
    };

    let header_json = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| RegistryError::invalid_token(format!("failed to decode header: {e}")))?;
    let header_value: serde_json::Value = serde_json::from_slice(&header_json)
        .map_err(|e| RegistryError::invalid_token(format!("failed to parse header: {e}")))?;

    let Some(obj) = header_value.as_object() else {
        return Err(RegistryError::invalid_token("header is not an object"));
    };
    if obj.contains_key("crit") {
        return Err(RegistryError::invalid_token(
            "token contains critical extensions which are not understood",
        ));
    }
    if KEY_EMBEDDING_HEADERS.iter().any(|h| obj.contains_key(*h)) {
        return Err(RegistryError::invalid_token(
            "token contains dangerous headers (jku, jwk, x5u, x5c)",
        ));
    }
    Ok(())
}
