//! Firebase ID token verification.
//!
//! Firebase ID tokens are RS256 JWTs signed by one of Google's rotating
//! `securetoken` keys. The public keys are published as a JWKS document whose
//! `Cache-Control: max-age` says how long they may be cached.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;

use crate::errors::{FirebaseError, Result};
use crate::models::IdTokenClaims;

pub const SECURE_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const DEFAULT_KEY_TTL_SECS: i64 = 3600;
const CLOCK_SKEW_SECS: u64 = 60;
const MAX_UID_LEN: usize = 128;
/// Minimum spacing between refetches triggered by an unknown `kid`
const MIN_REFETCH_INTERVAL_SECS: i64 = 60;

struct CachedKeys {
    set: JwkSet,
    expires_at: i64,
    fetched_at: i64,
}

impl CachedKeys {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at > now
    }

    /// Whether an unknown kid may trigger a refetch (possible key rotation)
    fn may_refetch(&self, now: i64) -> bool {
        now - self.fetched_at >= MIN_REFETCH_INTERVAL_SECS
    }
}

/// Verifies Firebase ID tokens for one project
pub struct IdTokenVerifier {
    project_id: String,
    jwks_url: String,
    http_client: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
    pinned: bool,
}

impl IdTokenVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            jwks_url: SECURE_TOKEN_JWKS_URL.to_string(),
            http_client: reqwest::Client::new(),
            keys: RwLock::new(None),
            pinned: false,
        }
    }

    /// Verifier that only trusts `keys` and never fetches
    pub fn with_keys(project_id: impl Into<String>, keys: JwkSet) -> Self {
        Self {
            keys: RwLock::new(Some(CachedKeys {
                set: keys,
                expires_at: i64::MAX,
                fetched_at: i64::MAX,
            })),
            pinned: true,
            ..Self::new(project_id)
        }
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    /// Verify `token` and return its claims.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims> {
        let header =
            decode_header(token).map_err(|e| FirebaseError::MalformedIdToken(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(FirebaseError::RejectedIdToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| FirebaseError::MalformedIdToken("missing kid header".to_string()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        if claims.sub.is_empty() || claims.sub.len() > MAX_UID_LEN {
            return Err(FirebaseError::RejectedIdToken(
                "subject must be a non-empty string of at most 128 characters".to_string(),
            ));
        }
        if claims.iat > Utc::now().timestamp() + CLOCK_SKEW_SECS as i64 {
            return Err(FirebaseError::RejectedIdToken(
                "token issued in the future".to_string(),
            ));
        }

        Ok(claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref() {
                if let Some(key) = self.lookup(cached, kid)? {
                    return Ok(key);
                }
            }
        }

        // Fetches are serialized behind the write lock; re-check what a
        // concurrent caller may already have loaded.
        let mut cache = self.keys.write().await;
        if let Some(cached) = cache.as_ref() {
            if let Some(key) = self.lookup(cached, kid)? {
                return Ok(key);
            }
        }

        let cached = cache.insert(self.fetch_keys().await?);
        match cached.set.find(kid) {
            Some(jwk) => key_from_jwk(jwk),
            None => Err(unknown_kid(kid)),
        }
    }

    /// Resolve `kid` from cached keys. `Ok(None)` means a fetch is needed:
    /// the cache has expired, or the kid is unknown and the last fetch is
    /// old enough that the keys may have rotated.
    fn lookup(&self, cached: &CachedKeys, kid: &str) -> Result<Option<DecodingKey>> {
        let now = Utc::now().timestamp();
        let fresh = self.pinned || cached.is_fresh(now);
        match cached.set.find(kid) {
            Some(jwk) if fresh => key_from_jwk(jwk).map(Some),
            Some(_) => Ok(None),
            None if self.pinned || (fresh && !cached.may_refetch(now)) => Err(unknown_kid(kid)),
            None => Ok(None),
        }
    }

    async fn fetch_keys(&self) -> Result<CachedKeys> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| FirebaseError::KeyFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FirebaseError::KeyFetchError(format!(
                "status {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .unwrap_or(DEFAULT_KEY_TTL_SECS);

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| FirebaseError::KeyFetchError(e.to_string()))?;

        tracing::debug!(keys = set.keys.len(), ttl, "Refreshed securetoken signing keys");

        let now = Utc::now().timestamp();
        Ok(CachedKeys {
            set,
            expires_at: now + ttl,
            fetched_at: now,
        })
    }
}

fn unknown_kid(kid: &str) -> FirebaseError {
    FirebaseError::RejectedIdToken(format!("unknown key id {}", kid))
}

fn key_from_jwk(jwk: &jsonwebtoken::jwk::Jwk) -> Result<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| FirebaseError::KeyParseError(e.to_string()))
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> FirebaseError {
    match err.kind() {
        ErrorKind::ExpiredSignature => FirebaseError::ExpiredIdToken,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            FirebaseError::MalformedIdToken(err.to_string())
        }
        _ => FirebaseError::RejectedIdToken(err.to_string()),
    }
}

/// Parse `max-age` out of a Cache-Control header value.
fn max_age(header: &str) -> Option<i64> {
    header
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|v| v.parse().ok())
}
