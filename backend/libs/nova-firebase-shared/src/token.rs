use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::errors::{FirebaseError, Result};
use crate::models::*;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Tokens are refreshed once fewer than this many seconds remain.
const REFRESH_MARGIN_SECS: i64 = 60;

/// OAuth2 access token source for a Google service account
///
/// Signs a jwt-bearer assertion with the service account key, exchanges it
/// at the token endpoint, and caches the result until shortly before expiry.
#[derive(Clone)]
pub struct AccessTokenProvider {
    credentials: Arc<ServiceAccountKey>,
    scope: String,
    token_cache: Arc<Mutex<Option<TokenCache>>>,
    http_client: reqwest::Client,
}

impl AccessTokenProvider {
    pub fn new(credentials: ServiceAccountKey) -> Self {
        Self::with_client(credentials, reqwest::Client::new())
    }

    pub fn with_client(credentials: ServiceAccountKey, http_client: reqwest::Client) -> Self {
        Self {
            credentials: Arc::new(credentials),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            token_cache: Arc::new(Mutex::new(None)),
            http_client,
        }
    }

    pub fn credentials(&self) -> &ServiceAccountKey {
        &self.credentials
    }

    fn cached_token(&self) -> Option<String> {
        let cache = self.token_cache.lock();
        cache
            .as_ref()
            .filter(|cached| cached.expires_at > Utc::now().timestamp() + REFRESH_MARGIN_SECS)
            .map(|cached| cached.access_token.clone())
    }

    /// Build the signed assertion sent to the token endpoint.
    pub fn signed_assertion(&self) -> Result<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.credentials.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| FirebaseError::KeyParseError(e.to_string()))?;

        let mut header = Header::new(Algorithm::RS256);
        if !self.credentials.private_key_id.is_empty() {
            header.kid = Some(self.credentials.private_key_id.clone());
        }

        encode(&header, &claims, &encoding_key)
            .map_err(|e| FirebaseError::JwtEncodeError(e.to_string()))
    }

    /// Get access token from service account (with caching)
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let assertion = self.signed_assertion()?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| FirebaseError::TokenError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FirebaseError::TokenRequestFailed(
                response.status().to_string(),
            ));
        }

        let token_response: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| FirebaseError::TokenError(e.to_string()))?;

        let expires_at = Utc::now().timestamp() + token_response.expires_in;
        *self.token_cache.lock() = Some(TokenCache {
            access_token: token_response.access_token.clone(),
            expires_at,
        });

        tracing::debug!(
            client_email = %self.credentials.client_email,
            expires_in = token_response.expires_in,
            "Obtained Google access token"
        );

        Ok(token_response.access_token)
    }
}
