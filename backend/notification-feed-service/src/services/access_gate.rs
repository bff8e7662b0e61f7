use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, HttpRequest};
use async_trait::async_trait;
use nova_firebase_shared::IdTokenVerifier;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AuthError;
use crate::models::VerifiedIdentity;

/// Identity provider boundary
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

/// Firebase ID token verification via Google's published signing keys
pub struct FirebaseIdentityVerifier {
    inner: IdTokenVerifier,
}

impl FirebaseIdentityVerifier {
    pub fn new(inner: IdTokenVerifier) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let claims = self.inner.verify(token).await?;
        Ok(VerifiedIdentity {
            uid: claims.uid().to_string(),
        })
    }
}

/// Validates client-presented tokens before any protected work happens
#[derive(Clone)]
pub struct AccessGate {
    verifier: Arc<dyn IdentityVerifier>,
}

impl AccessGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { verifier }
    }

    /// Verify a token. An empty token is refused without calling the provider.
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        match self.verifier.verify(token).await {
            Ok(identity) => {
                tracing::debug!(uid = %identity.uid, "Token verified");
                Ok(identity)
            }
            Err(AuthError::ProviderUnavailable(reason)) => {
                tracing::warn!(%reason, "Identity provider unavailable");
                Err(AuthError::ProviderUnavailable(reason))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                Err(e)
            }
        }
    }

    /// Verify the token carried by an HTTP request
    pub async fn verify_request(&self, req: &HttpRequest) -> Result<VerifiedIdentity, AuthError> {
        let token = extract_token(req).ok_or(AuthError::MissingToken)?;
        self.verify_token(&token).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer <token>` or the `token` query parameter
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    from_header.or_else(|| {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().token)
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct CountingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityVerifier for CountingVerifier {
        async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match token {
                "good" => Ok(VerifiedIdentity {
                    uid: "user-1".to_string(),
                }),
                "expired" => Err(AuthError::Expired),
                "offline" => Err(AuthError::ProviderUnavailable("timeout".into())),
                _ => Err(AuthError::Rejected("signature".into())),
            }
        }
    }

    fn gate() -> (AccessGate, Arc<CountingVerifier>) {
        let verifier = Arc::new(CountingVerifier {
            calls: AtomicUsize::new(0),
        });
        (AccessGate::new(verifier.clone()), verifier)
    }

    #[tokio::test]
    async fn test_valid_token() {
        let (gate, _) = gate();
        let identity = assert_ok!(gate.verify_token("good").await);
        assert_eq!(identity.uid, "user-1");
    }

    #[tokio::test]
    async fn test_same_token_gives_same_uid() {
        let (gate, _) = gate();
        let first = gate.verify_token("good").await.unwrap();
        let second = gate.verify_token("good").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_token_skips_provider() {
        let (gate, verifier) = gate();
        assert_eq!(gate.verify_token("").await, Err(AuthError::MissingToken));
        assert_eq!(gate.verify_token("   ").await, Err(AuthError::MissingToken));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejections_are_passed_through() {
        let (gate, _) = gate();
        assert_eq!(gate.verify_token("expired").await, Err(AuthError::Expired));
        assert_err!(gate.verify_token("forged").await);
        assert!(matches!(
            gate.verify_token("offline").await,
            Err(AuthError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_request_without_token() {
        let (gate, verifier) = gate();
        let req = TestRequest::default().to_http_request();
        assert_eq!(gate.verify_request(&req).await, Err(AuthError::MissingToken));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_extract_token_from_bearer_header() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_token_from_query() {
        let req = TestRequest::with_uri("/feed?foo=1&token=abc").to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_token_percent_decodes_query() {
        let req = TestRequest::with_uri("/?token=abc%2Edef%2Eghi").to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_empty_query_token_is_absent() {
        let req = TestRequest::with_uri("/?token=").to_http_request();
        assert!(extract_token(&req).is_none());
    }

    #[test]
    fn test_header_takes_precedence_over_query() {
        let req = TestRequest::with_uri("/?token=from-query")
            .insert_header((AUTHORIZATION, "Bearer from-header"))
            .to_http_request();
        assert_eq!(extract_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_non_bearer_header_ignored() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(extract_token(&req).is_none());
    }
}
