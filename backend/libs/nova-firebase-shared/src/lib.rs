/// Nova Firebase Shared Library
///
/// Server-side Firebase plumbing used by the notification feed:
/// - Service account credentials (base64 blob decoding, on-disk materialization)
/// - OAuth2 access tokens using Google service accounts, cached until expiry
/// - Firestore REST reads with typed-value decoding into plain JSON
/// - Firebase ID token verification against Google's securetoken keys

pub mod credentials;
pub mod errors;
pub mod firestore;
pub mod id_token;
pub mod models;
pub mod token;

pub use credentials::{decode_service_account, materialize_service_account};
pub use errors::{FirebaseError, Result};
pub use firestore::FirestoreClient;
pub use id_token::IdTokenVerifier;
pub use models::{IdTokenClaims, ServiceAccountKey};
pub use token::AccessTokenProvider;
