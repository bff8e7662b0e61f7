//! Service account credential handling.
//!
//! Deployments ship the Firebase admin key as a base64 blob in the
//! environment. It is decoded, validated, and written to disk before any
//! Firebase client is constructed.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::errors::{FirebaseError, Result};
use crate::models::ServiceAccountKey;

/// Decode a base64 encoded service account JSON document.
///
/// Whitespace (including line breaks from `base64 -w 76`) is ignored.
pub fn decode_service_account(blob: &str) -> Result<(Vec<u8>, ServiceAccountKey)> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(FirebaseError::InvalidCredentials(
            "credential blob is empty".to_string(),
        ));
    }

    let raw = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FirebaseError::InvalidCredentials(format!("invalid base64: {}", e)))?;

    let key: ServiceAccountKey = serde_json::from_slice(&raw)
        .map_err(|e| FirebaseError::InvalidCredentials(format!("invalid key JSON: {}", e)))?;

    if key.project_id.trim().is_empty() {
        return Err(FirebaseError::InvalidCredentials(
            "project_id is empty".to_string(),
        ));
    }
    if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
        return Err(FirebaseError::InvalidCredentials(
            "client_email and private_key are required".to_string(),
        ));
    }

    Ok((raw, key))
}

/// Decode `blob` and write the key file to `path` (mode 0600 on unix).
pub async fn materialize_service_account(
    blob: &str,
    path: impl AsRef<Path>,
) -> Result<ServiceAccountKey> {
    let path = path.as_ref();
    let (raw, key) = decode_service_account(blob)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &raw).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tracing::info!(
        path = %path.display(),
        project_id = %key.project_id,
        "Service account credentials materialized"
    );

    Ok(key)
}
