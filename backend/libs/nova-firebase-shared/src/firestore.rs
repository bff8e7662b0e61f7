//! Minimal Firestore REST client.
//!
//! Only what the notification feed needs: list every document of a
//! collection and turn Firestore's typed value encoding into plain JSON.

use serde_json::{Map, Value};

use crate::errors::{FirebaseError, Result};
use crate::models::*;
use crate::token::AccessTokenProvider;

pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATABASE: &str = "(default)";
const PAGE_SIZE: u32 = 300;

/// Firestore client
pub struct FirestoreClient {
    project_id: String,
    database_id: String,
    base_url: String,
    tokens: AccessTokenProvider,
    http_client: reqwest::Client,
}

impl FirestoreClient {
    /// Create a client for the project named in the service account key
    pub fn new(credentials: ServiceAccountKey) -> Self {
        let http_client = reqwest::Client::new();
        Self {
            project_id: credentials.project_id.clone(),
            database_id: DEFAULT_DATABASE.to_string(),
            base_url: FIRESTORE_BASE_URL.to_string(),
            tokens: AccessTokenProvider::with_client(credentials, http_client.clone()),
            http_client,
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.base_url, self.project_id, self.database_id, collection
        )
    }

    /// Fetch every document of `collection`, in Firestore's document order,
    /// as plain JSON objects.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Value>> {
        let url = self.collection_url(collection);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let access_token = self.tokens.get_access_token().await?;

            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| FirebaseError::FirestoreRequest(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let detail = match response.json::<GoogleErrorResponse>().await {
                    Ok(body) => body
                        .error
                        .message
                        .or(body.error.status)
                        .unwrap_or_else(|| "Unknown error".to_string()),
                    Err(_) => "Unknown error".to_string(),
                };
                return Err(FirebaseError::ApiError(status.to_string(), detail));
            }

            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(|e| FirebaseError::ResponseParseError(e.to_string()))?;

            records.extend(page.documents.iter().map(|doc| decode_fields(&doc.fields)));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::trace!(collection, count = records.len(), "Listed Firestore documents");
        Ok(records)
    }
}

/// Decode a document's `fields` map into a JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), decode_value(value)))
            .collect(),
    )
}

/// Decode one Firestore `Value` (`{"stringValue": "..."}` etc).
///
/// Timestamps, references and bytes stay strings; integers (sent as strings
/// on the wire) become JSON numbers.
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new())),
        _ => inner.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_value(&json!({"stringValue": "hi"})), json!("hi"));
        assert_eq!(decode_value(&json!({"booleanValue": true})), json!(true));
        assert_eq!(decode_value(&json!({"integerValue": "42"})), json!(42));
        assert_eq!(decode_value(&json!({"doubleValue": 1.5})), json!(1.5));
        assert_eq!(decode_value(&json!({"nullValue": null})), Value::Null);
        assert_eq!(
            decode_value(&json!({"timestampValue": "2024-01-01T00:00:00Z"})),
            json!("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_decode_nested_document() {
        let fields = json!({
            "id": {"stringValue": "a"},
            "tags": {"arrayValue": {"values": [
                {"stringValue": "x"},
                {"integerValue": "7"}
            ]}},
            "meta": {"mapValue": {"fields": {
                "seen": {"booleanValue": false},
                "where": {"geoPointValue": {"latitude": 1.0, "longitude": 2.0}}
            }}}
        });

        let decoded = decode_fields(fields.as_object().unwrap());
        assert_eq!(
            decoded,
            json!({
                "id": "a",
                "tags": ["x", 7],
                "meta": {"seen": false, "where": {"latitude": 1.0, "longitude": 2.0}}
            })
        );
    }

    #[test]
    fn test_decode_empty_containers() {
        assert_eq!(decode_value(&json!({"arrayValue": {}})), json!([]));
        assert_eq!(decode_value(&json!({"mapValue": {}})), json!({}));
        assert_eq!(decode_value(&json!({})), Value::Null);
    }

    #[test]
    fn test_list_response_without_documents() {
        let page: ListDocumentsResponse = serde_json::from_str("{}").unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_collection_url() {
        let creds = ServiceAccountKey {
            project_id: "demo".to_string(),
            private_key_id: String::new(),
            private_key: "k".to_string(),
            client_email: "e@demo.iam.gserviceaccount.com".to_string(),
            client_id: String::new(),
            auth_uri: String::new(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        let client = FirestoreClient::new(creds).with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            client.collection_url("notifications"),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/notifications"
        );
    }
}
