use serde::{Deserialize, Serialize};

/// A notification as stored in the notifications collection.
///
/// The feed never inspects records; they are passed through as JSON.
pub type NotificationRecord = serde_json::Value;

/// Full contents of the notifications collection at one instant.
///
/// Every push carries a complete snapshot, never a delta, so a client can
/// always replace its view with the newest one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub notifications: Vec<NotificationRecord>,
}

impl Snapshot {
    pub fn new(notifications: Vec<NotificationRecord>) -> Self {
        Self { notifications }
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Wire form: `{"notifications":[...]}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Subject returned by the identity provider for a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
}

/// POST /auth request body
#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub token: String,
}

/// POST /auth response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResponse {
    pub fn verified(identity: VerifiedIdentity) -> Self {
        Self {
            success: true,
            uid: Some(identity.uid),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            uid: None,
            error: Some(error.into()),
        }
    }
}

/// Error body used by the snapshot query path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_wire_format() {
        let snapshot = Snapshot::new(vec![json!({"id": "a"})]);
        assert_eq!(snapshot.to_json().unwrap(), r#"{"notifications":[{"id":"a"}]}"#);
    }

    #[test]
    fn test_empty_snapshot_wire_format() {
        assert_eq!(Snapshot::default().to_json().unwrap(), r#"{"notifications":[]}"#);
    }

    #[test]
    fn test_auth_response_shapes() {
        let ok = serde_json::to_value(AuthResponse::verified(VerifiedIdentity {
            uid: "u1".to_string(),
        }))
        .unwrap();
        assert_eq!(ok, json!({"success": true, "uid": "u1"}));

        let rejected = serde_json::to_value(AuthResponse::rejected("bad token")).unwrap();
        assert_eq!(rejected, json!({"success": false, "error": "bad token"}));
    }

    #[test]
    fn test_auth_request_without_token_field() {
        let req: AuthRequest = serde_json::from_str("{}").unwrap();
        assert!(req.token.is_empty());
    }
}
