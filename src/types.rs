//! Wire-facing types shared by the client and the pipeline.

use serde_json::Value;

/// A successfully acquired bearer token plus the response it came from.
///
/// Exactly one of these is obtained per batch run and reused for every row.
#[derive(Debug, Clone)]
pub struct TokenResult {
    /// Non-blank bearer token string.
    pub token: String,
    /// Full token-endpoint response body, kept for diagnostics.
    pub raw: Value,
}

/// One question submission to the message endpoint.
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub message: String,
    pub product: String,
    pub version: String,
    pub app_id: i64,
    pub session_id: Option<String>,
}

impl MessageRequest {
    /// Form body sent to the message endpoint; version and app_id are
    /// stringified, session_id only present when set.
    pub fn form_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("message", self.message.clone()),
            ("product", self.product.clone()),
            ("version", self.version.clone()),
            ("app_id", self.app_id.to_string()),
        ];
        if let Some(session_id) = &self.session_id {
            pairs.push(("session_id", session_id.clone()));
        }
        pairs
    }
}

/// Raw message-endpoint reply. The client passes status and body through
/// untouched; interpretation happens in the pipeline.
#[derive(Debug, Clone)]
pub struct MessageResponse {
    pub status: u16,
    pub text: String,
}

impl MessageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON, or the raw text wrapped as `{"message": text}` when the
    /// endpoint answers with something that is not JSON.
    pub fn body_json(&self) -> Value {
        serde_json::from_str(&self.text)
            .unwrap_or_else(|_| serde_json::json!({ "message": self.text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_pairs_stringify_and_keep_session_optional() {
        let mut req = MessageRequest {
            message: "q".to_string(),
            product: "NX".to_string(),
            version: "2306".to_string(),
            app_id: 42,
            session_id: None,
        };
        let pairs = req.form_pairs();
        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&("app_id", "42".to_string())));

        req.session_id = Some("abc".to_string());
        assert!(req.form_pairs().contains(&("session_id", "abc".to_string())));
    }

    #[test]
    fn non_json_body_wraps_as_message() {
        let resp = MessageResponse {
            status: 200,
            text: "plain answer".to_string(),
        };
        assert_eq!(resp.body_json()["message"], "plain answer");
    }
}
