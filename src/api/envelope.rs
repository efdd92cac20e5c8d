//! Response envelope handling

use serde::Deserialize;
use serde_json::Value;

/// The vendor's wrapper metadata, found under `request_info`
///
/// Every field is optional because the payload shape is not contractually
/// stable; a missing success flag counts as success.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub credits_remaining: Option<u64>,

    #[serde(default)]
    pub credits_used: Option<u64>,
}

impl Envelope {
    /// Reads the envelope from a response body
    pub fn from_body(body: &Value) -> Self {
        body.get("request_info")
            .cloned()
            .and_then(|info| serde_json::from_value(info).ok())
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }

    /// Returns the vendor message or a generic fallback
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown API error".to_string())
    }

    /// Returns true when remaining credits are known and below `threshold`
    pub fn is_low_on_credits(&self, threshold: u64) -> bool {
        self.credits_remaining.is_some_and(|c| c < threshold)
    }
}

/// A successful API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub envelope: Envelope,

    /// The full JSON body, envelope included
    pub body: Value,
}

impl ApiResponse {
    pub fn new(body: Value) -> Self {
        Self {
            envelope: Envelope::from_body(&body),
            body,
        }
    }

    /// Returns the `product` object of a detail response, if present
    pub fn product(&self) -> Option<&serde_json::Map<String, Value>> {
        self.body.get("product").and_then(Value::as_object)
    }

    /// Top-level keys of the body, for schema-mismatch logging
    pub fn keys(&self) -> Vec<String> {
        self.body
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_body() {
        let body = json!({
            "request_info": {"success": true, "credits_remaining": 4, "credits_used": 96},
            "product": {"title": "Stud"}
        });
        let envelope = Envelope::from_body(&body);
        assert!(envelope.is_success());
        assert_eq!(envelope.credits_remaining, Some(4));
        assert!(envelope.is_low_on_credits(10));
        assert!(!envelope.is_low_on_credits(4));
    }

    #[test]
    fn test_missing_envelope_counts_as_success() {
        let envelope = Envelope::from_body(&json!({"search_results": []}));
        assert!(envelope.is_success());
        assert!(!envelope.is_low_on_credits(10));
    }

    #[test]
    fn test_rejected_envelope_message() {
        let body = json!({"request_info": {"success": false, "message": "Invalid search_term"}});
        let envelope = Envelope::from_body(&body);
        assert!(!envelope.is_success());
        assert_eq!(envelope.message_or_default(), "Invalid search_term");
    }

    #[test]
    fn test_response_product_accessor() {
        let response = ApiResponse::new(json!({"product": {"title": "Stud"}}));
        assert!(response.product().is_some());

        let response = ApiResponse::new(json!({"request_info": {}}));
        assert!(response.product().is_none());
        assert_eq!(response.keys(), vec!["request_info".to_string()]);
    }
}
