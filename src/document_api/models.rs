//! Data models for the upstream document API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of an upstream listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    /// Stable upstream identifier of the report.
    pub source_id: String,
    /// Secondary key used for dedup across runs.
    pub correlation_id: String,
}

impl DocumentRef {
    pub fn new(source_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Feature flags forwarded verbatim on every document fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    pub include_mileage: bool,
    pub include_image: bool,
    pub include_report: bool,
    pub include_notes: bool,
    pub image_first: bool,
    pub fail_on_image_error: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_mileage: true,
            include_image: true,
            include_report: true,
            include_notes: true,
            image_first: false,
            fail_on_image_error: false,
        }
    }
}

impl FetchOptions {
    /// Query parameters for the fetch endpoint.
    pub fn as_query(&self) -> [(&'static str, &'static str); 6] {
        fn flag(value: bool) -> &'static str {
            if value {
                "true"
            } else {
                "false"
            }
        }
        [
            ("includeMileage", flag(self.include_mileage)),
            ("includeImage", flag(self.include_image)),
            ("includeReport", flag(self.include_report)),
            ("includeNotes", flag(self.include_notes)),
            ("imageFirst", flag(self.image_first)),
            ("failOnImageError", flag(self.fail_on_image_error)),
        ]
    }
}

/// Opaque credential bundle forwarded as request headers.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub chain_id: String,
    pub customer_code: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("customer_code", &self.customer_code)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_ref_json_uses_camel_case() {
        let json = r#"[{"sourceId":"RPT-1","correlationId":"C-1"}]"#;
        let docs: Vec<DocumentRef> = serde_json::from_str(json).unwrap();
        assert_eq!(docs, vec![DocumentRef::new("RPT-1", "C-1")]);
    }

    #[test]
    fn test_fetch_options_query() {
        let options = FetchOptions {
            image_first: true,
            include_notes: false,
            ..Default::default()
        };
        let query = options.as_query();
        assert!(query.contains(&("imageFirst", "true")));
        assert!(query.contains(&("includeNotes", "false")));
        assert!(query.contains(&("includeMileage", "true")));
        assert!(query.contains(&("failOnImageError", "false")));
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let credentials = ApiCredentials {
            api_key: "super-secret".to_string(),
            chain_id: "chain".to_string(),
            customer_code: "ACME".to_string(),
        };
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("ACME"));
    }
}
