use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datm::{Datm, PartialDatm, ZeroScore};

/// Provenance of a capsule. Every field is optional; `date` is free-form
/// and never parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub university: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
}

/// A stored knowledge record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub source: Source,
    pub datm: Datm,
    pub created_at: String,
    pub version: i64,
}

/// Creation payload. Only `title` is required.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewCapsule {
    pub id: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub source: Option<Source>,
    pub datm: Option<PartialDatm>,
}

/// A creation payload with its id resolved and DATM defaults applied,
/// ready to be written. `created_at` and `version` belong to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct CapsuleDraft {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub source: Source,
    pub datm: Datm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Payload does not have the expected shape (e.g. `source` is not an object).
    Malformed(String),
    EmptyTitle,
    EmptyId,
    /// A score threshold that cannot be compared against (NaN).
    InvalidThreshold(f64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Malformed(msg) => write!(f, "malformed payload: {msg}"),
            ValidationError::EmptyTitle => write!(f, "title must not be empty"),
            ValidationError::EmptyId => write!(f, "id must not be empty when supplied"),
            ValidationError::InvalidThreshold(v) => write!(f, "invalid minDatm threshold: {v}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Fresh opaque identifier (random UUID v4, hyphenated).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Serialized form of a tag list, as stored and as matched by tag filters.
pub fn serialize_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| String::from("[]"))
}

/// Inverse of [`serialize_tags`]. A NULL/empty column decodes to no tags.
pub fn parse_tags(raw: Option<&str>) -> Result<Vec<String>, serde_json::Error> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.trim().is_empty() => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s),
    }
}

impl NewCapsule {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_datm(mut self, datm: PartialDatm) -> Self {
        self.datm = Some(datm);
        self
    }

    /// Decode an untyped JSON payload, reporting shape problems as
    /// [`ValidationError::Malformed`].
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::Malformed(
                "payload must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Basic required-field checks. The store itself does not enforce these.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err(ValidationError::EmptyId);
        }
        Ok(())
    }

    /// Resolve the id (generating one if absent) and fill DATM defaults.
    pub fn into_draft(self, policy: ZeroScore) -> CapsuleDraft {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => generate_id(),
        };
        CapsuleDraft {
            id,
            title: self.title,
            content: self.content,
            tags: self.tags.unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            datm: self.datm.unwrap_or_default().apply_defaults(policy),
        }
    }
}

impl Capsule {
    pub fn overall(&self) -> f64 {
        self.datm.overall()
    }

    pub fn tags_serialized(&self) -> String {
        serialize_tags(&self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_uuid_v4() {
        let id = generate_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn test_draft_keeps_explicit_id() {
        let draft = NewCapsule::new("t").with_id("cap-1").into_draft(ZeroScore::Preserve);
        assert_eq!(draft.id, "cap-1");
    }

    #[test]
    fn test_draft_generates_missing_id() {
        let draft = NewCapsule::new("t").into_draft(ZeroScore::Preserve);
        assert_eq!(draft.id.len(), 36);
    }

    #[test]
    fn test_draft_defaults() {
        let draft = NewCapsule::new("t").into_draft(ZeroScore::Preserve);
        assert!(draft.tags.is_empty());
        assert_eq!(draft.source, Source::default());
        assert_eq!(draft.datm, Datm::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(draft.content, None);
    }

    #[test]
    fn test_draft_applies_partial_datm() {
        let draft = NewCapsule::new("t")
            .with_datm(PartialDatm {
                truth: Some(0.9),
                ..PartialDatm::default()
            })
            .into_draft(ZeroScore::Preserve);
        assert_eq!(draft.datm, Datm::new(0.9, 0.5, 0.5, 0.5));
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        assert_eq!(
            NewCapsule::new("   ").validate(),
            Err(ValidationError::EmptyTitle)
        );
        assert!(NewCapsule::new("ok").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        assert_eq!(
            NewCapsule::new("ok").with_id("").validate(),
            Err(ValidationError::EmptyId)
        );
    }

    #[test]
    fn test_from_json_full_payload() {
        let payload = json!({
            "id": "test-capsule-001",
            "title": "Yirgacheffe flavor notes",
            "content": "bright floral and citrus acidity",
            "tags": ["coffee", "yirgacheffe"],
            "source": {"university": "Tianjin University", "date": "2026-01-15"},
            "datm": {"truth": 0.9, "goodness": 0.85, "beauty": 0.88, "intelligence": 0.82}
        });
        let capsule = NewCapsule::from_json(payload).unwrap();
        assert_eq!(capsule.id.as_deref(), Some("test-capsule-001"));
        assert_eq!(capsule.tags.as_deref().map(|t| t.len()), Some(2));
        let source = capsule.source.unwrap();
        assert_eq!(source.university.as_deref(), Some("Tianjin University"));
        assert_eq!(source.author, None);
    }

    #[test]
    fn test_from_json_rejects_non_object_source() {
        let err = NewCapsule::from_json(json!({"title": "t", "source": "MIT"})).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)), "got {err:?}");
    }

    #[test]
    fn test_from_json_rejects_non_object_payload() {
        let err = NewCapsule::from_json(json!(["title"])).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_from_json_rejects_non_numeric_score() {
        let err =
            NewCapsule::from_json(json!({"title": "t", "datm": {"truth": "high"}})).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_tags_serialization_roundtrip_preserves_order() {
        let tags = vec!["zeta".to_string(), "alpha".to_string(), "咖啡".to_string()];
        let raw = serialize_tags(&tags);
        assert_eq!(raw, r#"["zeta","alpha","咖啡"]"#);
        assert_eq!(parse_tags(Some(&raw)).unwrap(), tags);
    }

    #[test]
    fn test_parse_tags_empty_inputs() {
        assert!(parse_tags(None).unwrap().is_empty());
        assert!(parse_tags(Some("")).unwrap().is_empty());
        assert!(parse_tags(Some("[]")).unwrap().is_empty());
        assert!(parse_tags(Some("not json")).is_err());
    }
}
