//! Search requests and the predicate sets they compile to.
//!
//! A [`PredicateSet`] is storage-agnostic: the store renders it into
//! parameterized SQL, and [`PredicateSet::matches`] evaluates the same
//! semantics in memory. All predicates combine with AND. Results are always
//! ordered newest first; there is no caller-selectable ordering.
//!
//! Substring predicates follow SQLite `LIKE` defaults: ASCII letters match
//! case-insensitively, everything else matches exactly.

use serde::{Deserialize, Serialize};

use crate::capsule::{Capsule, ValidationError};
use crate::constants::DEFAULT_SEARCH_LIMIT;

/// Caller-facing search filters. Empty strings count as "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchRequest {
    pub keyword: Option<String>,
    pub university: Option<String>,
    pub tags: Option<String>,
    pub min_datm: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Substring of `title` OR `content`.
    Keyword(String),
    /// Exact match on `source.university`.
    University(String),
    /// Substring of the serialized tag list. `"coffee"` also matches a
    /// capsule tagged `"coffeehouse"`; this is not set membership.
    Tags(String),
    /// Every DATM dimension must be >= the threshold.
    MinDatm(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
    limit: usize,
}

impl PredicateSet {
    /// Matches every capsule.
    pub fn all(limit: usize) -> Self {
        Self {
            predicates: Vec::new(),
            limit,
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty()
    }

    /// In-memory evaluation with the same semantics the store applies.
    pub fn matches(&self, capsule: &Capsule) -> bool {
        self.predicates.iter().all(|p| p.matches(capsule))
    }
}

impl Predicate {
    pub fn matches(&self, capsule: &Capsule) -> bool {
        match self {
            Predicate::Keyword(needle) => {
                contains_like(&capsule.title, needle)
                    || capsule
                        .content
                        .as_deref()
                        .is_some_and(|c| contains_like(c, needle))
            }
            Predicate::University(name) => {
                capsule.source.university.as_deref() == Some(name.as_str())
            }
            Predicate::Tags(needle) => contains_like(&capsule.tags_serialized(), needle),
            Predicate::MinDatm(floor) => capsule.datm.meets_floor(*floor),
        }
    }
}

/// `LIKE '%needle%'` semantics: ASCII case folding only.
fn contains_like(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Compiles [`SearchRequest`]s, applying the default result bound.
#[derive(Clone, Copy, Debug)]
pub struct QueryBuilder {
    default_limit: usize,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_LIMIT)
    }
}

impl QueryBuilder {
    pub fn new(default_limit: usize) -> Self {
        Self { default_limit }
    }

    pub fn build(&self, request: &SearchRequest) -> Result<PredicateSet, ValidationError> {
        let mut predicates = Vec::new();

        if let Some(keyword) = non_empty(&request.keyword) {
            predicates.push(Predicate::Keyword(keyword));
        }
        if let Some(university) = non_empty(&request.university) {
            predicates.push(Predicate::University(university));
        }
        if let Some(tags) = non_empty(&request.tags) {
            predicates.push(Predicate::Tags(tags));
        }
        if let Some(floor) = request.min_datm {
            if floor.is_nan() {
                return Err(ValidationError::InvalidThreshold(floor));
            }
            // A zero threshold means "no floor", same as an absent one.
            if floor != 0.0 {
                predicates.push(Predicate::MinDatm(floor));
            }
        }

        // Zero means "unspecified", not "return nothing".
        let limit = match request.limit {
            Some(n) if n > 0 => n,
            _ => self.default_limit,
        };

        Ok(PredicateSet { predicates, limit })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::Source;
    use crate::datm::Datm;

    fn capsule(title: &str, content: Option<&str>, tags: &[&str], datm: Datm) -> Capsule {
        Capsule {
            id: "c".to_string(),
            title: title.to_string(),
            content: content.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            source: Source {
                university: Some("Tianjin University".to_string()),
                ..Source::default()
            },
            datm,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            version: 1,
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::default()
    }

    #[test]
    fn test_empty_request_matches_all() {
        let set = QueryBuilder::default().build(&request()).unwrap();
        assert!(set.is_unfiltered());
        assert_eq!(set.limit(), DEFAULT_SEARCH_LIMIT);
        assert!(set.matches(&capsule("x", None, &[], Datm::default())));
    }

    #[test]
    fn test_blank_strings_are_ignored() {
        let req = SearchRequest {
            keyword: Some("  ".to_string()),
            university: Some(String::new()),
            ..request()
        };
        let set = QueryBuilder::default().build(&req).unwrap();
        assert!(set.is_unfiltered());
    }

    #[test]
    fn test_limit_zero_uses_default() {
        let req = SearchRequest {
            limit: Some(0),
            ..request()
        };
        assert_eq!(QueryBuilder::new(7).build(&req).unwrap().limit(), 7);

        let req = SearchRequest {
            limit: Some(500),
            ..request()
        };
        assert_eq!(QueryBuilder::new(7).build(&req).unwrap().limit(), 500);
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let req = SearchRequest {
            min_datm: Some(f64::NAN),
            ..request()
        };
        assert!(matches!(
            QueryBuilder::default().build(&req),
            Err(ValidationError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_zero_threshold_is_no_floor() {
        let req = SearchRequest {
            min_datm: Some(0.0),
            ..request()
        };
        let set = QueryBuilder::default().build(&req).unwrap();
        assert!(set.is_unfiltered());
        assert!(set.matches(&capsule("below zero", None, &[], Datm::new(-0.2, 0.5, 0.5, 0.5))));

        let req = SearchRequest {
            min_datm: Some(0.1),
            ..request()
        };
        let set = QueryBuilder::default().build(&req).unwrap();
        assert_eq!(set.predicates(), &[Predicate::MinDatm(0.1)]);
    }

    #[test]
    fn test_keyword_matches_title_or_content() {
        let pred = Predicate::Keyword("citrus".to_string());
        assert!(pred.matches(&capsule("notes", Some("bright CITRUS"), &[], Datm::default())));
        assert!(pred.matches(&capsule("Citrus notes", None, &[], Datm::default())));
        assert!(!pred.matches(&capsule("notes", None, &[], Datm::default())));
    }

    #[test]
    fn test_keyword_folds_ascii_only() {
        let pred = Predicate::Keyword("É".to_string());
        assert!(!pred.matches(&capsule("café", None, &[], Datm::default())));
    }

    #[test]
    fn test_university_is_exact() {
        let c = capsule("x", None, &[], Datm::default());
        assert!(Predicate::University("Tianjin University".to_string()).matches(&c));
        assert!(!Predicate::University("Tianjin".to_string()).matches(&c));
        assert!(!Predicate::University("tianjin university".to_string()).matches(&c));
    }

    #[test]
    fn test_tag_filter_is_substring_of_serialized_list() {
        let c = capsule("x", None, &["coffeehouse"], Datm::default());
        // Known limitation: substring, not set membership.
        assert!(Predicate::Tags("coffee".to_string()).matches(&c));
        assert!(!Predicate::Tags("tea".to_string()).matches(&c));
    }

    #[test]
    fn test_min_datm_is_conjunctive_not_average() {
        let c = capsule("x", None, &[], Datm::new(0.9, 0.3, 0.9, 0.9));
        assert!(c.overall() > 0.5);
        assert!(!Predicate::MinDatm(0.5).matches(&c));
    }

    #[test]
    fn test_predicates_combine_with_and() {
        let req = SearchRequest {
            keyword: Some("yirgacheffe".to_string()),
            min_datm: Some(0.8),
            ..request()
        };
        let set = QueryBuilder::default().build(&req).unwrap();
        assert_eq!(set.predicates().len(), 2);

        let strong = capsule("Yirgacheffe", None, &[], Datm::new(0.9, 0.85, 0.88, 0.82));
        let weak = capsule("Yirgacheffe", None, &[], Datm::new(0.9, 0.85, 0.88, 0.5));
        assert!(set.matches(&strong));
        assert!(!set.matches(&weak));
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"keyword": "k", "minDatm": 0.8, "limit": 5}"#).unwrap();
        assert_eq!(req.min_datm, Some(0.8));
        assert_eq!(req.limit, Some(5));
        assert_eq!(req.university, None);
    }
}
