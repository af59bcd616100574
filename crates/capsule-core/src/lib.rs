//! Knowledge capsule engine.
//!
//! A capsule is a short curated knowledge record with provenance and a
//! four-dimensional DATM quality score (Truth, Goodness, Beauty,
//! Intelligence). This crate owns the data model, the scoring/grading
//! rules and the translation of search requests into predicate sets.
//!
//! Zero I/O - no opinions about transport or persistence.

pub mod capsule;
pub mod constants;
pub mod datm;
pub mod query;
pub mod time;

pub use capsule::{
    Capsule, CapsuleDraft, NewCapsule, Source, ValidationError, generate_id, parse_tags,
    serialize_tags,
};
pub use constants::{DEFAULT_DIMENSION, DEFAULT_SEARCH_LIMIT, INITIAL_VERSION};
pub use datm::{Datm, DatmReport, Grade, PartialDatm, ZeroScore, grade};
pub use query::{Predicate, PredicateSet, QueryBuilder, SearchRequest};
pub use time::{now_iso8601, now_unix_millis, unix_millis_to_iso8601};
