//! The logical capsule operations exposed to adapters (HTTP, CLI).
//!
//! Validation happens here, before anything reaches the store. Errors are
//! passed through untouched and never retried.

use capsule_core::{
    Capsule, DatmReport, NewCapsule, PartialDatm, QueryBuilder, SearchRequest, ZeroScore,
    now_iso8601,
};
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub count: usize,
    pub results: Vec<Capsule>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
}

pub struct CapsuleService {
    store: Store,
    builder: QueryBuilder,
    zero_score: ZeroScore,
}

impl CapsuleService {
    /// Open the configured database, creating directory and schema as needed.
    pub fn open(config: &Config) -> Result<Self> {
        let store = Store::open(&config.db_path())?;
        Ok(Self::new(store, config))
    }

    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            builder: config.query_builder(),
            zero_score: config.datm.zero_score,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Validate, fill defaults and persist. Returns the effective id.
    pub fn create_capsule(&self, payload: NewCapsule) -> Result<String> {
        payload.validate()?;
        let draft = payload.into_draft(self.zero_score);
        let id = self.store.insert(&draft)?;
        tracing::info!("created capsule {id}");
        Ok(id)
    }

    /// Like [`create_capsule`](Self::create_capsule) for an untyped JSON body.
    pub fn create_capsule_json(&self, payload: serde_json::Value) -> Result<String> {
        let payload = NewCapsule::from_json(payload)?;
        self.create_capsule(payload)
    }

    pub fn search_capsules(&self, request: &SearchRequest) -> Result<SearchResults> {
        let set = self.builder.build(request)?;
        let results = self.store.query(&set)?;
        Ok(SearchResults {
            count: results.len(),
            results,
        })
    }

    pub fn get_capsule(&self, id: &str) -> Result<Capsule> {
        self.store.get_by_id(id)
    }

    /// Score without persisting.
    pub fn compute_datm(&self, partial: &PartialDatm) -> DatmReport {
        DatmReport::compute(partial, self.zero_score)
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.store.checkpoint()
    }

    /// Liveness only; never touches the store.
    pub fn health() -> Health {
        Health {
            status: "ok",
            timestamp: now_iso8601(),
        }
    }
}
