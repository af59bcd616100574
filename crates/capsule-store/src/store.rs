use std::fs;
use std::path::Path;

use capsule_core::{
    Capsule, CapsuleDraft, Datm, INITIAL_VERSION, PredicateSet, Source, now_iso8601, parse_tags,
    serialize_tags,
};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::error::{Result, StoreError, during};
use crate::filter;
use crate::schema;

const CAPSULE_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    tags,
    source_university,
    source_author,
    source_date,
    source_url,
    datm_truth,
    datm_goodness,
    datm_beauty,
    datm_intelligence,
    created_at,
    version
FROM capsules";

/// SQLite-backed capsule table. Append-only: there is no update or delete.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file and its parent directory,
    /// then ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(during("create data directory"))?;
        }
        let conn = Connection::open(path).map_err(during("open"))?;
        schema::initialize(&conn)?;
        tracing::info!("opened capsule store at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(during("open"))?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<Option<i64>> {
        schema::get_schema_version(&self.conn)
    }

    /// Re-run schema creation. Safe to call at any time.
    pub fn initialize(&self) -> Result<()> {
        schema::initialize(&self.conn)
    }

    // --- Write ---

    /// Persist a capsule and return its id. `created_at` is stamped here and
    /// never goes backwards relative to already-stored rows.
    pub fn insert(&self, draft: &CapsuleDraft) -> Result<String> {
        let result = self.conn.execute(
            "INSERT INTO capsules (
                id, title, content, tags,
                source_university, source_author, source_date, source_url,
                datm_truth, datm_goodness, datm_beauty, datm_intelligence,
                created_at, version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                MAX(?13, COALESCE((SELECT MAX(created_at) FROM capsules), '')),
                ?14
            )",
            params![
                draft.id,
                draft.title,
                draft.content,
                serialize_tags(&draft.tags),
                draft.source.university,
                draft.source.author,
                draft.source.date,
                draft.source.url,
                draft.datm.truth,
                draft.datm.goodness,
                draft.datm.beauty,
                draft.datm.intelligence,
                now_iso8601(),
                INITIAL_VERSION,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!("inserted capsule {}", draft.id);
                Ok(draft.id.clone())
            }
            Err(e) if is_primary_key_violation(&e) => {
                tracing::debug!("duplicate capsule id {}", draft.id);
                Err(StoreError::DuplicateKey(draft.id.clone()))
            }
            Err(e) => Err(StoreError::storage("insert", e)),
        }
    }

    // --- Read ---

    /// Capsules matching every predicate, newest first, at most `limit`.
    /// Rows with equal `created_at` come back in reverse insertion order.
    pub fn query(&self, set: &PredicateSet) -> Result<Vec<Capsule>> {
        let filter = filter::render(set);
        let sql = format!(
            "{CAPSULE_SELECT_SQL}{} ORDER BY created_at DESC, rowid DESC LIMIT ?",
            filter.where_clause
        );
        let mut bind_values = filter.bind_values;
        bind_values.push(Value::Integer(
            i64::try_from(set.limit()).unwrap_or(i64::MAX),
        ));

        let mut stmt = self.conn.prepare(&sql).map_err(during("query"))?;
        let mut rows = stmt
            .query(params_from_iter(bind_values))
            .map_err(during("query"))?;

        let mut capsules = Vec::new();
        while let Some(row) = rows.next().map_err(during("query"))? {
            capsules.push(parse_capsule_row(row)?);
        }

        tracing::debug!(
            "query with {} predicate(s) returned {} capsule(s)",
            set.predicates().len(),
            capsules.len()
        );
        Ok(capsules)
    }

    /// Primary-key lookup.
    pub fn get_by_id(&self, id: &str) -> Result<Capsule> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CAPSULE_SELECT_SQL} WHERE id = ?1"))
            .map_err(during("get"))?;
        let mut rows = stmt.query([id]).map_err(during("get"))?;
        match rows.next().map_err(during("get"))? {
            Some(row) => parse_capsule_row(row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM capsules", [], |row| row.get(0))
            .map_err(during("count"))?;
        Ok(count.max(0) as u64)
    }

    /// Database size in bytes (page_count * page_size).
    pub fn db_size(&self) -> Result<u64> {
        let pages: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .map_err(during("db_size"))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .map_err(during("db_size"))?;
        Ok((pages * page_size).max(0) as u64)
    }

    /// Fold the WAL back into the main file. Called on clean shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(during("checkpoint"))?;
        tracing::debug!("WAL checkpoint complete");
        Ok(())
    }
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_capsule_row(row: &Row<'_>) -> Result<Capsule> {
    let (capsule, raw_tags) = read_columns(row).map_err(during("decode row"))?;
    let tags = parse_tags(raw_tags.as_deref()).map_err(|e| {
        StoreError::storage(
            "decode row",
            format!("invalid tags in capsule {}: {e}", capsule.id),
        )
    })?;
    Ok(Capsule { tags, ..capsule })
}

fn read_columns(row: &Row<'_>) -> rusqlite::Result<(Capsule, Option<String>)> {
    let capsule = Capsule {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        tags: Vec::new(),
        source: Source {
            university: row.get("source_university")?,
            author: row.get("source_author")?,
            date: row.get("source_date")?,
            url: row.get("source_url")?,
        },
        datm: Datm {
            truth: row.get("datm_truth")?,
            goodness: row.get("datm_goodness")?,
            beauty: row.get("datm_beauty")?,
            intelligence: row.get("datm_intelligence")?,
        },
        created_at: row.get("created_at")?,
        version: row.get("version")?,
    };
    Ok((capsule, row.get("tags")?))
}
