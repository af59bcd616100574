//! Renders a [`PredicateSet`] into a parameterized `WHERE` clause.
//!
//! User text never reaches the SQL string: every value is a bound
//! parameter, and `LIKE` wildcards inside it are escaped so substring
//! predicates match literally.

use capsule_core::{Predicate, PredicateSet};
use rusqlite::types::Value;

pub struct SqlFilter {
    /// Conditions joined with AND, starting with ` WHERE 1 = 1`.
    pub where_clause: String,
    pub bind_values: Vec<Value>,
}

pub fn render(set: &PredicateSet) -> SqlFilter {
    let mut where_clause = String::from(" WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    for predicate in set.predicates() {
        match predicate {
            Predicate::Keyword(keyword) => {
                where_clause
                    .push_str(" AND (title LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\')");
                let pattern = like_pattern(keyword);
                bind_values.push(Value::Text(pattern.clone()));
                bind_values.push(Value::Text(pattern));
            }
            Predicate::University(university) => {
                where_clause.push_str(" AND source_university = ?");
                bind_values.push(Value::Text(university.clone()));
            }
            Predicate::Tags(tags) => {
                where_clause.push_str(" AND tags LIKE ? ESCAPE '\\'");
                bind_values.push(Value::Text(like_pattern(tags)));
            }
            Predicate::MinDatm(floor) => {
                where_clause.push_str(
                    " AND datm_truth >= ? AND datm_goodness >= ? \
                     AND datm_beauty >= ? AND datm_intelligence >= ?",
                );
                for _ in 0..4 {
                    bind_values.push(Value::Real(*floor));
                }
            }
        }
    }

    SqlFilter {
        where_clause,
        bind_values,
    }
}

/// `%text%` with `\`, `%` and `_` escaped.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
