//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a query or binding.
//! Identifiers are always quoted; values are always bound as `$n` parameters.

use crate::model::{EntityMeta, RelatedTable};
use crate::sql::query::{Columns, Condition, Query};
use serde_json::{Map, Value};

/// Quote identifier (double quotes, embedded quotes doubled).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote `table` or `schema.table`.
fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Bind `v` and return its placeholder, wrapped in CAST when the column declares one.
    fn placeholder(&mut self, v: Value, cast: Option<&str>) -> String {
        let n = self.push_param(v);
        match cast {
            Some(t) => format!("CAST(${} AS {})", n, t),
            None => format!("${}", n),
        }
    }
}

fn select_column_list(columns: &Columns) -> String {
    match columns {
        Columns::Only(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| if c == "*" { c.clone() } else { quoted(c) })
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    }
}

/// WHERE clause for the query's conditions plus its soft-delete scope. Empty when unconstrained.
fn where_clause(q: &mut QueryBuf, query: &Query) -> String {
    let meta = query.meta();
    let mut parts = Vec::new();
    for cond in query.conditions() {
        match cond {
            Condition::Compare { column, op, value } => {
                let ph = q.placeholder(value.clone(), meta.cast_for(column));
                parts.push(format!("{} {} {}", quoted(column), op.as_sql(), ph));
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    parts.push("1 = 0".to_string());
                    continue;
                }
                let cast = meta.cast_for(column);
                let placeholders: Vec<String> = values.iter().map(|v| q.placeholder(v.clone(), cast)).collect();
                parts.push(format!("{} IN ({})", quoted(column), placeholders.join(", ")));
            }
            Condition::Null { column, negated } => {
                let not = if *negated { " NOT" } else { "" };
                parts.push(format!("{} IS{} NULL", quoted(column), not));
            }
        }
    }
    if let Some(col) = query.soft_delete_scope() {
        parts.push(format!("{} IS NULL", quoted(col)));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT with the query's conditions, ordering, LIMIT/OFFSET.
pub fn select(query: &Query, columns: &Columns) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&query.binding().table);
    let where_clause = where_clause(&mut q, query);
    let order_clause = if query.orders().is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = query
            .orders()
            .iter()
            .map(|(col, dir)| format!("{} {}", quoted(col), dir.as_sql()))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };
    let limit_clause = query.limit_value().map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = query.offset_value().map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(columns),
        table,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// SELECT COUNT(*) over the query's conditions (ordering and paging ignored).
pub fn count(query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&query.binding().table);
    let where_clause = where_clause(&mut q, query);
    q.sql = format!("SELECT COUNT(*) AS \"aggregate\" FROM {}{}", table, where_clause);
    q
}

fn related_in_clause(q: &mut QueryBuf, related: &RelatedTable, column: &str, values: &[Value]) -> String {
    let cast = related.meta.cast_for(column);
    let placeholders: Vec<String> = values.iter().map(|v| q.placeholder(v.clone(), cast)).collect();
    let mut clause = format!(" WHERE {} IN ({})", quoted(column), placeholders.join(", "));
    if let Some(col) = related.meta.soft_delete_column {
        clause.push_str(&format!(" AND {} IS NULL", quoted(col)));
    }
    clause
}

/// SELECT * FROM related WHERE column IN (...) ORDER BY pk. Used for batch-loading related rows.
pub fn select_by_column_in(related: &RelatedTable, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&related.binding.table);
    if values.is_empty() {
        q.sql = format!("SELECT * FROM {} WHERE 1 = 0", table);
        return q;
    }
    let where_clause = related_in_clause(&mut q, related, column, values);
    q.sql = format!(
        "SELECT * FROM {}{} ORDER BY {}",
        table,
        where_clause,
        quoted(related.meta.primary_key)
    );
    q
}

/// Per-key row counts: SELECT column AS key, COUNT(*) AS aggregate ... GROUP BY column.
pub fn count_by_column_in(related: &RelatedTable, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&related.binding.table);
    if values.is_empty() {
        q.sql = format!(
            "SELECT {} AS \"key\", COUNT(*) AS \"aggregate\" FROM {} WHERE 1 = 0 GROUP BY {}",
            quoted(column),
            table,
            quoted(column)
        );
        return q;
    }
    let where_clause = related_in_clause(&mut q, related, column, values);
    q.sql = format!(
        "SELECT {} AS \"key\", COUNT(*) AS \"aggregate\" FROM {}{} GROUP BY {}",
        quoted(column),
        table,
        where_clause,
        quoted(column)
    );
    q
}

/// INSERT of the given attributes, RETURNING the stored row. No attributes inserts DEFAULT VALUES.
pub fn insert(table: &str, meta: &EntityMeta, attributes: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(table);
    if attributes.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table);
        return q;
    }
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, val) in attributes {
        placeholders.push(q.placeholder(val.clone(), meta.cast_for(name)));
        cols.push(quoted(name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        table,
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE by key: SET the given attributes (primary key skipped), RETURNING the stored row.
pub fn update(table: &str, meta: &EntityMeta, id: &Value, attributes: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(table);
    let pk = meta.primary_key;
    let mut sets = Vec::new();
    for (k, v) in attributes {
        if k == pk {
            continue;
        }
        let rhs = q.placeholder(v.clone(), meta.cast_for(k));
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    if sets.is_empty() {
        let ph = q.placeholder(id.clone(), meta.cast_for(pk));
        q.sql = format!("SELECT * FROM {} WHERE {} = {}", table, quoted(pk), ph);
        return q;
    }
    let id_ph = q.placeholder(id.clone(), meta.cast_for(pk));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING *",
        table,
        sets.join(", "),
        quoted(pk),
        id_ph
    );
    q
}

/// DELETE by key.
pub fn delete(table: &str, meta: &EntityMeta, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(table);
    let pk = meta.primary_key;
    let ph = q.placeholder(id.clone(), meta.cast_for(pk));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", table, quoted(pk), ph);
    q
}
