//! Options shared by every retrieval operation.

use crate::sql::{Query, SortOrder};
use std::collections::HashMap;
use std::sync::Arc;

/// Caller-supplied constraint hook, invoked with the in-progress query.
pub type QueryCallback = Arc<dyn Fn(&mut Query) + Send + Sync>;

/// Recognized retrieval options: custom filter, eager loads, eager counts, sort, page.
#[derive(Clone, Default)]
pub struct QueryOptions {
    pub query: Option<QueryCallback>,
    pub with: Vec<String>,
    pub with_count: Vec<String>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    /// 1-based page for paginated lists.
    pub page: Option<u64>,
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("query", &self.query.as_ref().map(|_| "<callback>"))
            .field("with", &self.with)
            .field("with_count", &self.with_count)
            .field("sort_field", &self.sort_field)
            .field("sort_order", &self.sort_order)
            .field("page", &self.page)
            .finish()
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Query) + Send + Sync + 'static,
    {
        self.query = Some(Arc::new(f));
        self
    }

    pub fn with(mut self, relation: impl Into<String>) -> Self {
        self.with.push(relation.into());
        self
    }

    pub fn with_count(mut self, relation: impl Into<String>) -> Self {
        self.with_count.push(relation.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Parse from string parameters (e.g. an HTTP query string). Unrecognized keys are ignored.
    ///
    /// `with` / `withCount` are comma-separated; `sortOrder` is ascending only when it is `1`.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut options = QueryOptions::new();
        if let Some(v) = params.get("with") {
            options.with = split_list(v);
        }
        if let Some(v) = params.get("withCount") {
            options.with_count = split_list(v);
        }
        options.sort_field = params
            .get("sortField")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        options.sort_order = match params.get("sortOrder") {
            None => SortOrder::Asc,
            Some(v) if v.trim().parse::<i64>() == Ok(1) => SortOrder::Asc,
            Some(_) => SortOrder::Desc,
        };
        options.page = params.get("page").and_then(|p| p.trim().parse().ok()).filter(|p| *p > 0);
        options
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply options to a base query, in order: filter callback, eager loads, eager counts.
pub fn apply_query_options(query: &mut Query, options: &QueryOptions) {
    if let Some(callback) = &options.query {
        callback(query);
    }
    if !options.with.is_empty() {
        query.with(options.with.iter().cloned());
    }
    if !options.with_count.is_empty() {
        query.with_count(options.with_count.iter().cloned());
    }
}
