//! In-progress query for one entity type: binding, conditions, ordering and eager-load requests.

use crate::model::{EntityMeta, TableBinding};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare { column: String, op: Operator, value: Value },
    In { column: String, values: Vec<Value> },
    Null { column: String, negated: bool },
}

/// Query construct handed to services and filter callbacks. Methods chain on `&mut Self`.
#[derive(Clone, Debug)]
pub struct Query {
    binding: TableBinding,
    meta: EntityMeta,
    conditions: Vec<Condition>,
    orders: Vec<(String, SortOrder)>,
    limit: Option<u64>,
    offset: Option<u64>,
    eager: Vec<String>,
    eager_counts: Vec<String>,
    with_trashed: bool,
}

impl Query {
    pub fn new(binding: TableBinding, meta: EntityMeta) -> Self {
        Query {
            binding,
            meta,
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            eager: Vec::new(),
            eager_counts: Vec::new(),
            with_trashed: false,
        }
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_op(column, Operator::Eq, value)
    }

    pub fn where_op(&mut self, column: &str, op: Operator, value: impl Into<Value>) -> &mut Self {
        self.conditions.push(Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.conditions.push(Condition::In {
            column: column.to_string(),
            values,
        });
        self
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.conditions.push(Condition::Null {
            column: column.to_string(),
            negated: false,
        });
        self
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.conditions.push(Condition::Null {
            column: column.to_string(),
            negated: true,
        });
        self
    }

    pub fn order_by(&mut self, column: &str, order: SortOrder) -> &mut Self {
        self.orders.push((column.to_string(), order));
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Request eager loading of the named relations.
    pub fn with<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in relations {
            let r = r.into();
            if !self.eager.contains(&r) {
                self.eager.push(r);
            }
        }
        self
    }

    /// Request eager counts of the named relations, exposed as `<relation>_count`.
    pub fn with_count<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in relations {
            let r = r.into();
            if !self.eager_counts.contains(&r) {
                self.eager_counts.push(r);
            }
        }
        self
    }

    /// Include soft-deleted rows.
    pub fn with_trashed(&mut self) -> &mut Self {
        self.with_trashed = true;
        self
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn orders(&self) -> &[(String, SortOrder)] {
        &self.orders
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn eager(&self) -> &[String] {
        &self.eager
    }

    pub fn eager_counts(&self) -> &[String] {
        &self.eager_counts
    }

    /// Soft-delete column to filter on, unless trashed rows were requested.
    pub fn soft_delete_scope(&self) -> Option<&'static str> {
        if self.with_trashed {
            None
        } else {
            self.meta.soft_delete_column
        }
    }
}

/// Column selection for list operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    Only(Vec<String>),
}

impl Columns {
    pub fn only<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Columns::Only(columns.into_iter().map(Into::into).collect())
    }
}
