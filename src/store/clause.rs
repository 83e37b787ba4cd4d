//! Parameterized WHERE / SET fragments built from whitelisted field names.
//!
//! Column names only ever come from a [`Whitelist`]; caller-supplied values are
//! emitted as `$n` placeholders and returned separately, in placeholder order.

use std::cmp::Ordering;

use thiserror::Error;

use crate::model::Ms;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Time(Ms),
}

impl SqlValue {
    /// Ordering between two values of the same variant. Mixed variants never compare.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Int(a), SqlValue::Int(b)) => Some(a.cmp(b)),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::Time(a), SqlValue::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    GtEq,
    LtEq,
}

impl Cmp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::GtEq => ">=",
            Cmp::LtEq => "<=",
        }
    }

    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Cmp::Eq => ordering == Ordering::Equal,
            Cmp::GtEq => ordering != Ordering::Less,
            Cmp::LtEq => ordering != Ordering::Greater,
        }
    }
}

/// One predicate: `<column for name> <op> <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub op: Cmp,
    pub value: SqlValue,
}

impl Filter {
    pub fn eq(name: impl Into<String>, value: SqlValue) -> Self {
        Self { name: name.into(), op: Cmp::Eq, value }
    }

    pub fn gte(name: impl Into<String>, value: SqlValue) -> Self {
        Self { name: name.into(), op: Cmp::GtEq, value }
    }

    pub fn lte(name: impl Into<String>, value: SqlValue) -> Self {
        Self { name: name.into(), op: Cmp::LtEq, value }
    }
}

/// One assignment: `<column for name> = <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: SqlValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: SqlValue) -> Self {
        Self { name: name.into(), value }
    }
}

/// Column names a logical field may be rendered as. WHERE and ORDER BY are kept
/// apart so a filter name is never reused as raw SQL in another position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchField {
    pub name_where: &'static str,
    pub name_order: &'static str,
}

impl SearchField {
    pub const fn same(column: &'static str) -> Self {
        Self { name_where: column, name_order: column }
    }
}

/// Immutable per-entity mapping from logical names to columns.
#[derive(Debug)]
pub struct Whitelist {
    entries: &'static [(&'static str, SearchField)],
}

impl Whitelist {
    pub const fn new(entries: &'static [(&'static str, SearchField)]) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&SearchField> {
        self.entries
            .iter()
            .find(|(logical, _)| *logical == name)
            .map(|(_, field)| field)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(logical, _)| *logical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClauseError {
    #[error("unknown field: {0}")]
    UnknownField(String),
}

/// SQL fragment plus its parameters, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
    pub text: String,
    pub params: Vec<SqlValue>,
}

impl Clause {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Placeholder index that follows this clause, given where it started.
    pub fn next_placeholder(&self, first_placeholder: usize) -> usize {
        first_placeholder + self.params.len()
    }
}

/// Build `col1 op $n AND col2 op $n+1 ...`. Every name is checked before any
/// text is produced; an unknown name fails the whole call.
pub fn build_where(
    columns: &Whitelist,
    filters: &[Filter],
    first_placeholder: usize,
) -> Result<Clause, ClauseError> {
    let resolved = resolve_all(columns, filters.iter().map(|f| f.name.as_str()))?;

    let mut clause = Clause::default();
    for (i, (column, filter)) in resolved.iter().zip(filters).enumerate() {
        if i > 0 {
            clause.text.push_str(" AND ");
        }
        clause.text.push_str(&format!(
            "{} {} ${}",
            column.name_where,
            filter.op.as_sql(),
            first_placeholder + i
        ));
        clause.params.push(filter.value.clone());
    }
    Ok(clause)
}

/// Build `col1 = $n, col2 = $n+1 ...` for an UPDATE.
pub fn build_set(
    columns: &Whitelist,
    fields: &[Field],
    first_placeholder: usize,
) -> Result<Clause, ClauseError> {
    let resolved = resolve_all(columns, fields.iter().map(|f| f.name.as_str()))?;

    let mut clause = Clause::default();
    for (i, (column, field)) in resolved.iter().zip(fields).enumerate() {
        if i > 0 {
            clause.text.push_str(", ");
        }
        clause.text
            .push_str(&format!("{} = ${}", column.name_where, first_placeholder + i));
        clause.params.push(field.value.clone());
    }
    Ok(clause)
}

/// `ORDER BY` column for a logical name.
pub fn order_by(columns: &Whitelist, name: &str, desc: bool) -> Result<String, ClauseError> {
    let field = columns
        .get(name)
        .ok_or_else(|| ClauseError::UnknownField(name.to_string()))?;
    Ok(if desc {
        format!("{} DESC", field.name_order)
    } else {
        field.name_order.to_string()
    })
}

fn resolve_all<'a>(
    columns: &Whitelist,
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<SearchField>, ClauseError> {
    names
        .map(|name| {
            columns
                .get(name)
                .copied()
                .ok_or_else(|| ClauseError::UnknownField(name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLUMNS: Whitelist = Whitelist::new(&[
        ("start", SearchField::same("start_date")),
        ("end", SearchField::same("end_date")),
        ("user", SearchField::same("user_id")),
        ("tag", SearchField { name_where: "lower(tag)", name_order: "tag" }),
    ]);

    #[test]
    fn where_numbers_placeholders_in_caller_order() {
        let filters = [
            Filter::gte("start", SqlValue::Int(10)),
            Filter::lte("end", SqlValue::Int(20)),
            Filter::eq("user", SqlValue::Int(5)),
        ];
        let clause = build_where(&COLUMNS, &filters, 1).unwrap();
        assert_eq!(clause.text, "start_date >= $1 AND end_date <= $2 AND user_id = $3");
        assert_eq!(
            clause.params,
            vec![SqlValue::Int(10), SqlValue::Int(20), SqlValue::Int(5)]
        );
        assert_eq!(clause.next_placeholder(1), 4);
    }

    #[test]
    fn where_starts_at_offset() {
        let filters = [Filter::eq("user", SqlValue::Text("alice".into()))];
        let clause = build_where(&COLUMNS, &filters, 4).unwrap();
        assert_eq!(clause.text, "user_id = $4");
    }

    #[test]
    fn where_is_deterministic() {
        let filters = [
            Filter::eq("user", SqlValue::Int(1)),
            Filter::gte("start", SqlValue::Time(100)),
        ];
        let a = build_where(&COLUMNS, &filters, 1).unwrap();
        let b = build_where(&COLUMNS, &filters, 1).unwrap();
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn unknown_name_fails_closed() {
        let filters = [
            Filter::eq("user", SqlValue::Int(1)),
            Filter::eq("1=1; DROP TABLE booking; --", SqlValue::Int(1)),
        ];
        let err = build_where(&COLUMNS, &filters, 1).unwrap_err();
        assert_eq!(
            err,
            ClauseError::UnknownField("1=1; DROP TABLE booking; --".into())
        );

        let fields = [Field::new("password", SqlValue::Text("x".into()))];
        assert!(build_set(&COLUMNS, &fields, 1).is_err());
    }

    #[test]
    fn values_never_reach_clause_text() {
        let hostile = "'; DELETE FROM booking; --";
        let filters = [Filter::eq("user", SqlValue::Text(hostile.into()))];
        let clause = build_where(&COLUMNS, &filters, 1).unwrap();
        assert!(!clause.text.contains(hostile));
        assert_eq!(clause.params, vec![SqlValue::Text(hostile.into())]);

        let fields = [Field::new("user", SqlValue::Text(hostile.into()))];
        let clause = build_set(&COLUMNS, &fields, 1).unwrap();
        assert!(!clause.text.contains(hostile));
    }

    #[test]
    fn empty_inputs_yield_empty_clause() {
        let clause = build_where(&COLUMNS, &[], 1).unwrap();
        assert!(clause.is_empty());
        assert!(clause.params.is_empty());
        assert!(build_set(&COLUMNS, &[], 1).unwrap().is_empty());
    }

    #[test]
    fn set_uses_where_column() {
        let fields = [
            Field::new("start", SqlValue::Time(1)),
            Field::new("end", SqlValue::Time(2)),
        ];
        let clause = build_set(&COLUMNS, &fields, 1).unwrap();
        assert_eq!(clause.text, "start_date = $1, end_date = $2");
    }

    #[test]
    fn order_by_uses_order_column() {
        assert_eq!(order_by(&COLUMNS, "tag", false).unwrap(), "tag");
        assert_eq!(order_by(&COLUMNS, "start", true).unwrap(), "start_date DESC");
        assert!(order_by(&COLUMNS, "nope", false).is_err());
    }

    #[test]
    fn cmp_matches() {
        assert!(Cmp::Eq.matches(Ordering::Equal));
        assert!(!Cmp::Eq.matches(Ordering::Less));
        assert!(Cmp::GtEq.matches(Ordering::Greater));
        assert!(Cmp::GtEq.matches(Ordering::Equal));
        assert!(!Cmp::LtEq.matches(Ordering::Greater));
    }

    #[test]
    fn mixed_variants_do_not_compare() {
        assert_eq!(SqlValue::Int(1).compare(&SqlValue::Text("1".into())), None);
        assert_eq!(
            SqlValue::Time(5).compare(&SqlValue::Time(3)),
            Some(Ordering::Greater)
        );
    }
}
