use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::*;

/// Parsed command from SQL input. `kind` is the booking-type prefix of the
/// table name (`workplace_bookings` → `"workplace"`), resolved by the caller.
#[derive(Debug, PartialEq)]
pub enum Command {
    CreateBooking {
        kind: String,
        booking: NewBooking,
    },
    CancelBooking {
        kind: String,
        id: BookingId,
    },
    UpdateBooking {
        kind: String,
        id: BookingId,
        patch: BookingPatch,
    },
    ApproveBookings {
        unique_tag: String,
    },
    GetBooking {
        kind: String,
        id: BookingId,
    },
    ListBookings {
        kind: String,
        query: BookingQuery,
    },
    SelectTimeSlots {
        kind: String,
        resource_id: ResourceId,
        date: Ms,
    },
}

const BOOKINGS_SUFFIX: &str = "_bookings";
const SLOTS_SUFFIX: &str = "_slots";
const APPROVALS: &str = "approvals";

/// Column order assumed by an INSERT without a column list.
const INSERT_COLUMNS: [&str; 5] = ["user_id", "resource_id", "start_time", "end_time", "status"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn bookings_kind(table: &str) -> Result<String, SqlError> {
    table
        .strip_suffix(BOOKINGS_SUFFIX)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SqlError::UnknownTable(table.to_string()))
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        INSERT_COLUMNS.iter().take(values.len()).map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("INSERT", columns.len(), values.len()));
    }

    if table == APPROVALS {
        let mut unique_tag = None;
        for (col, value) in columns.iter().zip(&values) {
            match col.as_str() {
                "unique_tag" => unique_tag = Some(parse_string_expr(value)?),
                other => return Err(SqlError::UnknownColumn(other.to_string())),
            }
        }
        return Ok(Command::ApproveBookings {
            unique_tag: unique_tag.ok_or(SqlError::MissingColumn("unique_tag"))?,
        });
    }

    let kind = bookings_kind(&table)?;
    let (mut user_id, mut resource_id, mut start, mut end) = (None, None, None, None);
    let mut status = BookingStatus::Pending;
    for (col, value) in columns.iter().zip(&values) {
        match col.as_str() {
            "user_id" => user_id = Some(parse_string_expr(value)?),
            "resource_id" => resource_id = Some(parse_i64_expr(value)?),
            "start_time" => start = Some(parse_i64_expr(value)?),
            "end_time" => end = Some(parse_i64_expr(value)?),
            "status" => status = parse_status_expr(value)?,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::CreateBooking {
        kind,
        booking: NewBooking {
            user_id: user_id.ok_or(SqlError::MissingColumn("user_id"))?,
            resource_id: resource_id.ok_or(SqlError::MissingColumn("resource_id"))?,
            start_time: start.ok_or(SqlError::MissingColumn("start_time"))?,
            end_time: end.ok_or(SqlError::MissingColumn("end_time"))?,
            status,
        },
    })
}

// ── DELETE / UPDATE ───────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let kind = bookings_kind(&table)?;
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::CancelBooking { kind, id })
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let kind = bookings_kind(&table)?;
    let id = extract_where_id(selection)?;

    let mut patch = BookingPatch::default();
    for assignment in assignments {
        let col = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            _ => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        match col.as_str() {
            "status" => patch.status = Some(parse_status_expr(&assignment.value)?),
            "start_time" => patch.start_time = Some(parse_i64_expr(&assignment.value)?),
            "end_time" => patch.end_time = Some(parse_i64_expr(&assignment.value)?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    Ok(Command::UpdateBooking { kind, id, patch })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = SelectFilters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, &mut filters)?;
    }

    if let Some(kind) = table.strip_suffix(SLOTS_SUFFIX).filter(|k| !k.is_empty()) {
        return Ok(Command::SelectTimeSlots {
            kind: kind.to_string(),
            resource_id: filters.resource_id.ok_or(SqlError::MissingFilter("resource_id"))?,
            date: filters.date.ok_or(SqlError::MissingFilter("date"))?,
        });
    }

    let kind = bookings_kind(&table)?;
    if let Some(id) = filters.id {
        if filters.has_list_filters() {
            return Err(SqlError::Unsupported(
                "id cannot be combined with other filters".into(),
            ));
        }
        return Ok(Command::GetBooking { kind, id });
    }
    Ok(Command::ListBookings {
        kind,
        query: BookingQuery {
            user_id: filters.user_id,
            resource_id: filters.resource_id,
            start_time: filters.start_time,
            end_time: filters.end_time,
            page: filters.page,
        },
    })
}

#[derive(Debug, Default)]
struct SelectFilters {
    id: Option<BookingId>,
    user_id: Option<String>,
    resource_id: Option<ResourceId>,
    start_time: Option<Ms>,
    end_time: Option<Ms>,
    page: Option<i64>,
    date: Option<Ms>,
}

impl SelectFilters {
    fn has_list_filters(&self) -> bool {
        self.user_id.is_some()
            || self.resource_id.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
            || self.page.is_some()
    }
}

fn extract_filters(expr: &Expr, out: &mut SelectFilters) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => extract_filters(inner, out),
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left);
            match (op, col.as_deref()) {
                (ast::BinaryOperator::And, _) => {
                    extract_filters(left, out)?;
                    extract_filters(right, out)
                }
                (ast::BinaryOperator::Eq, Some("id")) => {
                    out.id = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("user_id")) => {
                    out.user_id = Some(parse_string_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("resource_id")) => {
                    out.resource_id = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("page")) => {
                    out.page = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::Eq, Some("date")) => {
                    out.date = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::GtEq, Some("start_time")) => {
                    out.start_time = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                (ast::BinaryOperator::LtEq, Some("end_time")) => {
                    out.end_time = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
            }
        }
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<BookingId, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_i64_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_status_expr(expr: &Expr) -> Result<BookingStatus, SqlError> {
    let s = parse_string_expr(expr)?;
    s.parse()
        .map_err(|_| SqlError::Parse(format!("bad status: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("{0}: {1} columns but {2} values")]
    WrongArity(&'static str, usize, usize),
    #[error("missing column: {0}")]
    MissingColumn(&'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_create_booking() {
        let sql = "INSERT INTO workplace_bookings (user_id, resource_id, start_time, end_time) \
                   VALUES ('alice', 7, 1717405200000, 1717408800000)";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::CreateBooking { kind, booking } => {
                assert_eq!(kind, "workplace");
                assert_eq!(booking.user_id, "alice");
                assert_eq!(booking.resource_id, 7);
                assert_eq!(booking.start_time, 1717405200000);
                assert_eq!(booking.end_time, 1717408800000);
                assert_eq!(booking.status, BookingStatus::Pending);
            }
            _ => panic!("expected CreateBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_create_booking_with_status_positional() {
        let sql = "INSERT INTO parking_bookings VALUES ('bob', 3, 1000, 2000, 'working')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::CreateBooking { kind, booking } => {
                assert_eq!(kind, "parking");
                assert_eq!(booking.status, BookingStatus::Working);
            }
            _ => panic!("expected CreateBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn create_requires_every_field() {
        let sql = "INSERT INTO workplace_bookings (user_id, resource_id, start_time) VALUES ('a', 1, 1000)";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingColumn("end_time"))
        ));
    }

    #[test]
    fn create_rejects_unknown_column() {
        let sql = "INSERT INTO workplace_bookings (user_id, color) VALUES ('a', 'red')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn(c)) if c == "color"));
    }

    #[test]
    fn unknown_kind_is_passed_through() {
        let sql = "INSERT INTO boat_bookings (user_id, resource_id, start_time, end_time) VALUES ('a', 1, 1, 2)";
        match parse_sql(sql).unwrap() {
            Command::CreateBooking { kind, .. } => assert_eq!(kind, "boat"),
            other => panic!("expected CreateBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_approve() {
        let sql = "INSERT INTO approvals (unique_tag) VALUES ('desk-4F-12')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::ApproveBookings {
                unique_tag: "desk-4F-12".into()
            }
        );
    }

    #[test]
    fn parse_cancel() {
        let sql = "DELETE FROM parking_bookings WHERE id = 42";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::CancelBooking {
                kind: "parking".into(),
                id: 42
            }
        );
    }

    #[test]
    fn cancel_requires_id() {
        let sql = "DELETE FROM parking_bookings WHERE user_id = 'a'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_update() {
        let sql = "UPDATE workplace_bookings SET status = 'working', end_time = 5000 WHERE id = 9";
        match parse_sql(sql).unwrap() {
            Command::UpdateBooking { kind, id, patch } => {
                assert_eq!(kind, "workplace");
                assert_eq!(id, 9);
                assert_eq!(patch.status, Some(BookingStatus::Working));
                assert_eq!(patch.start_time, None);
                assert_eq!(patch.end_time, Some(5000));
            }
            other => panic!("expected UpdateBooking, got {other:?}"),
        }
    }

    #[test]
    fn update_rejects_other_columns() {
        let sql = "UPDATE workplace_bookings SET user_id = 'mallory' WHERE id = 9";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn(_))));
        let sql = "UPDATE workplace_bookings SET status = 'cancelled' WHERE id = 9";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_get_by_id() {
        let sql = "SELECT * FROM workplace_bookings WHERE id = 3";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::GetBooking {
                kind: "workplace".into(),
                id: 3
            }
        );
    }

    #[test]
    fn parse_list_with_filters() {
        let sql = "SELECT * FROM workplace_bookings WHERE user_id = 'alice' AND resource_id = 2 \
                   AND start_time >= 1000 AND end_time <= 9000 AND page = 2";
        match parse_sql(sql).unwrap() {
            Command::ListBookings { kind, query } => {
                assert_eq!(kind, "workplace");
                assert_eq!(query.user_id.as_deref(), Some("alice"));
                assert_eq!(query.resource_id, Some(2));
                assert_eq!(query.start_time, Some(1000));
                assert_eq!(query.end_time, Some(9000));
                assert_eq!(query.page, Some(2));
            }
            other => panic!("expected ListBookings, got {other:?}"),
        }
    }

    #[test]
    fn parse_list_without_filters() {
        let sql = "SELECT * FROM parking_bookings";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::ListBookings {
                kind: "parking".into(),
                query: BookingQuery::default()
            }
        );
    }

    #[test]
    fn id_with_other_filters_rejected() {
        let sql = "SELECT * FROM workplace_bookings WHERE id = 3 AND page = 2";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn unsupported_filter_rejected() {
        let sql = "SELECT * FROM workplace_bookings WHERE user_id = 'a' OR 1 = 1";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
        let sql = "SELECT * FROM workplace_bookings WHERE start_time <= 5";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_time_slots() {
        let sql = "SELECT * FROM workplace_slots WHERE resource_id = 4 AND date = 1717372800000";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectTimeSlots {
                kind: "workplace".into(),
                resource_id: 4,
                date: 1717372800000
            }
        );
        let sql = "SELECT * FROM workplace_slots WHERE resource_id = 4";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("date"))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM users"),
            Err(SqlError::UnknownTable(_))
        ));
        assert!(matches!(
            parse_sql("DELETE FROM _bookings WHERE id = 1"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
