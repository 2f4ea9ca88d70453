use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertVenue {
        id: Ulid,
        name: String,
    },
    InsertZone {
        id: Ulid,
        venue_id: Ulid,
        name: String,
    },
    InsertEvent {
        id: Ulid,
        title: String,
        start_at: Ms,
        description: Option<String>,
        scope: Scope,
    },
    /// Runs the full confirm workflow. Empty `zone_ids` books the whole venue.
    InsertReservation {
        id: Ulid,
        event_id: Ulid,
        venue_id: Ulid,
        start: Ms,
        end: Ms,
        zone_ids: Vec<Ulid>,
        comment: String,
    },
    RescheduleReservation {
        id: Ulid,
        start: Ms,
        end: Ms,
    },
    DeleteVenue {
        id: Ulid,
    },
    DeleteZone {
        id: Ulid,
    },
    DeleteEvent {
        id: Ulid,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectVenues,
    SelectZones {
        venue_id: Option<Ulid>,
    },
    SelectEvents,
    SelectReservations {
        venue_id: Option<Ulid>,
        event_id: Option<Ulid>,
    },
    SelectAvailability {
        start: Ms,
        end: Ms,
    },
    SelectZoneAvailability {
        venue_id: Ulid,
        start: Ms,
        end: Ms,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// One `INSERT` row keyed by column name. Without a column list the values bind to
/// the table's columns in declaration order.
struct InsertRow<'a> {
    table: &'static str,
    cells: Vec<(String, &'a Expr)>,
}

impl<'a> InsertRow<'a> {
    /// `columns` lists the table's columns in order; the first `required` must be given.
    fn bind(
        table: &'static str,
        columns: &[&'static str],
        required: usize,
        names: &[ast::Ident],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let names: Vec<String> = if names.is_empty() {
            if values.len() < required || values.len() > columns.len() {
                return Err(SqlError::WrongArity(table, required, values.len()));
            }
            columns.iter().take(values.len()).map(|c| c.to_string()).collect()
        } else {
            if names.len() != values.len() {
                return Err(SqlError::Parse(format!(
                    "{table}: {} columns but {} values",
                    names.len(),
                    values.len()
                )));
            }
            names.iter().map(|n| n.value.to_lowercase()).collect()
        };

        for (i, name) in names.iter().enumerate() {
            if !columns.contains(&name.as_str()) {
                return Err(SqlError::UnknownColumn(table, name.clone()));
            }
            if names[..i].contains(name) {
                return Err(SqlError::Parse(format!("{table}: column {name} given twice")));
            }
        }
        if let Some(&missing) = columns[..required].iter().find(|&&c| !names.iter().any(|n| n == c)) {
            return Err(SqlError::MissingColumn(table, missing));
        }

        Ok(Self {
            table,
            cells: names.into_iter().zip(values).collect(),
        })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, expr)| *expr)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(self.table, column))
    }
}

const VENUE_COLUMNS: &[&str] = &["id", "name"];
const ZONE_COLUMNS: &[&str] = &["id", "venue_id", "name"];
const EVENT_COLUMNS: &[&str] = &["id", "title", "start_at", "description", "scope"];
const RESERVATION_COLUMNS: &[&str] = &["id", "event_id", "venue_id", "start", "end", "zone_ids", "comment"];
const RESCHEDULE_COLUMNS: &[&str] = &["reservation_id", "start", "end"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns = &insert.columns;

    match table.as_str() {
        "venues" => {
            let row = InsertRow::bind("venues", VENUE_COLUMNS, 2, columns, &values)?;
            Ok(Command::InsertVenue {
                id: parse_ulid_expr(row.require("id")?)?,
                name: parse_string_expr(row.require("name")?)?,
            })
        }
        "zones" => {
            let row = InsertRow::bind("zones", ZONE_COLUMNS, 3, columns, &values)?;
            Ok(Command::InsertZone {
                id: parse_ulid_expr(row.require("id")?)?,
                venue_id: parse_ulid_expr(row.require("venue_id")?)?,
                name: parse_string_expr(row.require("name")?)?,
            })
        }
        "events" => {
            let row = InsertRow::bind("events", EVENT_COLUMNS, 3, columns, &values)?;
            let description = match row.get("description") {
                Some(expr) => parse_string_or_null(expr)?,
                None => None,
            };
            let scope = match row.get("scope") {
                Some(expr) => match parse_string_or_null(expr)? {
                    Some(s) => s.parse::<Scope>().map_err(SqlError::Parse)?,
                    None => Scope::default(),
                },
                None => Scope::default(),
            };
            Ok(Command::InsertEvent {
                id: parse_ulid_expr(row.require("id")?)?,
                title: parse_string_expr(row.require("title")?)?,
                start_at: parse_i64_expr(row.require("start_at")?)?,
                description,
                scope,
            })
        }
        "reservations" => {
            let row = InsertRow::bind("reservations", RESERVATION_COLUMNS, 5, columns, &values)?;
            let zone_ids = match row.get("zone_ids") {
                Some(expr) => parse_ulid_list_expr(expr)?,
                None => Vec::new(),
            };
            let comment = match row.get("comment") {
                Some(expr) => parse_string_or_null(expr)?.unwrap_or_default(),
                None => String::new(),
            };
            Ok(Command::InsertReservation {
                id: parse_ulid_expr(row.require("id")?)?,
                event_id: parse_ulid_expr(row.require("event_id")?)?,
                venue_id: parse_ulid_expr(row.require("venue_id")?)?,
                start: parse_i64_expr(row.require("start")?)?,
                end: parse_i64_expr(row.require("end")?)?,
                zone_ids,
                comment,
            })
        }
        "reschedules" => {
            let row = InsertRow::bind("reschedules", RESCHEDULE_COLUMNS, 3, columns, &values)?;
            Ok(Command::RescheduleReservation {
                id: parse_ulid_expr(row.require("reservation_id")?)?,
                start: parse_i64_expr(row.require("start")?)?,
                end: parse_i64_expr(row.require("end")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "venues" => Ok(Command::DeleteVenue { id }),
        "zones" => Ok(Command::DeleteZone { id }),
        "events" => Ok(Command::DeleteEvent { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Column filters pulled out of a `WHERE` clause joined by `AND`.
#[derive(Default)]
struct Filters {
    venue_id: Option<Ulid>,
    event_id: Option<Ulid>,
    start: Option<Ms>,
    end: Option<Ms>,
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(SqlError::Unsupported("non-SELECT query".into()));
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "venues" => Ok(Command::SelectVenues),
        "zones" => Ok(Command::SelectZones {
            venue_id: filters.venue_id,
        }),
        "events" => Ok(Command::SelectEvents),
        "reservations" => Ok(Command::SelectReservations {
            venue_id: filters.venue_id,
            event_id: filters.event_id,
        }),
        "availability" => Ok(Command::SelectAvailability {
            start: filters.start.ok_or(SqlError::MissingFilter("start"))?,
            end: filters.end.ok_or(SqlError::MissingFilter("end"))?,
        }),
        "zone_availability" => Ok(Command::SelectZoneAvailability {
            venue_id: filters.venue_id.ok_or(SqlError::MissingFilter("venue_id"))?,
            start: filters.start.ok_or(SqlError::MissingFilter("start"))?,
            end: filters.end.ok_or(SqlError::MissingFilter("end"))?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn collect_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return Err(SqlError::Unsupported(format!("filter {expr}")));
    };
    let column = expr_column_name(left);
    match (op, column.as_deref()) {
        (ast::BinaryOperator::And, _) => {
            collect_filters(left, filters)?;
            collect_filters(right, filters)?;
        }
        (ast::BinaryOperator::Eq, Some("venue_id")) => filters.venue_id = Some(parse_ulid_expr(right)?),
        (ast::BinaryOperator::Eq, Some("event_id")) => filters.event_id = Some(parse_ulid_expr(right)?),
        (ast::BinaryOperator::GtEq, Some("start")) => filters.start = Some(parse_i64_expr(right)?),
        (ast::BinaryOperator::LtEq, Some("end")) => filters.end = Some(parse_i64_expr(right)?),
        _ => return Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
    Ok(())
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
    let first = tables_with_joins
        .first()
        .ok_or_else(|| SqlError::Parse("DELETE without table".into()))?;
    table_factor_name(&first.relation)
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// The single row of an `INSERT ... VALUES`. Multi-row inserts are rejected.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    let SetExpr::Values(values) = body.body.as_ref() else {
        return Err(SqlError::Parse("expected VALUES".into()));
    };
    match values.rows.as_slice() {
        [] => Err(SqlError::Parse("empty VALUES".into())),
        [row] => Ok(row.clone()),
        _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
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

fn parse_ulid_str(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s.trim()).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => parse_ulid_str(s),
        Some(other) => Err(SqlError::Parse(format!("expected ULID string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// Comma-separated ULIDs. `NULL` and `''` are the empty list.
fn parse_ulid_list_expr(expr: &Expr) -> Result<Vec<Ulid>, SqlError> {
    let Some(list) = parse_string_or_null(expr)? else {
        return Ok(Vec::new());
    };
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_ulid_str)
        .collect()
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
        Some(other) => Err(SqlError::Parse(format!("expected number, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::UnknownColumn(t, col) => write!(f, "{t}: unknown column {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
