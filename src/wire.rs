use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::SpacebookAuthSource;
use crate::booking::{BookingError, Bookings, ErrorKind};
use crate::model::*;
use crate::observability::{COMMAND_DURATION_SECONDS, COMMANDS_TOTAL, command_label};
use crate::resolver::resolve;
use crate::sql::{self, Command};

pub struct BookingHandler {
    bookings: Arc<Bookings>,
    query_parser: Arc<BookingQueryParser>,
}

impl BookingHandler {
    pub fn new(bookings: Arc<Bookings>) -> Self {
        Self {
            bookings,
            query_parser: Arc::new(BookingQueryParser),
        }
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.dispatch(cmd).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result.map_err(booking_err)
    }

    async fn dispatch(&self, cmd: Command) -> Result<Response, BookingError> {
        let b = &self.bookings;
        match cmd {
            Command::CreateBooking { kind, booking } => {
                let kind = resolve(&kind)?.kind;
                let created = b.create(kind, booking).await?;
                Ok(booking_response(vec![created]))
            }
            Command::CancelBooking { kind, id } => {
                let kind = resolve(&kind)?.kind;
                b.cancel(kind, id).await?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::UpdateBooking { kind, id, patch } => {
                let kind = resolve(&kind)?.kind;
                let updated = b.update(kind, id, patch).await?;
                Ok(booking_response(vec![updated]))
            }
            Command::ApproveBookings { unique_tag } => {
                let approved = b.approve(&unique_tag).await?;
                Ok(Response::Execution(
                    Tag::new("INSERT").with_rows(approved as usize),
                ))
            }
            Command::GetBooking { kind, id } => {
                let kind = resolve(&kind)?.kind;
                let booking = b.get_by_id(kind, id).await?;
                Ok(page_response(BookingPage {
                    bookings: vec![booking],
                    total_count: 1,
                    page: 1,
                    page_size: b.page_size(),
                    total_pages: 1,
                }))
            }
            Command::ListBookings { kind, query } => {
                let kind = resolve(&kind)?.kind;
                Ok(page_response(b.get_bookings(kind, query).await?))
            }
            Command::SelectTimeSlots {
                kind,
                resource_id,
                date,
            } => {
                let kind = resolve(&kind)?.kind;
                Ok(slots_response(b.time_slots(kind, resource_id, date).await?))
            }
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn varchar(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        int8("id"),
        varchar("user_id"),
        int8("resource_id"),
        int8("start_time"),
        int8("end_time"),
        varchar("status"),
        int8("created_at"),
        int8("updated_at"),
    ]
}

fn page_schema() -> Vec<FieldInfo> {
    let mut fields = booking_schema();
    fields.extend([int8("total_count"), int8("page"), int8("total_pages")]);
    fields
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        int8("start"),
        int8("end"),
        FieldInfo::new("busy".into(), None, None, Type::BOOL, FieldFormat::Text),
    ]
}

fn encode_booking(encoder: &mut DataRowEncoder, b: &Booking) -> PgWireResult<()> {
    encoder.encode_field(&b.id)?;
    encoder.encode_field(&b.user_id)?;
    encoder.encode_field(&b.resource_id)?;
    encoder.encode_field(&b.start_time)?;
    encoder.encode_field(&b.end_time)?;
    encoder.encode_field(&b.status.as_str().to_string())?;
    encoder.encode_field(&b.created_at)?;
    encoder.encode_field(&b.updated_at)?;
    Ok(())
}

fn booking_response(bookings: Vec<Booking>) -> Response {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode_booking(&mut encoder, b)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn page_response(page: BookingPage) -> Response {
    let schema = Arc::new(page_schema());
    let rows: Vec<PgWireResult<_>> = page
        .bookings
        .iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode_booking(&mut encoder, b)?;
            encoder.encode_field(&page.total_count)?;
            encoder.encode_field(&page.page)?;
            encoder.encode_field(&page.total_pages)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn slots_response(slots: Vec<TimeSlot>) -> Response {
    let schema = Arc::new(slots_schema());
    let rows: Vec<PgWireResult<_>> = slots
        .iter()
        .map(|slot| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&slot.start)?;
            encoder.encode_field(&slot.end)?;
            encoder.encode_field(&slot.busy)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Row shape a statement will produce, decided from its text alone so it can
/// be described before parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.trim_start().to_uppercase();
    if upper.starts_with("SELECT") && upper.contains("_SLOTS") {
        slots_schema()
    } else if upper.starts_with("SELECT") && upper.contains("_BOOKINGS") {
        page_schema()
    } else if (upper.starts_with("INSERT") || upper.starts_with("UPDATE"))
        && upper.contains("_BOOKINGS")
    {
        booking_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for BookingHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        Ok(vec![self.execute_command(cmd).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BookingQueryParser;

#[async_trait]
impl QueryParser for BookingQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BookingHandler {
    type Statement = String;
    type QueryParser = BookingQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.execute_command(cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute `$1`, `$2`, ... with bound parameter values (text format) in one
/// left-to-right pass, so bound text is never rescanned for placeholders.
fn substitute_params(portal: &Portal<String>) -> String {
    let values: Vec<String> = portal
        .parameters
        .iter()
        .map(|param| match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        })
        .collect();
    substitute(&portal.statement.statement, &values)
}

fn substitute(sql: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let value = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| values.get(i));
        match value {
            Some(v) => out.push_str(v),
            None => out.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BookingFactory {
    handler: Arc<BookingHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<SpacebookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl BookingFactory {
    pub fn new(bookings: Arc<Bookings>, user: String, password: String) -> Self {
        let auth_source = SpacebookAuthSource::new(user, password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BookingHandler::new(bookings)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BookingFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    bookings: Arc<Bookings>,
    user: String,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(BookingFactory::new(bookings, user, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "22023",
        ErrorKind::UnsupportedType => "42P01",
        ErrorKind::ResourceUnavailable => "23P01",
        ErrorKind::RemoteUnavailable => "08006",
        ErrorKind::StoreFailure => "58000",
        ErrorKind::NotFound => "P0002",
    }
}

fn booking_err(e: BookingError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(e.kind()).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
