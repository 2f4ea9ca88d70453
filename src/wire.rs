use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
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
use tokio::net::TcpStream;
use tracing::debug;
use ulid::Ulid;

use crate::booking::{AvailabilityMode, BookingError, BookingRequest};
use crate::model::{EventInfo, Span};
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::service::BookingService;
use crate::sql::{self, Command, SqlError};
use crate::store::{Store, StoreError};

// ── Auth ─────────────────────────────────────────────────────────

/// Single shared password for every user.
#[derive(Debug)]
pub struct PasswordSource {
    password: String,
}

impl PasswordSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for PasswordSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn boolean(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn venues_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name")]
}

fn zones_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("venue_id"), text("name")]
}

fn events_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("title"), int8("start_at"), text("description"), text("scope")]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("event_id"),
        text("venue_id"),
        int8("start"),
        int8("end"),
        text("zone_ids"),
        text("comment"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![text("venue_id"), text("venue_name"), text("mode"), text("zone_ids")]
}

fn zone_availability_schema() -> Vec<FieldInfo> {
    vec![text("zone_id"), text("zone_name"), boolean("free")]
}

/// Row layout of a `SELECT`, judged from its `FROM` target. Works on statements that
/// still carry `$n` placeholders.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let mut words = lower.split(|c: char| c.is_whitespace() || c == ';');
    if words.next() != Some("select") {
        return vec![];
    }
    let table = words
        .by_ref()
        .skip_while(|w| *w != "from")
        .nth(1)
        .unwrap_or_default();
    match table.trim_matches('"') {
        "venues" => venues_schema(),
        "zones" => zones_schema(),
        "events" => events_schema(),
        "reservations" => reservations_schema(),
        "availability" => availability_schema(),
        "zone_availability" => zone_availability_schema(),
        _ => vec![],
    }
}

fn rows_response<T>(
    schema: Vec<FieldInfo>,
    items: impl IntoIterator<Item = T>,
    encode: impl Fn(&mut DataRowEncoder, T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .into_iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a Ulid>) -> String {
    ids.into_iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

fn executed(tag: &str) -> PgWireResult<Vec<Response>> {
    Ok(vec![Response::Execution(Tag::new(tag).with_rows(1))])
}

// ── Handler ──────────────────────────────────────────────────────

pub struct VenueBookHandler {
    service: BookingService<Store>,
    query_parser: Arc<VenueBookQueryParser>,
}

impl VenueBookHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            service: BookingService::new(store),
            query_parser: Arc::new(VenueBookQueryParser),
        }
    }

    fn store(&self) -> &Store {
        self.service.store()
    }

    async fn run(&self, query: &str) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        debug!(command = label, "executing");

        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertVenue { id, name } => {
                self.store().create_venue(id, name).await.map_err(store_err)?;
                executed("INSERT")
            }
            Command::InsertZone { id, venue_id, name } => {
                self.store()
                    .create_zone(id, venue_id, name)
                    .await
                    .map_err(store_err)?;
                executed("INSERT")
            }
            Command::InsertEvent {
                id,
                title,
                start_at,
                description,
                scope,
            } => {
                let event = EventInfo::new(id, title, start_at)
                    .with_description(description.as_deref().unwrap_or_default())
                    .with_scope(scope);
                self.store().create_event(event).await.map_err(store_err)?;
                executed("INSERT")
            }
            Command::InsertReservation {
                id,
                event_id,
                venue_id,
                start,
                end,
                zone_ids,
                comment,
            } => {
                let span = Span::new(start, end).map_err(booking_err)?;
                let request = BookingRequest::new(venue_id, span, zone_ids, event_id, &comment).with_id(id);
                self.service.confirm(&request).await.map_err(booking_err)?;
                executed("INSERT")
            }
            Command::RescheduleReservation { id, start, end } => {
                let span = Span::new(start, end).map_err(booking_err)?;
                self.service.reschedule(id, span).await.map_err(booking_err)?;
                executed("UPDATE")
            }
            Command::DeleteVenue { id } => {
                self.store().delete_venue(id).await.map_err(store_err)?;
                executed("DELETE")
            }
            Command::DeleteZone { id } => {
                self.store().delete_zone(id).await.map_err(store_err)?;
                executed("DELETE")
            }
            Command::DeleteEvent { id } => {
                self.store().delete_event(id).await.map_err(store_err)?;
                executed("DELETE")
            }
            Command::DeleteReservation { id } => {
                self.service.cancel(id).await.map_err(booking_err)?;
                executed("DELETE")
            }
            Command::SelectVenues => {
                let venues = self.store().list_venues().await;
                Ok(vec![rows_response(venues_schema(), venues, |enc, v| {
                    enc.encode_field(&v.id.to_string())?;
                    enc.encode_field(&v.name)
                })])
            }
            Command::SelectZones { venue_id } => {
                let zones = self.store().list_zones(venue_id).await;
                Ok(vec![rows_response(zones_schema(), zones, |enc, z| {
                    enc.encode_field(&z.id.to_string())?;
                    enc.encode_field(&z.venue_id.to_string())?;
                    enc.encode_field(&z.name)
                })])
            }
            Command::SelectEvents => {
                let events = self.store().list_events().await;
                Ok(vec![rows_response(events_schema(), events, |enc, e| {
                    enc.encode_field(&e.id.to_string())?;
                    enc.encode_field(&e.title)?;
                    enc.encode_field(&e.start_at)?;
                    enc.encode_field(&e.description.unwrap_or_default())?;
                    enc.encode_field(&e.scope.as_str().to_string())
                })])
            }
            Command::SelectReservations { venue_id, event_id } => {
                let reservations = self.store().list_reservations(venue_id, event_id).await;
                Ok(vec![rows_response(reservations_schema(), reservations, |enc, r| {
                    enc.encode_field(&r.id.to_string())?;
                    enc.encode_field(&r.event_id.to_string())?;
                    enc.encode_field(&r.venue_id.to_string())?;
                    enc.encode_field(&r.span.start)?;
                    enc.encode_field(&r.span.end)?;
                    enc.encode_field(&join_ids(&r.zone_ids))?;
                    enc.encode_field(&r.comment.unwrap_or_default())
                })])
            }
            Command::SelectAvailability { start, end } => {
                let window = Span::new(start, end).map_err(booking_err)?;
                let results = self.service.find_available(window).await.map_err(booking_err)?;
                Ok(vec![rows_response(availability_schema(), results, |enc, result| {
                    let (mode, zone_ids) = match &result.mode {
                        AvailabilityMode::WholeVenue => ("whole", Vec::new()),
                        AvailabilityMode::PartialZones(zones) => {
                            ("partial", zones.iter().map(|z| z.id.to_string()).collect())
                        }
                    };
                    let zone_json = serde_json::to_string(&zone_ids)
                        .map_err(|e| PgWireError::ApiError(Box::new(e)))?;
                    enc.encode_field(&result.venue.id.to_string())?;
                    enc.encode_field(&result.venue.name)?;
                    enc.encode_field(&mode.to_string())?;
                    enc.encode_field(&zone_json)
                })])
            }
            Command::SelectZoneAvailability { venue_id, start, end } => {
                let window = Span::new(start, end).map_err(booking_err)?;
                let states = self
                    .service
                    .zone_states(window, venue_id)
                    .await
                    .map_err(booking_err)?;
                Ok(vec![rows_response(zone_availability_schema(), states, |enc, s| {
                    enc.encode_field(&s.zone.id.to_string())?;
                    enc.encode_field(&s.zone.name)?;
                    enc.encode_field(&s.free)
                })])
            }
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for VenueBookHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct VenueBookQueryParser;

#[async_trait]
impl QueryParser for VenueBookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for VenueBookHandler {
    type Statement = String;
    type QueryParser = VenueBookQueryParser;

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
        self.run(&sql)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| sql_err(SqlError::Empty))
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
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
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
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
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

/// Inline bound text parameters as quoted literals. Highest index first so `$1`
/// never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct VenueBookFactory {
    handler: Arc<VenueBookHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<PasswordSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl VenueBookFactory {
    pub fn new(store: Arc<Store>, password: String) -> Self {
        Self {
            handler: Arc::new(VenueBookHandler::new(store)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                PasswordSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for VenueBookFactory {
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

/// Serve one client until it disconnects.
pub async fn process_connection(socket: TcpStream, factory: Arc<VenueBookFactory>) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, None, factory)
        .await
        .map_err(|e| io::Error::other(e.to_string()))
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// SQLSTATE for a store failure: serialization failure for conflicts.
fn store_code(e: &StoreError) -> &'static str {
    match e {
        StoreError::Conflict(_) => "40001",
        _ => "P0001",
    }
}

fn booking_code(e: &BookingError) -> &'static str {
    match e {
        BookingError::Store(inner) => store_code(inner),
        e if e.is_retryable() => "40001",
        _ => "P0001",
    }
}

fn store_err(e: StoreError) -> PgWireError {
    user_error(store_code(&e), e.to_string())
}

fn booking_err(e: BookingError) -> PgWireError {
    user_error(booking_code(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_counted_by_highest_index() {
        assert_eq!(count_params("SELECT * FROM venues"), 0);
        assert_eq!(count_params("DELETE FROM venues WHERE id = $1"), 1);
        assert_eq!(count_params("INSERT INTO zones (id, venue_id, name) VALUES ($1, $3, $2)"), 3);
        assert_eq!(count_params("SELECT 1 WHERE x = $10"), 10);
    }

    #[test]
    fn schema_follows_from_target() {
        assert_eq!(result_schema("SELECT * FROM venues").len(), 2);
        assert_eq!(result_schema("select * from reservations where venue_id = $1").len(), 7);
        assert_eq!(
            result_schema(r#"SELECT * FROM availability WHERE start >= $1 AND "end" <= $2"#).len(),
            4
        );
        assert_eq!(result_schema("SELECT * FROM zone_availability WHERE venue_id = $1").len(), 3);
        assert!(result_schema("DELETE FROM venues WHERE id = $1").is_empty());
        assert!(result_schema("SELECT * FROM nowhere").is_empty());
    }

    #[test]
    fn error_codes() {
        let id = Ulid::new();
        assert_eq!(booking_code(&BookingError::Obsolete { conflicts: vec![id] }), "40001");
        assert_eq!(booking_code(&BookingError::PersistenceConflict(id)), "40001");
        assert_eq!(booking_code(&BookingError::Unavailable), "P0001");
        assert_eq!(booking_code(&BookingError::Store(StoreError::ZoneInUse(id))), "P0001");
        assert_eq!(booking_code(&BookingError::Store(StoreError::Conflict(id))), "40001");
        assert_eq!(store_code(&StoreError::NotFound(id)), "P0001");
    }

    #[test]
    fn ids_join_with_commas() {
        let a = Ulid::new();
        let b = Ulid::new();
        assert_eq!(join_ids([&a, &b]), format!("{a},{b}"));
        assert_eq!(join_ids(std::iter::empty()), "");
    }
}
