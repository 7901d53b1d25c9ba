//! This file defines the `Transaction` type, the types needed to create a
//! transaction and the API routes for the transaction type.
//! A transaction records a single event where money was earned or spent.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{AppState, Error};

/// The calendar-date format used on the wire and in the database.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Whether a transaction (or category) represents money coming in or going
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in, e.g. a salary payment.
    Receita,
    /// Money going out, e.g. a grocery purchase.
    Despesa,
}

impl TransactionKind {
    /// The wire and database representation of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Receita => "receita",
            TransactionKind::Despesa => "despesa",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receita" => Ok(TransactionKind::Receita),
            "despesa" => Ok(TransactionKind::Despesa),
            _ => Err(Error::InvalidTransactionKind),
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// The ID of a transaction.
pub type TransactionId = i64;

/// An expense or income, i.e. an event where money was either spent or
/// earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// Whether the transaction is income or an expense.
    pub tipo: TransactionKind,
    /// The category label, optionally of the form "Category > Subcategory".
    pub categoria: String,
    /// The amount of money that changed hands.
    pub valor: f64,
    /// An optional description of what the transaction was for.
    pub descricao: Option<String>,
    /// When the transaction happened.
    pub data: Date,
    /// When the record was created, as stored by the database.
    pub criado_em: String,
}

/// The client-supplied fields for creating or updating a transaction.
///
/// All fields are optional at the serde level so that absent values produce
/// this API's validation error instead of a deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionPayload {
    /// The transaction kind, expected to be "receita" or "despesa".
    pub tipo: Option<String>,
    /// The category label.
    pub categoria: Option<String>,
    /// The amount of money that changed hands.
    pub valor: Option<f64>,
    /// An optional description.
    pub descricao: Option<String>,
    /// The calendar date as "YYYY-MM-DD".
    pub data: Option<String>,
}

/// A transaction payload that has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether the transaction is income or an expense.
    pub tipo: TransactionKind,
    /// The category label.
    pub categoria: String,
    /// The amount of money that changed hands.
    pub valor: f64,
    /// An optional description.
    pub descricao: Option<String>,
    /// When the transaction happened.
    pub data: Date,
}

impl TransactionPayload {
    /// Check the payload against the rules for creating or updating a
    /// transaction.
    ///
    /// An empty `descricao` is normalised to `None`. A `valor` of zero is
    /// rejected the same as an absent one.
    ///
    /// # Errors
    /// Returns [Error::MissingTransactionFields] if a required field is
    /// absent or empty, [Error::InvalidTransactionKind] if `tipo` is not a
    /// valid kind, or [Error::InvalidTransactionDate] if `data` is not a
    /// calendar date.
    pub fn validate(self) -> Result<NewTransaction, Error> {
        let tipo = self
            .tipo
            .filter(|tipo| !tipo.is_empty())
            .ok_or(Error::MissingTransactionFields)?;
        let categoria = self
            .categoria
            .filter(|categoria| !categoria.is_empty())
            .ok_or(Error::MissingTransactionFields)?;
        let valor = self
            .valor
            .filter(|valor| *valor != 0.0)
            .ok_or(Error::MissingTransactionFields)?;
        let data = self
            .data
            .filter(|data| !data.is_empty())
            .ok_or(Error::MissingTransactionFields)?;

        let tipo = tipo.parse()?;
        let data = Date::parse(&data, DATE_FORMAT).map_err(|_| Error::InvalidTransactionDate)?;

        Ok(NewTransaction {
            tipo,
            categoria,
            valor,
            descricao: self.descricao.filter(|descricao| !descricao.is_empty()),
            data,
        })
    }
}

/// A calendar-month filter parsed from the `mes` and `ano` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthFilter {
    /// The month number, 1-12.
    pub mes: u8,
    /// The calendar year.
    pub ano: i32,
}

impl MonthFilter {
    /// Build a filter only when both the month and the year were supplied.
    pub fn from_query(mes: Option<u8>, ano: Option<i32>) -> Option<Self> {
        match (mes, ano) {
            (Some(mes), Some(ano)) => Some(Self { mes, ano }),
            _ => None,
        }
    }

    /// The zero-padded month string compared against `strftime('%m', data)`.
    pub(crate) fn month_param(self) -> String {
        format!("{:02}", self.mes)
    }

    /// The year string compared against `strftime('%Y', data)`.
    pub(crate) fn year_param(self) -> String {
        self.ano.to_string()
    }
}

/// The state needed for listing transactions.
#[derive(Debug, Clone)]
pub struct ListTransactionsEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListTransactionsEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for retrieving a single transaction.
#[derive(Debug, Clone)]
pub struct GetTransactionEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for GetTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for updating a transaction.
#[derive(Debug, Clone)]
pub struct UpdateTransactionEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UpdateTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a transaction.
#[derive(Debug, Clone)]
pub struct DeleteTransactionEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Query parameters accepted by the transaction listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    /// The month to filter by, 1-12.
    pub mes: Option<u8>,
    /// The year to filter by.
    pub ano: Option<i32>,
}

/// A route handler for listing transactions, newest first.
///
/// The list is filtered to a single calendar month only when both `mes` and
/// `ano` are present in the query string.
pub async fn get_transactions_endpoint(
    State(state): State<ListTransactionsEndpointState>,
    Query(query): Query<TransactionListQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let filter = MonthFilter::from_query(query.mes, query.ano);

    match get_all_transactions(filter, &connection) {
        Ok(transactions) => Json(transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for creating a new transaction.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionEndpointState>,
    Json(payload): Json<TransactionPayload>,
) -> Response {
    let new_transaction = match payload.validate() {
        Ok(new_transaction) => new_transaction,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_transaction(new_transaction, &connection) {
        Ok(transaction) => (
            StatusCode::CREATED,
            Json(json!({
                "id": transaction.id,
                "mensagem": "Transação criada com sucesso",
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for retrieving a single transaction.
pub async fn get_transaction_endpoint(
    Path(transaction_id): Path<TransactionId>,
    State(state): State<GetTransactionEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_transaction(transaction_id, &connection) {
        Ok(transaction) => Json(transaction).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for updating a transaction.
pub async fn update_transaction_endpoint(
    Path(transaction_id): Path<TransactionId>,
    State(state): State<UpdateTransactionEndpointState>,
    Json(payload): Json<TransactionPayload>,
) -> Response {
    let new_transaction = match payload.validate() {
        Ok(new_transaction) => new_transaction,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match update_transaction(transaction_id, new_transaction, &connection) {
        Ok(()) => Json(json!({ "mensagem": "Transação atualizada com sucesso" })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for deleting a transaction.
pub async fn delete_transaction_endpoint(
    Path(transaction_id): Path<TransactionId>,
    State(state): State<DeleteTransactionEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_transaction(transaction_id, &connection) {
        Ok(()) => Json(json!({ "mensagem": "Transação deletada com sucesso" })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a transaction in the database.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "INSERT INTO transacoes (tipo, categoria, valor, descricao, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, tipo, categoria, valor, descricao, data, criado_em",
        )?
        .query_row(
            (
                new_transaction.tipo,
                new_transaction.categoria,
                new_transaction.valor,
                new_transaction.descricao,
                new_transaction.data,
            ),
            map_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve the transaction with `id` from the database.
///
/// # Errors
/// This function will return an [Error::TransactionNotFound] if `id` does not
/// refer to a transaction, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, tipo, categoria, valor, descricao, data, criado_em
             FROM transacoes WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::TransactionNotFound,
            error => Error::SqlError(error),
        })
}

/// Retrieve transactions from the database, newest first, optionally
/// restricted to a calendar month.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_transactions(
    filter: Option<MonthFilter>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    match filter {
        Some(filter) => connection
            .prepare(
                "SELECT id, tipo, categoria, valor, descricao, data, criado_em
                 FROM transacoes
                 WHERE strftime('%m', data) = ?1 AND strftime('%Y', data) = ?2
                 ORDER BY data DESC, criado_em DESC",
            )?
            .query_map((filter.month_param(), filter.year_param()), map_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
            .collect(),
        None => connection
            .prepare(
                "SELECT id, tipo, categoria, valor, descricao, data, criado_em
                 FROM transacoes
                 ORDER BY data DESC, criado_em DESC",
            )?
            .query_map([], map_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
            .collect(),
    }
}

/// Overwrite the transaction with `id` in the database.
///
/// # Errors
/// This function will return an [Error::TransactionNotFound] if `id` does not
/// refer to a transaction, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn update_transaction(
    id: TransactionId,
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE transacoes
         SET tipo = ?1, categoria = ?2, valor = ?3, descricao = ?4, data = ?5
         WHERE id = ?6",
        (
            new_transaction.tipo,
            new_transaction.categoria,
            new_transaction.valor,
            new_transaction.descricao,
            new_transaction.data,
            id,
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::TransactionNotFound);
    }

    Ok(())
}

/// Delete the transaction with `id` from the database.
///
/// # Errors
/// This function will return an [Error::TransactionNotFound] if `id` does not
/// refer to a transaction, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn delete_transaction(id: TransactionId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM transacoes WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::TransactionNotFound);
    }

    Ok(())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS transacoes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tipo TEXT NOT NULL,
            categoria TEXT NOT NULL,
            valor REAL NOT NULL,
            descricao TEXT,
            data TEXT NOT NULL,
            criado_em TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_transacoes_data ON transacoes(data);
        CREATE INDEX IF NOT EXISTS idx_transacoes_categoria ON transacoes(categoria);",
    )
}

fn map_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        tipo: row.get(1)?,
        categoria: row.get(2)?,
        valor: row.get(3)?,
        descricao: row.get(4)?,
        data: row.get(5)?,
        criado_em: row.get(6)?,
    })
}




#[cfg(test)]
mod transaction_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::Response,
    };
    use rusqlite::Connection;
    use serde_json::Value;

    use crate::db::initialize;

    use super::{
        CreateTransactionEndpointState, GetTransactionEndpointState, TransactionPayload,
        create_transaction_endpoint, get_transaction_endpoint,
    };

    fn get_db_connection() -> Arc<Mutex<Connection>> {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        Arc::new(Mutex::new(connection))
    }

    async fn parse_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        serde_json::from_slice(&body).expect("Response body was not valid JSON")
    }

    #[tokio::test]
    async fn create_transaction_endpoint_returns_created_id() {
        let state = CreateTransactionEndpointState {
            db_connection: get_db_connection(),
        };
        let payload = TransactionPayload {
            tipo: Some("receita".to_string()),
            categoria: Some("Salário".to_string()),
            valor: Some(4200.0),
            descricao: None,
            data: Some("2024-05-05".to_string()),
        };

        let response = create_transaction_endpoint(State(state), Json(payload)).await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let body = parse_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["mensagem"], "Transação criada com sucesso");
    }

    #[tokio::test]
    async fn create_transaction_endpoint_rejects_unknown_tipo_before_storage() {
        let db_connection = get_db_connection();
        let state = CreateTransactionEndpointState {
            db_connection: db_connection.clone(),
        };
        let payload = TransactionPayload {
            tipo: Some("outro".to_string()),
            categoria: Some("Salário".to_string()),
            valor: Some(100.0),
            descricao: None,
            data: Some("2024-05-05".to_string()),
        };

        let response = create_transaction_endpoint(State(state), Json(payload)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = parse_json(response).await;
        assert_eq!(body["erro"], "Tipo deve ser \"receita\" ou \"despesa\"");

        let transaction_count: i64 = db_connection
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM transacoes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(transaction_count, 0, "Nothing should have been inserted");
    }

    #[tokio::test]
    async fn get_transaction_endpoint_with_invalid_id_returns_json_404() {
        let state = GetTransactionEndpointState {
            db_connection: get_db_connection(),
        };

        let response = get_transaction_endpoint(Path(999_999), State(state)).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = parse_json(response).await;
        assert_eq!(body["erro"], "Transação não encontrada");
    }
}
