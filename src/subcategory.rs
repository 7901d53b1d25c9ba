//! This file defines the `Subcategory` type, the types needed to create a
//! subcategory and the API routes for the subcategory type.
//! A subcategory is a second-level grouping under a category; the API always
//! returns it joined with its parent category's name and kind.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, Error, category::CategoryId, transaction::TransactionKind};

/// The ID of a subcategory.
pub type SubcategoryId = i64;

/// A second-level grouping under a category, e.g., 'Mercado' under
/// 'Alimentação'.
///
/// A transaction references a subcategory through its `categoria` label,
/// written as `"<category name> > <subcategory name>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    /// The ID of the subcategory.
    pub id: SubcategoryId,
    /// The ID of the parent category.
    pub categoria_id: CategoryId,
    /// The name of the subcategory.
    pub nome: String,
    /// When the record was created, as stored by the database.
    pub criado_em: String,
    /// The name of the parent category.
    pub categoria_nome: String,
    /// The kind of the parent category.
    pub categoria_tipo: TransactionKind,
}

/// The client-supplied fields for creating or updating a subcategory.
#[derive(Debug, Default, Deserialize)]
pub struct SubcategoryPayload {
    /// The ID of the parent category.
    pub categoria_id: Option<CategoryId>,
    /// The name of the subcategory.
    pub nome: Option<String>,
}

/// A subcategory payload that has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubcategory {
    /// The ID of the parent category.
    pub categoria_id: CategoryId,
    /// The name of the subcategory.
    pub nome: String,
}

impl SubcategoryPayload {
    /// Check the payload against the rules for creating or updating a
    /// subcategory.
    ///
    /// # Errors
    /// Returns [Error::MissingSubcategoryFields] if the parent category ID
    /// or the name is absent or empty.
    pub fn validate(self) -> Result<NewSubcategory, Error> {
        let categoria_id = self
            .categoria_id
            .filter(|categoria_id| *categoria_id != 0)
            .ok_or(Error::MissingSubcategoryFields)?;
        let nome = self
            .nome
            .filter(|nome| !nome.is_empty())
            .ok_or(Error::MissingSubcategoryFields)?;

        Ok(NewSubcategory { categoria_id, nome })
    }
}

/// The state needed for listing subcategories.
#[derive(Debug, Clone)]
pub struct ListSubcategoriesEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListSubcategoriesEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a subcategory.
#[derive(Debug, Clone)]
pub struct CreateSubcategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateSubcategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for retrieving a single subcategory.
#[derive(Debug, Clone)]
pub struct GetSubcategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for GetSubcategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for updating a subcategory.
#[derive(Debug, Clone)]
pub struct UpdateSubcategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UpdateSubcategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a subcategory.
#[derive(Debug, Clone)]
pub struct DeleteSubcategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteSubcategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Query parameters accepted by the subcategory listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubcategoryListQuery {
    /// An optional parent category to filter by.
    pub categoria_id: Option<CategoryId>,
}

/// A route handler for listing subcategories in alphabetical order.
pub async fn get_subcategories_endpoint(
    State(state): State<ListSubcategoriesEndpointState>,
    Query(query): Query<SubcategoryListQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_subcategories(query.categoria_id, &connection) {
        Ok(subcategories) => Json(subcategories).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for creating a new subcategory.
pub async fn create_subcategory_endpoint(
    State(state): State<CreateSubcategoryEndpointState>,
    Json(payload): Json<SubcategoryPayload>,
) -> Response {
    let new_subcategory = match payload.validate() {
        Ok(new_subcategory) => new_subcategory,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_subcategory(&new_subcategory, &connection) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({
                "id": id,
                "categoria_id": new_subcategory.categoria_id,
                "nome": new_subcategory.nome,
                "mensagem": "Subcategoria criada com sucesso",
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for retrieving a single subcategory.
pub async fn get_subcategory_endpoint(
    Path(subcategory_id): Path<SubcategoryId>,
    State(state): State<GetSubcategoryEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_subcategory(subcategory_id, &connection) {
        Ok(subcategory) => Json(subcategory).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for updating a subcategory.
pub async fn update_subcategory_endpoint(
    Path(subcategory_id): Path<SubcategoryId>,
    State(state): State<UpdateSubcategoryEndpointState>,
    Json(payload): Json<SubcategoryPayload>,
) -> Response {
    let new_subcategory = match payload.validate() {
        Ok(new_subcategory) => new_subcategory,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match update_subcategory(subcategory_id, new_subcategory, &connection) {
        Ok(()) => {
            Json(json!({ "mensagem": "Subcategoria atualizada com sucesso" })).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler for deleting a subcategory.
///
/// The delete is rejected while transactions still reference the
/// subcategory's full `"<category> > <subcategory>"` label.
pub async fn delete_subcategory_endpoint(
    Path(subcategory_id): Path<SubcategoryId>,
    State(state): State<DeleteSubcategoryEndpointState>,
) -> Response {
    let mut connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_subcategory(subcategory_id, &mut connection) {
        Ok(()) => Json(json!({ "mensagem": "Subcategoria deletada com sucesso" })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a subcategory in the database.
///
/// The parent category must exist; the foreign key on `categoria_id` is
/// enforced.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn create_subcategory(
    new_subcategory: &NewSubcategory,
    connection: &Connection,
) -> Result<SubcategoryId, Error> {
    connection.execute(
        "INSERT INTO subcategorias (categoria_id, nome) VALUES (?1, ?2)",
        (new_subcategory.categoria_id, new_subcategory.nome.as_str()),
    )?;

    Ok(connection.last_insert_rowid())
}

/// Retrieve the subcategory with `id` from the database, joined with its
/// parent category.
///
/// # Errors
/// This function will return an [Error::SubcategoryNotFound] if `id` does
/// not refer to a subcategory, or an [Error::SqlError] if there is some
/// other SQL error.
pub fn get_subcategory(
    id: SubcategoryId,
    connection: &Connection,
) -> Result<Subcategory, Error> {
    connection
        .prepare(
            "SELECT s.id, s.categoria_id, s.nome, s.criado_em, c.nome, c.tipo
             FROM subcategorias s
             JOIN categorias c ON s.categoria_id = c.id
             WHERE s.id = :id",
        )?
        .query_row(&[(":id", &id)], map_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::SubcategoryNotFound,
            error => Error::SqlError(error),
        })
}

/// Retrieve subcategories from the database in alphabetical order, joined
/// with their parent categories and optionally filtered by parent.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_subcategories(
    categoria_id: Option<CategoryId>,
    connection: &Connection,
) -> Result<Vec<Subcategory>, Error> {
    match categoria_id {
        Some(categoria_id) => connection
            .prepare(
                "SELECT s.id, s.categoria_id, s.nome, s.criado_em, c.nome, c.tipo
                 FROM subcategorias s
                 JOIN categorias c ON s.categoria_id = c.id
                 WHERE s.categoria_id = ?1
                 ORDER BY s.nome ASC",
            )?
            .query_map([categoria_id], map_row)?
            .map(|maybe_subcategory| maybe_subcategory.map_err(|error| error.into()))
            .collect(),
        None => connection
            .prepare(
                "SELECT s.id, s.categoria_id, s.nome, s.criado_em, c.nome, c.tipo
                 FROM subcategorias s
                 JOIN categorias c ON s.categoria_id = c.id
                 ORDER BY s.nome ASC",
            )?
            .query_map([], map_row)?
            .map(|maybe_subcategory| maybe_subcategory.map_err(|error| error.into()))
            .collect(),
    }
}

/// Overwrite the parent category and name of the subcategory with `id`.
///
/// # Errors
/// This function will return an [Error::SubcategoryNotFound] if `id` does
/// not refer to a subcategory, or an [Error::SqlError] if there is some
/// other SQL error.
pub fn update_subcategory(
    id: SubcategoryId,
    new_subcategory: NewSubcategory,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE subcategorias SET categoria_id = ?1, nome = ?2 WHERE id = ?3",
        (new_subcategory.categoria_id, new_subcategory.nome, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::SubcategoryNotFound);
    }

    Ok(())
}

/// Delete the subcategory with `id` from the database.
///
/// The lookup, the dependent-count check and the delete run inside a single
/// SQL transaction so that a concurrent write cannot slip between the guard
/// check and the delete.
///
/// # Errors
/// This function will return:
/// - [Error::SubcategoryNotFound] if `id` does not refer to a subcategory,
/// - [Error::SubcategoryHasTransactions] if transactions reference the
///   subcategory's full label,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_subcategory(id: SubcategoryId, connection: &mut Connection) -> Result<(), Error> {
    let sql_transaction = connection.transaction()?;

    let (subcategoria_nome, categoria_nome): (String, String) = sql_transaction
        .query_row(
            "SELECT s.nome, c.nome
             FROM subcategorias s
             JOIN categorias c ON s.categoria_id = c.id
             WHERE s.id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::SubcategoryNotFound,
            error => Error::SqlError(error),
        })?;

    let label = format!("{categoria_nome} > {subcategoria_nome}");

    let transaction_count: i64 = sql_transaction.query_row(
        "SELECT COUNT(*) FROM transacoes WHERE categoria = ?1",
        [&label],
        |row| row.get(0),
    )?;

    if transaction_count > 0 {
        return Err(Error::SubcategoryHasTransactions(transaction_count));
    }

    let rows_affected = sql_transaction.execute("DELETE FROM subcategorias WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::SubcategoryNotFound);
    }

    sql_transaction.commit()?;

    Ok(())
}

/// Create the subcategory table in the database.
///
/// Deleting a category cascades to its subcategories at the storage level;
/// the handler-level delete guard normally rejects such deletes first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_subcategory_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS subcategorias (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            categoria_id INTEGER NOT NULL,
            nome TEXT NOT NULL,
            criado_em TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (categoria_id) REFERENCES categorias(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_subcategorias_categoria_id
            ON subcategorias(categoria_id);",
    )
}

fn map_row(row: &Row) -> Result<Subcategory, rusqlite::Error> {
    Ok(Subcategory {
        id: row.get(0)?,
        categoria_id: row.get(1)?,
        nome: row.get(2)?,
        criado_em: row.get(3)?,
        categoria_nome: row.get(4)?,
        categoria_tipo: row.get(5)?,
    })
}

#[cfg(test)]
mod payload_validation_tests {
    use crate::Error;

    use super::SubcategoryPayload;

    #[test]
    fn accepts_parent_id_and_name() {
        let payload = SubcategoryPayload {
            categoria_id: Some(3),
            nome: Some("Mercado".to_string()),
        };

        let new_subcategory = payload.validate().expect("Payload should be valid");

        assert_eq!(new_subcategory.categoria_id, 3);
        assert_eq!(new_subcategory.nome, "Mercado");
    }

    #[test]
    fn rejects_missing_categoria_id() {
        let payload = SubcategoryPayload {
            categoria_id: None,
            nome: Some("Mercado".to_string()),
        };

        assert_eq!(payload.validate(), Err(Error::MissingSubcategoryFields));
    }

    #[test]
    fn rejects_empty_nome() {
        let payload = SubcategoryPayload {
            categoria_id: Some(3),
            nome: Some("".to_string()),
        };

        assert_eq!(payload.validate(), Err(Error::MissingSubcategoryFields));
    }
}
