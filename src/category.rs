//! This file defines the `Category` type, the types needed to create a
//! category and the API routes for the category type.
//! A category is a named grouping for transactions, fixed as either income
//! or expense when it is created.
//!
//! Transactions reference categories by name, not by ID: a transaction's
//! `categoria` field holds the category name, optionally followed by
//! `" > "` and a subcategory name. The delete guards in this module keep
//! those labels from being orphaned.

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

use crate::{AppState, Error, transaction::TransactionKind};

/// The ID of a category.
pub type CategoryId = i64;

/// A named grouping for income or expenses, e.g., 'Alimentação', 'Salário'.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The name of the category.
    pub nome: String,
    /// Whether the category groups income or expenses.
    pub tipo: TransactionKind,
    /// When the record was created, as stored by the database.
    pub criado_em: String,
}

/// The client-supplied fields for creating or updating a category.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryPayload {
    /// The name of the category.
    pub nome: Option<String>,
    /// The category kind, expected to be "receita" or "despesa".
    pub tipo: Option<String>,
}

/// A category payload that has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    /// The name of the category.
    pub nome: String,
    /// Whether the category groups income or expenses.
    pub tipo: TransactionKind,
}

impl CategoryPayload {
    /// Check the payload against the rules for creating or updating a
    /// category.
    ///
    /// # Errors
    /// Returns [Error::MissingCategoryFields] if the name or kind is absent
    /// or empty, or [Error::InvalidTransactionKind] if `tipo` is not a valid
    /// kind.
    pub fn validate(self) -> Result<NewCategory, Error> {
        let nome = self
            .nome
            .filter(|nome| !nome.is_empty())
            .ok_or(Error::MissingCategoryFields)?;
        let tipo = self
            .tipo
            .filter(|tipo| !tipo.is_empty())
            .ok_or(Error::MissingCategoryFields)?;

        Ok(NewCategory {
            nome,
            tipo: tipo.parse()?,
        })
    }
}

/// The state needed for listing categories.
#[derive(Debug, Clone)]
pub struct ListCategoriesEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListCategoriesEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a category.
#[derive(Debug, Clone)]
pub struct CreateCategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for retrieving a single category.
#[derive(Debug, Clone)]
pub struct GetCategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for GetCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for updating a category.
#[derive(Debug, Clone)]
pub struct UpdateCategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UpdateCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a category.
#[derive(Debug, Clone)]
pub struct DeleteCategoryEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Query parameters accepted by the category listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    /// An optional kind to filter by. The value is matched against the
    /// stored text, so an unknown kind yields an empty list.
    pub tipo: Option<String>,
}

/// A route handler for listing categories in alphabetical order.
pub async fn get_categories_endpoint(
    State(state): State<ListCategoriesEndpointState>,
    Query(query): Query<CategoryListQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_categories(query.tipo.as_deref(), &connection) {
        Ok(categories) => Json(categories).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for creating a new category.
pub async fn create_category_endpoint(
    State(state): State<CreateCategoryEndpointState>,
    Json(payload): Json<CategoryPayload>,
) -> Response {
    let new_category = match payload.validate() {
        Ok(new_category) => new_category,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_category(new_category, &connection) {
        Ok(category) => (
            StatusCode::CREATED,
            Json(json!({
                "id": category.id,
                "nome": category.nome,
                "tipo": category.tipo,
                "mensagem": "Categoria criada com sucesso",
            })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for retrieving a single category.
pub async fn get_category_endpoint(
    Path(category_id): Path<CategoryId>,
    State(state): State<GetCategoryEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_category(category_id, &connection) {
        Ok(category) => Json(category).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for updating a category.
///
/// Renaming a category does not rewrite the `categoria` labels of existing
/// transactions.
pub async fn update_category_endpoint(
    Path(category_id): Path<CategoryId>,
    State(state): State<UpdateCategoryEndpointState>,
    Json(payload): Json<CategoryPayload>,
) -> Response {
    let new_category = match payload.validate() {
        Ok(new_category) => new_category,
        Err(error) => return error.into_response(),
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match update_category(category_id, new_category, &connection) {
        Ok(()) => Json(json!({ "mensagem": "Categoria atualizada com sucesso" })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for deleting a category.
///
/// The delete is rejected while subcategories or transactions still
/// reference the category.
pub async fn delete_category_endpoint(
    Path(category_id): Path<CategoryId>,
    State(state): State<DeleteCategoryEndpointState>,
) -> Response {
    let mut connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_category(category_id, &mut connection) {
        Ok(()) => Json(json!({ "mensagem": "Categoria deletada com sucesso" })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a category in the database.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn create_category(
    new_category: NewCategory,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(
            "INSERT INTO categorias (nome, tipo) VALUES (?1, ?2)
             RETURNING id, nome, tipo, criado_em",
        )?
        .query_row((new_category.nome, new_category.tipo), map_row)
        .map_err(|error| error.into())
}

/// Retrieve the category with `id` from the database.
///
/// # Errors
/// This function will return an [Error::CategoryNotFound] if `id` does not
/// refer to a category, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn get_category(id: CategoryId, connection: &Connection) -> Result<Category, Error> {
    connection
        .prepare("SELECT id, nome, tipo, criado_em FROM categorias WHERE id = :id")?
        .query_row(&[(":id", &id)], map_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::CategoryNotFound,
            error => Error::SqlError(error),
        })
}

/// Retrieve categories from the database in alphabetical order, optionally
/// filtered by kind.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_categories(
    tipo: Option<&str>,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    match tipo {
        Some(tipo) => connection
            .prepare(
                "SELECT id, nome, tipo, criado_em FROM categorias
                 WHERE tipo = ?1 ORDER BY nome ASC",
            )?
            .query_map([tipo], map_row)?
            .map(|maybe_category| maybe_category.map_err(|error| error.into()))
            .collect(),
        None => connection
            .prepare("SELECT id, nome, tipo, criado_em FROM categorias ORDER BY nome ASC")?
            .query_map([], map_row)?
            .map(|maybe_category| maybe_category.map_err(|error| error.into()))
            .collect(),
    }
}

/// Overwrite the name and kind of the category with `id`.
///
/// # Errors
/// This function will return an [Error::CategoryNotFound] if `id` does not
/// refer to a category, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn update_category(
    id: CategoryId,
    new_category: NewCategory,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE categorias SET nome = ?1, tipo = ?2 WHERE id = ?3",
        (new_category.nome, new_category.tipo, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::CategoryNotFound);
    }

    Ok(())
}

/// Delete the category with `id` from the database.
///
/// The lookup, the dependent-count checks and the delete run inside a single
/// SQL transaction so that a concurrent write cannot slip between the guard
/// check and the delete.
///
/// # Errors
/// This function will return:
/// - [Error::CategoryNotFound] if `id` does not refer to a category,
/// - [Error::CategoryHasSubcategories] if subcategories reference the
///   category,
/// - [Error::CategoryHasTransactions] if transactions reference the category
///   name directly or as a `"<name> > "` prefix,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_category(id: CategoryId, connection: &mut Connection) -> Result<(), Error> {
    let sql_transaction = connection.transaction()?;

    let nome: String = sql_transaction
        .query_row("SELECT nome FROM categorias WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::CategoryNotFound,
            error => Error::SqlError(error),
        })?;

    let subcategory_count: i64 = sql_transaction.query_row(
        "SELECT COUNT(*) FROM subcategorias WHERE categoria_id = ?1",
        [id],
        |row| row.get(0),
    )?;

    if subcategory_count > 0 {
        return Err(Error::CategoryHasSubcategories(subcategory_count));
    }

    let transaction_count: i64 = sql_transaction.query_row(
        "SELECT COUNT(*) FROM transacoes WHERE categoria = ?1 OR categoria LIKE ?2",
        (&nome, &format!("{nome} > %")),
        |row| row.get(0),
    )?;

    if transaction_count > 0 {
        return Err(Error::CategoryHasTransactions(transaction_count));
    }

    let rows_affected = sql_transaction.execute("DELETE FROM categorias WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::CategoryNotFound);
    }

    sql_transaction.commit()?;

    Ok(())
}

/// Create the category table in the database.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS categorias (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL,
            tipo TEXT NOT NULL,
            criado_em TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_categorias_nome ON categorias(nome);",
    )
}

fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        nome: row.get(1)?,
        tipo: row.get(2)?,
        criado_em: row.get(3)?,
    })
}


#[cfg(test)]
mod category_query_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        transaction::{NewTransaction, TransactionKind, create_transaction},
    };

    use super::{
        NewCategory, create_category, delete_category, get_all_categories, get_category,
        update_category,
    };

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        // The seeded defaults would obscure what these tests create.
        connection.execute("DELETE FROM categorias", []).unwrap();
        connection
    }

    fn expense_category(nome: &str) -> NewCategory {
        NewCategory {
            nome: nome.to_string(),
            tipo: TransactionKind::Despesa,
        }
    }

    fn transaction_with_categoria(categoria: &str) -> NewTransaction {
        NewTransaction {
            tipo: TransactionKind::Despesa,
            categoria: categoria.to_string(),
            valor: 10.0,
            descricao: None,
            data: date!(2024 - 01 - 15),
        }
    }

    #[test]
    fn create_category_succeeds() {
        let connection = get_test_db_connection();

        let category = create_category(expense_category("Viagens"), &connection)
            .expect("Could not create category");

        assert!(category.id > 0);
        assert_eq!(category.nome, "Viagens");
        assert_eq!(category.tipo, TransactionKind::Despesa);
        assert!(!category.criado_em.is_empty());
    }

    #[test]
    fn get_category_returns_created_category() {
        let connection = get_test_db_connection();
        let created = create_category(expense_category("Viagens"), &connection).unwrap();

        let got = get_category(created.id, &connection);

        assert_eq!(Ok(created), got);
    }

    #[test]
    fn get_category_with_invalid_id_returns_not_found() {
        let connection = get_test_db_connection();

        let got = get_category(999_999, &connection);

        assert_eq!(got, Err(Error::CategoryNotFound));
    }

    #[test]
    fn get_all_categories_sorts_by_name() {
        let connection = get_test_db_connection();
        let zoo = create_category(expense_category("Zoológico"), &connection).unwrap();
        let cinema = create_category(expense_category("Cinema"), &connection).unwrap();

        let got = get_all_categories(None, &connection).unwrap();

        assert_eq!(got, vec![cinema, zoo]);
    }

    #[test]
    fn get_all_categories_filters_by_kind() {
        let connection = get_test_db_connection();
        create_category(expense_category("Lazer"), &connection).unwrap();
        let income = create_category(
            NewCategory {
                nome: "Salário".to_string(),
                tipo: TransactionKind::Receita,
            },
            &connection,
        )
        .unwrap();

        let got = get_all_categories(Some("receita"), &connection).unwrap();

        assert_eq!(got, vec![income]);
    }

    #[test]
    fn get_all_categories_with_unknown_kind_returns_empty_list() {
        let connection = get_test_db_connection();
        create_category(expense_category("Lazer"), &connection).unwrap();

        let got = get_all_categories(Some("outro"), &connection).unwrap();

        assert!(got.is_empty());
    }

    #[test]
    fn update_category_overwrites_name_and_kind() {
        let connection = get_test_db_connection();
        let created = create_category(expense_category("Lazer"), &connection).unwrap();

        update_category(
            created.id,
            NewCategory {
                nome: "Entretenimento".to_string(),
                tipo: TransactionKind::Despesa,
            },
            &connection,
        )
        .expect("Could not update category");

        let got = get_category(created.id, &connection).unwrap();
        assert_eq!(got.nome, "Entretenimento");
    }

    #[test]
    fn update_category_with_invalid_id_returns_not_found() {
        let connection = get_test_db_connection();

        let result = update_category(999_999, expense_category("Lazer"), &connection);

        assert_eq!(result, Err(Error::CategoryNotFound));
    }

    #[test]
    fn delete_category_succeeds_when_unreferenced() {
        let mut connection = get_test_db_connection();
        let created = create_category(expense_category("Lazer"), &connection).unwrap();

        delete_category(created.id, &mut connection).expect("Could not delete category");

        assert_eq!(
            get_category(created.id, &connection),
            Err(Error::CategoryNotFound)
        );
    }

    #[test]
    fn delete_category_with_invalid_id_returns_not_found() {
        let mut connection = get_test_db_connection();

        let result = delete_category(999_999, &mut connection);

        assert_eq!(result, Err(Error::CategoryNotFound));
    }

    #[test]
    fn delete_category_with_subcategories_is_rejected_with_count() {
        let mut connection = get_test_db_connection();
        let created = create_category(expense_category("Alimentação"), &connection).unwrap();
        for nome in ["Mercado", "Restaurante"] {
            connection
                .execute(
                    "INSERT INTO subcategorias (categoria_id, nome) VALUES (?1, ?2)",
                    (created.id, nome),
                )
                .unwrap();
        }

        let result = delete_category(created.id, &mut connection);

        assert_eq!(result, Err(Error::CategoryHasSubcategories(2)));
        assert!(
            get_category(created.id, &connection).is_ok(),
            "The category must survive a rejected delete"
        );
    }

    #[test]
    fn delete_category_with_exactly_named_transaction_is_rejected() {
        let mut connection = get_test_db_connection();
        let created = create_category(expense_category("Alimentação"), &connection).unwrap();
        create_transaction(transaction_with_categoria("Alimentação"), &connection).unwrap();

        let result = delete_category(created.id, &mut connection);

        assert_eq!(result, Err(Error::CategoryHasTransactions(1)));
    }

    #[test]
    fn delete_category_with_subcategory_labelled_transaction_is_rejected() {
        let mut connection = get_test_db_connection();
        let created = create_category(expense_category("Alimentação"), &connection).unwrap();
        create_transaction(
            transaction_with_categoria("Alimentação > Mercado"),
            &connection,
        )
        .unwrap();

        let result = delete_category(created.id, &mut connection);

        assert_eq!(result, Err(Error::CategoryHasTransactions(1)));
    }

    #[test]
    fn delete_category_ignores_transactions_of_other_categories() {
        let mut connection = get_test_db_connection();
        let created = create_category(expense_category("Lazer"), &connection).unwrap();
        create_transaction(transaction_with_categoria("Alimentação"), &connection).unwrap();

        let result = delete_category(created.id, &mut connection);

        assert_eq!(result, Ok(()));
    }
}
