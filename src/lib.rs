//! Financas is a web app for recording personal income and expenses,
//! organising them under categories and subcategories, and reviewing
//! aggregate statistics about them.
//!
//! This library provides a JSON REST API backed by SQLite.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod category;
mod db;
pub mod endpoints;
mod logging;
mod routing;
mod statistics;
mod subcategory;
mod transaction;

pub use app_state::AppState;
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
///
/// The `Display` text of each variant is the client-facing message placed in
/// the `erro` field of the JSON error body.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A transaction payload is missing one or more required fields.
    #[error("Campos obrigatórios faltando")]
    MissingTransactionFields,

    /// A payload's `tipo` is not one of the two accepted kind values.
    #[error("Tipo deve ser \"receita\" ou \"despesa\"")]
    InvalidTransactionKind,

    /// A transaction payload's `data` is not an ISO calendar date.
    #[error("Data deve estar no formato AAAA-MM-DD")]
    InvalidTransactionDate,

    /// A category payload is missing its name or kind.
    #[error("Nome e tipo são obrigatórios")]
    MissingCategoryFields,

    /// A subcategory payload is missing its parent category ID or name.
    #[error("Categoria ID e nome são obrigatórios")]
    MissingSubcategoryFields,

    /// The previous-month statistics endpoint was called without the month
    /// and year parameters.
    #[error("Mês e ano são obrigatórios")]
    MissingMonthAndYear,

    /// The requested transaction does not exist.
    #[error("Transação não encontrada")]
    TransactionNotFound,

    /// The requested category does not exist.
    #[error("Categoria não encontrada")]
    CategoryNotFound,

    /// The requested subcategory does not exist.
    #[error("Subcategoria não encontrada")]
    SubcategoryNotFound,

    /// Tried to delete a category that still has subcategories.
    ///
    /// Holds the number of subcategories referencing the category.
    #[error("Não é possível deletar categoria com subcategorias associadas")]
    CategoryHasSubcategories(i64),

    /// Tried to delete a category that transactions still reference by name.
    ///
    /// Holds the number of transactions whose `categoria` is the category
    /// name or starts with `"<name> > "`.
    #[error("Não é possível deletar categoria com transações associadas")]
    CategoryHasTransactions(i64),

    /// Tried to delete a subcategory that transactions still reference by
    /// its full `"<category> > <subcategory>"` label.
    ///
    /// Holds the number of referencing transactions.
    #[error("Não é possível deletar subcategoria com transações associadas")]
    SubcategoryHasTransactions(i64),

    /// The route exists but does not accept the request's HTTP method.
    #[error("Método não permitido")]
    MethodNotAllowed,

    /// No route matches the requested path.
    #[error("Rota não encontrada")]
    RouteNotFound,

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled SQL error. The raw message is passed through to the
    /// client on a 500 response.
    #[error("{0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Error::SqlError(error)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = match self {
            Error::MissingTransactionFields
            | Error::InvalidTransactionKind
            | Error::InvalidTransactionDate
            | Error::MissingCategoryFields
            | Error::MissingSubcategoryFields
            | Error::MissingMonthAndYear
            | Error::CategoryHasSubcategories(_)
            | Error::CategoryHasTransactions(_)
            | Error::SubcategoryHasTransactions(_) => StatusCode::BAD_REQUEST,
            Error::TransactionNotFound
            | Error::CategoryNotFound
            | Error::SubcategoryNotFound
            | Error::RouteNotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::DatabaseLockError | Error::SqlError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status_code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("An unexpected error occurred: {self}");
        }

        let body = match self {
            Error::CategoryHasSubcategories(count)
            | Error::CategoryHasTransactions(count)
            | Error::SubcategoryHasTransactions(count) => {
                json!({ "erro": self.to_string(), "quantidade": count })
            }
            error => json!({ "erro": error.to_string() }),
        };

        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod error_response_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use crate::Error;

    async fn parse_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        serde_json::from_slice(&body).expect("Response body was not valid JSON")
    }

    #[tokio::test]
    async fn validation_error_renders_as_json_with_status_400() {
        let response = Error::MissingTransactionFields.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = parse_json(response).await;
        assert_eq!(body["erro"], "Campos obrigatórios faltando");
        assert!(body.get("quantidade").is_none());
    }

    #[tokio::test]
    async fn delete_guard_error_includes_dependent_count() {
        let response = Error::CategoryHasSubcategories(3).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = parse_json(response).await;
        assert_eq!(
            body["erro"],
            "Não é possível deletar categoria com subcategorias associadas"
        );
        assert_eq!(body["quantidade"], 3);
    }

    #[tokio::test]
    async fn not_found_error_renders_with_status_404() {
        let response = Error::TransactionNotFound.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = parse_json(response).await;
        assert_eq!(body["erro"], "Transação não encontrada");
    }

    #[tokio::test]
    async fn sql_error_passes_raw_message_through_with_status_500() {
        let response = Error::SqlError(rusqlite::Error::InvalidQuery).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = parse_json(response).await;
        assert_eq!(
            body["erro"],
            rusqlite::Error::InvalidQuery.to_string()
        );
    }
}
