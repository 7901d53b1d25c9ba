//! Application router configuration.

use axum::{
    Router,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState, Error,
    category::{
        create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
        get_category_endpoint, update_category_endpoint,
    },
    endpoints,
    statistics::{
        get_category_statistics_endpoint, get_previous_month_statistics_endpoint,
        get_statistics_endpoint,
    },
    subcategory::{
        create_subcategory_endpoint, delete_subcategory_endpoint, get_subcategories_endpoint,
        get_subcategory_endpoint, update_subcategory_endpoint,
    },
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        get_transactions_endpoint, update_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// CORS is wide open: the browser client may be served from anywhere.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint)
                .post(create_transaction_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::TRANSACTION,
            get(get_transaction_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint)
                .post(create_category_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::CATEGORY,
            get(get_category_endpoint)
                .put(update_category_endpoint)
                .delete(delete_category_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::SUBCATEGORIES,
            get(get_subcategories_endpoint)
                .post(create_subcategory_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::SUBCATEGORY,
            get(get_subcategory_endpoint)
                .put(update_subcategory_endpoint)
                .delete(delete_subcategory_endpoint)
                .options(preflight_ok),
        )
        .route(
            endpoints::STATISTICS,
            get(get_statistics_endpoint).options(preflight_ok),
        )
        .route(
            endpoints::PREVIOUS_MONTH_STATISTICS,
            get(get_previous_month_statistics_endpoint).options(preflight_ok),
        )
        .route(
            endpoints::CATEGORY_STATISTICS,
            get(get_category_statistics_endpoint).options(preflight_ok),
        )
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .layer(cors)
        .with_state(state)
}

/// OPTIONS requests short-circuit with 200 before any handler logic runs.
async fn preflight_ok() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    Error::MethodNotAllowed.into_response()
}

async fn route_not_found() -> Response {
    Error::RouteNotFound.into_response()
}
