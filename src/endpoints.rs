//! The API endpoint URIs.
//!
//! For endpoints that take a parameter, e.g., '/transacoes/{transaction_id}',
//! use [format_endpoint].

/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/transacoes";
/// The route to access a single transaction.
pub const TRANSACTION: &str = "/transacoes/{transaction_id}";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/categorias";
/// The route to access a single category.
pub const CATEGORY: &str = "/categorias/{category_id}";
/// The route to list and create subcategories.
pub const SUBCATEGORIES: &str = "/subcategorias";
/// The route to access a single subcategory.
pub const SUBCATEGORY: &str = "/subcategorias/{subcategory_id}";
/// The route for overall statistics, optionally filtered to a month.
pub const STATISTICS: &str = "/estatisticas";
/// The route for statistics over the month preceding the given one.
pub const PREVIOUS_MONTH_STATISTICS: &str = "/estatisticas/mes-anterior";
/// The route for per-category statistics.
pub const CATEGORY_STATISTICS: &str = "/estatisticas/categorias";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/transacoes/{transaction_id}',
/// '{transaction_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}

// These tests are here so that we know the route definitions will not panic
// when the router is built.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTION);
        assert_endpoint_is_valid_uri(endpoints::CATEGORIES);
        assert_endpoint_is_valid_uri(endpoints::CATEGORY);
        assert_endpoint_is_valid_uri(endpoints::SUBCATEGORIES);
        assert_endpoint_is_valid_uri(endpoints::SUBCATEGORY);
        assert_endpoint_is_valid_uri(endpoints::STATISTICS);
        assert_endpoint_is_valid_uri(endpoints::PREVIOUS_MONTH_STATISTICS);
        assert_endpoint_is_valid_uri(endpoints::CATEGORY_STATISTICS);
    }

    #[test]
    fn produces_valid_uri() {
        let formatted_path = format_endpoint(endpoints::TRANSACTION, 42);

        assert_eq!(formatted_path, "/transacoes/42");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint(endpoints::STATISTICS, 1);

        assert_eq!(formatted_path, endpoints::STATISTICS);
    }
}
