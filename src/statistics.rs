//! Aggregate statistics over transactions: overall totals and balance,
//! the same figures for the month preceding a given one, and a per-category
//! breakdown.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Query, State},
    response::{IntoResponse, Response},
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    transaction::{MonthFilter, TransactionKind},
};

/// Totals and counts per transaction kind, plus the resulting balance.
///
/// Kinds with no matching transactions report zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// The sum of income amounts.
    pub receitas: f64,
    /// The sum of expense amounts.
    pub despesas: f64,
    /// The balance: `receitas - despesas`.
    pub saldo: f64,
    /// The number of income transactions.
    #[serde(rename = "quantidadeReceitas")]
    pub quantidade_receitas: i64,
    /// The number of expense transactions.
    #[serde(rename = "quantidadeDespesas")]
    pub quantidade_despesas: i64,
}

/// One row of the per-category breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatistics {
    /// The category label as stored on the transactions.
    pub categoria: String,
    /// The transaction kind the row aggregates.
    pub tipo: TransactionKind,
    /// The sum of amounts in this category and kind.
    pub total: f64,
    /// The number of transactions in this category and kind.
    pub quantidade: i64,
}

/// The calendar month preceding `(mes, ano)`, wrapping over the year
/// boundary: January's predecessor is December of the previous year.
pub fn previous_month(mes: u8, ano: i32) -> (u8, i32) {
    if mes <= 1 {
        (12, ano - 1)
    } else {
        (mes - 1, ano)
    }
}

/// Compute totals and counts per kind, over all transactions or over one
/// calendar month when a filter is given.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_statistics(
    filter: Option<MonthFilter>,
    connection: &Connection,
) -> Result<Statistics, Error> {
    let mut statistics = Statistics::default();

    for (tipo, total, quantidade) in kind_totals(filter, connection)? {
        match tipo {
            TransactionKind::Receita => {
                statistics.receitas = total;
                statistics.quantidade_receitas = quantidade;
            }
            TransactionKind::Despesa => {
                statistics.despesas = total;
                statistics.quantidade_despesas = quantidade;
            }
        }
    }

    statistics.saldo = statistics.receitas - statistics.despesas;

    Ok(statistics)
}

fn kind_totals(
    filter: Option<MonthFilter>,
    connection: &Connection,
) -> Result<Vec<(TransactionKind, f64, i64)>, Error> {
    fn map_row(row: &Row) -> Result<(TransactionKind, f64, i64), rusqlite::Error> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    match filter {
        Some(filter) => connection
            .prepare(
                "SELECT tipo, COALESCE(SUM(valor), 0) AS total, COUNT(*) AS quantidade
                 FROM transacoes
                 WHERE strftime('%m', data) = ?1 AND strftime('%Y', data) = ?2
                 GROUP BY tipo",
            )?
            .query_map((filter.month_param(), filter.year_param()), map_row)?
            .map(|maybe_row| maybe_row.map_err(|error| error.into()))
            .collect(),
        None => connection
            .prepare(
                "SELECT tipo, COALESCE(SUM(valor), 0) AS total, COUNT(*) AS quantidade
                 FROM transacoes
                 GROUP BY tipo",
            )?
            .query_map([], map_row)?
            .map(|maybe_row| maybe_row.map_err(|error| error.into()))
            .collect(),
    }
}

/// Compute totals and counts grouped by `(categoria, tipo)`, sorted by total
/// in descending order.
///
/// Both filters are optional and combine: a month filter restricts the rows
/// to one calendar month, and `tipo` restricts them to one kind. The kind is
/// matched against the stored text, so an unknown value yields an empty
/// list.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_category_statistics(
    filter: Option<MonthFilter>,
    tipo: Option<&str>,
    connection: &Connection,
) -> Result<Vec<CategoryStatistics>, Error> {
    let mut query = String::from(
        "SELECT categoria, tipo, COALESCE(SUM(valor), 0) AS total, COUNT(*) AS quantidade
         FROM transacoes",
    );
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(filter) = filter {
        conditions.push("strftime('%m', data) = ?");
        params.push(filter.month_param());
        conditions.push("strftime('%Y', data) = ?");
        params.push(filter.year_param());
    }

    if let Some(tipo) = tipo {
        conditions.push("tipo = ?");
        params.push(tipo.to_string());
    }

    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }

    query.push_str(" GROUP BY categoria, tipo ORDER BY total DESC");

    connection
        .prepare(&query)?
        .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(CategoryStatistics {
                categoria: row.get(0)?,
                tipo: row.get(1)?,
                total: row.get(2)?,
                quantidade: row.get(3)?,
            })
        })?
        .map(|maybe_row| maybe_row.map_err(|error| error.into()))
        .collect()
}

/// The state needed for the overall statistics endpoint.
#[derive(Debug, Clone)]
pub struct StatisticsEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for StatisticsEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for the previous-month statistics endpoint.
#[derive(Debug, Clone)]
pub struct PreviousMonthStatisticsEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for PreviousMonthStatisticsEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for the per-category statistics endpoint.
#[derive(Debug, Clone)]
pub struct CategoryStatisticsEndpointState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryStatisticsEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Query parameters accepted by the statistics endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    /// The month to aggregate over, 1-12.
    pub mes: Option<u8>,
    /// The year to aggregate over.
    pub ano: Option<i32>,
}

/// Query parameters accepted by the per-category statistics endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryStatisticsQuery {
    /// The month to aggregate over, 1-12.
    pub mes: Option<u8>,
    /// The year to aggregate over.
    pub ano: Option<i32>,
    /// An optional kind to restrict the breakdown to.
    pub tipo: Option<String>,
}

/// A route handler for the overall statistics, optionally restricted to a
/// calendar month.
pub async fn get_statistics_endpoint(
    State(state): State<StatisticsEndpointState>,
    Query(query): Query<StatisticsQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let filter = MonthFilter::from_query(query.mes, query.ano);

    match get_statistics(filter, &connection) {
        Ok(statistics) => Json(statistics).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for the statistics of the month preceding the given one.
///
/// Both `mes` and `ano` are required.
pub async fn get_previous_month_statistics_endpoint(
    State(state): State<PreviousMonthStatisticsEndpointState>,
    Query(query): Query<StatisticsQuery>,
) -> Response {
    let (mes, ano) = match (query.mes, query.ano) {
        (Some(mes), Some(ano)) => (mes, ano),
        _ => return Error::MissingMonthAndYear.into_response(),
    };

    let (mes, ano) = previous_month(mes, ano);

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_statistics(Some(MonthFilter { mes, ano }), &connection) {
        Ok(statistics) => Json(statistics).into_response(),
        Err(error) => error.into_response(),
    }
}

/// A route handler for the per-category breakdown.
pub async fn get_category_statistics_endpoint(
    State(state): State<CategoryStatisticsEndpointState>,
    Query(query): Query<CategoryStatisticsQuery>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let filter = MonthFilter::from_query(query.mes, query.ano);

    match get_category_statistics(filter, query.tipo.as_deref(), &connection) {
        Ok(rows) => Json(rows).into_response(),
        Err(error) => error.into_response(),
    }
}

#[cfg(test)]
mod previous_month_tests {
    use super::previous_month;

    #[test]
    fn january_wraps_to_december_of_previous_year() {
        assert_eq!(previous_month(1, 2024), (12, 2023));
    }

    #[test]
    fn mid_year_months_only_decrement() {
        assert_eq!(previous_month(3, 2024), (2, 2024));
        assert_eq!(previous_month(12, 2024), (11, 2024));
    }
}

#[cfg(test)]
mod statistics_query_tests {
    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        db::initialize,
        transaction::{MonthFilter, NewTransaction, TransactionKind, create_transaction},
    };

    use super::{Statistics, get_category_statistics, get_statistics};

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        connection
    }

    fn insert_transaction(
        tipo: TransactionKind,
        categoria: &str,
        valor: f64,
        data: Date,
        connection: &Connection,
    ) {
        create_transaction(
            NewTransaction {
                tipo,
                categoria: categoria.to_string(),
                valor,
                descricao: None,
                data,
            },
            connection,
        )
        .expect("Could not create test transaction");
    }

    #[test]
    fn empty_database_reports_zeroes() {
        let connection = get_test_db_connection();

        let statistics = get_statistics(None, &connection).unwrap();

        assert_eq!(statistics, Statistics::default());
    }

    #[test]
    fn balance_is_income_minus_expenses() {
        let connection = get_test_db_connection();
        insert_transaction(
            TransactionKind::Receita,
            "Salário",
            4200.0,
            date!(2024 - 05 - 05),
            &connection,
        );
        insert_transaction(
            TransactionKind::Receita,
            "Freelance",
            800.0,
            date!(2024 - 05 - 20),
            &connection,
        );
        insert_transaction(
            TransactionKind::Despesa,
            "Moradia",
            1500.0,
            date!(2024 - 05 - 12),
            &connection,
        );

        let statistics = get_statistics(None, &connection).unwrap();

        assert_eq!(statistics.receitas, 5000.0);
        assert_eq!(statistics.despesas, 1500.0);
        assert_eq!(statistics.saldo, statistics.receitas - statistics.despesas);
        assert_eq!(statistics.quantidade_receitas, 2);
        assert_eq!(statistics.quantidade_despesas, 1);
    }

    #[test]
    fn month_filter_restricts_aggregation() {
        let connection = get_test_db_connection();
        insert_transaction(
            TransactionKind::Receita,
            "Salário",
            100.0,
            date!(2023 - 12 - 28),
            &connection,
        );
        insert_transaction(
            TransactionKind::Receita,
            "Salário",
            999.0,
            date!(2024 - 01 - 05),
            &connection,
        );

        let statistics = get_statistics(
            Some(MonthFilter {
                mes: 12,
                ano: 2023,
            }),
            &connection,
        )
        .unwrap();

        assert_eq!(statistics.receitas, 100.0);
        assert_eq!(statistics.quantidade_receitas, 1);
        assert_eq!(statistics.despesas, 0.0);
    }

    #[test]
    fn category_statistics_sort_by_total_descending() {
        let connection = get_test_db_connection();
        insert_transaction(
            TransactionKind::Despesa,
            "Moradia",
            1500.0,
            date!(2024 - 05 - 12),
            &connection,
        );
        insert_transaction(
            TransactionKind::Despesa,
            "Alimentação",
            300.0,
            date!(2024 - 05 - 08),
            &connection,
        );
        insert_transaction(
            TransactionKind::Despesa,
            "Alimentação",
            200.0,
            date!(2024 - 05 - 22),
            &connection,
        );

        let rows = get_category_statistics(None, None, &connection).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].categoria, "Moradia");
        assert_eq!(rows[0].total, 1500.0);
        assert_eq!(rows[1].categoria, "Alimentação");
        assert_eq!(rows[1].total, 500.0);
        assert_eq!(rows[1].quantidade, 2);
    }

    #[test]
    fn category_statistics_filter_by_kind_and_month() {
        let connection = get_test_db_connection();
        insert_transaction(
            TransactionKind::Receita,
            "Salário",
            4200.0,
            date!(2024 - 05 - 05),
            &connection,
        );
        insert_transaction(
            TransactionKind::Despesa,
            "Moradia",
            1500.0,
            date!(2024 - 05 - 12),
            &connection,
        );
        insert_transaction(
            TransactionKind::Despesa,
            "Moradia",
            1500.0,
            date!(2024 - 06 - 12),
            &connection,
        );

        let rows = get_category_statistics(
            Some(MonthFilter {
                mes: 5,
                ano: 2024,
            }),
            Some("despesa"),
            &connection,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].categoria, "Moradia");
        assert_eq!(rows[0].total, 1500.0);
        assert_eq!(rows[0].quantidade, 1);
    }

    #[test]
    fn statistics_serialize_with_camel_case_counts() {
        let statistics = Statistics {
            receitas: 10.0,
            despesas: 4.0,
            saldo: 6.0,
            quantidade_receitas: 1,
            quantidade_despesas: 2,
        };

        let json = serde_json::to_value(&statistics).unwrap();

        assert_eq!(json["quantidadeReceitas"], 1);
        assert_eq!(json["quantidadeDespesas"], 2);
        assert_eq!(json["saldo"], 6.0);
    }
}
