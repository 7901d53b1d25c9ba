//! Database schema initialization and default data seeding.

use rusqlite::Connection;

use crate::{
    category::create_category_table, subcategory::create_subcategory_table,
    transaction::create_transaction_table,
};

/// The income categories inserted on first start-up.
const DEFAULT_INCOME_CATEGORIES: [&str; 7] = [
    "Salário",
    "Freelance",
    "Investimentos",
    "Vendas",
    "Presente",
    "Reembolso",
    "Outros",
];

/// The expense categories inserted on first start-up.
const DEFAULT_EXPENSE_CATEGORIES: [&str; 10] = [
    "Alimentação",
    "Transporte",
    "Moradia",
    "Saúde",
    "Educação",
    "Lazer",
    "Compras",
    "Contas",
    "Impostos",
    "Outros",
];

/// Create the application tables and seed the default categories.
///
/// Safe to call on every start-up: tables are only created if missing and
/// categories are only seeded into an empty table.
///
/// # Errors
/// Returns an error if a table cannot be created or the seed data cannot be
/// inserted.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    create_transaction_table(connection)?;
    create_category_table(connection)?;
    create_subcategory_table(connection)?;

    seed_default_categories(connection)?;

    Ok(())
}

fn seed_default_categories(connection: &Connection) -> Result<(), rusqlite::Error> {
    let category_count: i64 =
        connection.query_row("SELECT COUNT(*) FROM categorias", [], |row| row.get(0))?;

    if category_count > 0 {
        return Ok(());
    }

    let mut statement = connection.prepare("INSERT INTO categorias (nome, tipo) VALUES (?1, ?2)")?;

    for nome in DEFAULT_INCOME_CATEGORIES {
        statement.execute((nome, "receita"))?;
    }

    for nome in DEFAULT_EXPENSE_CATEGORIES {
        statement.execute((nome, "despesa"))?;
    }

    Ok(())
}

#[cfg(test)]
mod db_tests {
    use rusqlite::Connection;

    use super::initialize;

    fn count_categories(connection: &Connection) -> i64 {
        connection
            .query_row("SELECT COUNT(*) FROM categorias", [], |row| row.get(0))
            .expect("Could not count categories")
    }

    #[test]
    fn initialize_seeds_default_categories() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");

        assert_eq!(count_categories(&connection), 17);

        let income_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM categorias WHERE tipo = 'receita'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(income_count, 7);
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");
        initialize(&connection).expect("Could not re-initialize database");

        assert_eq!(count_categories(&connection), 17);
    }

    #[test]
    fn initialize_does_not_seed_into_populated_table() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        connection
            .execute("DELETE FROM categorias WHERE nome <> 'Salário'", [])
            .unwrap();

        initialize(&connection).unwrap();

        assert_eq!(count_categories(&connection), 1);
    }
}
