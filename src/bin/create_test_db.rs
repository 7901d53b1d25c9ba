use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use financas_rs::initialize_db;

/// A utility for creating a populated test database for the financas_rs server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'financas.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'financas.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating sample transactions...");

    // Two months of data so the month filters and the previous-month
    // statistics have something to show.
    let sample_transactions = [
        ("receita", "Salário", 4200.0, Some("Salário de maio"), "2024-05-05"),
        ("despesa", "Alimentação > Mercado", 312.47, None, "2024-05-08"),
        ("despesa", "Transporte", 89.9, Some("Cartão de transporte"), "2024-05-10"),
        ("despesa", "Moradia", 1500.0, Some("Aluguel"), "2024-05-12"),
        ("receita", "Salário", 4200.0, Some("Salário de junho"), "2024-06-05"),
        ("receita", "Freelance", 800.0, Some("Projeto de fim de semana"), "2024-06-08"),
        ("despesa", "Lazer", 120.0, Some("Cinema e jantar"), "2024-06-15"),
    ];

    for (tipo, categoria, valor, descricao, data) in sample_transactions {
        conn.execute(
            "INSERT INTO transacoes (tipo, categoria, valor, descricao, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (tipo, categoria, valor, descricao, data),
        )?;
    }

    println!("Success!");

    Ok(())
}
