//! # Rule Catalog Importer
//!
//! Loads the static rule catalog (JSON) into the SQLite rule store.
//!
//! ## Usage
//! ```bash
//! # Import the bundled catalog into ./levy.db
//! cargo run -p levy-db --bin seed
//!
//! # Specify database and catalog
//! cargo run -p levy-db --bin seed -- --db ./data/levy.db --data ./data/tax_rules.json
//!
//! # Drop the stored rules first
//! cargo run -p levy-db --bin seed -- --replace
//! ```
//!
//! ## Catalog Format
//! ```json
//! {
//!   "countries": [{ "code": "mx", "name": "Mexico" }],
//!   "taxRules": [{ "country": "mx", "txType": "sales", "taxName": "IVA", "rate": 0.16 }]
//! }
//! ```
//!
//! The whole catalog is validated before anything is written.

use clap::Parser;
use levy_core::RuleCatalog;
use levy_db::{init_logging, Database, LevyConfig};
use std::path::PathBuf;

/// Import a tax rule catalog into the rule store.
#[derive(Parser)]
#[command(name = "seed", version, about = "Import a tax rule catalog into the rule store")]
struct Args {
    /// Database file path (overrides config)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Catalog JSON file
    #[arg(long, default_value = "data/tax_rules.json")]
    data: PathBuf,

    /// Delete stored rules and countries before importing
    #[arg(long)]
    replace: bool,

    /// Config file (default: platform config dir / levy.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    let mut config = LevyConfig::load(args.config)?;
    if let Some(db) = args.db {
        config.database.path = db;
    }

    println!("🌱 Levy Rule Catalog Import");
    println!("===========================");
    println!("Database: {}", config.database.path.display());
    println!("Catalog:  {}", args.data.display());
    println!();

    let contents = std::fs::read_to_string(&args.data)?;
    let catalog: RuleCatalog = serde_json::from_str(&contents)?;

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.rules().count().await?;
    if existing > 0 && !args.replace {
        println!("⚠ Database already has {} rules", existing);
        println!("  Skipping import to avoid duplicates.");
        println!("  Run with --replace to import again.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let summary = db.import_catalog(&catalog, args.replace).await?;
    let elapsed = start.elapsed();

    println!();
    if summary.removed > 0 {
        println!("✓ Removed {} stored rules", summary.removed);
    }
    println!(
        "✓ Imported {} countries and {} rules in {:?}",
        summary.countries, summary.rules, elapsed
    );

    println!();
    println!("Rules per country:");
    for (country, count) in db.rules().count_by_country().await? {
        println!("  {}: {}", country, count);
    }

    db.close().await;

    println!();
    println!("✓ Import complete!");

    Ok(())
}
