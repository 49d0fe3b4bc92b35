//! # Levy Command Line
//!
//! Resolves tax queries against the SQLite rule store.
//!
//! ## Usage
//! ```bash
//! # Query from a JSON file
//! levy query --file query.json
//!
//! # Query from flags
//! levy query --country mx --tx-type sales --doc-type invoice \
//!     --tax IVA --var subTotal=1000
//!
//! # Evaluate as of a past instant
//! levy query --file query.json --at 2023-06-01T00:00:00Z
//!
//! # List stored countries
//! levy countries
//!
//! # Show one country
//! levy countries mx
//! ```
//!
//! The report is printed to stdout as JSON; logs go to stderr.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use levy_core::{Column, FormulaSource, TaxEngine, TaxQuery};
use levy_db::{init_logging, Database, LevyConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing::debug;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Tax rule resolution over the stored catalog.
#[derive(Parser)]
#[command(name = "levy", version, about = "Resolve taxes against the stored rule catalog")]
struct Cli {
    /// Database file path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: platform config dir / levy.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a tax query
    Query(QueryArgs),

    /// List stored countries and their rule counts
    Countries {
        /// Show only this country code
        code: Option<String>,
    },
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Query JSON file; flags below are applied on top of it
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Country code (required without --file)
    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    tx_type: Option<String>,

    #[arg(long)]
    doc_type: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    area: Option<String>,

    #[arg(long)]
    bp_type: Option<String>,

    /// Tax to resolve (repeatable, in report order)
    #[arg(long = "tax")]
    taxes: Vec<String>,

    /// Query variable as name=value, value a number or formula (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Evaluation instant (RFC 3339), default now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

fn parse_var(text: &str) -> Result<(String, String), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", text))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

impl QueryArgs {
    /// Builds the query from `--file` and the individual flags.
    fn into_query(self) -> CliResult<TaxQuery> {
        let mut query = match &self.file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            None => {
                let country = self
                    .country
                    .clone()
                    .ok_or("--country is required without --file")?;
                TaxQuery::new(country)
            }
        };

        if let Some(country) = self.country {
            query.country = country;
        }

        let attributes = [
            (Column::Region, self.region),
            (Column::TxType, self.tx_type),
            (Column::DocType, self.doc_type),
            (Column::Category, self.category),
            (Column::Area, self.area),
            (Column::BpType, self.bp_type),
        ];
        for (column, value) in attributes {
            if let Some(value) = value {
                query.set_attribute(column, value);
            }
        }

        query.taxes.extend(self.taxes);

        for (name, value) in self.vars {
            query.vars.insert(name, FormulaSource::from_text(&value)?);
        }

        if self.at.is_some() {
            query.at = self.at;
        }

        Ok(query)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CountryLine {
    code: String,
    name: String,
    rules: i64,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = LevyConfig::load(cli.config)?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let db = Database::new(config.db_config()).await?;

    match cli.command {
        Commands::Query(args) => {
            let engine = TaxEngine::new(config.engine.clone())?;
            let query = args.into_query()?;
            debug!(query = %query, "Running query");

            let report = db.get_taxes(&engine, &query).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Countries { code } => {
            let countries = match code {
                Some(code) => {
                    let country = db
                        .countries()
                        .get(&code)
                        .await?
                        .ok_or_else(|| format!("unknown country '{}'", code))?;
                    vec![country]
                }
                None => db.countries().list().await?,
            };

            let counts = db.rules().count_by_country().await?;
            let lines: Vec<CountryLine> = countries
                .into_iter()
                .map(|country| CountryLine {
                    rules: counts
                        .iter()
                        .find(|(code, _)| *code == country.code)
                        .map_or(0, |(_, count)| *count),
                    code: country.code,
                    name: country.name,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
    }

    db.close().await;
    Ok(())
}
