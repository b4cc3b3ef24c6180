#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the MercadoLibre ETL.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use meli_etl::config::{self, DEFAULT_CONFIG_PATH};
use meli_etl::{API_KEY_ENV, EtlProgress, Track, format_summary, run_etl};
use meli_etl_cli_utils::{IndicatifProgress, MultiProgress};
use meli_etl_models::EtlConfig;
use meli_etl_source::client::{ApiToken, MeliClient};
use meli_etl_warehouse::{DuckDbWarehouse, Warehouse, reports};

/// Exit code for failures before any track starts.
const PREFLIGHT_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(name = "meli_etl", about = "MercadoLibre listings ETL into DuckDB")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "MELI_ETL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch listings, sellers and currency rates and load them (default)
    Run,
    /// Run the analytical reports against the loaded tables
    Report {
        /// Number of sellers in the concentration report
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print row counts per destination table
    Tables,
}

#[tokio::main]
async fn main() {
    let multi = meli_etl_cli_utils::init_logger();
    let cli = Cli::parse();

    let code = match run(cli, &multi).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            PREFLIGHT_FAILURE
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli, multi: &MultiProgress) -> Result<i32, Box<dyn std::error::Error>> {
    let config = config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_command(&config, multi).await,
        Commands::Report { limit } => {
            report_command(&config, limit)?;
            Ok(0)
        }
        Commands::Tables => {
            tables_command(&config)?;
            Ok(0)
        }
    }
}

async fn run_command(
    config: &EtlConfig,
    multi: &MultiProgress,
) -> Result<i32, Box<dyn std::error::Error>> {
    let token = ApiToken::new(std::env::var(API_KEY_ENV).unwrap_or_default())?;
    let client = MeliClient::new(
        &config.api_url,
        token,
        config.timeout(),
        config::retry_policy(config),
    )?;
    let mut warehouse = DuckDbWarehouse::open(&config.database_path)?;

    log::info!(
        "Running ETL for {} {:?} into {}",
        config.site,
        config.query,
        warehouse
            .path()
            .map_or_else(|| ":memory:".into(), |p| p.display().to_string())
    );

    let progress = EtlProgress {
        items: IndicatifProgress::track_bar(multi, Track::Items.as_ref()),
        sellers: IndicatifProgress::track_bar(multi, Track::Sellers.as_ref()),
        currency: IndicatifProgress::track_bar(multi, Track::Currency.as_ref()),
    };

    let summary = run_etl(&client, &mut warehouse, config, &progress).await;

    println!("\n{}", format_summary(&summary));

    Ok(summary.exit_code())
}

fn report_command(config: &EtlConfig, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = DuckDbWarehouse::open_read_only(&config.database_path)?;
    let conn = warehouse.connection();
    let items = config::table_ref(config, Track::Items);
    let sellers = config::table_ref(config, Track::Sellers);
    let currency = config::table_ref(config, Track::Currency);

    println!("Seller concentration (top {limit})");
    println!(
        "{:<14} {:>9} {:>8} {:>10}",
        "SELLER", "LISTINGS", "SHARE", "QTY_SALES"
    );
    for row in reports::seller_concentration(conn, &items, &sellers, limit)? {
        println!(
            "{:<14} {:>9} {:>7.1}% {:>10}",
            row.seller_id,
            row.listings,
            row.share * 100.0,
            row.qty_sales
                .map_or_else(|| "-".to_string(), |q| q.to_string())
        );
    }

    println!("\nAverage price");
    println!(
        "{:<9} {:>9} {:>14} {:>12}",
        "CURRENCY", "LISTINGS", "AVG_PRICE", "AVG_USD"
    );
    for row in reports::average_price_usd(conn, &items, &currency)? {
        println!(
            "{:<9} {:>9} {:>14.2} {:>12}",
            row.currency_id,
            row.listings,
            row.avg_price,
            row.avg_price_usd
                .map_or_else(|| "-".to_string(), |p| format!("{p:.2}"))
        );
    }

    println!("\nWarranty coverage");
    println!("{:<32} {:>9} {:>8}", "WARRANTY", "LISTINGS", "SHARE");
    for row in reports::warranty_coverage(conn, &items)? {
        println!(
            "{:<32} {:>9} {:>7.1}%",
            row.warranty_type,
            row.listings,
            row.share * 100.0
        );
    }

    println!("\nShipping mix");
    println!(
        "{:<16} {:<12} {:<6} {:>9} {:>8}",
        "LOGISTIC", "MODE", "FREE", "LISTINGS", "SHARE"
    );
    for row in reports::shipping_mix(conn, &items)? {
        println!(
            "{:<16} {:<12} {:<6} {:>9} {:>7.1}%",
            row.logistic_type,
            row.shipping_mode,
            row.free_shipping,
            row.listings,
            row.share * 100.0
        );
    }

    Ok(())
}

fn tables_command(config: &EtlConfig) -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = DuckDbWarehouse::open_read_only(&config.database_path)?;

    println!("{:<10} {:<40} ROWS", "TRACK", "TABLE");
    println!("{}", "-".repeat(60));
    for track in Track::ALL {
        let table = config::table_ref(config, track);
        let name = table.to_string();
        let rows = if warehouse.table_columns(&table)?.is_empty() {
            "missing".to_string()
        } else {
            warehouse.row_count(&table)?.to_string()
        };
        println!("{:<10} {name:<40} {rows}", track.as_ref());
    }

    Ok(())
}
