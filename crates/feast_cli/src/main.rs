//! `feast` command line front-end.
//!
//! # Responsibility
//! - Load config, start logging and open the store.
//! - Expose sync/list/fetch for manual checks against the live API.

use clap::{Parser, Subcommand};
use feast_core::{
    init_logging_from_config, DatabaseManager, FeastApi, FeastConfig, RestaurantSyncService,
    StageOutcome, StoredRestaurant,
};
use std::error::Error;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "feast", version, about = "Restaurant store sync tool")]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "FEAST_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `api.base_url`.
    #[arg(long, env = "FEAST_BASE_URL")]
    base_url: Option<String>,

    /// Overrides `store.directory`.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch restaurants and persist them.
    Sync,
    /// Fetch restaurants without saving them.
    Fetch,
    /// List stored restaurants.
    List {
        /// Read from the store file instead of the working layer.
        #[arg(long)]
        persisted: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => FeastConfig::load(path)?,
        None => FeastConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(store_dir) = cli.store_dir {
        config.store.directory = Some(store_dir);
    }
    config.validate()?;

    if let Err(err) = init_logging_from_config(&config.logging) {
        eprintln!("warning: logging disabled: {err}");
    }

    let (manager, migration_performed) = DatabaseManager::start(config.store.to_options()).await;
    if migration_performed {
        println!("store migrated: {}", manager.store_path().display());
    }

    match cli.command {
        Command::Sync => {
            let api = FeastApi::new(&config.api, manager.clone())?;
            let summary = RestaurantSyncService::new(api, manager.clone())
                .sync()
                .await?;
            println!("fetched {} restaurants", summary.fetched);
            for (stage, outcome) in [
                ("validation", &summary.cascade.validation),
                ("working", &summary.cascade.working),
                ("persistent", &summary.cascade.persistent),
            ] {
                match outcome {
                    StageOutcome::Saved { rows } => println!("  {stage}: saved {rows}"),
                    StageOutcome::Failed { error } => println!("  {stage}: failed: {error}"),
                    StageOutcome::Pending => println!("  {stage}: pending"),
                }
            }
        }
        Command::Fetch => {
            let api = FeastApi::new(&config.api, manager.clone())?;
            for restaurant in api.fetch_restaurants().await? {
                println!("{}\t{}", restaurant.identifier, restaurant.name);
            }
        }
        Command::List { persisted } => {
            let rows = if persisted {
                manager.persisted_restaurants().await?
            } else {
                manager.restaurants().await?
            };
            print_rows(&rows);
        }
    }
    Ok(())
}

fn print_rows(rows: &[StoredRestaurant]) {
    for row in rows {
        println!(
            "{}\t{}\t{}\t{}",
            row.object_id,
            row.restaurant.index,
            row.identifier(),
            row.name()
        );
    }
    println!("{} restaurants", rows.len());
}
