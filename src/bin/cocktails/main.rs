mod cli;
mod sections;

use crate::cli::{Cli, Command};

use anyhow::{Context, Result};
use clap::Parser;
use cocktails::{Rating, RecipeStore, StoreConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let config = StoreConfig::new(args.mongo_uri)?
        .with_database(args.db)
        .with_collections(args.recipes_collection, args.reviews_collection);
    let store = RecipeStore::connect(&config)
        .await
        .context("failed to connect to MongoDB")?;

    let result = match args.command.unwrap_or(Command::Tour) {
        Command::Tour => sections::tour(&store).await,
        Command::List => sections::all_documents(&store).await,
        Command::Find { name } => sections::by_name(&store, &name).await,
        Command::Ingredient { name, exclude } => {
            sections::by_ingredient(&store, &name, &exclude).await
        }
        Command::Reviews { ingredient } => sections::reviews(&store, &ingredient).await,
        Command::Ratings => sections::ratings(&store).await,
        Command::Watch => sections::watch(&store).await,
        Command::TransactionDemo => sections::transaction_demo(&store).await,
        Command::Review { name, rating } => {
            sections::add_review(&store, &name, Rating::new(rating)?).await
        }
        Command::Seed => sections::seed(&store).await,
    };

    store.shutdown().await;
    result
}
