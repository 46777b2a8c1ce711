// src/bin/cocktails/cli.rs
use clap::{Parser, Subcommand};

/// Tour of a MongoDB cocktail recipe database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI", hide_env_values = true)]
    pub mongo_uri: String,

    /// Database name
    #[arg(long, default_value = "cocktails")]
    pub db: String,

    #[arg(long, default_value = "recipes")]
    pub recipes_collection: String,

    #[arg(long, default_value = "reviews")]
    pub reviews_collection: String,

    /// Defaults to `tour`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run every section in order
    Tour,

    /// List all cocktails by name
    List,

    /// Print the recipes with this exact name
    Find { name: String },

    /// Cocktails that use an ingredient
    Ingredient {
        name: String,

        /// Field to leave out of the results (repeatable)
        #[arg(long, default_value = "reviews")]
        exclude: Vec<String>,
    },

    /// Cocktails that use an ingredient, with their reviews joined in
    Reviews {
        #[arg(default_value = "Vodka")]
        ingredient: String,
    },

    /// Average rating of every cocktail
    Ratings,

    /// Print changes to the recipes collection until Ctrl-C
    Watch,

    /// Run a transaction that fails halfway and check nothing was written
    TransactionDemo,

    /// Append a review to a recipe
    Review {
        name: String,

        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(i64).range(1..=5))]
        rating: i64,
    },

    /// Insert the Negroni Sbagliato recipe
    Seed,
}
