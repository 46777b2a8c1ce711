// src/config.rs
use crate::error::{Result, StoreError};

pub const URI_ENV: &str = "MONGODB_URI";
pub const DEFAULT_DATABASE: &str = "cocktails";
pub const DEFAULT_RECIPES_COLLECTION: &str = "recipes";
pub const DEFAULT_REVIEWS_COLLECTION: &str = "reviews";

const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// Where the recipe store lives. Passed to [`crate::RecipeStore::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub recipes_collection: String,
    pub reviews_collection: String,
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into().trim().to_string();
        if uri.is_empty() {
            return Err(StoreError::Config(format!("{URI_ENV} is empty")));
        }
        if !SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            return Err(StoreError::Config(format!(
                "connection string must start with one of {:?}",
                SCHEMES
            )));
        }

        Ok(StoreConfig {
            uri,
            database: DEFAULT_DATABASE.to_string(),
            recipes_collection: DEFAULT_RECIPES_COLLECTION.to_string(),
            reviews_collection: DEFAULT_REVIEWS_COLLECTION.to_string(),
        })
    }

    /// Reads the connection string through `lookup`, keyed by [`URI_ENV`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uri = lookup(URI_ENV)
            .ok_or_else(|| StoreError::Config(format!("{URI_ENV} is not set")))?;
        Self::new(uri)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_collections(
        mut self,
        recipes: impl Into<String>,
        reviews: impl Into<String>,
    ) -> Self {
        self.recipes_collection = recipes.into();
        self.reviews_collection = reviews.into();
        self
    }
}
