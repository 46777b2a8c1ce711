//! Typed access to a MongoDB cocktail recipe database.
//!
//! [`RecipeStore`] wraps the `recipes` and `reviews` collections: sorted and
//! filtered queries, declarative aggregation [`pipeline`]s, change streams,
//! multi-document transactions with an explicit session, and partial updates.

pub mod change;
pub mod config;
pub mod display;
pub mod error;
pub mod model;
pub mod mongo;
pub mod pipeline;
pub mod store;
pub mod transaction;

pub use change::{ChangeEvent, ChangeKind};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use model::{
    Amount, EmbeddedReview, Ingredient, Quantity, Rating, RatingSummary, Recipe, Review,
};
pub use pipeline::{
    Expr, Lookup, Pipeline, ProjectField, ProjectSpec, Projection, SortOrder, SortSpec, Stage,
};
pub use store::{RecipeStore, RecordStream, UpdateOutcome};
pub use transaction::{TransactionScope, TransactionSettings};
