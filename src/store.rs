// src/store.rs
use crate::change::ChangeEvent;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::{EmbeddedReview, Rating, Recipe, Review};
use crate::mongo::connect;
use crate::pipeline::{ingredient_filter, Pipeline, Projection};
use crate::transaction::{TransactionScope, TransactionSettings};

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use futures::FutureExt;
use mongodb::options::FullDocumentType;
use mongodb::{Client, ClientSession, Collection};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

/// Lazily fetched query results.
pub type RecordStream<T> = BoxStream<'static, Result<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

impl UpdateOutcome {
    pub fn found(&self) -> bool {
        self.matched > 0
    }
}

/// Collection handles shared by the store and its transaction scopes.
#[derive(Clone)]
pub(crate) struct Collections {
    recipes: Collection<Recipe>,
    recipe_documents: Collection<Document>,
    reviews: Collection<Review>,
    reviews_name: String,
}

impl Collections {
    fn new(client: &Client, config: &StoreConfig) -> Self {
        let db = client.database(&config.database);
        Collections {
            recipes: db.collection::<Recipe>(&config.recipes_collection),
            recipe_documents: db.collection::<Document>(&config.recipes_collection),
            reviews: db.collection::<Review>(&config.reviews_collection),
            reviews_name: config.reviews_collection.clone(),
        }
    }

    pub(crate) async fn insert_recipe(
        &self,
        recipe: &Recipe,
        session: Option<&mut ClientSession>,
    ) -> Result<ObjectId> {
        let action = self.recipes.insert_one(recipe);
        let result = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };
        object_id(result.inserted_id)
    }

    pub(crate) async fn insert_review(
        &self,
        review: &Review,
        session: Option<&mut ClientSession>,
    ) -> Result<ObjectId> {
        let action = self.reviews.insert_one(review);
        let result = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };
        object_id(result.inserted_id)
    }

    pub(crate) async fn find_one_by_name(
        &self,
        name: &str,
        session: Option<&mut ClientSession>,
    ) -> Result<Option<Recipe>> {
        let action = self.recipes.find_one(doc! { "name": name });
        let found = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };
        Ok(found)
    }

    pub(crate) async fn append_review(
        &self,
        recipe_name: &str,
        rating: Rating,
        when: DateTime<Utc>,
        session: Option<&mut ClientSession>,
    ) -> Result<UpdateOutcome> {
        let review = bson::to_bson(&EmbeddedReview::new(rating, when))?;
        let action = self.recipe_documents.update_one(
            doc! { "name": recipe_name },
            doc! { "$push": { "reviews": review } },
        );
        let result = match session {
            Some(session) => action.session(session).await?,
            None => action.await?,
        };
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }
}

fn object_id(id: Bson) -> Result<ObjectId> {
    match id {
        Bson::ObjectId(oid) => Ok(oid),
        other => Err(StoreError::UnexpectedId(other)),
    }
}

/// Typed access to the `recipes` and `reviews` collections.
pub struct RecipeStore {
    client: Client,
    collections: Collections,
}

impl RecipeStore {
    /// Connects, pings the deployment and binds the configured collections.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = connect(config).await?;
        Ok(Self::new(client, config))
    }

    pub fn new(client: Client, config: &StoreConfig) -> Self {
        let collections = Collections::new(&client, config);
        RecipeStore {
            client,
            collections,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn reviews_collection(&self) -> &str {
        &self.collections.reviews_name
    }

    /// Closes every pooled connection.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        debug!("client shut down");
    }

    /// Every recipe, ordered by name.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Recipe>> {
        let recipes: Vec<Recipe> = self
            .collections
            .recipes
            .find(doc! {})
            .sort(doc! { "name": 1 })
            .await?
            .try_collect()
            .await?;
        debug!(count = recipes.len(), "listed recipes");
        Ok(recipes)
    }

    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<RecordStream<Recipe>> {
        let cursor = self
            .collections
            .recipes
            .find(doc! { "name": name })
            .await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    pub async fn find_one_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        self.collections.find_one_by_name(name, None).await
    }

    #[instrument(skip(self, exclude))]
    pub async fn find_by_ingredient(
        &self,
        ingredient: &str,
        exclude: &Projection,
    ) -> Result<RecordStream<Recipe>> {
        let mut action = self.collections.recipes.find(ingredient_filter(ingredient));
        if let Some(projection) = exclude.to_document() {
            action = action.projection(projection);
        }
        let cursor = action.await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    #[instrument(skip_all, fields(stages = pipeline.stages().len()))]
    pub async fn aggregate(&self, pipeline: &Pipeline) -> Result<RecordStream<Document>> {
        let cursor = self
            .collections
            .recipe_documents
            .aggregate(pipeline.to_documents())
            .await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    /// Like [`RecipeStore::aggregate`], decoding each row as `T`.
    pub async fn aggregate_as<T>(&self, pipeline: &Pipeline) -> Result<RecordStream<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync + 'static,
    {
        let cursor = self
            .collections
            .recipe_documents
            .aggregate(pipeline.to_documents())
            .await?
            .with_type::<T>();
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    /// Opens a change stream on the recipes collection. The stream never ends
    /// on its own; drop it to stop watching.
    #[instrument(skip(self))]
    pub async fn watch_changes(&self) -> Result<RecordStream<ChangeEvent>> {
        let stream = self
            .collections
            .recipe_documents
            .watch()
            .full_document(FullDocumentType::UpdateLookup)
            .await?;
        info!("watching recipes for changes");
        Ok(stream
            .map(|event| event.map(ChangeEvent::from).map_err(StoreError::from))
            .boxed())
    }

    pub async fn insert_recipe(&self, recipe: &Recipe) -> Result<ObjectId> {
        self.collections.insert_recipe(recipe, None).await
    }

    pub async fn insert_review(&self, review: &Review) -> Result<ObjectId> {
        self.collections.insert_review(review, None).await
    }

    /// Pushes one review onto the named recipe's embedded `reviews` array.
    #[instrument(skip(self))]
    pub async fn append_review(
        &self,
        recipe_name: &str,
        rating: Rating,
        when: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let outcome = self
            .collections
            .append_review(recipe_name, rating, when, None)
            .await?;
        if !outcome.found() {
            debug!("no recipe matched");
        }
        Ok(outcome)
    }

    /// Runs `body` inside a multi-document transaction.
    ///
    /// The driver retries the whole body on errors labelled
    /// `TransientTransactionError` and retries the commit on an unknown commit
    /// result. Any error the body itself returns aborts the transaction and is
    /// returned as [`StoreError::Transaction`] after a single execution.
    #[instrument(skip_all)]
    pub async fn run_transaction<F>(
        &self,
        settings: &TransactionSettings,
        mut body: F,
    ) -> Result<()>
    where
        F: for<'s> FnMut(
            &'s mut ClientSession,
            &'s mut TransactionScope,
        ) -> BoxFuture<'s, Result<()>>,
    {
        let mut session = self.client.start_session().await?;
        let scope = TransactionScope::new(self.collections.clone());
        let mut attempts = 0u32;

        let outcome = session
            .start_transaction()
            .with_options(settings.to_options())
            .and_run(scope, |session, scope| {
                attempts += 1;
                debug!(attempt = attempts, "running transaction body");
                let run = body(session, scope);
                async move { run.await.map_err(StoreError::into_driver) }.boxed()
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(attempts, "transaction committed");
                Ok(())
            }
            Err(err) => {
                let err = StoreError::from(err);
                warn!(attempts, error = %err, "transaction aborted");
                Err(err)
            }
        }
    }
}
