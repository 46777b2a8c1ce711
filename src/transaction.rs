// src/transaction.rs
use crate::error::Result;
use crate::model::{Rating, Recipe, Review};
use crate::store::{Collections, UpdateOutcome};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use mongodb::options::{
    Acknowledgment, ReadConcern, ReadPreference, SelectionCriteria, TransactionOptions,
    WriteConcern,
};
use mongodb::ClientSession;
use std::time::Duration;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Read concern, write concern and read preference for one transaction.
#[derive(Debug, Clone)]
pub struct TransactionSettings {
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
    pub read_preference: ReadPreference,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        TransactionSettings {
            read_concern: ReadConcern::local(),
            write_concern: WriteConcern::builder()
                .w(Acknowledgment::Majority)
                .w_timeout(DEFAULT_WRITE_TIMEOUT)
                .build(),
            read_preference: ReadPreference::Primary,
        }
    }
}

impl TransactionSettings {
    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = read_concern;
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn to_options(&self) -> TransactionOptions {
        TransactionOptions::builder()
            .read_concern(self.read_concern.clone())
            .write_concern(self.write_concern.clone())
            .selection_criteria(SelectionCriteria::ReadPreference(
                self.read_preference.clone(),
            ))
            .build()
    }
}

/// The operations available inside [`crate::RecipeStore::run_transaction`].
///
/// Every method takes the transaction's session. A write made through any
/// other handle is outside the transaction and survives a rollback.
pub struct TransactionScope {
    collections: Collections,
}

impl TransactionScope {
    pub(crate) fn new(collections: Collections) -> Self {
        TransactionScope { collections }
    }

    pub async fn insert_recipe(
        &self,
        session: &mut ClientSession,
        recipe: &Recipe,
    ) -> Result<ObjectId> {
        self.collections.insert_recipe(recipe, Some(session)).await
    }

    pub async fn insert_review(
        &self,
        session: &mut ClientSession,
        review: &Review,
    ) -> Result<ObjectId> {
        self.collections.insert_review(review, Some(session)).await
    }

    pub async fn find_one_by_name(
        &self,
        session: &mut ClientSession,
        name: &str,
    ) -> Result<Option<Recipe>> {
        self.collections.find_one_by_name(name, Some(session)).await
    }

    pub async fn append_review(
        &self,
        session: &mut ClientSession,
        recipe_name: &str,
        rating: Rating,
        when: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        self.collections
            .append_review(recipe_name, rating, when, Some(session))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::options::ReadConcernLevel;

    #[test]
    fn defaults_are_local_majority_primary() {
        let options = TransactionSettings::default().to_options();

        assert!(matches!(
            options.read_concern.map(|rc| rc.level),
            Some(ReadConcernLevel::Local)
        ));
        let write_concern = options.write_concern.unwrap();
        assert!(matches!(write_concern.w, Some(Acknowledgment::Majority)));
        assert_eq!(write_concern.w_timeout, Some(Duration::from_millis(1000)));
        assert!(matches!(
            options.selection_criteria,
            Some(SelectionCriteria::ReadPreference(ReadPreference::Primary))
        ));
    }

    #[test]
    fn settings_can_be_overridden() {
        let options = TransactionSettings::default()
            .with_read_concern(ReadConcern::snapshot())
            .with_write_concern(WriteConcern::builder().w(Acknowledgment::Nodes(1)).build())
            .to_options();

        assert!(matches!(
            options.read_concern.map(|rc| rc.level),
            Some(ReadConcernLevel::Snapshot)
        ));
        assert!(matches!(
            options.write_concern.and_then(|wc| wc.w),
            Some(Acknowledgment::Nodes(1))
        ));
    }
}
