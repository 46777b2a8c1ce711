// src/change.rs
use crate::error::Result;
use crate::model::Recipe;
use bson::Document;
use mongodb::change_stream::event::{ChangeNamespace, ChangeStreamEvent, OperationType};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Replace,
    Delete,
    /// Stream-level events such as `drop` or `invalidate`.
    Other(String),
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => f.write_str("insert"),
            ChangeKind::Update => f.write_str("update"),
            ChangeKind::Replace => f.write_str("replace"),
            ChangeKind::Delete => f.write_str("delete"),
            ChangeKind::Other(name) => f.write_str(name),
        }
    }
}

impl From<&OperationType> for ChangeKind {
    fn from(operation: &OperationType) -> Self {
        match operation {
            OperationType::Insert => ChangeKind::Insert,
            OperationType::Update => ChangeKind::Update,
            OperationType::Replace => ChangeKind::Replace,
            OperationType::Delete => ChangeKind::Delete,
            OperationType::Drop => ChangeKind::Other("drop".to_string()),
            OperationType::Rename => ChangeKind::Other("rename".to_string()),
            OperationType::DropDatabase => ChangeKind::Other("dropDatabase".to_string()),
            OperationType::Invalidate => ChangeKind::Other("invalidate".to_string()),
            OperationType::Other(name) => ChangeKind::Other(name.clone()),
            other => ChangeKind::Other(format!("{other:?}")),
        }
    }
}

/// One event from [`crate::RecipeStore::watch_changes`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub document_key: Option<Document>,
    /// The document after the change. Always `None` for deletes.
    pub full_document: Option<Document>,
    pub namespace: Option<String>,
}

impl ChangeEvent {
    pub fn from_parts(
        operation: &OperationType,
        document_key: Option<Document>,
        full_document: Option<Document>,
        ns: Option<&ChangeNamespace>,
    ) -> Self {
        let kind = ChangeKind::from(operation);
        let full_document = match kind {
            ChangeKind::Delete => None,
            _ => full_document,
        };
        let namespace = ns.map(|ns| match &ns.coll {
            Some(coll) => format!("{}.{}", ns.db, coll),
            None => ns.db.clone(),
        });

        ChangeEvent {
            kind,
            document_key,
            full_document,
            namespace,
        }
    }

    /// Decodes the full document as a recipe, if the event carries one.
    pub fn recipe(&self) -> Result<Option<Recipe>> {
        self.full_document
            .as_ref()
            .map(|doc| bson::from_document(doc.clone()))
            .transpose()
            .map_err(Into::into)
    }
}

impl From<ChangeStreamEvent<Document>> for ChangeEvent {
    fn from(event: ChangeStreamEvent<Document>) -> Self {
        ChangeEvent::from_parts(
            &event.operation_type,
            event.document_key,
            event.full_document,
            event.ns.as_ref(),
        )
    }
}
