// src/display.rs
use crate::change::ChangeEvent;
use bson::{Bson, Document};
use serde::Serialize;

/// A blank line, the title, and an underline of the same width.
pub fn banner(title: &str, underline: char) -> String {
    let rule: String = std::iter::repeat(underline)
        .take(title.chars().count())
        .collect();
    format!("\n{title}\n{rule}")
}

pub fn print_title(title: &str) {
    println!("{}", banner(title, '='));
}

/// Relaxed extended JSON, indented.
pub fn pretty_document(doc: &Document) -> String {
    let json = Bson::Document(doc.clone()).into_relaxed_extjson();
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| format!("{doc:?}"))
}

pub fn pretty<T: Serialize>(value: &T) -> String {
    match bson::to_document(value) {
        Ok(doc) => pretty_document(&doc),
        Err(err) => format!("<unprintable: {err}>"),
    }
}

pub fn describe_change(event: &ChangeEvent) -> String {
    let key = event
        .document_key
        .as_ref()
        .and_then(|key| key.get("_id"))
        .map(|id| match id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "-".to_string());
    let namespace = event.namespace.as_deref().unwrap_or("?");

    let mut line = format!("{} {namespace} {key}", event.kind);
    if let Some(doc) = &event.full_document {
        line.push('\n');
        line.push_str(&pretty_document(doc));
    }
    line
}
