// src/mongo.rs
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{info, instrument};

const APP_NAME: &str = "cocktails";

#[instrument(skip_all, fields(database = %config.database))]
pub async fn connect(config: &StoreConfig) -> Result<Client> {
    let mut client_options = ClientOptions::parse(&config.uri)
        .await
        .map_err(|err| match err.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => StoreError::Config(err.to_string()),
            _ => StoreError::from(err),
        })?;
    client_options
        .app_name
        .get_or_insert_with(|| APP_NAME.to_string());

    let client = Client::with_options(client_options)?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(StoreError::Connectivity)?;

    info!("connected to MongoDB");
    Ok(client)
}
