mod catalog;
mod engine;
mod handlers;
mod models;
mod parsers;
#[cfg(test)]
mod scenarios;
mod store;
mod workflow;
mod xml;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use handlers::*;
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub db: sqlx::PgPool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter("info,declaration_service=debug")
        .init();

    info!("Starting Declaration Service...");

    let config = common::config::ServiceConfig::from_env("declaration")?;
    let pool = database::connect(&config).await?;
    store::catalog::apply_seed(&pool).await?;

    let app_state = Arc::new(AppState { db: pool });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/taxpayers", post(create_taxpayer))
        .route("/taxpayers/:id", get(get_taxpayer))
        .route("/source-records", post(ingest))
        .route("/source-records/upload", post(ingest_upload))
        .route("/source-records/:id/parse", post(parse_source_record))
        .route("/source-records/:id/reparse", post(reparse_source_record))
        .route("/source-records/:id", delete(deactivate_source_record))
        .route("/tax-events", get(list_tax_events))
        .route("/engine-runs", post(run_engine))
        .route("/declarations/generate", post(generate_declaration))
        .route("/declarations/:id", get(get_declaration))
        .route("/declarations/:id/validate", post(validate_declaration))
        .route("/declarations/:id/status", put(transition_declaration))
        .route("/declarations/:id/xml", post(project_declaration_xml))
        .route("/declarations/:id/xml/latest", get(latest_declaration_xml))
        .route("/catalog/event-types", get(list_event_types).post(create_event_type))
        .route("/catalog/logical-fields", get(list_logical_fields).post(create_logical_field))
        .route("/catalog/rules", get(list_rules).post(create_rule))
        .route("/catalog/rules/:id/active", put(set_rule_active))
        .route("/catalog/xml-field-map", get(list_xml_field_maps))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Declaration service listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
