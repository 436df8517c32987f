//! Example consumer: a service that exposes query gates using query-gate as a dependency.
//!
//! Run from repo root: `cargo run -p gate-consumer`
//! Set `QUERY_GATE_CONFIG` to a JSON/YAML gate file, or the built-in `Post` gate is served.
//! Without `DATABASE_URL` rows live in memory.

use query_gate::{
    build_document, export_document, load_from_path, resolve, router, ActionDefinition, AppState, DocumentFormat,
    EntityStore, GateRegistry, GateSettings, Gated, MemoryStore, PaginationMode, PgStore, QueryGate,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

struct Post;

impl Gated for Post {
    const ENTITY: &'static str = "App\\Models\\Post";

    fn gate() -> QueryGate {
        QueryGate::make(Self::ENTITY)
            .alias("posts")
            .filters([("title", "string|max:255"), ("status", "in:draft,published")])
            .sorts(["created_at", "title"])
            .pagination(PaginationMode::Classic)
            .cache(60)
            .actions([
                ActionDefinition::new("create").rules([("title", "required|string"), ("status", "nullable|string")]),
                ActionDefinition::new("update").rules([("title", "string"), ("status", "string")]),
                ActionDefinition::new("delete"),
            ])
            .version("2024-01-01", |v| v.filters([("title", "string")]))
            .version("2024-06-01", |v| v.filter("status", "in:draft,published"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("query_gate=info,gate_consumer=info")),
        )
        .init();

    let (gates, settings) = match std::env::var("QUERY_GATE_CONFIG") {
        Ok(path) => {
            let config = load_from_path(&path)?;
            (resolve(&config)?, config.settings)
        }
        Err(_) => (GateRegistry::new().with::<Post>()?, GateSettings::from_env()),
    };

    let store: Arc<dyn EntityStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            Arc::new(PgStore::new(pool))
        }
        Err(_) => {
            let memory = MemoryStore::new();
            memory.seed(
                "posts",
                [
                    json!({"title": "Hello", "status": "published", "created_at": "2024-01-02"}),
                    json!({"title": "Draft", "status": "draft", "created_at": "2024-03-04"}),
                ],
            );
            tracing::info!("DATABASE_URL not set; serving seeded in-memory rows");
            Arc::new(memory)
        }
    };

    let output = settings.openapi.output.clone();
    let format = settings.openapi.format.parse::<DocumentFormat>()?;
    let state = AppState::builder(gates, store).settings(settings).build()?;
    if let Some(path) = output {
        let document = build_document(&state.gates, &state.settings, &state.modifiers)?;
        export_document(&document, path, format)?;
    }

    let app = router(state);
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("gate consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
