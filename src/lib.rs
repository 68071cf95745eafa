//! # srg: invoice ingestion, audit, and retrieval backend
//!
//! `srg` ingests business documents (invoices as PDF, image, or text),
//! extracts structured records through a prioritized parser chain, audits
//! them with deterministic rules plus an optional model-assisted pass,
//! indexes their text into a hybrid (dense + lexical) retrieval backend,
//! and serves a retrieval-augmented chat/search API over the corpus. A
//! materials catalog with synonym management and a weighted-average-cost
//! inventory ledger complete the back office.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence
//! is a single embedded SQLite database (WAL mode) with FTS5 mirrors
//! maintained by triggers, plus sidecar flat vector-index files kept in
//! parity with the chunk rows.
//!
//! ### Ingest hot path
//!
//! upload → text extraction + page classification → parser chain
//! (template, table-aware, vision) → invoice + items persist (price
//! history appends via trigger) → catalog auto-match → audit → chunk,
//! embed, publish.
//!
//! ### Query hot path
//!
//! chat request → session orchestration → hybrid retrieval (cache →
//! vector ∥ lexical → RRF → optional rerank) → prompt assembly → model
//! provider (generate or stream) → persist + memory fact extraction.
//!
//! A process-wide model-provider abstraction with a circuit breaker sits
//! underneath both the audit engine and chat generation.

pub mod api;
pub mod audit;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod indexer;
pub mod ingest;
pub mod insights;
pub mod inventory;
pub mod json_repair;
pub mod llm;
pub mod parser;
pub mod search;
pub mod telemetry;
pub mod types;

use crate::audit::AuditEngine;
use crate::catalog::CatalogReconciler;
use crate::chat::ChatOrchestrator;
use crate::indexer::Indexer;
use crate::ingest::IngestPipeline;
use crate::insights::InsightEvaluator;
use crate::inventory::InventoryLedger;
use crate::llm::ModelProvider;
use crate::search::HybridRetriever;
use crate::search::vector::SharedVectorIndex;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use bon::Builder;
pub use config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub provider: Arc<dyn ModelProvider>,
    pub retriever: Arc<HybridRetriever>,
    pub indexer: Arc<Indexer>,
    pub pipeline: Arc<IngestPipeline>,
    pub reconciler: Arc<CatalogReconciler>,
    pub audit: Arc<AuditEngine>,
    pub chat: Arc<ChatOrchestrator>,
    pub inventory: Arc<InventoryLedger>,
    pub insights: Arc<InsightEvaluator>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "srg",
        description = "Invoice ingestion, audit, and retrieval-augmented search API"
    ),
    paths(
        api::handlers::health::health,
        api::handlers::health::health_full,
        api::handlers::health::health_llm,
        api::handlers::health::health_db,
        api::handlers::health::health_search,
        api::handlers::invoices::upload_invoice,
        api::handlers::invoices::list_invoices,
        api::handlers::invoices::get_invoice,
        api::handlers::invoices::delete_invoice,
        api::handlers::invoices::audit_invoice,
        api::handlers::invoices::list_invoice_audits,
        api::handlers::invoices::match_catalog,
        api::handlers::invoices::match_item,
        api::handlers::documents::upload_document,
        api::handlers::documents::list_documents,
        api::handlers::documents::get_document,
        api::handlers::documents::reindex_document,
        api::handlers::documents::delete_document,
        api::handlers::documents::document_stats,
        api::handlers::search::search,
        api::handlers::search::quick_search,
        api::handlers::search::search_semantic,
        api::handlers::search::search_keyword,
        api::handlers::search::cache_stats,
        api::handlers::search::cache_invalidate,
        api::handlers::chat::chat,
        api::handlers::chat::chat_stream,
        api::handlers::sessions::list_sessions,
        api::handlers::sessions::create_session,
        api::handlers::sessions::get_session,
        api::handlers::sessions::delete_session,
        api::handlers::sessions::session_messages,
        api::handlers::sessions::session_summary,
        api::handlers::materials::add_to_catalog,
        api::handlers::materials::list_materials,
        api::handlers::materials::get_material,
        api::handlers::prices::price_history,
        api::handlers::prices::price_stats,
        api::handlers::inventory::receive,
        api::handlers::inventory::issue,
        api::handlers::inventory::status,
        api::handlers::inventory::movements,
        api::handlers::inventory::low_stock,
        api::handlers::inventory::create_sales_invoice,
        api::handlers::inventory::list_sales_invoices,
        api::handlers::inventory::get_sales_invoice,
        api::handlers::company::list_company_documents,
        api::handlers::company::create_company_document,
        api::handlers::company::get_company_document,
        api::handlers::company::update_company_document,
        api::handlers::company::delete_company_document,
        api::handlers::company::expiring_company_documents,
        api::handlers::company::check_expiry,
        api::handlers::company::list_reminders,
        api::handlers::company::create_reminder,
        api::handlers::company::update_reminder,
        api::handlers::company::delete_reminder,
        api::handlers::company::reminder_insights,
    )
)]
struct ApiDoc;

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(api::handlers::health::health))
        .route("/health/full", get(api::handlers::health::health_full))
        .route("/health/llm", get(api::handlers::health::health_llm))
        .route("/health/db", get(api::handlers::health::health_db))
        .route("/health/search", get(api::handlers::health::health_search))
        // Invoices
        .route("/invoices/upload", post(api::handlers::invoices::upload_invoice))
        .route("/invoices", get(api::handlers::invoices::list_invoices))
        .route("/invoices/{id}", get(api::handlers::invoices::get_invoice))
        .route("/invoices/{id}", delete(api::handlers::invoices::delete_invoice))
        .route("/invoices/{id}/audit", post(api::handlers::invoices::audit_invoice))
        .route("/invoices/{id}/audits", get(api::handlers::invoices::list_invoice_audits))
        .route("/invoices/{id}/match-catalog", post(api::handlers::invoices::match_catalog))
        .route(
            "/invoices/{id}/items/{item_id}/match",
            post(api::handlers::invoices::match_item),
        )
        // Catalog
        .route("/catalog", post(api::handlers::materials::add_to_catalog))
        .route("/catalog", get(api::handlers::materials::list_materials))
        .route("/catalog/{id}", get(api::handlers::materials::get_material))
        // Prices
        .route("/prices/history", get(api::handlers::prices::price_history))
        .route("/prices/stats", get(api::handlers::prices::price_stats))
        // Documents
        .route("/documents/upload", post(api::handlers::documents::upload_document))
        .route("/documents", get(api::handlers::documents::list_documents))
        .route("/documents/stats", get(api::handlers::documents::document_stats))
        .route("/documents/{id}", get(api::handlers::documents::get_document))
        .route("/documents/{id}", delete(api::handlers::documents::delete_document))
        .route("/documents/{id}/reindex", post(api::handlers::documents::reindex_document))
        // Search
        .route("/search", post(api::handlers::search::search))
        .route("/search/quick", get(api::handlers::search::quick_search))
        .route("/search/semantic", post(api::handlers::search::search_semantic))
        .route("/search/keyword", post(api::handlers::search::search_keyword))
        .route("/search/cache/stats", get(api::handlers::search::cache_stats))
        .route("/search/cache/invalidate", post(api::handlers::search::cache_invalidate))
        // Chat + sessions
        .route("/chat", post(api::handlers::chat::chat))
        .route("/chat/stream", post(api::handlers::chat::chat_stream))
        .route("/sessions", get(api::handlers::sessions::list_sessions))
        .route("/sessions", post(api::handlers::sessions::create_session))
        .route("/sessions/{id}", get(api::handlers::sessions::get_session))
        .route("/sessions/{id}", delete(api::handlers::sessions::delete_session))
        .route("/sessions/{id}/messages", get(api::handlers::sessions::session_messages))
        .route("/sessions/{id}/summary", get(api::handlers::sessions::session_summary))
        // Inventory + sales
        .route("/inventory/receive", post(api::handlers::inventory::receive))
        .route("/inventory/issue", post(api::handlers::inventory::issue))
        .route("/inventory/status", get(api::handlers::inventory::status))
        .route("/inventory/low-stock", get(api::handlers::inventory::low_stock))
        .route("/inventory/{id}/movements", get(api::handlers::inventory::movements))
        .route("/sales/invoices", post(api::handlers::inventory::create_sales_invoice))
        .route("/sales/invoices", get(api::handlers::inventory::list_sales_invoices))
        .route("/sales/invoices/{id}", get(api::handlers::inventory::get_sales_invoice))
        // Company documents, reminders, insights
        .route(
            "/company-documents",
            get(api::handlers::company::list_company_documents)
                .post(api::handlers::company::create_company_document),
        )
        .route(
            "/company-documents/expiring",
            get(api::handlers::company::expiring_company_documents),
        )
        .route(
            "/company-documents/check-expiry",
            post(api::handlers::company::check_expiry),
        )
        .route(
            "/company-documents/{id}",
            get(api::handlers::company::get_company_document),
        )
        .route(
            "/company-documents/{id}",
            put(api::handlers::company::update_company_document),
        )
        .route(
            "/company-documents/{id}",
            delete(api::handlers::company::delete_company_document),
        )
        .route("/reminders", get(api::handlers::company::list_reminders))
        .route("/reminders", post(api::handlers::company::create_reminder))
        .route("/reminders/insights", get(api::handlers::company::reminder_insights))
        .route("/reminders/{id}", put(api::handlers::company::update_reminder))
        .route("/reminders/{id}", delete(api::handlers::company::delete_reminder))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(errors::envelope_path_middleware))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct that owns all resources and lifecycle.
pub struct Application {
    router: Router,
    state: AppState,
    host: String,
    port: u16,
}

impl Application {
    /// Wire every component: open the store, run migrations, load the
    /// vector indexes, construct the provider, and assemble the router.
    /// Issues a provider warmup probe; an unhealthy provider logs and
    /// degrades rather than aborting startup.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config.storage).await?;

        let provider = llm::build_provider(&config.llm, &config.embedding);

        let chunks_index = Arc::new(
            SharedVectorIndex::open(config.storage.chunks_index_path(), config.embedding.dimension)
                .await,
        );
        let items_index = Arc::new(
            SharedVectorIndex::open(config.storage.items_index_path(), config.embedding.dimension)
                .await,
        );

        let retriever = Arc::new(HybridRetriever::new(
            pool.clone(),
            provider.clone(),
            chunks_index.clone(),
            config.search.clone(),
            &config.cache,
            &config.llm,
        ));
        let indexer = Arc::new(Indexer::new(
            pool.clone(),
            provider.clone(),
            chunks_index,
            items_index,
            config.search.clone(),
            config.embedding.clone(),
        ));
        let reconciler = Arc::new(CatalogReconciler::new(pool.clone()));
        let audit = Arc::new(AuditEngine::new(
            pool.clone(),
            provider.clone(),
            Some(retriever.clone()),
        ));
        let registry = Arc::new(parser::ParserRegistry::new(
            provider.clone(),
            config.storage.vision_cache_dir(),
        ));
        let pipeline = Arc::new(IngestPipeline::new(
            pool.clone(),
            config.storage.clone(),
            registry,
            indexer.clone(),
            reconciler.clone(),
            audit.clone(),
        ));
        let chat = Arc::new(ChatOrchestrator::new(
            pool.clone(),
            provider.clone(),
            retriever.clone(),
            config.chat.clone(),
        ));
        let inventory = Arc::new(InventoryLedger::new(pool.clone()));
        let insights = Arc::new(InsightEvaluator::new(pool.clone()));

        // Warmup probe: logs provider state without gating startup.
        let health = provider.check_health().await;
        if health.available {
            info!(model = %health.identifier, latency_ms = health.latency_ms, "model provider ready");
        } else {
            tracing::warn!(
                model = %health.identifier,
                error = health.error.as_deref().unwrap_or("unknown"),
                "model provider unavailable at startup; model-assisted features degrade"
            );
        }

        let state = AppState::builder()
            .pool(pool)
            .config(config.clone())
            .provider(provider)
            .retriever(retriever)
            .indexer(indexer)
            .pipeline(pipeline)
            .reconciler(reconciler)
            .audit(audit)
            .chat(chat)
            .inventory(inventory)
            .insights(insights)
            .build();

        let router = build_router(state.clone());

        Ok(Self {
            router,
            state,
            host: config.host,
            port: config.port,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until the shutdown future resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let address = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&address).await?;
        info!(address = %address, "listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, StorageConfig};

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        // Keep the directory for the lifetime of the test process.
        #[allow(deprecated)]
        let path = dir.into_path();
        let config = Config {
            storage: StorageConfig {
                data_dir: path,
                ..Default::default()
            },
            embedding: EmbeddingConfig {
                dimension: 32,
                ..Default::default()
            },
            llm: crate::config::LlmConfig {
                provider: "inprocess".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let app = Application::new(config).await.unwrap();
        app.state().clone()
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let state = test_state().await;
        let server = axum_test::TestServer::new(build_router(state)).unwrap();

        let response = server.get("/api/health").await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn error_envelope_carries_code_path_and_timestamp() {
        let state = test_state().await;
        let server = axum_test::TestServer::new(build_router(state)).unwrap();

        let missing = uuid::Uuid::new_v4();
        let response = server.get(&format!("/api/invoices/{missing}")).await;
        response.assert_status_not_found();

        let body: serde_json::Value = response.json();
        assert_eq!(body["error_code"], "INVOICE_NOT_FOUND");
        assert_eq!(body["path"], format!("/api/invoices/{missing}"));
        assert!(body["timestamp"].as_str().is_some());
        assert!(body["message"].as_str().unwrap().contains(&missing.to_string()));
    }

    #[tokio::test]
    async fn empty_search_query_returns_empty_results() {
        let state = test_state().await;
        let server = axum_test::TestServer::new(build_router(state)).unwrap();

        let response = server
            .post("/api/search")
            .json(&serde_json::json!({"query": "   "}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["results"].as_array().unwrap().len(), 0);
        assert_eq!(body["cache_hit"], false);
    }

    #[tokio::test]
    async fn insufficient_stock_maps_to_conflict_envelope() {
        let state = test_state().await;
        let pool = state.pool.clone();
        let material = crate::db::handlers::Materials::create(
            &pool,
            &crate::db::models::MaterialCreate {
                display_name: "Test Material".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        state.inventory.receive(&material.id, 2.0, 5.0, None).await.unwrap();

        let server = axum_test::TestServer::new(build_router(state)).unwrap();
        let response = server
            .post("/api/inventory/issue")
            .json(&serde_json::json!({"material_id": material.id, "quantity": 10.0}))
            .await;
        response.assert_status(axum::http::StatusCode::CONFLICT);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error_code"], "INSUFFICIENT_STOCK");
        assert_eq!(body["detail"]["available"], 2.0);
        assert_eq!(body["detail"]["requested"], 10.0);
    }
}
