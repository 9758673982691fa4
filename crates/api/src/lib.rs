pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod routes;

pub use config::AppConfig;
pub use error::AnalysisError;
pub use pipeline::{Analysis, Analyzer};
pub use routes::{AppState, router};

use anyhow::Context;
use catalog::{ContextStore, GcsStore, ImageLocator, LocalStore, ObjectStore};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use vision::{VertexClient, VertexConfig};

use crate::metrics::Metrics;
use crate::retry::RetryPolicy;

/// Wire the object store, spec catalog and model client from configuration.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn ObjectStore> = match &config.storage.local_root {
        Some(root) => {
            tracing::info!(root = %root.display(), "Using local object store");
            Arc::new(LocalStore::new(root))
        }
        None => Arc::new(
            GcsStore::new(&config.storage.bucket)
                .with_base_url(&config.storage.base_url)
                .with_access_token(config.gcp.access_token.clone())
                .with_timeout(config.storage_timeout()),
        ),
    };

    let catalog = catalog::load_catalog(&store, &config.storage.spec_catalog_key)
        .await
        .context("Failed to load spec catalog")?;

    let model = VertexClient::new(VertexConfig {
        project: config.gcp.project_id.clone(),
        location: config.gcp.location.clone(),
        model: config.model.name.clone(),
        base_url: config.model.base_url.clone(),
        access_token: config.gcp.access_token.clone(),
        timeout: config.model_timeout(),
        generation: config.model.generation.clone(),
    });
    tracing::info!(model = %config.model.name, endpoint = %model.endpoint(), "Model client ready");

    let analyzer = Analyzer::new(
        Arc::new(catalog),
        ContextStore::with_prefix(store, &config.storage.context_prefix),
        Arc::new(model),
        Metrics::new(),
    )
    .with_image_locator(ImageLocator::new(&config.storage.image_field))
    .with_retry(RetryPolicy::from(&config.retry))
    .with_model_timeout(config.model_timeout());

    Ok(Arc::new(AppState::new(analyzer)))
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::fixture_store;

    #[tokio::test]
    async fn builds_state_from_local_store() {
        let (dir, _store) = fixture_store();
        let mut config = AppConfig::default();
        config.gcp.project_id = "alara-case-study".to_string();
        config.storage.bucket = "alara-case-study-bucket".to_string();
        config.storage.local_root = Some(dir.path().to_path_buf());

        let state = build_state(&config).await.unwrap();
        assert_eq!(state.analyzer.catalog().len(), 2);
    }

    #[tokio::test]
    async fn missing_catalog_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.local_root = Some(dir.path().to_path_buf());

        let err = build_state(&config).await.err().unwrap();
        assert!(err.to_string().contains("spec catalog"));
    }
}
