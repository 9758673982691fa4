pub mod context;
pub mod error;
pub mod image;
pub mod spec;
pub mod store;

pub use context::{ContextDocument, ContextStore};
pub use error::CatalogError;
pub use image::{ImageLocator, ImageRef};
pub use spec::{ProductSpec, SpecCatalog};
pub use store::{GcsStore, LocalStore, ObjectStore};

use std::sync::Arc;

/// Default object key of the product specification table.
pub const SPEC_CATALOG_KEY: &str = "spec_catalog.csv";

/// Load the spec catalog from the store; meant to run once at startup.
pub async fn load_catalog(store: &Arc<dyn ObjectStore>, key: &str) -> Result<SpecCatalog, CatalogError> {
    tracing::info!(uri = %store.uri(key), "Loading spec catalog");

    let bytes = store.fetch(key).await?;
    let catalog = SpecCatalog::from_csv(key, &bytes)?;

    tracing::info!(skus = catalog.len(), "Spec catalog loaded");
    Ok(catalog)
}
