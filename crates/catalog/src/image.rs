use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::spec::ProductSpec;

pub const IMAGE_FIELD: &str = "image_gcs_uri";
const DEFAULT_MIME: &str = "image/jpeg";

/// Product image reference passed to the model by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub uri: String,
    pub mime_type: String,
    /// Spec column the URI was read from.
    pub field: String,
}

/// Resolves a product's image from a column of its spec row.
#[derive(Debug, Clone)]
pub struct ImageLocator {
    field: String,
}

impl Default for ImageLocator {
    fn default() -> Self {
        Self::new(IMAGE_FIELD)
    }
}

impl ImageLocator {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    pub fn locate(&self, spec: &ProductSpec) -> Result<ImageRef, CatalogError> {
        let uri = spec
            .field(&self.field)
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| CatalogError::not_found("image", spec.sku.clone()))?;

        Ok(ImageRef {
            uri: uri.to_string(),
            mime_type: guess_mime(uri),
            field: self.field.clone(),
        })
    }
}

fn guess_mime(uri: &str) -> String {
    mime_guess::from_path(uri)
        .first_raw()
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}
