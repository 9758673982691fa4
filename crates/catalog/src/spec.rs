use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::CatalogError;

pub const SKU_COLUMN: &str = "sku";

/// One row of the spec catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub sku: String,
    /// Non-empty cells keyed by column name.
    pub fields: BTreeMap<String, String>,
}

impl ProductSpec {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// SKU-indexed product specifications, read-only after load.
#[derive(Debug, Default)]
pub struct SpecCatalog {
    specs: HashMap<String, ProductSpec>,
}

impl SpecCatalog {
    /// Parse a CSV table with a header row containing a `sku` column.
    pub fn from_csv(key: &str, bytes: &[u8]) -> Result<Self, CatalogError> {
        let parse_error = |message: String| CatalogError::Parse {
            key: key.to_string(),
            message,
        };

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| parse_error(e.to_string()))?
            .clone();
        let sku_index = headers
            .iter()
            .position(|h| h == SKU_COLUMN)
            .ok_or_else(|| parse_error(format!("missing '{}' column", SKU_COLUMN)))?;

        let mut specs = HashMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| parse_error(e.to_string()))?;

            let sku = record.get(sku_index).unwrap_or_default();
            if sku.is_empty() {
                continue;
            }

            let fields = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(i, (_, value))| *i != sku_index && !value.is_empty())
                .map(|(_, (name, value))| (name.to_string(), value.to_string()))
                .collect();

            let spec = ProductSpec {
                sku: sku.to_string(),
                fields,
            };
            if specs.insert(spec.sku.clone(), spec).is_some() {
                tracing::warn!(sku, "Duplicate SKU in spec catalog, keeping the last row");
            }
        }

        Ok(Self { specs })
    }

    pub fn get(&self, sku: &str) -> Result<&ProductSpec, CatalogError> {
        self.specs
            .get(sku)
            .ok_or_else(|| CatalogError::not_found("SKU", sku))
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.specs.contains_key(sku)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
