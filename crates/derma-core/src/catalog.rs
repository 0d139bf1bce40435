//! Static product catalog.
//!
//! Loaded once at startup into an immutable, cheaply clonable snapshot.
//! A default catalog is embedded at compile time from `data/catalog.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("reading catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateId(u32),
}

/// Controlled tag vocabulary for products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductTag {
    Oily,
    Dry,
    Normal,
    Sensitive,
    AllSkinTypes,
    /// Anything outside the vocabulary. Never matches a skin tag.
    #[serde(other)]
    Unknown,
}

fn default_brand() -> String {
    "Premium Brand".to_string()
}

fn default_usage() -> String {
    "Morning and evening".to_string()
}

fn not_available() -> String {
    "N/A".to_string()
}

fn default_affiliate_link() -> String {
    "#".to_string()
}

/// One catalog entry. Optional descriptive fields fall back to fixed defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: u32,
    #[serde(default = "default_brand")]
    pub brand: String,
    pub name: String,
    pub price: f64,
    pub image_url: String,
    #[serde(default = "default_usage")]
    pub usage: String,
    #[serde(default = "not_available")]
    pub ingredients: String,
    #[serde(default = "not_available")]
    pub benefits: String,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default = "default_affiliate_link")]
    pub affiliate_link: String,
    pub tags: Vec<ProductTag>,
}

impl ProductRecord {
    pub fn has_tag(&self, tag: ProductTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Immutable product snapshot, shared across threads without locking.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Arc<[ProductRecord]>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn from_records(records: Vec<ProductRecord>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id) {
                return Err(CatalogError::DuplicateId(record.id));
            }
        }

        let unknown = records
            .iter()
            .filter(|r| r.has_tag(ProductTag::Unknown))
            .map(|r| r.id)
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            tracing::warn!(ids = ?unknown, "products carry tags outside the vocabulary");
        }

        Ok(Self {
            products: records.into(),
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let records: Vec<ProductRecord> = serde_json::from_str(raw)?;
        Self::from_records(records)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), products = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// The catalog embedded in the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProductRecord> {
        self.products.iter()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
