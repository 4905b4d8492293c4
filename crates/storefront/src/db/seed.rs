//! YAML seed for the catalog and users.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Catalog, User};

/// Errors loading a seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse seed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid seed: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Contents of a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(flatten)]
    pub catalog: Catalog,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Seed {
    /// Parse and validate a seed document.
    ///
    /// # Errors
    ///
    /// Returns `SeedError::Parse` for malformed YAML and `SeedError::Invalid`
    /// listing every consistency problem found.
    pub fn from_yaml(source: &str) -> Result<Self, SeedError> {
        let seed: Self = serde_yaml::from_str(source)?;
        let problems = seed.problems();
        if problems.is_empty() {
            Ok(seed)
        } else {
            Err(SeedError::Invalid(problems))
        }
    }

    /// Read, parse and validate a seed file.
    ///
    /// # Errors
    ///
    /// See [`Seed::from_yaml`]; also fails if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let source = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Consistency problems: duplicate ids or keys and dangling references.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let catalog = &self.catalog;

        let mut product_ids = HashSet::new();
        let mut slugs = HashSet::new();
        let mut variant_ids = HashSet::new();
        for product in &catalog.products {
            if !product_ids.insert(product.id) {
                problems.push(format!("duplicate product id {}", product.id));
            }
            if !slugs.insert(product.slug.as_str()) {
                problems.push(format!("duplicate product slug {}", product.slug));
            }
            if product.variants.is_empty() {
                problems.push(format!("product {} has no variants", product.slug));
            }
            for variant in &product.variants {
                if !variant_ids.insert(variant.id) {
                    problems.push(format!("duplicate variant id {}", variant.id));
                }
                if variant.price.is_sign_negative() {
                    problems.push(format!("variant {} has a negative price", variant.sku));
                }
            }
            for taxon_id in &product.taxon_ids {
                if catalog.taxon(*taxon_id).is_none() {
                    problems.push(format!(
                        "product {} references unknown taxon {taxon_id}",
                        product.slug
                    ));
                }
            }
        }

        let mut permalinks = HashSet::new();
        for taxon in &catalog.taxons {
            if !permalinks.insert(taxon.permalink.as_str()) {
                problems.push(format!("duplicate taxon permalink {}", taxon.permalink));
            }
            if let Some(parent) = taxon.parent_id
                && catalog.taxon(parent).is_none()
            {
                problems.push(format!(
                    "taxon {} references unknown parent {parent}",
                    taxon.permalink
                ));
            }
        }

        let mut method_ids = HashSet::new();
        for method in &catalog.payment_methods {
            if !method_ids.insert(method.id) {
                problems.push(format!("duplicate payment method id {}", method.id));
            }
        }

        let mut user_ids = HashSet::new();
        let mut api_keys = HashSet::new();
        for user in &self.users {
            if !user_ids.insert(user.id) {
                problems.push(format!("duplicate user id {}", user.id));
            }
            if user.api_key.trim().is_empty() {
                problems.push(format!("user {} has a blank api key", user.id));
            } else if !api_keys.insert(user.api_key.as_str()) {
                problems.push(format!("user {} reuses another user's api key", user.id));
            }
        }

        problems
    }
}
