//! Catalog seed commands.

use std::path::Path;

use tracing::{error, info};

use corner_shop_storefront::db::{Seed, SeedError};

/// Load a seed file and report anything the storefront would trip over.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if it has
/// broken references.
pub fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!(path = %path.display(), "Loading seed file");
    let seed = match Seed::load(path) {
        Ok(seed) => seed,
        Err(SeedError::Invalid(problems)) => {
            error!("Seed validation failed:");
            for problem in &problems {
                error!("  - {problem}");
            }
            return Err(format!("{} problems found", problems.len()).into());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Seed file is valid");
    info!("  Products: {}", seed.catalog.products.len());
    info!("  Taxons: {}", seed.catalog.taxons.len());
    info!("  Shipping methods: {}", seed.catalog.shipping_methods.len());
    info!("  Payment methods: {}", seed.catalog.payment_methods.len());
    info!("  Users: {}", seed.users.len());
    Ok(())
}
