//! Load a catalog seed into `PostgreSQL`.
//!
//! The seed file is the same YAML document the in-memory store reads at
//! start-up. Rows are upserted by id, so re-running a seed updates prices
//! and stock in place.

use std::path::Path;

use tracing::{error, info};

use ecommerce_api::db::{self, postgres::PgStore, seed::CatalogSeed};

use super::{CommandError, database_url};

/// Validate and import `path`.
///
/// With `check_only` the file is validated and nothing is written.
///
/// # Errors
///
/// Returns `CommandError` if the file is unreadable or invalid, or the
/// import fails. A failed import writes nothing.
pub async fn catalog(path: &Path, check_only: bool) -> Result<(), CommandError> {
    info!(path = %path.display(), "Loading catalog seed");

    // Validate before connecting to the database
    let seed = match CatalogSeed::load(path).await {
        Ok(seed) => seed,
        Err(e) => {
            error!("Seed file rejected: {e}");
            return Err(e.into());
        }
    };

    info!(
        products = seed.products.len(),
        variations = seed.variations.len(),
        coupons = seed.coupons.len(),
        "Seed file is valid"
    );

    if check_only {
        return Ok(());
    }

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let report = PgStore::new(pool).import_seed(&seed).await?;

    info!("Seeding complete!");
    info!("  Products upserted: {}", report.products);
    info!("  Variations upserted: {}", report.variations);
    info!("  Coupons upserted: {}", report.coupons);

    Ok(())
}
