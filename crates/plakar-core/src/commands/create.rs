use tracing::info;
use uuid::Uuid;

use crate::config::CreateOptions;
use crate::error::Result;
use crate::repository::Repository;
use crate::storage;

/// Initialize a repository at `location`. Returns its id.
pub fn run(location: &str, options: CreateOptions) -> Result<Uuid> {
    let backend = storage::backend_for_location(location)?;
    let repo = Repository::create(backend, options)?;
    info!(repository = %repo.config.repository_id, location, "repository created");
    let id = repo.config.repository_id;
    repo.close()?;
    Ok(id)
}
