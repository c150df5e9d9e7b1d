mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// Multi-row writes (run ingestion, cascading deletes) are atomic: either every
/// row lands or none does.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Identity operations
    fn upsert_identity(&self, profile: &ProviderProfile) -> Result<Identity>;
    fn get_identity(&self, id: &str) -> Result<Option<Identity>>;
    fn get_identity_by_github_id(&self, github_id: i64) -> Result<Option<Identity>>;
    fn get_identity_by_handle(&self, handle: &str) -> Result<Option<Identity>>;
    fn list_identities(&self, page: PageRequest) -> Result<Page<Identity>>;
    fn set_identity_role(&self, id: &str, role: Role) -> Result<Option<Identity>>;
    /// Removes the identity together with its repositories and runs.
    fn delete_identity(&self, id: &str) -> Result<bool>;

    // Repository operations
    fn upsert_repository(&self, owner_id: &str, input: &RepositoryInput) -> Result<Repository>;
    fn get_repository(&self, id: &str) -> Result<Option<Repository>>;
    /// Deletes a repository and its runs if `owner_id` owns it.
    fn delete_repository(&self, id: &str, owner_id: &str) -> Result<bool>;

    // Run operations
    /// Upserts the run's repository and inserts the run in one transaction.
    fn create_run(&self, owner_id: &str, run: &NewRun) -> Result<Run>;
    fn get_run(&self, id: &str) -> Result<Option<Run>>;
    fn list_identity_runs(&self, owner_id: &str, query: &RunQuery) -> Result<Page<Run>>;
    /// Fails with `NotFound` when the repository does not exist.
    fn list_repository_runs(&self, repository_id: &str, query: &RunQuery) -> Result<Page<Run>>;
    fn delete_run(&self, id: &str, owner_id: &str) -> Result<bool>;

    // Aggregation
    fn list_repositories_with_stats(
        &self,
        query: &RepositoryQuery,
    ) -> Result<Page<RepositoryWithStats>>;
    fn get_repository_with_stats(&self, id: &str) -> Result<Option<RepositoryWithStats>>;
    fn get_identity_stats(&self, owner_id: &str) -> Result<IdentityStats>;
}
