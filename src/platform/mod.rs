pub mod github;

use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::validate::RepoReference;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the raw README text of `repo`.
    ///
    /// Fails with `Network`/`Timeout` for transient problems and `NotFound`
    /// when no README exists. A README that exists but is blank is returned
    /// as the empty string.
    async fn fetch(&self, repo: &RepoReference) -> Result<String>;
}
