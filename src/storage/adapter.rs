use crate::core::error::Result;
use crate::core::types::{InsertOptions, InsertRequest, Poly, PolyList};
use crate::index::rebuild::RebuildReport;
use crate::query::types::QuerySpec;

/// Contract every storage medium implements.
///
/// Datasets must be created before documents can be written to or read from
/// them; those calls fail with `NotFound` otherwise, while `query`/`count`
/// fail with `NotConfigured`. Ids missing from a dataset are omitted from
/// `read`/`remove` results rather than reported as errors.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire resources and load persisted state.
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Flush persisted state and release resources.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Create a dataset, or return its configuration if it already exists.
    fn create(&self, dataset: &str) -> Result<Poly>;

    fn exists(&self, dataset: &str) -> Result<bool>;

    fn config(&self, dataset: &str) -> Result<Option<Poly>>;

    fn set_config(&self, dataset: &str, config: Poly) -> Result<Poly>;

    fn metadata(&self, dataset: &str) -> Result<Option<Poly>>;

    fn set_metadata(&self, dataset: &str, metadata: Poly) -> Result<Poly>;

    /// Every tag of the dataset with its count.
    fn index(&self, dataset: &str) -> Result<Poly>;

    /// Count and ordered membership of one tag, `None` if it was never used.
    fn tag_data(&self, dataset: &str, tag: &str) -> Result<Option<Poly>>;

    fn insert_with_options(
        &self,
        dataset: &str,
        options: &InsertOptions,
        requests: Vec<InsertRequest>,
    ) -> Result<PolyList>;

    fn insert(&self, dataset: &str, requests: Vec<InsertRequest>) -> Result<PolyList> {
        self.insert_with_options(dataset, &InsertOptions::default(), requests)
    }

    /// Upsert: replaces stored documents and their tag memberships.
    fn update(&self, dataset: &str, requests: Vec<InsertRequest>) -> Result<PolyList> {
        self.insert(dataset, requests)
    }

    fn read(&self, dataset: &str, ids: &[String]) -> Result<PolyList>;

    /// Returns the documents that were actually removed.
    fn remove(&self, dataset: &str, ids: &[String]) -> Result<PolyList>;

    fn query(&self, dataset: &str, spec: &QuerySpec) -> Result<PolyList>;

    fn count(&self, dataset: &str, spec: &QuerySpec) -> Result<u64>;

    /// One entry per dataset, id = dataset name.
    fn list(&self) -> Result<PolyList>;

    /// Rebuild the dataset's tag index from its stored documents.
    fn recalculate(&self, dataset: &str) -> Result<RebuildReport>;
}
