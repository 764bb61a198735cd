//! Metric-type registry: the read side used by the query engine plus the
//! CRUD operations exposed over HTTP.

mod store;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{MetricType, NewMetricType};
use crate::Result;

pub use store::DuckDbMetricRegistry;

#[async_trait]
pub trait MetricRegistry: Send + Sync {
    /// Looks up every id in `ids`. Ids with no stored row are absent from the
    /// returned map; soft-deleted rows are still returned.
    async fn resolve(&self, ids: &[i64]) -> Result<HashMap<i64, MetricType>>;

    /// All metric types that are not soft-deleted, ordered by id.
    async fn list(&self) -> Result<Vec<MetricType>>;

    async fn get(&self, id: i64) -> Result<Option<MetricType>>;

    /// `actor` is the id of the acting principal, recorded for auditing.
    async fn create(&self, new: NewMetricType, actor: Option<i64>) -> Result<MetricType>;

    /// Returns `None` when `id` does not exist or was soft-deleted.
    async fn update(
        &self,
        id: i64,
        new: NewMetricType,
        actor: Option<i64>,
    ) -> Result<Option<MetricType>>;

    async fn soft_delete(&self, id: i64, actor: Option<i64>) -> Result<()>;
}
