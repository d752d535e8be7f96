//! In-memory data source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sightline_core::{DataSourceError, EnrichmentPayload, EntityId};

use crate::DataSource;

/// Data source answering from a fixed map. Unknown ids are `NotFound`.
#[derive(Debug, Default)]
pub struct StaticDataSource {
    entities: HashMap<EntityId, EnrichmentPayload>,
    fetches: AtomicU64,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_id: EntityId, payload: impl Into<EnrichmentPayload>) -> Self {
        self.entities.insert(entity_id, payload.into());
        self
    }

    /// Number of `fetch` calls served so far, misses included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl FromIterator<(EntityId, EnrichmentPayload)> for StaticDataSource {
    fn from_iter<I: IntoIterator<Item = (EntityId, EnrichmentPayload)>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().collect(),
            fetches: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, entity_id: EntityId) -> Result<EnrichmentPayload, DataSourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.entities
            .get(&entity_id)
            .cloned()
            .ok_or(DataSourceError::NotFound { entity_id })
    }

    fn source_id(&self) -> &str {
        "static"
    }
}
