//! Process-lifetime cache of the ticketing platform's custom-field schema.
//!
//! The first caller triggers the paginated load; concurrent first-callers
//! observe a single in-flight load and all see the same immutable map.
//! There is no invalidation: the schema is assumed stable for the process
//! lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use tl_connectors::{ConnectorResult, FieldDescriptor, TicketSource};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Lazily loaded, write-once field registry.
pub struct FieldRegistry<S> {
    source: Arc<S>,
    fields: OnceCell<HashMap<u64, FieldDescriptor>>,
}

impl<S: TicketSource> FieldRegistry<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            fields: OnceCell::new(),
        }
    }

    /// Returns the field-id → descriptor map, loading it on first use.
    pub async fn get_fields(&self) -> ConnectorResult<&HashMap<u64, FieldDescriptor>> {
        self.fields
            .get_or_try_init(|| async {
                let list = self.source.list_ticket_fields().await?;
                info!(count = list.len(), "Loaded custom field schema");
                Ok(list.into_iter().map(|f| (f.id, f)).collect())
            })
            .await
    }

    /// Resolves a field id, synthesizing an Unknown descriptor for ids the
    /// schema does not cover.
    pub async fn descriptor(&self, id: u64) -> ConnectorResult<FieldDescriptor> {
        let fields = self.get_fields().await?;
        Ok(fields.get(&id).cloned().unwrap_or_else(|| {
            debug!(field_id = id, "Field id not in schema, synthesizing descriptor");
            Self::unknown_descriptor(id)
        }))
    }

    /// The synthetic descriptor used for unresolved field ids.
    pub fn unknown_descriptor(id: u64) -> FieldDescriptor {
        FieldDescriptor {
            id,
            title: format!("Field_{}", id),
            field_type: "unknown".to_string(),
            key: None,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_connectors::ticketing::MockTicketSource;

    fn descriptor(id: u64, title: &str, field_type: &str) -> FieldDescriptor {
        FieldDescriptor {
            id,
            title: title.to_string(),
            field_type: field_type.to_string(),
            key: Some(title.to_lowercase().replace(' ', "_")),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_loads_once_and_caches() {
        let source = Arc::new(
            MockTicketSource::new().with_field(descriptor(7, "Product Area", "tagger")),
        );
        let registry = FieldRegistry::new(Arc::clone(&source));

        let first = registry.get_fields().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = registry.get_fields().await.unwrap();
        assert_eq!(second.len(), 1);

        assert_eq!(source.field_load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_single_flight() {
        let source = Arc::new(
            MockTicketSource::new().with_field(descriptor(7, "Product Area", "tagger")),
        );
        let registry = Arc::new(FieldRegistry::new(Arc::clone(&source)));

        let a = Arc::clone(&registry);
        let b = Arc::clone(&registry);
        let (ra, rb) = tokio::join!(
            async move { a.get_fields().await.map(|m| m.len()) },
            async move { b.get_fields().await.map(|m| m.len()) },
        );

        assert_eq!(ra.unwrap(), 1);
        assert_eq!(rb.unwrap(), 1);
        assert_eq!(source.field_load_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_synthesizes_descriptor() {
        let source = Arc::new(MockTicketSource::new());
        let registry = FieldRegistry::new(source);

        let descriptor = registry.descriptor(12345).await.unwrap();
        assert_eq!(descriptor.title, "Field_12345");
        assert_eq!(descriptor.field_type, "unknown");
    }
}
