use super::{Page, PageCursor, RemoteItemSource, SourceDescriptor};
use crate::core::{CollectionError, Item, ItemId, Params, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    item_type: String,
    params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConnectionKey {
    connection: String,
    owner: Item,
}

#[derive(Default)]
struct SourceState {
    queries: HashMap<QueryKey, Vec<ItemId>>,
    connections: HashMap<ConnectionKey, Vec<ItemId>>,
    /// Overrides the total reported with each page.
    reported_total: Option<usize>,
    latency: Option<Duration>,
    fetch_log: Vec<PageCursor>,
    failing_fetches: usize,
    failing_mirrors: usize,
    mirror_count: usize,
}

/// An in-memory implementation of `RemoteItemSource`.
///
/// Serves pages out of registered identifier lists and applies mirrored
/// edits to connection lists. Latency and failures can be injected to
/// exercise the asynchronous paths of a collection.
#[derive(Clone, Default)]
pub struct InMemoryItemSource {
    state: Arc<Mutex<SourceState>>,
}

impl InMemoryItemSource {
    /// Creates a new, empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the result of a query over `item_type` with `params`.
    pub async fn register_query<I, S>(&self, item_type: &str, params: Params, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        let key = QueryKey {
            item_type: item_type.to_string(),
            params,
        };
        let mut state = self.state.lock().await;
        state
            .queries
            .insert(key, ids.into_iter().map(Into::into).collect());
    }

    /// Registers the members of `owner`'s `connection`.
    pub async fn register_connection<I, S>(&self, owner: &Item, connection: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        let key = ConnectionKey {
            connection: connection.to_string(),
            owner: owner.clone(),
        };
        let mut state = self.state.lock().await;
        state
            .connections
            .insert(key, ids.into_iter().map(Into::into).collect());
    }

    /// Current members of a connection, after mirrored edits.
    pub async fn connection_ids(&self, owner: &Item, connection: &str) -> Option<Vec<ItemId>> {
        let key = ConnectionKey {
            connection: connection.to_string(),
            owner: owner.clone(),
        };
        let state = self.state.lock().await;
        state.connections.get(&key).cloned()
    }

    /// Delays every remote call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Reports `total` as the estimate with every page instead of the list length.
    pub async fn set_reported_total(&self, total: Option<usize>) {
        self.state.lock().await.reported_total = total;
    }

    /// Makes the next `count` page fetches fail.
    pub async fn fail_next_fetches(&self, count: usize) {
        self.state.lock().await.failing_fetches = count;
    }

    /// Makes the next `count` mirror calls fail.
    pub async fn fail_next_mirrors(&self, count: usize) {
        self.state.lock().await.failing_mirrors = count;
    }

    /// Number of page fetches served, failed ones included.
    pub async fn fetch_count(&self) -> usize {
        self.state.lock().await.fetch_log.len()
    }

    /// Cursors of every page fetch, in arrival order.
    pub async fn fetch_log(&self) -> Vec<PageCursor> {
        self.state.lock().await.fetch_log.clone()
    }

    /// Number of mirror calls received, failed ones included.
    pub async fn mirror_count(&self) -> usize {
        self.state.lock().await.mirror_count
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn connection_key(source: &SourceDescriptor) -> Result<ConnectionKey> {
        match source {
            SourceDescriptor::Connection {
                connection, owner, ..
            } => Ok(ConnectionKey {
                connection: connection.clone(),
                owner: owner.clone(),
            }),
            other => Err(CollectionError::RemoteFailure(format!(
                "edits can only be mirrored to connections, got {:?}",
                other
            ))),
        }
    }

    /// Runs `apply` against the connection list behind `source`, honoring
    /// injected failures.
    async fn mirror<F>(&self, source: &SourceDescriptor, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<ItemId>) -> Result<()>,
    {
        self.simulate_latency().await;
        let key = Self::connection_key(source)?;

        let mut state = self.state.lock().await;
        state.mirror_count += 1;
        if state.failing_mirrors > 0 {
            state.failing_mirrors -= 1;
            return Err(CollectionError::RemoteFailure(format!(
                "injected mirror failure on '{}'",
                key.connection
            )));
        }

        let ids = state.connections.entry(key).or_default();
        apply(ids)
    }
}

#[async_trait]
impl RemoteItemSource for InMemoryItemSource {
    async fn fetch_page(
        &self,
        item_type: &str,
        source: &SourceDescriptor,
        cursor: PageCursor,
    ) -> Result<Page> {
        self.simulate_latency().await;

        let mut state = self.state.lock().await;
        state.fetch_log.push(cursor);
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(CollectionError::RemoteFailure(format!(
                "injected fetch failure at offset {}",
                cursor.offset
            )));
        }

        let ids = match source {
            SourceDescriptor::Query { params } => state.queries.get(&QueryKey {
                item_type: item_type.to_string(),
                params: params.clone(),
            }),
            SourceDescriptor::Connection { .. } => {
                state.connections.get(&Self::connection_key(source)?)
            }
            SourceDescriptor::LocalEmpty | SourceDescriptor::LocalWithIds => {
                return Err(CollectionError::RemoteFailure(
                    "local collections have no remote pages".to_string(),
                ));
            }
        };

        let Some(ids) = ids else {
            return Ok(Page::default());
        };

        let start = cursor.offset.min(ids.len());
        let end = start.saturating_add(cursor.limit).min(ids.len());
        Ok(Page {
            ids: ids[start..end].to_vec(),
            total_estimate: state.reported_total.unwrap_or(ids.len()),
            has_more: end < ids.len(),
        })
    }

    async fn mirror_add(&self, source: &SourceDescriptor, id: &ItemId) -> Result<()> {
        self.mirror(source, |ids| {
            if !ids.contains(id) {
                ids.insert(0, id.clone());
            }
            Ok(())
        })
        .await
    }

    async fn mirror_remove(&self, source: &SourceDescriptor, id: &ItemId) -> Result<()> {
        self.mirror(source, |ids| {
            let position = ids.iter().position(|candidate| candidate == id).ok_or_else(|| {
                CollectionError::RemoteFailure(format!("'{}' is not a member of the connection", id))
            })?;
            ids.remove(position);
            Ok(())
        })
        .await
    }

    async fn mirror_move(
        &self,
        source: &SourceDescriptor,
        id: &ItemId,
        _from: usize,
        to: usize,
    ) -> Result<()> {
        self.mirror(source, |ids| {
            let position = ids.iter().position(|candidate| candidate == id).ok_or_else(|| {
                CollectionError::RemoteFailure(format!("'{}' is not a member of the connection", id))
            })?;
            let moved = ids.remove(position);
            let to = to.min(ids.len());
            ids.insert(to, moved);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> SourceDescriptor {
        SourceDescriptor::Query {
            params: Params::new(),
        }
    }

    #[tokio::test]
    async fn test_pages_slice_registered_ids() {
        let source = InMemoryItemSource::new();
        source
            .register_query("video", Params::new(), ["a", "b", "c", "d", "e"])
            .await;

        let first = source
            .fetch_page("video", &query(), PageCursor::first(2))
            .await
            .unwrap();
        assert_eq!(first.ids, vec!["a", "b"]);
        assert_eq!(first.total_estimate, 5);
        assert!(first.has_more);

        let last = source
            .fetch_page("video", &query(), PageCursor { offset: 4, limit: 2 })
            .await
            .unwrap();
        assert_eq!(last.ids, vec!["e"]);
        assert!(!last.has_more);
        assert_eq!(source.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_query_is_empty() {
        let source = InMemoryItemSource::new();
        let page = source
            .fetch_page("user", &query(), PageCursor::first(10))
            .await
            .unwrap();
        assert!(page.ids.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_injected_fetch_failure() {
        let source = InMemoryItemSource::new();
        source.fail_next_fetches(1).await;

        let err = source
            .fetch_page("video", &query(), PageCursor::first(10))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::RemoteFailure(_)));
        assert!(
            source
                .fetch_page("video", &query(), PageCursor::first(10))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_mirrors_apply_to_connection() {
        let source = InMemoryItemSource::new();
        let owner = Item::new("user", "u1");
        source
            .register_connection(&owner, "favorites", ["a", "b"])
            .await;
        let descriptor = SourceDescriptor::Connection {
            connection: "favorites".into(),
            owner: owner.clone(),
            params: Params::new(),
        };

        source.mirror_add(&descriptor, &"c".to_string()).await.unwrap();
        source
            .mirror_move(&descriptor, &"c".to_string(), 0, 2)
            .await
            .unwrap();
        source
            .mirror_remove(&descriptor, &"a".to_string())
            .await
            .unwrap();

        assert_eq!(
            source.connection_ids(&owner, "favorites").await,
            Some(vec!["b".to_string(), "c".to_string()])
        );
        assert!(source.mirror_add(&query(), &"x".to_string()).await.is_err());
    }
}
