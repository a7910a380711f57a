use crate::config::CollectionConfig;
use crate::core::{CollectionError, Result};
use crate::loader::ItemFieldLoader;
use crate::source::RemoteItemSource;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Shared API client handle
///
/// Bundles the remote source, the field loader, the configuration and the
/// tokio runtime that runs background work. One `Api` is typically shared by
/// every collection of an application; collections only issue requests
/// through it and never mutate it.
pub struct Api {
    source: Arc<dyn RemoteItemSource>,
    loader: Arc<dyn ItemFieldLoader>,
    config: CollectionConfig,
    runtime: Handle,
}

impl Api {
    /// Create an API handle with the default configuration
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        source: Arc<dyn RemoteItemSource>,
        loader: Arc<dyn ItemFieldLoader>,
    ) -> Result<Arc<Self>> {
        Self::with_config(source, loader, CollectionConfig::default())
    }

    /// Create an API handle with a custom configuration
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_config(
        source: Arc<dyn RemoteItemSource>,
        loader: Arc<dyn ItemFieldLoader>,
        config: CollectionConfig,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|err| {
            CollectionError::InvalidConfig(format!("no tokio runtime available: {}", err))
        })?;
        Self::with_runtime(source, loader, config, runtime)
    }

    /// Create an API handle running background work on `runtime`
    pub fn with_runtime(
        source: Arc<dyn RemoteItemSource>,
        loader: Arc<dyn ItemFieldLoader>,
        config: CollectionConfig,
        runtime: Handle,
    ) -> Result<Arc<Self>> {
        config.validate().map_err(CollectionError::InvalidConfig)?;
        Ok(Arc::new(Self {
            source,
            loader,
            config,
            runtime,
        }))
    }

    pub fn source(&self) -> &Arc<dyn RemoteItemSource> {
        &self.source
    }

    pub fn loader(&self) -> &Arc<dyn ItemFieldLoader> {
        &self.loader
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Applies the configured fetch timeout to a remote call.
    pub(crate) async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                CollectionError::RemoteFailure(format!("{} timed out after {:?}", what, limit))
            })?,
            None => call.await,
        }
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryFieldLoader;
    use crate::source::InMemoryItemSource;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let err = Api::with_config(
            Arc::new(InMemoryItemSource::new()),
            Arc::new(InMemoryFieldLoader::new()),
            CollectionConfig::new().page_size(0),
        )
        .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }

    #[test]
    fn test_requires_runtime() {
        let err = Api::new(
            Arc::new(InMemoryItemSource::new()),
            Arc::new(InMemoryFieldLoader::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let api = Api::with_config(
            Arc::new(InMemoryItemSource::new()),
            Arc::new(InMemoryFieldLoader::new()),
            CollectionConfig::new().fetch_timeout(Duration::from_millis(10)),
        )
        .unwrap();

        let err = api
            .bounded("slow call", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionError::RemoteFailure(_)));
    }
}
