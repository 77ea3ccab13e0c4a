use crate::infrastructure::error::CoreError;
use crate::infrastructure::local_cache::LocalCache;
use crate::infrastructure::remote_store::RemoteStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(8000);

/// Explicitly constructed handle bundle: owner identity plus the remote and
/// cache collaborators. Passed by reference to every component; there are no
/// ambient singletons.
pub struct Session<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    owner_id: String,
    remote: Arc<R>,
    cache: Arc<C>,
    remote_timeout: Duration,
}

impl<R, C> Session<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    pub fn new(owner_id: impl Into<String>, remote: Arc<R>, cache: Arc<C>) -> Self {
        Self {
            owner_id: owner_id.into(),
            remote,
            cache,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Races a remote operation against the configured timeout. The loser is
    /// abandoned, not cancelled at the transport level.
    pub(crate) async fn remote_call<T, F>(&self, label: &str, operation: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        match timeout(self.remote_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::RemoteUnavailable(format!(
                "{label} timed out after {}ms",
                self.remote_timeout.as_millis()
            ))),
        }
    }

    /// Tolerant cache read: a missing key or a corrupt entry yields `None`
    /// rather than an error, since the cache is only a shadow.
    pub(crate) fn cache_read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key) {
            Ok(value) => value?,
            Err(error) => {
                warn!(key, %error, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                warn!(key, %error, "discarding corrupt cache entry");
                None
            }
        }
    }

    /// Cache writes never fail an operation; a failed write just widens the
    /// window where the shadow lags the authoritative view.
    pub(crate) fn cache_write_json<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(key, %error, "cache serialization failed");
                return;
            }
        };
        if let Err(error) = self.cache.set(key, &serialized) {
            warn!(key, %error, "cache write failed");
        }
    }

    pub(crate) fn cache_remove(&self, key: &str) {
        if let Err(error) = self.cache.remove(key) {
            warn!(key, %error, "cache remove failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_fixtures::FakeRemoteStore;
    use crate::infrastructure::local_cache::InMemoryLocalCache;

    fn session() -> Session<FakeRemoteStore, InMemoryLocalCache> {
        Session::new(
            "user-1",
            Arc::new(FakeRemoteStore::default()),
            Arc::new(InMemoryLocalCache::default()),
        )
    }

    #[tokio::test]
    async fn remote_call_passes_results_through() {
        let session = session();
        let value = session
            .remote_call("probe", async { Ok::<_, CoreError>(42) })
            .await
            .expect("non-timing-out call succeeds");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn remote_call_maps_timeout_to_remote_unavailable() {
        let session = session().with_remote_timeout(Duration::from_millis(5));
        let result = session
            .remote_call("probe", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, CoreError>(42)
            })
            .await;
        assert!(matches!(result, Err(CoreError::RemoteUnavailable(_))));
    }

    #[test]
    fn cache_json_round_trips_and_tolerates_corruption() {
        let session = session();
        session.cache_write_json("k", &vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            session.cache_read_json::<Vec<String>>("k"),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        session.cache().set("k", "not json").expect("seed corrupt entry");
        assert_eq!(session.cache_read_json::<Vec<String>>("k"), None);

        session.cache_remove("k");
        assert_eq!(session.cache_read_json::<Vec<String>>("k"), None);
    }
}
