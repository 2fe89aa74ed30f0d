//! In-memory collaborator fakes for pipeline unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::interfaces::{
    ArtifactStore, FetchError, MetricSeries, MetricWindow, MetricsBackend, WorkerHandle,
    WorkerStatusProbe,
};

/// Shared-map artifact store that counts fetches per key.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    objects: HashMap<String, Vec<u8>>,
    fetches: HashMap<String, usize>,
    puts: HashMap<String, usize>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), bytes);
    }

    pub(crate) fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    pub(crate) fn fetch_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .fetches
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn put_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .puts
            .get(key)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().objects.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.fetches.entry(key.to_string()).or_default() += 1;
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner.puts.entry(key.to_string()).or_default() += 1;
        inner.objects.insert(key.to_string(), bytes);
        Ok(())
    }
}

/// Store wrapper that rejects every upload while delegating fetches.
#[derive(Debug, Clone)]
pub(crate) struct UploadFailingStore {
    pub(crate) inner: MemoryStore,
}

#[async_trait]
impl ArtifactStore for UploadFailingStore {
    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        self.inner.get(key).await
    }

    async fn put(&self, _key: &str, _bytes: Vec<u8>) -> anyhow::Result<()> {
        anyhow::bail!("upload rejected")
    }
}

/// Scripted liveness probe.
#[derive(Debug)]
pub(crate) struct MemoryProbe {
    running_calls: Option<Mutex<usize>>,
    fail: bool,
}

impl MemoryProbe {
    pub(crate) fn always_running() -> Self {
        Self {
            running_calls: None,
            fail: false,
        }
    }

    /// Running for the first `n` probe calls, stopped afterwards.
    pub(crate) fn running_for(n: usize) -> Self {
        Self {
            running_calls: Some(Mutex::new(n)),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            running_calls: None,
            fail: true,
        }
    }
}

#[async_trait]
impl WorkerStatusProbe for MemoryProbe {
    async fn is_running(&self, instance_id: &str) -> anyhow::Result<bool> {
        if self.fail {
            anyhow::bail!("status probe unreachable for {instance_id}");
        }
        match &self.running_calls {
            None => Ok(true),
            Some(remaining) => {
                let mut remaining = remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Metrics backend returning a fixed series list, optionally failing the
/// first `failures` queries.
#[derive(Debug, Default)]
pub(crate) struct MemoryMetrics {
    pub(crate) series: Vec<MetricSeries>,
    failures: Mutex<usize>,
    calls: Mutex<usize>,
}

impl MemoryMetrics {
    pub(crate) fn with_series(series: Vec<MetricSeries>) -> Self {
        Self {
            series,
            ..Self::default()
        }
    }

    pub(crate) fn failing_first(series: Vec<MetricSeries>, failures: usize) -> Self {
        Self {
            series,
            failures: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MetricsBackend for MemoryMetrics {
    async fn query(
        &self,
        _workers: &[WorkerHandle],
        _metric_names: &[&str],
        _window: MetricWindow,
    ) -> anyhow::Result<Vec<MetricSeries>> {
        *self.calls.lock().unwrap() += 1;
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            anyhow::bail!("metrics backend unavailable");
        }
        Ok(self.series.clone())
    }
}
