// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Loading and caching of decoded samples.
//!
//! A key moves from absent to `Pending` when the first load is issued, and from
//! `Pending` to `Ready` once the bytes are fetched and decoded. A failed load removes
//! the key again so a later load can retry. Loads issued while a key is `Pending`
//! attach to the fetch already in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::error::LoadError;
use crate::audio::decode::{self, extension_hint};
use crate::audio::DecodedBuffer;
use crate::fetch::Fetcher;

/// Number of sample events buffered for slow subscribers.
const EVENT_CAPACITY: usize = 64;

type LoadResult = Result<Arc<DecodedBuffer>, LoadError>;

/// The state of a cached key.
enum Entry {
    /// A fetch is in flight. The receiver resolves once it completes.
    Pending {
        locator: String,
        result: watch::Receiver<Option<LoadResult>>,
    },
    /// The sample is decoded and ready to play.
    Ready(Arc<DecodedBuffer>),
}

/// Observations emitted as loads complete. Purely informational.
#[derive(Clone, Debug)]
pub enum SampleEvent {
    /// A sample was fetched, decoded and stored.
    Loaded { key: String, locator: String },
    /// A sample could not be fetched or decoded. Nothing was stored.
    LoadFailed {
        key: String,
        locator: String,
        error: LoadError,
    },
}

/// A cache of decoded samples by key. Cloning is cheap and clones share the same
/// entries.
#[derive(Clone)]
pub struct SampleCache {
    /// Entries by sample key.
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    /// Retrieves raw bytes for a locator.
    fetcher: Arc<dyn Fetcher>,
    /// Sample rate decoded buffers are converted to (matches audio output).
    target_sample_rate: Option<u32>,
    /// Load observations.
    events: broadcast::Sender<SampleEvent>,
}

impl SampleCache {
    /// Creates a new, empty sample cache.
    pub fn new(fetcher: Arc<dyn Fetcher>, target_sample_rate: Option<u32>) -> SampleCache {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SampleCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            fetcher,
            target_sample_rate,
            events,
        }
    }

    /// Loads the sample at `locator` under `key`.
    ///
    /// If the key is already loaded this does nothing: no fetch happens and no event is
    /// emitted. If a load for the key is in flight, the returned handle attaches to it.
    /// Otherwise the fetch and decode run on a spawned task, so this must be called
    /// from within a tokio runtime. The handle may be dropped without cancelling the
    /// load.
    pub fn load(&self, key: &str, locator: &str) -> LoadHandle {
        let result_tx = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(Entry::Ready(buffer)) => {
                    debug!(key, "Using cached sample");
                    return LoadHandle::ready(buffer.clone());
                }
                // A closed channel means the load task died without publishing.
                Some(Entry::Pending {
                    locator: in_flight,
                    result,
                }) if result.has_changed().is_ok() => {
                    debug!(key, locator = in_flight, "Sample load already in flight");
                    return LoadHandle::pending(in_flight, result.clone());
                }
                Some(Entry::Pending { .. }) => {
                    debug!(key, "Replacing abandoned sample load");
                }
                None => {}
            }

            let (result_tx, result_rx) = watch::channel(None);
            entries.insert(
                key.to_string(),
                Entry::Pending {
                    locator: locator.to_string(),
                    result: result_rx,
                },
            );
            result_tx
        };

        info!(key, locator, "Loading sample");
        let handle = LoadHandle::pending(locator, result_tx.subscribe());
        tokio::spawn(self.clone().complete_load(
            key.to_string(),
            locator.to_string(),
            result_tx,
        ));
        handle
    }

    /// Runs a load to completion and publishes the result.
    async fn complete_load(
        self,
        key: String,
        locator: String,
        result_tx: watch::Sender<Option<LoadResult>>,
    ) {
        let pending = PendingLoad {
            entries: self.entries.clone(),
            key: key.clone(),
            result_tx: Some(result_tx),
        };
        let result = self.fetch_and_decode(&locator).await;

        {
            let mut entries = self.entries.lock();
            match &result {
                Ok(buffer) => {
                    entries.insert(key.clone(), Entry::Ready(buffer.clone()));
                }
                Err(_) => {
                    entries.remove(&key);
                }
            }
        }

        // No subscribers is fine; events are informational.
        match &result {
            Ok(buffer) => {
                info!(
                    key,
                    locator,
                    channels = buffer.channel_count(),
                    sample_rate = buffer.sample_rate(),
                    duration_ms = buffer.duration().as_millis() as u64,
                    memory_kb = buffer.memory_size() / 1024,
                    "Sample loaded"
                );
                let _ = self.events.send(SampleEvent::Loaded { key, locator });
            }
            Err(e) => {
                warn!(key, locator, error = %e, "Unable to load sample");
                let _ = self.events.send(SampleEvent::LoadFailed {
                    key,
                    locator,
                    error: e.clone(),
                });
            }
        }

        pending.publish(result);
    }

    /// Fetches and decodes a locator. Decoding runs on the blocking pool.
    async fn fetch_and_decode(&self, locator: &str) -> LoadResult {
        let bytes = self
            .fetcher
            .fetch(locator)
            .await
            .map_err(|e| LoadError::Fetch {
                locator: locator.to_string(),
                source: Arc::new(e),
            })?;
        debug!(locator, bytes = bytes.len(), "Sample fetched");

        let extension = extension_hint(locator).map(str::to_string);
        let target_sample_rate = self.target_sample_rate;
        let decoded = tokio::task::spawn_blocking(move || {
            decode::decode(bytes, extension.as_deref(), target_sample_rate)
        })
        .await
        .map_err(|_| LoadError::Interrupted {
            locator: locator.to_string(),
        })?
        .map_err(|e| LoadError::Decode {
            locator: locator.to_string(),
            source: Arc::new(e),
        })?;

        Ok(Arc::new(decoded))
    }

    /// Returns the decoded buffer for `key`, if it has been loaded. Never fetches and
    /// never waits for a load in flight.
    pub fn lookup(&self, key: &str) -> Option<Arc<DecodedBuffer>> {
        match self.entries.lock().get(key) {
            Some(Entry::Ready(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// Returns true if `key` has been loaded.
    pub fn is_loaded(&self, key: &str) -> bool {
        matches!(self.entries.lock().get(key), Some(Entry::Ready(_)))
    }

    /// Returns true if a load for `key` is in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        matches!(self.entries.lock().get(key), Some(Entry::Pending { .. }))
    }

    /// Returns the number of loaded samples.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| matches!(entry, Entry::Ready(_)))
            .count()
    }

    /// Returns true if no samples are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total memory used by loaded samples.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .lock()
            .values()
            .map(|entry| match entry {
                Entry::Ready(buffer) => buffer.memory_size(),
                Entry::Pending { .. } => 0,
            })
            .sum()
    }

    /// Subscribes to load observations. Only loads completing after the call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<SampleEvent> {
        self.events.subscribe()
    }
}

/// Publishes the result of a load. If the load task ends without publishing (runtime
/// shutdown, a panicking fetcher), the key's `Pending` entry is removed on drop so a
/// later load fetches again.
struct PendingLoad {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    key: String,
    result_tx: Option<watch::Sender<Option<LoadResult>>>,
}

impl PendingLoad {
    fn publish(mut self, result: LoadResult) {
        if let Some(result_tx) = self.result_tx.take() {
            result_tx.send_replace(Some(result));
        }
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        let Some(result_tx) = self.result_tx.take() else {
            return;
        };
        drop(result_tx);

        let mut entries = self.entries.lock();
        // Only remove our own entry; a replacement load has a live sender.
        let abandoned = matches!(
            entries.get(&self.key),
            Some(Entry::Pending { result, .. }) if result.has_changed().is_err()
        );
        if abandoned {
            entries.remove(&self.key);
            warn!(key = self.key, "Sample load abandoned before completion");
        }
    }
}

impl std::fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCache")
            .field("loaded_samples", &self.len())
            .field("target_sample_rate", &self.target_sample_rate)
            .field("total_memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

/// The completion of a load. Await `wait` to find out how it went.
pub struct LoadHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Arc<DecodedBuffer>),
    Pending {
        locator: String,
        result: watch::Receiver<Option<LoadResult>>,
    },
}

impl LoadHandle {
    fn ready(buffer: Arc<DecodedBuffer>) -> LoadHandle {
        LoadHandle {
            state: HandleState::Ready(buffer),
        }
    }

    fn pending(locator: &str, result: watch::Receiver<Option<LoadResult>>) -> LoadHandle {
        LoadHandle {
            state: HandleState::Pending {
                locator: locator.to_string(),
                result,
            },
        }
    }

    /// Returns true if the sample was already cached when the load was issued.
    pub fn was_cached(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// Waits for the load to finish.
    pub async fn wait(self) -> Result<Arc<DecodedBuffer>, LoadError> {
        match self.state {
            HandleState::Ready(buffer) => Ok(buffer),
            HandleState::Pending {
                locator,
                mut result,
            } => {
                let outcome = match result.wait_for(Option::is_some).await {
                    Ok(outcome) => (*outcome).clone(),
                    Err(_) => None,
                };
                // The sender only goes away without a result if the load task died.
                outcome.unwrap_or(Err(LoadError::Interrupted { locator }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::testutil::{eventually_async, wav_bytes, TestFetcher, TestResponse};

    const KICK: &str = "samples/Kick.wav";
    const MISSING: &str = "samples/missing.wav";

    fn kick_fetcher() -> Arc<TestFetcher> {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 64]], 44100)));
        fetcher
    }

    #[tokio::test]
    async fn test_load_then_lookup() {
        let fetcher = kick_fetcher();
        let cache = SampleCache::new(fetcher.clone(), None);

        let buffer = cache.load("kick", KICK).wait().await.unwrap();

        assert_eq!(buffer.frames(), 64);
        let cached = cache.lookup("kick").unwrap();
        assert!(Arc::ptr_eq(&buffer, &cached));
        assert!(cache.is_loaded("kick"));
        assert!(!cache.is_pending("kick"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 64 * 4);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let fetcher = kick_fetcher();
        let other = "samples/OtherKick.wav";
        fetcher.respond(other, TestResponse::Bytes(wav_bytes(&[vec![0.1; 8]], 44100)));
        let cache = SampleCache::new(fetcher.clone(), None);

        let first = cache.load("kick", KICK).wait().await.unwrap();
        let mut events = cache.subscribe();

        let handle = cache.load("kick", other);
        assert!(handle.was_cached());
        let second = handle.wait().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls(KICK), 1);
        assert_eq!(fetcher.calls(other), 0);
        assert_eq!(cache.lookup("kick").unwrap().frames(), 64);
        // A cached load is silent.
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_missing_locator_leaves_no_entry() {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(MISSING, TestResponse::Status(404));
        let cache = SampleCache::new(fetcher.clone(), None);
        let mut events = cache.subscribe();

        let error = cache.load("snare", MISSING).wait().await.unwrap_err();

        assert!(matches!(error, LoadError::Fetch { .. }));
        assert_eq!(error.locator(), MISSING);
        assert!(cache.lookup("snare").is_none());
        assert!(!cache.is_pending("snare"));
        assert!(cache.is_empty());

        match events.try_recv() {
            Ok(SampleEvent::LoadFailed { key, locator, .. }) => {
                assert_eq!(key, "snare");
                assert_eq!(locator, MISSING);
            }
            other => panic!("expected a load failure, got {:?}", other),
        }
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried() {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(KICK, TestResponse::Unreachable);
        let cache = SampleCache::new(fetcher.clone(), None);

        assert!(cache.load("kick", KICK).wait().await.is_err());
        assert_eq!(fetcher.calls(KICK), 1);

        // The resource shows up; the retry fetches again and succeeds.
        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 16]], 44100)));
        let buffer = cache.load("kick", KICK).wait().await.unwrap();

        assert_eq!(fetcher.calls(KICK), 2);
        assert!(Arc::ptr_eq(&buffer, &cache.lookup("kick").unwrap()));
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_no_entry() {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(KICK, TestResponse::Bytes(b"definitely not audio".to_vec()));
        let cache = SampleCache::new(fetcher.clone(), None);

        let error = cache.load("kick", KICK).wait().await.unwrap_err();

        assert!(matches!(error, LoadError::Decode { .. }));
        assert_eq!(error.locator(), KICK);
        assert!(cache.lookup("kick").is_none());

        cache.load("kick", KICK).wait().await.unwrap_err();
        assert_eq!(fetcher.calls(KICK), 2);
    }

    #[tokio::test]
    async fn test_lookup_is_pure() {
        let fetcher = kick_fetcher();
        let cache = SampleCache::new(fetcher.clone(), None);

        for _ in 0..10 {
            assert!(cache.lookup("kick").is_none());
        }

        assert_eq!(fetcher.total_calls(), 0);
        assert!(cache.is_empty());
        assert!(!cache.is_pending("kick"));
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let fetcher = Arc::new(TestFetcher::gated());
        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 32]], 44100)));
        let cache = SampleCache::new(fetcher.clone(), None);

        let first = cache.load("kick", KICK);
        let second = cache.load("kick", KICK);
        assert!(!second.was_cached());

        {
            let fetcher = fetcher.clone();
            eventually_async(
                move || {
                    let fetcher = fetcher.clone();
                    async move { fetcher.calls(KICK) == 1 }
                },
                "Fetch never started",
            )
            .await;
        }

        // While the fetch is held, the key is pending and not playable.
        assert!(cache.is_pending("kick"));
        assert!(cache.lookup("kick").is_none());

        fetcher.release();
        let first = first.wait().await.unwrap();
        let second = second.wait().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls(KICK), 1);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_loads_for_distinct_keys_are_independent() {
        let fetcher = kick_fetcher();
        fetcher.respond(MISSING, TestResponse::Status(404));
        let cache = SampleCache::new(fetcher.clone(), None);

        let snare = cache.load("snare", MISSING);
        let kick = cache.load("kick", KICK);

        assert!(kick.wait().await.is_ok());
        assert!(snare.wait().await.is_err());
        assert!(cache.is_loaded("kick"));
        assert!(!cache.is_loaded("snare"));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_loads() {
        let fetcher = kick_fetcher();
        let cache = SampleCache::new(fetcher.clone(), None);
        let mut events = cache.subscribe();

        drop(cache.load("kick", KICK));

        match events.recv().await {
            Ok(SampleEvent::Loaded { key, locator }) => {
                assert_eq!(key, "kick");
                assert_eq!(locator, KICK);
            }
            other => panic!("expected a loaded event, got {:?}", other),
        }
        assert!(cache.is_loaded("kick"));
    }

    #[tokio::test]
    async fn test_resamples_to_target_rate() {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 441]], 44100)));
        let cache = SampleCache::new(fetcher.clone(), Some(48000));

        let buffer = cache.load("kick", KICK).wait().await.unwrap();

        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.frames(), 480);
    }

    #[test]
    fn test_load_abandoned_by_shutdown_can_be_retried() {
        let fetcher = Arc::new(TestFetcher::gated());
        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 16]], 44100)));
        let cache = SampleCache::new(fetcher.clone(), None);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let abandoned = runtime.block_on(async {
            let handle = cache.load("kick", KICK);
            let fetcher = fetcher.clone();
            eventually_async(
                move || {
                    let fetcher = fetcher.clone();
                    async move { fetcher.calls(KICK) == 1 }
                },
                "Fetch never started",
            )
            .await;
            handle
        });
        assert!(cache.is_pending("kick"));

        // Shutting the runtime down drops the load task mid-fetch.
        drop(runtime);
        assert!(!cache.is_pending("kick"));
        fetcher.release();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            assert!(matches!(
                abandoned.wait().await,
                Err(LoadError::Interrupted { .. })
            ));
            let buffer = cache.load("kick", KICK).wait().await.unwrap();
            assert_eq!(buffer.frames(), 16);
        });
        assert_eq!(fetcher.calls(KICK), 2);
        assert!(cache.is_loaded("kick"));
    }

    #[tokio::test]
    async fn test_panicking_fetcher_leaves_no_entry() {
        let fetcher = Arc::new(TestFetcher::new());
        fetcher.respond(KICK, TestResponse::Panic);
        let cache = SampleCache::new(fetcher.clone(), None);

        let error = cache.load("kick", KICK).wait().await.unwrap_err();

        assert!(matches!(error, LoadError::Interrupted { .. }));
        assert_eq!(error.locator(), KICK);
        assert!(!cache.is_pending("kick"));

        fetcher.respond(KICK, TestResponse::Bytes(wav_bytes(&[vec![0.5; 16]], 44100)));
        cache.load("kick", KICK).wait().await.unwrap();
        assert_eq!(fetcher.calls(KICK), 2);
        assert!(cache.is_loaded("kick"));
    }

    #[tokio::test]
    async fn test_load_replaces_dead_pending_entry() {
        let fetcher = kick_fetcher();
        let cache = SampleCache::new(fetcher.clone(), None);
        let (result_tx, result_rx) = watch::channel(None);
        drop(result_tx);
        cache.entries.lock().insert(
            "kick".to_string(),
            Entry::Pending {
                locator: KICK.to_string(),
                result: result_rx,
            },
        );
        assert!(cache.is_pending("kick"));

        let buffer = cache.load("kick", KICK).wait().await.unwrap();

        assert_eq!(buffer.frames(), 64);
        assert_eq!(fetcher.calls(KICK), 1);
        assert!(cache.is_loaded("kick"));
    }
}
