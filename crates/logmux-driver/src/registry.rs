//! Active-stream registry.
//!
//! Two indexes live behind one mutex: by stream handle and by producer
//! identity. Registration is two-phase. A handle is first *reserved*, which
//! claims it against concurrent registrations while the input is opened,
//! and then *published* together with its producer identity. Stopping a
//! reserved handle cancels the pending open.
//!
//! No I/O happens while the lock is held.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RegistryError;
use crate::sink::LogSink;

/// Caller-supplied description of a stream's producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Identity used for read-back lookups.
    pub producer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_name: Option<String>,
    /// Where the stream's logs belong. Derived from the producer id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Free-form driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl StreamMetadata {
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            ..Self::default()
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }
}

/// A registered stream whose worker is (or was) ingesting.
pub struct ActiveStream {
    handle: String,
    metadata: StreamMetadata,
    log_path: PathBuf,
    sink: Arc<dyn LogSink>,
    input: CancellationToken,
}

impl ActiveStream {
    pub(crate) fn new(
        reservation: &Reservation,
        metadata: StreamMetadata,
        log_path: PathBuf,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            handle: reservation.handle.clone(),
            metadata,
            log_path,
            sink,
            input: reservation.cancel.clone(),
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn producer_id(&self) -> &str {
        &self.metadata.producer_id
    }

    /// Resolved log path (supplied or derived).
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Close the input; the worker exits at its next step.
    pub fn close_input(&self) {
        self.input.cancel();
    }

    /// Whether the input has been closed by a stop, EOF or error budget.
    pub fn input_closed(&self) -> bool {
        self.input.is_cancelled()
    }

    /// Resolves once the input is closed.
    pub async fn wait_input_closed(&self) {
        self.input.cancelled().await
    }

    pub(crate) fn input_token(&self) -> &CancellationToken {
        &self.input
    }
}

impl std::fmt::Debug for ActiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStream")
            .field("handle", &self.handle)
            .field("producer_id", &self.metadata.producer_id)
            .field("log_path", &self.log_path)
            .field("input_closed", &self.input_closed())
            .finish_non_exhaustive()
    }
}

/// Claim on a handle between reservation and publication.
#[must_use = "a reservation must be published or abandoned"]
#[derive(Debug)]
pub struct Reservation {
    id: u64,
    handle: String,
    cancel: CancellationToken,
}

impl Reservation {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Cancelled when the handle is stopped before publication.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

enum Slot {
    Pending { id: u64, cancel: CancellationToken },
    Active(Arc<ActiveStream>),
}

#[derive(Default)]
struct Indexes {
    by_handle: HashMap<String, Slot>,
    by_producer: HashMap<String, Arc<ActiveStream>>,
}

#[derive(Default)]
pub struct StreamRegistry {
    inner: Mutex<Indexes>,
    next_reservation: AtomicU64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `handle`, failing if it is pending or active.
    pub fn reserve(&self, handle: &str) -> Result<Reservation, RegistryError> {
        let mut indexes = self.lock();
        match indexes.by_handle.entry(handle.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(handle.to_string())),
            Entry::Vacant(vacant) => {
                let id = self.next_reservation.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                vacant.insert(Slot::Pending {
                    id,
                    cancel: cancel.clone(),
                });
                Ok(Reservation {
                    id,
                    handle: handle.to_string(),
                    cancel,
                })
            }
        }
    }

    /// Make a reserved stream visible in both indexes.
    ///
    /// Fails with [`RegistryError::Stopped`] if the handle was stopped since
    /// it was reserved. A later stream from the same producer replaces the
    /// identity index entry.
    pub fn publish(
        &self,
        reservation: Reservation,
        stream: ActiveStream,
    ) -> Result<Arc<ActiveStream>, RegistryError> {
        let mut indexes = self.lock();
        match indexes.by_handle.get(&reservation.handle) {
            Some(Slot::Pending { id, .. }) if *id == reservation.id => {}
            _ => return Err(RegistryError::Stopped(reservation.handle)),
        }

        let stream = Arc::new(stream);
        indexes
            .by_producer
            .insert(stream.producer_id().to_string(), Arc::clone(&stream));
        indexes
            .by_handle
            .insert(reservation.handle, Slot::Active(Arc::clone(&stream)));
        Ok(stream)
    }

    /// Release a reservation whose setup failed.
    pub fn abandon(&self, reservation: Reservation) {
        let mut indexes = self.lock();
        if let Entry::Occupied(slot) = indexes.by_handle.entry(reservation.handle) {
            if matches!(slot.get(), Slot::Pending { id, .. } if *id == reservation.id) {
                slot.remove();
            }
        }
    }

    /// Remove `handle` from both indexes and close its input.
    ///
    /// A pending registration is cancelled instead. The identity entry is
    /// only removed if it still points at this stream. Unknown handles are
    /// a no-op.
    pub fn unregister(&self, handle: &str) -> Option<Arc<ActiveStream>> {
        let slot = {
            let mut indexes = self.lock();
            let slot = indexes.by_handle.remove(handle)?;
            if let Slot::Active(stream) = &slot {
                if let Entry::Occupied(current) =
                    indexes.by_producer.entry(stream.producer_id().to_string())
                {
                    if Arc::ptr_eq(current.get(), stream) {
                        current.remove();
                    }
                }
            }
            slot
        };

        match slot {
            Slot::Pending { cancel, .. } => {
                cancel.cancel();
                None
            }
            Slot::Active(stream) => {
                stream.close_input();
                Some(stream)
            }
        }
    }

    pub fn lookup_by_producer(
        &self,
        producer_id: &str,
    ) -> Result<Arc<ActiveStream>, RegistryError> {
        self.lock()
            .by_producer
            .get(producer_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(producer_id.to_string()))
    }

    /// Active stream registered under `handle`.
    pub fn get(&self, handle: &str) -> Option<Arc<ActiveStream>> {
        match self.lock().by_handle.get(handle) {
            Some(Slot::Active(stream)) => Some(Arc::clone(stream)),
            _ => None,
        }
    }

    /// Handles currently pending or active.
    pub fn handles(&self) -> Vec<String> {
        self.lock().by_handle.keys().cloned().collect()
    }

    /// Number of active streams.
    pub fn len(&self) -> usize {
        self.lock()
            .by_handle
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Indexes> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("handles", &self.handles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySink;

    fn stream(reservation: &Reservation, producer_id: &str) -> ActiveStream {
        ActiveStream::new(
            reservation,
            StreamMetadata::new(producer_id),
            PathBuf::from("/tmp").join(producer_id),
            Arc::new(MemorySink::default()),
        )
    }

    fn register(registry: &StreamRegistry, handle: &str, producer_id: &str) -> Arc<ActiveStream> {
        let reservation = registry.reserve(handle).unwrap();
        let active = stream(&reservation, producer_id);
        registry.publish(reservation, active).unwrap()
    }

    #[test]
    fn publish_populates_both_indexes() {
        let registry = StreamRegistry::new();
        let active = register(&registry, "h1", "c1");

        assert!(Arc::ptr_eq(&registry.lookup_by_producer("c1").unwrap(), &active));
        assert!(Arc::ptr_eq(&registry.get("h1").unwrap(), &active));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_handle_rejected_while_pending_or_active() {
        let registry = StreamRegistry::new();
        let pending = registry.reserve("h1").unwrap();
        assert!(matches!(
            registry.reserve("h1"),
            Err(RegistryError::AlreadyRegistered(h)) if h == "h1"
        ));

        let active = stream(&pending, "c1");
        registry.publish(pending, active).unwrap();
        assert!(matches!(
            registry.reserve("h1"),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn unregister_removes_both_and_closes_input() {
        let registry = StreamRegistry::new();
        let active = register(&registry, "h1", "c1");

        let removed = registry.unregister("h1").expect("stream should be removed");
        assert!(Arc::ptr_eq(&removed, &active));
        assert!(active.input_closed());
        assert!(registry.get("h1").is_none());
        assert!(matches!(
            registry.lookup_by_producer("c1"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = StreamRegistry::new();
        register(&registry, "h1", "c1");

        assert!(registry.unregister("nope").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stopping_pending_reservation_cancels_it() {
        let registry = StreamRegistry::new();
        let reservation = registry.reserve("h1").unwrap();
        let token = reservation.cancel_token().clone();

        assert!(registry.unregister("h1").is_none());
        assert!(token.is_cancelled());

        let late = stream(&reservation, "c1");
        assert!(matches!(
            registry.publish(reservation, late),
            Err(RegistryError::Stopped(_))
        ));
        assert!(registry.lookup_by_producer("c1").is_err());
    }

    #[test]
    fn stale_reservation_does_not_clobber_new_one() {
        let registry = StreamRegistry::new();
        let first = registry.reserve("h1").unwrap();
        registry.unregister("h1");
        let second = registry.reserve("h1").unwrap();

        registry.abandon(first);
        assert_eq!(registry.handles(), vec!["h1".to_string()]);

        let active = stream(&second, "c1");
        registry.publish(second, active).unwrap();
        assert!(registry.get("h1").is_some());
    }

    #[test]
    fn abandon_frees_handle() {
        let registry = StreamRegistry::new();
        let reservation = registry.reserve("h1").unwrap();
        registry.abandon(reservation);
        assert!(registry.handles().is_empty());
        registry.reserve("h1").expect("handle should be free again");
    }

    #[test]
    fn reused_producer_identity_survives_old_stop() {
        let registry = StreamRegistry::new();
        register(&registry, "h1", "c1");
        let newer = register(&registry, "h2", "c1");

        registry.unregister("h1");
        let found = registry.lookup_by_producer("c1").expect("newer stream should remain");
        assert!(Arc::ptr_eq(&found, &newer));
    }

    #[test]
    fn metadata_json_omits_empty_fields() {
        let metadata = StreamMetadata::new("c1");
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"producer_id":"c1"}"#);

        let parsed: StreamMetadata =
            serde_json::from_str(r#"{"producer_id":"c2","log_path":"/var/log/c2"}"#).unwrap();
        assert_eq!(parsed.log_path, Some(PathBuf::from("/var/log/c2")));
    }
}
