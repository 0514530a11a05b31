use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task::JoinHandle;
use tracing::warn;

use super::observer::{fan_out, FanOutReport, Observer};
use super::types::{Instrument, RequestId, Tick};

/// Result of attaching an observer to a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First observer: the caller must issue the upstream request.
    Created { generation: u64 },
    /// The id was already live; the observer joined the existing stream.
    Attached,
    /// The same observer was already registered under this id.
    Duplicate,
}

struct Subscription {
    instrument: Instrument,
    observers: Vec<Observer>,
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<RequestId, Subscription>,
    next_generation: u64,
}

/// Live market data subscriptions of one broker instance.
///
/// Entries are guarded by a short lock that is never held while observers
/// run. Whole subscribe/unsubscribe sequences, which await the upstream in
/// the middle, are serialized separately through [`SubscriptionTable::sequence`].
#[derive(Default)]
pub struct SubscriptionTable {
    state: Mutex<TableState>,
    sequence: AsyncMutex<()>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes multi-step subscribe/unsubscribe sequences.
    pub async fn sequence(&self) -> AsyncMutexGuard<'_, ()> {
        self.sequence.lock().await
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        // A panic while holding this lock cannot leave an entry half-written,
        // so a poisoned table is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, request_id: RequestId, instrument: &Instrument, observer: Observer) -> Registration {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(&request_id) {
            if entry.observers.iter().any(|o| o.same_as(&observer)) {
                return Registration::Duplicate;
            }
            if &entry.instrument != instrument {
                warn!(
                    request_id,
                    active = %entry.instrument,
                    requested = %instrument,
                    "request id already streams another instrument, attaching to the existing stream"
                );
            }
            entry.observers.push(observer);
            return Registration::Attached;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            request_id,
            Subscription {
                instrument: instrument.clone(),
                observers: vec![observer],
                generation,
                pump: None,
            },
        );
        Registration::Created { generation }
    }

    /// Stores the task feeding this subscription so removal can stop it.
    /// Aborts the task right away if the entry is already gone.
    pub fn attach_pump(&self, request_id: RequestId, generation: u64, pump: JoinHandle<()>) {
        let mut state = self.lock();
        match state.entries.get_mut(&request_id) {
            Some(entry) if entry.generation == generation => entry.pump = Some(pump),
            _ => pump.abort(),
        }
    }

    pub fn remove(&self, request_id: RequestId) -> bool {
        let removed = self.lock().entries.remove(&request_id);
        match removed {
            Some(entry) => {
                if let Some(pump) = entry.pump {
                    pump.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Drops the entry only if it is still the one created with
    /// `generation`. Used by a feeding task whose upstream ended, so its own
    /// handle is released instead of aborted.
    pub fn remove_if_current(&self, request_id: RequestId, generation: u64) -> bool {
        let mut state = self.lock();
        if !state
            .entries
            .get(&request_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            return false;
        }
        state.entries.remove(&request_id);
        true
    }

    pub fn clear(&self) {
        let drained: Vec<Subscription> = self.lock().entries.drain().map(|(_, s)| s).collect();
        for entry in drained {
            if let Some(pump) = entry.pump {
                pump.abort();
            }
        }
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.lock().entries.contains_key(&request_id)
    }

    /// True while `request_id` is still the subscription created with
    /// `generation` (not removed, not replaced by a later subscribe).
    pub fn is_current(&self, request_id: RequestId, generation: u64) -> bool {
        self.lock()
            .entries
            .get(&request_id)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub fn observer_count(&self, request_id: RequestId) -> usize {
        self.lock()
            .entries
            .get(&request_id)
            .map_or(0, |entry| entry.observers.len())
    }

    pub fn instrument(&self, request_id: RequestId) -> Option<Instrument> {
        self.lock()
            .entries
            .get(&request_id)
            .map(|entry| entry.instrument.clone())
    }

    pub fn request_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.lock().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes `tick` to every observer of `request_id`. Returns `None` when
    /// the id is not subscribed.
    pub fn dispatch(&self, request_id: RequestId, tick: &Tick) -> Option<FanOutReport> {
        let observers = self
            .lock()
            .entries
            .get(&request_id)
            .map(|entry| entry.observers.clone())?;
        Some(fan_out(request_id, &observers, tick))
    }
}

/// Logs every failed observer of a push.
pub fn log_fan_out_failures(report: &FanOutReport) {
    for failure in &report.failures {
        warn!(
            request_id = report.request_id,
            observer = failure.index,
            error = %failure.error,
            "market data observer failed"
        );
    }
}
