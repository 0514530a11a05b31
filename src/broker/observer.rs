use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Sender;
use thiserror::Error;

use super::types::{RequestId, Tick};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    #[error("observer failed: {0}")]
    Failed(String),
    #[error("observer panicked: {0}")]
    Panicked(String),
    #[error("observer channel closed")]
    Disconnected,
}

type ObserverFn = dyn Fn(&Tick) -> Result<(), ObserverError> + Send + Sync;

/// Callback invoked with every update of the subscription it is attached to.
/// Two observers are the same observer when they share the same callback
/// allocation (cloning an `Observer` keeps its identity).
#[derive(Clone)]
pub struct Observer {
    callback: Arc<ObserverFn>,
}

impl Observer {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Tick) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Forwards ticks into a front-end channel; a dropped receiver reports
    /// `Disconnected` on every push.
    pub fn from_channel(sender: Sender<Tick>) -> Self {
        Self::new(move |tick: &Tick| {
            sender
                .send(tick.clone())
                .map_err(|_| ObserverError::Disconnected)
        })
    }

    pub fn same_as(&self, other: &Observer) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    /// Runs the callback, turning a panic into an `ObserverError`.
    pub fn notify(&self, tick: &Tick) -> Result<(), ObserverError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(tick))) {
            Ok(result) => result,
            Err(payload) => Err(ObserverError::Panicked(panic_message(payload))),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observer({:p})", Arc::as_ptr(&self.callback))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    /// Position of the observer in registration order
    pub index: usize,
    pub error: ObserverError,
}

/// Outcome of pushing one update to all observers of a request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub request_id: RequestId,
    pub delivered: usize,
    pub failures: Vec<ObserverFailure>,
}

impl FanOutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Invokes every observer in order. A failing observer never stops the
/// ones after it.
pub fn fan_out(request_id: RequestId, observers: &[Observer], tick: &Tick) -> FanOutReport {
    let mut report = FanOutReport {
        request_id,
        delivered: 0,
        failures: Vec::new(),
    };
    for (index, observer) in observers.iter().enumerate() {
        match observer.notify(tick) {
            Ok(()) => report.delivered += 1,
            Err(error) => report.failures.push(ObserverFailure { index, error }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::types::{TickKind, TickType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tick() -> Tick {
        Tick::new(7, TickKind::Price { field: TickType::Last, price: 101.5 })
    }

    #[test]
    fn test_failure_does_not_stop_later_observers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = |calls: Arc<AtomicUsize>| {
            Observer::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let observers = vec![
            counting(calls.clone()),
            Observer::new(|_| Err(ObserverError::Failed("bad quote".into()))),
            Observer::new(|_| panic!("boom")),
            counting(calls.clone()),
        ];

        let report = fan_out(7, &observers, &tick());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.attempted(), 4);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[1].index, 2);
        assert_eq!(report.failures[1].error, ObserverError::Panicked("boom".into()));
    }

    #[test]
    fn test_channel_observer() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let observer = Observer::from_channel(tx);
        observer.notify(&tick()).unwrap();
        assert_eq!(rx.try_recv().unwrap().request_id, 7);

        drop(rx);
        assert_eq!(observer.notify(&tick()), Err(ObserverError::Disconnected));
    }

    #[test]
    fn test_identity_survives_clone() {
        let a = Observer::new(|_| Ok(()));
        let b = Observer::new(|_| Ok(()));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }
}
