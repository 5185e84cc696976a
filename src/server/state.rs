use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use runcast_event_bus::EventBus;

use crate::orchestrator::RunCoordinator;
use crate::registry::RunRegistry;

#[derive(Clone)]
pub(crate) struct ServeState {
    pub(crate) bus: Arc<EventBus>,
    pub(crate) registry: Arc<RunRegistry>,
    pub(crate) coordinator: Arc<RunCoordinator>,
    pub(crate) health: Arc<ServeHealth>,
}

#[derive(Default)]
pub(crate) struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
}

pub(crate) struct HealthSnapshot {
    pub(crate) live: bool,
    pub(crate) ready: bool,
}

impl ServeHealth {
    pub(crate) fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            live: self.live.load(Ordering::SeqCst),
            ready: self.ready.load(Ordering::SeqCst),
        }
    }
}
