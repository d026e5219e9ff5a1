//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::StatusView;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Status view hosted by this daemon.
    pub status_view: Arc<StatusView>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Creates the state shared by all handlers.
    #[must_use]
    pub fn new(status_view: Arc<StatusView>, event_bus: EventBus) -> Self {
        Self {
            status_view,
            event_bus,
        }
    }

    /// History entries shown for the hosted view.
    #[must_use]
    pub fn history_limit(&self) -> usize {
        self.status_view.settings().history_limit
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod testing {
    //! Fixture shared by the HTTP and WebSocket tests.

    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::service::{Collaborators, ViewSettings};
    use crate::store::{
        ChangeNotifier, DemoHousehold, MemorySnapshotCache, MemoryStore, RemoteStore,
        SnapshotCache,
    };

    pub(crate) struct Fixture {
        pub(crate) state: AppState,
        pub(crate) store: Arc<MemoryStore>,
        pub(crate) demo: DemoHousehold,
    }

    pub(crate) async fn fixture(mounted: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let demo = store.seed_demo().await;
        let Some(viewer) = demo.members.first() else {
            panic!("demo household has no members");
        };
        let bus = EventBus::new(64);
        let view = StatusView::new(
            ViewSettings::new(demo.household.id, viewer.id),
            Collaborators {
                store: Arc::clone(&store) as Arc<dyn RemoteStore>,
                notifier: Arc::new(store.notifier()) as Arc<dyn ChangeNotifier>,
                cache: Arc::new(MemorySnapshotCache::new()) as Arc<dyn SnapshotCache>,
                clock: Arc::new(SystemClock) as Arc<dyn Clock>,
            },
            bus.clone(),
        );
        if mounted {
            let Ok(_) = view.mount().await else {
                panic!("mount failed");
            };
        }
        Fixture {
            state: AppState::new(Arc::new(view), bus),
            store,
            demo,
        }
    }
}
