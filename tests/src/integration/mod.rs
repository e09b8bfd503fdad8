//! Integration scenarios and their shared fixtures.

pub mod scenarios;
pub mod transports;

use parking_lot::Mutex;
use std::sync::Arc;
use sync_bus::{HostHandle, MessageBus, MockTimeSource, SyncConfig, SyncHost};
use sync_mirror::WatchEvent;
use tokio::task::JoinHandle;

/// Spawn a host with a deterministic clock.
pub fn spawn_host(config: SyncConfig) -> (HostHandle, JoinHandle<MessageBus>) {
    let bus = MessageBus::with_clock(config, Arc::new(MockTimeSource::new(1_700_000_000_000)));
    SyncHost::spawn(bus)
}

/// Watch callback that records every event it sees.
pub fn recorder() -> (
    Arc<Mutex<Vec<WatchEvent>>>,
    impl Fn(&WatchEvent) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &WatchEvent| sink.lock().push(event.clone()))
}
