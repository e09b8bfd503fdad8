//! # Transport & Lifecycle Scenarios
//!
//! - Zero-copy and fallback windows observe identical changes
//! - Forced transport modes
//! - Self-notification on and off
//! - Window teardown through the lifecycle adapter
//! - Direct and group messages

#[cfg(test)]
mod tests {
    use super::super::{recorder, spawn_host};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use sync_bus::{
        auto_register, window_channel, MessageBus, MockTimeSource, SyncConfig, SyncHost,
        TransportKind, TransportMode, WindowLifecycleEvent,
    };
    use sync_mirror::Mirror;
    use sync_types::{Envelope, SyncError, TransportError, WindowId};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_both_strategies_see_the_same_changes() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut writer = Mirror::connect(host.clone(), WindowId::new("writer"), true).await.unwrap();
        let mut fast = Mirror::connect(host.clone(), WindowId::new("fast"), true).await.unwrap();
        let mut slow = Mirror::connect(host.clone(), WindowId::new("slow"), false).await.unwrap();
        let (fast_events, fast_cb) = recorder();
        let (slow_events, slow_cb) = recorder();
        let _f = fast.watch("doc", fast_cb).unwrap();
        let _s = slow.watch("doc", slow_cb).unwrap();

        for i in 0..10 {
            writer.set("doc", json!({ "rev": i })).await;
        }
        writer.delete("doc").await;
        fast.pump();
        slow.pump();

        let fast_events = fast_events.lock();
        let slow_events = slow_events.lock();
        assert_eq!(fast_events.len(), 11);
        assert_eq!(*fast_events, *slow_events);
        // Per-window delivery is FIFO.
        let versions: Vec<_> = fast_events.iter().filter_map(|e| e.version).collect();
        assert_eq!(versions, (1..=11).collect::<Vec<u64>>());
        assert_eq!(fast_events[10].new_value, None);
    }

    #[tokio::test]
    async fn test_forced_zero_copy_mode() {
        let (host, _task) = spawn_host(SyncConfig {
            transport_mode: TransportMode::ZeroCopy,
            ..SyncConfig::default()
        });
        let err = Mirror::connect(host.clone(), WindowId::new("legacy"), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Transport(TransportError::Unsupported { .. })
        ));
        assert!(host.registered_windows().await.unwrap().is_empty());
        assert!(Mirror::connect(host, WindowId::new("modern"), true).await.is_ok());
    }

    #[tokio::test]
    async fn test_forced_fallback_mode() {
        let (host, _task) = spawn_host(SyncConfig {
            transport_mode: TransportMode::Fallback,
            ..SyncConfig::default()
        });
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let snapshot = host.window_snapshot(WindowId::new("a")).await.unwrap().unwrap();
        assert_eq!(snapshot.transport, TransportKind::Fallback);

        let (events, cb) = recorder();
        let _w = a.watch("k", cb).unwrap();
        host.set(None, "k", json!(1)).await.unwrap();
        assert_eq!(a.pump(), 1);
        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_fallback_channel() {
        let (host, _task) = spawn_host(SyncConfig {
            fallback_channel: "app:sync".into(),
            ..SyncConfig::default()
        });
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), false)
            .await
            .unwrap()
            .with_fallback_channel("app:sync");
        let (events, cb) = recorder();
        let _w = a.watch("k", cb).unwrap();
        host.set(None, "k", json!(1)).await.unwrap();
        assert_eq!(a.pump(), 1);
        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_self_notification_enabled() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let (events, cb) = recorder();
        let _w = a.watch("k", cb).unwrap();
        a.set("k", json!("mine")).await;
        assert_eq!(events.lock().len(), 1);
        assert_eq!(a.cached("k"), Some((Some(json!("mine")), 1)));
    }

    #[tokio::test]
    async fn test_self_notification_disabled() {
        let (host, _task) = spawn_host(SyncConfig {
            notify_origin: false,
            ..SyncConfig::default()
        });
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        let (a_events, a_cb) = recorder();
        let (b_events, b_cb) = recorder();
        let _wa = a.watch("k", a_cb).unwrap();
        let _wb = b.watch("k", b_cb).unwrap();

        host.set(None, "k", json!("host")).await.unwrap();
        assert_eq!(a.get("k").await.unwrap(), Some(json!("host")));

        a.set("k", json!("mine")).await;
        b.pump();
        // a only heard the host's write; b heard both.
        assert_eq!(a_events.lock().len(), 1);
        assert_eq!(b_events.lock().len(), 2);
        assert_eq!(a.get("k").await.unwrap(), Some(json!("mine")));
    }

    #[tokio::test]
    async fn test_teardown_through_lifecycle_adapter() {
        let bus = MessageBus::with_clock(SyncConfig::default(), Arc::new(MockTimeSource::new(0)));
        let (host, host_task) = SyncHost::spawn(bus);
        let (lifecycle, events) = mpsc::unbounded_channel();
        let adapter = auto_register(events, host.clone());

        let (endpoint, inbox) = window_channel(true);
        lifecycle
            .send(WindowLifecycleEvent::Created {
                window_id: WindowId::new("doomed"),
                endpoint,
            })
            .unwrap();
        // Wait for the adapter to register the window.
        timeout(Duration::from_secs(1), async {
            while !host
                .registered_windows()
                .await
                .unwrap()
                .contains(&WindowId::new("doomed"))
            {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let mut doomed = Mirror::new(WindowId::new("doomed"), inbox, host.clone());
        let _w = doomed.watch("theme", |_| {}).unwrap();
        assert!(doomed.start_transaction().await.is_success());
        doomed.set("theme", json!("staged")).await;

        lifecycle
            .send(WindowLifecycleEvent::Destroyed {
                window_id: WindowId::new("doomed"),
            })
            .unwrap();
        drop(lifecycle);
        timeout(Duration::from_secs(1), adapter).await.unwrap().unwrap();

        assert_eq!(host.get("theme", None).await.unwrap(), None);
        assert!(host.window_snapshot(WindowId::new("doomed")).await.unwrap().is_none());
        // Unregistering twice is harmless.
        assert!(!host.unregister_window(WindowId::new("doomed")).await.unwrap());

        host.shutdown().unwrap();
        let bus = host_task.await.unwrap();
        assert!(!bus.has_residual_state(&WindowId::new("doomed")));
        assert_eq!(bus.transport_stats().send_failures, 0);
    }

    #[tokio::test]
    async fn test_direct_and_group_messages() {
        let bus = MessageBus::new(SyncConfig::default()).with_group_resolver(|group: &str| {
            match group {
                "editors" => vec![WindowId::new("a"), WindowId::new("b")],
                _ => Vec::new(),
            }
        });
        let (host, _task) = SyncHost::spawn(bus);
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        let mut c = Mirror::connect(host.clone(), WindowId::new("c"), true).await.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let _l = b.on_message("ping", move |event| sink.lock().push(event.payload.clone()));
        let c_hits = Arc::new(Mutex::new(0_usize));
        let c_sink = Arc::clone(&c_hits);
        let _lc = c.on_message("ping", move |_| *c_sink.lock() += 1);

        assert!(a.send_to_window(WindowId::new("b"), "ping", json!(1)).await.unwrap());
        assert!(!a.send_to_window(WindowId::new("ghost"), "ping", json!(0)).await.unwrap());
        assert_eq!(a.send_to_group("editors", "ping", json!(2)).await.unwrap(), 2);
        assert_eq!(a.send_to_group("nobody", "ping", json!(3)).await.unwrap(), 0);

        b.pump();
        c.pump();
        assert_eq!(*received.lock(), vec![json!(1), json!(2)]);
        assert_eq!(*c_hits.lock(), 0);
    }

    #[tokio::test]
    async fn test_recv_waits_for_next_frame() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), false).await.unwrap();
        let (events, cb) = recorder();
        let _w = a.watch("k", cb).unwrap();

        let writer = host.clone();
        tokio::spawn(async move {
            writer.set(None, "k", json!("pushed")).await.unwrap();
        });
        let applied = timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        assert_eq!(applied, Some(true));
        assert_eq!(events.lock()[0].new_value, Some(json!("pushed")));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::set("theme", json!("dark"), Some(json!("light")), 2, None, 10);
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "set");
        assert_eq!(wire["oldValue"], "light");
        assert!(wire.get("windowId").is_none());
    }
}
