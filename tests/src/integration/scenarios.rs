//! # End-to-End Scenarios
//!
//! Drives the host through mirrors the way window UI code would:
//!
//! 1. **Round trip**: a written value reads back deep-equal
//! 2. **Readonly keys**: every write fails, the stored value is untouched
//! 3. **Rollback**: staged writes leave no trace
//! 4. **Batching**: one commit, one fanout pass, one frame per window
//! 5. **Isolation**: unwatched keys are never pushed but always readable
//! 6. **Theme scenario**: cross-window watcher fires exactly once
//! 7. **Counters**: sequential updates never lose a write

#[cfg(test)]
mod tests {
    use super::super::{recorder, spawn_host};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use sync_bus::{FieldPermission, SyncConfig};
    use sync_mirror::Mirror;
    use sync_types::{ErrorCode, WindowId};

    fn incr(v: Option<&Value>) -> Value {
        json!(v.and_then(Value::as_i64).unwrap_or(0) + 1)
    }

    // =========================================================================
    // ROUND TRIP & PERMISSIONS
    // =========================================================================

    #[tokio::test]
    async fn test_round_trip_deep_equal() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();

        let values = [
            json!(null),
            json!(42),
            json!("text"),
            json!([1, "two", { "three": 3 }]),
            json!({ "user": { "name": "Ada", "tags": ["x", "y"] } }),
        ];
        for (i, value) in values.iter().enumerate() {
            let key = format!("key.{i}");
            assert!(a.set(&key, value.clone()).await.is_success());
            assert_eq!(a.get(&key).await.unwrap().as_ref(), Some(value));
            assert_eq!(b.get(&key).await.unwrap().as_ref(), Some(value));
        }
        // Dotted keys are flat: nothing was written under "key".
        assert_eq!(a.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_readonly_key_rejects_all_windows() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        host.set(None, "version", json!("1.0")).await.unwrap();
        host.set_permission("version", FieldPermission::Readonly).await.unwrap();

        for attempt in [json!("2.0"), json!(null), json!({ "hack": true })] {
            let result = a.set("version", attempt.clone()).await;
            assert!(!result.is_success());
            assert_eq!(result.error_code(), Some(ErrorCode::PermissionDenied));
            assert!(!b.set("version", attempt).await.is_success());
        }
        assert!(!a.delete("version").await.is_success());
        assert!(!b.update("version", |_| json!("3.0")).await.is_success());
        assert_eq!(a.get("version").await.unwrap(), Some(json!("1.0")));
    }

    #[tokio::test]
    async fn test_allow_list_membership() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut main = Mirror::connect(host.clone(), WindowId::new("main"), true).await.unwrap();
        let mut popup = Mirror::connect(host.clone(), WindowId::new("popup"), true).await.unwrap();
        host.set_permission("settings", FieldPermission::allow(["main"]))
            .await
            .unwrap();

        assert!(main.set("settings", json!({ "zoom": 2 })).await.is_success());
        assert!(!popup.set("settings", json!({ "zoom": 9 })).await.is_success());
        assert_eq!(popup.get("settings").await.unwrap(), Some(json!({ "zoom": 2 })));
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    #[tokio::test]
    async fn test_rollback_restores_pre_transaction_values() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), true).await.unwrap();
        a.set("x", json!("x0")).await;
        a.set("y", json!("y0")).await;

        assert!(a.start_transaction().await.is_success());
        for i in 0..5 {
            a.set("x", json!(i)).await;
            a.set("y", json!(i)).await;
            a.set("z", json!(i)).await;
        }
        a.delete("x").await;
        assert_eq!(a.get("z").await.unwrap(), Some(json!(4)));
        assert_eq!(b.get("z").await.unwrap(), None);
        assert!(a.rollback_transaction().await.is_success());

        assert_eq!(a.get("x").await.unwrap(), Some(json!("x0")));
        assert_eq!(a.get("y").await.unwrap(), Some(json!("y0")));
        assert_eq!(a.get("z").await.unwrap(), None);
        assert_eq!(b.get("x").await.unwrap(), Some(json!("x0")));
    }

    #[tokio::test]
    async fn test_commit_is_one_fanout_pass() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        let (events, cb) = recorder();
        let _k1 = b.watch("k1", cb).unwrap();
        let (events2, cb2) = recorder();
        let _k2 = b.watch("k2", cb2).unwrap();

        a.start_transaction().await;
        a.set("k1", json!("v1")).await;
        a.set("k2", json!("v2")).await;
        let before = host.transport_stats().await.unwrap();
        assert!(a.commit_transaction().await.is_success());
        let after = host.transport_stats().await.unwrap();

        assert_eq!(after.fanout_passes - before.fanout_passes, 1);
        assert_eq!(after.frames_sent - before.frames_sent, 1);
        // Both changes arrive in one frame.
        assert_eq!(b.pump(), 1);
        assert_eq!(events.lock().len(), 1);
        assert_eq!(events2.lock().len(), 1);
        assert_eq!(b.get("k1").await.unwrap(), Some(json!("v1")));
        assert_eq!(b.get("k2").await.unwrap(), Some(json!("v2")));
    }

    #[tokio::test]
    async fn test_nested_transaction_is_rejected() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host, WindowId::new("a"), true).await.unwrap();
        assert!(a.start_transaction().await.is_success());
        let nested = a.start_transaction().await;
        assert_eq!(nested.error_code(), Some(ErrorCode::TransactionError));
        // The original transaction is still usable.
        a.set("k", json!(1)).await;
        assert!(a.commit_transaction().await.is_success());
        assert_eq!(a.get("k").await.unwrap(), Some(json!(1)));
    }

    // =========================================================================
    // WATCHERS
    // =========================================================================

    #[tokio::test]
    async fn test_subscription_isolation() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), true).await.unwrap();
        let (events, cb) = recorder();
        let _theme = a.watch("theme", cb).unwrap();

        b.set("language", json!("de")).await;
        assert_eq!(a.pump(), 0);
        assert!(events.lock().is_empty());
        assert_eq!(a.get("language").await.unwrap(), Some(json!("de")));

        b.set("theme", json!("dark")).await;
        assert_eq!(a.pump(), 1);
        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_theme_scenario() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();

        assert!(a.set("theme", json!("dark")).await.is_success());
        assert_eq!(a.get("theme").await.unwrap(), Some(json!("dark")));

        let (a_events, a_cb) = recorder();
        let (b_events, b_cb) = recorder();
        let _wa = a.watch("theme", a_cb).unwrap();
        let _wb = b.watch("theme", b_cb).unwrap();

        assert!(a.set("theme", json!("light")).await.is_success());
        b.pump();
        b.pump();

        let b_events = b_events.lock();
        assert_eq!(b_events.len(), 1);
        assert_eq!(b_events[0].new_value, Some(json!("light")));
        assert_eq!(b_events[0].old_value, Some(json!("dark")));
        assert_eq!(b_events[0].window_id, Some(WindowId::new("a")));
        assert_eq!(a_events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_watcher_does_not_block_others() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&hits);
        let last = Arc::clone(&hits);
        let _w1 = a
            .watch("k", move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let _w2 = a.watch("k", |_| panic!("broken watcher")).unwrap();
        let _w3 = a
            .watch("k", move |_| {
                last.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(a.set("k", json!(1)).await.is_success());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(a.set("k", json!(2)).await.is_success());
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_clear_notifies_watchers() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), true).await.unwrap();
        let (events, cb) = recorder();
        let _w = b.watch("theme", cb).unwrap();
        a.set("theme", json!("dark")).await;
        a.set("other", json!(1)).await;
        b.pump();

        assert!(a.clear().await.is_success());
        b.pump();
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].new_value, None);
        assert_eq!(events[1].old_value, Some(json!("dark")));
        drop(events);
        assert_eq!(b.get("theme").await.unwrap(), None);
        assert!(b.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_reaches_watcher_of_uncached_key() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        a.set("theme", json!("dark")).await;

        // b starts watching after the write and never reads the key.
        let (events, cb) = recorder();
        let _w = b.watch("theme", cb).unwrap();
        assert!(b.cached("theme").is_none());

        assert!(a.clear().await.is_success());
        assert!(b.get_all().await.unwrap().is_empty());
        b.pump();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "theme");
        assert_eq!(events[0].new_value, None);
        assert_eq!(events[0].old_value, Some(json!("dark")));
        assert_eq!(events[0].window_id, Some(WindowId::new("a")));
        assert_eq!(events[0].version, Some(2));
        drop(events);
        assert_eq!(b.get("theme").await.unwrap(), None);
    }

    // =========================================================================
    // COUNTERS
    // =========================================================================

    #[tokio::test]
    async fn test_sequential_updates_never_lose_writes() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut a = Mirror::connect(host.clone(), WindowId::new("a"), true).await.unwrap();
        let mut b = Mirror::connect(host.clone(), WindowId::new("b"), false).await.unwrap();
        assert!(a.update("counter", incr).await.is_success());
        assert!(b.update("counter", incr).await.is_success());
        assert_eq!(a.get("counter").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_concurrent_updates_from_many_windows() {
        let (host, _task) = spawn_host(SyncConfig::default());
        let mut joins = Vec::new();
        for i in 0..8 {
            let host = host.clone();
            joins.push(tokio::spawn(async move {
                let window = WindowId::new(format!("w{i}"));
                host.register_window(window.clone(), sync_bus::window_channel(i % 2 == 0).0)
                    .await
                    .unwrap();
                for _ in 0..25 {
                    host.update(Some(window.clone()), "counter", incr).await.unwrap();
                }
            }));
        }
        for join in joins {
            join.await.unwrap();
        }
        assert_eq!(host.get("counter", None).await.unwrap(), Some(json!(200)));
    }
}
