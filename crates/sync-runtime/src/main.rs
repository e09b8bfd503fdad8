//! # State-Sync Runtime
//!
//! Runs one coordinating host with two demo windows, one on a dedicated
//! zero-copy port and one on the multiplexed fallback channel, and walks
//! through the main flows: shared writes, watchers, a batched transaction,
//! a readonly key and a group message.
//!
//! Configuration is read from `SYNC_*` environment variables; log verbosity
//! from `RUST_LOG` (default `info`).

use anyhow::Result;
use serde_json::{json, Value};
use sync_bus::{FieldPermission, GroupResolver, SyncConfig};
use sync_runtime::SyncRuntime;
use sync_types::WindowId;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = SyncConfig::from_env();

    let groups: Box<dyn GroupResolver> = Box::new(|group: &str| match group {
        "editors" => vec![WindowId::new("main"), WindowId::new("settings")],
        _ => Vec::new(),
    });
    let runtime = SyncRuntime::start(config, Some(groups))?;
    let host = runtime.handle();

    let mut main_window = runtime.open_window(WindowId::new("main"), true).await?;
    let mut settings = runtime.open_window(WindowId::new("settings"), false).await?;

    host.set(None, "build", json!("1.0.0")).await?;
    host.set_permission("build", FieldPermission::Readonly).await?;

    let _theme_watch = settings.watch("theme", |event| {
        info!(
            new_value = ?event.new_value,
            old_value = ?event.old_value,
            origin = ?event.window_id,
            "settings saw theme change"
        );
    })?;
    let _toasts = settings.on_message("toast", |event| {
        info!(payload = %event.payload, "settings got a toast");
    });

    main_window.set("theme", json!("dark")).await;
    main_window.set("theme", json!("light")).await;
    settings.pump();

    for _ in 0..2 {
        main_window
            .update("counter", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1))
            .await;
    }
    info!(counter = ?settings.get("counter").await?, "Counter after two updates");

    main_window.start_transaction().await;
    main_window.set("language", json!("fr")).await;
    main_window.set("theme", json!("sepia")).await;
    main_window.commit_transaction().await;
    settings.pump();

    let denied = settings.set("build", json!("2.0.0")).await;
    if !denied.is_success() {
        warn!(error = ?denied.error, "Readonly key rejected the write as expected");
    }

    let delivered = main_window
        .send_to_group("editors", "toast", json!("Preferences saved"))
        .await?;
    settings.pump();
    info!(delivered, "Group message sent");

    info!(store = ?host.snapshot(None).await?, "Final store");
    info!(stats = ?host.transport_stats().await?, "Transport statistics");

    runtime.close_window(WindowId::new("settings"))?;
    runtime.shutdown().await?;
    Ok(())
}
