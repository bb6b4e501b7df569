use anyhow::Result;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use topichub::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    // 2. Load configuration, with an optional `hubdev.toml` override file.
    let settings = config::Config::builder()
        .add_source(config::File::with_name("hubdev").required(false))
        .build()?;
    let hub_config: HubConfig = settings.try_deserialize()?;

    // 3. Create the hub registry and grab our realm's hub.
    let registry = HubRegistry::new();
    let hub = registry.hub_with_config(hub_config);
    info!(
        "{} v{} on realm {:?}",
        topichub::HUB_NAME,
        topichub::VERSION,
        hub.realm()
    );

    // 4. Register demo subscribers before starting the hub.
    register_demo_subscribers(&hub).await?;

    // 5. Start the hub on the current runtime. This also publishes the
    //    "/system/start" message our logger subscriber will pick up.
    hub.start(&tokio::runtime::Handle::current())?;

    // 6. Fire a request/response publish from a concurrent task.
    let requester = hub.clone();
    tokio::spawn(async move {
        let answer = requester
            .publish_and_wait("/math/double", json!(7), DEFAULT_PRIORITY, true)
            .await;
        info!("[REQUEST] => /math/double(7) answered {:?}", answer);
    });

    // 7. Run until Ctrl+C, then shut everything down.
    info!("Hub running. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;
    hub.stop().await?;
    registry.close().await;
    Ok(())
}

/// Registers subscribers that demonstrate the hub's core behaviors.
async fn register_demo_subscribers(hub: &Hub) -> Result<()> {
    // --- A catch-all logger, including the /system/* topics ---
    hub.subscribe(
        ".*",
        callback_fn(|key, payload| {
            info!("[TOPIC] => {key} {payload}");
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await?;

    // --- A request/response subscriber: doubles the payload ---
    hub.subscribe(
        "^/math/double$",
        callback_fn(|_key, payload| Ok(payload.as_i64().map(|n| json!(n * 2)))),
        SubscribeOptions::default(),
    )
    .await?;

    // --- A 5-tick periodic timer ---
    let ticks = Arc::new(AtomicU32::new(0));
    hub.subscribe(
        "timer://hubdev/each/5",
        callback_fn(move |_key, _payload| {
            let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
            info!("[TIMER] => fired {n} time(s)");
            Ok(None)
        }),
        SubscribeOptions::default(),
    )
    .await?;

    Ok(())
}
