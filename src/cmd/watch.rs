//! `shopfloor watch <orders|items>` — stream live updates.

use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use shopfloor::SyncClient;
use shopfloor::cache::{QueryParams, Resource, Subscription};
use shopfloor::config::ShopfloorConfig;
use shopfloor::live::{BridgeState, LiveBridge, StreamResource};
use shopfloor::models::{Item, Order, Page};
use shopfloor::storage::CredentialStore;

/// The typed view being watched; holding it keeps the cache entry
/// subscribed so pushed deltas have somewhere to land.
enum View {
    Orders(Resource<Page<Order>>),
    Items(Resource<Page<Item>>),
}

impl View {
    fn subscription(&mut self) -> &mut Subscription {
        match self {
            Self::Orders(resource) => resource.subscription(),
            Self::Items(resource) => resource.subscription(),
        }
    }
}

pub async fn cmd_watch(config: &ShopfloorConfig, resource: &str) -> Result<()> {
    let resource: StreamResource = resource
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Watch supports 'orders' and 'items'")?;

    let store = Arc::new(CredentialStore::open_default()?);
    let client = SyncClient::new(config, store.clone())?;
    let params = QueryParams::new().offset(0).limit(25);

    let mut view = match resource {
        StreamResource::Orders => View::Orders(client.orders(params)),
        StreamResource::Items => View::Items(client.items(params)),
    };

    let bridge = Arc::new(LiveBridge::new(
        config,
        resource,
        client.cache().clone(),
        store,
    ));
    let mut bridge_state = bridge.state();
    let runner = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run().await })
    };

    println!(
        "Watching {} (ctrl-c to stop)",
        style(resource.as_str()).bold()
    );
    loop {
        tokio::select! {
            changed = view.subscription().changed() => {
                if !changed {
                    break;
                }
                let snapshot = view.subscription().snapshot();
                if let Some(data) = snapshot.data {
                    let rows = data
                        .get("results")
                        .and_then(|r| r.as_array())
                        .map(|r| r.len())
                        .unwrap_or(0);
                    println!("{} {} row(s) in view", style("updated").cyan(), rows);
                }
            }
            _ = bridge_state.changed() => {
                let state = *bridge_state.borrow();
                let label = match state {
                    BridgeState::Connected => style("connected").green(),
                    BridgeState::Connecting => style("connecting").yellow(),
                    BridgeState::Disconnected => style("disconnected").red(),
                };
                println!("push channel {}", label);
            }
            _ = tokio::signal::ctrl_c() => {
                bridge.shutdown();
                break;
            }
        }
    }

    let _ = runner.await;
    println!("stopped");
    Ok(())
}
