// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SPP bridge daemon.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spp_bridge::bluetooth::{BluetoothAdapter, BluezAdapter};
use spp_bridge::channel::{ChannelServer, EventSink, CHANNEL};
use spp_bridge::config::Config;
use spp_bridge::host::{self, ActivityBinding, BluezActivity};
use spp_bridge::BluetoothPlugin;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match config
        .logging
        .filter
        .parse::<tracing_subscriber::filter::Directive>()
    {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log filter {:?}: {}", config.logging.filter, e),
    }
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting SPP bridge v{}...", env!("CARGO_PKG_VERSION"));

    // Connect to BlueZ
    let session = bluer::Session::new().await?;
    info!("BlueZ session created");

    let bluez = BluezAdapter::open(session, &config.bluetooth).await?;
    let bluer_adapter = bluez.as_ref().map(|a| a.inner().clone());
    let adapter: Option<Arc<dyn BluetoothAdapter>> =
        bluez.map(|a| Arc::new(a) as Arc<dyn BluetoothAdapter>);

    let plugin = Arc::new(BluetoothPlugin::new(adapter, &config.bluetooth));

    // Attach to the channel
    let events = EventSink::new();
    plugin.on_attached_to_engine(events.clone());

    // Attach the host activity for prompts
    match (config.host.interactive, bluer_adapter) {
        (true, Some(bluer_adapter)) => {
            let (results_tx, results_rx) = host::result_channel();
            let activity = Arc::new(BluezActivity::new(bluer_adapter, results_tx));
            plugin.on_attached_to_activity(ActivityBinding::new(activity, results_rx));
        }
        (true, None) => warn!("No adapter, prompts disabled"),
        (false, _) => info!("Non-interactive mode, prompts disabled"),
    }

    let server = ChannelServer::bind(&config.channel.socket_path(), plugin.clone(), events)?;
    info!("Ready. Serving channel {}", CHANNEL);

    tokio::select! {
        res = server.run() => {
            if let Err(e) = res {
                error!("Channel server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    plugin.disconnect().await;
    plugin.on_detached_from_activity();
    plugin.on_detached_from_engine();

    info!("SPP bridge stopped");
    Ok(())
}
