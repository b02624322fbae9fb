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

//! Method channel between the bridge and the application shell.
//!
//! Calls and replies travel as newline-delimited JSON over a Unix socket.
//! Push events are broadcast to every connected client.

mod message;
mod server;

use tokio::sync::broadcast;
use tracing::debug;

pub use message::{MethodCall, Outgoing, PushEvent, Reply};
pub use server::ChannelServer;

/// Channel name announced to clients.
pub const CHANNEL: &str = "spp_bridge/bluetooth";

const EVENT_CAPACITY: usize = 1024;

/// Handle used by the plugin to push events to the shell.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<PushEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    /// Send an event to all subscribers.
    pub fn invoke(&self, event: PushEvent) {
        debug!("Push event: {}", event.method_name());
        if self.tx.send(event).is_err() {
            debug!("No clients subscribed, event dropped");
        }
    }
}
