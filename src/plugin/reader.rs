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

//! Socket read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::ChannelSlot;
use crate::bluetooth::BoxedSocket;
use crate::channel::PushEvent;
use crate::state::ConnectionState;

/// Everything the read loop needs, moved into its task.
pub(super) struct ReadLoop {
    pub socket: BoxedSocket,
    pub reading: Arc<AtomicBool>,
    pub shutdown: oneshot::Receiver<()>,
    pub buffer_size: usize,
    pub channel: ChannelSlot,
    pub state: Arc<ConnectionState>,
    pub generation: u64,
}

impl ReadLoop {
    /// Forward every chunk read from the socket as one `onDataReceived` event.
    ///
    /// Ends when the reading flag is cleared or the socket fails; a failure
    /// disconnects the attempt this loop belongs to.
    pub async fn run(mut self) {
        let mut buffer = vec![0u8; self.buffer_size.max(1)];
        debug!("Read loop started (generation {})", self.generation);

        while self.reading.load(Ordering::SeqCst) {
            tokio::select! {
                _ = &mut self.shutdown => break,
                res = self.socket.read(&mut buffer) => match res {
                    Ok(0) => {
                        info!("Connection closed by remote");
                        self.drop_connection();
                        break;
                    }
                    Ok(n) => {
                        let data = String::from_utf8_lossy(&buffer[..n]).into_owned();
                        self.channel.emit(PushEvent::DataReceived(data));
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        self.drop_connection();
                        break;
                    }
                },
            }
        }

        // Close errors are ignored.
        let _ = self.socket.shutdown().await;
        debug!("Read loop stopped (generation {})", self.generation);
    }

    fn drop_connection(&self) {
        if let Some(mut connection) = self.state.disconnect_generation(self.generation) {
            // Our own task; stopping is enough, awaiting would deadlock.
            connection.stop();
        }
    }
}
