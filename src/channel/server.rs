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

//! Unix socket server for the method channel.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::{EventSink, MethodCall, Outgoing, PushEvent, Reply, CHANNEL};
use crate::error::PluginError;
use crate::plugin::BluetoothPlugin;

/// Longest request line accepted, excluding the newline.
const MAX_REQUEST_LEN: u64 = 64 * 1024;

/// Removes the socket file when the server goes away.
struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Serves method calls for one plugin.
pub struct ChannelServer {
    listener: UnixListener,
    plugin: Arc<BluetoothPlugin>,
    events: EventSink,
    _guard: SocketGuard,
}

impl ChannelServer {
    /// Bind the socket, replacing a stale one.
    pub fn bind(path: &Path, plugin: Arc<BluetoothPlugin>, events: EventSink) -> Result<Self> {
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path)?;
        info!("Channel {} listening on {:?}", CHANNEL, path);

        Ok(Self {
            listener,
            plugin,
            events,
            _guard: SocketGuard(path.to_path_buf()),
        })
    }

    /// Accept clients until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    debug!("Channel client connected");
                    let plugin = self.plugin.clone();
                    let events = self.events.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, plugin, events).await {
                            warn!("Channel client error: {}", e);
                        }
                        debug!("Channel client disconnected");
                    });
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    plugin: Arc<BluetoothPlugin>,
    events: broadcast::Receiver<PushEvent>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Outgoing>();

    let writer_task = tokio::spawn(write_loop(writer, out_rx, events));

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = (&mut reader)
            .take(MAX_REQUEST_LEN + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            break;
        }

        if line.last() != Some(&b'\n') && n as u64 > MAX_REQUEST_LEN {
            skip_line(&mut reader).await?;
            let reply: Reply = PluginError::InvalidArgument(format!(
                "Request exceeds {} bytes",
                MAX_REQUEST_LEN
            ))
            .into();
            let _ = out_tx.send(Outgoing::reply(0, reply));
            continue;
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match MethodCall::from_slice(&line) {
            Ok(call) => {
                debug!("Method call {}: {}", call.id, call.method);
                let plugin = plugin.clone();
                let out_tx = out_tx.clone();
                // Calls run concurrently; replies go out in completion order.
                tokio::spawn(async move {
                    let reply = plugin.on_method_call(&call).await;
                    let _ = out_tx.send(Outgoing::reply(call.id, reply));
                });
            }
            Err(e) => {
                let reply: Reply =
                    PluginError::InvalidArgument(format!("Invalid request: {}", e)).into();
                let _ = out_tx.send(Outgoing::reply(0, reply));
            }
        }
    }

    // In-flight calls hold sender clones; the writer drains until they finish.
    drop(out_tx);
    let _ = writer_task.await;
    Ok(())
}

/// Discard input up to and including the next newline.
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

async fn write_loop(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut replies: mpsc::UnboundedReceiver<Outgoing>,
    mut events: broadcast::Receiver<PushEvent>,
) {
    loop {
        let outgoing = tokio::select! {
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => Outgoing::from(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Client lagging, {} events dropped", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let line = match outgoing.to_json() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode message: {}", e);
                continue;
            }
        };

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Write failed, closing client: {}", e);
            break;
        }
    }
}
