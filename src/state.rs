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

//! Connection state management.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bluetooth::BluetoothDevice;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

/// An open socket and the read loop draining it.
#[derive(Debug)]
pub struct Connection {
    generation: u64,
    reading: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Create a connection for attempt `generation`.
    ///
    /// Returns the reading flag and the shutdown receiver for the read loop.
    pub fn new(generation: u64) -> (Self, Arc<AtomicBool>, oneshot::Receiver<()>) {
        let reading = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let connection = Self {
            generation,
            reading: reading.clone(),
            shutdown: Some(shutdown_tx),
            reader: None,
        };
        (connection, reading, shutdown_rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear the reading flag and wake the read loop.
    pub fn stop(&mut self) {
        self.reading.store(false, Ordering::SeqCst);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Stop and wait for the read loop to release the socket.
    pub async fn close(mut self) {
        self.stop();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Single connection slot shared by the plugin and its read loop.
#[derive(Debug)]
pub struct ConnectionState {
    status: RwLock<ConnectionStatus>,
    current_device: RwLock<Option<BluetoothDevice>>,
    /// Attempt counter; a connection is current only while its generation matches.
    generation: Mutex<u64>,
    connection: Mutex<Option<Connection>>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::Disconnected),
            current_device: RwLock::new(None),
            generation: Mutex::new(0),
            connection: Mutex::new(None),
        }
    }
}

impl ConnectionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a new attempt targeting `device`.
    ///
    /// Returns the attempt generation and the previous connection, if any,
    /// which the caller must close.
    pub fn begin_connect(&self, device: BluetoothDevice) -> (u64, Option<Connection>) {
        let mut generation = self.generation.lock();
        *generation += 1;

        let previous = self.connection.lock().take();
        *self.current_device.write() = Some(device);
        *self.status.write() = ConnectionStatus::Connecting;

        (*generation, previous)
    }

    /// Store the connection of attempt `connection.generation()`.
    ///
    /// Hands the connection back if the attempt was superseded or dropped.
    pub fn set_connected(&self, connection: Connection) -> Result<(), Connection> {
        let generation = self.generation.lock();
        if *generation != connection.generation() {
            return Err(connection);
        }

        *self.connection.lock() = Some(connection);
        *self.status.write() = ConnectionStatus::Connected;
        Ok(())
    }

    /// Attach the read loop task to the current connection.
    ///
    /// Returns the handle if `generation` is no longer current.
    pub fn set_reader(&self, generation: u64, reader: JoinHandle<()>) -> Option<JoinHandle<()>> {
        let mut connection = self.connection.lock();
        match connection.as_mut() {
            Some(c) if c.generation == generation => {
                c.reader = Some(reader);
                None
            }
            _ => Some(reader),
        }
    }

    /// Record a failed attempt. The target device is kept.
    pub fn connect_failed(&self, generation: u64) {
        let current = self.generation.lock();
        if *current == generation {
            *self.status.write() = ConnectionStatus::Disconnected;
        }
    }

    /// Tear down whatever is open and forget the device.
    pub fn disconnect(&self) -> Option<Connection> {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.reset()
    }

    /// Tear down only if attempt `generation` is still current.
    ///
    /// Used by a read loop so it cannot close a newer connection.
    pub fn disconnect_generation(&self, generation: u64) -> Option<Connection> {
        let mut current = self.generation.lock();
        if *current != generation {
            return None;
        }
        *current += 1;
        self.reset()
    }

    fn reset(&self) -> Option<Connection> {
        let connection = self.connection.lock().take();
        *self.current_device.write() = None;
        *self.status.write() = ConnectionStatus::Disconnected;
        connection
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.get_status() == ConnectionStatus::Connected
    }

    pub fn get_device(&self) -> Option<BluetoothDevice> {
        self.current_device.read().clone()
    }
}
