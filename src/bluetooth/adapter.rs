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

//! Adapter abstraction over the OS Bluetooth stack.

use async_trait::async_trait;
use bluer::Address;
use std::fmt;
use std::io;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::PluginError;

/// Byte stream of an open RFCOMM socket.
pub trait SerialSocket: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialSocket for T {}

/// Boxed socket handed out by an adapter.
pub type BoxedSocket = Box<dyn SerialSocket>;

/// A device known to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothDevice {
    pub address: Address,
    pub name: Option<String>,
}

impl BluetoothDevice {
    pub fn new(address: Address, name: Option<String>) -> Self {
        Self { address, name }
    }
}

/// Renders as `"<name> - <address>"`, the form `scanDevices` returns.
impl fmt::Display for BluetoothDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} - {}", name, self.address),
            None => write!(f, "{} - {}", self.address, self.address),
        }
    }
}

/// Parse a textual MAC address such as `00:11:22:33:44:55`.
pub fn parse_address(address: &str) -> Result<Address, PluginError> {
    Address::from_str(address.trim())
        .map_err(|_| PluginError::InvalidArgument(format!("Invalid device address: {}", address)))
}

/// Operations the bridge needs from the local Bluetooth adapter.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the adapter is powered on.
    async fn is_enabled(&self) -> bool;

    /// Devices paired at the OS level, in enumeration order.
    async fn bonded_devices(&self) -> io::Result<Vec<BluetoothDevice>>;

    /// Look up a remote device by address. The device need not be bonded.
    async fn remote_device(&self, address: &str) -> Result<BluetoothDevice, PluginError>;

    /// Open an RFCOMM socket to the service record `uuid` without requiring
    /// authentication or encryption.
    async fn connect_insecure_rfcomm(
        &self,
        device: &BluetoothDevice,
        uuid: Uuid,
    ) -> io::Result<BoxedSocket>;
}
