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

//! BlueZ implementation of [`BluetoothAdapter`].

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role, SocketAddr, Stream};
use bluer::{Address, Session};
use futures::StreamExt;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adapter::{parse_address, BluetoothAdapter, BluetoothDevice, BoxedSocket};
use super::socket::ProfileStream;
use crate::config::BluetoothConfig;
use crate::error::PluginError;

/// Adapter backed by the BlueZ daemon.
pub struct BluezAdapter {
    session: Session,
    adapter: bluer::Adapter,
    fallback_channel: u8,
    connect_timeout: Duration,
}

impl BluezAdapter {
    /// Open the configured adapter.
    ///
    /// Returns `Ok(None)` when the system has no Bluetooth adapter.
    pub async fn open(session: Session, config: &BluetoothConfig) -> Result<Option<Self>> {
        let adapter = match &config.adapter {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        };

        let adapter = match adapter {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("No Bluetooth adapter available: {}", e);
                return Ok(None);
            }
        };

        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Some(Self {
            session,
            adapter,
            fallback_channel: config.fallback_channel,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }))
    }

    /// Underlying bluer adapter.
    pub fn inner(&self) -> &bluer::Adapter {
        &self.adapter
    }

    /// Connect through a registered client profile for `uuid`.
    ///
    /// BlueZ resolves the RFCOMM channel from the remote SDP record and hands
    /// the connected socket back through the profile handle.
    async fn connect_via_profile(
        &self,
        mut handle: ProfileHandle,
        address: Address,
        uuid: Uuid,
    ) -> io::Result<BoxedSocket> {
        let device = self.adapter.device(address).map_err(io::Error::other)?;

        let connect = device.connect_profile(&uuid);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                res = &mut connect => {
                    res.map_err(io::Error::other)?;
                    debug!("connect_profile returned for {}", address);
                    // The connect request may still be in flight; wait for it below.
                    let req = handle.next().await.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::ConnectionAborted, "Profile handle closed")
                    })?;
                    return self.accept_request(req, handle, address);
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::ConnectionAborted, "Profile handle closed")
                    })?;
                    if req.device() != address {
                        debug!("Rejecting connect request from {}", req.device());
                        req.reject(ReqError::Rejected);
                        continue;
                    }
                    return self.accept_request(req, handle, address);
                }
            }
        }
    }

    fn accept_request(
        &self,
        req: bluer::rfcomm::ConnectRequest,
        handle: ProfileHandle,
        address: Address,
    ) -> io::Result<BoxedSocket> {
        let stream = req.accept().map_err(io::Error::other)?;
        info!("RFCOMM connected to {} via profile", address);
        Ok(Box::new(ProfileStream::new(stream, Some(handle))))
    }

    /// Connect straight to a fixed RFCOMM channel.
    async fn connect_direct(&self, address: Address) -> io::Result<BoxedSocket> {
        let socket_addr = SocketAddr::new(address, self.fallback_channel);
        info!(
            "Connecting to {} on RFCOMM channel {}",
            address, self.fallback_channel
        );
        let stream = Stream::connect(socket_addr).await?;
        Ok(Box::new(ProfileStream::new(stream, None)))
    }
}

#[async_trait]
impl BluetoothAdapter for BluezAdapter {
    async fn is_enabled(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn bonded_devices(&self) -> io::Result<Vec<BluetoothDevice>> {
        let mut devices = Vec::new();

        for addr in self
            .adapter
            .device_addresses()
            .await
            .map_err(io::Error::other)?
        {
            let device = self.adapter.device(addr).map_err(io::Error::other)?;
            if device.is_paired().await.unwrap_or(false) {
                let name = device.alias().await.ok();
                devices.push(BluetoothDevice::new(addr, name));
            }
        }

        Ok(devices)
    }

    async fn remote_device(&self, address: &str) -> Result<BluetoothDevice, PluginError> {
        let address = parse_address(address)?;
        // Unknown devices have no D-Bus object yet; the name is simply absent.
        let name = match self.adapter.device(address) {
            Ok(device) => device.alias().await.ok(),
            Err(_) => None,
        };
        Ok(BluetoothDevice::new(address, name))
    }

    async fn connect_insecure_rfcomm(
        &self,
        device: &BluetoothDevice,
        uuid: Uuid,
    ) -> io::Result<BoxedSocket> {
        let profile = Profile {
            uuid,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };

        let attempt = async {
            match self.session.register_profile(profile).await {
                Ok(handle) => self.connect_via_profile(handle, device.address, uuid).await,
                Err(e) => {
                    warn!("Profile registration failed ({}), using direct RFCOMM", e);
                    self.connect_direct(device.address).await
                }
            }
        };

        tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Connection timed out"))?
    }
}
