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

//! Bluetooth plugin: method dispatch and the operations behind it.

mod reader;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bluetooth::BluetoothAdapter;
use crate::channel::{EventSink, MethodCall, PushEvent, Reply};
use crate::config::BluetoothConfig;
use crate::error::PluginError;
use crate::host::{
    Activity, ActivityBinding, ActivityResult, Permission, ResultCode,
    REQUEST_BLUETOOTH_PERMISSIONS, REQUEST_ENABLE_BLUETOOTH,
};
use crate::state::{Connection, ConnectionState};

use reader::ReadLoop;

/// Reply text for a successful connect.
pub const STATUS_CONNECTED: &str = "Connected";

/// Reply text for a disconnect.
pub const STATUS_DISCONNECTED: &str = "Disconnected";

const REQUIRED_PERMISSIONS: [Permission; 2] =
    [Permission::BluetoothConnect, Permission::BluetoothScan];

/// Where push events go; empty while detached from the engine.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelSlot(Arc<RwLock<Option<EventSink>>>);

impl ChannelSlot {
    fn set(&self, sink: Option<EventSink>) {
        *self.0.write() = sink;
    }

    fn emit(&self, event: PushEvent) {
        match self.0.read().as_ref() {
            Some(sink) => sink.invoke(event),
            None => debug!("Detached from engine, dropping {}", event.method_name()),
        }
    }
}

/// Reply of `isConnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub is_connected: bool,
    pub device_name: Option<String>,
}

/// The remote-callable Bluetooth plugin.
pub struct BluetoothPlugin {
    adapter: Option<Arc<dyn BluetoothAdapter>>,
    channel: ChannelSlot,
    activity: RwLock<Option<ActivityBinding>>,
    result_listener: Mutex<Option<JoinHandle<()>>>,
    state: Arc<ConnectionState>,
    service_uuid: Uuid,
    read_buffer_size: usize,
}

impl BluetoothPlugin {
    /// Create a plugin. `adapter` is `None` on systems without Bluetooth.
    pub fn new(adapter: Option<Arc<dyn BluetoothAdapter>>, config: &BluetoothConfig) -> Self {
        Self {
            adapter,
            channel: ChannelSlot::default(),
            activity: RwLock::new(None),
            result_listener: Mutex::new(None),
            state: ConnectionState::new(),
            service_uuid: config.service_uuid,
            read_buffer_size: config.read_buffer_size,
        }
    }

    /// Connection state, shared with the read loop.
    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    // Engine and activity lifecycle

    pub fn on_attached_to_engine(&self, sink: EventSink) {
        self.channel.set(Some(sink));
        info!("Plugin attached to engine");
    }

    pub fn on_detached_from_engine(&self) {
        self.channel.set(None);
        info!("Plugin detached from engine");
    }

    /// Attach the host activity and start listening for prompt results.
    pub fn on_attached_to_activity(&self, binding: ActivityBinding) {
        self.spawn_result_listener(&binding);
        *self.activity.write() = Some(binding);
        info!("Activity attached");
    }

    pub fn on_reattached_to_activity_for_config_changes(&self, binding: ActivityBinding) {
        self.on_attached_to_activity(binding);
    }

    pub fn on_detached_from_activity_for_config_changes(&self) {
        self.on_detached_from_activity();
    }

    pub fn on_detached_from_activity(&self) {
        *self.activity.write() = None;
        if let Some(listener) = self.result_listener.lock().take() {
            listener.abort();
        }
        info!("Activity detached");
    }

    fn spawn_result_listener(&self, binding: &ActivityBinding) {
        let results = binding.results();
        let channel = self.channel.clone();

        let listener = tokio::spawn(async move {
            while let Ok(result) = results.recv().await {
                handle_activity_result(&channel, result);
            }
        });

        if let Some(previous) = self.result_listener.lock().replace(listener) {
            previous.abort();
        }
    }

    fn activity(&self) -> Option<Arc<dyn Activity>> {
        self.activity
            .read()
            .as_ref()
            .map(|binding| binding.activity().clone())
    }

    fn adapter(&self) -> Result<&Arc<dyn BluetoothAdapter>, PluginError> {
        self.adapter.as_ref().ok_or(PluginError::Unavailable)
    }

    // Method dispatch

    /// Handle one method call from the shell.
    pub async fn on_method_call(&self, call: &MethodCall) -> Reply {
        match call.method.as_str() {
            "isBluetoothEnabled" => Reply::success(self.is_bluetooth_enabled().await),
            "requestBluetoothEnable" => Reply::from_result(self.request_bluetooth_enable().await),
            "scanDevices" => Reply::from_result(self.scan_devices().await),
            "connectToDevice" => match call.argument::<String>("address") {
                Some(address) => Reply::from_result(self.connect_to_device(&address).await),
                None => {
                    PluginError::InvalidArgument("Device address not specified".to_string()).into()
                }
            },
            "disconnect" => Reply::success(self.disconnect().await),
            "isConnected" => Reply::success(self.is_connected()),
            "requestBluetoothPermission" => {
                Reply::from_result(self.request_bluetooth_permission().await)
            }
            other => {
                debug!("Method not implemented: {}", other);
                Reply::NotImplemented
            }
        }
    }

    // Operations

    /// Whether the adapter is powered on. `false` without an adapter.
    pub async fn is_bluetooth_enabled(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.is_enabled().await,
            None => false,
        }
    }

    /// Ask the host to turn Bluetooth on.
    ///
    /// `Some(true)` if it already is; `None` when a prompt was started, whose
    /// answer arrives later as `onBluetoothEnabled`.
    pub async fn request_bluetooth_enable(&self) -> Result<Option<bool>, PluginError> {
        let activity = self.activity().ok_or(PluginError::NoActivity)?;
        let adapter = self.adapter()?;

        if adapter.is_enabled().await {
            return Ok(Some(true));
        }

        info!("Requesting Bluetooth enable");
        activity.start_enable_request(REQUEST_ENABLE_BLUETOOTH);
        Ok(None)
    }

    /// Bonded devices as `"<name> - <address>"`.
    pub async fn scan_devices(&self) -> Result<Vec<String>, PluginError> {
        let adapter = self.adapter()?;

        if !adapter.is_enabled().await {
            self.prompt_enable();
            return Err(PluginError::Disabled);
        }

        if !self.has_permissions().await {
            if let Some(activity) = self.activity() {
                activity.request_permissions(&REQUIRED_PERMISSIONS, REQUEST_BLUETOOTH_PERMISSIONS);
            }
            return Err(PluginError::PermissionDenied);
        }

        let devices = adapter.bonded_devices().await.map_err(|e| {
            warn!("Failed to enumerate bonded devices: {}", e);
            PluginError::Unavailable
        })?;

        info!("Found {} bonded devices", devices.len());
        Ok(devices.iter().map(ToString::to_string).collect())
    }

    /// Open an insecure RFCOMM socket to `address` and start streaming.
    pub async fn connect_to_device(&self, address: &str) -> Result<String, PluginError> {
        let adapter = self.adapter()?.clone();

        if !adapter.is_enabled().await {
            self.prompt_enable();
            return Err(PluginError::Disabled);
        }

        let device = adapter.remote_device(address).await?;
        let (generation, previous) = self.state.begin_connect(device.clone());
        if let Some(previous) = previous {
            info!("Closing previous connection");
            previous.close().await;
        }

        info!("Connecting to {}", device);
        let socket = match adapter
            .connect_insecure_rfcomm(&device, self.service_uuid)
            .await
        {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Connection to {} failed: {}", device.address, e);
                self.state.connect_failed(generation);
                return Err(e.into());
            }
        };

        let (connection, reading, shutdown) = Connection::new(generation);
        if let Err(superseded) = self.state.set_connected(connection) {
            drop(superseded);
            drop(socket);
            return Err(PluginError::Connection(
                "Connection superseded by a newer request".to_string(),
            ));
        }

        let read_loop = ReadLoop {
            socket,
            reading,
            shutdown,
            buffer_size: self.read_buffer_size,
            channel: self.channel.clone(),
            state: self.state.clone(),
            generation,
        };
        let reader = tokio::spawn(read_loop.run());
        if let Some(orphan) = self.state.set_reader(generation, reader) {
            // Disconnected in between; the loop sees its shutdown and exits.
            drop(orphan);
        }

        info!("Connected to {}", device.address);
        Ok(STATUS_CONNECTED.to_string())
    }

    /// Stop reading, close the socket and forget the device. Idempotent.
    pub async fn disconnect(&self) -> String {
        if let Some(connection) = self.state.disconnect() {
            info!("Disconnecting");
            connection.close().await;
        }
        STATUS_DISCONNECTED.to_string()
    }

    pub fn is_connected(&self) -> ConnectionInfo {
        let is_connected = self.state.is_connected();
        let device_name = if is_connected {
            self.state.get_device().and_then(|device| device.name)
        } else {
            None
        };
        ConnectionInfo {
            is_connected,
            device_name,
        }
    }

    /// Ask the host for Bluetooth permissions.
    ///
    /// `true` if already granted; otherwise a prompt is started and `false`
    /// is returned until `onPermissionResult` arrives.
    pub async fn request_bluetooth_permission(&self) -> Result<bool, PluginError> {
        let activity = self.activity().ok_or(PluginError::NoActivity)?;

        if has_all_permissions(activity.as_ref()).await {
            return Ok(true);
        }

        info!("Requesting Bluetooth permissions");
        activity.request_permissions(&REQUIRED_PERMISSIONS, REQUEST_BLUETOOTH_PERMISSIONS);
        Ok(false)
    }

    /// Permissions are only gated when a host activity is attached.
    async fn has_permissions(&self) -> bool {
        match self.activity() {
            Some(activity) => has_all_permissions(activity.as_ref()).await,
            None => true,
        }
    }

    fn prompt_enable(&self) {
        match self.activity() {
            Some(activity) => activity.start_enable_request(REQUEST_ENABLE_BLUETOOTH),
            None => debug!("No activity attached, cannot prompt for enable"),
        }
    }
}

async fn has_all_permissions(activity: &dyn Activity) -> bool {
    for permission in REQUIRED_PERMISSIONS {
        if !activity.has_permission(permission).await {
            return false;
        }
    }
    true
}

/// Turn a prompt result into a push event. Returns whether it was ours.
fn handle_activity_result(channel: &ChannelSlot, result: ActivityResult) -> bool {
    match result {
        ActivityResult::Permissions {
            request_code: REQUEST_BLUETOOTH_PERMISSIONS,
            grants,
        } => {
            let granted = grants.first().copied().unwrap_or(false);
            info!("Permission result: {}", granted);
            channel.emit(PushEvent::PermissionResult(granted));
            true
        }
        ActivityResult::Activity {
            request_code: REQUEST_ENABLE_BLUETOOTH,
            result_code,
        } => {
            let enabled = result_code == ResultCode::Ok;
            info!("Bluetooth enable result: {}", enabled);
            channel.emit(PushEvent::BluetoothEnabled(enabled));
            true
        }
        other => {
            debug!("Ignoring activity result: {:?}", other);
            false
        }
    }
}

#[cfg(test)]
mod tests;
