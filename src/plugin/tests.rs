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

use super::*;
use crate::bluetooth::{parse_address, BluetoothDevice, BoxedSocket};
use crate::host::{result_channel, ResultSender};
use async_trait::async_trait;
use bluer::Address;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::broadcast;

const SCANNER: &str = "00:11:22:33:44:55";
const PRINTER: &str = "AA:BB:CC:DD:EE:FF";
const UNKNOWN: &str = "12:34:56:78:9A:BC";

struct MockAdapter {
    enabled: AtomicBool,
    bonded: Vec<BluetoothDevice>,
    sockets: Mutex<VecDeque<DuplexStream>>,
    attempts: Mutex<Vec<Address>>,
}

impl MockAdapter {
    fn new(enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(enabled),
            bonded: vec![
                BluetoothDevice::new(parse_address(SCANNER).unwrap(), Some("Scanner".into())),
                BluetoothDevice::new(parse_address(PRINTER).unwrap(), Some("Printer".into())),
            ],
            sockets: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Queue a socket for the next connect; returns the remote end.
    fn queue_socket(&self) -> DuplexStream {
        let (local, remote) = tokio::io::duplex(256);
        self.sockets.lock().push_back(local);
        remote
    }
}

#[async_trait]
impl BluetoothAdapter for MockAdapter {
    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn bonded_devices(&self) -> io::Result<Vec<BluetoothDevice>> {
        Ok(self.bonded.clone())
    }

    async fn remote_device(&self, address: &str) -> Result<BluetoothDevice, PluginError> {
        let address = parse_address(address)?;
        let name = self
            .bonded
            .iter()
            .find(|d| d.address == address)
            .and_then(|d| d.name.clone());
        Ok(BluetoothDevice::new(address, name))
    }

    async fn connect_insecure_rfcomm(
        &self,
        device: &BluetoothDevice,
        uuid: Uuid,
    ) -> io::Result<BoxedSocket> {
        assert_eq!(uuid, crate::bluetooth::SPP_UUID);
        self.attempts.lock().push(device.address);
        match self.sockets.lock().pop_front() {
            Some(socket) => Ok(Box::new(socket)),
            None => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "Host is down")),
        }
    }
}

struct MockActivity {
    granted: AtomicBool,
    prompts: Mutex<Vec<i32>>,
}

impl MockActivity {
    fn new(granted: bool) -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(granted),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<i32> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Activity for MockActivity {
    async fn has_permission(&self, _permission: Permission) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permissions(&self, permissions: &[Permission], request_code: i32) {
        assert_eq!(permissions, &REQUIRED_PERMISSIONS);
        self.prompts.lock().push(request_code);
    }

    fn start_enable_request(&self, request_code: i32) {
        self.prompts.lock().push(request_code);
    }
}

struct Harness {
    plugin: BluetoothPlugin,
    adapter: Arc<MockAdapter>,
    events: broadcast::Receiver<PushEvent>,
}

fn harness(enabled: bool) -> Harness {
    let adapter = MockAdapter::new(enabled);
    let config = BluetoothConfig {
        read_buffer_size: 64,
        ..Default::default()
    };
    let plugin = BluetoothPlugin::new(Some(adapter.clone()), &config);
    let sink = EventSink::new();
    let events = sink.subscribe();
    plugin.on_attached_to_engine(sink);
    Harness {
        plugin,
        adapter,
        events,
    }
}

fn attach_activity(plugin: &BluetoothPlugin, granted: bool) -> (Arc<MockActivity>, ResultSender) {
    let activity = MockActivity::new(granted);
    let (sender, results) = result_channel();
    plugin.on_attached_to_activity(ActivityBinding::new(activity.clone(), results));
    (activity, sender)
}

async fn next_event(events: &mut broadcast::Receiver<PushEvent>) -> PushEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_disconnected(plugin: &BluetoothPlugin) {
    for _ in 0..200 {
        if !plugin.state().is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection was not torn down");
}

fn call(method: &str) -> MethodCall {
    MethodCall::new(1, method)
}

#[tokio::test]
async fn test_is_connected_before_any_connect() {
    let h = harness(true);
    let reply = h.plugin.on_method_call(&call("isConnected")).await;
    assert_eq!(
        reply,
        Reply::Success(json!({"isConnected": false, "deviceName": null}))
    );
}

#[tokio::test]
async fn test_is_bluetooth_enabled() {
    let h = harness(true);
    assert_eq!(
        h.plugin.on_method_call(&call("isBluetoothEnabled")).await,
        Reply::Success(Value::Bool(true))
    );

    h.adapter.enabled.store(false, Ordering::SeqCst);
    assert!(!h.plugin.is_bluetooth_enabled().await);
}

#[tokio::test]
async fn test_without_adapter() {
    let plugin = BluetoothPlugin::new(None, &BluetoothConfig::default());
    assert!(!plugin.is_bluetooth_enabled().await);

    let reply = plugin.on_method_call(&call("scanDevices")).await;
    assert_eq!(reply.error_code(), Some("BLUETOOTH_UNAVAILABLE"));

    let reply = plugin
        .on_method_call(&call("connectToDevice").with_argument("address", SCANNER))
        .await;
    assert_eq!(reply.error_code(), Some("BLUETOOTH_UNAVAILABLE"));
}

#[tokio::test]
async fn test_scan_lists_bonded_devices() {
    let h = harness(true);
    let reply = h.plugin.on_method_call(&call("scanDevices")).await;
    assert_eq!(
        reply,
        Reply::Success(json!([
            "Scanner - 00:11:22:33:44:55",
            "Printer - AA:BB:CC:DD:EE:FF",
        ]))
    );
}

#[tokio::test]
async fn test_scan_while_disabled_is_an_error() {
    let h = harness(false);
    let (activity, _sender) = attach_activity(&h.plugin, true);

    let reply = h.plugin.on_method_call(&call("scanDevices")).await;
    assert_eq!(reply.error_code(), Some("BLUETOOTH_DISABLED"));
    assert_eq!(activity.prompts(), vec![REQUEST_ENABLE_BLUETOOTH]);
}

#[tokio::test]
async fn test_scan_without_permission_prompts() {
    let h = harness(true);
    let (activity, _sender) = attach_activity(&h.plugin, false);

    let err = h.plugin.scan_devices().await.unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
    assert_eq!(activity.prompts(), vec![REQUEST_BLUETOOTH_PERMISSIONS]);
}

#[tokio::test]
async fn test_connect_requires_address() {
    let h = harness(true);

    let reply = h.plugin.on_method_call(&call("connectToDevice")).await;
    assert_eq!(reply.error_code(), Some("INVALID_ARG"));

    let reply = h
        .plugin
        .on_method_call(&call("connectToDevice").with_argument("address", "bogus"))
        .await;
    assert_eq!(reply.error_code(), Some("INVALID_ARG"));
    assert!(h.adapter.attempts.lock().is_empty());
}

#[tokio::test]
async fn test_connect_to_unbonded_device_surfaces_error() {
    let h = harness(true);

    let reply = h
        .plugin
        .on_method_call(&call("connectToDevice").with_argument("address", UNKNOWN))
        .await;

    assert_eq!(reply.error_code(), Some("CONNECTION_ERROR"));
    assert_eq!(
        *h.adapter.attempts.lock(),
        vec![parse_address(UNKNOWN).unwrap()]
    );
    assert_eq!(h.plugin.is_connected().is_connected, false);
}

#[tokio::test]
async fn test_connect_while_disabled() {
    let h = harness(false);
    let err = h.plugin.connect_to_device(SCANNER).await.unwrap_err();
    assert_eq!(err.code(), "BLUETOOTH_DISABLED");
    assert!(h.adapter.attempts.lock().is_empty());
}

#[tokio::test]
async fn test_connect_reports_device_name() {
    let h = harness(true);
    let _remote = h.adapter.queue_socket();

    let reply = h
        .plugin
        .on_method_call(&call("connectToDevice").with_argument("address", SCANNER))
        .await;
    assert_eq!(reply, Reply::Success(json!("Connected")));

    assert_eq!(
        h.plugin.is_connected(),
        ConnectionInfo {
            is_connected: true,
            device_name: Some("Scanner".to_string()),
        }
    );
}

#[tokio::test]
async fn test_each_chunk_is_one_event_in_order() {
    let mut h = harness(true);
    let mut remote = h.adapter.queue_socket();
    h.plugin.connect_to_device(SCANNER).await.unwrap();

    for chunk in ["4006381333931", "\r\n", "привет"] {
        remote.write_all(chunk.as_bytes()).await.unwrap();
        assert_eq!(
            next_event(&mut h.events).await,
            PushEvent::DataReceived(chunk.to_string())
        );
    }
}

#[tokio::test]
async fn test_invalid_utf8_is_decoded_lossily() {
    let mut h = harness(true);
    let mut remote = h.adapter.queue_socket();
    h.plugin.connect_to_device(SCANNER).await.unwrap();

    remote.write_all(&[b'o', b'k', 0xFF]).await.unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::DataReceived("ok\u{FFFD}".to_string())
    );
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let h = harness(true);
    let mut remote = h.adapter.queue_socket();
    h.plugin.connect_to_device(SCANNER).await.unwrap();

    let first = h.plugin.on_method_call(&call("disconnect")).await;
    let second = h.plugin.on_method_call(&call("disconnect")).await;
    assert_eq!(first, Reply::Success(json!("Disconnected")));
    assert_eq!(first, second);

    assert_eq!(
        h.plugin.on_method_call(&call("isConnected")).await,
        Reply::Success(json!({"isConnected": false, "deviceName": null}))
    );

    // The socket was closed: the remote end reads EOF.
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(2), remote.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_disconnect_without_connection() {
    let h = harness(true);
    assert_eq!(h.plugin.disconnect().await, "Disconnected");
    assert_eq!(h.plugin.disconnect().await, "Disconnected");
}

#[tokio::test]
async fn test_remote_close_tears_down() {
    let h = harness(true);
    let remote = h.adapter.queue_socket();
    h.plugin.connect_to_device(SCANNER).await.unwrap();
    assert!(h.plugin.state().is_connected());

    drop(remote);
    wait_disconnected(&h.plugin).await;
    assert!(h.plugin.state().get_device().is_none());
}

#[tokio::test]
async fn test_reconnect_closes_previous_socket() {
    let mut h = harness(true);
    let mut first = h.adapter.queue_socket();
    let mut second = h.adapter.queue_socket();

    h.plugin.connect_to_device(SCANNER).await.unwrap();
    h.plugin.connect_to_device(PRINTER).await.unwrap();

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(2), first.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    // The old loop ending must not tear down the new connection.
    assert_eq!(
        h.plugin.is_connected().device_name.as_deref(),
        Some("Printer")
    );

    second.write_all(b"label").await.unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::DataReceived("label".to_string())
    );
}

#[tokio::test]
async fn test_request_enable_needs_activity() {
    let h = harness(false);
    let reply = h.plugin.on_method_call(&call("requestBluetoothEnable")).await;
    assert_eq!(reply.error_code(), Some("ACTIVITY_ERROR"));
}

#[tokio::test]
async fn test_request_enable_already_enabled() {
    let h = harness(true);
    let (activity, _sender) = attach_activity(&h.plugin, true);
    assert_eq!(h.plugin.request_bluetooth_enable().await.unwrap(), Some(true));
    assert!(activity.prompts().is_empty());
}

#[tokio::test]
async fn test_request_enable_prompts_and_reports() {
    let mut h = harness(false);
    let (activity, sender) = attach_activity(&h.plugin, true);

    let reply = h.plugin.on_method_call(&call("requestBluetoothEnable")).await;
    assert_eq!(reply, Reply::Success(Value::Null));
    assert_eq!(activity.prompts(), vec![REQUEST_ENABLE_BLUETOOTH]);

    sender.activity_result(REQUEST_ENABLE_BLUETOOTH, ResultCode::Ok);
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::BluetoothEnabled(true)
    );

    sender.activity_result(REQUEST_ENABLE_BLUETOOTH, ResultCode::Canceled);
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::BluetoothEnabled(false)
    );
}

#[tokio::test]
async fn test_request_permission() {
    let mut h = harness(true);

    let reply = h
        .plugin
        .on_method_call(&call("requestBluetoothPermission"))
        .await;
    assert_eq!(reply.error_code(), Some("ACTIVITY_ERROR"));

    let (activity, sender) = attach_activity(&h.plugin, false);
    assert_eq!(h.plugin.request_bluetooth_permission().await.unwrap(), false);
    assert_eq!(activity.prompts(), vec![REQUEST_BLUETOOTH_PERMISSIONS]);

    // Unrelated request codes produce no event.
    sender.permissions_result(4242, vec![true]);
    sender.permissions_result(REQUEST_BLUETOOTH_PERMISSIONS, vec![true, true]);
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::PermissionResult(true)
    );

    sender.permissions_result(REQUEST_BLUETOOTH_PERMISSIONS, vec![]);
    assert_eq!(
        next_event(&mut h.events).await,
        PushEvent::PermissionResult(false)
    );

    activity.granted.store(true, Ordering::SeqCst);
    assert_eq!(h.plugin.request_bluetooth_permission().await.unwrap(), true);
}

#[tokio::test]
async fn test_detached_activity() {
    let h = harness(true);
    attach_activity(&h.plugin, true);
    h.plugin.on_detached_from_activity();

    let err = h.plugin.request_bluetooth_permission().await.unwrap_err();
    assert_eq!(err.code(), "ACTIVITY_ERROR");
}

#[tokio::test]
async fn test_unknown_method() {
    let h = harness(true);
    let reply = h.plugin.on_method_call(&call("startDiscovery")).await;
    assert_eq!(reply, Reply::NotImplemented);
}

#[test]
fn test_activity_result_routing() {
    let slot = ChannelSlot::default();
    let sink = EventSink::new();
    let mut rx = sink.subscribe();
    slot.set(Some(sink));

    assert!(handle_activity_result(
        &slot,
        ActivityResult::Permissions {
            request_code: REQUEST_BLUETOOTH_PERMISSIONS,
            grants: vec![false, true],
        }
    ));
    assert_eq!(rx.try_recv().unwrap(), PushEvent::PermissionResult(false));

    assert!(!handle_activity_result(
        &slot,
        ActivityResult::Activity {
            request_code: REQUEST_BLUETOOTH_PERMISSIONS,
            result_code: ResultCode::Ok,
        }
    ));
    assert!(rx.try_recv().is_err());
}
