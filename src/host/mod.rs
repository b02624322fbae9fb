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

//! Host activity: the surface that shows enable and permission prompts.
//!
//! Prompts complete out of band. An [`Activity`] reports the outcome through a
//! [`ResultSender`], and the plugin turns it into a push event.

mod bluez;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub use bluez::BluezActivity;

/// Request code used for the permission prompt.
pub const REQUEST_BLUETOOTH_PERMISSIONS: i32 = 1001;

/// Request code used for the enable prompt.
pub const REQUEST_ENABLE_BLUETOOTH: i32 = 1002;

/// Runtime permissions the bridge depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    BluetoothConnect,
    BluetoothScan,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BluetoothConnect => "BLUETOOTH_CONNECT",
            Self::BluetoothScan => "BLUETOOTH_SCAN",
        }
    }
}

/// Outcome of an activity started for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    Canceled,
}

/// Result delivered back from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityResult {
    /// Answer to `request_permissions`, one grant per requested permission.
    Permissions { request_code: i32, grants: Vec<bool> },
    /// Answer to an activity started for a result.
    Activity {
        request_code: i32,
        result_code: ResultCode,
    },
}

/// Host surface able to check permissions and run prompts.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Whether `permission` is currently granted.
    async fn has_permission(&self, permission: Permission) -> bool;

    /// Start a permission prompt. The answer arrives as
    /// [`ActivityResult::Permissions`] with `request_code`.
    fn request_permissions(&self, permissions: &[Permission], request_code: i32);

    /// Start the "turn Bluetooth on" prompt. The answer arrives as
    /// [`ActivityResult::Activity`] with `request_code`.
    fn start_enable_request(&self, request_code: i32);
}

/// Sending half of the result queue, owned by the activity.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: async_channel::Sender<ActivityResult>,
}

impl ResultSender {
    pub fn permissions_result(&self, request_code: i32, grants: Vec<bool>) {
        self.send(ActivityResult::Permissions {
            request_code,
            grants,
        });
    }

    pub fn activity_result(&self, request_code: i32, result_code: ResultCode) {
        self.send(ActivityResult::Activity {
            request_code,
            result_code,
        });
    }

    fn send(&self, result: ActivityResult) {
        if self.tx.try_send(result).is_err() {
            debug!("Activity result dropped, no binding listening");
        }
    }
}

/// Create the result queue shared by an activity and its binding.
pub fn result_channel() -> (ResultSender, async_channel::Receiver<ActivityResult>) {
    let (tx, rx) = async_channel::unbounded();
    (ResultSender { tx }, rx)
}

/// An attached activity plus the results it produces.
#[derive(Clone)]
pub struct ActivityBinding {
    activity: Arc<dyn Activity>,
    results: async_channel::Receiver<ActivityResult>,
}

impl ActivityBinding {
    pub fn new(
        activity: Arc<dyn Activity>,
        results: async_channel::Receiver<ActivityResult>,
    ) -> Self {
        Self { activity, results }
    }

    pub fn activity(&self) -> &Arc<dyn Activity> {
        &self.activity
    }

    pub fn results(&self) -> async_channel::Receiver<ActivityResult> {
        self.results.clone()
    }
}
