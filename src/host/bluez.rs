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

//! Desktop activity backed by BlueZ.
//!
//! On Linux the runtime permissions map to D-Bus access policy: a permission
//! is granted when bluetoothd answers the matching adapter property for us.
//! The enable prompt powers the adapter on.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Activity, Permission, ResultCode, ResultSender};

pub struct BluezActivity {
    adapter: bluer::Adapter,
    results: ResultSender,
}

impl BluezActivity {
    pub fn new(adapter: bluer::Adapter, results: ResultSender) -> Self {
        Self { adapter, results }
    }
}

async fn probe(adapter: &bluer::Adapter, permission: Permission) -> bool {
    let res = match permission {
        Permission::BluetoothConnect => adapter.is_powered().await.map(|_| ()),
        Permission::BluetoothScan => adapter.is_discovering().await.map(|_| ()),
    };
    if let Err(e) = &res {
        warn!("{} not available: {}", permission.as_str(), e);
    }
    res.is_ok()
}

#[async_trait]
impl Activity for BluezActivity {
    async fn has_permission(&self, permission: Permission) -> bool {
        probe(&self.adapter, permission).await
    }

    fn request_permissions(&self, permissions: &[Permission], request_code: i32) {
        let adapter = self.adapter.clone();
        let results = self.results.clone();
        let permissions = permissions.to_vec();

        tokio::spawn(async move {
            let mut grants = Vec::with_capacity(permissions.len());
            for permission in permissions {
                grants.push(probe(&adapter, permission).await);
            }
            results.permissions_result(request_code, grants);
        });
    }

    fn start_enable_request(&self, request_code: i32) {
        let adapter = self.adapter.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            info!("Powering on Bluetooth adapter {}...", adapter.name());
            let result_code = match adapter.set_powered(true).await {
                Ok(()) => ResultCode::Ok,
                Err(e) => {
                    warn!("Failed to power on adapter: {}", e);
                    ResultCode::Canceled
                }
            };
            results.activity_result(request_code, result_code);
        });
    }
}
