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

//! Bluetooth Classic access.
//!
//! Bonded device enumeration and RFCOMM client sockets on top of BlueZ.

mod adapter;
mod bluez;
mod socket;

use uuid::Uuid;

pub use adapter::{parse_address, BluetoothAdapter, BluetoothDevice, BoxedSocket, SerialSocket};
pub use bluez::BluezAdapter;
pub use socket::ProfileStream;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);
