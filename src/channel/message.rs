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

//! Method channel message definitions and serialization.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;

/// A method call from the application shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    /// Correlation id echoed in the reply.
    pub id: u64,

    /// Method name, e.g. `connectToDevice`.
    pub method: String,

    /// Named arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into(),
            arguments: Value::Null,
        }
    }

    /// Attach an argument.
    pub fn with_argument(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.arguments.is_object() {
            self.arguments = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut self.arguments {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Typed argument lookup. `None` if absent or of the wrong type.
    pub fn argument<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.arguments.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json.trim())?)
    }

    /// Parse a raw request line; bytes that are not UTF-8 are a parse error.
    pub fn from_slice(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }
}

/// Outcome of a method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    NotImplemented,
}

impl Reply {
    pub fn success(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Error {
                code: "SERIALIZATION_ERROR".to_string(),
                message: e.to_string(),
                details: None,
            },
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, PluginError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => e.into(),
        }
    }

    /// Error code, if this is an error reply.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<PluginError> for Reply {
    fn from(e: PluginError) -> Self {
        Self::Error {
            code: e.code().to_string(),
            message: e.to_string(),
            details: None,
        }
    }
}

/// Push event sent to the shell outside the request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Answer to the permission prompt.
    PermissionResult(bool),
    /// Answer to the enable prompt.
    BluetoothEnabled(bool),
    /// One chunk read from the open socket.
    DataReceived(String),
}

impl PushEvent {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::PermissionResult(_) => "onPermissionResult",
            Self::BluetoothEnabled(_) => "onBluetoothEnabled",
            Self::DataReceived(_) => "onDataReceived",
        }
    }

    pub fn arguments(&self) -> Value {
        match self {
            Self::PermissionResult(granted) => Value::Bool(*granted),
            Self::BluetoothEnabled(enabled) => Value::Bool(*enabled),
            Self::DataReceived(data) => Value::String(data.clone()),
        }
    }
}

/// Everything written to a client, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outgoing {
    Success {
        id: u64,
        result: Value,
    },
    Error {
        id: u64,
        code: String,
        message: String,
        details: Option<Value>,
    },
    NotImplemented {
        id: u64,
    },
    Event {
        method: String,
        arguments: Value,
    },
}

impl Outgoing {
    /// Wrap a reply for call `id`.
    pub fn reply(id: u64, reply: Reply) -> Self {
        match reply {
            Reply::Success(result) => Self::Success { id, result },
            Reply::Error {
                code,
                message,
                details,
            } => Self::Error {
                id,
                code,
                message,
                details,
            },
            Reply::NotImplemented => Self::NotImplemented { id },
        }
    }

    /// Serialize to JSON string with newline delimiter.
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }

    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json.trim())?)
    }
}

impl From<PushEvent> for Outgoing {
    fn from(event: PushEvent) -> Self {
        Self::Event {
            method: event.method_name().to_string(),
            arguments: event.arguments(),
        }
    }
}
