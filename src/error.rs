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

//! Errors reported back over the method channel.

use thiserror::Error;

/// Error surfaced to the caller as an `error` reply.
///
/// Every variant maps to a short string code the application shell matches on.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required argument is missing or malformed.
    #[error("{0}")]
    InvalidArgument(String),

    /// No Bluetooth adapter is present.
    #[error("Bluetooth is not supported on this device")]
    Unavailable,

    /// The adapter exists but is powered off.
    #[error("Bluetooth is disabled")]
    Disabled,

    /// Bluetooth permissions have not been granted.
    #[error("Bluetooth permissions not granted")]
    PermissionDenied,

    /// No host activity is attached to show prompts.
    #[error("Activity not found")]
    NoActivity,

    /// Opening the RFCOMM socket failed.
    #[error("Connection error: {0}")]
    Connection(String),
}

impl PluginError {
    /// String code sent on the channel.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARG",
            Self::Unavailable => "BLUETOOTH_UNAVAILABLE",
            Self::Disabled => "BLUETOOTH_DISABLED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NoActivity => "ACTIVITY_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(PluginError::InvalidArgument("x".into()).code(), "INVALID_ARG");
        assert_eq!(PluginError::Unavailable.code(), "BLUETOOTH_UNAVAILABLE");
        assert_eq!(PluginError::NoActivity.code(), "ACTIVITY_ERROR");
        assert_eq!(PluginError::Connection("x".into()).code(), "CONNECTION_ERROR");
    }

    #[test]
    fn test_io_error_becomes_connection_error() {
        let err: PluginError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "host is down").into();
        assert_eq!(err.code(), "CONNECTION_ERROR");
        assert_eq!(err.to_string(), "Connection error: host is down");
    }
}
