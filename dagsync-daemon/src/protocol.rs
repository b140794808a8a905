//! Control socket protocol: one JSON object per line in each direction.
//!
//! Requests are `{"cmd":"status"}`, `{"cmd":"pull"}` or `{"cmd":"stop"}`.
//! Every request gets exactly one [`DaemonResponse`] line back.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dagsync_core::paths::socket_path_at;

use crate::error::{io_err, DaemonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum DaemonRequest {
    /// Daemon runtime info plus the overall sync status.
    Status,
    /// Pull now, outside the auto-sync schedule.
    Pull,
    /// Shut down after replying.
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(DaemonError::Protocol(
            self.error.unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

/// Send `request` to the daemon under `home` and wait for its reply.
pub fn call(home: &Path, request: DaemonRequest) -> Result<Value, DaemonError> {
    let socket = socket_path_at(home);
    let mut stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => DaemonError::DaemonNotRunning {
            socket: socket.clone(),
        },
        _ => io_err(&socket, err),
    })?;

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .map_err(|e| io_err(&socket, e))?;

    let mut reply = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    serde_json::from_str::<DaemonResponse>(reply.trim_end())?.into_data()
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::Status)
}

/// Serialized `SyncResult` of the pull.
pub fn request_pull(home: &Path) -> Result<Value, DaemonError> {
    call(home, DaemonRequest::Pull)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    call(home, DaemonRequest::Stop).map(|_| ())
}
