//! # stowage-ipc
//!
//! Wire protocol between store clients and the stowage service.
//!
//! Messages travel over a Unix domain socket as bincode payloads with a
//! little-endian u32 length prefix. Both sides enforce [`MAX_IPC_SIZE`]
//! before allocating.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted frame in either direction.
pub const MAX_IPC_SIZE: usize = 16 * 1024 * 1024; // 16 MiB frame cap

/// Default rendezvous point for the system service.
pub fn default_socket_path() -> &'static str {
    "/run/stowage/service.sock"
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("frame of {size} bytes exceeds the {MAX_IPC_SIZE} byte limit")]
    FrameTooLarge { size: usize },

    #[error("unexpected response from service")]
    UnexpectedResponse,
}

pub type Result<T> = std::result::Result<T, IpcError>;

/// Client-to-service messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness and version check.
    Ping,
    /// Verify `source` against `digest_id` and store it.
    AddDirectory { source: PathBuf, digest_id: String },
    /// Remove a stored implementation.
    Remove { digest_id: String },
}

/// Service-to-client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Pong { version: String },
    /// The implementation now lives at `path`.
    Added { path: PathBuf },
    Removed,
    Error { kind: ErrorKind, message: String },
}

/// Store failures in a form that survives the wire, so clients can
/// rebuild a typed error instead of a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorKind {
    NoKnownDigest,
    UnknownFormat {
        prefix: String,
    },
    Malformed {
        line: usize,
        reason: String,
    },
    InvalidNode {
        reason: String,
    },
    UnsupportedEntryType {
        path: PathBuf,
    },
    AlreadyInStore {
        digest: String,
    },
    NotFound {
        digest: String,
    },
    DigestMismatch {
        expected: String,
        actual: String,
        manifest: String,
    },
    TimeAccuracy {
        path: PathBuf,
        wanted: i64,
        got: i64,
    },
    Unauthorized,
    Other,
}

/// Write one length-prefixed frame.
pub fn write_frame<T: Serialize>(writer: &mut impl Write, message: &T) -> Result<()> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_IPC_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: payload.len(),
        });
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
pub fn read_frame<T: for<'de> Deserialize<'de>>(reader: &mut impl Read) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_IPC_SIZE {
        return Err(IpcError::FrameTooLarge { size: len });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

pub mod client {
    use std::os::unix::net::UnixStream;
    use std::path::Path;

    use crate::{read_frame, write_frame, IpcError, Request, Response, Result};

    /// Blocking client for the service socket.
    pub struct ServiceClient {
        stream: UnixStream,
    }

    impl ServiceClient {
        pub fn connect(socket_path: &Path) -> Result<Self> {
            let stream = UnixStream::connect(socket_path)?;
            Ok(ServiceClient { stream })
        }

        /// Send one request and wait for the response.
        pub fn request(&mut self, request: &Request) -> Result<Response> {
            write_frame(&mut self.stream, request)?;
            read_frame(&mut self.stream)
        }

        /// Round-trip a [`Request::Ping`], returning the service version.
        pub fn ping(&mut self) -> Result<String> {
            match self.request(&Request::Ping)? {
                Response::Pong { version } => Ok(version),
                _ => Err(IpcError::UnexpectedResponse),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let requests = [
            Request::Ping,
            Request::AddDirectory {
                source: PathBuf::from("/tmp/stage"),
                digest_id: "sha256=abc".to_string(),
            },
            Request::Remove {
                digest_id: "sha1new=def".to_string(),
            },
        ];
        for request in &requests {
            let bytes = bincode::serialize(request).unwrap();
            let parsed: Request = bincode::deserialize(&bytes).unwrap();
            assert_eq!(&parsed, request);
        }
    }

    #[test]
    fn test_response_serialization() {
        let responses = [
            Response::Pong {
                version: "0.1.0".to_string(),
            },
            Response::Added {
                path: PathBuf::from("/var/cache/stowage/implementations/sha256=abc"),
            },
            Response::Removed,
            Response::Error {
                kind: ErrorKind::DigestMismatch {
                    expected: "sha256=abc".to_string(),
                    actual: "sha256=def".to_string(),
                    manifest: "D /sub\n".to_string(),
                },
                message: "digests do not match".to_string(),
            },
        ];
        for response in &responses {
            let bytes = bincode::serialize(response).unwrap();
            let parsed: Response = bincode::deserialize(&bytes).unwrap();
            assert_eq!(&parsed, response);
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(
            &mut buf,
            &Request::Remove {
                digest_id: "sha256=abc".to_string(),
            },
        )
        .unwrap();
        // 4-byte length prefix plus payload
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize, buf.len() - 4);

        let parsed: Request = read_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(
            parsed,
            Request::Remove {
                digest_id: "sha256=abc".to_string(),
            }
        );
    }

    #[test]
    fn test_oversized_frame_rejected_on_read() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&((MAX_IPC_SIZE + 1) as u32).to_le_bytes());
        frame.extend_from_slice(&[0u8; 16]);

        let err = read_frame::<Request>(&mut frame.as_slice()).unwrap_err();
        assert!(matches!(err, IpcError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&100u32.to_le_bytes());
        frame.extend_from_slice(&[0u8; 10]);

        let err = read_frame::<Request>(&mut frame.as_slice()).unwrap_err();
        assert!(matches!(err, IpcError::Io(_)));
    }

    #[test]
    fn test_default_socket_path() {
        assert!(default_socket_path().starts_with('/'));
    }
}
