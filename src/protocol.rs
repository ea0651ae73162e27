//! Administrative wire protocol
//!
//! Request/response types exchanged between the container's administrative
//! adapter and remote clients. Messages are MessagePack payloads framed by a
//! u32 big-endian length.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

/// Frames larger than this are rejected as garbage.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Request to the `ServiceManager` administrative object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Trigger orderly shutdown of the whole container. Idempotent.
    Shutdown,
}

/// Response from the `ServiceManager` administrative object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Success with no data
    Ok,
    /// Error with message
    Error(String),
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec(value)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: serde::de::DeserializeOwned>(
    reader: &mut R,
) -> Result<T, ProtocolError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(rmp_serde::from_slice(&body)?)
}

/// Connect to the administrative endpoint, send one request, read the reply.
pub fn call(addr: &str, request: &Request) -> Result<Response, ProtocolError> {
    let mut stream = std::net::TcpStream::connect(addr)?;
    write_frame(&mut stream, request)?;
    read_frame(&mut stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let encoded = rmp_serde::to_vec(&Request::Shutdown).unwrap();
        let decoded: Request = rmp_serde::from_slice(&encoded).unwrap();
        assert!(matches!(decoded, Request::Shutdown));
    }

    #[test]
    fn response_roundtrip() {
        let responses = vec![Response::Ok, Response::Error("test error".into())];
        for resp in responses {
            let encoded = rmp_serde::to_vec(&resp).unwrap();
            let decoded: Response = rmp_serde::from_slice(&encoded).unwrap();
            assert_eq!(format!("{:?}", resp), format!("{:?}", decoded));
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &Request::Shutdown).unwrap();

        let mut cursor = std::io::Cursor::new(buffer);
        let decoded: Request = read_frame(&mut cursor).unwrap();
        assert!(matches!(decoded, Request::Shutdown));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buffer);
        let result: Result<Request, _> = read_frame(&mut cursor);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
    }
}
