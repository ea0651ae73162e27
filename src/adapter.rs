//! Administrative object adapter
//!
//! Binds the endpoint named in the configuration and, once activated,
//! dispatches administrative requests. Binding and activation are separate
//! steps so that no request can be dispatched before the container has
//! started its services.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::communicator::Communicator;
use crate::protocol::{ProtocolError, Request, Response, MAX_FRAME_LEN};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("object adapter '{adapter}': property '{property}' is not set")]
    NoEndpoints { adapter: String, property: String },

    #[error("invalid endpoint '{0}', expected 'tcp [-h <host>] [-p <port>]' or '<host>:<port>'")]
    InvalidEndpoint(String),

    #[error("unable to bind '{endpoint}': {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },
}

pub struct ObjectAdapter {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ObjectAdapter {
    /// Bind the endpoint. Nothing is accepted until [`activate`](Self::activate).
    pub(crate) async fn bind(name: &str, endpoints: &str) -> Result<Self, AdapterError> {
        let (host, port) = parse_endpoint(endpoints)?;
        let bind_error = |source| AdapterError::Bind {
            endpoint: endpoints.to_string(),
            source,
        };
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self {
            name: name.to_string(),
            listener,
            local_addr,
        })
    }

    /// Address the adapter actually bound. Differs from the configured
    /// endpoint when the port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Begin dispatching requests. Consumes the adapter; the accept loop
    /// runs until the process exits.
    pub fn activate(self, communicator: Arc<Communicator>) {
        log::info!(
            "object adapter '{}' listening on {}",
            self.name,
            self.local_addr
        );
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, peer)) => {
                        let communicator = Arc::clone(&communicator);
                        tokio::spawn(handle_connection(stream, peer, communicator));
                    }
                    Err(e) => {
                        log::error!("accept error: {}", e);
                    }
                }
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, communicator: Arc<Communicator>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            log::error!("admin read error from {}: {}", peer, e);
            let _ = write_response(&mut stream, &Response::Error("invalid request".into())).await;
            return;
        }
    };

    log::info!("admin request {:?} from {}", request, peer);
    let response = match request {
        Request::Shutdown => {
            communicator.shutdown();
            Response::Ok
        }
    };

    if let Err(e) = write_response(&mut stream, &response).await {
        log::error!("admin write error to {}: {}", peer, e);
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<Request, ProtocolError> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(rmp_serde::from_slice(&body)?)
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec(response)?;
    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

/// Parse an endpoint spec: Ice-style `tcp [-h <host>] [-p <port>]` or plain
/// `<host>:<port>`. The host defaults to 127.0.0.1.
pub fn parse_endpoint(spec: &str) -> Result<(String, u16), AdapterError> {
    let invalid = || AdapterError::InvalidEndpoint(spec.to_string());

    let tokens: Vec<&str> = spec.split_whitespace().collect();
    match tokens.as_slice() {
        ["tcp", rest @ ..] => {
            let mut host = "127.0.0.1".to_string();
            let mut port = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i] {
                    "-h" => {
                        host = rest.get(i + 1).ok_or_else(invalid)?.to_string();
                        i += 2;
                    }
                    "-p" => {
                        let value = rest.get(i + 1).ok_or_else(invalid)?;
                        port = Some(value.parse().map_err(|_| invalid())?);
                        i += 2;
                    }
                    _ => return Err(invalid()),
                }
            }
            Ok((host, port.ok_or_else(invalid)?))
        }
        [addr] => {
            let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), port.parse().map_err(|_| invalid())?))
        }
        _ => Err(invalid()),
    }
}
