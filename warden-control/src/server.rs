//! Control server implementation
//!
//! Listens on an owner-only Unix domain socket. A connection may pipeline
//! several length-prefixed requests; they are answered in arrival order and
//! the connection ends when the client closes its half. Authentication is
//! checked before a request ever reaches the command handler.

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{io, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, info, warn};
use warden_common::Signal;

use crate::{ControlAuthConfig, ControlError, Request, Response, Result};

/// Largest request frame the server will read.
const MAX_REQUEST_SIZE: u32 = 1_000_000;

/// Deadline covering one read-dispatch-write cycle.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Handler trait for processing control requests
///
/// Implement this trait to handle specific command types
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Control server for managing warden via Unix domain socket
pub struct ControlServer {
    socket_path: String,
    auth: ControlAuthConfig,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    /// Create a new control server
    pub fn new(
        socket_path: impl Into<String>,
        auth: ControlAuthConfig,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            auth,
            handler,
        }
    }

    /// Bind the socket, replacing a stale file left behind by a crashed
    /// instance. A socket that still answers means another daemon owns it,
    /// and binding fails rather than stealing the path.
    async fn bind(&self) -> Result<UnixListener> {
        let path = Path::new(&self.socket_path);
        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(ControlError::Io(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("another instance owns {}", self.socket_path),
                )));
            }
            debug!(path = %self.socket_path, "replacing stale control socket");
            tokio::fs::remove_file(path).await?;
        }

        let listener = UnixListener::bind(path)?;

        #[cfg(unix)]
        {
            // rw for the owning user, nothing for anyone else
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!(
            target: "warden::control",
            path = %self.socket_path,
            auth = self.auth.requires_auth(),
            "control socket ready"
        );
        Ok(listener)
    }

    /// Accept connections until shutdown, then remove the socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound; accept failures are
    /// logged and survived.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let listener = self.bind().await?;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let connection = Connection {
                            auth: self.auth.clone(),
                            handler: Arc::clone(&self.handler),
                        };
                        tokio::spawn(async move {
                            if let Err(err) = connection.run(stream).await {
                                debug!(target: "warden::control", %err, "connection ended");
                            }
                        });
                    }
                    Err(err) => warn!(target: "warden::control", %err, "accept failed"),
                },
                _ = shutdown.recv() => {
                    info!(target: "warden::control", "control server shutting down");
                    break;
                }
            }
        }

        if let Err(err) = tokio::fs::remove_file(&self.socket_path).await {
            debug!(target: "warden::control", %err, "socket file cleanup");
        }
        Ok(())
    }
}

/// One client connection: a sequence of request/response frames.
struct Connection {
    auth: ControlAuthConfig,
    handler: Arc<dyn CommandHandler>,
}

impl Connection {
    async fn run(self, mut stream: UnixStream) -> Result<()> {
        loop {
            let request =
                match tokio::time::timeout(REQUEST_DEADLINE, read_frame(&mut stream)).await {
                    Ok(Ok(Some(request))) => request,
                    // Client closed its half between frames.
                    Ok(Ok(None)) => return Ok(()),
                    Ok(Err(err)) => return Err(err),
                    Err(_) => return Err(ControlError::Timeout),
                };

            let response = self.dispatch(request).await;
            tokio::time::timeout(REQUEST_DEADLINE, write_frame(&mut stream, &response))
                .await
                .map_err(|_| ControlError::Timeout)??;
        }
    }

    /// Auth gate, then the handler. Handler failures become error payloads
    /// so the client always gets a frame back.
    async fn dispatch(&self, request: Request) -> Response {
        if !self.auth.validate(request.token.as_deref()) {
            warn!(target: "warden::control", "request rejected: bad or missing token");
            return Response::error(ControlError::Unauthorized.to_string());
        }

        debug!(target: "warden::control", command = ?request.command, "request");
        match self.handler.handle_request(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(target: "warden::control", %err, "command failed");
                Response::error(err.to_string())
            }
        }
    }
}

/// Read one length-prefixed request. `None` means the client closed the
/// connection cleanly before starting another frame.
async fn read_frame(stream: &mut UnixStream) -> Result<Option<Request>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(ControlError::Io(err)),
    }

    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_REQUEST_SIZE {
        return Err(ControlError::ProtocolDeserialization(
            bincode::error::DecodeError::OtherString(format!(
                "refusing {len}-byte request frame"
            )),
        ));
    }

    let mut frame = vec![0u8; len as usize];
    stream.read_exact(&mut frame).await?;

    let (request, _): (Request, _) =
        bincode::serde::decode_from_slice(&frame, bincode::config::legacy())?;
    Ok(Some(request))
}

async fn write_frame(stream: &mut UnixStream, response: &Response) -> Result<()> {
    let frame = bincode::serde::encode_to_vec(response, bincode::config::legacy())?;
    let len = u32::try_from(frame.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}
