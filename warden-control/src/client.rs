//! Client for connecting to the control socket

use std::{path::Path, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::{debug, trace};

use crate::{ControlError, Request, RequestCommand, Response, Result};

/// Maximum response size to prevent memory exhaustion from a broken server
/// (10MB is generous enough for large rule or process listings)
const MAX_RESPONSE_SIZE: u32 = 10_000_000;

/// Client for communicating with the warden control server
pub struct ControlClient {
    socket_path: String,
    token: Option<String>,
    timeout: Duration,
}

impl ControlClient {
    /// Create a new control client with the given socket path
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a bearer token to every request
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build and send a command, returning the response
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, the request times out, or
    /// the server returns an error payload
    pub async fn send_command(&self, command: RequestCommand) -> Result<Response> {
        let mut request = Request::new(command);
        if let Some(token) = &self.token {
            request = request.with_token(token.clone());
        }
        self.send_request(request).await
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    /// - Server returns an error
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        // Apply timeout to the entire request/response cycle
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn send_request_internal(&self, request: Request) -> Result<Response> {
        debug!("Connecting to control socket: {}", self.socket_path);
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        // Serialize request
        let request_bytes = bincode::serde::encode_to_vec(&request, bincode::config::legacy())?;
        let request_len = u32::try_from(request_bytes.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        trace!("Sending request: {request_len} bytes");

        // Send length prefix (4 bytes) + request
        stream.write_all(&request_len.to_be_bytes()).await?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        // Read response length prefix
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let response_len = u32::from_be_bytes(len_buf);

        if response_len > MAX_RESPONSE_SIZE {
            return Err(ControlError::ProtocolDeserialization(
                bincode::error::DecodeError::OtherString(format!(
                    "Response too large: {response_len} bytes (max {MAX_RESPONSE_SIZE})"
                )),
            ));
        }

        trace!("Receiving response: {response_len} bytes");

        // Read response
        let mut response_bytes = vec![0u8; response_len as usize];
        stream.read_exact(&mut response_bytes).await?;

        // Deserialize response
        let (response, _): (Response, _) =
            bincode::serde::decode_from_slice(&response_bytes, bincode::config::legacy())?;

        // Validate protocol version
        if !response.is_version_compatible() {
            return Err(ControlError::ServerError(format!(
                "Incompatible protocol version: server={}, client={}",
                response.version,
                crate::PROTOCOL_VERSION
            )));
        }

        // Check for server error
        if let crate::ResponsePayload::Error(ref err) = response.payload {
            if err == &ControlError::Unauthorized.to_string() {
                return Err(ControlError::Unauthorized);
            }
            return Err(ControlError::ServerError(err.clone()));
        }

        Ok(response)
    }

    /// Check if the control server is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the socket doesn't exist
    pub fn check_socket_exists(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);
        if !path.exists() {
            return Err(ControlError::InvalidSocketPath(format!(
                "Socket does not exist: {}",
                self.socket_path
            )));
        }
        Ok(())
    }
}
