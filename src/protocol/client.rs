use std::{
    io,
    net::{Shutdown, SocketAddr, TcpStream},
};

use log::{debug, trace};
use thiserror::Error;

use super::{DEFAULT_ADDRESS, ProtocolTransport, Request, Response, TransportError, WireEncoding};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {source}")]
    Connection {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("call failed: {0}")]
    Transport(#[from] TransportError),
    #[error("unexpected response from server: {0:?}")]
    UnexpectedResponse(Response),
    #[error("connection already closed")]
    Closed,
}

/// Synchronous calculator client owning a single connection.
///
/// Every call blocks until the server answers. The connection is released by
/// [`close`](CalculatorClient::close) or when the client is dropped, whichever comes
/// first.
///
/// ```no_run
/// use calculator::protocol::CalculatorClient;
///
/// let mut client = CalculatorClient::builder().build()?;
/// assert_eq!(client.add(1, 2)?, 3);
/// # Ok::<(), calculator::protocol::ClientError>(())
/// ```
#[derive(Debug)]
pub struct CalculatorClient {
    address: SocketAddr,
    transport: Option<ProtocolTransport<TcpStream>>,
}

impl CalculatorClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    pub fn add(&mut self, first: i32, second: i32) -> Result<i32, ClientError> {
        self.call(Request::Add { first, second })
    }

    pub fn subtract(&mut self, minuend: i32, subtrahend: i32) -> Result<i32, ClientError> {
        self.call(Request::Subtract {
            minuend,
            subtrahend,
        })
    }

    pub fn multiply(&mut self, first: i32, second: i32) -> Result<i32, ClientError> {
        self.call(Request::Multiply { first, second })
    }

    /// Fails with [`ClientError::DivisionByZero`] when `divisor` is zero.
    pub fn divide(&mut self, dividend: i32, divisor: i32) -> Result<i32, ClientError> {
        self.call(Request::Divide { dividend, divisor })
    }

    /// Closes the connection. Calling it again does nothing.
    pub fn close(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        debug!("closing connection to {}", self.address);

        // The server acknowledges, but nobody waits for it.
        if let Err(e) = transport.write_request(Request::CloseConnection) {
            debug!("failed to announce close to {}: {e}", self.address);
        }
        if let Err(e) = transport.get_ref().shutdown(Shutdown::Both) {
            debug!("failed to shut down connection to {}: {e}", self.address);
        }
    }

    fn call(&mut self, req: Request) -> Result<i32, ClientError> {
        let transport = self.transport.as_mut().ok_or(ClientError::Closed)?;

        trace!("sending request: {req:?}");
        transport.write_request(req)?;

        match transport.read_response()? {
            Response::Value(value) => Ok(value),
            Response::DivisionByZero => Err(ClientError::DivisionByZero),
            resp => Err(ClientError::UnexpectedResponse(resp)),
        }
    }
}

impl Drop for CalculatorClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Configures and connects a [`CalculatorClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    address: SocketAddr,
    stream: Option<TcpStream>,
    encoding: WireEncoding,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            stream: None,
            encoding: WireEncoding::default(),
        }
    }
}

impl ClientBuilder {
    /// Server address to connect to; ignored when a stream is supplied.
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Uses an already connected stream. The client takes ownership and closes it.
    pub fn with_stream(mut self, stream: TcpStream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_encoding(mut self, encoding: WireEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn build(self) -> Result<CalculatorClient, ClientError> {
        let configured = self.address;
        let connection_error = |source| ClientError::Connection {
            address: configured,
            source,
        };

        let stream = match self.stream {
            Some(stream) => stream,
            None => TcpStream::connect(configured).map_err(connection_error)?,
        };
        let address = stream.peer_addr().map_err(connection_error)?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to disable Nagle's algorithm: {e}");
        }
        debug!("connected to calculator service at {address}");

        Ok(CalculatorClient {
            address,
            transport: Some(ProtocolTransport::new(stream, self.encoding)),
        })
    }
}
