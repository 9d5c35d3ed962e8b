use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::handler::{Calculator, CalculatorHandler};

use super::{
    DEFAULT_ADDRESS, ProtocolTransport, Request, ThreadPool, WireEncoding,
    transport::TransportError,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("thread pool strategy requires at least one worker")]
    InvalidWorkerCount,
    #[error("server has already been started")]
    AlreadyStarted,
    #[error("server has not been started")]
    NotStarted,
    #[error("failed to spawn server threads: {0}")]
    Spawn(#[source] io::Error),
    #[error("dispatch loop panicked")]
    DispatchPanicked,
}

/// How the dispatch loop runs accepted connections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ServerStrategy {
    /// Serve one connection at a time on the dispatch thread.
    #[default]
    Simple,
    /// Hand every connection to a pool with the given number of workers.
    ThreadPool(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Running,
    Stopped,
}

/// Live client connections, kept so shutdown can unblock their reads.
#[derive(Debug, Default)]
struct Connections {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl Connections {
    fn streams(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, stream: &TcpStream) -> io::Result<u64> {
        let clone = stream.try_clone()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams().insert(id, clone);
        Ok(id)
    }

    fn remove(&self, id: u64) {
        self.streams().remove(&id);
    }

    fn shutdown_all(&self) {
        for (id, stream) in self.streams().drain() {
            debug!("closing connection {id}");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Stops a running [`CalculatorServer`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    address: SocketAddr,
    signal: Arc<AtomicBool>,
    connections: Arc<Connections>,
}

impl ShutdownHandle {
    /// Signals the dispatch loop to stop, closes live connections and unblocks the
    /// pending accept. Does not wait for the loop to finish.
    pub fn shutdown(&self) {
        if self.signal.swap(true, Ordering::SeqCst) {
            return;
        }

        self.connections.shutdown_all();

        // Wake the blocked accept so the loop observes the signal.
        if let Err(e) = TcpStream::connect(wake_address(self.address)) {
            debug!("wake-up connection to {} failed: {e}", self.address);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }
}

fn wake_address(address: SocketAddr) -> SocketAddr {
    match address.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), address.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), address.port())
        }
        _ => address,
    }
}

/// Calculator service running its dispatch loop on a background thread.
///
/// Built by [`ServerBuilder`], which binds the listening socket. Dropping a running
/// server stops it.
pub struct CalculatorServer {
    address: SocketAddr,
    listener: Option<TcpListener>,
    handler: Arc<dyn Calculator>,
    strategy: ServerStrategy,
    encoding: WireEncoding,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
    state: ServerState,
}

impl CalculatorServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> ServerState {
        match (self.state, &self.thread) {
            (ServerState::Running, Some(thread)) if thread.is_finished() => ServerState::Stopped,
            (state, _) => state,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Spawns the dispatch loop and returns immediately.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.state != ServerState::NotStarted {
            return Err(ServerError::AlreadyStarted);
        }

        let pool = match self.strategy {
            ServerStrategy::Simple => None,
            ServerStrategy::ThreadPool(size) => {
                Some(ThreadPool::new(size).map_err(ServerError::Spawn)?)
            }
        };
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;

        let dispatcher = Dispatcher {
            handler: Arc::clone(&self.handler),
            encoding: self.encoding,
            signal: Arc::clone(&self.shutdown.signal),
            connections: Arc::clone(&self.shutdown.connections),
            pool,
        };

        let spawned = thread::Builder::new()
            .name("calculator-dispatch".to_string())
            .spawn(move || dispatcher.run(listener));

        match spawned {
            Ok(thread) => {
                info!("started calculator service at {}", self.address);
                self.thread = Some(thread);
                self.state = ServerState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = ServerState::Stopped;
                Err(ServerError::Spawn(e))
            }
        }
    }

    /// Blocks until the dispatch loop terminates.
    pub fn join(&mut self) -> Result<(), ServerError> {
        match self.state {
            ServerState::NotStarted => Err(ServerError::NotStarted),
            ServerState::Stopped => Ok(()),
            ServerState::Running => {
                let result = match self.thread.take() {
                    Some(thread) => thread.join().map_err(|_| ServerError::DispatchPanicked),
                    None => Ok(()),
                };
                self.state = ServerState::Stopped;
                result
            }
        }
    }

    /// Starts the server and blocks until it stops.
    pub fn serve(&mut self) -> Result<(), ServerError> {
        self.start()?;
        self.join()
    }

    /// Stops the dispatch loop and waits for it to finish.
    ///
    /// Does nothing unless the server is running. A loop that died abnormally is
    /// logged, not reported.
    pub fn stop(&mut self) {
        if self.state != ServerState::Running {
            return;
        }

        info!("stopping calculator service at {}", self.address);
        self.shutdown.shutdown();

        if let Err(e) = self.join() {
            warn!("calculator service stopped abnormally: {e}");
        }
    }
}

impl Drop for CalculatorServer {
    fn drop(&mut self) {
        self.stop();
    }
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_millis(500);

/// Pause before the next accept after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    (ACCEPT_BACKOFF_MIN * (1 << exponent)).min(ACCEPT_BACKOFF_MAX)
}

struct Dispatcher {
    handler: Arc<dyn Calculator>,
    encoding: WireEncoding,
    signal: Arc<AtomicBool>,
    connections: Arc<Connections>,
    pool: Option<ThreadPool>,
}

impl Dispatcher {
    fn run(self, listener: TcpListener) {
        let mut failures = 0;

        for stream in listener.incoming() {
            if self.signal.load(Ordering::SeqCst) {
                break;
            }

            let stream = match stream {
                Ok(stream) => {
                    failures = 0;
                    stream
                }
                Err(e) => {
                    // Errors such as EMFILE persist until a descriptor frees up.
                    failures += 1;
                    let pause = accept_backoff(failures);
                    warn!("broken connection: {e:?}; retrying in {pause:?}");
                    thread::sleep(pause);
                    continue;
                }
            };

            let id = match self.connections.register(&stream) {
                Ok(id) => id,
                Err(e) => {
                    warn!("failed to track connection, dropping it: {e}");
                    continue;
                }
            };

            // A shutdown may have drained the registry before this connection landed in it.
            if self.signal.load(Ordering::SeqCst) {
                break;
            }

            let session = Session {
                id,
                handler: Arc::clone(&self.handler),
                encoding: self.encoding,
                connections: Arc::clone(&self.connections),
            };

            match &self.pool {
                Some(pool) => pool.execute(move || session.run(stream)),
                None => session.run(stream),
            }
        }

        self.connections.shutdown_all();
        // Dropping the pool joins its workers.
        drop(self.pool);
        info!("dispatch loop stopped");
    }
}

struct Session {
    id: u64,
    handler: Arc<dyn Calculator>,
    encoding: WireEncoding,
    connections: Arc<Connections>,
}

impl Session {
    fn run(self, stream: TcpStream) {
        match stream.peer_addr() {
            Ok(peer) => debug!("connection {} from {peer}", self.id),
            Err(_) => debug!("connection {} from unknown peer", self.id),
        }

        match handle_connection(stream, self.handler.as_ref(), self.encoding) {
            Ok(()) => debug!("connection {} closed by client", self.id),
            Err(e) if e.is_disconnect() => debug!("connection {} dropped: {e}", self.id),
            Err(e) => warn!("connection {} failed: {e}", self.id),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Runs on unwind too, so a panicking handler cannot leave the socket open.
        self.connections.remove(self.id);
    }
}

fn handle_connection(
    stream: TcpStream,
    handler: &dyn Calculator,
    encoding: WireEncoding,
) -> Result<(), TransportError> {
    let mut transport = ProtocolTransport::new(stream, encoding);

    loop {
        let req = transport.read_request()?;
        trace!("received request: {req:?}");

        let resp = req.evaluate(handler);
        transport.write_response(resp)?;

        if req == Request::CloseConnection {
            return Ok(());
        }
    }
}

/// Configures and binds a [`CalculatorServer`].
pub struct ServerBuilder {
    address: SocketAddr,
    listener: Option<TcpListener>,
    handler: Arc<dyn Calculator>,
    strategy: ServerStrategy,
    encoding: WireEncoding,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            listener: None,
            handler: Arc::new(CalculatorHandler),
            strategy: ServerStrategy::default(),
            encoding: WireEncoding::default(),
        }
    }
}

impl ServerBuilder {
    /// Address to bind; ignored when a listener is supplied.
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Serves on an already bound listener instead of binding a new one.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_handler<H: Calculator + 'static>(self, handler: H) -> Self {
        self.with_shared_handler(Arc::new(handler))
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn Calculator>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_strategy(mut self, strategy: ServerStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_encoding(mut self, encoding: WireEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn build(self) -> Result<CalculatorServer, ServerError> {
        if self.strategy == ServerStrategy::ThreadPool(0) {
            return Err(ServerError::InvalidWorkerCount);
        }

        let configured = self.address;
        let bind_error = |source| ServerError::Bind {
            address: configured,
            source,
        };

        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(configured).map_err(bind_error)?,
        };
        let address = listener.local_addr().map_err(bind_error)?;
        debug!("bound calculator service to {address}");

        Ok(CalculatorServer {
            address,
            listener: Some(listener),
            handler: self.handler,
            strategy: self.strategy,
            encoding: self.encoding,
            shutdown: ShutdownHandle {
                address,
                signal: Arc::new(AtomicBool::new(false)),
                connections: Arc::new(Connections::default()),
            },
            thread: None,
            state: ServerState::NotStarted,
        })
    }
}
