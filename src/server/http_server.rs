use may::coroutine::JoinHandle;
use may::net::{TcpListener, TcpStream};
use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::connection::{self, ConnectionOutcome};
use super::response;
use crate::config::ServerConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::ids::ConnectionId;
use crate::worker_pool::{SubmitError, WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};

/// Raw-socket HTTP/1.1 server: one request per connection, served on a
/// pool of worker coroutines.
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

/// Handle to a running HTTP server
///
/// Provides methods for waiting until the server is ready, stopping it,
/// or joining the accept loop.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<io::Result<()>>,
    shutdown: Arc<AtomicBool>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl ServerHandle {
    /// Address the listener is bound to (with the real port when bound to port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// Polls the server address by attempting TCP connections until successful.
    /// The probe connections send nothing and are closed without a response.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if std::net::TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Pool counters for this server.
    #[must_use]
    pub fn metrics(&self) -> Arc<WorkerPoolMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Stop accepting and close the listener.
    ///
    /// Connections already picked up by a worker run to completion; queued
    /// connections are closed unserved.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        // SAFETY: may::CoroutineHandle::coroutine().cancel() is marked unsafe by the may runtime.
        // The handle is valid (we own it), and cancellation is the intended way to
        // unblock the accept loop during shutdown.
        unsafe {
            self.handle.coroutine().cancel();
        }
        // cancellation surfaces as a panic in the joined coroutine
        let _ = self.handle.join();
        info!(addr = %self.addr, "Server stopped");
    }

    /// Block until the accept loop ends.
    ///
    /// # Errors
    ///
    /// Returns the listener error that ended the loop, or an error if the
    /// accept coroutine panicked.
    pub fn join(self) -> io::Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) if self.shutdown.load(Ordering::Acquire) => Ok(()),
            Err(_) => Err(io::Error::other("accept loop panicked")),
        }
    }
}

impl HttpServer {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            config: config.normalized(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the HTTP server on the given address
    ///
    /// Binds the listener before returning, so the port is accepting once
    /// this succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the port cannot be bound or
    /// the coroutines cannot be spawned.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;

        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let pool = WorkerPool::new(
            "rawroute",
            WorkerPoolConfig::from(&self.config),
            move |(stream, peer, id): (TcpStream, SocketAddr, ConnectionId)| {
                let outcome = connection::serve(stream, &dispatcher, &config, id);
                log_outcome(id, peer, &outcome);
            },
        )?;
        let metrics = pool.metrics();
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&shutdown);
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The accept loop owns the listener and the pool; nothing borrowed crosses into it.
        let handle = unsafe {
            may::coroutine::Builder::new()
                .name("rawroute-acceptor".to_string())
                .spawn(move || accept_loop(listener, pool, flag))?
        };

        info!(
            addr = %addr,
            workers = self.config.workers,
            queue_mode = ?self.config.queue_mode,
            header_limit = self.config.header_limit,
            body_limit = self.config.body_limit,
            routes = self.dispatcher.router().len(),
            "Server listening"
        );
        self.dispatcher.router().log_routes();

        Ok(ServerHandle {
            addr,
            handle,
            shutdown,
            metrics,
        })
    }

    /// Start the server and block until its accept loop ends.
    ///
    /// The loop only ends when the listener fails, so this never returns for a
    /// healthy server. To shut down, use [`HttpServer::start`] and
    /// [`ServerHandle::stop`], or [`HttpServer::listen_until`].
    ///
    /// # Errors
    ///
    /// Same as [`HttpServer::start`] and [`ServerHandle::join`].
    pub fn listen<A: ToSocketAddrs>(self, addr: A) -> io::Result<()> {
        self.start(addr)?.join()
    }

    /// Start the server, run `until` with the bound address, then stop.
    ///
    /// `until` blocks for as long as the server should run; the listener is
    /// closed as soon as it returns.
    ///
    /// ```no_run
    /// # use rawroute::{config::ServerConfig, dispatcher::Dispatcher, router::Router, server::HttpServer};
    /// let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    /// # drop(stop_tx);
    /// HttpServer::new(Dispatcher::new(Router::new()), ServerConfig::default())
    ///     .listen_until("127.0.0.1:8080", |_addr| {
    ///         let _ = stop_rx.recv();
    ///     })?;
    /// # Ok::<(), std::io::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`HttpServer::start`].
    pub fn listen_until<A, F>(self, addr: A, until: F) -> io::Result<()>
    where
        A: ToSocketAddrs,
        F: FnOnce(SocketAddr),
    {
        let handle = self.start(addr)?;
        until(handle.local_addr());
        handle.stop();
        Ok(())
    }
}

fn accept_loop(
    listener: TcpListener,
    pool: WorkerPool<(TcpStream, SocketAddr, ConnectionId)>,
    shutdown: Arc<AtomicBool>,
) -> io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(_) if shutdown.load(Ordering::Acquire) => {
                debug!("Accept loop exiting after shutdown");
                return Ok(());
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::Interrupted
                ) =>
            {
                warn!(error = %e, "Accept failed for one connection; continuing");
                continue;
            }
            Err(e) => {
                error!(error = %e, "Listener failed; accept loop exiting");
                return Err(e);
            }
        };

        if shutdown.load(Ordering::Acquire) {
            return Ok(());
        }

        let id = ConnectionId::new();
        debug!(connection_id = %id, peer = %peer, "Connection accepted");

        match pool.submit((stream, peer, id)) {
            Ok(()) => {}
            Err(SubmitError::Shed((mut stream, peer, id))) => {
                info!(connection_id = %id, peer = %peer, "Worker pool full; answering 503");
                let written = response::write_fixed(&mut stream, &response::service_unavailable())
                    .and_then(|()| stream.flush());
                if let Err(e) = written {
                    warn!(connection_id = %id, error = %e, "Failed to write 503 response");
                }
            }
            Err(SubmitError::Closed((_, peer, id))) => {
                error!(connection_id = %id, peer = %peer, "Worker pool closed; accept loop exiting");
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "worker pool closed",
                ));
            }
        }
    }
}

fn log_outcome(id: ConnectionId, peer: SocketAddr, outcome: &ConnectionOutcome) {
    match outcome {
        ConnectionOutcome::Dispatched(DispatchOutcome::Handled { handler }) => {
            debug!(connection_id = %id, peer = %peer, handler = %handler, "Request handled");
        }
        ConnectionOutcome::Dispatched(DispatchOutcome::NotFound) => {
            debug!(connection_id = %id, peer = %peer, status = 404, "No route");
        }
        ConnectionOutcome::Dispatched(DispatchOutcome::Failed { handler, error }) => {
            warn!(
                connection_id = %id,
                peer = %peer,
                handler = %handler,
                error = %error,
                status = 500,
                "Request failed"
            );
        }
        ConnectionOutcome::Malformed(reason) => {
            debug!(connection_id = %id, peer = %peer, reason = %reason, status = 400, "Request rejected");
        }
        ConnectionOutcome::TooLarge { declared, limit } => {
            debug!(connection_id = %id, peer = %peer, declared, limit, status = 413, "Request rejected");
        }
        ConnectionOutcome::Dropped(e) => {
            debug!(connection_id = %id, peer = %peer, error = %e, "Connection dropped");
        }
    }
}
