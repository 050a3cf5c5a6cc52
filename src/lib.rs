//! # rawroute
//!
//! **rawroute** is a minimal HTTP/1.1 server that works directly on raw
//! stream sockets. It frames one request per connection, parses it, routes
//! it by exact method and path, binds the handler's parameters through a
//! pluggable resolver chain and lets the handler write its raw response bytes
//! straight back to the socket.
//!
//! ## Architecture
//!
//! - **[`server`]** - listener, per-connection pipeline, frame reader, request parser, fixed responses
//! - **[`router`]** - exact-match routing table (method → path → handler)
//! - **[`resolver`]** - argument resolvers that bind handler parameters
//! - **[`dispatcher`]** - handler contract and request dispatch
//! - **[`worker_pool`]** - coroutine pool the connections run on
//! - **[`config`]** - limits and pool sizing, from defaults or the environment
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rawroute::config::ServerConfig;
//! use rawroute::dispatcher::Dispatcher;
//! use rawroute::router::Router;
//! use rawroute::server::HttpServer;
//! use std::io::Write;
//!
//! let mut router = Router::new();
//! router.get("/ping", |_req, out| {
//!     out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")?;
//!     Ok(())
//! });
//!
//! let server = HttpServer::new(Dispatcher::new(router), ServerConfig::default());
//! let handle = server.start("127.0.0.1:8080").unwrap();
//! handle.wait_ready().unwrap();
//! handle.join().unwrap();
//! ```
//!
//! ## Runtime
//!
//! Connections are served on `may` coroutines with blocking-style socket
//! I/O. Every handler runs to completion on the worker that accepted its
//! connection; a slow handler holds that worker, nothing else.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod resolver;
pub mod router;
pub mod server;
pub mod worker_pool;

pub use config::{QueueMode, ServerConfig};
pub use dispatcher::{Dispatcher, HandlerDescriptor, OutputSink};
pub use error::{DispatchError, RequestError};
pub use router::Router;
pub use server::{HttpServer, Request, ServerHandle};
