//! # Dispatcher Module
//!
//! Takes a parsed [`Request`](crate::server::Request), finds its handler in
//! the [`Router`](crate::router::Router), binds the handler's parameters
//! through the [`ResolverChain`](crate::resolver::ResolverChain) and invokes
//! it with the connection's [`OutputSink`].
//!
//! ## Handler contract
//!
//! A handler is a [`HandlerDescriptor`]: a name, an ordered list of
//! [`ParameterDescriptor`]s and something implementing [`Handler`]. The
//! handler writes a complete raw HTTP response to its output sink; there is
//! no response object and the dispatcher does not inspect what was written.
//!
//! ```rust
//! use rawroute::dispatcher::{Dispatcher, HandlerDescriptor};
//! use rawroute::router::Router;
//! use std::io::Write;
//!
//! let mut router = Router::new();
//! router.register(
//!     http::Method::GET,
//!     "/ping",
//!     HandlerDescriptor::from_fn("ping", |_req, out| {
//!         out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")?;
//!         Ok(())
//!     }),
//! );
//! let dispatcher = Dispatcher::new(router);
//! assert_eq!(dispatcher.router().len(), 1);
//! ```
//!
//! ## Error Handling
//!
//! `dispatch` never fails outward:
//! - a route miss writes the fixed 404 JSON error
//! - an unsupported parameter, a failing resolver, a handler error or a
//!   handler panic writes the fixed 500 JSON error
//!
//! The outcome is reported as a [`DispatchOutcome`] for logging.

mod core;
mod handler;

pub use core::{DispatchOutcome, Dispatcher};
pub use handler::{
    Argument, Arguments, Handler, HandlerDescriptor, OutputSink, ParameterDescriptor, ParameterKind,
};
