//! # Router Module
//!
//! Two-level exact-match routing: HTTP method, then request path, then the
//! registered [`HandlerDescriptor`](crate::dispatcher::HandlerDescriptor).
//!
//! ## Example
//!
//! ```rust
//! use rawroute::router::Router;
//! use http::Method;
//! use std::io::Write;
//!
//! let mut router = Router::new();
//! router.get("/ping", |_req, out| {
//!     out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")?;
//!     Ok(())
//! });
//!
//! assert!(router.lookup(&Method::GET, "/ping").is_some());
//! assert!(router.lookup(&Method::POST, "/ping").is_none());
//! assert!(router.lookup(&Method::GET, "/ping/").is_none());
//! ```
//!
//! The table is built before [`HttpServer::start`](crate::server::HttpServer::start)
//! and then moved into the dispatcher, so lookups never lock.

mod core;

pub use core::Router;
