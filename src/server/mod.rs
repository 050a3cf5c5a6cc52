//! # Server Module
//!
//! The wire side of rawroute: a listener on `may::net`, a pool of worker
//! coroutines, and the per-connection pipeline that frames and parses one
//! request before handing it to the [`Dispatcher`](crate::dispatcher::Dispatcher).
//!
//! ## Connection lifecycle
//!
//! ```text
//! accept ─► worker ─► frame::read_head ─► request::parse_head ─► frame::read_body
//!                                                                    │
//!        close ◄─ flush ◄─ handler writes to OutputSink ◄─ dispatch ◄┘
//! ```
//!
//! Exactly one request is served per connection. There is no keep-alive, no
//! chunked transfer-encoding and no TLS.
//!
//! ## Fixed responses
//!
//! | Condition | Status | Body |
//! |---|---|---|
//! | malformed head | 400 | `<h1>Malformed request</h1>` |
//! | `Content-Length` over the limit | 413 | `<h1>Request body too large</h1>` |
//! | no route | 404 | `{"status": "error"}` |
//! | handler or binding failure | 500 | `{"status": "error"}` |
//! | queue full (`QueueMode::Shed`) | 503 | `{"status": "error"}` |

pub mod connection;
pub mod frame;
pub mod http_server;
pub mod request;
pub mod response;

pub use connection::{serve, ConnectionOutcome};
pub use http_server::{HttpServer, ServerHandle};
pub use request::{read_request, ParamMap, Request};
