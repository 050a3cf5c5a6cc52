//! One connection, start to finish: frame, parse, dispatch, flush, close.

use std::io::{BufWriter, Read, Write};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::request::read_request;
use super::response;
use crate::config::ServerConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::RequestError;
use crate::ids::ConnectionId;

/// How a connection ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The request was parsed and dispatched.
    Dispatched(DispatchOutcome),
    /// Framing or parsing failed; the fixed 400 was written.
    Malformed(String),
    /// The declared body exceeded the limit; the fixed 413 was written.
    TooLarge { declared: u64, limit: u64 },
    /// The peer went away or the socket failed before a request was read;
    /// nothing was written.
    Dropped(std::io::Error),
}

impl ConnectionOutcome {
    /// Status code written by the server itself, if any.
    #[must_use]
    pub fn fixed_status(&self) -> Option<u16> {
        match self {
            ConnectionOutcome::Dispatched(outcome) => outcome.fixed_status(),
            ConnectionOutcome::Malformed(_) => Some(400),
            ConnectionOutcome::TooLarge { .. } => Some(413),
            ConnectionOutcome::Dropped(_) => None,
        }
    }
}

/// Serve exactly one request on `stream`.
///
/// The stream is consumed and dropped on return, which closes the socket.
pub fn serve<S: Read + Write>(
    mut stream: S,
    dispatcher: &Dispatcher,
    config: &ServerConfig,
    id: ConnectionId,
) -> ConnectionOutcome {
    let start = Instant::now();

    let outcome = match read_request(&mut stream, config.header_limit, config.body_limit) {
        Ok(request) => {
            debug!(
                connection_id = %id,
                method = %request.method,
                path = %request.path,
                body_len = request.body.len(),
                "Request parsed"
            );
            let mut out = BufWriter::new(&mut stream);
            let outcome = dispatcher.dispatch(request, &mut out);
            if let Err(e) = out.flush() {
                warn!(connection_id = %id, error = %e, "Failed to flush response");
            }
            ConnectionOutcome::Dispatched(outcome)
        }
        Err(RequestError::Malformed(reason)) => {
            info!(connection_id = %id, reason = %reason, "Malformed request");
            write_fixed(&mut stream, &response::bad_request(), id);
            ConnectionOutcome::Malformed(reason)
        }
        Err(RequestError::BodyTooLarge { declared, limit }) => {
            info!(connection_id = %id, declared, limit, "Request body too large");
            write_fixed(&mut stream, &response::payload_too_large(), id);
            ConnectionOutcome::TooLarge { declared, limit }
        }
        Err(RequestError::Io(e)) => {
            debug!(connection_id = %id, error = %e, "Connection dropped before a request was read");
            ConnectionOutcome::Dropped(e)
        }
    };

    debug!(
        connection_id = %id,
        status = ?outcome.fixed_status(),
        duration_us = start.elapsed().as_micros() as u64,
        "Connection closed"
    );
    outcome
}

fn write_fixed<W: Write>(stream: &mut W, bytes: &[u8], id: ConnectionId) {
    let result = response::write_fixed(stream, bytes).and_then(|()| stream.flush());
    if let Err(e) = result {
        warn!(connection_id = %id, error = %e, "Failed to write error response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use std::io::{self, Cursor};

    /// In-memory duplex stream: reads from `input`, records writes.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn serve_bytes(
        dispatcher: &Dispatcher,
        config: &ServerConfig,
        input: &[u8],
    ) -> (ConnectionOutcome, Vec<u8>) {
        let mut duplex = Duplex::new(input);
        let outcome = serve(&mut duplex, dispatcher, config, ConnectionId::new());
        (outcome, duplex.output)
    }

    fn ping_dispatcher() -> Dispatcher {
        let mut router = Router::new();
        router.get("/ping", |_req, out| {
            out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")?;
            Ok(())
        });
        Dispatcher::new(router)
    }

    #[test]
    fn test_ping_round_trip() {
        let (outcome, out) = serve_bytes(
            &ping_dispatcher(),
            &ServerConfig::default(),
            b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert!(matches!(
            outcome,
            ConnectionOutcome::Dispatched(DispatchOutcome::Handled { .. })
        ));
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong");
    }

    #[test]
    fn test_two_token_request_line_is_400() {
        let (outcome, out) = serve_bytes(
            &ping_dispatcher(),
            &ServerConfig::default(),
            b"GET /ping\r\n\r\n",
        );
        assert!(matches!(outcome, ConnectionOutcome::Malformed(_)));
        assert_eq!(out, response::bad_request());
    }

    #[test]
    fn test_missing_header_terminator_is_400() {
        let (outcome, out) = serve_bytes(
            &ping_dispatcher(),
            &ServerConfig::default(),
            b"GET /ping HTTP/1.1\r\nHost: x\r\n",
        );
        assert!(matches!(outcome, ConnectionOutcome::Malformed(_)));
        assert_eq!(out, response::bad_request());
    }

    #[test]
    fn test_oversized_body_is_413() {
        let config = ServerConfig {
            body_limit: 8,
            ..ServerConfig::default()
        };
        let (outcome, out) = serve_bytes(
            &ping_dispatcher(),
            &config,
            b"POST /ping HTTP/1.1\r\nContent-Length: 9\r\n\r\n123456789",
        );
        assert!(matches!(
            outcome,
            ConnectionOutcome::TooLarge { declared: 9, limit: 8 }
        ));
        assert_eq!(out, response::payload_too_large());
    }

    #[test]
    fn test_empty_connection_gets_no_response() {
        let (outcome, out) = serve_bytes(&ping_dispatcher(), &ServerConfig::default(), b"");
        assert!(matches!(outcome, ConnectionOutcome::Dropped(_)));
        assert_eq!(outcome.fixed_status(), None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_route_miss_is_404() {
        let (outcome, out) = serve_bytes(
            &ping_dispatcher(),
            &ServerConfig::default(),
            b"GET /missing HTTP/1.1\r\n\r\n",
        );
        assert_eq!(outcome.fixed_status(), Some(404));
        assert_eq!(out, response::not_found());
    }
}
