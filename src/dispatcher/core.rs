use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use super::handler::{HandlerDescriptor, OutputSink};
use crate::error::DispatchError;
use crate::resolver::{ArgumentResolver, ResolverChain};
use crate::router::Router;
use crate::server::response;
use crate::server::Request;

/// How one dispatch ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler ran and returned `Ok`.
    Handled { handler: String },
    /// No route matched; the fixed 404 was written.
    NotFound,
    /// Binding or invocation failed; the fixed 500 was written.
    Failed {
        handler: String,
        error: DispatchError,
    },
}

impl DispatchOutcome {
    /// Status the client should have seen, when the server chose it.
    #[must_use]
    pub fn fixed_status(&self) -> Option<u16> {
        match self {
            DispatchOutcome::Handled { .. } => None,
            DispatchOutcome::NotFound => Some(404),
            DispatchOutcome::Failed { .. } => Some(500),
        }
    }
}

/// Routes parsed requests to handlers and runs them.
///
/// Owns the routing table and the resolver chain; both are read-only once
/// the server starts, so one `Arc<Dispatcher>` is shared by every worker.
pub struct Dispatcher {
    router: Router,
    resolvers: ResolverChain,
}

impl Dispatcher {
    /// Dispatcher with the default resolver chain (request and output sink).
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self::with_resolvers(router, ResolverChain::default())
    }

    #[must_use]
    pub fn with_resolvers(router: Router, resolvers: ResolverChain) -> Self {
        Self { router, resolvers }
    }

    /// Append a resolver; it is consulted after every resolver already registered.
    pub fn add_argument_resolver<R: ArgumentResolver + 'static>(&mut self, resolver: R) {
        self.resolvers.add(resolver);
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn resolvers(&self) -> &ResolverChain {
        &self.resolvers
    }

    /// Run the handler registered for `request` and let it write to `out`.
    ///
    /// Never fails: route misses produce the fixed 404 and every binding or
    /// handler failure, panics included, produces the fixed 500. Flushing and
    /// closing `out` is left to the caller.
    pub fn dispatch(&self, request: Request, out: &mut dyn Write) -> DispatchOutcome {
        let start = Instant::now();
        let mut sink = OutputSink::new(out);

        let Some(descriptor) = self.router.lookup(&request.method, &request.path) else {
            debug!(method = %request.method, path = %request.path, "No route matched");
            if let Err(e) = response::write_fixed(&mut sink, &response::not_found()) {
                warn!(error = %e, "Failed to write 404 response");
            }
            return DispatchOutcome::NotFound;
        };

        let request = Arc::new(request);
        let outcome = match self.invoke(&descriptor, &request, &sink) {
            Ok(()) => DispatchOutcome::Handled {
                handler: descriptor.name().to_string(),
            },
            Err(error) => {
                error!(
                    handler = descriptor.name(),
                    method = %request.method,
                    path = %request.path,
                    error = %error,
                    "Handler failed"
                );
                if sink.bytes_written() > 0 {
                    warn!(
                        handler = descriptor.name(),
                        bytes_written = sink.bytes_written(),
                        "Handler failed after writing; error response follows partial output"
                    );
                }
                if let Err(e) = response::write_fixed(&mut sink, &response::internal_error()) {
                    warn!(error = %e, "Failed to write 500 response");
                }
                DispatchOutcome::Failed {
                    handler: descriptor.name().to_string(),
                    error,
                }
            }
        };

        debug!(
            method = %request.method,
            path = %request.path,
            handler = descriptor.name(),
            bytes_written = sink.bytes_written(),
            duration_us = start.elapsed().as_micros() as u64,
            "Dispatch complete"
        );
        outcome
    }

    fn invoke(
        &self,
        descriptor: &HandlerDescriptor,
        request: &Arc<Request>,
        sink: &OutputSink<'_>,
    ) -> Result<(), DispatchError> {
        // a panic while binding or invoking becomes the fixed 500
        let result = catch_unwind(AssertUnwindSafe(|| {
            let args = self
                .resolvers
                .resolve_all(descriptor.parameters(), request, sink)?;
            descriptor.invoke(args).map_err(DispatchError::Handler)
        }));

        match result {
            Ok(outcome) => outcome,
            Err(panic) => Err(DispatchError::Panicked(panic_message(&*panic))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{panic:?}")
    }
}
