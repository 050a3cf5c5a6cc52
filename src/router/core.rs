use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatcher::{HandlerDescriptor, OutputSink};
use crate::server::Request;

/// Exact-match routing table: method, then path, then handler.
///
/// Populated before the server starts and read-only afterwards. Paths are
/// compared byte for byte; there are no wildcards, prefixes or path
/// parameters.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<Method, HashMap<String, Arc<HandlerDescriptor>>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor` for `method` and `path`.
    ///
    /// A later registration for the same key replaces the earlier one; the
    /// replaced descriptor is returned.
    pub fn register(
        &mut self,
        method: Method,
        path: impl Into<String>,
        descriptor: HandlerDescriptor,
    ) -> Option<Arc<HandlerDescriptor>> {
        let path = path.into();
        let handler = descriptor.name().to_string();
        let replaced = self
            .routes
            .entry(method.clone())
            .or_default()
            .insert(path.clone(), Arc::new(descriptor));

        if let Some(old) = &replaced {
            warn!(
                method = %method,
                path = %path,
                old_handler = old.name(),
                new_handler = %handler,
                "Replaced existing route"
            );
        } else {
            debug!(method = %method, path = %path, handler = %handler, "Route registered");
        }
        replaced
    }

    /// Register a `(Request, OutputSink)` function for `GET path`.
    pub fn get<F>(&mut self, path: &str, handler: F) -> Option<Arc<HandlerDescriptor>>
    where
        F: Fn(&Request, &mut OutputSink<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    /// Register a `(Request, OutputSink)` function for `POST path`.
    pub fn post<F>(&mut self, path: &str, handler: F) -> Option<Arc<HandlerDescriptor>>
    where
        F: Fn(&Request, &mut OutputSink<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    fn route<F>(&mut self, method: Method, path: &str, handler: F) -> Option<Arc<HandlerDescriptor>>
    where
        F: Fn(&Request, &mut OutputSink<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = format!("{method} {path}");
        self.register(method, path, HandlerDescriptor::from_fn(&name, handler))
    }

    /// Exact lookup on both method and path; `None` means no route.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<Arc<HandlerDescriptor>> {
        self.routes.get(method)?.get(path).cloned()
    }

    /// Number of registered (method, path) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, sorted by path then method.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut keys: Vec<(Method, String)> = self
            .routes
            .iter()
            .flat_map(|(method, paths)| paths.keys().map(move |p| (method.clone(), p.clone())))
            .collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        keys
    }

    /// Log a summary of the routing table.
    pub fn log_routes(&self) {
        if self.is_empty() {
            info!(routes_count = 0, "Routing table loaded with no routes");
            return;
        }
        let routes_summary: Vec<String> = self
            .routes()
            .iter()
            .take(10)
            .map(|(method, path)| format!("{method} {path}"))
            .collect();
        info!(
            routes_count = self.len(),
            routes_summary = ?routes_summary,
            "Routing table loaded"
        );
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes()).finish()
    }
}
