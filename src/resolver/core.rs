use std::sync::Arc;
use tracing::debug;

use super::builtin::{
    BodyResolver, FormParamResolver, HeaderResolver, JsonBodyResolver, OutputSinkResolver,
    QueryParamResolver, RequestResolver,
};
use crate::dispatcher::{Argument, Arguments, OutputSink, ParameterDescriptor};
use crate::error::DispatchError;
use crate::server::Request;

/// Produces one handler argument for the parameters it supports.
pub trait ArgumentResolver: Send + Sync {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool;

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>>;
}

/// Ordered list of resolvers; earlier entries win when capabilities overlap.
#[derive(Clone)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
}

impl Default for ResolverChain {
    /// Request and output sink resolvers, enough for `(Request, OutputSink)` handlers.
    fn default() -> Self {
        let mut chain = Self::new();
        chain.add(RequestResolver);
        chain.add(OutputSinkResolver);
        chain
    }
}

impl ResolverChain {
    /// An empty chain; every parameter is unsupported until resolvers are added.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Every built-in resolver.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut chain = Self::default();
        chain.add(BodyResolver);
        chain.add(JsonBodyResolver);
        chain.add(QueryParamResolver);
        chain.add(FormParamResolver);
        chain.add(HeaderResolver);
        chain
    }

    /// Append a resolver after the existing ones.
    pub fn add<R: ArgumentResolver + 'static>(&mut self, resolver: R) {
        self.resolvers.push(Arc::new(resolver));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolve every parameter, or fail before anything is handed to the handler.
    pub fn resolve_all<'a>(
        &self,
        parameters: &[ParameterDescriptor],
        request: &Arc<Request>,
        out: &OutputSink<'a>,
    ) -> Result<Arguments<'a>, DispatchError> {
        let mut values = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let resolver = self
                .resolvers
                .iter()
                .find(|r| r.supports(parameter))
                .ok_or_else(|| DispatchError::UnsupportedParameter(parameter.kind.clone()))?;

            let value = resolver
                .resolve(parameter, request, out)
                .map_err(|source| DispatchError::Resolver {
                    parameter: parameter.name.to_string(),
                    source,
                })?;
            values.push(value);
        }

        debug!(
            parameters = parameters.len(),
            resolvers = self.resolvers.len(),
            "Handler arguments resolved"
        );
        Ok(Arguments::new(values))
    }
}
