//! # Argument Resolver Module
//!
//! Binds handler parameters to values. Each [`ArgumentResolver`] claims the
//! parameters it supports and produces their values from the request and the
//! connection's output sink.
//!
//! ## Resolution
//!
//! For every declared parameter, resolvers are scanned in registration order
//! and the first one whose `supports` returns `true` produces the argument.
//! If no resolver claims a parameter the dispatch fails with
//! `DispatchError::UnsupportedParameter` and the handler is never invoked.
//!
//! ## Built-in resolvers
//!
//! | Resolver | Parameter kinds |
//! |---|---|
//! | [`RequestResolver`] | `Request` |
//! | [`OutputSinkResolver`] | `OutputSink` |
//! | [`BodyResolver`] | `Body`, `BodyText` |
//! | [`JsonBodyResolver`] | `JsonBody` |
//! | [`QueryParamResolver`] | `QueryParam` |
//! | [`FormParamResolver`] | `FormParam` |
//! | [`HeaderResolver`] | `Header` |
//!
//! `ResolverChain::default()` carries the first two, which is all
//! `HandlerDescriptor::from_fn` handlers need.
//!
//! ## Custom resolvers
//!
//! ```rust
//! use rawroute::dispatcher::{Argument, OutputSink, ParameterDescriptor, ParameterKind};
//! use rawroute::resolver::ArgumentResolver;
//! use rawroute::server::Request;
//! use std::sync::Arc;
//!
//! struct PeerTag;
//!
//! impl ArgumentResolver for PeerTag {
//!     fn supports(&self, parameter: &ParameterDescriptor) -> bool {
//!         parameter.kind == ParameterKind::Custom("tag".into())
//!     }
//!
//!     fn resolve<'a>(
//!         &self,
//!         _parameter: &ParameterDescriptor,
//!         request: &Arc<Request>,
//!         _out: &OutputSink<'a>,
//!     ) -> anyhow::Result<Argument<'a>> {
//!         Ok(Argument::Text(format!("{} {}", request.method, request.path)))
//!     }
//! }
//! ```

mod builtin;
mod core;

pub use builtin::{
    BodyResolver, FormParamResolver, HeaderResolver, JsonBodyResolver, OutputSinkResolver,
    QueryParamResolver, RequestResolver,
};
pub use core::{ArgumentResolver, ResolverChain};
