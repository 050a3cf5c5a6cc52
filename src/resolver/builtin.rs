use anyhow::Context;
use std::sync::Arc;

use super::core::ArgumentResolver;
use crate::dispatcher::{Argument, OutputSink, ParameterDescriptor, ParameterKind};
use crate::server::Request;

/// Hands out the whole request.
pub struct RequestResolver;

impl ArgumentResolver for RequestResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::Request
    }

    fn resolve<'a>(
        &self,
        _parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        Ok(Argument::Request(Arc::clone(request)))
    }
}

/// Hands out a handle on the connection's output stream.
pub struct OutputSinkResolver;

impl ArgumentResolver for OutputSinkResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::OutputSink
    }

    fn resolve<'a>(
        &self,
        _parameter: &ParameterDescriptor,
        _request: &Arc<Request>,
        out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        Ok(Argument::Sink(out.clone()))
    }
}

/// Raw body bytes, or the body as UTF-8 text.
pub struct BodyResolver;

impl ArgumentResolver for BodyResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        matches!(parameter.kind, ParameterKind::Body | ParameterKind::BodyText)
    }

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        if parameter.kind == ParameterKind::Body {
            return Ok(Argument::Bytes(request.body.clone()));
        }
        let text = request.body_text().context("request body is not valid UTF-8")?;
        Ok(Argument::Text(text.to_string()))
    }
}

/// Body parsed as JSON; an empty body is `null`.
pub struct JsonBodyResolver;

impl ArgumentResolver for JsonBodyResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::JsonBody
    }

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        if request.body.is_empty() {
            anyhow::ensure!(!parameter.required, "request body is empty");
            return Ok(Argument::Json(serde_json::Value::Null));
        }
        let value = serde_json::from_slice(&request.body).context("request body is not valid JSON")?;
        Ok(Argument::Json(value))
    }
}

/// First value of a named query parameter.
pub struct QueryParamResolver;

impl ArgumentResolver for QueryParamResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::QueryParam
    }

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        named(parameter, request.query_param(&parameter.name), "query parameter")
    }
}

/// First value of a named form field.
pub struct FormParamResolver;

impl ArgumentResolver for FormParamResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::FormParam
    }

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        named(parameter, request.form_param(&parameter.name), "form field")
    }
}

/// A named header, matched ignoring ASCII case.
pub struct HeaderResolver;

impl ArgumentResolver for HeaderResolver {
    fn supports(&self, parameter: &ParameterDescriptor) -> bool {
        parameter.kind == ParameterKind::Header
    }

    fn resolve<'a>(
        &self,
        parameter: &ParameterDescriptor,
        request: &Arc<Request>,
        _out: &OutputSink<'a>,
    ) -> anyhow::Result<Argument<'a>> {
        named(parameter, request.header(&parameter.name), "header")
    }
}

fn named<'a>(
    parameter: &ParameterDescriptor,
    value: Option<&str>,
    what: &str,
) -> anyhow::Result<Argument<'a>> {
    match (value, parameter.required) {
        (Some(v), true) => Ok(Argument::Text(v.to_string())),
        (v, false) => Ok(Argument::Optional(v.map(str::to_string))),
        (None, true) => Err(anyhow::anyhow!("missing required {what} `{}`", parameter.name)),
    }
}
