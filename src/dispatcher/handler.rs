//! Handler contract: descriptors, parameters, arguments and the output sink.

use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

use crate::server::Request;

/// What a handler parameter asks for.
///
/// Resolvers dispatch on this tag; there is no runtime type inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// The whole parsed request
    Request,
    /// The connection's output sink
    OutputSink,
    /// Raw body bytes
    Body,
    /// Body decoded as UTF-8 text
    BodyText,
    /// Body parsed as JSON
    JsonBody,
    /// A named query string parameter
    QueryParam,
    /// A named form field
    FormParam,
    /// A named header (matched ignoring ASCII case)
    Header,
    /// An application-defined kind served by a custom resolver
    Custom(Cow<'static, str>),
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Request => f.write_str("Request"),
            ParameterKind::OutputSink => f.write_str("OutputSink"),
            ParameterKind::Body => f.write_str("Body"),
            ParameterKind::BodyText => f.write_str("BodyText"),
            ParameterKind::JsonBody => f.write_str("JsonBody"),
            ParameterKind::QueryParam => f.write_str("QueryParam"),
            ParameterKind::FormParam => f.write_str("FormParam"),
            ParameterKind::Header => f.write_str("Header"),
            ParameterKind::Custom(tag) => write!(f, "Custom({tag})"),
        }
    }
}

/// One formal parameter of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Parameter name; for named kinds this is the query/form/header key
    pub name: Cow<'static, str>,
    pub kind: ParameterKind,
    /// Whether a missing value is a resolution failure
    pub required: bool,
}

impl ParameterDescriptor {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    #[must_use]
    pub fn request() -> Self {
        Self::new("request", ParameterKind::Request)
    }

    #[must_use]
    pub fn output_sink() -> Self {
        Self::new("out", ParameterKind::OutputSink)
    }

    #[must_use]
    pub fn body() -> Self {
        Self::new("body", ParameterKind::Body)
    }

    #[must_use]
    pub fn body_text() -> Self {
        Self::new("body", ParameterKind::BodyText)
    }

    #[must_use]
    pub fn json_body() -> Self {
        Self::new("body", ParameterKind::JsonBody)
    }

    #[must_use]
    pub fn query(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ParameterKind::QueryParam)
    }

    #[must_use]
    pub fn form(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ParameterKind::FormParam)
    }

    #[must_use]
    pub fn header(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ParameterKind::Header)
    }

    #[must_use]
    pub fn custom(name: impl Into<Cow<'static, str>>, tag: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ParameterKind::Custom(tag.into()))
    }

    /// Mark the parameter optional; resolvers yield `Argument::Optional(None)` when absent.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Ordered byte destination for the client connection.
///
/// Cheap to clone; every clone writes to the same underlying stream, in call
/// order. Handlers write a complete raw HTTP response through it.
#[derive(Clone)]
pub struct OutputSink<'a> {
    inner: Rc<RefCell<&'a mut dyn Write>>,
    written: Rc<Cell<usize>>,
}

impl<'a> OutputSink<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            inner: Rc::new(RefCell::new(out)),
            written: Rc::new(Cell::new(0)),
        }
    }

    /// Bytes written through any clone of this sink so far.
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.written.get()
    }
}

impl Write for OutputSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.borrow_mut().write(buf)?;
        self.written.set(self.written.get() + n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.borrow_mut().flush()
    }
}

impl fmt::Debug for OutputSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("bytes_written", &self.written.get())
            .finish()
    }
}

/// A resolved handler argument.
#[derive(Debug)]
pub enum Argument<'a> {
    Request(Arc<Request>),
    Sink(OutputSink<'a>),
    Bytes(Bytes),
    Text(String),
    Json(Value),
    /// A named value that was declared optional
    Optional(Option<String>),
}

impl Argument<'_> {
    fn kind_name(&self) -> &'static str {
        match self {
            Argument::Request(_) => "request",
            Argument::Sink(_) => "output sink",
            Argument::Bytes(_) => "bytes",
            Argument::Text(_) => "text",
            Argument::Json(_) => "json",
            Argument::Optional(_) => "optional value",
        }
    }
}

/// Arguments for one invocation, positionally matching the descriptor's parameters.
#[derive(Debug, Default)]
pub struct Arguments<'a> {
    values: Vec<Option<Argument<'a>>>,
}

macro_rules! take_as {
    ($self:ident, $index:ident, $variant:ident) => {
        match $self.take($index)? {
            Argument::$variant(value) => Ok(value),
            other => Err(anyhow::anyhow!(
                "argument {} is {}, expected {}",
                $index,
                other.kind_name(),
                stringify!($variant)
            )),
        }
    };
}

impl<'a> Arguments<'a> {
    #[must_use]
    pub fn new(values: Vec<Argument<'a>>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Move the argument at `index` out; each slot can be taken once.
    pub fn take(&mut self, index: usize) -> anyhow::Result<Argument<'a>> {
        self.values
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| anyhow::anyhow!("argument {index} is missing or already taken"))
    }

    pub fn request(&mut self, index: usize) -> anyhow::Result<Arc<Request>> {
        take_as!(self, index, Request)
    }

    pub fn sink(&mut self, index: usize) -> anyhow::Result<OutputSink<'a>> {
        take_as!(self, index, Sink)
    }

    pub fn bytes(&mut self, index: usize) -> anyhow::Result<Bytes> {
        take_as!(self, index, Bytes)
    }

    pub fn text(&mut self, index: usize) -> anyhow::Result<String> {
        take_as!(self, index, Text)
    }

    pub fn json(&mut self, index: usize) -> anyhow::Result<Value> {
        take_as!(self, index, Json)
    }

    pub fn optional(&mut self, index: usize) -> anyhow::Result<Option<String>> {
        match self.take(index)? {
            Argument::Optional(value) => Ok(value),
            Argument::Text(value) => Ok(Some(value)),
            other => Err(anyhow::anyhow!(
                "argument {index} is {}, expected Optional",
                other.kind_name()
            )),
        }
    }
}

/// The invokable half of a handler descriptor.
///
/// `invoke` receives one argument per declared parameter, in declaration
/// order. Returning an error (or panicking) makes the dispatcher answer 500.
pub trait Handler: Send + Sync {
    fn invoke(&self, args: Arguments<'_>) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(Arguments<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, args: Arguments<'_>) -> anyhow::Result<()> {
        self(args)
    }
}

/// Adapter for the common `(Request, OutputSink)` handler shape.
struct RequestHandler<F>(F);

impl<F> Handler for RequestHandler<F>
where
    F: Fn(&Request, &mut OutputSink<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, mut args: Arguments<'_>) -> anyhow::Result<()> {
        let request = args.request(0)?;
        let mut out = args.sink(1)?;
        (self.0)(&request, &mut out)
    }
}

/// A handler instance paired with its parameter list.
///
/// Created once at registration and shared read-only by every worker.
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: Arc<str>,
    parameters: Vec<ParameterDescriptor>,
    handler: Arc<dyn Handler>,
}

impl HandlerDescriptor {
    pub fn new<H>(name: &str, parameters: Vec<ParameterDescriptor>, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self {
            name: Arc::from(name),
            parameters,
            handler: Arc::new(handler),
        }
    }

    /// Wrap a `(Request, OutputSink)` function.
    ///
    /// ```rust
    /// use rawroute::dispatcher::HandlerDescriptor;
    /// use std::io::Write;
    ///
    /// let ping = HandlerDescriptor::from_fn("ping", |_req, out| {
    ///     out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")?;
    ///     Ok(())
    /// });
    /// assert_eq!(ping.parameters().len(), 2);
    /// ```
    pub fn from_fn<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Request, &mut OutputSink<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(
            name,
            vec![ParameterDescriptor::request(), ParameterDescriptor::output_sink()],
            RequestHandler(f),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn invoke(&self, args: Arguments<'_>) -> anyhow::Result<()> {
        self.handler.invoke(args)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_clones_share_stream() {
        let mut buf = Vec::new();
        {
            let mut a = OutputSink::new(&mut buf);
            let mut b = a.clone();
            a.write_all(b"one ").unwrap();
            b.write_all(b"two").unwrap();
            assert_eq!(a.bytes_written(), 7);
        }
        assert_eq!(buf, b"one two");
    }

    #[test]
    fn test_arguments_take_once() {
        let mut args = Arguments::new(vec![Argument::Text("x".into())]);
        assert_eq!(args.text(0).unwrap(), "x");
        assert!(args.text(0).is_err());
        assert!(args.take(5).is_err());
    }

    #[test]
    fn test_arguments_type_mismatch() {
        let mut args = Arguments::new(vec![Argument::Json(serde_json::json!(1))]);
        let err = args.text(0).unwrap_err();
        assert!(err.to_string().contains("expected Text"));
    }

    #[test]
    fn test_optional_accepts_text() {
        let mut args = Arguments::new(vec![
            Argument::Text("v".into()),
            Argument::Optional(None),
        ]);
        assert_eq!(args.optional(0).unwrap(), Some("v".to_string()));
        assert_eq!(args.optional(1).unwrap(), None);
    }

    #[test]
    fn test_parameter_kind_display() {
        assert_eq!(ParameterKind::OutputSink.to_string(), "OutputSink");
        assert_eq!(
            ParameterKind::Custom(Cow::Borrowed("Session")).to_string(),
            "Custom(Session)"
        );
    }

    #[test]
    fn test_from_fn_declares_request_and_sink() {
        let d = HandlerDescriptor::from_fn("noop", |_req, _out| Ok(()));
        assert_eq!(d.name(), "noop");
        assert_eq!(d.parameters()[0].kind, ParameterKind::Request);
        assert_eq!(d.parameters()[1].kind, ParameterKind::OutputSink);
    }
}
