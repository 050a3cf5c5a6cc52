use clap::Parser;
use http::Method;
use rawroute::config::{parse_size, QueueMode, ServerConfig};
use rawroute::dispatcher::{Dispatcher, HandlerDescriptor, ParameterDescriptor};
use rawroute::logging::{init_logging, LogConfig};
use rawroute::resolver::ResolverChain;
use rawroute::router::Router;
use rawroute::server::HttpServer;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Demo server for rawroute
#[derive(Parser, Debug)]
#[command(name = "rawroute")]
#[command(about = "Minimal raw-socket HTTP/1.1 server", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "RAWROUTE_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// Number of worker coroutines
    #[arg(long)]
    workers: Option<usize>,

    /// Head buffer size in bytes (decimal or 0x hex)
    #[arg(long, value_parser = size_arg)]
    header_limit: Option<usize>,

    /// Largest accepted Content-Length in bytes
    #[arg(long)]
    body_limit: Option<u64>,

    /// Queue policy: unbounded or shed
    #[arg(long, value_parser = queue_mode_arg)]
    queue_mode: Option<QueueMode>,

    /// Waiting connections tolerated when shedding
    #[arg(long)]
    queue_bound: Option<usize>,
}

impl Args {
    /// Flags over environment over defaults.
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(header_limit) = self.header_limit {
            config.header_limit = header_limit;
        }
        if let Some(body_limit) = self.body_limit {
            config.body_limit = body_limit;
        }
        if let Some(queue_mode) = self.queue_mode {
            config.queue_mode = queue_mode;
        }
        if let Some(queue_bound) = self.queue_bound {
            config.queue_bound = queue_bound;
        }
        config.normalized()
    }
}

fn size_arg(s: &str) -> Result<usize, String> {
    parse_size(s).ok_or_else(|| format!("invalid size: {s}"))
}

fn queue_mode_arg(s: &str) -> Result<QueueMode, String> {
    QueueMode::parse(s).ok_or_else(|| format!("invalid queue mode: {s} (expected unbounded or shed)"))
}

#[derive(Serialize)]
struct SearchResult {
    q: String,
    page: Option<String>,
}

fn respond(
    out: &mut impl Write,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()> {
    write!(
        out,
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    out.write_all(body)
}

fn demo_router() -> Router {
    let mut router = Router::new();

    router.get("/ping", |_req, out| {
        respond(out, "200 OK", "text/plain", b"pong")?;
        Ok(())
    });

    router.register(
        Method::POST,
        "/echo",
        HandlerDescriptor::new(
            "echo",
            vec![ParameterDescriptor::body(), ParameterDescriptor::output_sink()],
            |mut args: rawroute::dispatcher::Arguments<'_>| {
                let body = args.bytes(0)?;
                let mut out = args.sink(1)?;
                respond(&mut out, "200 OK", "application/octet-stream", &body)?;
                Ok(())
            },
        ),
    );

    router.post("/submit", |req, out| {
        let body = serde_json::to_vec(&req.form)?;
        respond(out, "200 OK", "application/json", &body)?;
        Ok(())
    });

    router.register(
        Method::GET,
        "/search",
        HandlerDescriptor::new(
            "search",
            vec![
                ParameterDescriptor::query("q"),
                ParameterDescriptor::query("page").optional(),
                ParameterDescriptor::output_sink(),
            ],
            |mut args: rawroute::dispatcher::Arguments<'_>| {
                let result = SearchResult {
                    q: args.text(0)?,
                    page: args.optional(1)?,
                };
                let mut out = args.sink(2)?;
                let body = serde_json::to_vec(&result)?;
                respond(&mut out, "200 OK", "application/json", &body)?;
                Ok(())
            },
        ),
    );

    router
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&LogConfig::from_env())?;

    let config = args.server_config();
    let dispatcher = Dispatcher::with_resolvers(demo_router(), ResolverChain::with_builtins());
    let handle = HttpServer::new(dispatcher, config).start(args.addr.as_str())?;
    info!(addr = %handle.local_addr(), "rawroute demo server started");

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Shutdown signal received");
        }
        handle.stop();
    }

    #[cfg(not(unix))]
    handle.join()?;

    Ok(())
}
