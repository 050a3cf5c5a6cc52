use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use rawroute::dispatcher::Dispatcher;
use rawroute::router::Router;
use rawroute::server::read_request;
use std::hint::black_box;
use std::io::Write;

const GET_REQUEST: &[u8] = b"GET /zoo/animals?species=cat&limit=20&cursor=a%20b HTTP/1.1\r\n\
    Host: localhost\r\n\
    User-Agent: bench\r\n\
    Accept: */*\r\n\
    \r\n";

const FORM_REQUEST: &[u8] = b"POST /zoo/animals HTTP/1.1\r\n\
    Host: localhost\r\n\
    Content-Type: application/x-www-form-urlencoded\r\n\
    Content-Length: 32\r\n\
    \r\n\
    name=Tom&species=cat&age=3&x=y+z";

fn zoo_router() -> Router {
    let mut router = Router::new();
    let paths = [
        "/",
        "/zoo/animals",
        "/zoo/animals/123",
        "/zoo/animals/123/toys/456",
        "/zoo/health",
        "/inventory/1/feeds/2/items/3/batches/4",
    ];
    for path in paths {
        router.get(path, |_req, out| {
            out.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")?;
            Ok(())
        });
    }
    router.post("/zoo/animals", |req, out| {
        let name = req.form_param("name").unwrap_or("");
        write!(out, "HTTP/1.1 201 Created\r\nContent-Length: {}\r\n\r\n{}", name.len(), name)?;
        Ok(())
    });
    router
}

fn bench_read_request(c: &mut Criterion) {
    c.bench_function("read_request_get_query", |b| {
        b.iter(|| {
            let request = read_request(&mut black_box(GET_REQUEST), 8192, 1 << 20);
            black_box(&request);
        })
    });
    c.bench_function("read_request_post_form", |b| {
        b.iter(|| {
            let request = read_request(&mut black_box(FORM_REQUEST), 8192, 1 << 20);
            black_box(&request);
        })
    });
}

fn bench_route_lookup(c: &mut Criterion) {
    let router = zoo_router();
    c.bench_function("route_lookup", |b| {
        let test_paths = [
            (Method::GET, "/zoo/animals/123"),
            (Method::GET, "/zoo/animals/123/toys/456"),
            (Method::POST, "/zoo/animals"),
            (Method::GET, "/inventory/1/feeds/2/items/3/batches/4"),
            (Method::GET, "/missing"),
        ];
        b.iter(|| {
            for (method, path) in test_paths.iter() {
                black_box(router.lookup(method, path));
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(zoo_router());
    let mut out = Vec::with_capacity(256);
    c.bench_function("parse_and_dispatch", |b| {
        b.iter(|| {
            out.clear();
            if let Ok(request) = read_request(&mut black_box(FORM_REQUEST), 8192, 1 << 20) {
                black_box(dispatcher.dispatch(request, &mut out));
            }
        })
    });
}

criterion_group!(benches, bench_read_request, bench_route_lookup, bench_dispatch);
criterion_main!(benches);
