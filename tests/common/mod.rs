#![allow(dead_code)]

pub mod test_server {
    use rawroute::config::ServerConfig;
    use rawroute::dispatcher::Dispatcher;
    use rawroute::server::{HttpServer, ServerHandle};
    use std::net::SocketAddr;
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Test fixture with automatic teardown using RAII
    ///
    /// Binds to port 0 so tests never collide; the server is stopped on drop.
    pub struct TestServer {
        handle: Option<ServerHandle>,
        pub addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(dispatcher: Dispatcher, config: ServerConfig) -> Self {
            setup_may_runtime();
            let handle = HttpServer::new(dispatcher, config)
                .start("127.0.0.1:0")
                .expect("server should bind");
            handle.wait_ready().expect("server should become ready");
            let addr = handle.local_addr();
            Self {
                handle: Some(handle),
                addr,
            }
        }

        pub fn handle(&self) -> &ServerHandle {
            self.handle.as_ref().expect("server running")
        }

        /// Stop explicitly, e.g. to assert on what happens afterwards.
        pub fn stop(mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{Shutdown, SocketAddr, TcpStream};
    use std::time::Duration;

    /// Write `raw` in one go, half-close, and read until the server closes.
    pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set timeout");
        stream.write_all(raw).expect("write request");
        let _ = stream.shutdown(Shutdown::Write);
        read_to_close(&mut stream)
    }

    /// Write `raw` without half-closing, then read until the server closes.
    pub fn send_raw_keep_open(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set timeout");
        stream.write_all(raw).expect("write request");
        read_to_close(&mut stream)
    }

    pub fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                // the server may reset after closing with unread bytes
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => panic!("read failed: {e}"),
            }
        }
        buf
    }

    pub fn send_text(addr: SocketAddr, raw: &str) -> String {
        String::from_utf8(send_raw(addr, raw.as_bytes())).expect("utf-8 response")
    }

    /// Status code of a raw response.
    pub fn status_of(response: &str) -> u16 {
        response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Body of a raw response.
    pub fn body_of(response: &str) -> &str {
        response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
    }
}
