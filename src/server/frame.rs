//! Frame reader: locates the request line, the header block and the body
//! offset inside a bounded prefix of the connection's bytes.
//!
//! The head is buffered once into a buffer of `header_limit` bytes. Nothing
//! past that buffer is read until the body is requested, at which point the
//! body bytes that already landed in the buffer are reused and only the
//! remainder is read from the socket.

use bytes::Bytes;
use std::io::{self, Read};
use tracing::trace;

use crate::error::RequestError;

pub const CRLF: &[u8] = b"\r\n";
pub const CRLFCRLF: &[u8] = b"\r\n\r\n";

/// Byte boundaries of a request head inside the buffered prefix.
#[derive(Debug, Clone)]
pub struct Frame {
    buf: Vec<u8>,
    /// Offset of the CRLF terminating the request line
    request_line_end: usize,
    /// Offset of the CRLFCRLF terminating the header block
    headers_end: usize,
}

impl Frame {
    /// The request line without its CRLF.
    #[must_use]
    pub fn request_line(&self) -> &[u8] {
        &self.buf[..self.request_line_end]
    }

    /// Header lines between the request line and the blank line, CRLF-separated.
    ///
    /// Empty when the request carries no headers.
    #[must_use]
    pub fn header_block(&self) -> &[u8] {
        let start = self.request_line_end + CRLF.len();
        if self.headers_end > start {
            &self.buf[start..self.headers_end]
        } else {
            &[]
        }
    }

    /// Offset of the first body byte within the buffered prefix.
    #[must_use]
    pub fn body_offset(&self) -> usize {
        self.headers_end + CRLFCRLF.len()
    }

    /// Body bytes that were already buffered together with the head.
    #[must_use]
    pub fn buffered_body(&self) -> &[u8] {
        &self.buf[self.body_offset().min(self.buf.len())..]
    }
}

/// Position of `needle` in `haystack`, if any.
#[must_use]
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Buffer at most `header_limit` bytes from `source` and frame the request head.
///
/// Reads until the blank line terminating the headers shows up, the buffer is
/// full, or the peer stops sending. A peer that closes without sending a
/// single byte yields `RequestError::Io(UnexpectedEof)` so that idle probes
/// are not answered.
pub fn read_head<R: Read>(source: &mut R, header_limit: usize) -> Result<Frame, RequestError> {
    let mut buf = vec![0u8; header_limit];
    let mut filled = 0;

    while filled < header_limit {
        let n = match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        // the terminator may straddle two reads
        let search_from = filled.saturating_sub(CRLFCRLF.len() - 1);
        filled += n;
        if find(&buf[search_from..filled], CRLFCRLF).is_some() {
            break;
        }
    }
    buf.truncate(filled);

    if buf.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before any request bytes",
        )
        .into());
    }

    let request_line_end =
        find(&buf, CRLF).ok_or_else(|| RequestError::malformed("request line end not found"))?;

    // the request line's own CRLF may open the blank line when there are no headers
    let headers_end = find(&buf[request_line_end..], CRLFCRLF)
        .map(|i| i + request_line_end)
        .ok_or_else(|| RequestError::malformed("headers too large"))?;

    trace!(
        buffered = filled,
        request_line_end = request_line_end,
        headers_end = headers_end,
        "Request head framed"
    );

    Ok(Frame {
        buf,
        request_line_end,
        headers_end,
    })
}

/// Read exactly `content_length` body bytes.
///
/// The limit is checked before anything is read. Bytes already buffered by
/// [`read_head`] are consumed first; the rest comes from `source`.
pub fn read_body<R: Read>(
    frame: &Frame,
    source: &mut R,
    content_length: u64,
    body_limit: u64,
) -> Result<Bytes, RequestError> {
    if content_length > body_limit {
        return Err(RequestError::BodyTooLarge {
            declared: content_length,
            limit: body_limit,
        });
    }
    let len = usize::try_from(content_length)
        .map_err(|_| RequestError::malformed("Content-Length does not fit in memory"))?;
    if len == 0 {
        return Ok(Bytes::new());
    }

    let buffered = frame.buffered_body();
    let take = buffered.len().min(len);
    let mut body = Vec::with_capacity(len);
    body.extend_from_slice(&buffered[..take]);

    if take < len {
        body.resize(len, 0);
        source.read_exact(&mut body[take..]).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                RequestError::malformed("body shorter than Content-Length")
            } else {
                RequestError::Io(e)
            }
        })?;
    }

    trace!(
        content_length = len,
        from_buffer = take,
        from_socket = len - take,
        "Request body read"
    );

    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read, like a slow peer.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"abc\r\ndef", CRLF), Some(3));
        assert_eq!(find(b"abc", CRLF), None);
        assert_eq!(find(b"", CRLF), None);
    }

    #[test]
    fn test_frames_request_with_headers() {
        let raw = b"GET /ping HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n";
        let frame = read_head(&mut Cursor::new(&raw[..]), 4096).unwrap();
        assert_eq!(frame.request_line(), b"GET /ping HTTP/1.1");
        assert_eq!(frame.header_block(), b"Host: x\r\nAccept: */*");
        assert_eq!(frame.body_offset(), raw.len());
        assert!(frame.buffered_body().is_empty());
    }

    #[test]
    fn test_frames_request_without_headers() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let frame = read_head(&mut Cursor::new(&raw[..]), 4096).unwrap();
        assert_eq!(frame.request_line(), b"GET / HTTP/1.1");
        assert!(frame.header_block().is_empty());
        assert_eq!(frame.body_offset(), raw.len());
    }

    #[test]
    fn test_missing_request_line_end_is_malformed() {
        let err = read_head(&mut Cursor::new(&b"GET / HTTP/1.1"[..]), 4096).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(ref m) if m.contains("request line")));
    }

    #[test]
    fn test_missing_blank_line_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n";
        let err = read_head(&mut Cursor::new(&raw[..]), 4096).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(ref m) if m.contains("headers too large")));
    }

    #[test]
    fn test_head_larger_than_limit_is_malformed() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(200));
        raw.extend_from_slice(b"\r\n\r\n");
        let err = read_head(&mut Cursor::new(raw), 64).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[test]
    fn test_empty_connection_is_io_eof() {
        let err = read_head(&mut Cursor::new(&b""[..]), 4096).unwrap_err();
        match err {
            RequestError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_head_split_across_reads() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        let mut src = Trickle { data: raw, step: 3 };
        let frame = read_head(&mut src, 4096).unwrap();
        assert_eq!(frame.request_line(), b"POST /submit HTTP/1.1");
        assert_eq!(frame.header_block(), b"Content-Length: 3");
        let body = read_body(&frame, &mut src, 3, 1024).unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[test]
    fn test_body_entirely_in_buffer() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 7\r\n\r\na=1&b=2";
        let mut src = Cursor::new(&raw[..]);
        let frame = read_head(&mut src, 4096).unwrap();
        assert_eq!(frame.buffered_body(), b"a=1&b=2");
        let body = read_body(&frame, &mut src, 7, 1024).unwrap();
        assert_eq!(&body[..], b"a=1&b=2");
    }

    #[test]
    fn test_body_continues_past_head_buffer() {
        let mut raw = b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n".to_vec();
        let head_len = raw.len();
        raw.extend((0..100u8).map(|i| b'a' + (i % 26)));
        let expected = raw[head_len..].to_vec();

        // the head buffer only catches a few body bytes
        let mut src = Cursor::new(raw);
        let frame = read_head(&mut src, head_len + 10).unwrap();
        assert_eq!(frame.buffered_body().len(), 10);
        let body = read_body(&frame, &mut src, 100, 1024).unwrap();
        assert_eq!(&body[..], &expected[..]);
    }

    #[test]
    fn test_body_over_limit_rejected_before_reading() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5000\r\n\r\n";
        let mut src = Cursor::new(&raw[..]);
        let frame = read_head(&mut src, 4096).unwrap();

        struct Untouchable;
        impl Read for Untouchable {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                panic!("body must not be read when it exceeds the limit");
            }
        }

        let err = read_body(&frame, &mut Untouchable, 5000, 1024).unwrap_err();
        assert!(matches!(
            err,
            RequestError::BodyTooLarge {
                declared: 5000,
                limit: 1024
            }
        ));
    }

    #[test]
    fn test_short_body_is_malformed() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let mut src = Cursor::new(&raw[..]);
        let frame = read_head(&mut src, 4096).unwrap();
        let err = read_body(&frame, &mut src, 10, 1024).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(ref m) if m.contains("shorter")));
    }

    #[test]
    fn test_extra_buffered_bytes_beyond_content_length_ignored() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\nokTRAILING";
        let mut src = Cursor::new(&raw[..]);
        let frame = read_head(&mut src, 4096).unwrap();
        let body = read_body(&frame, &mut src, 2, 1024).unwrap();
        assert_eq!(&body[..], b"ok");
    }
}
