//! Line-delimited request framing.
//!
//! ```text
//! METHOD PATH [HTTP/1.x]\r\n
//! Header-Name: value\r\n
//! ...\r\n
//! \r\n
//! <Content-Length bytes of body>
//! ```
//!
//! Bare `\n` line endings are accepted. A request without `Content-Length`
//! has an empty body.

use axum::body::Body;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the request line plus header block.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Empty request line")]
    MissingRequestLine,

    #[error("Malformed request line: {0:?}")]
    BadRequestLine(String),

    #[error("Malformed header line: {0:?}")]
    BadHeader(String),

    #[error("Connection closed before the header block ended")]
    UnterminatedHeaders,

    #[error("Request head exceeds {} bytes", MAX_HEAD_BYTES)]
    HeadTooLarge,

    #[error("Invalid Content-Length: {0:?}")]
    BadContentLength(String),

    #[error("Body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("Body truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One framed request, not yet handed to the router.
#[derive(Debug)]
pub struct FramedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FramedRequest {
    pub fn into_http(self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read one request. `Ok(None)` means the peer closed the connection
/// before sending anything.
pub async fn read_request<R>(
    reader: &mut R,
    max_body: usize,
) -> Result<Option<FramedRequest>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEAD_BYTES;

    let Some(request_line) = read_line(reader, &mut budget).await? else {
        return Ok(None);
    };
    let (method, uri) = parse_request_line(&request_line)?;

    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(reader, &mut budget)
            .await?
            .ok_or(FramingError::UnterminatedHeaders)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = parse_header(&line)?;
        headers.append(name, value);
    }

    let length = content_length(&headers)?;
    if length > max_body {
        return Err(FramingError::BodyTooLarge {
            length,
            limit: max_body,
        });
    }

    let mut body = Vec::with_capacity(length);
    (&mut *reader)
        .take(length as u64)
        .read_to_end(&mut body)
        .await?;
    if body.len() < length {
        return Err(FramingError::Truncated {
            expected: length,
            received: body.len(),
        });
    }

    Ok(Some(FramedRequest {
        method,
        uri,
        headers,
        body,
    }))
}

/// Read one line without its terminator, charging it against `budget`.
/// Returns `None` at end of input.
async fn read_line<R>(reader: &mut R, budget: &mut usize) -> Result<Option<String>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let read = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut raw)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if !raw.ends_with(b"\n") {
        return if read == *budget {
            Err(FramingError::HeadTooLarge)
        } else {
            Err(FramingError::UnterminatedHeaders)
        };
    }
    *budget -= read;

    raw.pop();
    if raw.ends_with(b"\r") {
        raw.pop();
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|e| FramingError::BadHeader(String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

fn parse_request_line(line: &str) -> Result<(Method, Uri), FramingError> {
    let bad = || FramingError::BadRequestLine(line.to_string());

    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or(FramingError::MissingRequestLine)?;
    let target = parts.next().ok_or_else(bad)?;
    if let Some(version) = parts.next() {
        if !version.starts_with("HTTP/1.") {
            return Err(bad());
        }
    }
    if parts.next().is_some() || !target.starts_with('/') {
        return Err(bad());
    }

    let method = Method::from_bytes(method.as_bytes()).map_err(|_| bad())?;
    let uri = target.parse::<Uri>().map_err(|_| bad())?;
    Ok((method, uri))
}

fn parse_header(line: &str) -> Result<(HeaderName, HeaderValue), FramingError> {
    let bad = || FramingError::BadHeader(line.to_string());

    let (name, value) = line.split_once(':').ok_or_else(bad)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| bad())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| bad())?;
    Ok((name, value))
}

fn content_length(headers: &HeaderMap) -> Result<usize, FramingError> {
    let mut values = headers.get_all(CONTENT_LENGTH).iter();
    let Some(value) = values.next() else {
        return Ok(0);
    };
    let raw = value.to_str().unwrap_or_default();
    if values.next().is_some() {
        return Err(FramingError::BadContentLength(format!("{raw} (repeated)")));
    }
    raw.trim()
        .parse()
        .map_err(|_| FramingError::BadContentLength(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a response in HTTP/1.1 form and flush. The connection is always
/// closed afterwards, so `Connection: close` is set.
pub async fn write_response<W>(writer: &mut W, response: Response<Body>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(std::io::Error::other)?;

    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    );
    for (name, value) in &parts.headers {
        if name == CONTENT_LENGTH || name == axum::http::header::CONNECTION {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    head.push_str(&format!("content-length: {}\r\n", body.len()));
    head.push_str("connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    async fn parse(raw: &[u8]) -> Result<Option<FramedRequest>, FramingError> {
        let mut reader = raw;
        read_request(&mut reader, 1024).await
    }

    #[tokio::test]
    async fn parses_request_line_headers_and_body() {
        let request = parse(b"POST /api/v1/jobs HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 4\r\n\r\n{}\r\n")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.uri.path(), "/api/v1/jobs");
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.body, b"{}\r\n");
    }

    #[tokio::test]
    async fn accepts_bare_newlines_and_missing_version() {
        let request = parse(b"GET /health\n\n").await.unwrap().unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn closed_connection_yields_none() {
        assert!(parse(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_empty_or_malformed_request_lines() {
        assert_matches!(parse(b"\r\n\r\n").await, Err(FramingError::MissingRequestLine));
        assert_matches!(parse(b"GET\r\n\r\n").await, Err(FramingError::BadRequestLine(_)));
        assert_matches!(
            parse(b"GET health HTTP/1.1\r\n\r\n").await,
            Err(FramingError::BadRequestLine(_))
        );
        assert_matches!(
            parse(b"GET /health SPDY/3\r\n\r\n").await,
            Err(FramingError::BadRequestLine(_))
        );
    }

    #[tokio::test]
    async fn rejects_header_without_colon() {
        assert_matches!(
            parse(b"GET /health\r\nnot a header\r\n\r\n").await,
            Err(FramingError::BadHeader(_))
        );
    }

    #[tokio::test]
    async fn rejects_unterminated_header_block() {
        assert_matches!(
            parse(b"GET /health\r\nAccept: */*\r\n").await,
            Err(FramingError::UnterminatedHeaders)
        );
    }

    #[tokio::test]
    async fn rejects_bad_or_oversized_content_length() {
        assert_matches!(
            parse(b"POST /x\r\nContent-Length: lots\r\n\r\n").await,
            Err(FramingError::BadContentLength(_))
        );
        assert_matches!(
            parse(b"POST /x\r\nContent-Length: 4096\r\n\r\n").await,
            Err(FramingError::BodyTooLarge { length: 4096, limit: 1024 })
        );
    }

    #[tokio::test]
    async fn rejects_truncated_body() {
        assert_matches!(
            parse(b"POST /x\r\nContent-Length: 10\r\n\r\nabc").await,
            Err(FramingError::Truncated { expected: 10, received: 3 })
        );
    }

    #[tokio::test]
    async fn rejects_oversized_head() {
        let mut raw = b"GET /x\r\nX-Padding: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEAD_BYTES));
        raw.extend_from_slice(b"\r\n\r\n");
        assert_matches!(parse(&raw).await, Err(FramingError::HeadTooLarge));
    }

    #[tokio::test]
    async fn writes_status_line_headers_and_length() {
        let response = Response::builder()
            .status(404)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let mut out = Vec::new();
        write_response(&mut out, response).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("content-type: application/json\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n{}"));
    }
}
