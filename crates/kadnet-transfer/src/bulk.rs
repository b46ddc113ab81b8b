//! The bulk transfer sub-protocol: HTTP/1.1-compatible GET/PUT exchange of
//! file bytes over a single TCP connection, closed after one request.
//!
//! This shares a listening port with the RPC protocol; the reactor decides
//! which handler a connection belongs to by peeking the stream's first four
//! bytes against the RPC magic before handing the connection to either
//! [`kadnet_proto::wire`] decoding or [`handle_connection`] here.

use crate::error::{Result, TransferError};
use crate::fs::FileStore;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Cap on a request's header block, guarding against a peer that never
/// sends the terminating blank line.
const MAX_HEADER_BYTES: usize = 8 * 1024;

struct RequestLine {
    method: Method,
    name: String,
}

#[derive(PartialEq, Eq)]
enum Method {
    Get,
    Put,
    /// Any verb other than GET/PUT: a well-formed request line, just not
    /// one this sub-protocol serves. Answered with 405, distinct from a
    /// request line that doesn't parse at all (400).
    Other,
}

/// Fetch `name` from `provider`. Returns the file's bytes on success.
///
/// # Errors
///
/// Returns [`TransferError::NotFound`] on a 404-equivalent response (a
/// permanent per-provider failure), or [`TransferError::Io`] /
/// [`TransferError::Protocol`] for any other failure; callers should treat
/// any outcome other than a full, length-matching body as a failure and may
/// retry against the next provider.
pub async fn fetch(provider: SocketAddr, name: &str) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(provider).await?;
    let request = format!("GET /{name} HTTP/1.1\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(&mut stream);
    let (status, content_length) = read_response_head(&mut reader).await?;
    if status == 404 {
        return Err(TransferError::NotFound);
    }
    if status != 200 {
        return Err(TransferError::Protocol(format!("unexpected status {status}")));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Push `bytes` to `receiver` under `name`, replicating a file onto another
/// node's upload area.
///
/// # Errors
///
/// Returns [`TransferError::Protocol`] if the receiver does not answer with
/// a 2xx status, or [`TransferError::Io`] on any I/O failure.
pub async fn push(receiver: SocketAddr, name: &str, bytes: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(receiver).await?;
    let header = format!(
        "PUT /{name} HTTP/1.1\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        bytes.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(&mut stream);
    let (status, _) = read_response_head(&mut reader).await?;
    if !(200..300).contains(&status) {
        return Err(TransferError::Protocol(format!("unexpected status {status}")));
    }
    Ok(())
}

/// Serve a single bulk-transfer exchange on an already-accepted connection,
/// then close it. `store` supplies the upload area (served by GET, written
/// by PUT) independently of the download area.
///
/// # Errors
///
/// Returns an I/O error if the connection is lost mid-exchange. A malformed
/// request is answered with a 400 response rather than surfaced as an
/// error: a malformed peer request never crashes the reactor.
pub async fn handle_connection(mut stream: TcpStream, store: &FileStore) -> Result<()> {
    let mut reader = BufReader::new(&mut stream);
    let (request, content_length) = match read_request_head(&mut reader).await {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "malformed bulk-transfer request");
            write_status(reader.get_mut(), 400, b"").await?;
            return Ok(());
        }
    };

    match request.method {
        Method::Get => match store.read_upload(&request.name).await {
            Ok(bytes) => write_status(reader.get_mut(), 200, &bytes).await?,
            Err(_) => {
                debug!(name = %request.name, "GET for unknown upload");
                write_status(reader.get_mut(), 404, b"").await?
            }
        },
        Method::Put => {
            let mut body = vec![0u8; content_length];
            if reader.read_exact(&mut body).await.is_err() {
                debug!(name = %request.name, "PUT body shorter than declared Content-Length");
                write_status(reader.get_mut(), 400, b"").await?;
                return Ok(());
            }
            match store.write_upload(&request.name, &body).await {
                Ok(()) => write_status(reader.get_mut(), 201, b"").await?,
                Err(err) => {
                    debug!(name = %request.name, error = %err, "failed to write upload");
                    write_status(reader.get_mut(), 500, b"").await?
                }
            }
        }
        Method::Other => {
            debug!(name = %request.name, "request line used a method other than GET/PUT");
            write_status(reader.get_mut(), 405, b"").await?
        }
    }
    Ok(())
}

async fn read_request_head(
    reader: &mut BufReader<&mut TcpStream>,
) -> Result<(RequestLine, usize)> {
    let head = read_until_blank_line(reader).await?;
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| TransferError::Protocol("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("PUT") => Method::Put,
        // Any other verb is a well-formed request this sub-protocol simply
        // doesn't serve; answered with 405 rather than folded into the
        // generic 400 "didn't parse at all" branch below.
        Some(_) => Method::Other,
        None => return Err(TransferError::Protocol("missing method".into())),
    };
    let path = parts
        .next()
        .ok_or_else(|| TransferError::Protocol("missing path".into()))?;
    let name = path.trim_start_matches('/').to_string();
    if name.is_empty() {
        return Err(TransferError::Protocol("empty file name".into()));
    }

    let mut content_length = 0usize;
    for line in lines {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| TransferError::Protocol("bad Content-Length".into()))?;
        }
    }
    Ok((RequestLine { method, name }, content_length))
}

async fn read_response_head(reader: &mut BufReader<&mut TcpStream>) -> Result<(u16, usize)> {
    let head = read_until_blank_line(reader).await?;
    let mut lines = head.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| TransferError::Protocol("empty response".into()))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| TransferError::Protocol("malformed status line".into()))?;

    let mut content_length = 0usize;
    for line in lines {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| TransferError::Protocol("bad Content-Length".into()))?;
        }
    }
    Ok((status, content_length))
}

async fn read_until_blank_line(reader: &mut BufReader<&mut TcpStream>) -> Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if head.len() > MAX_HEADER_BYTES {
            return Err(TransferError::Protocol("header block too large".into()));
        }
        reader.read_exact(&mut byte).await?;
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    head.truncate(head.len() - 4);
    String::from_utf8(head).map_err(|_| TransferError::Protocol("non-UTF-8 header".into()))
}

async fn write_status(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}
