//! The RPC client side: open one TCP stream, send one request, read one
//! response, close.

use crate::error::{NodeError, Result};
use kadnet_proto::wire::{CallType, RpcMessage, ENVELOPE_HEADER_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Send `request` to `addr` and return its response, or [`NodeError::Timeout`]
/// if `deadline` elapses before the whole exchange completes.
///
/// Any I/O or wire-format failure (connection refused, truncated read, size
/// mismatch) surfaces as its own error; callers treat this as "this peer
/// unavailable for this attempt" and move on rather than propagating it
/// further.
pub async fn call(addr: SocketAddr, request: RpcMessage, k: usize, deadline: Duration) -> Result<RpcMessage> {
    tokio::time::timeout(deadline, call_inner(addr, request, k))
        .await
        .map_err(|_| NodeError::Timeout)?
}

async fn call_inner(addr: SocketAddr, request: RpcMessage, k: usize) -> Result<RpcMessage> {
    let mut stream = TcpStream::connect(addr).await?;
    let bytes = request.encode(k);
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    let mut header = [0u8; ENVELOPE_HEADER_SIZE];
    stream.read_exact(&mut header).await?;
    let (_call_type, packet_size) = RpcMessage::peek_header(&header)?;
    if packet_size < ENVELOPE_HEADER_SIZE || packet_size > CallType::FindValueResp.total_size(k) {
        return Err(NodeError::Proto(kadnet_proto::ProtoError::WireFormat(
            format!("declared packet_size {packet_size} is not a valid response size"),
        )));
    }

    let mut buf = vec![0u8; packet_size];
    buf[..ENVELOPE_HEADER_SIZE].copy_from_slice(&header);
    stream.read_exact(&mut buf[ENVELOPE_HEADER_SIZE..]).await?;

    Ok(RpcMessage::decode(&buf, k)?)
}
