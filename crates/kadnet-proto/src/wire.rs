//! RPC envelope framing and fixed-shape request/response bodies.
//!
//! Every RPC is one fixed-size message: a short header (magic, total size,
//! call type) followed by the caller's [`Peer`] record — present on every
//! message, including responses, so the receiver can always update its
//! routing table from whoever it is talking to — followed by a call-specific
//! body whose size depends only on the call type and the network's
//! configured bucket capacity `k`. There is no variable-length encoding and
//! no implicit struct padding: every field is written and read explicitly.

use crate::error::ProtoError;
use crate::nodeid::NodeId;
use crate::peer::{Peer, PEER_WIRE_SIZE};

/// The four magic bytes that open every RPC message, used to distinguish an
/// RPC stream from a bulk-transfer stream sharing the same listening port.
pub const MAGIC: [u8; 4] = *b"KDMT";

/// Size of the envelope header before the caller's peer record: 4-byte
/// magic, 4-byte packet size, 1-byte call type.
pub const ENVELOPE_HEADER_SIZE: usize = 4 + 4 + 1;

/// Size of the envelope including the caller's peer record, before the
/// call-specific body.
pub const ENVELOPE_SIZE: usize = ENVELOPE_HEADER_SIZE + PEER_WIRE_SIZE;

/// RPC call type tag, carried as a single byte in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallType {
    /// Liveness check, empty body.
    Ping = 1,
    /// Advertise a set of providers for a content key.
    Store = 2,
    /// Request the closest known peers to a target id.
    FindNode = 3,
    /// Request the providers of a content key, or the closest peers.
    FindValue = 4,
    /// LAN discovery datagram; the envelope itself is the payload.
    Broadcast = 5,
    /// Response to [`CallType::Ping`].
    PingResp = 6,
    /// Response to [`CallType::Store`].
    StoreResp = 7,
    /// Response to [`CallType::FindNode`].
    FindNodeResp = 8,
    /// Response to [`CallType::FindValue`].
    FindValueResp = 9,
}

impl CallType {
    fn from_u8(tag: u8) -> Result<Self, ProtoError> {
        Ok(match tag {
            1 => Self::Ping,
            2 => Self::Store,
            3 => Self::FindNode,
            4 => Self::FindValue,
            5 => Self::Broadcast,
            6 => Self::PingResp,
            7 => Self::StoreResp,
            8 => Self::FindNodeResp,
            9 => Self::FindValueResp,
            other => {
                return Err(ProtoError::WireFormat(format!(
                    "unknown call_type tag {other}"
                )))
            }
        })
    }

    /// Expected body size for this call type given a bucket capacity `k`.
    #[must_use]
    pub fn body_size(self, k: usize) -> usize {
        let peer_list = 1 + k * PEER_WIRE_SIZE; // count byte + up to k peers
        match self {
            Self::Ping | Self::Broadcast => 0,
            Self::Store => 32 + peer_list,
            Self::FindNode | Self::FindValue => 32,
            Self::PingResp | Self::StoreResp => 1,
            Self::FindNodeResp => 1 + peer_list,
            Self::FindValueResp => 1 + (32 + peer_list) + peer_list,
        }
    }

    /// Total on-wire message size (envelope + body) for this call type.
    #[must_use]
    pub fn total_size(self, k: usize) -> usize {
        ENVELOPE_SIZE + self.body_size(k)
    }
}

/// A set of providers for a content key, as carried by STORE and
/// FIND_VALUE_RESP bodies. Capped at `k` entries on the wire.
#[derive(Debug, Clone, Default)]
pub struct ProviderList {
    /// The providers, in the order they were written.
    pub peers: Vec<Peer>,
}

impl ProviderList {
    fn encode(&self, out: &mut Vec<u8>, k: usize) {
        let n = self.peers.len().min(k);
        out.push(n as u8);
        for peer in &self.peers[..n] {
            peer.encode(out);
        }
        for _ in n..k {
            out.extend_from_slice(&[0u8; PEER_WIRE_SIZE]);
        }
    }

    fn decode(buf: &[u8], k: usize) -> Result<Self, ProtoError> {
        let count = buf[0] as usize;
        if count > k {
            return Err(ProtoError::WireFormat(format!(
                "provider count {count} exceeds k={k}"
            )));
        }
        let mut peers = Vec::with_capacity(count);
        for i in 0..count {
            let start = 1 + i * PEER_WIRE_SIZE;
            peers.push(Peer::decode(&buf[start..start + PEER_WIRE_SIZE])?);
        }
        Ok(Self { peers })
    }
}

/// The body of a STORE request: a content key plus its current providers.
#[derive(Debug, Clone)]
pub struct StoreBody {
    /// The content key being advertised.
    pub key: NodeId,
    /// The providers advertised for `key`.
    pub providers: ProviderList,
}

/// The body of FIND_NODE / FIND_VALUE requests: the id being searched for.
#[derive(Debug, Clone, Copy)]
pub struct TargetBody {
    /// The node id (FIND_NODE) or content key (FIND_VALUE) being sought.
    pub target: NodeId,
}

/// The body of a PING_RESP / STORE_RESP: a single success flag.
#[derive(Debug, Clone, Copy)]
pub struct SuccessBody {
    /// Whether the request succeeded.
    pub success: bool,
}

/// The body of a FIND_NODE_RESP: the responder's closest known peers.
/// `found` is carried for symmetry with FIND_VALUE_RESP but is always
/// `false` for this call type.
#[derive(Debug, Clone)]
pub struct FindNodeRespBody {
    /// Always `false`: FIND_NODE never resolves to a value.
    pub found: bool,
    /// The closest peers known to the responder.
    pub closest: ProviderList,
}

/// The body of a FIND_VALUE_RESP: either the value's provider set, or
/// (if not held) the responder's closest peers to the key.
#[derive(Debug, Clone)]
pub struct FindValueRespBody {
    /// Whether the responder holds the key.
    pub found: bool,
    /// The key this response answers (mirrors the request; only meaningful
    /// when `found` is true, but always present for a fixed body shape).
    pub key: NodeId,
    /// Providers for `key`, valid iff `found`.
    pub providers: ProviderList,
    /// Closest peers to `key`, valid iff `!found`.
    pub closest: ProviderList,
}

/// The decoded body of an RPC message, tagged by call type.
#[derive(Debug, Clone)]
pub enum RpcBody {
    /// See [`CallType::Ping`].
    Ping,
    /// See [`CallType::Store`].
    Store(StoreBody),
    /// See [`CallType::FindNode`].
    FindNode(TargetBody),
    /// See [`CallType::FindValue`].
    FindValue(TargetBody),
    /// See [`CallType::Broadcast`].
    Broadcast,
    /// See [`CallType::PingResp`].
    PingResp(SuccessBody),
    /// See [`CallType::StoreResp`].
    StoreResp(SuccessBody),
    /// See [`CallType::FindNodeResp`].
    FindNodeResp(FindNodeRespBody),
    /// See [`CallType::FindValueResp`].
    FindValueResp(FindValueRespBody),
}

impl RpcBody {
    /// The call type tag this body encodes under.
    #[must_use]
    pub fn call_type(&self) -> CallType {
        match self {
            Self::Ping => CallType::Ping,
            Self::Store(_) => CallType::Store,
            Self::FindNode(_) => CallType::FindNode,
            Self::FindValue(_) => CallType::FindValue,
            Self::Broadcast => CallType::Broadcast,
            Self::PingResp(_) => CallType::PingResp,
            Self::StoreResp(_) => CallType::StoreResp,
            Self::FindNodeResp(_) => CallType::FindNodeResp,
            Self::FindValueResp(_) => CallType::FindValueResp,
        }
    }

    fn encode(&self, out: &mut Vec<u8>, k: usize) {
        match self {
            Self::Ping | Self::Broadcast => {}
            Self::Store(body) => {
                out.extend_from_slice(body.key.as_bytes());
                body.providers.encode(out, k);
            }
            Self::FindNode(body) | Self::FindValue(body) => {
                out.extend_from_slice(body.target.as_bytes());
            }
            Self::PingResp(body) | Self::StoreResp(body) => {
                out.push(u8::from(body.success));
            }
            Self::FindNodeResp(body) => {
                out.push(u8::from(body.found));
                body.closest.encode(out, k);
            }
            Self::FindValueResp(body) => {
                out.push(u8::from(body.found));
                out.extend_from_slice(body.key.as_bytes());
                body.providers.encode(out, k);
                body.closest.encode(out, k);
            }
        }
    }

    fn decode(call_type: CallType, buf: &[u8], k: usize) -> Result<Self, ProtoError> {
        Ok(match call_type {
            CallType::Ping => Self::Ping,
            CallType::Broadcast => Self::Broadcast,
            CallType::Store => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&buf[0..32]);
                Self::Store(StoreBody {
                    key: NodeId::from_bytes(key),
                    providers: ProviderList::decode(&buf[32..], k)?,
                })
            }
            CallType::FindNode => {
                let mut target = [0u8; 32];
                target.copy_from_slice(&buf[0..32]);
                Self::FindNode(TargetBody {
                    target: NodeId::from_bytes(target),
                })
            }
            CallType::FindValue => {
                let mut target = [0u8; 32];
                target.copy_from_slice(&buf[0..32]);
                Self::FindValue(TargetBody {
                    target: NodeId::from_bytes(target),
                })
            }
            CallType::PingResp => Self::PingResp(SuccessBody { success: buf[0] != 0 }),
            CallType::StoreResp => Self::StoreResp(SuccessBody { success: buf[0] != 0 }),
            CallType::FindNodeResp => Self::FindNodeResp(FindNodeRespBody {
                found: buf[0] != 0,
                closest: ProviderList::decode(&buf[1..], k)?,
            }),
            CallType::FindValueResp => {
                let found = buf[0] != 0;
                let mut key = [0u8; 32];
                key.copy_from_slice(&buf[1..33]);
                let providers_end = 33 + (1 + k * PEER_WIRE_SIZE);
                let providers = ProviderList::decode(&buf[33..providers_end], k)?;
                let closest = ProviderList::decode(&buf[providers_end..], k)?;
                Self::FindValueResp(FindValueRespBody {
                    found,
                    key: NodeId::from_bytes(key),
                    providers,
                    closest,
                })
            }
        })
    }
}

/// A complete RPC message: the caller's peer record plus a typed body.
#[derive(Debug, Clone)]
pub struct RpcMessage {
    /// The peer that sent this message (request or response alike).
    pub caller: Peer,
    /// The message's typed body.
    pub body: RpcBody,
}

impl RpcMessage {
    /// Encode this message to its fixed-size wire form for the given
    /// bucket capacity `k`.
    #[must_use]
    pub fn encode(&self, k: usize) -> Vec<u8> {
        let call_type = self.body.call_type();
        let total = call_type.total_size(k);
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.push(call_type as u8);
        self.caller.encode(&mut out);
        self.body.encode(&mut out, k);
        debug_assert_eq!(out.len(), total);
        out
    }

    /// Decode an RPC message from a buffer holding exactly one message's
    /// worth of bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::WireFormat`] if the magic does not match, the
    /// declared `packet_size` does not equal the buffer length or the
    /// expected fixed size for `k` and the decoded call type, or the buffer
    /// is too short to contain even the envelope.
    pub fn decode(buf: &[u8], k: usize) -> Result<Self, ProtoError> {
        if buf.len() < ENVELOPE_SIZE {
            return Err(ProtoError::WireFormat("buffer shorter than envelope".into()));
        }
        if buf[0..4] != MAGIC {
            return Err(ProtoError::WireFormat("magic mismatch".into()));
        }
        let packet_size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        let call_type = CallType::from_u8(buf[8])?;
        let expected = call_type.total_size(k);
        if packet_size != expected || buf.len() != expected {
            return Err(ProtoError::WireFormat(format!(
                "size mismatch for call_type {:?}: packet_size={packet_size} actual={} expected={expected}",
                call_type,
                buf.len()
            )));
        }
        let caller = Peer::decode(&buf[ENVELOPE_HEADER_SIZE..ENVELOPE_SIZE])?;
        let body = RpcBody::decode(call_type, &buf[ENVELOPE_SIZE..], k)?;
        Ok(Self { caller, body })
    }

    /// Peek at the declared call type and packet size without fully
    /// decoding the message; used by the reactor to know how many more
    /// bytes to read once the header is in hand.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::WireFormat`] if `header` is shorter than
    /// [`ENVELOPE_HEADER_SIZE`] or the magic does not match.
    pub fn peek_header(header: &[u8]) -> Result<(CallType, usize), ProtoError> {
        if header.len() < ENVELOPE_HEADER_SIZE {
            return Err(ProtoError::WireFormat("header too short".into()));
        }
        if header[0..4] != MAGIC {
            return Err(ProtoError::WireFormat("magic mismatch".into()));
        }
        let packet_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let call_type = CallType::from_u8(header[8])?;
        Ok((call_type, packet_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    fn caller() -> Peer {
        Peer::new(NodeId::random(), "127.0.0.1:8182".parse::<SocketAddrV4>().unwrap())
    }

    #[test]
    fn ping_round_trips() {
        let msg = RpcMessage {
            caller: caller(),
            body: RpcBody::Ping,
        };
        let bytes = msg.encode(4);
        assert_eq!(bytes.len(), CallType::Ping.total_size(4));
        let decoded = RpcMessage::decode(&bytes, 4).unwrap();
        assert!(matches!(decoded.body, RpcBody::Ping));
        assert_eq!(decoded.caller.id, msg.caller.id);
    }

    #[test]
    fn store_round_trips_with_providers() {
        let providers = ProviderList {
            peers: vec![caller(), caller()],
        };
        let msg = RpcMessage {
            caller: caller(),
            body: RpcBody::Store(StoreBody {
                key: NodeId::random(),
                providers,
            }),
        };
        let bytes = msg.encode(4);
        let decoded = RpcMessage::decode(&bytes, 4).unwrap();
        match decoded.body {
            RpcBody::Store(body) => assert_eq!(body.providers.peers.len(), 2),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn find_value_resp_round_trips_not_found_branch() {
        let msg = RpcMessage {
            caller: caller(),
            body: RpcBody::FindValueResp(FindValueRespBody {
                found: false,
                key: NodeId::random(),
                providers: ProviderList::default(),
                closest: ProviderList {
                    peers: vec![caller()],
                },
            }),
        };
        let bytes = msg.encode(4);
        let decoded = RpcMessage::decode(&bytes, 4).unwrap();
        match decoded.body {
            RpcBody::FindValueResp(body) => {
                assert!(!body.found);
                assert_eq!(body.closest.peers.len(), 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = RpcMessage {
            caller: caller(),
            body: RpcBody::Ping,
        }
        .encode(4);
        bytes[0] = b'X';
        assert!(RpcMessage::decode(&bytes, 4).is_err());
    }

    #[test]
    fn decode_rejects_size_mismatch() {
        let mut bytes = RpcMessage {
            caller: caller(),
            body: RpcBody::Ping,
        }
        .encode(4);
        let bad_size = (bytes.len() as u32 + 1).to_le_bytes();
        bytes[4..8].copy_from_slice(&bad_size);
        assert!(RpcMessage::decode(&bytes, 4).is_err());
    }

    #[test]
    fn peek_header_reports_call_type_and_size() {
        let bytes = RpcMessage {
            caller: caller(),
            body: RpcBody::Ping,
        }
        .encode(4);
        let (call_type, size) = RpcMessage::peek_header(&bytes[..ENVELOPE_HEADER_SIZE]).unwrap();
        assert_eq!(call_type, CallType::Ping);
        assert_eq!(size, bytes.len());
    }
}
