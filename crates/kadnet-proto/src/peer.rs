//! Peer records: a node's id, address, and reserved public-key slot.

use crate::nodeid::NodeId;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Instant;

/// Fixed on-wire size of a serialised [`Peer`]: 32-byte id, 16-byte address
/// (2-byte family + 2-byte port + 4-byte IPv4 + 8 bytes padding), 32-byte
/// reserved public key.
pub const PEER_WIRE_SIZE: usize = 32 + 16 + 32;

const ADDR_FAMILY_INET: u16 = 2;

/// A peer known to this node: its identity, network address, and the last
/// time it was observed. Equality and hashing are by `id` alone.
#[derive(Clone, Debug)]
pub struct Peer {
    /// The peer's 256-bit identifier.
    pub id: NodeId,
    /// The peer's IPv4 address and port.
    pub address: SocketAddrV4,
    /// Local wall-clock time this peer was last observed (ping, response,
    /// or broadcast). Not part of the wire form.
    pub last_seen: Instant,
    /// Reserved 32-byte public-key slot. Unused by the current protocol;
    /// transport encryption is a declared non-goal.
    pub public_key: [u8; 32],
}

impl Peer {
    /// Construct a peer observed right now, with an all-zero public key.
    #[must_use]
    pub fn new(id: NodeId, address: SocketAddrV4) -> Self {
        Self {
            id,
            address,
            last_seen: Instant::now(),
            public_key: [0u8; 32],
        }
    }

    /// Address as a generic [`SocketAddr`], for use with tokio's networking
    /// types.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.address)
    }

    /// Encode this peer in its fixed 80-byte wire form.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&ADDR_FAMILY_INET.to_le_bytes());
        out.extend_from_slice(&self.address.port().to_be_bytes());
        out.extend_from_slice(&self.address.ip().octets());
        out.extend_from_slice(&[0u8; 8]); // padding, matches the C sockaddr_in layout
        out.extend_from_slice(&self.public_key);
    }

    /// Decode a peer from its fixed wire form. `buf` must be exactly
    /// [`PEER_WIRE_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ProtoError::WireFormat`] if `buf` is the
    /// wrong length.
    pub fn decode(buf: &[u8]) -> Result<Self, crate::error::ProtoError> {
        if buf.len() != PEER_WIRE_SIZE {
            return Err(crate::error::ProtoError::WireFormat(format!(
                "peer record is {} bytes, expected {PEER_WIRE_SIZE}",
                buf.len()
            )));
        }
        let mut id_bytes = [0u8; 32];
        id_bytes.copy_from_slice(&buf[0..32]);
        let port = u16::from_be_bytes([buf[34], buf[35]]);
        let ip = Ipv4Addr::new(buf[36], buf[37], buf[38], buf[39]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&buf[48..80]);
        Ok(Self {
            id: NodeId::from_bytes(id_bytes),
            address: SocketAddrV4::new(ip, port),
            last_seen: Instant::now(),
            public_key,
        })
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}
