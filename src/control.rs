//! The control channel: a minimal TCP rendezvous for root-pointer exchange and the end-of-run
//! handshake.
//!
//! This is the one piece of the system that is not expressed in terms of `rma::RemoteMemory` — it
//! exists to *set up* the fabric (agree on the root pointer) and to *wind a run down* (confirm
//! every client has stopped issuing operations before anyone tears down their pool), not to carry
//! table traffic. Per the crate's scope, it is deliberately small: one reliable point-to-point
//! message type, four `u64` fields, used twice.

use std::io::{self, Read, Write as IoWrite};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::rma::NodeId;

/// A message on the control channel: up to four 64-bit fields.
///
/// The root-pointer exchange only ever populates field 0 (the root's address; its owner is the
/// host's configured node id, already known to every peer); the end-of-run handshake sends an
/// all-zero message and only cares that it arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Message {
    pub fields: [u64; 4],
}

impl Message {
    pub const SIZE: usize = 4 * 8;

    fn to_bytes(self) -> [u8; Message::SIZE] {
        let mut buf = [0u8; Message::SIZE];
        for (i, field) in self.fields.iter().enumerate() {
            buf[i * 8..(i + 1) * 8].copy_from_slice(&field.to_be_bytes());
        }
        buf
    }

    fn from_bytes(buf: [u8; Message::SIZE]) -> Message {
        let mut fields = [0u64; 4];
        for (i, field) in fields.iter_mut().enumerate() {
            *field = u64::from_be_bytes(buf[i * 8..(i + 1) * 8].try_into().unwrap());
        }
        Message { fields }
    }
}

fn send(stream: &mut TcpStream, msg: Message) -> io::Result<()> {
    stream.write_all(&msg.to_bytes())
}

fn recv(stream: &mut TcpStream) -> io::Result<Message> {
    let mut buf = [0u8; Message::SIZE];
    stream.read_exact(&mut buf)?;
    Ok(Message::from_bytes(buf))
}

/// The host's side of the channel: it accepts a connection from every peer, and is the rendezvous
/// point for both handshakes.
pub struct Host {
    listener: TcpListener,
    peers: Vec<TcpStream>,
}

impl Host {
    /// Bind the listening socket. Call `accept_peers` once every peer is expected to dial in.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Host> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Bootstrap(format!("failed to bind control channel: {}", e)))?;
        Ok(Host { listener, peers: Vec::new() })
    }

    /// The address this host ended up bound to (useful when binding to port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Block until `peer_count` non-host nodes have connected.
    pub fn accept_peers(&mut self, peer_count: usize) -> Result<()> {
        self.peers.reserve(peer_count);
        for _ in 0..peer_count {
            let (stream, _) = self
                .listener
                .accept()
                .map_err(|e| Error::Bootstrap(format!("failed to accept peer: {}", e)))?;
            self.peers.push(stream);
        }
        Ok(())
    }

    /// Broadcast the root pointer's address to every connected peer.
    pub fn publish_root(&mut self, host_id: NodeId, root_address: u64) -> Result<()> {
        let msg = Message { fields: [root_address, host_id as u64, 0, 0] };
        for peer in &mut self.peers {
            send(peer, msg).map_err(|e| Error::Bootstrap(format!("root publish failed: {}", e)))?;
        }
        Ok(())
    }

    /// Block until every peer has sent the end-of-run message, then broadcast the ack.
    pub fn await_drain(&mut self) -> Result<()> {
        for peer in &mut self.peers {
            recv(peer).map_err(|e| Error::Bootstrap(format!("drain recv failed: {}", e)))?;
        }
        let ack = Message::default();
        for peer in &mut self.peers {
            send(peer, ack).map_err(|e| Error::Bootstrap(format!("drain ack failed: {}", e)))?;
        }
        Ok(())
    }
}

/// A non-host node's side of the channel.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connect to the host.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Client> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::Bootstrap(format!("failed to connect to host: {}", e)))?;
        Ok(Client { stream })
    }

    /// Block for the host's root-pointer broadcast, returning `(host_id, root_address)`.
    pub fn receive_root(&mut self) -> Result<(NodeId, u64)> {
        let msg = recv(&mut self.stream)
            .map_err(|e| Error::Bootstrap(format!("root receive failed: {}", e)))?;
        Ok((msg.fields[1] as NodeId, msg.fields[0]))
    }

    /// Signal this client is done issuing operations, then block for the host's ack.
    pub fn signal_drain(&mut self) -> Result<()> {
        send(&mut self.stream, Message::default())
            .map_err(|e| Error::Bootstrap(format!("drain signal failed: {}", e)))?;
        recv(&mut self.stream)
            .map_err(|e| Error::Bootstrap(format!("drain ack receive failed: {}", e)))?;
        Ok(())
    }
}
