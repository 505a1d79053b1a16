use std::io;
use std::net::{Ipv4Addr, UdpSocket};

use thiserror::Error;
use tracing::debug;

/// Receive buffer size; frames are 512 bytes but peers may send more.
const MAX_DATAGRAM_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind udp port {port}: {source}")]
    PortBind { port: u16, source: io::Error },
}

/// One nonblocking loopback socket per configured input port. The first
/// socket doubles as the send socket; peers do not inspect source ports.
#[derive(Debug)]
pub struct RipTransport {
    sockets: Vec<UdpSocket>,
}

impl RipTransport {
    pub fn bind(input_ports: &[u16]) -> Result<Self, TransportError> {
        let mut sockets = Vec::with_capacity(input_ports.len());
        for &port in input_ports {
            let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port))
                .map_err(|source| TransportError::PortBind { port, source })?;
            socket
                .set_nonblocking(true)
                .map_err(|source| TransportError::PortBind { port, source })?;
            sockets.push(socket);
        }
        Ok(Self { sockets })
    }

    /// Zero-timeout readiness sweep: at most one datagram per socket per
    /// call, so timers are never starved by a chatty peer.
    pub fn recv_ready(&self) -> Vec<Vec<u8>> {
        let mut datagrams = Vec::new();
        let mut buf = [0_u8; MAX_DATAGRAM_LEN];
        for socket in &self.sockets {
            match socket.recv_from(&mut buf) {
                Ok((len, _addr)) => datagrams.push(buf[..len].to_vec()),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => debug!("recv error ignored: {err}"),
            }
        }
        datagrams
    }

    pub fn send(&self, frame: &[u8], port: u16) -> io::Result<usize> {
        let Some(socket) = self.sockets.first() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no input sockets bound",
            ));
        };
        socket.send_to(frame, (Ipv4Addr::LOCALHOST, port))
    }
}
