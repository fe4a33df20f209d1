//! Wake-on-LAN magic packet construction, validation and broadcast.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Every magic packet starts with six 0xff bytes.
const SYNCHRONIZATION_SCHEME: [u8; 6] = [0xff; 6];

/// Hardware addresses are six bytes on the wire.
pub const HW_ADDR_LEN: usize = 6;

/// The target address is repeated this many times after the prefix.
const HW_ADDR_REPEATS: usize = 16;

/// Total size of a magic packet: prefix plus sixteen address repetitions.
pub const PACKET_LEN: usize = HW_ADDR_LEN + HW_ADDR_REPEATS * HW_ADDR_LEN;

/// Magic packets go to the limited broadcast address on the conventional
/// wake-on-lan port. The protocol itself does not mandate a port; 9 is the
/// de-facto standard.
const BROADCAST_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::BROADCAST, 9);

#[derive(thiserror::Error, Debug)]
pub enum WakeError {
    #[error("invalid mac address: {0}")]
    InvalidMac(String),
    #[error("invalid ip: {0}")]
    InvalidIp(String),
    #[error("short write: {sent} of {} bytes sent", PACKET_LEN)]
    ShortWrite { sent: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A wake-on-lan magic packet for a single hardware address.
pub struct MagicPacket([u8; PACKET_LEN]);

impl MagicPacket {
    /// Builds the magic packet for `hw_addr`.
    pub fn new(hw_addr: [u8; HW_ADDR_LEN]) -> MagicPacket {
        let mut buf = [0u8; PACKET_LEN];
        buf[..HW_ADDR_LEN].copy_from_slice(&SYNCHRONIZATION_SCHEME);
        for repeat in buf[HW_ADDR_LEN..].chunks_exact_mut(HW_ADDR_LEN) {
            repeat.copy_from_slice(&hw_addr);
        }
        MagicPacket(buf)
    }

    /// Returns the hardware address of the target computer. The result is a
    /// copy, not a view into the packet buffer.
    pub fn hardware_addr(&self) -> [u8; HW_ADDR_LEN] {
        let mut addr = [0u8; HW_ADDR_LEN];
        addr.copy_from_slice(&self.0[HW_ADDR_LEN..2 * HW_ADDR_LEN]);
        addr
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Reports whether `b` is a magic packet: 102 bytes, the synchronization
/// prefix, then one 6-byte address repeated sixteen times with no deviation.
pub fn is_magic_packet(b: &[u8]) -> bool {
    if b.len() != PACKET_LEN {
        return false;
    }
    if b[..HW_ADDR_LEN] != SYNCHRONIZATION_SCHEME {
        return false;
    }
    let hw_addr = &b[HW_ADDR_LEN..2 * HW_ADDR_LEN];
    b[HW_ADDR_LEN..]
        .chunks_exact(HW_ADDR_LEN)
        .all(|repeat| repeat == hw_addr)
}

/// Parses a hardware address of six two-digit hex octets separated by colons
/// or hyphens, e.g. `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(s: &str) -> Result<[u8; HW_ADDR_LEN], WakeError> {
    let sep = if s.contains('-') { '-' } else { ':' };
    let mut addr = [0u8; HW_ADDR_LEN];
    let mut octets = 0;
    for (i, octet) in s.split(sep).enumerate() {
        if i >= HW_ADDR_LEN || octet.len() != 2 {
            return Err(WakeError::InvalidMac(s.to_string()));
        }
        addr[i] = u8::from_str_radix(octet, 16)
            .map_err(|_| WakeError::InvalidMac(s.to_string()))?;
        octets = i + 1;
    }
    if octets != HW_ADDR_LEN {
        return Err(WakeError::InvalidMac(s.to_string()));
    }
    Ok(addr)
}

/// Sends a magic packet for `hw_addr` to the broadcast address. If `src` is
/// given it is used as the local address for the broadcast, selecting which
/// interface carries the packet.
///
/// A successful return means the datagram was accepted for transmission,
/// nothing more: wake-on-lan is unconfirmed by design.
pub fn wake(src: Option<IpAddr>, hw_addr: [u8; HW_ADDR_LEN]) -> Result<(), WakeError> {
    let local = match src {
        Some(ip) => SocketAddr::new(ip, 0),
        None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local)?;
    socket.set_broadcast(true)?;
    let packet = MagicPacket::new(hw_addr);
    let sent = socket.send_to(packet.as_bytes(), BROADCAST_ADDR)?;
    completed(sent)
}

// UDP sends are atomic, so the transport accepting fewer bytes than the
// packet length is an abnormal condition and surfaces as its own error.
// Checked only after a successful send: a send error and a short count are
// mutually exclusive.
fn completed(sent: usize) -> Result<(), WakeError> {
    if sent < PACKET_LEN {
        return Err(WakeError::ShortWrite { sent });
    }
    Ok(())
}

/// Sends a magic packet for `mac_addr`, given in text form. If `src_ip` is
/// given it is used as the local address for the broadcast. Parse failures
/// name the offending value and happen before any socket is opened.
pub fn wake_str(src_ip: Option<&str>, mac_addr: &str) -> Result<(), WakeError> {
    let hw_addr = parse_mac(mac_addr)?;
    let src = match src_ip {
        Some(ip) => Some(
            ip.parse()
                .map_err(|_| WakeError::InvalidIp(ip.to_string()))?,
        ),
        None => None,
    };
    wake(src, hw_addr)
}
