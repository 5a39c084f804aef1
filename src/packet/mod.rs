use std::str::FromStr;

pub mod buffer;
pub mod checksum;
pub mod headers;

pub use self::buffer::PacketBuffer;

use self::checksum::{crc32c, internet_checksum};
use self::headers::{
    DataChunkHeader, EthernetHeader, ExportPduHeader, Ipv4Header, PseudoHeader, SctpHeader,
    TcpHeader, UdpHeader, ETH_DEST_ADDR, ETH_SRC_ADDR, IP_DST, IP_SRC, MIN_ETHERNET_FRAME,
};

/// A source/destination port pair, swapped when a packet runs outbound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortPair {
    pub src: u16,
    pub dst: u16,
}

impl PortPair {
    fn oriented(self, is_outbound: bool) -> (u16, u16) {
        if is_outbound {
            (self.dst, self.src)
        } else {
            (self.src, self.dst)
        }
    }
}

impl FromStr for PortPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ',');
        let src = parts.next().unwrap_or_default();
        let dst = parts.next().ok_or_else(|| format!("expected SRC,DST ports, got '{}'", s))?;
        Ok(PortPair {
            src: src.trim().parse().map_err(|e| format!("bad source port '{}': {}", src, e))?,
            dst: dst.trim().parse().map_err(|e| format!("bad destination port '{}': {}", dst, e))?,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SctpSpec {
    pub ports: PortPair,
    pub tag: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DataChunkSpec {
    pub chunk_type: u8,
    pub flags: u8,
    pub tsn: u32,
    pub sid: u16,
    pub ssn: u16,
    pub ppid: u32,
}

impl Default for DataChunkSpec {
    fn default() -> Self {
        DataChunkSpec {
            chunk_type: 0, // DATA
            flags: DataChunkHeader::FLAGS_UNFRAGMENTED,
            tsn: 0,
            sid: 0,
            ssn: 0,
            ppid: 0,
        }
    }
}

/// The resolved set of headers to synthesize in front of each payload.
/// Selecting a transport implies the layers below it, so by the time this
/// struct exists every required lower layer is populated.
#[derive(Clone, Debug, Default)]
pub struct HeaderSpec {
    pub ethernet: Option<u16>, // EtherType
    pub ipv4: Option<u8>,      // protocol number
    pub udp: Option<PortPair>,
    pub tcp: Option<PortPair>,
    pub sctp: Option<SctpSpec>,
    pub data_chunk: Option<DataChunkSpec>,
    pub export_pdu: Option<String>, // protocol name
}

impl HeaderSpec {
    /// Total size of the enabled headers. Constant for a whole import, which
    /// is what lets the packet buffer reserve exact headroom up front.
    pub fn prefix_length(&self) -> usize {
        let mut len = 0;
        if let Some(payload) = &self.export_pdu {
            len += ExportPduHeader::SIZE + payload.len() + ExportPduHeader::END_OF_OPTIONS_SIZE;
        }
        if self.data_chunk.is_some() {
            len += DataChunkHeader::SIZE;
        }
        if self.sctp.is_some() {
            len += SctpHeader::SIZE;
        }
        if self.udp.is_some() {
            len += UdpHeader::SIZE;
        }
        if self.tcp.is_some() {
            len += TcpHeader::SIZE;
        }
        if self.ipv4.is_some() {
            len += Ipv4Header::SIZE;
        }
        if self.ethernet.is_some() {
            len += EthernetHeader::SIZE;
        }
        len
    }
}

/// One TCP sequence counter per direction, shared by every packet of an
/// import. A record carries its own direction's counter as its sequence
/// number and acknowledges the opposite one.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpFlow {
    pub seq_in: u32,
    pub seq_out: u32,
}

impl TcpFlow {
    fn advance(&mut self, is_outbound: bool, len: u32) {
        let counter = if is_outbound { &mut self.seq_out } else { &mut self.seq_in };
        *counter = counter.wrapping_add(len);
    }
}

pub struct FrameLayout {
    /// Headers, payload, chunk padding and Ethernet trailer together.
    pub total_len: usize,
    /// Payload length after chunk padding; what the packet start offset
    /// advances by.
    pub payload_len: usize,
}

/// SCTP chunks align the following data to 4 bytes.
pub fn padding_bytes(length: usize) -> usize {
    match length % 4 {
        0 => 0,
        r => 4 - r,
    }
}

/// Builds the enabled header stack in front of the payload sitting in `buf`.
///
/// Field values must be fixed before checksums run, and the transport
/// checksums need the pseudo-header of the IP layer, so headers are computed
/// outermost first and each one is byte-complete before it is copied into the
/// frame.
pub fn assemble_frame(
    spec: &HeaderSpec,
    is_outbound: bool,
    has_direction: bool,
    flow: &mut TcpFlow,
    buf: &mut PacketBuffer,
) -> FrameLayout {
    let payload_len = buf.curr_offset();

    // Length bookkeeping, innermost layer first. proto_length is the length
    // at the transport boundary, used by the UDP length field and the
    // checksum pseudo-header; ip_length additionally covers chunk padding.
    let mut prefix_length = 0usize;
    let mut proto_length = 0usize;
    let mut ip_length = 0usize;
    if let Some(payload) = &spec.export_pdu {
        prefix_length += ExportPduHeader::SIZE + payload.len() + ExportPduHeader::END_OF_OPTIONS_SIZE;
        proto_length = prefix_length + payload_len;
    }
    if spec.data_chunk.is_some() {
        prefix_length += DataChunkHeader::SIZE;
    }
    if spec.sctp.is_some() {
        prefix_length += SctpHeader::SIZE;
    }
    if spec.udp.is_some() {
        prefix_length += UdpHeader::SIZE;
        proto_length = prefix_length + payload_len;
    }
    if spec.tcp.is_some() {
        prefix_length += TcpHeader::SIZE;
        proto_length = prefix_length + payload_len;
    }
    if spec.ipv4.is_some() {
        prefix_length += Ipv4Header::SIZE;
        ip_length = prefix_length
            + payload_len
            + if spec.data_chunk.is_some() { padding_bytes(payload_len) } else { 0 };
    }
    if spec.ethernet.is_some() {
        prefix_length += EthernetHeader::SIZE;
    }
    debug_assert_eq!(prefix_length, buf.headroom());

    // the trailer pads short frames to the Ethernet minimum; its length is
    // fixed before chunk padding joins the payload
    let mut eth_trailer_length = 0;
    if spec.ethernet.is_some() && prefix_length + payload_len < MIN_ETHERNET_FRAME {
        eth_trailer_length = MIN_ETHERNET_FRAME - (prefix_length + payload_len);
    }

    let (head, tail) = buf.split_frame();
    let (ip_src, ip_dst) = if is_outbound { (IP_DST, IP_SRC) } else { (IP_SRC, IP_DST) };
    let mut index = 0usize;

    if let Some(l3pid) = spec.ethernet {
        let (dest_addr, src_addr) = if is_outbound {
            (ETH_SRC_ADDR, ETH_DEST_ADDR)
        } else {
            (ETH_DEST_ADDR, ETH_SRC_ADDR)
        };
        let hdr = EthernetHeader { dest_addr, src_addr, l3pid };
        head[index..index + EthernetHeader::SIZE].copy_from_slice(&hdr.to_bytes());
        index += EthernetHeader::SIZE;
    }

    if let Some(protocol) = spec.ipv4 {
        let mut hdr = Ipv4Header::new(protocol, ip_length as u16, ip_src, ip_dst);
        hdr.hdr_checksum = internet_checksum(&[&hdr.to_bytes()]);
        head[index..index + Ipv4Header::SIZE].copy_from_slice(&hdr.to_bytes());
        index += Ipv4Header::SIZE;
    }

    let pseudo = PseudoHeader {
        src_addr: ip_src,
        dest_addr: ip_dst,
        zero: 0,
        protocol: spec.ipv4.unwrap_or(0),
        length: proto_length as u16,
    };

    if let Some(ports) = spec.udp {
        let (source_port, dest_port) = ports.oriented(is_outbound);
        let mut hdr = UdpHeader {
            source_port,
            dest_port,
            length: proto_length as u16,
            checksum: 0,
        };
        hdr.checksum =
            internet_checksum(&[&pseudo.to_bytes(), &hdr.to_bytes(), &tail[..payload_len]]);
        head[index..index + UdpHeader::SIZE].copy_from_slice(&hdr.to_bytes());
        index += UdpHeader::SIZE;
    }

    if let Some(ports) = spec.tcp {
        let (source_port, dest_port) = ports.oriented(is_outbound);
        let (flags, ack_num) = if has_direction {
            // acknowledge everything seen from the opposite direction
            let ack = if is_outbound { flow.seq_in } else { flow.seq_out };
            (TcpHeader::FLAG_ACK, ack)
        } else {
            (0, 0)
        };
        let seq_num = if is_outbound { flow.seq_out } else { flow.seq_in };
        let mut hdr = TcpHeader {
            source_port,
            dest_port,
            seq_num,
            ack_num,
            hdr_length: TcpHeader::HDR_LENGTH,
            flags,
            window: TcpHeader::WINDOW,
            checksum: 0,
            urg: 0,
        };
        hdr.checksum =
            internet_checksum(&[&pseudo.to_bytes(), &hdr.to_bytes(), &tail[..payload_len]]);
        head[index..index + TcpHeader::SIZE].copy_from_slice(&hdr.to_bytes());
        index += TcpHeader::SIZE;
        flow.advance(is_outbound, payload_len as u32);
    }

    // chunk padding joins the payload before the SCTP checksum runs
    let mut padded_len = payload_len;
    let mut chunk_bytes: Option<[u8; DataChunkHeader::SIZE]> = None;
    if let Some(chunk) = spec.data_chunk {
        let hdr = DataChunkHeader {
            chunk_type: chunk.chunk_type,
            flags: chunk.flags,
            length: (payload_len + DataChunkHeader::SIZE) as u16,
            tsn: chunk.tsn,
            sid: chunk.sid,
            ssn: chunk.ssn,
            ppid: chunk.ppid,
        };
        chunk_bytes = Some(hdr.to_bytes());
        let padding = padding_bytes(payload_len);
        for b in &mut tail[payload_len..payload_len + padding] {
            *b = 0;
        }
        padded_len += padding;
    }

    if let Some(sctp) = spec.sctp {
        let (src_port, dest_port) = sctp.ports.oriented(is_outbound);
        let mut hdr = SctpHeader {
            src_port,
            dest_port,
            tag: sctp.tag,
            checksum: 0,
        };
        hdr.checksum = match &chunk_bytes {
            Some(chunk) => crc32c(&[&hdr.to_bytes(), chunk, &tail[..padded_len]]),
            None => crc32c(&[&hdr.to_bytes(), &tail[..padded_len]]),
        };
        head[index..index + SctpHeader::SIZE].copy_from_slice(&hdr.to_bytes());
        index += SctpHeader::SIZE;
    }

    if let Some(chunk) = &chunk_bytes {
        head[index..index + DataChunkHeader::SIZE].copy_from_slice(chunk);
        index += DataChunkHeader::SIZE;
    }

    if let Some(payload) = &spec.export_pdu {
        let hdr = ExportPduHeader {
            tag_type: ExportPduHeader::TAG_PROTO_NAME,
            payload_len: payload.len() as u16,
        };
        head[index..index + ExportPduHeader::SIZE].copy_from_slice(&hdr.to_bytes());
        index += ExportPduHeader::SIZE;
        head[index..index + payload.len()].copy_from_slice(payload.as_bytes());
        index += payload.len();
        for b in &mut head[index..index + ExportPduHeader::END_OF_OPTIONS_SIZE] {
            *b = 0;
        }
        index += ExportPduHeader::END_OF_OPTIONS_SIZE;
    }
    debug_assert_eq!(index, prefix_length);

    if eth_trailer_length > 0 {
        for b in &mut tail[padded_len..padded_len + eth_trailer_length] {
            *b = 0;
        }
    }

    FrameLayout {
        total_len: prefix_length + padded_len + eth_trailer_length,
        payload_len: padded_len,
    }
}
