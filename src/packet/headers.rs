//! Skeleton headers prepended to imported payloads so that payload-only
//! dumps stay decodable. All multi-byte fields are serialised big-endian at
//! the point of write.

/******************************** ETHERNET ********************************/

/// Destination MAC of inbound frames, "RECV" in ASCII.
pub const ETH_DEST_ADDR: [u8; 6] = [0x20, 0x52, 0x45, 0x43, 0x56, 0x00];
/// Source MAC of inbound frames, "SEND" in ASCII.
pub const ETH_SRC_ADDR: [u8; 6] = [0x20, 0x53, 0x45, 0x4e, 0x44, 0x00];

pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Frames shorter than this are zero-padded up to it with a trailer.
pub const MIN_ETHERNET_FRAME: usize = 60;

pub struct EthernetHeader {
    pub dest_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub l3pid: u16,
}

impl EthernetHeader {
    pub const SIZE: usize = 14;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..6].copy_from_slice(&self.dest_addr);
        buf[6..12].copy_from_slice(&self.src_addr);
        buf[12..14].copy_from_slice(&self.l3pid.to_be_bytes());
        buf
    }
}

/******************************** IPV4 ********************************/

pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_SCTP: u8 = 132;

/// Fixed identification field of every synthesized IPv4 header.
pub const IP_ID: u16 = 0x1234;
/// Fixed endpoints 1.1.1.1 and 2.2.2.2, swapped for outbound packets.
pub const IP_SRC: u32 = 0x0101_0101;
pub const IP_DST: u32 = 0x0202_0202;

pub struct Ipv4Header {
    pub ver_hdrlen: u8, // version 4, 5-word header
    pub dscp: u8,
    pub packet_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment: u8,
    pub ttl: u8,
    pub protocol: u8,
    pub hdr_checksum: u16,
    pub src_addr: u32,
    pub dest_addr: u32,
}

impl Ipv4Header {
    pub const SIZE: usize = 20;

    pub fn new(protocol: u8, packet_length: u16, src_addr: u32, dest_addr: u32) -> Self {
        Ipv4Header {
            ver_hdrlen: 0x45,
            dscp: 0,
            packet_length,
            identification: IP_ID,
            flags: 0,
            fragment: 0,
            ttl: 0xff,
            protocol,
            hdr_checksum: 0,
            src_addr,
            dest_addr,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.ver_hdrlen;
        buf[1] = self.dscp;
        buf[2..4].copy_from_slice(&self.packet_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());
        buf[6] = self.flags;
        buf[7] = self.fragment;
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.hdr_checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src_addr.to_be_bytes());
        buf[16..20].copy_from_slice(&self.dest_addr.to_be_bytes());
        buf
    }
}

/// Virtual header summed into the UDP and TCP checksums but never emitted.
pub struct PseudoHeader {
    pub src_addr: u32,
    pub dest_addr: u32,
    pub zero: u8,
    pub protocol: u8,
    pub length: u16,
}

impl PseudoHeader {
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.src_addr.to_be_bytes());
        buf[4..8].copy_from_slice(&self.dest_addr.to_be_bytes());
        buf[8] = self.zero;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/******************************** UDP ********************************/

pub struct UdpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }
}

/******************************** TCP ********************************/

pub struct TcpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    pub hdr_length: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urg: u16,
}

impl TcpHeader {
    pub const SIZE: usize = 20;
    /// Data offset nibble for the bare 20-byte header.
    pub const HDR_LENGTH: u8 = 0x50;
    pub const FLAG_ACK: u8 = 0x10;
    pub const WINDOW: u16 = 0x2000;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack_num.to_be_bytes());
        buf[12] = self.hdr_length;
        buf[13] = self.flags;
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urg.to_be_bytes());
        buf
    }
}

/******************************** SCTP ********************************/

/// from https://tools.ietf.org/html/rfc4960#section-3.1
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Source Port Number        |     Destination Port Number   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Verification Tag                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Checksum                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub struct SctpHeader {
    pub src_port: u16,
    pub dest_port: u16,
    pub tag: u32,
    pub checksum: u32, // complemented chained CRC32C
}

impl SctpHeader {
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_be_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }
}

/// from https://tools.ietf.org/html/rfc4960#section-3.3.1
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0    | Reserved|U|B|E|    Length                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              TSN                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Stream Identifier S      |   Stream Sequence Number n    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Payload Protocol Identifier                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub struct DataChunkHeader {
    pub chunk_type: u8,
    pub flags: u8,
    pub length: u16, // payload plus this header, before padding
    pub tsn: u32,
    pub sid: u16,
    pub ssn: u16,
    pub ppid: u32,
}

impl DataChunkHeader {
    pub const SIZE: usize = 16;
    /// B and E bits: a complete, unfragmented user message.
    pub const FLAGS_UNFRAGMENTED: u8 = 3;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.chunk_type;
        buf[1] = self.flags;
        buf[2..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.tsn.to_be_bytes());
        buf[8..10].copy_from_slice(&self.sid.to_be_bytes());
        buf[10..12].copy_from_slice(&self.ssn.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ppid.to_be_bytes());
        buf
    }
}

/******************************** EXPORTED PDU ********************************/

/// Tag block preceding the payload of an exported-PDU record. Only the
/// protocol-name tag is written, followed by the end-of-options marker.
pub struct ExportPduHeader {
    pub tag_type: u16,
    pub payload_len: u16,
}

impl ExportPduHeader {
    pub const SIZE: usize = 4;
    pub const TAG_PROTO_NAME: u16 = 0x000c;
    pub const END_OF_OPTIONS_SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.tag_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    #[test]
    fn ethernet_layout() {
        let hdr = EthernetHeader {
            dest_addr: ETH_DEST_ADDR,
            src_addr: ETH_SRC_ADDR,
            l3pid: ETHERTYPE_IPV4,
        };
        assert_eq!(hdr.to_bytes(), hex!("20 52 45 43 56 00 20 53 45 4e 44 00 08 00"));
    }

    #[test]
    fn ipv4_layout() {
        let hdr = Ipv4Header::new(IPPROTO_UDP, 30, IP_SRC, IP_DST);
        assert_eq!(
            hdr.to_bytes(),
            hex!("45 00 00 1e 12 34 00 00 ff 11 00 00 01 01 01 01 02 02 02 02")
        );
    }

    #[test]
    fn tcp_layout() {
        let hdr = TcpHeader {
            source_port: 80,
            dest_port: 4040,
            seq_num: 0x0102_0304,
            ack_num: 0x0a0b_0c0d,
            hdr_length: TcpHeader::HDR_LENGTH,
            flags: TcpHeader::FLAG_ACK,
            window: TcpHeader::WINDOW,
            checksum: 0,
            urg: 0,
        };
        assert_eq!(
            hdr.to_bytes(),
            hex!("00 50 0f c8 01 02 03 04 0a 0b 0c 0d 50 10 20 00 00 00 00 00")
        );
    }

    #[test]
    fn data_chunk_layout() {
        let hdr = DataChunkHeader {
            chunk_type: 0,
            flags: DataChunkHeader::FLAGS_UNFRAGMENTED,
            length: 21,
            tsn: 1,
            sid: 2,
            ssn: 3,
            ppid: 4,
        };
        assert_eq!(hdr.to_bytes(), hex!("00 03 00 15 00 00 00 01 00 02 00 03 00 00 00 04"));
    }
}
