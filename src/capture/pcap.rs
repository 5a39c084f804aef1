use bincode::Options;
use log::debug;
use serde::Serialize;
use std::io::Write;

use crate::capture::{CaptureError, PacketRecord, PacketSink, MAX_PACKET_SIZE_STANDARD};

/// Link-layer types from https://www.tcpdump.org/linktypes.html that this
/// tool hands out by default; any other id passes through unchanged.
pub const LINKTYPE_ETHERNET: u32 = 1;
/// Wireshark's exported-PDU pseudo link layer.
pub const LINKTYPE_WIRESHARK_UPPER_PDU: u32 = 252;

/// Global header at the start of a pcap capture file.
///
/// ```text
///                         1                   2                   3
///     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |                          Magic Number                         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |          Major Version        |         Minor Version         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |                           Reserved1                           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |                           Reserved2                           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |                            SnapLen                            |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 |                           LinkType                            |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Serialize, Debug)]
struct FileHeader {
    magic: u32,
    version_major: u16,
    version_minor: u16,
    thiszone: i32,
    sigfigs: u32,
    snaplen: u32,
    linktype: u32,
}

impl FileHeader {
    /// Nanosecond-resolution variant of the classic 0xa1b2c3d4 magic.
    const MAGIC_NSEC: u32 = 0xa1b2_3c4d;
    const VERSION_MAJOR: u16 = 2;
    const VERSION_MINOR: u16 = 4;
}

/// Per-record header: timestamp, captured length, original length.
#[derive(Serialize, Debug)]
struct RecordHeader {
    ts_sec: u32,
    ts_nsec: u32,
    incl_len: u32,
    orig_len: u32,
}

fn byte_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().with_little_endian()
}

fn serialize_error(err: bincode::Error) -> CaptureError {
    match *err {
        bincode::ErrorKind::Io(e) => CaptureError::Io(e),
        other => CaptureError::UnwritableRecData(other.to_string()),
    }
}

/// Writes records to a classic little-endian pcap stream with nanosecond
/// timestamps. Direction flags and packet ids have no representation in this
/// format and are dropped.
pub struct PcapWriter<W: Write> {
    out: W,
    linktype: u32,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut out: W, linktype: u32) -> Result<Self, CaptureError> {
        let header = FileHeader {
            magic: FileHeader::MAGIC_NSEC,
            version_major: FileHeader::VERSION_MAJOR,
            version_minor: FileHeader::VERSION_MINOR,
            thiszone: 0,
            sigfigs: 0,
            snaplen: MAX_PACKET_SIZE_STANDARD as u32,
            linktype,
        };
        byte_options().serialize_into(&mut out, &header).map_err(serialize_error)?;
        debug!("wrote pcap file header, linktype {}", linktype);
        Ok(PcapWriter { out, linktype })
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> PacketSink for PcapWriter<W> {
    fn write_packet(&mut self, record: &PacketRecord, frame: &[u8]) -> Result<(), CaptureError> {
        if frame.len() < record.caplen as usize {
            return Err(CaptureError::UnwritableRecData(format!(
                "record claims {} captured bytes but carries {}",
                record.caplen,
                frame.len()
            )));
        }
        if record.encap != self.linktype {
            // classic pcap has one link type for the whole file
            return Err(CaptureError::UnwritableRecData(format!(
                "record encapsulation {} does not match the file link type {}",
                record.encap, self.linktype
            )));
        }
        if record.pack_flags() != 0 || record.packet_id.is_some() {
            // classic pcap has nowhere to put these
            debug!(
                "dropping pack flags 0x{:x} / packet id {:?} on the floor",
                record.pack_flags(),
                record.packet_id
            );
        }
        let header = RecordHeader {
            ts_sec: record.ts_sec as u32,
            ts_nsec: record.ts_nsec,
            incl_len: record.caplen,
            orig_len: record.wirelen,
        };
        byte_options().serialize_into(&mut self.out, &header).map_err(serialize_error)?;
        self.out.write_all(&frame[..record.caplen as usize])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Direction;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_header_bytes() {
        let writer = PcapWriter::new(Vec::new(), LINKTYPE_ETHERNET).unwrap();
        assert_eq!(
            writer.out,
            hex!("4d3c b2a1 0200 0400 00000000 00000000 00000400 01000000").to_vec()
        );
    }

    #[test]
    fn record_bytes() {
        let mut writer = PcapWriter::new(Vec::new(), LINKTYPE_ETHERNET).unwrap();
        let record = PacketRecord {
            ts_sec: 0x01020304,
            ts_nsec: 500,
            caplen: 3,
            wirelen: 3,
            encap: LINKTYPE_ETHERNET,
            direction: Direction::Unknown,
            packet_id: None,
        };
        writer.write_packet(&record, &[0xab, 0xcd, 0xef]).unwrap();
        assert_eq!(
            &writer.out[24..],
            &hex!("04030201 f4010000 03000000 03000000 abcdef")[..]
        );
    }

    #[test]
    fn encap_mismatch_is_unwritable() {
        let mut writer = PcapWriter::new(Vec::new(), LINKTYPE_ETHERNET).unwrap();
        let record = PacketRecord {
            ts_sec: 0,
            ts_nsec: 0,
            caplen: 1,
            wirelen: 1,
            encap: LINKTYPE_WIRESHARK_UPPER_PDU,
            direction: Direction::Unknown,
            packet_id: None,
        };
        assert!(matches!(
            writer.write_packet(&record, &[0]),
            Err(CaptureError::UnwritableRecData(_))
        ));
    }

    #[test]
    fn short_frame_is_unwritable() {
        let mut writer = PcapWriter::new(Vec::new(), LINKTYPE_ETHERNET).unwrap();
        let record = PacketRecord {
            ts_sec: 0,
            ts_nsec: 0,
            caplen: 10,
            wirelen: 10,
            encap: LINKTYPE_ETHERNET,
            direction: Direction::Unknown,
            packet_id: None,
        };
        match writer.write_packet(&record, &[0u8; 4]) {
            Err(CaptureError::UnwritableRecData(_)) => {}
            other => panic!("expected UnwritableRecData, got {:?}", other.map(|_| ())),
        }
    }
}
