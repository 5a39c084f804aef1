use std::io;
use thiserror::Error;

pub mod pcap;

/// Largest payload a single imported record may carry; the snapshot length of
/// written captures is pinned to the same value.
pub const MAX_PACKET_SIZE_STANDARD: usize = 262144;

/// Reception direction of a record, stored in the two low pack-flag bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Unknown,
    Inbound,
    Outbound,
}

impl Direction {
    pub fn pack_flags(self) -> u32 {
        match self {
            Direction::Unknown => 0,
            Direction::Inbound => 1,
            Direction::Outbound => 2,
        }
    }
}

/// Descriptor of one packet record handed to a sink together with its frame
/// bytes. What (if anything) of it survives in the output is the sink's
/// business; classic pcap for instance keeps the timestamp and lengths only.
#[derive(Clone, Debug)]
pub struct PacketRecord {
    pub ts_sec: i64,
    pub ts_nsec: u32,
    pub caplen: u32,
    pub wirelen: u32,
    /// Link-layer type of the frame bytes.
    pub encap: u32,
    pub direction: Direction,
    /// Caller-supplied sequence number, when the input carried one.
    pub packet_id: Option<u64>,
}

impl PacketRecord {
    pub fn pack_flags(&self) -> u32 {
        self.direction.pack_flags()
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The record cannot be represented in the output format. Recoverable:
    /// the record is dropped and the import continues.
    #[error("record not writable in this capture format: {0}")]
    UnwritableRecData(String),
    #[error("capture write failed: {0}")]
    Io(#[from] io::Error),
}

/// Where completed records go. Write order is delivery order.
pub trait PacketSink {
    fn write_packet(&mut self, record: &PacketRecord, frame: &[u8]) -> Result<(), CaptureError>;
}

#[cfg(test)]
pub(crate) struct MemorySink {
    pub records: Vec<(PacketRecord, Vec<u8>)>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        MemorySink { records: Vec::new() }
    }

    pub fn payloads(&self) -> Vec<&[u8]> {
        self.records.iter().map(|(_, frame)| frame.as_slice()).collect()
    }
}

#[cfg(test)]
impl PacketSink for MemorySink {
    fn write_packet(&mut self, record: &PacketRecord, frame: &[u8]) -> Result<(), CaptureError> {
        self.records.push((record.clone(), frame.to_vec()));
        Ok(())
    }
}
