//! One import session: configuration, the packet being built, and everything
//! that has to survive from record to record (timestamps, direction, TCP
//! sequence counters).

use log::{debug, info, warn};
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

mod hexdump;
mod regex;

use crate::capture::{CaptureError, Direction, PacketRecord, PacketSink, MAX_PACKET_SIZE_STANDARD};
use crate::decode::Encoding;
use crate::packet::{
    assemble_frame, DataChunkSpec, HeaderSpec, PacketBuffer, PortPair, SctpSpec, TcpFlow,
};
use crate::packet::headers::{ETHERTYPE_IPV4, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use crate::timestamp::TimestampParser;

use self::regex::RegexDriver;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read import text: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid import pattern: {0}")]
    Pattern(#[from] ::regex::Error),
    #[error("import pattern has no 'data' capture group")]
    MissingDataGroup,
    #[error("{0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Radix of the offset column of a hexdump, or None when the dump carries no
/// offsets at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetBase {
    None,
    Hex,
    Oct,
    Dec,
}

impl FromStr for OffsetBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OffsetBase::None),
            "hex" => Ok(OffsetBase::Hex),
            "oct" => Ok(OffsetBase::Oct),
            "dec" => Ok(OffsetBase::Dec),
            _ => Err(format!("unknown offset base '{}', expected hex, oct, dec or none", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HexdumpConfig {
    pub offset_base: OffsetBase,
    pub has_direction: bool,
}

#[derive(Clone, Debug)]
pub struct RegexConfig {
    /// Pattern with named groups: `data` (required), `dir`, `time`, `seqno`.
    pub pattern: String,
    pub encoding: Encoding,
    /// Characters whose presence as the first byte of a `dir` field marks a
    /// packet inbound resp. outbound.
    pub in_indication: String,
    pub out_indication: String,
}

#[derive(Clone, Debug)]
pub enum ImportMode {
    Hexdump(HexdumpConfig),
    Regex(RegexConfig),
}

/// Which dummy header stack to put in front of every payload. Each selection
/// implies the lower layers it needs; ExportPdu stands alone.
#[derive(Clone, Debug)]
pub enum DummyHeaders {
    None,
    Ethernet { ethertype: u16 },
    Ipv4 { protocol: u8 },
    Udp { ports: PortPair },
    Tcp { ports: PortPair },
    Sctp { ports: PortPair, tag: u32 },
    SctpData { ports: PortPair, ppid: u32 },
    ExportPdu { payload: String },
}

impl From<&DummyHeaders> for HeaderSpec {
    fn from(headers: &DummyHeaders) -> HeaderSpec {
        let mut spec = HeaderSpec::default();
        match headers {
            DummyHeaders::None => {}
            DummyHeaders::Ethernet { ethertype } => spec.ethernet = Some(*ethertype),
            DummyHeaders::Ipv4 { protocol } => {
                spec.ipv4 = Some(*protocol);
                spec.ethernet = Some(ETHERTYPE_IPV4);
            }
            DummyHeaders::Udp { ports } => {
                spec.udp = Some(*ports);
                spec.ipv4 = Some(IPPROTO_UDP);
                spec.ethernet = Some(ETHERTYPE_IPV4);
            }
            DummyHeaders::Tcp { ports } => {
                spec.tcp = Some(*ports);
                spec.ipv4 = Some(IPPROTO_TCP);
                spec.ethernet = Some(ETHERTYPE_IPV4);
            }
            DummyHeaders::Sctp { ports, tag } => {
                spec.sctp = Some(SctpSpec { ports: *ports, tag: *tag });
                spec.ipv4 = Some(IPPROTO_SCTP);
                spec.ethernet = Some(ETHERTYPE_IPV4);
            }
            DummyHeaders::SctpData { ports, ppid } => {
                spec.sctp = Some(SctpSpec { ports: *ports, tag: 0 });
                spec.data_chunk = Some(DataChunkSpec { ppid: *ppid, ..DataChunkSpec::default() });
                spec.ipv4 = Some(IPPROTO_SCTP);
                spec.ethernet = Some(ETHERTYPE_IPV4);
            }
            DummyHeaders::ExportPdu { payload } => spec.export_pdu = Some(payload.clone()),
        }
        spec
    }
}

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub mode: ImportMode,
    /// strftime-style format with `%f` for fractional seconds, or None to
    /// stamp records with an import-start time plus a per-record counter.
    pub timestamp_format: Option<String>,
    /// Link-layer id recorded for every packet.
    pub encapsulation: u32,
    pub headers: DummyHeaders,
    pub max_frame_length: u32,
}

/// Free text collected in front of a packet's first byte, searched for the
/// direction indicator and the timestamp.
const PACKET_PREAMBLE_MAX_LEN: usize = 2048;

/// Direction indicator characters of hexdump preambles.
const HEXDUMP_IN_INDICATION: &str = "iI";
const HEXDUMP_OUT_INDICATION: &str = "oO";

struct Preamble {
    buf: String,
}

impl Preamble {
    fn new() -> Self {
        Preamble { buf: String::new() }
    }

    /// Appends a token, blank-separated. Once the buffer is at capacity the
    /// rest of the preamble is silently dropped.
    fn append_token(&mut self, token: &str) {
        if !self.buf.is_empty() {
            if self.buf.len() == PACKET_PREAMBLE_MAX_LEN {
                return;
            }
            self.buf.push(' ');
        }
        if token.is_empty() {
            return;
        }
        if self.buf.len() + token.len() > PACKET_PREAMBLE_MAX_LEN {
            return;
        }
        self.buf.push_str(token);
    }

    fn trim_leading_blank(&mut self) {
        let skip = self
            .buf
            .bytes()
            .take_while(|b| *b == b' ' || *b == b'\r' || *b == b'\t')
            .count();
        self.buf.drain(..skip);
    }

    fn as_str(&self) -> &str {
        &self.buf
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Scans the indicator sets for the first byte of a direction field.
fn parse_dir(field: &[u8], in_indication: &str, out_indication: &str) -> Direction {
    let first = match field.first() {
        Some(b) => *b,
        None => return Direction::Unknown,
    };
    if in_indication.bytes().any(|c| c == first) {
        return Direction::Inbound;
    }
    if out_indication.bytes().any(|c| c == first) {
        return Direction::Outbound;
    }
    Direction::Unknown
}

/// Directives are embedded instructions of the form `#TEXT2PCAP <payload>`.
/// None are acted on; they are surfaced and skipped.
fn process_directive(payload: &str) {
    warn!("directive [{}] currently unsupported", payload.trim());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Waiting for the start of a new packet.
    Init,
    /// At the beginning of a line inside a packet.
    StartOfLine,
    /// Just read the offset column.
    ReadOffset,
    /// Just read a byte value.
    ReadByte,
    /// Reading trailing text, ignored until end of line.
    ReadText,
}

/// Everything one import run owns. Created per import, fed tokens or regex
/// matches, torn down when the input ends; not reusable across inputs.
pub struct ImportSession<'a> {
    spec: HeaderSpec,
    encapsulation: u32,
    has_direction: bool,
    time_parser: Option<TimestampParser>,

    offset_base: OffsetBase,
    regex: Option<RegexDriver>,
    has_seqno: bool,

    buf: PacketBuffer,
    preamble: Preamble,
    state: State,
    /// Absolute offset of the current packet's first byte within its dump.
    packet_start: u32,
    direction: Direction,
    ts_sec: i64,
    ts_nsec: u32,
    seqno: u64,
    flow: TcpFlow,

    sink: &'a mut dyn PacketSink,
    packets_written: u64,
}

impl<'a> ImportSession<'a> {
    pub fn new(
        config: &ImportConfig,
        sink: &'a mut dyn PacketSink,
    ) -> Result<ImportSession<'a>, ImportError> {
        let max_payload = config.max_frame_length as usize;
        if max_payload == 0 || max_payload > MAX_PACKET_SIZE_STANDARD {
            return Err(ImportError::InvalidConfig(format!(
                "max frame length {} out of range 1..={}",
                config.max_frame_length, MAX_PACKET_SIZE_STANDARD
            )));
        }

        let spec = HeaderSpec::from(&config.headers);
        let (offset_base, has_direction, has_seqno, regex) = match &config.mode {
            ImportMode::Hexdump(hexdump) => {
                (hexdump.offset_base, hexdump.has_direction, false, None)
            }
            ImportMode::Regex(cfg) => {
                let driver = RegexDriver::compile(cfg)?;
                let has_direction = driver.has_dir();
                let has_seqno = driver.has_seqno();
                (OffsetBase::Hex, has_direction, has_seqno, Some(driver))
            }
        };

        Ok(ImportSession {
            buf: PacketBuffer::new(spec.prefix_length(), max_payload),
            spec,
            encapsulation: config.encapsulation,
            has_direction,
            time_parser: config.timestamp_format.as_deref().map(TimestampParser::new),
            offset_base,
            regex,
            has_seqno,
            preamble: Preamble::new(),
            state: State::Init,
            packet_start: 0,
            direction: Direction::Unknown,
            ts_sec: chrono::Local::now().timestamp(),
            ts_nsec: 0,
            seqno: 0,
            flow: TcpFlow::default(),
            sink,
            packets_written: 0,
        })
    }

    /// Runs the import over `input` and returns the number of records
    /// delivered to the sink.
    pub fn run(&mut self, input: &mut dyn BufRead) -> Result<u64, ImportError> {
        match self.regex.take() {
            Some(driver) => self.run_regex(&driver, input)?,
            None => self.run_hexdump(input)?,
        }
        self.finish()?;
        info!("import done, {} packets written", self.packets_written);
        Ok(self.packets_written)
    }

    /// Completes the packet under construction, if any: synthesizes the
    /// header stack, hands the record to the sink, and advances the packet
    /// start offset past the consumed payload.
    fn write_current_packet(&mut self) -> Result<(), ImportError> {
        let mut consumed = self.buf.curr_offset();
        if consumed > 0 {
            let is_outbound = self.has_direction && self.direction == Direction::Outbound;
            let layout = assemble_frame(
                &self.spec,
                is_outbound,
                self.has_direction,
                &mut self.flow,
                &mut self.buf,
            );
            consumed = layout.payload_len;

            let record = PacketRecord {
                ts_sec: self.ts_sec,
                ts_nsec: self.ts_nsec,
                caplen: layout.total_len as u32,
                wirelen: layout.total_len as u32,
                encap: self.encapsulation,
                direction: self.direction,
                packet_id: if self.has_seqno { Some(self.seqno) } else { None },
            };
            if self.time_parser.is_none() {
                // fake packet counter keeps otherwise identical stamps apart
                self.ts_nsec = self.ts_nsec.wrapping_add(1);
            }

            match self.sink.write_packet(&record, self.buf.frame(layout.total_len)) {
                Ok(()) => self.packets_written += 1,
                Err(CaptureError::UnwritableRecData(msg)) => {
                    warn!("dropping record: {}", msg);
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.packet_start = self.packet_start.wrapping_add(consumed as u32);
        self.buf.clear();
        Ok(())
    }

    /// Emits any pending packet and consumes the preamble collected since the
    /// previous one: the direction indicator first when enabled, then the
    /// timestamp when a format is configured.
    fn start_new_packet(&mut self) -> Result<(), ImportError> {
        debug!("start new packet");
        self.write_current_packet()?;
        self.parse_preamble();
        Ok(())
    }

    fn parse_preamble(&mut self) {
        if self.has_direction {
            self.direction = parse_dir(
                self.preamble.as_str().as_bytes(),
                HEXDUMP_IN_INDICATION,
                HEXDUMP_OUT_INDICATION,
            );
            self.preamble.trim_leading_blank();
        }

        if let Some(parser) = &self.time_parser {
            // anything shorter is line-break noise, not a timestamp
            if self.preamble.as_str().len() > 2 {
                parser.parse(self.preamble.as_str(), &mut self.ts_sec, &mut self.ts_nsec);
            }
        }

        self.preamble.clear();
    }

    /// Closes the import: whatever packet is in progress gets flushed.
    fn finish(&mut self) -> Result<(), ImportError> {
        self.write_current_packet()
    }
}
