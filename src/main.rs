use log::{error, info, LevelFilter};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::PathBuf;
use structopt::StructOpt;

mod capture;
mod decode;
mod import;
mod logger;
mod packet;
mod timestamp;

use crate::capture::pcap::{PcapWriter, LINKTYPE_ETHERNET, LINKTYPE_WIRESHARK_UPPER_PDU};
use crate::decode::Encoding;
use crate::import::{
    DummyHeaders, HexdumpConfig, ImportConfig, ImportError, ImportMode, ImportSession,
    OffsetBase, RegexConfig,
};
use crate::packet::PortPair;

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x");
    u16::from_str_radix(digits, 16).map_err(|e| format!("bad hex value '{}': {}", s, e))
}

/// SRC,DST,VALUE triple of the SCTP options: ports plus a verification tag
/// or a payload protocol id.
#[derive(Debug, Clone, Copy)]
struct SctpOpt {
    ports: PortPair,
    value: u32,
}

impl std::str::FromStr for SctpOpt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, value) = match s.rfind(',') {
            Some(pos) => (&s[..pos], &s[pos + 1..]),
            None => return Err(format!("expected SRC,DST,VALUE, got '{}'", s)),
        };
        Ok(SctpOpt {
            ports: ports.parse()?,
            value: value.trim().parse().map_err(|e| format!("bad value '{}': {}", value, e))?,
        })
    }
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Import a text dump of network traffic into a pcap capture file")]
struct Opts {
    /// Log level to use
    #[structopt(long = "log", default_value = "Info")]
    log_level: LevelFilter,

    /// Input text file, "-" for standard input
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Output capture file
    #[structopt(parse(from_os_str))]
    output: PathBuf,

    /// Import through a regular expression with named capture groups
    /// (data, dir, time, seqno) instead of hexdump parsing
    #[structopt(short = "r", long = "regex")]
    regex: Option<String>,

    /// Radix of the hexdump offset column: hex, oct, dec or none
    #[structopt(short = "o", long = "offsets", default_value = "hex")]
    offsets: OffsetBase,

    /// Treat a leading i/I resp. o/O in the packet preamble as the packet
    /// direction
    #[structopt(short = "D", long = "direction")]
    direction: bool,

    /// Characters marking a regex "dir" field inbound
    #[structopt(long = "in-indication", default_value = "iI<")]
    in_indication: String,

    /// Characters marking a regex "dir" field outbound
    #[structopt(long = "out-indication", default_value = "oO>")]
    out_indication: String,

    /// Timestamp format of the packet preamble or the regex "time" field,
    /// strftime plus %f for fractional seconds
    #[structopt(short = "t", long = "timestamp")]
    timestamp_format: Option<String>,

    /// Encoding of regex "data" fields: hex, oct, bin or base64
    #[structopt(long = "data-encoding", default_value = "hex")]
    data_encoding: Encoding,

    /// Prepend a dummy Ethernet header with this EtherType (hex)
    #[structopt(short = "e", long = "ethernet", parse(try_from_str = parse_hex_u16))]
    ethernet: Option<u16>,

    /// Prepend dummy Ethernet and IPv4 headers with this IP protocol number
    #[structopt(short = "i", long = "ipv4")]
    ipv4: Option<u8>,

    /// Prepend dummy Ethernet, IPv4 and UDP headers with these SRC,DST ports
    #[structopt(short = "u", long = "udp")]
    udp: Option<PortPair>,

    /// Prepend dummy Ethernet, IPv4 and TCP headers with these SRC,DST ports
    #[structopt(short = "T", long = "tcp")]
    tcp: Option<PortPair>,

    /// Prepend dummy Ethernet, IPv4 and SCTP headers with SRC,DST,TAG
    #[structopt(short = "s", long = "sctp")]
    sctp: Option<SctpOpt>,

    /// As --sctp but wrap the payload in a DATA chunk, with SRC,DST,PPID
    #[structopt(short = "S", long = "sctp-data")]
    sctp_data: Option<SctpOpt>,

    /// Wrap each packet in an exported-PDU header carrying this protocol name
    #[structopt(short = "P", long = "export-pdu")]
    export_pdu: Option<String>,

    /// Link-layer type of the capture; defaults to Ethernet, or to the
    /// exported-PDU pseudo link layer when -P is given
    #[structopt(short = "l", long = "linktype")]
    linktype: Option<u32>,

    /// Maximum bytes per packet; longer input splits into several records
    #[structopt(short = "m", long = "max-len", default_value = "65535")]
    max_len: u32,
}

impl Opts {
    fn dummy_headers(&self) -> Result<DummyHeaders, ImportError> {
        let mut selected = Vec::new();
        if let Some(ethertype) = self.ethernet {
            selected.push(DummyHeaders::Ethernet { ethertype });
        }
        if let Some(protocol) = self.ipv4 {
            selected.push(DummyHeaders::Ipv4 { protocol });
        }
        if let Some(ports) = self.udp {
            selected.push(DummyHeaders::Udp { ports });
        }
        if let Some(ports) = self.tcp {
            selected.push(DummyHeaders::Tcp { ports });
        }
        if let Some(opt) = self.sctp {
            selected.push(DummyHeaders::Sctp { ports: opt.ports, tag: opt.value });
        }
        if let Some(opt) = self.sctp_data {
            selected.push(DummyHeaders::SctpData { ports: opt.ports, ppid: opt.value });
        }
        if let Some(payload) = &self.export_pdu {
            selected.push(DummyHeaders::ExportPdu { payload: payload.clone() });
        }
        match selected.len() {
            0 => Ok(DummyHeaders::None),
            1 => Ok(selected.remove(0)),
            _ => Err(ImportError::InvalidConfig(
                "at most one dummy header option (-e/-i/-u/-T/-s/-S/-P) may be given".to_string(),
            )),
        }
    }

    fn linktype(&self) -> u32 {
        match (self.linktype, &self.export_pdu) {
            (Some(id), _) => id,
            (None, Some(_)) => LINKTYPE_WIRESHARK_UPPER_PDU,
            (None, None) => LINKTYPE_ETHERNET,
        }
    }
}

fn run(opts: &Opts) -> Result<(), ImportError> {
    let mode = match &opts.regex {
        Some(pattern) => ImportMode::Regex(RegexConfig {
            pattern: pattern.clone(),
            encoding: opts.data_encoding,
            in_indication: opts.in_indication.clone(),
            out_indication: opts.out_indication.clone(),
        }),
        None => ImportMode::Hexdump(HexdumpConfig {
            offset_base: opts.offsets,
            has_direction: opts.direction,
        }),
    };

    let config = ImportConfig {
        mode,
        timestamp_format: opts.timestamp_format.clone(),
        encapsulation: opts.linktype(),
        headers: opts.dummy_headers()?,
        max_frame_length: opts.max_len,
    };

    let mut input: Box<dyn BufRead> = if opts.input.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(&opts.input)?))
    };

    let out = BufWriter::new(File::create(&opts.output)?);
    let mut writer = PcapWriter::new(out, config.encapsulation)?;

    info!("importing {:?} into {:?}", opts.input, opts.output);
    let mut session = ImportSession::new(&config, &mut writer)?;
    let packets = session.run(&mut input)?;
    writer.flush()?;
    info!("wrote {} packets to {:?}", packets, opts.output);
    Ok(())
}

fn main() {
    let opts = Opts::from_args();
    logger::init(opts.log_level);

    if let Err(err) = run(&opts) {
        error!("import failed: {}", err);
        std::process::exit(1);
    }
}
