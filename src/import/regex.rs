//! Regex import: every non-overlapping match of a user pattern describes one
//! packet through its named capture groups.

use log::{debug, info};
use std::io::BufRead;

use super::{parse_dir, ImportError, ImportSession, RegexConfig};
use crate::decode::{decode, Decoding};

/// Compiled pattern plus the field routing derived from its group names.
pub(super) struct RegexDriver {
    re: regex::bytes::Regex,
    encoding: &'static Decoding,
    in_indication: String,
    out_indication: String,
}

impl RegexDriver {
    pub(super) fn compile(config: &RegexConfig) -> Result<Self, ImportError> {
        let re = regex::bytes::Regex::new(&config.pattern)?;
        if !re.capture_names().any(|name| name == Some("data")) {
            return Err(ImportError::MissingDataGroup);
        }
        Ok(RegexDriver {
            re,
            encoding: config.encoding.decoding(),
            in_indication: config.in_indication.clone(),
            out_indication: config.out_indication.clone(),
        })
    }

    pub(super) fn has_dir(&self) -> bool {
        self.re.capture_names().any(|name| name == Some("dir"))
    }

    pub(super) fn has_seqno(&self) -> bool {
        self.re.capture_names().any(|name| name == Some("seqno"))
    }
}

/// Unsigned decimal sequence number; anything unparseable becomes 0.
fn parse_seqno(field: &[u8]) -> u64 {
    let digits = field.iter().take_while(|b| b.is_ascii_digit()).count();
    String::from_utf8_lossy(&field[..digits]).parse().unwrap_or(0)
}

impl<'a> ImportSession<'a> {
    pub(super) fn run_regex(
        &mut self,
        driver: &RegexDriver,
        input: &mut dyn BufRead,
    ) -> Result<(), ImportError> {
        let mut text = Vec::new();
        input.read_to_end(&mut text)?;

        let mut matches = 0u64;
        for captures in driver.re.captures_iter(&text) {
            if let Some(field) = captures.name("dir") {
                self.direction = parse_dir(
                    field.as_bytes(),
                    &driver.in_indication,
                    &driver.out_indication,
                );
            }
            if let Some(field) = captures.name("time") {
                if let Some(parser) = &self.time_parser {
                    let field = String::from_utf8_lossy(field.as_bytes());
                    parser.parse(&field, &mut self.ts_sec, &mut self.ts_nsec);
                }
            }
            if let Some(field) = captures.name("seqno") {
                self.seqno = parse_seqno(field.as_bytes());
            }
            if let Some(field) = captures.name("data") {
                self.parse_data(field.as_bytes(), driver.encoding)?;
            }
            self.write_current_packet()?;
            matches += 1;
        }
        info!("{} matches in regex import", matches);
        Ok(())
    }

    /// Streams a data field through the decoder. A field larger than the
    /// packet buffer flushes full records mid-way and keeps going, so one
    /// match may produce several packets.
    fn parse_data(&mut self, mut field: &[u8], encoding: &Decoding) -> Result<(), ImportError> {
        loop {
            let result = decode(field, self.buf.free_payload_mut(), encoding);
            self.buf.advance(result.produced);
            field = &field[result.consumed..];
            if !result.ok {
                debug!("invalid character in data field, {} bytes salvaged", result.produced);
            }
            if self.buf.is_full() {
                self.write_current_packet()?;
            } else {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DummyHeaders, ImportConfig, ImportMode, OffsetBase};
    use super::*;
    use crate::capture::{Direction, MemorySink};
    use crate::decode::Encoding;
    use pretty_assertions::assert_eq;

    fn regex_config(pattern: &str, encoding: Encoding) -> ImportConfig {
        ImportConfig {
            mode: ImportMode::Regex(RegexConfig {
                pattern: pattern.to_string(),
                encoding,
                in_indication: "<".to_string(),
                out_indication: ">".to_string(),
            }),
            timestamp_format: None,
            encapsulation: 1,
            headers: DummyHeaders::None,
            max_frame_length: 65535,
        }
    }

    fn import(config: &ImportConfig, text: &str) -> MemorySink {
        let mut sink = MemorySink::new();
        let mut session = ImportSession::new(config, &mut sink).unwrap();
        session.run(&mut text.as_bytes()).unwrap();
        sink
    }

    #[test]
    fn rejects_pattern_without_data_group() {
        let config = regex_config(r"(?P<payload>[0-9a-f]+)", Encoding::Hex);
        let mut sink = MemorySink::new();
        match ImportSession::new(&config, &mut sink) {
            Err(ImportError::MissingDataGroup) => {}
            other => panic!("expected MissingDataGroup, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn one_record_per_match() {
        let config = regex_config(r"(?m)^pkt: (?P<data>[0-9a-f ]+)$", Encoding::Hex);
        let sink = import(&config, "pkt: 01 02\njunk\npkt: ff\n");
        assert_eq!(sink.payloads(), vec![&[0x01, 0x02][..], &[0xff][..]]);
    }

    #[test]
    fn direction_seqno_and_data_route_together() {
        let config = regex_config(
            r"(?m)^(?P<seqno>\d+)\s+(?P<dir>[<>])\s+(?P<data>[0-9a-f]+)$",
            Encoding::Hex,
        );
        let sink = import(&config, "17 < c0ffee\n18 > aa\n");
        assert_eq!(sink.records.len(), 2);

        let (first, payload) = &sink.records[0];
        assert_eq!(payload.as_slice(), &[0xc0, 0xff, 0xee][..]);
        assert_eq!(first.direction, Direction::Inbound);
        assert_eq!(first.packet_id, Some(17));

        let (second, _) = &sink.records[1];
        assert_eq!(second.direction, Direction::Outbound);
        assert_eq!(second.packet_id, Some(18));
    }

    #[test]
    fn oversized_data_field_spans_records() {
        let mut config = regex_config(r"(?P<data>[0-9a-f]+)", Encoding::Hex);
        config.max_frame_length = 2;
        let sink = import(&config, "0102030405");
        assert_eq!(
            sink.payloads(),
            vec![&[0x01, 0x02][..], &[0x03, 0x04][..], &[0x05][..]]
        );
    }

    #[test]
    fn base64_data_fields() {
        let config = regex_config(r"(?m)^(?P<data>[A-Za-z0-9+/=]+)$", Encoding::Base64);
        let sink = import(&config, "TWFu\n");
        assert_eq!(sink.payloads(), vec![b"Man".as_ref()]);
    }

    #[test]
    fn invalid_data_character_keeps_salvaged_bytes() {
        let config = regex_config(r"(?m)^data (?P<data>.+)$", Encoding::Hex);
        let sink = import(&config, "data 0102zz03\n");
        // decoding stops at the invalid character, the record keeps what was
        // already decoded
        assert_eq!(sink.payloads(), vec![&[0x01, 0x02][..]]);
    }
}
