//! Hexdump import: a line scanner feeding a five-state machine that
//! reconstructs packet boundaries from offset arithmetic.
//!
//! A bytestring line is an offset, one or more two-digit byte values and
//! optional trailing text. Text in front of the offset goes to the packet
//! preamble; a zero offset starts a new packet; an offset that disagrees with
//! the number of bytes read so far either retracts bytes that were really
//! text (smaller offset) or abandons the packet (larger offset), so malformed
//! input never desynchronizes the stream.

use log::{error, trace};

use super::{ImportError, ImportSession, OffsetBase, State};

/// Lines carrying an embedded directive start with this prefix.
const DIRECTIVE_PREFIX: &str = "#TEXT2PCAP";

/// What the line scanner hands to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Token<'a> {
    /// Exactly two hex digits.
    Byte(&'a str),
    /// A run of digits in the configured offset base.
    Offset(&'a str),
    /// The payload of a `#TEXT2PCAP` line.
    Directive(&'a str),
    Text(&'a str),
    Eol,
    Eof,
}

/// Parses an unsigned number the way `strtoul` does: the longest valid digit
/// prefix counts, and the base is the configured offset base for offsets
/// (auto-detected from a `0x`/`0` prefix when the dump has no offset column)
/// or 16 for byte values.
pub(super) fn parse_num(s: &str, is_offset: bool, base: OffsetBase) -> u32 {
    let (digits, radix) = if !is_offset {
        (s, 16)
    } else {
        match base {
            OffsetBase::Hex => (s, 16),
            OffsetBase::Oct => (s, 8),
            OffsetBase::Dec => (s, 10),
            OffsetBase::None => {
                if s.starts_with("0x") || s.starts_with("0X") {
                    (&s[2..], 16)
                } else if s.starts_with('0') && s.len() > 1 {
                    (s, 8)
                } else {
                    (s, 10)
                }
            }
        }
    };
    let end = digits
        .bytes()
        .position(|b| !(b as char).is_digit(radix))
        .unwrap_or_else(|| digits.len());
    match u32::from_str_radix(&digits[..end], radix) {
        Ok(num) => num,
        Err(err) => {
            error!("bad number [{}]: {}", s, err);
            0
        }
    }
}

/// Classifies one blank-separated field: exactly two hex digits form a byte,
/// any other run of hex digits (with an optional trailing colon) is an
/// offset, everything else is text.
fn classify(field: &str) -> Token {
    let bytes = field.as_bytes();
    if bytes.len() == 2 && bytes.iter().all(u8::is_ascii_hexdigit) {
        return Token::Byte(field);
    }
    let digits = field.strip_suffix(':').unwrap_or(field);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Token::Offset(digits);
    }
    Token::Text(field)
}

impl<'a> ImportSession<'a> {
    pub(super) fn run_hexdump(&mut self, input: &mut dyn std::io::BufRead) -> Result<(), ImportError> {
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if input.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&raw);
            self.scan_line(&line)?;
        }
        self.parse_token(Token::Eof)
    }

    /// Tokenizes one line and runs the tokens through the state machine.
    /// Directives are matched at the start of the line; other comment lines
    /// are dropped entirely.
    fn scan_line(&mut self, line: &str) -> Result<(), ImportError> {
        if let Some(payload) = line.strip_prefix(DIRECTIVE_PREFIX) {
            let payload = payload.trim_end_matches(|c| c == '\r' || c == '\n');
            self.parse_token(Token::Directive(payload))?;
        } else if line.trim_start().starts_with('#') {
            // non-directive comment
        } else {
            for field in line.split_whitespace() {
                self.parse_token(classify(field))?;
            }
        }
        self.parse_token(Token::Eol)
    }

    /// One step of the state machine.
    pub(super) fn parse_token(&mut self, token: Token) -> Result<(), ImportError> {
        trace!("({:?}, {:?})", self.state, token);

        match self.state {
            // ----- waiting for a new packet ---------------------------------
            State::Init => match token {
                Token::Text(text) => self.preamble.append_token(text),
                Token::Directive(payload) => super::process_directive(payload),
                Token::Offset(offset) => {
                    if parse_num(offset, true, self.offset_base) == 0 {
                        // new packet starts here
                        self.start_new_packet()?;
                        self.state = State::ReadOffset;
                    }
                }
                Token::Byte(byte) => {
                    if self.offset_base == OffsetBase::None {
                        self.start_new_packet()?;
                        self.write_byte(byte)?;
                        self.state = State::ReadByte;
                    }
                }
                Token::Eof => self.write_current_packet()?,
                Token::Eol => {}
            },

            // ----- inside a packet, at the beginning of a line --------------
            State::StartOfLine => match token {
                Token::Text(text) => self.preamble.append_token(text),
                Token::Directive(payload) => super::process_directive(payload),
                Token::Offset(offset) => {
                    let num = parse_num(offset, true, self.offset_base);
                    let expected = self.packet_start.wrapping_add(self.buf.curr_offset() as u32);
                    if num == 0 {
                        self.start_new_packet()?;
                        self.packet_start = 0;
                        self.state = State::ReadOffset;
                    } else if num == expected {
                        self.state = State::ReadOffset;
                    } else if num < expected {
                        // the gap was text mistaken for byte values; retract it
                        self.buf.unwrite((expected - num) as usize);
                        self.state = State::ReadOffset;
                    } else {
                        trace!(
                            "inconsistent offset, expecting {:x} got {:x}; ignoring rest of packet",
                            expected,
                            num
                        );
                        self.write_current_packet()?;
                        self.state = State::Init;
                    }
                }
                Token::Byte(byte) => {
                    if self.offset_base == OffsetBase::None {
                        self.write_byte(byte)?;
                        self.state = State::ReadByte;
                    }
                }
                Token::Eof => self.write_current_packet()?,
                Token::Eol => {}
            },

            // ----- just read the offset column ------------------------------
            State::ReadOffset => match token {
                Token::Byte(byte) => {
                    self.state = State::ReadByte;
                    self.write_byte(byte)?;
                }
                Token::Text(_) | Token::Directive(_) | Token::Offset(_) => {
                    self.state = State::ReadText;
                }
                Token::Eol => self.state = State::StartOfLine,
                Token::Eof => self.write_current_packet()?,
            },

            // ----- reading byte values --------------------------------------
            State::ReadByte => match token {
                Token::Byte(byte) => self.write_byte(byte)?,
                Token::Text(_) | Token::Directive(_) | Token::Offset(_) => {
                    self.state = State::ReadText;
                }
                Token::Eol => self.state = State::StartOfLine,
                Token::Eof => self.write_current_packet()?,
            },

            // ----- trailing text, ignored until end of line -----------------
            State::ReadText => match token {
                Token::Eol => self.state = State::StartOfLine,
                Token::Eof => self.write_current_packet()?,
                _ => {}
            },
        }
        Ok(())
    }

    /// Stores one byte value into the current packet; a full packet is
    /// completed on the spot and the following bytes open the next one.
    fn write_byte(&mut self, byte: &str) -> Result<(), ImportError> {
        let num = parse_num(byte, false, self.offset_base);
        if self.buf.write_byte(num as u8) {
            self.start_new_packet()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        DummyHeaders, HexdumpConfig, ImportConfig, ImportMode, ImportSession, OffsetBase,
    };
    use super::*;
    use crate::capture::{Direction, MemorySink};
    use crate::packet::PortPair;
    use pretty_assertions::assert_eq;

    fn hexdump_config(offset_base: OffsetBase) -> ImportConfig {
        ImportConfig {
            mode: ImportMode::Hexdump(HexdumpConfig { offset_base, has_direction: false }),
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
    fn parse_num_bases() {
        assert_eq!(parse_num("ff", false, OffsetBase::Hex), 0xff);
        assert_eq!(parse_num("0010", true, OffsetBase::Hex), 0x10);
        assert_eq!(parse_num("0010", true, OffsetBase::Dec), 10);
        assert_eq!(parse_num("0010", true, OffsetBase::Oct), 8);
        assert_eq!(parse_num("0x10", true, OffsetBase::None), 16);
        assert_eq!(parse_num("010", true, OffsetBase::None), 8);
        assert_eq!(parse_num("10", true, OffsetBase::None), 10);
        // strtoul semantics: the valid prefix counts
        assert_eq!(parse_num("12junk", true, OffsetBase::Dec), 12);
        assert_eq!(parse_num("junk", true, OffsetBase::Dec), 0);
    }

    #[test]
    fn classify_fields() {
        assert_eq!(classify("ab"), Token::Byte("ab"));
        assert_eq!(classify("0000"), Token::Offset("0000"));
        assert_eq!(classify("0"), Token::Offset("0"));
        assert_eq!(classify("0010:"), Token::Offset("0010"));
        assert_eq!(classify("hello"), Token::Text("hello"));
        assert_eq!(classify("ab,"), Token::Text("ab,"));
    }

    #[test]
    fn minimal_hexdump() {
        let sink = import(&hexdump_config(OffsetBase::Hex), "0000 ab cd ef\n");
        assert_eq!(sink.payloads(), vec![&[0xab, 0xcd, 0xef][..]]);
        let (record, _) = &sink.records[0];
        assert_eq!(record.caplen, 3);
        assert_eq!(record.wirelen, 3);
    }

    #[test]
    fn continuation_and_zero_offset_split() {
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "0000 01 02\n0002 03\n0000 ff\n",
        );
        assert_eq!(sink.payloads(), vec![&[0x01, 0x02, 0x03][..], &[0xff][..]]);
    }

    #[test]
    fn larger_offset_abandons_packet() {
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "0000 01 02\n0010 03\n0000 ff\n",
        );
        // the bytes on the mismatching line never join a packet; the partial
        // packet is closed out as-is and parsing resynchronizes at offset 0
        assert_eq!(sink.payloads(), vec![&[0x01, 0x02][..], &[0xff][..]]);
    }

    #[test]
    fn smaller_offset_retracts_text_lookalikes() {
        // "0a 0b" of the first line is really text, revealed by the second
        // line's offset; the retraction keeps the stream aligned
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "0000 01 02 0a 0b\n0002 03 04\n",
        );
        assert_eq!(sink.payloads(), vec![&[0x01, 0x02, 0x03, 0x04][..]]);
    }

    #[test]
    fn trailing_text_is_ignored() {
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "0000 48 49 HI..\n0002 4a J.\n",
        );
        assert_eq!(sink.payloads(), vec![&[0x48, 0x49, 0x4a][..]]);
    }

    #[test]
    fn bytes_after_text_are_ignored() {
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "0000 01 somewords 02 03\n",
        );
        assert_eq!(sink.payloads(), vec![&[0x01][..]]);
    }

    #[test]
    fn comments_and_directives_are_skipped() {
        let sink = import(
            &hexdump_config(OffsetBase::Hex),
            "# a comment\n#TEXT2PCAP set-something\n0000 aa\n",
        );
        assert_eq!(sink.payloads(), vec![&[0xaa][..]]);
    }

    #[test]
    fn decimal_offsets() {
        let sink = import(
            &hexdump_config(OffsetBase::Dec),
            "0000 01 02 03 04 05 06 07 08 09 0a\n0010 0b\n",
        );
        assert_eq!(
            sink.payloads(),
            vec![&[1, 2, 3, 4, 5, 6, 7, 8, 9, 0x0a, 0x0b][..]]
        );
    }

    #[test]
    fn max_length_splits_packets() {
        let mut config = hexdump_config(OffsetBase::Hex);
        config.max_frame_length = 4;
        let sink = import(&config, "0000 01 02 03 04 05 06\n");
        assert_eq!(sink.payloads(), vec![&[1, 2, 3, 4][..], &[5, 6][..]]);
    }

    #[test]
    fn direction_from_preamble() {
        let config = ImportConfig {
            mode: ImportMode::Hexdump(HexdumpConfig {
                offset_base: OffsetBase::Hex,
                has_direction: true,
            }),
            timestamp_format: None,
            encapsulation: 1,
            headers: DummyHeaders::None,
            max_frame_length: 65535,
        };
        let sink = import(&config, "I\n0000 01\nO\n0000 02\n0000 03\n");
        let dirs: Vec<Direction> = sink.records.iter().map(|(r, _)| r.direction).collect();
        // the third packet has an empty preamble, so its direction is unknown
        assert_eq!(
            dirs,
            vec![Direction::Inbound, Direction::Outbound, Direction::Unknown]
        );
    }

    #[test]
    fn tcp_sequence_progression_across_directions() {
        let config = ImportConfig {
            mode: ImportMode::Hexdump(HexdumpConfig {
                offset_base: OffsetBase::Hex,
                has_direction: true,
            }),
            timestamp_format: None,
            encapsulation: 1,
            headers: DummyHeaders::Tcp {
                ports: PortPair { src: 4000, dst: 4001 },
            },
            max_frame_length: 65535,
        };
        // two inbound packets of 10 and 5 bytes, then one outbound of 7
        let text = "I\n0000 00 01 02 03 04 05 06 07 08 09\n\
                    I\n0000 00 01 02 03 04\n\
                    O\n0000 00 01 02 03 04 05 06\n";
        let sink = import(&config, text);
        assert_eq!(sink.records.len(), 3);

        let seq = |frame: &[u8]| u32::from_be_bytes([frame[38], frame[39], frame[40], frame[41]]);
        let ack = |frame: &[u8]| u32::from_be_bytes([frame[42], frame[43], frame[44], frame[45]]);
        let frames = sink.payloads();

        assert_eq!(seq(frames[0]), 0);
        assert_eq!(seq(frames[1]), 10);
        assert_eq!(seq(frames[2]), 0);
        // the outbound record acknowledges the 15 inbound bytes
        assert_eq!(ack(frames[2]), 15);
        // inbound source port, outbound gets the pair swapped
        assert_eq!(&frames[0][34..36], &4000u16.to_be_bytes());
        assert_eq!(&frames[2][34..36], &4001u16.to_be_bytes());
    }

    #[test]
    fn no_offset_column_accumulates_until_flush() {
        let sink = import(&hexdump_config(OffsetBase::None), "aa bb\ncc\n");
        assert_eq!(sink.payloads(), vec![&[0xaa, 0xbb, 0xcc][..]]);
    }
}
