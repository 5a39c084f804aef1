use core::fmt;
use log::trace;
use std::str::FromStr;

const INVALID: i8 = -1;
const WHITESPACE: i8 = -2;

/// Describes how one plain textual encoding maps characters to bits.
///
/// A unit is the smallest group of characters that converts to a whole number
/// of bytes: `chars_per_unit * bits_per_char == bytes_per_unit * 8`. The table
/// maps every possible input byte to its digit value, WHITESPACE (skipped) or
/// INVALID (stops the decoder).
pub struct Decoding {
    pub name: &'static str,
    chars_per_unit: u32,
    bytes_per_unit: usize,
    bits_per_char: u32,
    table: [i8; 256],
}

const fn whitespace_defaults() -> [i8; 256] {
    let mut table = [INVALID; 256];
    table[b' ' as usize] = WHITESPACE;
    table[b'\t' as usize] = WHITESPACE;
    table[b'\n' as usize] = WHITESPACE;
    table[0x0b] = WHITESPACE; // vertical tab
    table[0x0c] = WHITESPACE; // form feed
    table[b'\r' as usize] = WHITESPACE;
    table
}

const fn digit_range(mut table: [i8; 256], start: u8, count: u8, first_value: i8) -> [i8; 256] {
    let mut i = 0;
    while i < count {
        table[(start + i) as usize] = first_value + i as i8;
        i += 1;
    }
    table
}

const fn hex_table() -> [i8; 256] {
    let mut table = whitespace_defaults();
    // ':' shows up as a byte separator in MAC-address style dumps
    table[b':' as usize] = WHITESPACE;
    table = digit_range(table, b'0', 10, 0);
    table = digit_range(table, b'A', 6, 10);
    table = digit_range(table, b'a', 6, 10);
    table
}

const fn oct_table() -> [i8; 256] {
    digit_range(whitespace_defaults(), b'0', 8, 0)
}

const fn bin_table() -> [i8; 256] {
    digit_range(whitespace_defaults(), b'0', 2, 0)
}

const fn base64_table() -> [i8; 256] {
    let mut table = whitespace_defaults();
    table = digit_range(table, b'A', 26, 0);
    table = digit_range(table, b'a', 26, 26);
    table = digit_range(table, b'0', 10, 52);
    table[b'+' as usize] = 62;
    table[b'/' as usize] = 63;
    // padding at the end, the decoder doesn't need it, so just ignores it
    table[b'=' as usize] = WHITESPACE;
    table
}

pub static HEX: Decoding = Decoding {
    name: "hex",
    chars_per_unit: 2,
    bytes_per_unit: 1,
    bits_per_char: 4,
    table: hex_table(),
};

pub static OCT: Decoding = Decoding {
    name: "oct",
    chars_per_unit: 8,
    bytes_per_unit: 3,
    bits_per_char: 3,
    table: oct_table(),
};

pub static BIN: Decoding = Decoding {
    name: "bin",
    chars_per_unit: 8,
    bytes_per_unit: 1,
    bits_per_char: 1,
    table: bin_table(),
};

pub static BASE64: Decoding = Decoding {
    name: "base64",
    chars_per_unit: 4,
    bytes_per_unit: 3,
    bits_per_char: 6,
    table: base64_table(),
};

/// Which plain encoding the data fields of a regex import use. No automatic
/// detection is attempted; the caller picks one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Hex,
    Oct,
    Bin,
    Base64,
}

impl Encoding {
    pub fn decoding(self) -> &'static Decoding {
        match self {
            Encoding::Hex => &HEX,
            Encoding::Oct => &OCT,
            Encoding::Bin => &BIN,
            Encoding::Base64 => &BASE64,
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(Encoding::Hex),
            "oct" => Ok(Encoding::Oct),
            "bin" => Ok(Encoding::Bin),
            "base64" => Ok(Encoding::Base64),
            _ => Err(format!("unknown data encoding '{}', expected hex, oct, bin or base64", s)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.decoding().name)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DecodeResult {
    /// Input characters consumed, up to but not including an invalid one.
    pub consumed: usize,
    /// Bytes stored into `dest`.
    pub produced: usize,
    /// False when decoding stopped on an invalid character.
    pub ok: bool,
}

/// Decodes characters from `src` into `dest` until `src` is exhausted, `dest`
/// cannot hold another full unit, or an invalid character is read.
///
/// Digits accumulate in a shift register and every complete unit is emitted
/// most-significant-byte first. When decoding stops, any whole bytes still
/// recoverable from a trailing partial unit are flushed and the remaining bits
/// are discarded. The decoder is resumable: call again with the cursors
/// advanced by `consumed`/`produced` once `dest` has room again.
pub fn decode(src: &[u8], dest: &mut [u8], encoding: &Decoding) -> DecodeResult {
    let mut register: u64 = 0;
    let mut chars: u32 = 0;
    let mut consumed = 0;
    let mut produced = 0;
    let mut ok = true;

    while consumed < src.len() && produced + encoding.bytes_per_unit <= dest.len() {
        let c = src[consumed];
        match encoding.table[c as usize] {
            INVALID => {
                ok = false;
                break;
            }
            WHITESPACE => trace!("skipping separator 0x{:02x} in {} data", c, encoding.name),
            value => {
                register = register << encoding.bits_per_char | value as u64;
                chars += 1;
                if chars == encoding.chars_per_unit {
                    chars = 0;
                    let mut j = encoding.bytes_per_unit;
                    while j > 0 {
                        dest[produced] = (register >> (j * 8 - 8)) as u8;
                        produced += 1;
                        j -= 1;
                    }
                }
            }
        }
        consumed += 1;
    }

    // Salvage the whole bytes of a partial unit, top of the register first.
    let mut bits = chars * encoding.bits_per_char;
    while bits >= 8 {
        dest[produced] = (register >> (bits - 8)) as u8;
        produced += 1;
        bits -= 8;
    }

    DecodeResult { consumed, produced, ok }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_all(src: &[u8], encoding: &Decoding) -> (Vec<u8>, bool) {
        let mut dest = vec![0u8; src.len() + 8];
        let res = decode(src, &mut dest, encoding);
        dest.truncate(res.produced);
        (dest, res.ok)
    }

    fn encode(data: &[u8], encoding: &Decoding) -> String {
        const HEX_DIGITS: &[u8] = b"0123456789abcdef";
        const B64_DIGITS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut out = String::new();
        match encoding.name {
            "hex" => {
                for b in data {
                    out.push(HEX_DIGITS[(b >> 4) as usize] as char);
                    out.push(HEX_DIGITS[(b & 0xf) as usize] as char);
                }
            }
            "bin" => {
                for b in data {
                    for i in (0..8).rev() {
                        out.push(if b >> i & 1 == 1 { '1' } else { '0' });
                    }
                }
            }
            "oct" => {
                for chunk in data.chunks(3) {
                    let mut reg: u32 = 0;
                    for (i, b) in chunk.iter().enumerate() {
                        reg |= (*b as u32) << (16 - 8 * i);
                    }
                    let digits = (chunk.len() * 8 + 2) / 3;
                    for i in 0..digits {
                        out.push((b'0' + (reg >> (24 - 3 - 3 * i) & 0x7) as u8) as char);
                    }
                }
            }
            "base64" => {
                for chunk in data.chunks(3) {
                    let mut reg: u32 = 0;
                    for (i, b) in chunk.iter().enumerate() {
                        reg |= (*b as u32) << (16 - 8 * i);
                    }
                    let digits = (chunk.len() * 8 + 5) / 6;
                    for i in 0..digits {
                        out.push(B64_DIGITS[(reg >> (24 - 6 - 6 * i) & 0x3f) as usize] as char);
                    }
                    for _ in digits..4 {
                        out.push('=');
                    }
                }
            }
            other => panic!("no encoder for {}", other),
        }
        out
    }

    #[test]
    fn hex_basic() {
        let (out, ok) = decode_all(b"00ab ff 12", &HEX);
        assert!(ok);
        assert_eq!(out, vec![0x00, 0xab, 0xff, 0x12]);
    }

    #[test]
    fn hex_colon_is_separator() {
        let (out, ok) = decode_all(b"de:ad:be:ef", &HEX);
        assert!(ok);
        assert_eq!(out, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn hex_invalid_stops_with_partial_flush() {
        let mut dest = [0u8; 8];
        // "abc" holds one full byte plus a partial unit of one whole nibble,
        // which is not a whole byte, so only 0xab comes out
        let res = decode(b"abcx01", &mut dest, &HEX);
        assert_eq!(res, DecodeResult { consumed: 3, produced: 1, ok: false });
        assert_eq!(dest[0], 0xab);
    }

    #[test]
    fn bin_basic() {
        let (out, ok) = decode_all(b"01000001 01000010", &BIN);
        assert!(ok);
        assert_eq!(out, b"AB".to_vec());
    }

    #[test]
    fn oct_basic() {
        // 24 bits: 0o101 0o102 0o103 packed into one 8-char unit
        let (out, ok) = decode_all(b"20241103", &OCT);
        assert!(ok);
        assert_eq!(out, b"ABC".to_vec());
    }

    #[test]
    fn oct_partial_unit_recovers_whole_bytes() {
        // 6 chars = 18 bits: two whole bytes recoverable, 2 bits dropped
        let (out, ok) = decode_all(b"202411", &OCT);
        assert!(ok);
        assert_eq!(out, vec![0x41, 0x42]);
    }

    #[test]
    fn base64_with_padding() {
        let (out, ok) = decode_all(b"TWFu TWE=", &BASE64);
        assert!(ok);
        assert_eq!(out, b"ManMa".to_vec());
    }

    #[test]
    fn dest_stops_at_unit_boundary() {
        let mut dest = [0u8; 3];
        let res = decode(b"00112233", &mut dest, &HEX);
        assert_eq!(res, DecodeResult { consumed: 6, produced: 3, ok: true });
        assert_eq!(dest, [0x00, 0x11, 0x22]);
        // resuming with the advanced cursor picks up the rest
        let mut rest = [0u8; 3];
        let res = decode(&b"00112233"[res.consumed..], &mut rest, &HEX);
        assert_eq!(res, DecodeResult { consumed: 2, produced: 1, ok: true });
        assert_eq!(rest[0], 0x33);
    }

    #[test]
    fn chunked_decoding_matches_oneshot() {
        let src = b"48656c6c6f2c20776f726c6421";
        let (expect, _) = decode_all(src, &HEX);
        // any split respecting unit boundaries accumulates the same output
        for cut in (0..src.len()).step_by(2) {
            let (mut head, ok) = decode_all(&src[..cut], &HEX);
            assert!(ok);
            let (tail, ok) = decode_all(&src[cut..], &HEX);
            assert!(ok);
            head.extend(tail);
            assert_eq!(head, expect);
        }
    }

    #[test]
    fn round_trips() {
        let data: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        for encoding in [&HEX, &OCT, &BIN, &BASE64].iter() {
            let text = encode(&data, encoding);
            let (out, ok) = decode_all(text.as_bytes(), encoding);
            assert!(ok, "{} round trip flagged invalid input", encoding.name);
            assert_eq!(out, data, "{} round trip mismatch", encoding.name);
        }
    }
}
