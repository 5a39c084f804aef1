use crc::{Crc, CRC_32_ISCSI};

/// Castagnoli CRC-32, the SCTP packet checksum.
pub const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// One's-complement 16-bit Internet checksum over a list of spans, as used by
/// the IPv4 header and the UDP/TCP pseudo-header sums.
///
/// Spans are treated as one concatenated byte stream: an odd-length span
/// carries its dangling byte into the next one, and a final dangling byte is
/// padded with a zero low byte. The result is the value to store in the
/// (zeroed) checksum field, in its natural big-endian interpretation.
pub fn internet_checksum(spans: &[&[u8]]) -> u16 {
    let mut sum: u32 = 0;
    let mut bytes = spans.iter().flat_map(|span| span.iter().copied());
    loop {
        match (bytes.next(), bytes.next()) {
            (Some(hi), Some(lo)) => sum += u32::from(u16::from_be_bytes([hi, lo])),
            (Some(hi), None) => {
                sum += u32::from(u16::from_be_bytes([hi, 0]));
                break;
            }
            _ => break,
        }
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Chained CRC32C across spans: the SCTP checksum covers the common header,
/// the optional DATA chunk header and the padded payload without those ever
/// being contiguous in memory.
pub fn crc32c(spans: &[&[u8]]) -> u32 {
    let mut digest = CRC32C.digest();
    for span in spans {
        digest.update(span);
    }
    digest.finalize()
}
