use chrono::format::{parse_and_remainder, Parsed, StrftimeItems};
use chrono::{Datelike, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use log::trace;

/// Time precision stored per record: nanoseconds.
const SUBSEC_PREC: u32 = 9;

/// Parses packet timestamps using a strftime-style format with an optional
/// `%f` token marking a run of fractional-second digits.
///
/// Fields absent from the format default to "today, local", captured once
/// when the parser is created so every packet of an import shares the same
/// seed.
pub struct TimestampParser {
    head: String,
    tail: Option<String>,
    seed: NaiveDateTime,
}

impl TimestampParser {
    pub fn new(format: &str) -> Self {
        // split at the first %f; strftime itself has no fractions token
        let (head, tail) = match format.find("%f") {
            Some(pos) => (format[..pos].to_string(), Some(format[pos + 2..].to_string())),
            None => (format.to_string(), None),
        };
        TimestampParser {
            head,
            tail,
            seed: Local::now().naive_local(),
        }
    }

    /// Parses `field` into `sec`/`nsec`.
    ///
    /// Without `%f` in the format, `nsec` is bumped instead as an arbitrary
    /// counter so adjacent packets stay distinguishable. When the converted
    /// calendar time cannot be resolved in the local zone, the outgoing `sec`
    /// is bumped as a fallback.
    pub fn parse(&self, field: &str, sec: &mut i64, nsec: &mut u32) {
        let mut parsed = Parsed::new();

        if self.tail.is_none() {
            *nsec = nsec.wrapping_add(1);
        }

        let cursor = parse_and_remainder(&mut parsed, field, StrftimeItems::new(&self.head));
        if let (Ok(rest), Some(tail)) = (cursor, self.tail.as_deref()) {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits > 0 {
                let (run, after) = rest.split_at(digits);
                *nsec = rescale_subseconds(run);
                let _ = parse_and_remainder(&mut parsed, after, StrftimeItems::new(tail));
            } else {
                *nsec = nsec.wrapping_add(1);
            }
        }

        match self.resolve(&parsed) {
            Some(epoch) => *sec = epoch,
            None => *sec += 1,
        }
        trace!("parsed time '{}' ({}%f{}) -> {}s {}ns", field, self.head, self.tail.as_deref().unwrap_or(""), sec, nsec);
    }

    /// Completes a partially parsed calendar time from the seed and resolves
    /// it to epoch seconds in the local zone.
    fn resolve(&self, parsed: &Parsed) -> Option<i64> {
        let year = parsed.year.map(|y| y as i32).unwrap_or_else(|| self.seed.year());
        let month = parsed.month.map(|m| m as u32).unwrap_or_else(|| self.seed.month());
        let day = parsed.day.map(|d| d as u32).unwrap_or_else(|| self.seed.day());
        let hour = match (parsed.hour_div_12, parsed.hour_mod_12) {
            (Some(div), Some(rem)) => div as u32 * 12 + rem as u32,
            _ => self.seed.hour(),
        };
        let minute = parsed.minute.map(|m| m as u32).unwrap_or_else(|| self.seed.minute());
        let second = parsed.second.map(|s| s as u32).unwrap_or_else(|| self.seed.second());

        let time = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
        match Local.from_local_datetime(&time) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t.timestamp()),
            LocalResult::None => None,
        }
    }
}

/// Rescales a run of fractional-second digits to nanoseconds: N digits are
/// units of 10^-N seconds, so multiply by 10^(9-N), or divide when more than
/// nine digits are given.
fn rescale_subseconds(run: &str) -> u32 {
    let mut value: u64 = 0;
    for b in run.bytes() {
        value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
    }
    let len = run.len() as u32;
    if len <= SUBSEC_PREC {
        for _ in 0..SUBSEC_PREC - len {
            value = value.saturating_mul(10);
        }
    } else {
        for _ in 0..len - SUBSEC_PREC {
            value /= 10;
        }
    }
    value.min(u64::from(u32::MAX)) as u32
}
