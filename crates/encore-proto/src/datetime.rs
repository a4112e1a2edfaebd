//! Packed calendar timestamps.
//!
//! Message reception times travel as a u64 with the calendar fields packed
//! into bit ranges:
//!
//! ```text
//! year << 26 | month << 22 | day << 17 | hour << 12 | minute << 6 | second
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Timelike};

/// Calendar timestamp in packed form (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PackedDateTime(u64);

impl PackedDateTime {
    /// Pack calendar fields.
    pub fn from_parts(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self(
            (u64::from(year) << 26)
                | (u64::from(month & 0xF) << 22)
                | (u64::from(day & 0x1F) << 17)
                | (u64::from(hour & 0x1F) << 12)
                | (u64::from(minute & 0x3F) << 6)
                | u64::from(second & 0x3F),
        )
    }

    /// Pack a unix timestamp. Out-of-range values pack as zero.
    pub fn from_unix_secs(secs: u64) -> Self {
        let Some(time) = i64::try_from(secs).ok().and_then(|s| DateTime::from_timestamp(s, 0)) else {
            return Self(0);
        };

        Self::from_parts(
            time.year().max(0) as u32,
            time.month(),
            time.day(),
            time.hour(),
            time.minute(),
            time.second(),
        )
    }

    /// Wrap a raw wire value.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw wire value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Year field.
    pub const fn year(self) -> u32 {
        (self.0 >> 26) as u32
    }

    /// Month field (1-12).
    pub const fn month(self) -> u32 {
        ((self.0 >> 22) & 0xF) as u32
    }

    /// Day-of-month field (1-31).
    pub const fn day(self) -> u32 {
        ((self.0 >> 17) & 0x1F) as u32
    }

    /// Hour field (0-23).
    pub const fn hour(self) -> u32 {
        ((self.0 >> 12) & 0x1F) as u32
    }

    /// Minute field (0-59).
    pub const fn minute(self) -> u32 {
        ((self.0 >> 6) & 0x3F) as u32
    }

    /// Second field (0-59).
    pub const fn second(self) -> u32 {
        (self.0 & 0x3F) as u32
    }

    /// Unix timestamp, if the fields describe a real calendar instant.
    pub fn to_unix_secs(self) -> Option<u64> {
        let date = NaiveDate::from_ymd_opt(self.year() as i32, self.month(), self.day())?;
        let time = date.and_hms_opt(self.hour(), self.minute(), self.second())?;
        u64::try_from(time.and_utc().timestamp()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_fields_into_documented_bits() {
        let packed = PackedDateTime::from_parts(2010, 10, 26, 13, 45, 7);
        assert_eq!(packed.value(), (2010 << 26) | (10 << 22) | (26 << 17) | (13 << 12) | (45 << 6) | 7);
        assert_eq!(packed.year(), 2010);
        assert_eq!(packed.month(), 10);
        assert_eq!(packed.day(), 26);
        assert_eq!(packed.hour(), 13);
        assert_eq!(packed.minute(), 45);
        assert_eq!(packed.second(), 7);
    }

    #[test]
    fn unix_round_trip() {
        // 2010-10-26T13:45:07Z
        let secs = 1_288_100_707;
        let packed = PackedDateTime::from_unix_secs(secs);
        assert_eq!((packed.year(), packed.month(), packed.day()), (2010, 10, 26));
        assert_eq!((packed.hour(), packed.minute(), packed.second()), (13, 45, 7));
        assert_eq!(packed.to_unix_secs(), Some(secs));
    }

    #[test]
    fn invalid_calendar_fields_have_no_unix_time() {
        assert_eq!(PackedDateTime::from_parts(2010, 2, 30, 0, 0, 0).to_unix_secs(), None);
    }
}
