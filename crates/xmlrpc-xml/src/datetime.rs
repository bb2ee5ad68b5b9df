//! `dateTime.iso8601` encoding and decoding.
//!
//! XML-RPC dates use a constrained ISO 8601 subset:
//!
//! ```text
//! YYYY[-]MM[-]DD['T'HH[[:]MM[[:]SS[.frac]]]][Z|±HH[:]MM]
//! ```
//!
//! Most servers send the compact `20231225T09:00:00` form with no offset at
//! all. Such values are interpreted in a caller-supplied [`Zone`], which
//! defaults to the host's local time.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone, Utc,
};
use regex::Regex;

use crate::error::XmlRpcError;

static ISO8601: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^([0-9]{4})(?:-?([0-9]{2}))?(?:-?([0-9]{2}))?",
        r"(?:T([0-9]{2})(?::?([0-9]{2}))?(?::?([0-9]{2}))?(?:\.([0-9]+))?",
        r"(Z|([+-])([0-9]{2})(?::?([0-9]{2}))?)?)?$",
    ))
    .unwrap_or_else(|e| unreachable!("ISO 8601 pattern is valid: {e}"))
});

/// Source of the "local" UTC offset.
///
/// Used when decoding a timestamp without an explicit offset and when
/// encoding local wall-clock fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's current time zone rules.
    #[default]
    System,
    /// A pinned offset.
    Fixed(FixedOffset),
}

impl Zone {
    /// A zone pinned to UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// The offset in effect at the given wall-clock time.
    fn offset_at_local(self, naive: &NaiveDateTime) -> FixedOffset {
        match self {
            Self::Fixed(offset) => offset,
            Self::System => match Local.offset_from_local_datetime(naive) {
                LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset,
                // Skipped by a DST transition.
                LocalResult::None => Local.offset_from_utc_datetime(naive),
            },
        }
    }

    /// Convert an instant into this zone's wall-clock representation.
    fn to_local(self, date: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Self::Fixed(offset) => date.with_timezone(&offset),
            Self::System => date.with_timezone(&Local).fixed_offset(),
        }
    }
}

/// Formatting options for [`encode_iso8601`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iso8601Options {
    /// Separate time fields with `:`.
    pub colons: bool,
    /// Separate date fields with `-`.
    pub hyphens: bool,
    /// Emit wall-clock fields in `zone` instead of UTC with a `Z` suffix.
    pub local: bool,
    /// Append milliseconds.
    pub millis: bool,
    /// Append the `±HH:MM` offset when `local` is set. Off by default since
    /// many servers reject it.
    pub offset: bool,
    /// Zone used for local fields.
    pub zone: Zone,
}

impl Default for Iso8601Options {
    fn default() -> Self {
        Self {
            colons: true,
            hyphens: false,
            local: true,
            millis: false,
            offset: false,
            zone: Zone::System,
        }
    }
}

/// Decode a `dateTime.iso8601` text.
///
/// Missing month and day default to `01`, missing time fields to `00`. When
/// the text carries no offset, the offset `zone` has at that wall-clock time
/// is assumed.
///
/// # Errors
///
/// Returns `XmlRpcError::Format` if the text does not match the accepted
/// pattern or names a date/time that does not exist.
pub fn decode_iso8601(text: &str, zone: Zone) -> Result<DateTime<FixedOffset>, XmlRpcError> {
    let format_error = || XmlRpcError::Format(format!("expected an ISO 8601 datetime but got '{text}'"));

    let caps = ISO8601.captures(text.trim()).ok_or_else(format_error)?;
    let field = |i: usize, default: u32| -> Result<u32, XmlRpcError> {
        caps.get(i)
            .map_or(Ok(default), |m| m.as_str().parse().map_err(|_| format_error()))
    };

    let year: i32 = caps[1].parse().map_err(|_| format_error())?;
    let date = NaiveDate::from_ymd_opt(year, field(2, 1)?, field(3, 1)?).ok_or_else(format_error)?;
    let nanos = caps.get(7).map_or(Ok(0), |m| fraction_to_nanos(m.as_str()))?;
    let time = NaiveTime::from_hms_nano_opt(field(4, 0)?, field(5, 0)?, field(6, 0)?, nanos)
        .ok_or_else(format_error)?;
    let naive = NaiveDateTime::new(date, time);

    let offset = match caps.get(8).map(|m| m.as_str()) {
        None => zone.offset_at_local(&naive),
        Some("Z") => Utc.fix(),
        Some(_) => {
            let seconds = field(10, 0)? * 3600 + field(11, 0)? * 60;
            let seconds = i32::try_from(seconds).map_err(|_| format_error())?;
            let signed = if &caps[9] == "-" { -seconds } else { seconds };
            FixedOffset::east_opt(signed).ok_or_else(format_error)?
        }
    };

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(format_error)
}

/// Scale a fractional-seconds digit string to nanoseconds.
fn fraction_to_nanos(digits: &str) -> Result<u32, XmlRpcError> {
    let mut scaled: String = digits.chars().take(9).collect();
    while scaled.len() < 9 {
        scaled.push('0');
    }
    scaled
        .parse()
        .map_err(|_| XmlRpcError::Format(format!("invalid fractional seconds '{digits}'")))
}

/// Encode a timestamp as `dateTime.iso8601` text.
///
/// # Errors
///
/// Returns `XmlRpcError::UnsupportedValue` if the year of the emitted fields
/// falls outside `0000..=9999`, which the four-digit year cannot carry.
pub fn encode_iso8601(
    date: &DateTime<FixedOffset>,
    options: &Iso8601Options,
) -> Result<String, XmlRpcError> {
    let fields = if options.local {
        options.zone.to_local(date)
    } else {
        date.with_timezone(&Utc.fix())
    };
    if !(0..=9999).contains(&fields.year()) {
        return Err(XmlRpcError::UnsupportedValue(format!(
            "year {} does not fit a four-digit dateTime.iso8601",
            fields.year()
        )));
    }

    let date_format = if options.hyphens { "%Y-%m-%d" } else { "%Y%m%d" };
    let time_format = if options.colons { "%H:%M:%S" } else { "%H%M%S" };

    let mut out = format!(
        "{}T{}",
        fields.format(date_format),
        fields.format(time_format)
    );
    if options.millis {
        out.push_str(&fields.format("%.3f").to_string());
    }
    if !options.local {
        out.push('Z');
    } else if options.offset {
        out.push_str(&format_offset(*fields.offset()));
    }
    Ok(out)
}

/// Format an offset as `Z` or `±HH:MM`.
fn format_offset(offset: FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "Z".to_owned();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
}
