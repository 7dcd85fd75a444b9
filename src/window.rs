//! Anti-replay checks on the time login requests were signed at.
//!
//! Signed requests are only accepted for a short window after they are signed.
//! The window is asymmetric: signatures up to five minutes old are accepted
//! but only thirty seconds of clock skew are tolerated for signatures from the future.
use anyhow::Result;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::Duration;
use time::OffsetDateTime;
use time::PrimitiveDateTime;

use crate::errors::RequestTooFarInFuture;
use crate::errors::RequestTooOld;
use crate::errors::SigningTimeParse;

/// Maximum age of a signature when the request is received.
pub const MAX_SIGNATURE_AGE: Duration = Duration::minutes(5);

/// Maximum time a signature can claim to be made after the request is received.
pub const MAX_SIGNATURE_SKEW: Duration = Duration::seconds(30);

/// ISO 8601 format for signing times, such as `2006-01-02T15:04:05Z`.
pub const SIGNING_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// [`SIGNING_TIME_FORMAT`] with fractional seconds, such as `2006-01-02T15:04:05.5Z`.
pub const SIGNING_TIME_FRACTION_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z");

/// Default `date` output format of common shells, such as `Mon Jan 2 15:04:05 MST 2006`.
///
/// The zone abbreviation is removed before parsing with this format.
const SHELL_TIME_FORMAT: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short] [month repr:short] [day padding:none] [hour]:[minute]:[second] [year]"
);

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Return the current time.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] reading the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// [`Clock`] always returning the same time, for tests.
#[cfg(any(test, feature = "test-fixture"))]
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub OffsetDateTime);

#[cfg(any(test, feature = "test-fixture"))]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Parse a signing time in the ISO 8601 or shell `date` formats, in that order.
///
/// ISO 8601 times may include fractional seconds.
pub fn parse_signing_time(raw: &str) -> Result<OffsetDateTime> {
    for format in [SIGNING_TIME_FORMAT, SIGNING_TIME_FRACTION_FORMAT] {
        if let Ok(time) = PrimitiveDateTime::parse(raw, format) {
            return Ok(time.assume_utc());
        }
    }
    if let Some(time) = parse_shell_time(raw) {
        return Ok(time);
    }
    anyhow::bail!(SigningTimeParse {
        raw: raw.to_string(),
    })
}

/// Ensure a request signed at `signed` is accepted when received at `received`.
///
/// The `raw` signing time is reported in errors to help debug client formatting issues.
pub fn check_window(signed: OffsetDateTime, received: OffsetDateTime, raw: &str) -> Result<()> {
    if signed < received - MAX_SIGNATURE_AGE {
        anyhow::bail!(RequestTooOld {
            raw: raw.to_string(),
            received,
            signed,
        });
    }
    if signed > received + MAX_SIGNATURE_SKEW {
        anyhow::bail!(RequestTooFarInFuture {
            raw: raw.to_string(),
            received,
            signed,
        });
    }
    Ok(())
}

/// Parse the shell `date` format, treating zone abbreviations as UTC.
///
/// Runs of whitespace are treated as a single space since shells pad days to two characters.
fn parse_shell_time(raw: &str) -> Option<OffsetDateTime> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() != 6 {
        return None;
    }
    let zone = parts[4];
    let zone_ok = (3..=5).contains(&zone.len()) && zone.chars().all(|c| c.is_ascii_alphabetic());
    if !zone_ok {
        return None;
    }
    let normalised = format!(
        "{} {} {} {} {}",
        parts[0], parts[1], parts[2], parts[3], parts[5]
    );
    PrimitiveDateTime::parse(&normalised, SHELL_TIME_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use time::Duration;

    use super::check_window;
    use super::parse_signing_time;
    use crate::errors::RequestTooFarInFuture;
    use crate::errors::RequestTooOld;
    use crate::errors::SigningTimeParse;

    #[test]
    fn parse_iso_format() {
        let time = parse_signing_time("2019-05-20T21:31:10Z").unwrap();
        assert_eq!(time, datetime!(2019-05-20 21:31:10 UTC));
    }

    #[test]
    fn parse_iso_format_with_fraction() {
        let time = parse_signing_time("2019-05-20T21:31:10.5Z").unwrap();
        assert_eq!(time, datetime!(2019-05-20 21:31:10.5 UTC));
        let time = parse_signing_time("2019-05-20T21:31:10.123456789Z").unwrap();
        assert_eq!(time, datetime!(2019-05-20 21:31:10.123456789 UTC));
    }

    #[test]
    fn parse_shell_format() {
        let time = parse_signing_time("Mon May 20 21:31:10 UTC 2019").unwrap();
        assert_eq!(time, datetime!(2019-05-20 21:31:10 UTC));
    }

    #[test]
    fn parse_shell_format_padded_day() {
        let time = parse_signing_time("Thu May  2 08:01:02 MST 2019").unwrap();
        assert_eq!(time, datetime!(2019-05-02 08:01:02 UTC));
    }

    #[test]
    fn parse_rejects_other_formats() {
        let inputs = [
            "",
            "2019-05-20 21:31:10",
            "2019-05-20T21:31:10+01:00",
            "2019-05-20T21:31:10.Z",
            "1558387870",
            "Mon May 20 21:31:10 2019",
            "Mon May 20 21:31:10 +0100 2019",
        ];
        for input in inputs {
            let error = parse_signing_time(input).unwrap_err();
            let error = error.downcast_ref::<SigningTimeParse>().unwrap();
            assert_eq!(error.raw, input);
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let received = datetime!(2019-05-20 21:31:10 UTC);
        let offsets = [
            Duration::minutes(-5),
            Duration::minutes(-1),
            Duration::ZERO,
            Duration::seconds(29),
            Duration::seconds(30),
        ];
        for offset in offsets {
            check_window(received + offset, received, "test").unwrap();
        }
    }

    #[test]
    fn window_rejects_old_requests() {
        let received = datetime!(2019-05-20 21:31:10 UTC);
        let signed = received - Duration::minutes(5) - Duration::seconds(1);
        let error = check_window(signed, received, "raw-value").unwrap_err();
        let error = error.downcast_ref::<RequestTooOld>().unwrap();
        assert_eq!(error.raw, "raw-value");
    }

    #[test]
    fn window_rejects_replay_after_six_minutes() {
        let signed = datetime!(2019-05-20 21:31:10 UTC);
        let received = signed + Duration::minutes(6);
        let error = check_window(signed, received, "replay").unwrap_err();
        assert!(error.is::<RequestTooOld>());
    }

    #[test]
    fn window_rejects_future_requests() {
        let received = datetime!(2019-05-20 21:31:10 UTC);
        let signed = received + Duration::seconds(31);
        let error = check_window(signed, received, "raw-value").unwrap_err();
        let error = error.downcast_ref::<RequestTooFarInFuture>().unwrap();
        assert_eq!(error.raw, "raw-value");
    }
}
