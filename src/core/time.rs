use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Whole seconds between two UTC timestamps, clamped at zero.
pub(crate) fn seconds_between(earlier: PrimitiveDateTime, later: PrimitiveDateTime) -> i64 {
    let delta = later.assume_utc().unix_timestamp() - earlier.assume_utc().unix_timestamp();
    delta.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time};

    fn at(hour: u8, minute: u8, second: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(at(10, 20, 30)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn seconds_between_clamps_negative() {
        assert_eq!(seconds_between(at(10, 0, 0), at(10, 0, 42)), 42);
        assert_eq!(seconds_between(at(10, 0, 42), at(10, 0, 0)), 0);
    }
}
