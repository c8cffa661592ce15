use time::{
    format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Client clocks report milliseconds since the epoch.
pub(crate) fn from_unix_millis(millis: i64) -> Option<PrimitiveDateTime> {
    let nanos = i128::from(millis).checked_mul(1_000_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok().map(to_primitive_utc)
}

pub(crate) fn parse_rfc3339(value: &str) -> Option<PrimitiveDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok().map(to_primitive_utc)
}

/// `None` for untimed tests.
pub(crate) fn deadline(
    started_at: PrimitiveDateTime,
    duration_minutes: Option<i32>,
) -> Option<PrimitiveDateTime> {
    let minutes = duration_minutes.filter(|minutes| *minutes > 0)?;
    started_at.checked_add(Duration::minutes(i64::from(minutes)))
}
