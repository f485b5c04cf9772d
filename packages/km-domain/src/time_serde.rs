//! `createdAt` wire format: RFC 3339 in UTC on output. Input also accepts the bare
//! `YYYY-MM-DD` form understood by [`crate::query::parse_datetime`].

use serde::{Deserialize, Deserializer, Serializer, de, ser};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let utc = value.to_offset(UtcOffset::UTC).format(&Rfc3339).map_err(ser::Error::custom)?;

	serializer.serialize_str(&utc)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	crate::query::parse_datetime(&raw).map_err(de::Error::custom)
}
