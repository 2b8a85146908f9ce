use serde::{Deserialize, Deserializer, Serializer, de};
use std::time::Duration;

/// Accepts humantime strings such as `"30s"` or `"2m 30s"`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    value
        .map(|text| humantime::parse_duration(&text).map_err(de::Error::custom))
        .transpose()
}

pub fn serialize_duration<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => serializer.serialize_str(&humantime::format_duration(*duration).to_string()),
        None => serializer.serialize_none(),
    }
}
