//! Timestamp helpers shared by the wire types.
//!
//! The push channel emits RFC 3339 strings while the snapshot endpoints emit
//! epoch milliseconds, so event timestamps accept both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
}

pub mod flexible {
    use super::*;

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawTimestamp>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawTimestamp::Text(text)) => {
                DateTime::parse_from_rfc3339(text.trim())
                    .map(|dt| Some(dt.with_timezone(&Utc)))
                    .map_err(de::Error::custom)
            }
            Some(RawTimestamp::Millis(millis)) => {
                DateTime::from_timestamp_millis(millis).map(Some).ok_or_else(
                    || de::Error::custom(format!("timestamp out of range: {millis}")),
                )
            }
        }
    }

    pub fn serialize<S>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Stamp {
        #[serde(default, with = "super::flexible")]
        at: Option<chrono::DateTime<chrono::Utc>>,
    }

    #[test]
    fn accepts_rfc3339_and_millis() {
        let a: Stamp =
            serde_json::from_str(r#"{"at":"2024-05-01T10:00:00Z"}"#).unwrap();
        let b: Stamp = serde_json::from_str(r#"{"at":1714557600000}"#).unwrap();
        assert_eq!(a.at, b.at);
    }

    #[test]
    fn missing_and_null_are_none() {
        let a: Stamp = serde_json::from_str("{}").unwrap();
        let b: Stamp = serde_json::from_str(r#"{"at":null}"#).unwrap();
        assert!(a.at.is_none());
        assert!(b.at.is_none());
    }
}
