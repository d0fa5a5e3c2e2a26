//! Raw input events: network-flow and web-request fields in one lenient record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One observed event. Every field is optional; missing fields take the defaults
/// documented on each consumer. Values of the wrong type are coerced where they
/// carry a number or text (`"443"`, `1500.0`) and otherwise read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<Timestamp>,

    // Network flow
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub src_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub dst_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::whole")]
    pub src_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::whole")]
    pub dst_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::whole")]
    pub packet_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::whole")]
    pub byte_count: Option<u64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::float")]
    pub duration: Option<f64>,
    /// Rate reported by the sensor, if any
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::float")]
    pub packets_per_second: Option<f64>,

    // Web request
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::whole")]
    pub content_length: Option<u64>,
}

/// Field deserializers that never reject an event.
mod lenient {
    use super::Timestamp;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(number))
    }

    /// Non-negative counts and ports; fractions truncate, out-of-range values are absent.
    pub fn whole<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let Some(value) = Option::<Value>::deserialize(d)? else {
            return Ok(None);
        };
        let raw = match value.as_u64() {
            Some(v) => Some(v),
            None => number(&value)
                .filter(|v| *v >= 0.0 && *v < u64::MAX as f64)
                .map(|v| v.trunc() as u64),
        };
        Ok(raw.and_then(|v| T::try_from(v).ok()))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(Timestamp::Text(s)),
            Some(Value::Number(n)) => n.as_f64().map(Timestamp::Unix),
            _ => None,
        })
    }
}

/// Timestamp as received: text or Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Unix(f64),
    Text(String),
}

impl Timestamp {
    /// Best-effort parse to UTC. `None` when the value cannot be interpreted.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Unix(secs) => {
                if !secs.is_finite() {
                    return None;
                }
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                DateTime::<Utc>::from_timestamp(whole as i64, nanos)
            }
            Timestamp::Text(s) => parse_text(s.trim()),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::Text(dt.to_rfc3339())
    }
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl Event {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().and_then(Timestamp::to_utc)
    }

    /// Identifier reported in results
    pub fn event_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "unknown".to_string())
    }

    pub fn details(&self) -> EventDetails {
        EventDetails {
            src_ip: self.src_ip.clone(),
            dst_ip: self.dst_ip.clone(),
            dst_port: self.dst_port,
            protocol: self.protocol.clone(),
            byte_count: self.byte_count,
            packet_count: self.packet_count,
        }
    }
}

/// Subset of event fields echoed back with a model-scored result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub dst_port: Option<u16>,
    pub protocol: Option<String>,
    pub byte_count: Option<u64>,
    pub packet_count: Option<u64>,
}
