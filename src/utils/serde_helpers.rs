use serde::{ Deserialize, Deserializer, Serializer };
use serde::de::{ self, Visitor };
use std::fmt;
use tracing::Level;

/// Serialize `tracing::Level` to a string
pub fn serialize_level<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer
{
    serializer.serialize_str(&level.as_str().to_lowercase())
}

/// Deserialize `tracing::Level` from a string
pub fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where D: Deserializer<'de>
{
    struct LevelVisitor;

    impl<'de> Visitor<'de> for LevelVisitor {
        type Value = Level;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str(
                "a string representing a log level (trace, debug, info, warn, error)"
            )
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E> where E: de::Error {
            parse_level(value).ok_or_else(|| E::custom(format!("unknown log level: {}", value)))
        }
    }

    deserializer.deserialize_str(LevelVisitor)
}

pub fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

// Binance sends decimals as strings, tests and mocks often send plain numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            NumberOrString::Number(value) => Ok(value),
            NumberOrString::String(value) =>
                value.parse::<f64>().map_err(|_| E::custom(format!("invalid decimal: {}", value))),
        }
    }
}

/// Deserialize a decimal string such as `"0.06110000"` into `f64`
pub fn deserialize_f64_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where D: Deserializer<'de>
{
    NumberOrString::deserialize(deserializer)?.into_f64()
}

pub fn deserialize_opt_f64_str<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where D: Deserializer<'de>
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(value) => value.into_f64().map(Some),
        None => Ok(None),
    }
}
