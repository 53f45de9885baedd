//! Lenient field deserializers for client input.
//!
//! The browser client posts form values as they come out of `<input>`
//! elements, so integers sometimes arrive as strings (`"15"`) and blank
//! inputs arrive as `""`.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

/// A request body that is only type-checked when decoded, so a service can
/// settle role, existence and ownership before looking at field types.
#[derive(Debug, Clone)]
pub enum RequestBody<T> {
    /// Raw JSON bytes as received. Blank bytes decode to `T::default()`.
    Raw(Vec<u8>),
    Decoded(T),
}

impl<T> From<T> for RequestBody<T> {
    fn from(input: T) -> Self {
        RequestBody::Decoded(input)
    }
}

impl<T: DeserializeOwned + Default> RequestBody<T> {
    pub fn decode(self) -> Result<T, serde_json::Error> {
        match self {
            RequestBody::Raw(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(T::default())
            }
            RequestBody::Raw(bytes) => serde_json::from_slice(&bytes),
            RequestBody::Decoded(input) => Ok(input),
        }
    }
}

/// Accepts a JSON integer, an integral float, a numeric string, `""` or `null`.
/// Blank strings and `null` read as `None`.
pub fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientInt;

    impl<'de> de::Visitor<'de> for LenientInt {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            i64::try_from(v)
                .map(Some)
                .map_err(|_| E::custom(format!("integer {v} is out of range")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                Ok(Some(v as i64))
            } else {
                Err(E::custom(format!("expected a whole number, got {v}")))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| E::custom(format!("\"{v}\" is not a whole number")))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
        where
            D2: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_option(LenientInt)
}

/// Records whether a key was present at all. Absent → `None`,
/// `null` → `Some(None)`, value → `Some(Some(v))`. Pair with `#[serde(default)]`.
pub fn presence<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
