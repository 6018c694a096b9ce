//! Deserialization helpers for values that arrive from the CLI, the environment or a file
// (c) 2024 Ross Younger

use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{de, de::Visitor, Deserialize};

/// Visitor for types which might be expressed as an integer or as a string.
///
/// Configuration values reach us from TOML files (typed), the environment (where figment
/// guesses the type) and the command line (always a string). This visitor forwards
/// strings to T's `FromStr` and integers to T's `TryFrom<u64>`, so all three agree.
#[allow(missing_debug_implementations)]
pub struct IntOrString<T>(pub PhantomData<fn() -> T>);

impl<'de, T> Visitor<'de> for IntOrString<T>
where
    T: Deserialize<'de> + TryFrom<u64> + FromStr,
    <T as FromStr>::Err: std::fmt::Display,
    <T as TryFrom<u64>>::Error: std::fmt::Display,
{
    type Value = T;
    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("int or string")
    }

    fn visit_str<E>(self, value: &str) -> Result<T, E>
    where
        E: de::Error,
    {
        T::from_str(value).map_err(de::Error::custom)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        T::try_from(value).map_err(de::Error::custom)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let u = u64::try_from(value).map_err(de::Error::custom)?;
        T::try_from(u).map_err(de::Error::custom)
    }
}
