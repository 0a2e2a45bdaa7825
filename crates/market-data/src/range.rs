use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// How far from the order's station a given order can be filled.
///
/// The upstream API represents this as either one of two fixed keywords, or
/// a jump-count string for a handful of allowed values. We keep both forms
/// distinct rather than collapsing `"solarsystem"` into `System(1)`, because
/// the wire format needs to be able to reproduce the original string.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OrderRange {
    Station,
    Region,
    SolarSystem,
    Jumps(u8),
}

impl OrderRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderRange::Station => "station",
            OrderRange::Region => "region",
            OrderRange::SolarSystem => "solarsystem",
            OrderRange::Jumps(1) => "1",
            OrderRange::Jumps(2) => "2",
            OrderRange::Jumps(3) => "3",
            OrderRange::Jumps(4) => "4",
            OrderRange::Jumps(5) => "5",
            OrderRange::Jumps(10) => "10",
            OrderRange::Jumps(20) => "20",
            OrderRange::Jumps(30) => "30",
            OrderRange::Jumps(40) => "40",
            // Unreachable for ranges built via `parse`; `FromStr` only ever
            // constructs the jump counts listed above.
            OrderRange::Jumps(_) => "jumps",
        }
    }
}

#[derive(Debug)]
pub struct RangeParseError(String);

impl fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unrecognized order range: {:?}", self.0)
    }
}

impl std::error::Error for RangeParseError {}

impl std::str::FromStr for OrderRange {
    type Err = RangeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "station" => Ok(OrderRange::Station),
            "region" => Ok(OrderRange::Region),
            "solarsystem" => Ok(OrderRange::SolarSystem),
            "1" => Ok(OrderRange::Jumps(1)),
            "2" => Ok(OrderRange::Jumps(2)),
            "3" => Ok(OrderRange::Jumps(3)),
            "4" => Ok(OrderRange::Jumps(4)),
            "5" => Ok(OrderRange::Jumps(5)),
            "10" => Ok(OrderRange::Jumps(10)),
            "20" => Ok(OrderRange::Jumps(20)),
            "30" => Ok(OrderRange::Jumps(30)),
            "40" => Ok(OrderRange::Jumps(40)),
            other => Err(RangeParseError(other.to_string())),
        }
    }
}

impl Serialize for OrderRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct OrderRangeVisitor;

        impl<'de> Visitor<'de> for OrderRangeVisitor {
            type Value = OrderRange;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(r#""station", "region", "solarsystem", or a jump count"#)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse().map_err(|_| E::custom(format!("unexpected range value: {value}")))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.to_string().parse().map_err(|_| E::custom(format!("unexpected range value: {value}")))
            }
        }

        deserializer.deserialize_any(OrderRangeVisitor)
    }
}
