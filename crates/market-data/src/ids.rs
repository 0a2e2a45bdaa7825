use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A u32 or u64 value that was outside the range an ID newtype accepts.
#[derive(Debug)]
pub struct InvalidIdError {
    value: u64,
    acceptable: Range<u64>,
    kind: &'static str,
}

impl fmt::Display for InvalidIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} is outside the valid range [{}, {})",
            self.kind, self.value, self.acceptable.start, self.acceptable.end
        )
    }
}

impl std::error::Error for InvalidIdError {}

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn get(&self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                <$inner>::deserialize(deserializer).map($name)
            }
        }
    };
}

id_newtype!(TypeId, u32);
id_newtype!(StationId, u64);
id_newtype!(SolarSystemId, u32);
id_newtype!(CitadelId, u64);

/// A region ID, restricted to the range EVE actually assigns regions in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct RegionId(u32);

impl RegionId {
    pub const VALID_RANGE: Range<u32> = 10_000_000..20_000_000;

    pub fn get(&self) -> u32 {
        self.0
    }

    /// True for the regions whose orders are actually served by the market
    /// endpoints: below the wormhole/special cutoff, excluding the two
    /// non-tradable special regions (Jove / VOID).
    pub fn is_market_region(&self) -> bool {
        self.0 < 11_000_000 && self.0 != 10_000_004 && self.0 != 10_000_019
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for RegionId {
    type Error = InvalidIdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if Self::VALID_RANGE.contains(&value) {
            Ok(RegionId(value))
        } else {
            Err(InvalidIdError {
                value: value as u64,
                acceptable: Self::VALID_RANGE.start as u64..Self::VALID_RANGE.end as u64,
                kind: "region id",
            })
        }
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        RegionId::try_from(value).map_err(serde::de::Error::custom)
    }
}
