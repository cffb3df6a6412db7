//! Race-level context read by conditions: mood, ground, weather, season, time, grade and finishing order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::course::numeric_enum;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("invalid {kind} value {value}")]
    InvalidEnum { kind: &'static str, value: i64 },
    #[error("invalid {kind} {name:?}")]
    InvalidName { kind: &'static str, name: String },
}

/// Motivation on the game's -2..=2 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Mood(i8);

impl Mood {
    pub const WORST: Self = Self(-2);
    pub const BEST: Self = Self(2);

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0 as i32
    }

    /// Stat multiplier applied by mood.
    #[must_use]
    pub fn coefficient(self) -> f64 {
        1.0 + 0.02 * f64::from(self.0)
    }
}

impl Default for Mood {
    fn default() -> Self {
        Self::BEST
    }
}

impl TryFrom<i64> for Mood {
    type Error = ParamError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -2..=2 => i8::try_from(value)
                .map(Self)
                .map_err(|_| ParamError::InvalidEnum { kind: "mood", value }),
            _ => Err(ParamError::InvalidEnum { kind: "mood", value }),
        }
    }
}

impl From<Mood> for i64 {
    fn from(value: Mood) -> Self {
        Self::from(value.0)
    }
}

numeric_enum!(
    GroundCondition, "ground condition", ParamError, { Good = 1, Yielding = 2, Soft = 3, Heavy = 4 }
);

numeric_enum!(
    Weather, "weather", ParamError, { Sunny = 1, Cloudy = 2, Rainy = 3, Snowy = 4 }
);

numeric_enum!(
    Season, "season", ParamError, { Spring = 1, Summer = 2, Autumn = 3, Winter = 4, Sakura = 5 }
);

numeric_enum!(
    Time, "time", ParamError, { NoTime = 0, Morning = 1, Midday = 2, Evening = 3, Night = 4 }
);

numeric_enum!(
    Grade, "grade", ParamError, {
        G1 = 100, G2 = 200, G3 = 300, Op = 400, PreOp = 700, Maiden = 800, Debut = 900, Daily = 999
    }
);

macro_rules! named_values {
    ($name:ident, $kind:literal, { $($($label:literal)|+ => $variant:ident),+ $(,)? }) => {
        impl FromStr for $name {
            type Err = ParamError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($($label)|+ => Ok(Self::$variant),)+
                    _ => Err(ParamError::InvalidName { kind: $kind, name: s.to_string() }),
                }
            }
        }
    };
}

named_values!(GroundCondition, "ground condition", {
    "GOOD" => Good, "YIELDING" => Yielding, "SOFT" => Soft, "HEAVY" => Heavy,
});

named_values!(Weather, "weather", {
    "SUNNY" => Sunny, "CLOUDY" => Cloudy, "RAINY" => Rainy, "SNOWY" => Snowy,
});

named_values!(Season, "season", {
    "SPRING" => Spring, "SUMMER" => Summer, "AUTUMN" => Autumn, "WINTER" => Winter, "SAKURA" => Sakura,
});

named_values!(Time, "race time", {
    "NONE" | "NOTIME" => NoTime, "MORNING" => Morning, "MIDDAY" => Midday,
    "EVENING" => Evening, "NIGHT" => Night,
});

named_values!(Grade, "race grade", {
    "G1" => G1, "G2" => G2, "G3" => G3, "OP" => Op, "PRE-OP" | "PREOP" => PreOp,
    "MAIDEN" => Maiden, "DEBUT" => Debut, "DAILY" => Daily,
});

impl GroundCondition {
    /// Zero-based column into per-ground tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }
}

impl fmt::Display for GroundCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Good => "good",
            Self::Yielding => "yielding",
            Self::Soft => "soft",
            Self::Heavy => "heavy",
        };
        f.write_str(label)
    }
}

/// Race context shared by every skill evaluated in one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceParameters {
    #[serde(default)]
    pub mood: Mood,
    #[serde(default = "default_ground")]
    pub ground_condition: GroundCondition,
    #[serde(default = "default_weather")]
    pub weather: Weather,
    #[serde(default = "default_season")]
    pub season: Season,
    #[serde(default = "default_time")]
    pub time: Time,
    #[serde(default = "default_grade")]
    pub grade: Grade,
    #[serde(default = "default_popularity")]
    pub popularity: u32,
    /// Inclusive range of finishing positions the horse is assumed to hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_range: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_umas: Option<u32>,
}

const fn default_ground() -> GroundCondition {
    GroundCondition::Good
}

const fn default_weather() -> Weather {
    Weather::Sunny
}

const fn default_season() -> Season {
    Season::Spring
}

const fn default_time() -> Time {
    Time::Midday
}

const fn default_grade() -> Grade {
    Grade::G1
}

const fn default_popularity() -> u32 {
    1
}

impl Default for RaceParameters {
    fn default() -> Self {
        Self {
            mood: Mood::default(),
            ground_condition: default_ground(),
            weather: default_weather(),
            season: default_season(),
            time: default_time(),
            grade: default_grade(),
            popularity: default_popularity(),
            order_range: None,
            num_umas: None,
        }
    }
}
