//! Horse stats, running strategies and aptitudes, plus the two stat adjustment passes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::course::{CourseData, StatLine, Surface, course_speed_modifier};
use crate::race_params::{GroundCondition, Mood, ParamError};

/// Running strategy. Oonige is a stronger Nige and matches it in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    Nige = 1,
    Senkou = 2,
    Sasi = 3,
    Oikomi = 4,
    Oonige = 5,
}

impl Strategy {
    /// Numeric id as used by the `running_style` condition.
    #[must_use]
    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Row into per-strategy coefficient tables (0..=4).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    #[must_use]
    pub const fn is_front_runner(self) -> bool {
        matches!(self, Self::Nige | Self::Oonige)
    }

    pub fn from_id(id: i32) -> Result<Self, ParamError> {
        match id {
            1 => Ok(Self::Nige),
            2 => Ok(Self::Senkou),
            3 => Ok(Self::Sasi),
            4 => Ok(Self::Oikomi),
            5 => Ok(Self::Oonige),
            _ => Err(ParamError::InvalidEnum {
                kind: "strategy",
                value: i64::from(id),
            }),
        }
    }
}

#[must_use]
pub fn strategy_matches(a: Strategy, b: Strategy) -> bool {
    a == b || (a.is_front_runner() && b.is_front_runner())
}

impl FromStr for Strategy {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NIGE" => Ok(Self::Nige),
            "SENKOU" => Ok(Self::Senkou),
            "SASI" | "SASHI" => Ok(Self::Sasi),
            "OIKOMI" => Ok(Self::Oikomi),
            "OONIGE" => Ok(Self::Oonige),
            _ => Err(ParamError::InvalidName {
                kind: "running strategy",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Nige => "Nige",
            Self::Senkou => "Senkou",
            Self::Sasi => "Sasi",
            Self::Oikomi => "Oikomi",
            Self::Oonige => "Oonige",
        };
        f.write_str(label)
    }
}

impl TryFrom<String> for Strategy {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Strategy> for String {
    fn from(value: Strategy) -> Self {
        value.to_string()
    }
}

/// Letter grade from S (best) to G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Aptitude {
    S,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Aptitude {
    pub const ALL: [Self; 8] = [
        Self::S,
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
    ];

    /// Column into per-aptitude tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Aptitude {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S" => Ok(Self::S),
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "E" => Ok(Self::E),
            "F" => Ok(Self::F),
            "G" => Ok(Self::G),
            _ => Err(ParamError::InvalidName {
                kind: "aptitude",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Aptitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<String> for Aptitude {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Aptitude> for String {
    fn from(value: Aptitude) -> Self {
        value.to_string()
    }
}

/// Horse as entered by a user, before any mood or course adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseDesc {
    pub speed: f64,
    pub stamina: f64,
    pub power: f64,
    pub guts: f64,
    pub wisdom: f64,
    pub strategy: Strategy,
    pub distance_aptitude: Aptitude,
    pub surface_aptitude: Aptitude,
    pub strategy_aptitude: Aptitude,
}

/// Stats a solver or condition works with. Solvers own a private copy.
#[derive(Debug, Clone, PartialEq)]
pub struct HorseParameters {
    pub speed: f64,
    pub stamina: f64,
    pub power: f64,
    pub guts: f64,
    pub wisdom: f64,
    pub strategy: Strategy,
    pub distance_aptitude: Aptitude,
    pub surface_aptitude: Aptitude,
    pub strategy_aptitude: Aptitude,
    /// Mood-adjusted stamina before overcap compression.
    pub raw_stamina: f64,
}

impl HorseParameters {
    #[must_use]
    pub fn stat_line(&self) -> StatLine {
        StatLine {
            speed: self.speed,
            stamina: self.stamina,
            power: self.power,
            guts: self.guts,
            wisdom: self.wisdom,
        }
    }
}

// [surface][ground]
const GROUND_SPEED_MODIFIER: [[f64; 4]; 2] = [[0.0, 0.0, 0.0, -50.0], [0.0, 0.0, 0.0, -50.0]];
const GROUND_POWER_MODIFIER: [[f64; 4]; 2] =
    [[0.0, -50.0, -50.0, -50.0], [-100.0, -50.0, -100.0, -100.0]];

const STRATEGY_PROFICIENCY_MODIFIER: [f64; 8] = [1.1, 1.0, 0.85, 0.75, 0.6, 0.4, 0.2, 0.1];

fn surface_row(surface: Surface) -> usize {
    match surface {
        Surface::Turf => 0,
        Surface::Dirt => 1,
    }
}

/// Stats above 1200 count half.
#[must_use]
pub fn adjust_overcap(stat: f64) -> f64 {
    if stat > 1200.0 {
        1200.0 + ((stat - 1200.0) / 2.0).floor()
    } else {
        stat
    }
}

/// Apply overcap compression and mood. Conditions such as `base_power` see these values.
#[must_use]
pub fn build_base_stats(desc: &HorseDesc, mood: Mood) -> HorseParameters {
    let coef = mood.coefficient();
    HorseParameters {
        speed: adjust_overcap(desc.speed) * coef,
        stamina: adjust_overcap(desc.stamina) * coef,
        power: adjust_overcap(desc.power) * coef,
        guts: adjust_overcap(desc.guts) * coef,
        wisdom: adjust_overcap(desc.wisdom) * coef,
        strategy: desc.strategy,
        distance_aptitude: desc.distance_aptitude,
        surface_aptitude: desc.surface_aptitude,
        strategy_aptitude: desc.strategy_aptitude,
        raw_stamina: desc.stamina * coef,
    }
}

/// Apply the course bonus, ground penalties and strategy aptitude to base stats.
#[must_use]
pub fn build_adjusted_stats(
    base: &HorseParameters,
    course: &CourseData,
    ground: GroundCondition,
) -> HorseParameters {
    let course_modifier = course_speed_modifier(course, &base.stat_line());
    let row = surface_row(course.surface);
    let col = ground.index();
    HorseParameters {
        speed: (base.speed * course_modifier + GROUND_SPEED_MODIFIER[row][col]).max(1.0),
        power: (base.power + GROUND_POWER_MODIFIER[row][col]).max(1.0),
        wisdom: base.wisdom * STRATEGY_PROFICIENCY_MODIFIER[base.strategy_aptitude.index()],
        ..base.clone()
    }
}
