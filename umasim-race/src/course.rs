//! Course geometry, enumerations keyed by the game's numeric ids, and the JSON catalog loader.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::numbers::usize_to_f64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CourseError {
    #[error("invalid {kind} value {value}")]
    InvalidEnum { kind: &'static str, value: i64 },
    #[error("course {what} must be sorted by start location")]
    Unsorted { what: &'static str },
    #[error("course {0} not found")]
    UnknownCourse(u32),
    #[error("course {what} is empty")]
    Empty { what: &'static str },
    #[error("invalid course data: {0}")]
    Parse(String),
}

macro_rules! numeric_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $err:ident, { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<i64> for $name {
            type Error = $err;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err($err::InvalidEnum { kind: $kind, value }),
                }
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value as i64
            }
        }

        impl $name {
            /// Numeric id as used by condition arguments.
            #[must_use]
            pub const fn id(self) -> i32 {
                self as i32
            }
        }
    };
}

pub(crate) use numeric_enum;

numeric_enum!(
    /// Track surface.
    Surface, "surface", CourseError, { Turf = 1, Dirt = 2 }
);

numeric_enum!(
    /// Distance category of a course.
    DistanceType, "distance type", CourseError, { Short = 1, Mile = 2, Mid = 3, Long = 4 }
);

numeric_enum!(
    /// Direction the course is run in.
    Orientation, "orientation", CourseError, { Clockwise = 1, Counterclockwise = 2 }
);

numeric_enum!(
    /// Stat a course rewards through its speed modifier.
    ThresholdStat, "threshold stat", CourseError, { Speed = 1, Stamina = 2, Power = 3, Guts = 4, Int = 5 }
);

numeric_enum!(
    /// Race phase; the last spurt phase behaves like the late race for coefficient lookups.
    Phase, "phase", CourseError, { Early = 0, Middle = 1, Late = 2, LastSpurt = 3 }
);

impl Phase {
    /// Index into per-phase coefficient tables (0..=2).
    #[must_use]
    pub const fn coefficient_index(self) -> usize {
        match self {
            Self::Early => 0,
            Self::Middle => 1,
            Self::Late | Self::LastSpurt => 2,
        }
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Early => Some(Self::Middle),
            Self::Middle => Some(Self::Late),
            Self::Late => Some(Self::LastSpurt),
            Self::LastSpurt => None,
        }
    }
}

/// Start of `phase` in meters.
#[must_use]
pub fn phase_start(distance: f64, phase: Phase) -> f64 {
    match phase {
        Phase::Early => 0.0,
        Phase::Middle => distance / 6.0,
        Phase::Late => distance * 2.0 / 3.0,
        Phase::LastSpurt => distance * 5.0 / 6.0,
    }
}

/// End of `phase` in meters.
#[must_use]
pub fn phase_end(distance: f64, phase: Phase) -> f64 {
    match phase {
        Phase::Early => distance / 6.0,
        Phase::Middle => distance * 2.0 / 3.0,
        Phase::Late => distance * 5.0 / 6.0,
        Phase::LastSpurt => distance,
    }
}

/// Anything positioned along the course by its start.
pub trait HasStart {
    fn start(&self) -> f64;
}

/// True when starts are strictly increasing.
#[must_use]
pub fn is_sorted_by_start<T: HasStart>(items: &[T]) -> bool {
    items.windows(2).all(|pair| pair[0].start() < pair[1].start())
        && items.first().is_none_or(|first| first.start() > -1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub start: f64,
    pub length: f64,
}

impl Corner {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Straight {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub front_type: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slope {
    pub start: f64,
    pub length: f64,
    /// Grade in hundredths of a percent; positive is uphill.
    pub slope: f64,
}

impl Slope {
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

impl HasStart for Corner {
    fn start(&self) -> f64 {
        self.start
    }
}

impl HasStart for Straight {
    fn start(&self) -> f64 {
        self.start
    }
}

impl HasStart for Slope {
    fn start(&self) -> f64 {
        self.start
    }
}

/// Geometry and metadata of a single course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseData {
    #[serde(default)]
    pub race_track_id: u32,
    pub distance: f64,
    pub distance_type: DistanceType,
    pub surface: Surface,
    pub turn: Orientation,
    #[serde(default)]
    pub course_set_status: Vec<ThresholdStat>,
    #[serde(default)]
    pub corners: Vec<Corner>,
    #[serde(default)]
    pub straights: Vec<Straight>,
    #[serde(default)]
    pub slopes: Vec<Slope>,
}

impl CourseData {
    /// Corners in start order, or an error if the data is out of order.
    pub fn sorted_corners(&self) -> Result<&[Corner], CourseError> {
        if is_sorted_by_start(&self.corners) {
            Ok(&self.corners)
        } else {
            Err(CourseError::Unsorted { what: "corners" })
        }
    }

    pub fn sorted_straights(&self) -> Result<&[Straight], CourseError> {
        if is_sorted_by_start(&self.straights) {
            Ok(&self.straights)
        } else {
            Err(CourseError::Unsorted { what: "straights" })
        }
    }

    pub fn sorted_slopes(&self) -> Result<&[Slope], CourseError> {
        if is_sorted_by_start(&self.slopes) {
            Ok(&self.slopes)
        } else {
            Err(CourseError::Unsorted { what: "slopes" })
        }
    }

    pub fn last_corner(&self) -> Result<Option<&Corner>, CourseError> {
        Ok(self.sorted_corners()?.last())
    }

    pub fn last_straight(&self) -> Result<&Straight, CourseError> {
        self.sorted_straights()?
            .last()
            .ok_or(CourseError::Empty { what: "straights" })
    }
}

/// Stat values read by [`course_speed_modifier`].
#[derive(Debug, Clone, Copy)]
pub struct StatLine {
    pub speed: f64,
    pub stamina: f64,
    pub power: f64,
    pub guts: f64,
    pub wisdom: f64,
}

/// Course bonus applied to speed for horses meeting the course's stat thresholds.
#[must_use]
pub fn course_speed_modifier(course: &CourseData, stats: &StatLine) -> f64 {
    let value = |stat: ThresholdStat| {
        let raw = match stat {
            ThresholdStat::Speed => stats.speed,
            ThresholdStat::Stamina => stats.stamina,
            ThresholdStat::Power => stats.power,
            ThresholdStat::Guts => stats.guts,
            ThresholdStat::Int => stats.wisdom,
        };
        raw.min(901.0)
    };
    let total: f64 = course
        .course_set_status
        .iter()
        .map(|&stat| (1.0 + (value(stat) / 300.01).floor()) * 0.05)
        .sum();
    1.0 + total / usize_to_f64(course.course_set_status.len().max(1))
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    courses: HashMap<String, CourseData>,
}

/// All known courses keyed by course id.
#[derive(Debug, Clone, Default)]
pub struct CourseCatalog {
    courses: HashMap<u32, CourseData>,
}

impl CourseCatalog {
    /// Parse `{ trackId: { courses: { courseId: course } } }`.
    ///
    /// Slopes are re-sorted by start because source data groups them by
    /// direction before position.
    pub fn from_json(json: &str) -> Result<Self, CourseError> {
        let tracks: HashMap<String, TrackEntry> =
            serde_json::from_str(json).map_err(|err| CourseError::Parse(err.to_string()))?;
        let mut courses = HashMap::new();
        for (track_key, entry) in tracks {
            let track_id = parse_id(&track_key)?;
            for (course_key, mut course) in entry.courses {
                let course_id = parse_id(&course_key)?;
                course.race_track_id = track_id;
                course.slopes.sort_by(|a, b| a.start.total_cmp(&b.start));
                courses.insert(course_id, course);
            }
        }
        Ok(Self { courses })
    }

    pub fn get(&self, course_id: u32) -> Result<&CourseData, CourseError> {
        self.courses
            .get(&course_id)
            .ok_or(CourseError::UnknownCourse(course_id))
    }

    /// Course ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.courses.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

fn parse_id(key: &str) -> Result<u32, CourseError> {
    key.parse()
        .map_err(|_| CourseError::Parse(format!("bad id {key:?}")))
}
