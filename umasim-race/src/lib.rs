//! umasim race engine
//!
//! Platform-agnostic race simulation for estimating what a skill is worth:
//! activation conditions are compiled into course regions, trigger points are
//! sampled from those regions, and a fixed-timestep integrator runs the horse
//! to the finish with the sampled skills. This crate has no I/O beyond parsing
//! the JSON documents handed to it.

pub mod builder;
pub mod conditions;
pub mod config;
pub mod course;
pub mod horse;
pub mod hp;
pub mod matcher;
pub mod numbers;
pub mod operator;
pub mod parser;
pub mod race_params;
pub mod random;
pub mod region;
pub mod sample_policy;
pub mod skills;
pub mod solver;

// Re-export commonly used types
pub use builder::{BuildError, RaceSolverBuilder, RaceSolverIter, SkillHook, activation_chance};
pub use conditions::{
    Comparator, Condition, ConditionContext, ConditionError, ConditionLookup, ConditionTable,
    MockConditions, counts_as_random_table, default_table,
};
pub use config::{
    ConfigError, DEFAULT_TIMESTEP, GainResult, RaceConfig, compare_gain, run_config,
};
pub use course::{CourseCatalog, CourseData, CourseError, DistanceType, Phase, Surface};
pub use horse::{Aptitude, HorseDesc, HorseParameters, Strategy};
pub use hp::{GameHpPolicy, HpPolicy, NoopHpPolicy};
pub use matcher::{MatchError, Pattern};
pub use operator::Operator;
pub use parser::{ParseError, parse};
pub use race_params::{GroundCondition, Mood, RaceParameters};
pub use random::{Prng, Rule30CARng};
pub use region::{Region, RegionList};
pub use sample_policy::{Distribution, SamplePolicy};
pub use skills::{CatalogError, SkillCatalog};
pub use solver::{Perspective, RaceSolver, RaceState, SkillType, SolverError};
