use std::hash::Hasher;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use twox_hash::XxHash64;
use umasim_race::{
    Aptitude, CourseCatalog, DEFAULT_TIMESTEP, GroundCondition, HorseDesc, Mood, Prng,
    RaceConfig, RaceSolver, Rule30CARng, SkillCatalog, Strategy, run_config,
};

const STRATEGIES: [Strategy; 5] = [
    Strategy::Nige,
    Strategy::Senkou,
    Strategy::Sasi,
    Strategy::Oikomi,
    Strategy::Oonige,
];
const GROUNDS: [GroundCondition; 4] = [
    GroundCondition::Good,
    GroundCondition::Yielding,
    GroundCondition::Soft,
    GroundCondition::Heavy,
];

fn catalogs() -> (CourseCatalog, Arc<SkillCatalog>) {
    let courses = CourseCatalog::from_json(include_str!("../../data/course_data.json"))
        .expect("course data parses");
    let skills = SkillCatalog::from_json(include_str!("../../data/skill_data.json"))
        .expect("skill data parses");
    (courses, Arc::new(skills))
}

fn random_horse(rng: &mut SmallRng) -> HorseDesc {
    let mut aptitude = || Aptitude::ALL[rng.gen_range(0..Aptitude::ALL.len())];
    let (distance_aptitude, surface_aptitude, strategy_aptitude) =
        (aptitude(), aptitude(), aptitude());
    HorseDesc {
        speed: f64::from(rng.gen_range(1..=2000)),
        stamina: f64::from(rng.gen_range(1..=2000)),
        power: f64::from(rng.gen_range(1..=2000)),
        guts: f64::from(rng.gen_range(1..=2000)),
        wisdom: f64::from(rng.gen_range(1..=2000)),
        strategy: *STRATEGIES.choose(rng).expect("non-empty"),
        distance_aptitude,
        surface_aptitude,
        strategy_aptitude,
    }
}

fn random_config(rng: &mut SmallRng, courses: &CourseCatalog, skills: &SkillCatalog) -> RaceConfig {
    let course_ids = courses.ids();
    let skill_ids = skills.ids();
    let mut pick_skills = |max: usize| -> Vec<String> {
        let n = rng.gen_range(0..=max);
        skill_ids
            .choose_multiple(rng, n)
            .map(|id| (*id).to_string())
            .collect()
    };
    let presupposed_skills = pick_skills(5);
    let skills_under_test = pick_skills(3);
    RaceConfig {
        seed: rng.r#gen(),
        course_id: *course_ids.choose(rng).expect("non-empty"),
        ground_condition: *GROUNDS.choose(rng).expect("non-empty"),
        mood: Mood::try_from(rng.gen_range(-2_i64..=2)).expect("valid mood"),
        horse: random_horse(rng),
        pace_effects_enabled: rng.gen_bool(0.5),
        nsamples: rng.gen_range(1..=4),
        presupposed_skills,
        skills_under_test,
    }
}

fn assert_monotonic(solver: &mut RaceSolver, dt: f64) {
    let distance = solver.course().distance;
    let max_steps = (distance * 15.0).ceil() as usize;
    let mut prev = solver.pos();
    let mut steps = 0;
    while !solver.finished() {
        solver.step(dt);
        steps += 1;
        let pos = solver.pos();
        assert!(!pos.is_nan(), "position became NaN at step {steps}");
        assert!(pos > prev, "no progress at step {steps}: {prev} -> {pos}");
        assert!(steps <= max_steps, "did not finish {distance}m in {max_steps} steps");
        prev = pos;
    }
}

#[test]
fn rule30_streams_are_reproducible() {
    let mut a = Rule30CARng::new(0xDEAD_BEEF);
    let mut b = Rule30CARng::new(0xDEAD_BEEF);
    for i in 0..10_000_u32 {
        match i % 3 {
            0 => assert_eq!(a.int32(), b.int32()),
            1 => assert_eq!(a.random().to_bits(), b.random().to_bits()),
            _ => assert_eq!(a.uniform(i + 1), b.uniform(i + 1)),
        }
    }
}

#[test]
fn known_case_runs_to_the_finish() {
    let (courses, catalog) = catalogs();
    let config = RaceConfig {
        seed: 0,
        course_id: 10301,
        ground_condition: GroundCondition::Good,
        mood: Mood::WORST,
        horse: HorseDesc {
            speed: 1.0,
            stamina: 1.0,
            power: 1.0,
            guts: 1.0,
            wisdom: 1.0,
            strategy: Strategy::Nige,
            distance_aptitude: Aptitude::S,
            surface_aptitude: Aptitude::S,
            strategy_aptitude: Aptitude::S,
        },
        pace_effects_enabled: false,
        nsamples: 1,
        presupposed_skills: vec!["900681".into()],
        skills_under_test: Vec::new(),
    };
    config.validate().expect("known case is valid");
    let mut builder = config
        .standard_builder(&courses, Arc::clone(&catalog))
        .expect("builder");
    let mut solvers = builder.build().expect("builds");
    let mut solver = solvers.next().expect("one sample").expect("solver");
    assert!(solvers.next().is_none());
    assert_monotonic(&mut solver, DEFAULT_TIMESTEP);

    let result = run_config(&config, &courses, catalog, DEFAULT_TIMESTEP).expect("runs");
    assert!(!result.err);
    assert_eq!(result.gain, vec![0.0]);
}

#[test]
fn random_configurations_always_make_progress() {
    let (courses, catalog) = catalogs();
    let mut rng = SmallRng::seed_from_u64(0x5EED);
    for _ in 0..40 {
        let config = random_config(&mut rng, &courses, &catalog);
        let (mut standard, mut compare) = config
            .builders(&courses, Arc::clone(&catalog))
            .expect("course exists");
        for builder in [&mut standard, &mut compare] {
            for solver in builder.build().expect("builds") {
                let mut solver = solver.expect("solver");
                assert_monotonic(&mut solver, DEFAULT_TIMESTEP);
            }
        }
    }
}

#[test]
fn fork_without_changes_steps_identically() {
    let (courses, catalog) = catalogs();
    let mut rng = SmallRng::seed_from_u64(91);
    for _ in 0..10 {
        let config = random_config(&mut rng, &courses, &catalog);
        let mut base = config
            .standard_builder(&courses, Arc::clone(&catalog))
            .expect("course exists");
        let mut fork = base.fork();
        let a = base.build().expect("builds");
        let b = fork.build().expect("builds");
        for (s1, s2) in a.zip(b) {
            let (mut s1, mut s2) = (s1.expect("solver"), s2.expect("solver"));
            while !s1.finished() {
                s1.step(DEFAULT_TIMESTEP);
                s2.step(DEFAULT_TIMESTEP);
                assert_eq!(s1.pos().to_bits(), s2.pos().to_bits());
                assert_eq!(s1.current_speed().to_bits(), s2.current_speed().to_bits());
            }
            assert!(s2.finished());
        }
    }
}

fn gain_digest(config: &RaceConfig, courses: &CourseCatalog, catalog: &Arc<SkillCatalog>) -> u64 {
    let result =
        run_config(config, courses, Arc::clone(catalog), DEFAULT_TIMESTEP).expect("runs");
    let mut hasher = XxHash64::with_seed(0);
    hasher.write_u8(u8::from(result.err));
    for gain in &result.gain {
        hasher.write_u64((gain / 2.5).to_bits());
    }
    hasher.finish()
}

#[test]
fn gains_are_reproducible_across_runs() {
    let (courses, catalog) = catalogs();
    let mut rng = SmallRng::seed_from_u64(2_500);
    for _ in 0..8 {
        let mut config = random_config(&mut rng, &courses, &catalog);
        config.skills_under_test = vec!["200591".into(), "202051".into()];
        let first = gain_digest(&config, &courses, &catalog);
        let second = gain_digest(&config, &courses, &catalog);
        assert_eq!(first, second, "gain changed between runs of {config:?}");
    }
}
