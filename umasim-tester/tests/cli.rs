use std::path::PathBuf;
use std::process::Command;

const COURSES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/course_data.json");
const SKILLS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/skill_data.json");

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "umasim-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn tester() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_umasim-tester"));
    cmd.args(["--courses", COURSES, "--skills", SKILLS]);
    cmd
}

#[test]
fn cli_grep_lists_matching_skills() {
    let output = tester()
        .args(["grep", "phase_corner_random", "--list"])
        .env("NO_COLOR", "1")
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout.lines().collect();
    assert_eq!(ids, vec!["200331", "200332"]);
}

#[test]
fn cli_gain_writes_json_report() {
    let scenario = temp_path("scenario.json");
    std::fs::write(
        &scenario,
        r#"{
            "seed": 12, "courseId": 10504, "mood": 1, "nsamples": 6,
            "horse": {"speed": 1200, "stamina": 800, "power": 1000, "guts": 600, "wisdom": 900,
                      "strategy": "Senkou", "distanceAptitude": "A", "surfaceAptitude": "A",
                      "strategyAptitude": "A"},
            "skillsUnderTest": ["200591"]
        }"#,
    )
    .expect("write scenario");
    let report = temp_path("gain.json");
    let status = tester()
        .arg("gain")
        .arg(&scenario)
        .args(["--report", "json", "--skill", "202051", "--output"])
        .arg(&report)
        .status()
        .expect("run cli");
    assert!(status.success());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("read report"))
            .expect("report is json");
    assert_eq!(json["result"]["gain"].as_array().map(Vec::len), Some(6));
    assert_eq!(json["result"]["err"], serde_json::Value::Bool(false));
    assert_eq!(
        json["params"]["skillsUnderTest"],
        serde_json::json!(["200591", "202051"])
    );
    assert!(json["summary"]["mean"].is_number());
}

#[test]
fn cli_checkpoint_round_trip_and_drift() {
    let checkpoint = temp_path("checkpoint.json");
    let status = tester()
        .args([
            "checkpoint",
            "create",
            "--tests",
            "3",
            "--seed",
            "8",
            "--max-samples",
            "2",
            "--max-skills",
            "3",
            "--output",
        ])
        .arg(&checkpoint)
        .status()
        .expect("run cli");
    assert!(status.success());

    let failures = temp_path("failures.json");
    let status = tester()
        .args(["checkpoint", "check"])
        .arg(&checkpoint)
        .arg("--failure-log")
        .arg(&failures)
        .status()
        .expect("run cli");
    assert!(status.success());
    assert!(!failures.exists());

    let mut entries: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&checkpoint).expect("read checkpoint"))
            .expect("checkpoint is json");
    let drifted = entries
        .as_array_mut()
        .and_then(|cases| {
            cases
                .iter_mut()
                .find_map(|case| case["result"]["gain"].as_array_mut()?.first_mut())
        })
        .expect("a recorded sample");
    *drifted = serde_json::json!(drifted.as_f64().unwrap_or_default() + 3.0);
    std::fs::write(&checkpoint, entries.to_string()).expect("rewrite checkpoint");

    let status = tester()
        .args(["checkpoint", "check", "--fast", "--seed", "1"])
        .arg(&checkpoint)
        .arg("--failure-log")
        .arg(&failures)
        .status()
        .expect("run cli");
    assert!(!status.success());
    let logged: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&failures).expect("read failures"))
            .expect("failures are json");
    assert_eq!(logged.as_array().map(Vec::len), Some(1));
}

fn write_scenario(label: &str) -> PathBuf {
    let scenario = temp_path(label);
    std::fs::write(
        &scenario,
        r#"{
            "seed": 4, "courseId": 10504, "nsamples": 3,
            "horse": {"speed": 1100, "stamina": 900, "power": 1000, "guts": 600, "wisdom": 1000,
                      "strategy": "Senkou", "distanceAptitude": "A", "surfaceAptitude": "A",
                      "strategyAptitude": "A"},
            "presupposedSkills": ["200011"]
        }"#,
    )
    .expect("write scenario");
    scenario
}

#[test]
fn cli_table_skips_skills_that_fail_to_compile() {
    let mut skills: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(SKILLS).expect("read skills"))
            .expect("skills are json");
    skills["299999"] = serde_json::json!({
        "rarity": 1,
        "alternatives": [{"condition": "corner==", "baseDuration": 30000,
                          "effects": [{"type": 27, "modifier": 3500, "target": 1}]}]
    });
    let skill_file = temp_path("broken-skills.json");
    std::fs::write(&skill_file, skills.to_string()).expect("write skills");

    let scenario = write_scenario("table-scenario.json");
    let output = Command::new(env!("CARGO_BIN_EXE_umasim-tester"))
        .arg("--courses")
        .arg(COURSES)
        .arg("--skills")
        .arg(&skill_file)
        .arg("table")
        .arg(&scenario)
        .args(["--report", "json"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let table: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("table is json");
    let skipped = table["skipped"].as_array().expect("skipped list");
    assert!(skipped.iter().any(|s| s["skillId"] == "299999"));
    let rows = table["rows"].as_array().expect("rows");
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r["skillId"] != "299999" && r["skillId"] != "200011"));
    let means: Vec<f64> = rows
        .iter()
        .filter_map(|r| r["summary"]["mean"].as_f64())
        .collect();
    assert!(means.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn cli_table_writes_csv_columns() {
    let scenario = write_scenario("csv-scenario.json");
    let output = tester()
        .arg("table")
        .arg(&scenario)
        .args(["--report", "csv", "-N", "2", "--thresholds=-0.5,1"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("mean,skill,min,max,median,<0.50,≥1.00"));
    assert!(lines.all(|line| line.split(',').count() == 7));
}

#[test]
fn cli_dump_traces_one_sample_to_the_finish() {
    let scenario = write_scenario("dump-scenario.json");
    let trace = temp_path("trace.csv");
    let status = tester()
        .arg("dump")
        .arg(&scenario)
        .args(["--sample", "2", "--format", "csv", "--skill", "100011", "--output"])
        .arg(&trace)
        .status()
        .expect("run cli");
    assert!(status.success());
    let csv = std::fs::read_to_string(&trace).expect("read trace");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("t,pos,speed,targetSpeed,accel,hp"));
    let rows: Vec<Vec<f64>> = lines
        .map(|line| {
            line.split(',')
                .map(|v| v.parse().expect("numeric column"))
                .collect()
        })
        .collect();
    assert!(rows.len() > 60);
    assert!(rows.windows(2).all(|w| w[1][1] > w[0][1]));
    assert!(rows.last().is_some_and(|r| r[1] >= 1600.0));

    let status = tester()
        .arg("dump")
        .arg(&scenario)
        .args(["--sample", "3"])
        .status()
        .expect("run cli");
    assert!(!status.success());
}

#[test]
fn cli_reports_missing_data() {
    let output = Command::new(env!("CARGO_BIN_EXE_umasim-tester"))
        .args(["--courses", "/nonexistent/courses.json", "grep", "phase"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reading course data"));
}
