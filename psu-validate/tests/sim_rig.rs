// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end validation runs against a simulated rig.

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use psu_validate::cmd::CmdError;
use psu_validate::config::{Config, PlatformSourceConfig};
use psu_validate::runner::Outcome;
use psu_validate::validate;
use slog::Logger;

const GATED: [&str; 5] =
    ["psu-serial", "psu-model", "psu-voltage", "psu-current", "psu-power"];

fn log() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

fn data_dir() -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn rig_config() -> Config {
    Config::from_file(&data_dir().join("psu-validate.toml")).unwrap()
}

/// Points the config at a simulated rig written to `dir`.
fn with_rig(mut config: Config, dir: &Utf8TempDir, rig: &str) -> Config {
    let path = dir.path().join("rig.toml");
    std::fs::write(&path, rig).unwrap();
    config.platform = PlatformSourceConfig::Simulated { config: path };
    config
}

fn rig_with_header(header: &str) -> String {
    let rig = std::fs::read_to_string(data_dir().join("rig.toml")).unwrap();
    let rig = rig
        .lines()
        .filter(|line| {
            !line.starts_with("chassis") && !line.starts_with("psuutil")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}\n{rig}\n")
}

#[test]
fn healthy_rig_passes() {
    let report = validate(&log(), &rig_config(), &[]).unwrap();
    assert_eq!(report.rules.len(), 9);
    assert_eq!(report.passed(), 9, "{report}");
    assert!(report.is_success());
}

#[test]
fn healthy_rig_passes_with_last_psu_checked() {
    let mut config = rig_config();
    config.checks.presence_bound =
        psu_validate::rules::PresenceBound::IncludeLast;
    let report = validate(&log(), &config, &[]).unwrap();
    assert!(report.is_success(), "{report}");
}

#[test]
fn legacy_only_platform() {
    let dir = Utf8TempDir::new().unwrap();
    let config = with_rig(
        rig_config(),
        &dir,
        &rig_with_header("chassis = false\npsuutil = true"),
    );
    let report = validate(&log(), &config, &[]).unwrap();
    assert_eq!(report.passed(), 9, "{report}");
}

#[test]
fn unimplemented_serial_needs_legacy_fallback() {
    let dir = Utf8TempDir::new().unwrap();
    let rig = rig_with_header(
        "chassis = true\npsuutil = true\nnot_implemented = [\"serial\"]",
    );
    let mut config = with_rig(rig_config(), &dir, &rig);

    let report = validate(&log(), &config, &[]).unwrap();
    assert!(!report.is_success());
    assert_matches!(
        report.outcome("psu-serial"),
        Some(Outcome::Errored(message)) if message.contains("serial")
    );
    assert_eq!(report.passed(), 8, "{report}");

    config.checks.legacy_fallback = true;
    let report = validate(&log(), &config, &[]).unwrap();
    assert_eq!(report.passed(), 9, "{report}");
}

#[test]
fn unsupported_psu_module_skips_gated_rules() {
    let dir = Utf8TempDir::new().unwrap();
    let platform = dir.path().join("platform.json");
    std::fs::write(
        &platform,
        r#"{"PLATFORM": {"num_psus": 3,
            "modules": {"PSU": {"support": "false"}}}}"#,
    )
    .unwrap();
    let mut config = rig_config();
    config.fixtures.platform_config = Some(platform);

    let report = validate(&log(), &config, &[]).unwrap();
    for name in GATED {
        assert_matches!(report.outcome(name), Some(Outcome::Skipped(_)));
    }
    assert_eq!(report.passed(), 4, "{report}");
    assert!(report.is_success());
}

#[test]
fn mismatches_are_reported_per_rule() {
    let dir = Utf8TempDir::new().unwrap();
    let rig = rig_with_header("chassis = true").replace("12020.0", "13500.0");
    let config = with_rig(rig_config(), &dir, &rig);

    let report = validate(&log(), &config, &[]).unwrap();
    assert_matches!(
        report.outcome("psu-voltage"),
        Some(Outcome::Failed(message)) if message.starts_with("PSU 1 ")
    );
    assert_eq!(report.failed(), 1, "{report}");
    assert_eq!(report.passed(), 8, "{report}");
}

#[test]
fn selected_rules_only() {
    let names = vec!["psu-count".to_string(), "psu-status".to_string()];
    let report = validate(&log(), &rig_config(), &names).unwrap();
    let ran: Vec<_> = report.rules.iter().map(|rule| rule.name).collect();
    assert_eq!(ran, ["psu-count", "psu-status"]);
}

#[test]
fn no_backend_is_fatal() {
    let dir = Utf8TempDir::new().unwrap();
    let config = with_rig(
        rig_config(),
        &dir,
        &rig_with_header("chassis = false\npsuutil = false"),
    );
    assert_matches!(
        validate(&log(), &config, &[]),
        Err(CmdError::Failure(err))
            if err.to_string().starts_with("unable to load platform module")
    );
}
