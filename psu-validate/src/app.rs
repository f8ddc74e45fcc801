// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cmd::CmdError;
use crate::config::{Config, PlatformSourceConfig};
use crate::fixtures::{ExpectedState, PlatformConfig};
use crate::rules::{PresenceBound, RuleContext, all_rules};
use crate::runner::{Report, run_rules, select_rules};
use anyhow::{Context, anyhow};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use psu_platform::{ResolveOptions, Resolver};
use slog::{Drain, info};

/// PSU validation tool.
#[derive(Debug, Parser)]
#[command(version)]
pub struct PsuValidateApp {
    #[clap(subcommand)]
    subcommand: PsuValidateCommand,
}

impl PsuValidateApp {
    /// Executes the app.
    pub fn exec(self, log: &slog::Logger) -> Result<(), CmdError> {
        match self.subcommand {
            PsuValidateCommand::Run(args) => args.exec(log),
            PsuValidateCommand::List => {
                for rule in all_rules() {
                    println!("{:<16} {}", rule.name(), rule.description());
                }
                Ok(())
            }
        }
    }

    pub fn setup_log() -> slog::Logger {
        let drain = stderr_env_drain("RUST_LOG");
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }
}

#[derive(Debug, Subcommand)]
enum PsuValidateCommand {
    /// Validate the platform's PSUs against the expected rig state.
    Run(RunArgs),
    /// List the available rules.
    List,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML file with platform, fixture and check settings
    #[clap(long)]
    config: Option<Utf8PathBuf>,

    /// Platform directory to read PSUs from
    #[clap(long, conflicts_with = "sim")]
    platform_root: Option<Utf8PathBuf>,

    /// Validate a simulated platform described by this TOML file
    #[clap(long)]
    sim: Option<Utf8PathBuf>,

    /// Platform capability document (JSON)
    #[clap(long)]
    platform_config: Option<Utf8PathBuf>,

    /// Expected state of the rig (JSON)
    #[clap(long)]
    test_config: Option<Utf8PathBuf>,

    /// Run only this rule (may be repeated)
    #[clap(long = "rule", value_name = "NAME")]
    rules: Vec<String>,

    /// Also check the highest-numbered PSU for unexpected presence
    #[clap(long)]
    check_last_psu: bool,

    /// Answer attributes the chassis does not implement from the psuutil
    #[clap(long)]
    legacy_fallback: bool,
}

impl RunArgs {
    fn exec(self, log: &slog::Logger) -> Result<(), CmdError> {
        let rules = self.rules.clone();
        let config = self.into_config()?;
        let report = validate(log, &config, &rules)?;
        println!("{report}");
        if report.is_success() {
            Ok(())
        } else {
            Err(CmdError::Failure(anyhow!(
                "{} of {} rules did not pass",
                report.failed() + report.errored(),
                report.rules.len(),
            )))
        }
    }

    /// Merges the config file, if any, with the command-line overrides.
    fn into_config(self) -> Result<Config, CmdError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .map_err(|err| CmdError::Failure(anyhow::Error::new(err)))?,
            None => Config::default(),
        };
        if let Some(root) = self.platform_root {
            config.platform = PlatformSourceConfig::Sysfs { root };
        }
        if let Some(sim) = self.sim {
            config.platform = PlatformSourceConfig::Simulated { config: sim };
        }
        if let Some(path) = self.platform_config {
            config.fixtures.platform_config = Some(path);
        }
        if let Some(path) = self.test_config {
            config.fixtures.test_config = Some(path);
        }
        if self.check_last_psu {
            config.checks.presence_bound = PresenceBound::IncludeLast;
        }
        if self.legacy_fallback {
            config.checks.legacy_fallback = true;
        }
        Ok(config)
    }
}

/// Resolves the platform described by `config`, loads its fixtures and runs
/// the named rules (all of them if `rule_names` is empty).
pub fn validate(
    log: &slog::Logger,
    config: &Config,
    rule_names: &[String],
) -> Result<Report, CmdError> {
    let rules = select_rules(rule_names)
        .map_err(|err| CmdError::Usage(err.to_string()))?;
    let platform_path =
        config.fixtures.platform_config.as_deref().ok_or_else(|| {
            CmdError::Usage(
                "no platform config: pass --platform-config or set \
                 fixtures.platform_config"
                    .to_string(),
            )
        })?;
    let test_path = config.fixtures.test_config.as_deref().ok_or_else(|| {
        CmdError::Usage(
            "no test config: pass --test-config or set fixtures.test_config"
                .to_string(),
        )
    })?;

    let platform = PlatformConfig::from_file(platform_path)
        .context("loading platform config")
        .map_err(CmdError::Failure)?;
    let expected = ExpectedState::from_file(test_path)
        .context("loading test config")
        .map_err(CmdError::Failure)?;

    let source = config
        .platform
        .build()
        .context("loading simulated platform")
        .map_err(CmdError::Failure)?;
    let resolver = Resolver::new(
        log,
        source,
        ResolveOptions { legacy_fallback: config.checks.legacy_fallback },
    );
    let backend = resolver
        .resolve()
        .map_err(|err| CmdError::Failure(anyhow::Error::new(err)))?;
    info!(
        log, "running rules";
        "backend" => %backend.kind(),
        "rules" => rules.len(),
    );

    let cx = RuleContext {
        log,
        backend,
        platform: &platform,
        expected: &expected,
        presence_bound: config.checks.presence_bound,
    };
    Ok(run_rules(&cx, &rules))
}

fn stderr_env_drain(env_var: &str) -> impl Drain<Ok = (), Err = slog::Never> {
    let stderr_decorator = slog_term::TermDecorator::new().build();
    let stderr_drain =
        slog_term::FullFormat::new(stderr_decorator).build().fuse();
    let mut builder = slog_envlogger::LogBuilder::new(stderr_drain);
    if let Ok(s) = std::env::var(env_var) {
        builder = builder.parse(&s);
    } else {
        // Log at the info level by default.
        builder = builder.filter(None, slog::FilterLevel::Info);
    }
    builder.build()
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn run_args(args: &[&str]) -> RunArgs {
        let app = PsuValidateApp::try_parse_from(
            ["psu-validate", "run"].iter().chain(args),
        )
        .unwrap();
        match app.subcommand {
            PsuValidateCommand::Run(args) => args,
            PsuValidateCommand::List => panic!("parsed as list"),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let config = run_args(&[
            "--sim",
            "rig.toml",
            "--platform-config",
            "platform.json",
            "--test-config",
            "test.json",
            "--check-last-psu",
            "--legacy-fallback",
        ])
        .into_config()
        .unwrap();
        assert_eq!(
            config.platform,
            PlatformSourceConfig::Simulated { config: "rig.toml".into() }
        );
        assert_eq!(
            config.fixtures.test_config.as_deref(),
            Some(camino::Utf8Path::new("test.json"))
        );
        assert_eq!(config.checks.presence_bound, PresenceBound::IncludeLast);
        assert!(config.checks.legacy_fallback);
    }

    #[test]
    fn platform_root_conflicts_with_sim() {
        assert!(PsuValidateApp::try_parse_from([
            "psu-validate",
            "run",
            "--sim",
            "rig.toml",
            "--platform-root",
            "/tmp/platform",
        ])
        .is_err());
    }

    #[test]
    fn missing_fixtures_are_usage_errors() {
        let log = slog::Logger::root(slog::Discard, slog::o!());
        let config = run_args(&["--sim", "rig.toml"]).into_config().unwrap();
        assert_matches!(
            validate(&log, &config, &[]),
            Err(CmdError::Usage(message)) if message.contains("--platform-config")
        );
        assert_matches!(
            validate(&log, &config, &["psu-fan".to_string()]),
            Err(CmdError::Usage(message)) if message.contains("psu-fan")
        );
    }
}
