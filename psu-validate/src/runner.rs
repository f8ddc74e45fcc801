// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Running a set of rules and collecting their outcomes

use crate::rules::{Rule, RuleContext, Verdict, all_rules};
use slog::{info, warn};
use slog_error_chain::InlineErrorChain;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown rule {name:?} (known rules: {known})")]
pub struct UnknownRule {
    pub name: String,
    known: String,
}

/// Returns the rules named in `names`, in run order, or every rule if
/// `names` is empty.
pub fn select_rules(
    names: &[String],
) -> Result<Vec<Box<dyn Rule>>, UnknownRule> {
    let rules = all_rules();
    if let Some(name) = names
        .iter()
        .find(|name| !rules.iter().any(|rule| rule.name() == name.as_str()))
    {
        let known = rules
            .iter()
            .map(|rule| rule.name())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(UnknownRule { name: name.clone(), known });
    }
    if names.is_empty() {
        return Ok(rules);
    }
    Ok(rules
        .into_iter()
        .filter(|rule| names.iter().any(|name| name == rule.name()))
        .collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
    /// The rule could not be evaluated.
    Errored(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "ok"),
            Outcome::Failed(message) => write!(f, "FAILED: {message}"),
            Outcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            Outcome::Errored(message) => write!(f, "ERROR: {message}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuleReport {
    pub name: &'static str,
    pub description: &'static str,
    pub outcome: Outcome,
    pub duration: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub rules: Vec<RuleReport>,
}

impl Report {
    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.rules.iter().filter(|rule| f(&rule.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped(_)))
    }

    pub fn errored(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Errored(_)))
    }

    /// True when no rule failed or errored. Skipped rules do not count
    /// against the run.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.errored() == 0
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.rules
            .iter()
            .find(|rule| rule.name == name)
            .map(|rule| &rule.outcome)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{:<16} {}", rule.name, rule.outcome)?;
        }
        write!(
            f,
            "{} passed, {} failed, {} skipped, {} errored",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.errored(),
        )
    }
}

/// Runs each rule once, in order. A rule that fails or errors does not stop
/// the rules after it.
pub fn run_rules(cx: &RuleContext<'_>, rules: &[Box<dyn Rule>]) -> Report {
    let mut report = Report::default();
    for rule in rules {
        let start = Instant::now();
        let outcome = match rule.check(cx) {
            Ok(Verdict::Pass) => Outcome::Passed,
            Ok(Verdict::Fail(message)) => Outcome::Failed(message),
            Ok(Verdict::Skip(reason)) => Outcome::Skipped(reason),
            Err(err) => {
                warn!(
                    cx.log, "rule errored";
                    "rule" => rule.name(),
                    InlineErrorChain::new(&err),
                );
                Outcome::Errored(InlineErrorChain::new(&err).to_string())
            }
        };
        let duration = start.elapsed();
        info!(
            cx.log, "rule finished";
            "rule" => rule.name(),
            "outcome" => %outcome,
            "duration" => ?duration,
        );
        report.rules.push(RuleReport {
            name: rule.name(),
            description: rule.description(),
            outcome,
            duration,
        });
    }
    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::{ExpectedState, PlatformConfig};
    use crate::rules::{PresenceBound, RuleError};
    use assert_matches::assert_matches;
    use psu_platform::sim::{SimConfig, SimPlatform};
    use psu_platform::{Backend, PlatformSource};
    use slog::Logger;

    struct Fixed(&'static str, fn() -> Result<Verdict, RuleError>);

    impl Rule for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "fixed verdict"
        }

        fn check(&self, _: &RuleContext<'_>) -> Result<Verdict, RuleError> {
            (self.1)()
        }
    }

    #[test]
    fn select_by_name() {
        assert_eq!(select_rules(&[]).unwrap().len(), all_rules().len());

        let names = vec!["psu-power".to_string(), "psu-count".to_string()];
        let selected: Vec<_> = select_rules(&names)
            .unwrap()
            .iter()
            .map(|rule| rule.name())
            .collect();
        assert_eq!(selected, ["psu-count", "psu-power"]);

        let err = match select_rules(&["psu-fan".to_string()]) {
            Ok(_) => panic!("unknown rule was accepted"),
            Err(err) => err,
        };
        assert_eq!(err.name, "psu-fan");
        assert!(err.to_string().contains("psu-serial"));
    }

    #[test]
    fn every_rule_runs() {
        let log = Logger::root(slog::Discard, slog::o!());
        let chassis = SimPlatform::new(SimConfig::default())
            .load_chassis(&log)
            .unwrap();
        let backend = Backend::chassis(&log, chassis);
        let platform = PlatformConfig::default();
        let expected = ExpectedState::default();
        let cx = RuleContext {
            log: &log,
            backend: &backend,
            platform: &platform,
            expected: &expected,
            presence_bound: PresenceBound::default(),
        };

        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(Fixed("fails", || Ok(Verdict::Fail("nope".to_string())))),
            Box::new(Fixed("errors", || {
                Err(RuleError::Fixture(
                    crate::fixtures::FixtureError::MissingStatus { psu: 1 },
                ))
            })),
            Box::new(Fixed("skips", || Ok(Verdict::Skip("n/a".to_string())))),
            Box::new(Fixed("passes", || Ok(Verdict::Pass))),
        ];
        let report = run_rules(&cx, &rules);

        assert_eq!(report.rules.len(), 4);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.errored(), 1);
        assert!(!report.is_success());
        assert_matches!(
            report.outcome("errors"),
            Some(Outcome::Errored(message)) if message.contains("PSU 1")
        );
        assert!(report.to_string().ends_with(
            "1 passed, 1 failed, 1 skipped, 1 errored"
        ));

        let report = run_rules(&cx, &rules[2..]);
        assert!(report.is_success());
    }
}
