// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PSU validation rules
//!
//! Each rule compares what the platform reports through a [`Backend`]
//! against the platform config and the expected state of the rig. PSU
//! numbers from the fixtures are 1-based; the backend is queried with
//! `number - 1`.

use crate::fixtures::{
    ExpectedState, FixtureError, PlatformConfig, PsuExpectations,
};
use psu_platform::{Backend, DispatchError};
use serde::{Deserialize, Serialize};
use slog::{Logger, debug};
use thiserror::Error;

/// Relative tolerance applied to the expected output voltage.
pub const VOLTAGE_TOLERANCE: f64 = 0.10;

/// Result of a rule that ran to completion.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(String),
    /// The rule does not apply to this platform.
    Skip(String),
}

/// A rule could not reach a verdict.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Which PSU numbers the "not present" rule examines.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum PresenceBound {
    /// PSUs `1..count`: the highest-numbered PSU is not examined.
    #[default]
    ExcludeLast,
    /// PSUs `1..=count`.
    IncludeLast,
}

/// Everything a rule needs to run.
pub struct RuleContext<'a> {
    pub log: &'a Logger,
    pub backend: &'a Backend,
    pub platform: &'a PlatformConfig,
    pub expected: &'a ExpectedState,
    pub presence_bound: PresenceBound,
}

pub trait Rule {
    /// Short kebab-case name, used for selection on the command line.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError>;
}

/// All rules, in the order they run.
pub fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(PsuCount),
        Box::new(PsuPresent),
        Box::new(PsuNotPresent),
        Box::new(PsuStatus),
        Box::new(PsuSerial),
        Box::new(PsuModel),
        Box::new(PsuVoltage),
        Box::new(PsuCurrent),
        Box::new(PsuPower),
    ]
}

fn backend_index(psu: usize) -> usize {
    psu - 1
}

pub struct PsuCount;

impl Rule for PsuCount {
    fn name(&self) -> &'static str {
        "psu-count"
    }

    fn description(&self) -> &'static str {
        "reported PSU count matches the platform config"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        let expected = cx.platform.num_psus()?;
        let reported = cx.backend.num_psus()?;
        if reported == expected {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Fail(format!(
                "platform reports {reported} PSUs, \
                 but the platform config declares {expected}"
            )))
        }
    }
}

pub struct PsuPresent;

impl Rule for PsuPresent {
    fn name(&self) -> &'static str {
        "psu-present"
    }

    fn description(&self) -> &'static str {
        "every installed PSU is reported present"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        for key in cx.platform.platform_keys() {
            for &psu in cx.expected.psus(key)?.present()? {
                if !cx.backend.presence(backend_index(psu))? {
                    return Ok(Verdict::Fail(format!(
                        "PSU {psu} is installed but reported absent"
                    )));
                }
            }
        }
        Ok(Verdict::Pass)
    }
}

pub struct PsuNotPresent;

impl Rule for PsuNotPresent {
    fn name(&self) -> &'static str {
        "psu-not-present"
    }

    fn description(&self) -> &'static str {
        "no PSU outside the installed set is reported present"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        let count = cx.backend.num_psus()?;
        let last = match cx.presence_bound {
            PresenceBound::ExcludeLast => count.saturating_sub(1),
            PresenceBound::IncludeLast => count,
        };
        for key in cx.platform.platform_keys() {
            let psus = cx.expected.psus(key)?;
            // Validates the installed set before it is consulted below.
            psus.present()?;
            for psu in 1..=last {
                if psus.is_present(psu) {
                    continue;
                }
                if cx.backend.presence(backend_index(psu))? {
                    return Ok(Verdict::Fail(format!(
                        "PSU {psu} is not installed but reported present"
                    )));
                }
            }
        }
        Ok(Verdict::Pass)
    }
}

pub struct PsuStatus;

impl Rule for PsuStatus {
    fn name(&self) -> &'static str {
        "psu-status"
    }

    fn description(&self) -> &'static str {
        "power-good status of installed PSUs matches the test config"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        for key in cx.platform.platform_keys() {
            let psus = cx.expected.psus(key)?;
            for &psu in psus.present()? {
                let expected = psus.status(psu)?;
                let reported = cx.backend.status(backend_index(psu))?;
                if reported != expected {
                    return Ok(Verdict::Fail(format!(
                        "PSU {psu} power-good status is {reported}, \
                         expected {expected}"
                    )));
                }
            }
        }
        Ok(Verdict::Pass)
    }
}

/// Runs `check` against every installed PSU that reports power good, as
/// long as the platform config declares PSU support.
///
/// `check` returns a failure message, or `None` if the PSU is fine.
fn check_healthy_psus<F>(
    cx: &RuleContext<'_>,
    rule: &'static str,
    mut check: F,
) -> Result<Verdict, RuleError>
where
    F: FnMut(usize, &PsuExpectations) -> Result<Option<String>, RuleError>,
{
    if !cx.platform.psu_support()? {
        return Ok(Verdict::Skip(
            "PSU module is not supported by the platform config".to_string(),
        ));
    }
    for key in cx.platform.platform_keys() {
        let psus = cx.expected.psus(key)?;
        for &psu in psus.present()? {
            if !cx.backend.status(backend_index(psu))? {
                debug!(
                    cx.log, "skipping PSU without power good";
                    "rule" => rule,
                    "psu" => psu,
                );
                continue;
            }
            if let Some(message) = check(psu, psus)? {
                return Ok(Verdict::Fail(message));
            }
        }
    }
    Ok(Verdict::Pass)
}

pub struct PsuSerial;

impl Rule for PsuSerial {
    fn name(&self) -> &'static str {
        "psu-serial"
    }

    fn description(&self) -> &'static str {
        "serial numbers of healthy PSUs match the test config"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        check_healthy_psus(cx, self.name(), |psu, psus| {
            let unit = psus.unit(psu)?;
            let expected = unit.serial()?;
            let reported = cx.backend.serial(backend_index(psu))?;
            Ok((reported != expected).then(|| {
                format!(
                    "PSU {psu} serial number is {reported:?}, \
                     expected {expected:?}"
                )
            }))
        })
    }
}

pub struct PsuModel;

impl Rule for PsuModel {
    fn name(&self) -> &'static str {
        "psu-model"
    }

    fn description(&self) -> &'static str {
        "models of healthy PSUs match the test config"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        check_healthy_psus(cx, self.name(), |psu, psus| {
            let unit = psus.unit(psu)?;
            let expected = unit.model()?;
            let reported = cx.backend.model(backend_index(psu))?;
            Ok((reported != expected).then(|| {
                format!("PSU {psu} model is {reported:?}, expected {expected:?}")
            }))
        })
    }
}

pub struct PsuVoltage;

impl Rule for PsuVoltage {
    fn name(&self) -> &'static str {
        "psu-voltage"
    }

    fn description(&self) -> &'static str {
        "output voltage of healthy PSUs is within 10% of the test config"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        check_healthy_psus(cx, self.name(), |psu, psus| {
            let expected = psus.unit(psu)?.output_voltage()?;
            let reported = cx.backend.voltage(backend_index(psu))?;
            let high = expected * (1.0 + VOLTAGE_TOLERANCE);
            let low = expected * (1.0 - VOLTAGE_TOLERANCE);
            Ok(if reported > high {
                Some(format!(
                    "PSU {psu} output voltage {reported} is above {high} \
                     (expected {expected})"
                ))
            } else if reported < low {
                Some(format!(
                    "PSU {psu} output voltage {reported} is below {low} \
                     (expected {expected})"
                ))
            } else {
                None
            })
        })
    }
}

pub struct PsuCurrent;

impl Rule for PsuCurrent {
    fn name(&self) -> &'static str {
        "psu-current"
    }

    fn description(&self) -> &'static str {
        "healthy PSUs report a non-zero output current"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        check_healthy_psus(cx, self.name(), |psu, _| {
            let reported = cx.backend.current(backend_index(psu))?;
            Ok((reported == 0.0)
                .then(|| format!("PSU {psu} reports zero output current")))
        })
    }
}

pub struct PsuPower;

impl Rule for PsuPower {
    fn name(&self) -> &'static str {
        "psu-power"
    }

    fn description(&self) -> &'static str {
        "healthy PSUs report a non-zero output power"
    }

    fn check(&self, cx: &RuleContext<'_>) -> Result<Verdict, RuleError> {
        check_healthy_psus(cx, self.name(), |psu, _| {
            let reported = cx.backend.power(backend_index(psu))?;
            Ok((reported == 0.0)
                .then(|| format!("PSU {psu} reports zero output power")))
        })
    }
}
