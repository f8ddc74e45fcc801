// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON documents describing the platform and the expected state of the
//! test rig.
//!
//! The platform config declares what the platform supports:
//!
//! ```json
//! {
//!     "PLATFORM": {
//!         "num_psus": 2,
//!         "modules": { "PSU": { "support": "true" } }
//!     }
//! }
//! ```
//!
//! The test config describes what is physically installed. PSU numbers in
//! both documents are 1-based.
//!
//! ```json
//! {
//!     "PLATFORM": {
//!         "PSU": {
//!             "present": [1, 2],
//!             "status": [true, true],
//!             "PSU1": {
//!                 "psu_serial_num": "AAAA",
//!                 "model": "R17-1K6P1AA",
//!                 "output_voltage": 12000
//!             }
//!         }
//!     }
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key of the section that carries platform-wide settings.
pub const PLATFORM_KEY: &str = "PLATFORM";

const PSU_MODULE: &str = "PSU";

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("error reading \"{path}\"")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\"")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("no {key:?} section in the {document}")]
    MissingSection { key: String, document: &'static str },
    #[error("\"num_psus\" is not set for {key:?} in the platform config")]
    MissingNumPsus { key: String },
    #[error(
        "\"modules.PSU.support\" is not set for {key:?} in the platform config"
    )]
    MissingSupport { key: String },
    #[error("no \"PSU\" section for {key:?} in the test config")]
    MissingPsuSection { key: String },
    #[error("invalid PSU number {psu} in \"present\": PSU numbers start at 1")]
    InvalidPsuNumber { psu: usize },
    #[error("no expected status for PSU {psu} in the test config")]
    MissingStatus { psu: usize },
    #[error("no \"PSU{psu}\" entry in the test config")]
    MissingUnit { psu: usize },
    #[error("invalid \"PSU{psu}\" entry in the test config")]
    InvalidUnit {
        psu: usize,
        #[source]
        err: serde_json::Error,
    },
    #[error("no {field:?} for PSU {psu} in the test config")]
    MissingField { psu: usize, field: &'static str },
}

fn from_file<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, FixtureError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| FixtureError::Io { path: path.into(), err })?;
    serde_json::from_str(&contents)
        .map_err(|err| FixtureError::Parse { path: path.into(), err })
}

/// The platform capability document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PlatformConfig {
    sections: BTreeMap<String, PlatformSection>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PlatformSection {
    #[serde(default)]
    pub num_psus: Option<usize>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSection>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ModuleSection {
    #[serde(default, deserialize_with = "deserialize_support")]
    pub support: Option<bool>,
}

impl PlatformConfig {
    pub fn from_file(path: &Utf8Path) -> Result<PlatformConfig, FixtureError> {
        from_file(path)
    }

    /// Every platform key in the document, in sorted order.
    pub fn platform_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.sections.keys().map(String::as_str)
    }

    fn primary(&self) -> Result<&PlatformSection, FixtureError> {
        self.sections.get(PLATFORM_KEY).ok_or_else(|| {
            FixtureError::MissingSection {
                key: PLATFORM_KEY.to_string(),
                document: "platform config",
            }
        })
    }

    /// Number of PSUs the platform declares.
    pub fn num_psus(&self) -> Result<usize, FixtureError> {
        self.primary()?.num_psus.ok_or_else(|| FixtureError::MissingNumPsus {
            key: PLATFORM_KEY.to_string(),
        })
    }

    /// Whether serial, model and output readings are expected to work.
    pub fn psu_support(&self) -> Result<bool, FixtureError> {
        self.primary()?
            .modules
            .get(PSU_MODULE)
            .and_then(|module| module.support)
            .ok_or_else(|| FixtureError::MissingSupport {
                key: PLATFORM_KEY.to_string(),
            })
    }
}

/// Only the exact (case-insensitive) string "false", or a JSON `false`,
/// disables a module. Any other value leaves it enabled.
fn deserialize_support<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(Some(match Flag::deserialize(deserializer)? {
        Flag::Bool(support) => support,
        Flag::Text(text) => !text.trim().eq_ignore_ascii_case("false"),
    }))
}

/// The expected-state document for one test scenario.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ExpectedState {
    sections: BTreeMap<String, ExpectedSection>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ExpectedSection {
    #[serde(rename = "PSU", default)]
    pub psu: Option<PsuExpectations>,
}

impl ExpectedState {
    pub fn from_file(path: &Utf8Path) -> Result<ExpectedState, FixtureError> {
        from_file(path)
    }

    /// PSU expectations for the given platform key.
    pub fn psus(&self, key: &str) -> Result<&PsuExpectations, FixtureError> {
        let section = self.sections.get(key).ok_or_else(|| {
            FixtureError::MissingSection {
                key: key.to_string(),
                document: "test config",
            }
        })?;
        section.psu.as_ref().ok_or_else(|| FixtureError::MissingPsuSection {
            key: key.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PsuExpectations {
    present: Vec<usize>,
    #[serde(default)]
    status: Vec<bool>,
    /// The per-PSU `PSU<n>` entries, parsed on demand.
    #[serde(flatten)]
    units: BTreeMap<String, serde_json::Value>,
}

impl PsuExpectations {
    /// PSU numbers expected to be installed.
    pub fn present(&self) -> Result<&[usize], FixtureError> {
        if let Some(&psu) = self.present.iter().find(|&&psu| psu == 0) {
            return Err(FixtureError::InvalidPsuNumber { psu });
        }
        Ok(&self.present)
    }

    pub fn is_present(&self, psu: usize) -> bool {
        self.present.contains(&psu)
    }

    /// Expected power-good status of PSU number `psu`.
    pub fn status(&self, psu: usize) -> Result<bool, FixtureError> {
        psu.checked_sub(1)
            .and_then(|index| self.status.get(index))
            .copied()
            .ok_or(FixtureError::MissingStatus { psu })
    }

    pub fn unit(&self, psu: usize) -> Result<UnitExpectations, FixtureError> {
        let value = self
            .units
            .get(&format!("PSU{psu}"))
            .ok_or(FixtureError::MissingUnit { psu })?;
        let mut unit: UnitExpectations = serde_json::from_value(value.clone())
            .map_err(|err| FixtureError::InvalidUnit { psu, err })?;
        unit.psu = psu;
        Ok(unit)
    }
}

/// Expected identity and readings of one PSU.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct UnitExpectations {
    #[serde(skip)]
    psu: usize,
    #[serde(default)]
    psu_serial_num: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_reading")]
    output_voltage: Option<f64>,
}

impl UnitExpectations {
    pub fn serial(&self) -> Result<&str, FixtureError> {
        self.psu_serial_num.as_deref().ok_or(FixtureError::MissingField {
            psu: self.psu,
            field: "psu_serial_num",
        })
    }

    pub fn model(&self) -> Result<&str, FixtureError> {
        self.model.as_deref().ok_or(FixtureError::MissingField {
            psu: self.psu,
            field: "model",
        })
    }

    pub fn output_voltage(&self) -> Result<f64, FixtureError> {
        self.output_voltage.ok_or(FixtureError::MissingField {
            psu: self.psu,
            field: "output_voltage",
        })
    }
}

/// Readings may be written either as JSON numbers or as numeric strings.
fn deserialize_reading<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reading {
        Number(f64),
        Text(String),
    }

    match Reading::deserialize(deserializer)? {
        Reading::Number(value) => Ok(Some(value)),
        Reading::Text(text) => text.trim().parse().map(Some).map_err(|_| {
            serde::de::Error::custom(format!("invalid reading {text:?}"))
        }),
    }
}
