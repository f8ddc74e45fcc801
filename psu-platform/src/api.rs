// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces implemented by platform backends

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of reading one attribute through the structured chassis API.
///
/// Platforms are free to leave parts of the chassis API unimplemented; a
/// `NotImplemented` answer is not an error, it tells the caller to go ask the
/// legacy psuutil instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Support<T> {
    Implemented(T),
    NotImplemented,
}

impl<T> Support<T> {
    pub fn implemented(self) -> Option<T> {
        match self {
            Support::Implemented(value) => Some(value),
            Support::NotImplemented => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Support<U> {
        match self {
            Support::Implemented(value) => Support::Implemented(f(value)),
            Support::NotImplemented => Support::NotImplemented,
        }
    }
}

/// Every PSU attribute either API can report.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    NumPsus,
    Presence,
    Status,
    Serial,
    Model,
    Power,
    Current,
    Voltage,
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Attribute::NumPsus => "num_psus",
                Attribute::Presence => "presence",
                Attribute::Status => "status",
                Attribute::Serial => "serial",
                Attribute::Model => "model",
                Attribute::Power => "power",
                Attribute::Current => "current",
                Attribute::Voltage => "voltage",
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("error reading \"{path}\"")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("invalid {attribute} value {value:?} in \"{path}\"")]
    Parse { path: Utf8PathBuf, attribute: Attribute, value: String },
    #[error("PSU index {index} does not exist")]
    NoSuchPsu { index: usize },
    #[error("invalid psuutil index {index}: psuutil indices start at 1")]
    InvalidIndex { index: usize },
    #[error("platform interface unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("simulated {attribute} fault on PSU index {index}")]
    SimulatedFault { attribute: Attribute, index: usize },
}

/// The structured platform object model.
///
/// PSU indices are 0-based.
pub trait Chassis {
    fn num_psus(&self) -> Result<Support<usize>, BackendError>;

    fn psu(&self, index: usize) -> Result<Box<dyn Psu + '_>, BackendError>;
}

/// One PSU as handed out by a [`Chassis`].
pub trait Psu {
    fn presence(&self) -> Result<Support<bool>, BackendError>;

    /// Whether the PSU reports power-good.
    fn powergood_status(&self) -> Result<Support<bool>, BackendError>;

    fn serial(&self) -> Result<Support<String>, BackendError>;

    fn model(&self) -> Result<Support<String>, BackendError>;

    fn power(&self) -> Result<Support<f64>, BackendError>;

    fn current(&self) -> Result<Support<f64>, BackendError>;

    fn voltage(&self) -> Result<Support<f64>, BackendError>;
}

/// The legacy flat PSU utility.
///
/// PSU indices are 1-based. There is no notion of an unimplemented
/// attribute here: anything the platform can't answer is an error.
pub trait PsuUtil {
    fn num_psus(&self) -> Result<usize, BackendError>;

    fn psu_presence(&self, index: usize) -> Result<bool, BackendError>;

    fn psu_status(&self, index: usize) -> Result<bool, BackendError>;

    fn serial(&self, index: usize) -> Result<String, BackendError>;

    fn model(&self, index: usize) -> Result<String, BackendError>;

    fn output_power(&self, index: usize) -> Result<f64, BackendError>;

    fn output_current(&self, index: usize) -> Result<f64, BackendError>;

    fn output_voltage(&self, index: usize) -> Result<f64, BackendError>;
}
