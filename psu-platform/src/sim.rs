// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated platform, described by a TOML file
//!
//! ```toml
//! chassis = true
//! psuutil = true
//! not_implemented = ["serial"]
//!
//! [[psus]]
//! serial = "SN0001"
//! model = "R17-1K6P1AA"
//! voltage = 12000.0
//! current = 20.5
//! power = 246.0
//!
//! [[psus]]
//! present = false
//! powergood = false
//! ```

use crate::api::{
    Attribute, BackendError, Chassis, Psu, PsuUtil, Support,
};
use crate::resolve::PlatformSource;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Configuration of a simulated platform
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SimConfig {
    /// Whether the structured chassis API is available.
    #[serde(default = "default_true")]
    pub chassis: bool,
    /// Whether the legacy psuutil is available.
    #[serde(default)]
    pub psuutil: bool,
    /// Attributes the simulated chassis answers with
    /// [`Support::NotImplemented`].
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub not_implemented: BTreeSet<Attribute>,
    /// PSU count to report, if it should differ from `psus.len()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_psus: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub psus: Vec<SimPsuConfig>,
}

/// Configuration of one simulated PSU
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SimPsuConfig {
    #[serde(default = "default_true")]
    pub present: bool,
    #[serde(default = "default_true")]
    pub powergood: bool,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub power: f64,
    /// Attributes whose reads fail on this PSU, through either API.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub faults: BTreeSet<Attribute>,
}

fn default_true() -> bool {
    true
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            chassis: true,
            psuutil: false,
            not_implemented: BTreeSet::new(),
            num_psus: None,
            psus: Vec::new(),
        }
    }
}

impl Default for SimPsuConfig {
    fn default() -> Self {
        SimPsuConfig {
            present: true,
            powergood: true,
            serial: String::new(),
            model: String::new(),
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            faults: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
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
        err: toml::de::Error,
    },
}

impl SimConfig {
    /// Load a `SimConfig` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<SimConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        toml::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })
    }

    fn reported_num_psus(&self) -> usize {
        self.num_psus.unwrap_or(self.psus.len())
    }
}

/// [`PlatformSource`] handing out simulated interfaces that share one
/// [`SimConfig`].
#[derive(Clone, Debug)]
pub struct SimPlatform {
    config: Arc<SimConfig>,
}

impl SimPlatform {
    pub fn new(config: SimConfig) -> SimPlatform {
        SimPlatform { config: Arc::new(config) }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

impl PlatformSource for SimPlatform {
    fn name(&self) -> String {
        format!("simulated platform with {} PSUs", self.config.psus.len())
    }

    fn load_chassis(
        &self,
        _log: &Logger,
    ) -> Result<Box<dyn Chassis>, BackendError> {
        if !self.config.chassis {
            return Err(BackendError::Unavailable {
                reason: "simulated chassis is disabled".to_string(),
            });
        }
        Ok(Box::new(SimChassis { config: Arc::clone(&self.config) }))
    }

    fn load_psuutil(
        &self,
        _log: &Logger,
    ) -> Result<Box<dyn PsuUtil>, BackendError> {
        if !self.config.psuutil {
            return Err(BackendError::Unavailable {
                reason: "simulated psuutil is disabled".to_string(),
            });
        }
        Ok(Box::new(SimPsuUtil { config: Arc::clone(&self.config) }))
    }
}

pub struct SimChassis {
    config: Arc<SimConfig>,
}

impl Chassis for SimChassis {
    fn num_psus(&self) -> Result<Support<usize>, BackendError> {
        if self.config.not_implemented.contains(&Attribute::NumPsus) {
            return Ok(Support::NotImplemented);
        }
        Ok(Support::Implemented(self.config.reported_num_psus()))
    }

    fn psu(&self, index: usize) -> Result<Box<dyn Psu + '_>, BackendError> {
        let psu = self
            .config
            .psus
            .get(index)
            .ok_or(BackendError::NoSuchPsu { index })?;
        Ok(Box::new(SimPsu {
            index,
            psu,
            not_implemented: &self.config.not_implemented,
        }))
    }
}

struct SimPsu<'a> {
    index: usize,
    psu: &'a SimPsuConfig,
    not_implemented: &'a BTreeSet<Attribute>,
}

impl SimPsu<'_> {
    fn read<T>(
        &self,
        attribute: Attribute,
        value: impl FnOnce(&SimPsuConfig) -> T,
    ) -> Result<Support<T>, BackendError> {
        if self.psu.faults.contains(&attribute) {
            return Err(BackendError::SimulatedFault {
                attribute,
                index: self.index,
            });
        }
        if self.not_implemented.contains(&attribute) {
            return Ok(Support::NotImplemented);
        }
        Ok(Support::Implemented(value(self.psu)))
    }
}

impl Psu for SimPsu<'_> {
    fn presence(&self) -> Result<Support<bool>, BackendError> {
        self.read(Attribute::Presence, |psu| psu.present)
    }

    fn powergood_status(&self) -> Result<Support<bool>, BackendError> {
        self.read(Attribute::Status, |psu| psu.powergood)
    }

    fn serial(&self) -> Result<Support<String>, BackendError> {
        self.read(Attribute::Serial, |psu| psu.serial.clone())
    }

    fn model(&self) -> Result<Support<String>, BackendError> {
        self.read(Attribute::Model, |psu| psu.model.clone())
    }

    fn power(&self) -> Result<Support<f64>, BackendError> {
        self.read(Attribute::Power, |psu| psu.power)
    }

    fn current(&self) -> Result<Support<f64>, BackendError> {
        self.read(Attribute::Current, |psu| psu.current)
    }

    fn voltage(&self) -> Result<Support<f64>, BackendError> {
        self.read(Attribute::Voltage, |psu| psu.voltage)
    }
}

pub struct SimPsuUtil {
    config: Arc<SimConfig>,
}

impl SimPsuUtil {
    fn read<T>(
        &self,
        index: usize,
        attribute: Attribute,
        value: impl FnOnce(&SimPsuConfig) -> T,
    ) -> Result<T, BackendError> {
        if index == 0 {
            return Err(BackendError::InvalidIndex { index });
        }
        let psu = self
            .config
            .psus
            .get(index - 1)
            .ok_or(BackendError::NoSuchPsu { index })?;
        if psu.faults.contains(&attribute) {
            return Err(BackendError::SimulatedFault { attribute, index });
        }
        Ok(value(psu))
    }
}

impl PsuUtil for SimPsuUtil {
    fn num_psus(&self) -> Result<usize, BackendError> {
        Ok(self.config.reported_num_psus())
    }

    fn psu_presence(&self, index: usize) -> Result<bool, BackendError> {
        self.read(index, Attribute::Presence, |psu| psu.present)
    }

    fn psu_status(&self, index: usize) -> Result<bool, BackendError> {
        self.read(index, Attribute::Status, |psu| psu.powergood)
    }

    fn serial(&self, index: usize) -> Result<String, BackendError> {
        self.read(index, Attribute::Serial, |psu| psu.serial.clone())
    }

    fn model(&self, index: usize) -> Result<String, BackendError> {
        self.read(index, Attribute::Model, |psu| psu.model.clone())
    }

    fn output_power(&self, index: usize) -> Result<f64, BackendError> {
        self.read(index, Attribute::Power, |psu| psu.power)
    }

    fn output_current(&self, index: usize) -> Result<f64, BackendError> {
        self.read(index, Attribute::Current, |psu| psu.current)
    }

    fn output_voltage(&self, index: usize) -> Result<f64, BackendError> {
        self.read(index, Attribute::Voltage, |psu| psu.voltage)
    }
}
