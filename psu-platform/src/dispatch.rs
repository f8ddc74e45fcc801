// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of PSU queries to whichever platform API was resolved

use crate::api::{Attribute, BackendError, Chassis, PsuUtil, Support};
use slog::{Logger, debug};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(
        "{attribute} is not implemented by the chassis and no psuutil is loaded"
    )]
    NotImplemented { attribute: Attribute, index: Option<usize> },
    #[error("failed to read {attribute}")]
    Backend {
        attribute: Attribute,
        #[source]
        err: BackendError,
    },
}

/// Which platform interfaces a [`Backend`] holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Chassis,
    PsuUtil,
    /// Chassis first, psuutil for anything the chassis doesn't implement.
    ChassisWithFallback,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                BackendKind::Chassis => "chassis",
                BackendKind::PsuUtil => "psuutil",
                BackendKind::ChassisWithFallback => "chassis+psuutil",
            }
        )
    }
}

/// A resolved platform backend.
///
/// All indices taken by `Backend` are 0-based. When a query has to be
/// answered by the psuutil the index is shifted to the psuutil's 1-based
/// convention.
pub struct Backend {
    log: Logger,
    chassis: Option<Box<dyn Chassis>>,
    psuutil: Option<Box<dyn PsuUtil>>,
}

impl Backend {
    pub fn chassis(log: &Logger, chassis: Box<dyn Chassis>) -> Backend {
        Backend { log: log.clone(), chassis: Some(chassis), psuutil: None }
    }

    pub fn psuutil(log: &Logger, psuutil: Box<dyn PsuUtil>) -> Backend {
        Backend { log: log.clone(), chassis: None, psuutil: Some(psuutil) }
    }

    pub fn with_fallback(
        log: &Logger,
        chassis: Box<dyn Chassis>,
        psuutil: Box<dyn PsuUtil>,
    ) -> Backend {
        Backend {
            log: log.clone(),
            chassis: Some(chassis),
            psuutil: Some(psuutil),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match (&self.chassis, &self.psuutil) {
            (Some(_), Some(_)) => BackendKind::ChassisWithFallback,
            (Some(_), None) => BackendKind::Chassis,
            // Every constructor sets at least one of the two.
            (None, _) => BackendKind::PsuUtil,
        }
    }

    pub fn num_psus(&self) -> Result<usize, DispatchError> {
        self.dispatch(
            Attribute::NumPsus,
            None,
            |chassis| chassis.num_psus(),
            |psuutil| psuutil.num_psus(),
        )
    }

    pub fn presence(&self, index: usize) -> Result<bool, DispatchError> {
        self.dispatch(
            Attribute::Presence,
            Some(index),
            |chassis| chassis.psu(index)?.presence(),
            |psuutil| psuutil.psu_presence(legacy_index(index)),
        )
    }

    pub fn status(&self, index: usize) -> Result<bool, DispatchError> {
        self.dispatch(
            Attribute::Status,
            Some(index),
            |chassis| chassis.psu(index)?.powergood_status(),
            |psuutil| psuutil.psu_status(legacy_index(index)),
        )
    }

    pub fn serial(&self, index: usize) -> Result<String, DispatchError> {
        self.dispatch(
            Attribute::Serial,
            Some(index),
            |chassis| chassis.psu(index)?.serial(),
            |psuutil| psuutil.serial(legacy_index(index)),
        )
    }

    pub fn model(&self, index: usize) -> Result<String, DispatchError> {
        self.dispatch(
            Attribute::Model,
            Some(index),
            |chassis| chassis.psu(index)?.model(),
            |psuutil| psuutil.model(legacy_index(index)),
        )
    }

    pub fn power(&self, index: usize) -> Result<f64, DispatchError> {
        self.dispatch(
            Attribute::Power,
            Some(index),
            |chassis| chassis.psu(index)?.power(),
            |psuutil| psuutil.output_power(legacy_index(index)),
        )
    }

    pub fn current(&self, index: usize) -> Result<f64, DispatchError> {
        self.dispatch(
            Attribute::Current,
            Some(index),
            |chassis| chassis.psu(index)?.current(),
            |psuutil| psuutil.output_current(legacy_index(index)),
        )
    }

    pub fn voltage(&self, index: usize) -> Result<f64, DispatchError> {
        self.dispatch(
            Attribute::Voltage,
            Some(index),
            |chassis| chassis.psu(index)?.voltage(),
            |psuutil| psuutil.output_voltage(legacy_index(index)),
        )
    }

    fn dispatch<T>(
        &self,
        attribute: Attribute,
        index: Option<usize>,
        structured: impl FnOnce(&dyn Chassis) -> Result<Support<T>, BackendError>,
        legacy: impl FnOnce(&dyn PsuUtil) -> Result<T, BackendError>,
    ) -> Result<T, DispatchError> {
        if let Some(chassis) = &self.chassis {
            match structured(chassis.as_ref())
                .map_err(|err| DispatchError::Backend { attribute, err })?
            {
                Support::Implemented(value) => return Ok(value),
                Support::NotImplemented => {
                    debug!(
                        self.log,
                        "chassis does not implement attribute";
                        "attribute" => %attribute,
                        "psu_index" => ?index,
                        "fallback" => self.psuutil.is_some(),
                    );
                }
            }
        }

        match &self.psuutil {
            Some(psuutil) => legacy(psuutil.as_ref())
                .map_err(|err| DispatchError::Backend { attribute, err }),
            None => Err(DispatchError::NotImplemented { attribute, index }),
        }
    }
}

fn legacy_index(index: usize) -> usize {
    index + 1
}
