// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-time selection of the platform API used to talk to PSUs

use crate::api::{BackendError, Chassis, PsuUtil};
use crate::dispatch::Backend;
use slog::{Logger, info, o, warn};
use slog_error_chain::InlineErrorChain;
use std::cell::OnceCell;
use thiserror::Error;

/// Something that can hand out the platform's PSU interfaces.
pub trait PlatformSource {
    /// Human-readable description, for logs.
    fn name(&self) -> String;

    fn load_chassis(
        &self,
        log: &Logger,
    ) -> Result<Box<dyn Chassis>, BackendError>;

    fn load_psuutil(
        &self,
        log: &Logger,
    ) -> Result<Box<dyn PsuUtil>, BackendError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Also load the psuutil when the chassis loads, so that attributes the
    /// chassis does not implement can still be answered.
    pub legacy_fallback: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "unable to load platform module from {source_name} \
         (chassis: {chassis}; psuutil: {psuutil})"
    )]
    NoBackend { source_name: String, chassis: String, psuutil: String },
}

/// Resolves a [`Backend`] from a [`PlatformSource`] at most once.
///
/// The chassis is tried first, then the psuutil. The outcome, success or
/// failure, is remembered: later calls to [`Resolver::resolve`] neither
/// reload nor retry.
pub struct Resolver {
    log: Logger,
    source: Box<dyn PlatformSource>,
    options: ResolveOptions,
    resolved: OnceCell<Result<Backend, ResolveError>>,
}

impl Resolver {
    pub fn new(
        log: &Logger,
        source: Box<dyn PlatformSource>,
        options: ResolveOptions,
    ) -> Resolver {
        Resolver {
            log: log.new(o!("component" => "PsuResolver")),
            source,
            options,
            resolved: OnceCell::new(),
        }
    }

    pub fn resolve(&self) -> Result<&Backend, ResolveError> {
        self.resolved.get_or_init(|| self.load()).as_ref().map_err(Clone::clone)
    }

    fn load(&self) -> Result<Backend, ResolveError> {
        let log = &self.log;
        let source_name = self.source.name();

        let chassis = match self.source.load_chassis(log) {
            Ok(chassis) => Ok(chassis),
            Err(err) => {
                warn!(
                    log, "failed to load chassis";
                    "source" => &source_name,
                    InlineErrorChain::new(&err),
                );
                Err(err)
            }
        };

        let chassis = match chassis {
            Ok(chassis) if !self.options.legacy_fallback => {
                info!(log, "using chassis"; "source" => &source_name);
                return Ok(Backend::chassis(log, chassis));
            }
            other => other,
        };

        let psuutil = match self.source.load_psuutil(log) {
            Ok(psuutil) => Ok(psuutil),
            Err(err) => {
                warn!(
                    log, "failed to load psuutil";
                    "source" => &source_name,
                    InlineErrorChain::new(&err),
                );
                Err(err)
            }
        };

        match (chassis, psuutil) {
            (Ok(chassis), Ok(psuutil)) => {
                info!(
                    log, "using chassis with psuutil fallback";
                    "source" => &source_name,
                );
                Ok(Backend::with_fallback(log, chassis, psuutil))
            }
            (Ok(chassis), Err(_)) => {
                info!(
                    log, "using chassis without psuutil fallback";
                    "source" => &source_name,
                );
                Ok(Backend::chassis(log, chassis))
            }
            (Err(_), Ok(psuutil)) => {
                info!(log, "using psuutil"; "source" => &source_name);
                Ok(Backend::psuutil(log, psuutil))
            }
            (Err(chassis_err), Err(psuutil_err)) => {
                Err(ResolveError::NoBackend {
                    source_name,
                    chassis: InlineErrorChain::new(&chassis_err).to_string(),
                    psuutil: InlineErrorChain::new(&psuutil_err).to_string(),
                })
            }
        }
    }
}
