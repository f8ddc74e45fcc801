// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration of a validation run
//!
//! ```toml
//! [platform]
//! type = "simulated"
//! config = "sim.toml"
//!
//! [fixtures]
//! platform_config = "platform.json"
//! test_config = "test.json"
//!
//! [checks]
//! presence_bound = "exclude_last"
//! legacy_fallback = false
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file.

use crate::rules::PresenceBound;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use psu_platform::PlatformSource;
use psu_platform::sim::{self, SimConfig, SimPlatform};
use psu_platform::sysfs::{DEFAULT_PLATFORM_ROOT, SysfsPlatform};
use serde::{Deserialize, Serialize};
use slog_error_chain::SlogInlineError;
use thiserror::Error;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where the PSU interfaces come from.
    #[serde(default)]
    pub platform: PlatformSourceConfig,
    #[serde(default)]
    pub fixtures: FixtureConfig,
    #[serde(default)]
    pub checks: CheckConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformSourceConfig {
    /// A real platform directory.
    Sysfs {
        #[serde(default = "default_platform_root")]
        root: Utf8PathBuf,
    },
    /// A simulated platform described by a TOML file.
    Simulated { config: Utf8PathBuf },
}

fn default_platform_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_PLATFORM_ROOT)
}

impl Default for PlatformSourceConfig {
    fn default() -> Self {
        PlatformSourceConfig::Sysfs { root: default_platform_root() }
    }
}

impl PlatformSourceConfig {
    pub fn build(&self) -> Result<Box<dyn PlatformSource>, sim::LoadError> {
        match self {
            PlatformSourceConfig::Sysfs { root } => {
                Ok(Box::new(SysfsPlatform::new(root.clone())))
            }
            PlatformSourceConfig::Simulated { config } => {
                let config = SimConfig::from_file(config)?;
                Ok(Box::new(SimPlatform::new(config)))
            }
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureConfig {
    /// Platform capability document (JSON).
    pub platform_config: Option<Utf8PathBuf>,
    /// Expected state of the rig (JSON).
    pub test_config: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    #[serde(default)]
    pub presence_bound: PresenceBound,
    /// Answer attributes the chassis does not implement from the psuutil.
    #[serde(default)]
    pub legacy_fallback: bool,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let mut config: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Utf8Path) {
        let resolve = |path: &mut Utf8PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        match &mut self.platform {
            PlatformSourceConfig::Sysfs { root } => resolve(root),
            PlatformSourceConfig::Simulated { config } => resolve(config),
        }
        if let Some(path) = &mut self.fixtures.platform_config {
            resolve(path);
        }
        if let Some(path) = &mut self.fixtures.test_config {
            resolve(path);
        }
    }
}

#[derive(Debug, Error, SlogInlineError)]
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

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.platform,
            PlatformSourceConfig::Sysfs { root: DEFAULT_PLATFORM_ROOT.into() }
        );
        assert_eq!(config.checks.presence_bound, PresenceBound::ExcludeLast);
        assert!(!config.checks.legacy_fallback);
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("psu-validate.toml");
        std::fs::write(
            &path,
            r#"
            [platform]
            type = "simulated"
            config = "rig/sim.toml"

            [fixtures]
            platform_config = "/etc/sonic/platform.json"
            test_config = "test.json"

            [checks]
            presence_bound = "include_last"
            legacy_fallback = true
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config.platform,
            PlatformSourceConfig::Simulated {
                config: dir.path().join("rig/sim.toml")
            }
        );
        assert_eq!(
            config.fixtures.platform_config.as_deref(),
            Some(Utf8Path::new("/etc/sonic/platform.json"))
        );
        assert_eq!(
            config.fixtures.test_config,
            Some(dir.path().join("test.json"))
        );
        assert_eq!(config.checks.presence_bound, PresenceBound::IncludeLast);
        assert!(config.checks.legacy_fallback);
    }

    #[test]
    fn load_errors() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("psu-validate.toml");
        assert_matches!(Config::from_file(&path), Err(LoadError::Io { .. }));

        std::fs::write(&path, "[platform]\ntype = \"teleport\"\n").unwrap();
        assert_matches!(Config::from_file(&path), Err(LoadError::Parse { .. }));

        std::fs::write(&path, "[checks]\npresence_bound = \"all\"\n").unwrap();
        assert_matches!(Config::from_file(&path), Err(LoadError::Parse { .. }));
    }

    #[test]
    fn build_simulated_source() {
        let dir = Utf8TempDir::new().unwrap();
        let sim_path = dir.path().join("sim.toml");
        let platform = PlatformSourceConfig::Simulated { config: sim_path.clone() };
        assert_matches!(
            platform.build().err(),
            Some(sim::LoadError::Io { .. })
        );

        std::fs::write(&sim_path, "[[psus]]\nserial = \"SN0001\"\n").unwrap();
        let source = platform.build().unwrap();
        assert!(source.name().contains("1 PSUs"));
    }
}
