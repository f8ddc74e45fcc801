// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform backends that read PSU attributes out of a platform directory.
//!
//! The structured chassis lives under `<root>/chassis`:
//!
//! ```text
//! chassis/num_psus
//! chassis/psu0/{presence,powergood,serial,model,voltage,current,power}
//! chassis/psu1/...
//! ```
//!
//! PSU directories are 0-based. An attribute file that does not exist is
//! reported as [`Support::NotImplemented`].
//!
//! The legacy psuutil lives under `<root>/plugins/psuutil`:
//!
//! ```text
//! plugins/psuutil/num_psus
//! plugins/psuutil/psu1_{presence,status,serial,model}
//! plugins/psuutil/psu1_output_{power,current,voltage}
//! ```
//!
//! Here PSU numbers are 1-based and every attribute file must exist.

use crate::api::{
    Attribute, BackendError, Chassis, Psu, PsuUtil, Support,
};
use crate::resolve::PlatformSource;
use camino::{Utf8Path, Utf8PathBuf};
use slog::{Logger, debug};

/// Where SONiC images install the platform directory.
pub const DEFAULT_PLATFORM_ROOT: &str = "/usr/share/sonic/platform";

const CHASSIS_DIR: &str = "chassis";
const PSUUTIL_DIR: &str = "plugins/psuutil";
const NUM_PSUS_FILE: &str = "num_psus";

/// A platform directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct SysfsPlatform {
    root: Utf8PathBuf,
}

impl SysfsPlatform {
    pub fn new(root: impl Into<Utf8PathBuf>) -> SysfsPlatform {
        SysfsPlatform { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl Default for SysfsPlatform {
    fn default() -> Self {
        SysfsPlatform::new(DEFAULT_PLATFORM_ROOT)
    }
}

impl PlatformSource for SysfsPlatform {
    fn name(&self) -> String {
        format!("platform directory {}", self.root)
    }

    fn load_chassis(
        &self,
        log: &Logger,
    ) -> Result<Box<dyn Chassis>, BackendError> {
        let chassis = SysfsChassis::open(&self.root)?;
        debug!(log, "opened chassis directory"; "path" => %chassis.dir);
        Ok(Box::new(chassis))
    }

    fn load_psuutil(
        &self,
        log: &Logger,
    ) -> Result<Box<dyn PsuUtil>, BackendError> {
        let psuutil = SysfsPsuUtil::open(&self.root)?;
        debug!(log, "opened psuutil directory"; "path" => %psuutil.dir);
        Ok(Box::new(psuutil))
    }
}

/// Structured chassis backed by `<root>/chassis`.
#[derive(Debug)]
pub struct SysfsChassis {
    dir: Utf8PathBuf,
}

impl SysfsChassis {
    pub fn open(root: &Utf8Path) -> Result<SysfsChassis, BackendError> {
        let dir = root.join(CHASSIS_DIR);
        require_dir(&dir)?;
        Ok(SysfsChassis { dir })
    }
}

impl Chassis for SysfsChassis {
    fn num_psus(&self) -> Result<Support<usize>, BackendError> {
        read_supported(
            self.dir.join(NUM_PSUS_FILE),
            Attribute::NumPsus,
            parse_count,
        )
    }

    fn psu(&self, index: usize) -> Result<Box<dyn Psu + '_>, BackendError> {
        let dir = self.dir.join(format!("psu{index}"));
        if !dir.is_dir() {
            return Err(BackendError::NoSuchPsu { index });
        }
        Ok(Box::new(SysfsPsu { dir }))
    }
}

struct SysfsPsu {
    dir: Utf8PathBuf,
}

impl Psu for SysfsPsu {
    fn presence(&self) -> Result<Support<bool>, BackendError> {
        read_supported(self.dir.join("presence"), Attribute::Presence, parse_bool)
    }

    fn powergood_status(&self) -> Result<Support<bool>, BackendError> {
        read_supported(self.dir.join("powergood"), Attribute::Status, parse_bool)
    }

    fn serial(&self) -> Result<Support<String>, BackendError> {
        read_supported(self.dir.join("serial"), Attribute::Serial, parse_text)
    }

    fn model(&self) -> Result<Support<String>, BackendError> {
        read_supported(self.dir.join("model"), Attribute::Model, parse_text)
    }

    fn power(&self) -> Result<Support<f64>, BackendError> {
        read_supported(self.dir.join("power"), Attribute::Power, parse_reading)
    }

    fn current(&self) -> Result<Support<f64>, BackendError> {
        read_supported(
            self.dir.join("current"),
            Attribute::Current,
            parse_reading,
        )
    }

    fn voltage(&self) -> Result<Support<f64>, BackendError> {
        read_supported(
            self.dir.join("voltage"),
            Attribute::Voltage,
            parse_reading,
        )
    }
}

/// Legacy psuutil backed by `<root>/plugins/psuutil`.
#[derive(Debug)]
pub struct SysfsPsuUtil {
    dir: Utf8PathBuf,
}

impl SysfsPsuUtil {
    pub fn open(root: &Utf8Path) -> Result<SysfsPsuUtil, BackendError> {
        let dir = root.join(PSUUTIL_DIR);
        require_dir(&dir)?;
        Ok(SysfsPsuUtil { dir })
    }

    fn attribute_path(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Utf8PathBuf, BackendError> {
        if index == 0 {
            return Err(BackendError::InvalidIndex { index });
        }
        Ok(self.dir.join(format!("psu{index}_{name}")))
    }
}

impl PsuUtil for SysfsPsuUtil {
    fn num_psus(&self) -> Result<usize, BackendError> {
        read_required(
            self.dir.join(NUM_PSUS_FILE),
            Attribute::NumPsus,
            parse_count,
        )
    }

    fn psu_presence(&self, index: usize) -> Result<bool, BackendError> {
        read_required(
            self.attribute_path(index, "presence")?,
            Attribute::Presence,
            parse_bool,
        )
    }

    fn psu_status(&self, index: usize) -> Result<bool, BackendError> {
        read_required(
            self.attribute_path(index, "status")?,
            Attribute::Status,
            parse_bool,
        )
    }

    fn serial(&self, index: usize) -> Result<String, BackendError> {
        read_required(
            self.attribute_path(index, "serial")?,
            Attribute::Serial,
            parse_text,
        )
    }

    fn model(&self, index: usize) -> Result<String, BackendError> {
        read_required(
            self.attribute_path(index, "model")?,
            Attribute::Model,
            parse_text,
        )
    }

    fn output_power(&self, index: usize) -> Result<f64, BackendError> {
        read_required(
            self.attribute_path(index, "output_power")?,
            Attribute::Power,
            parse_reading,
        )
    }

    fn output_current(&self, index: usize) -> Result<f64, BackendError> {
        read_required(
            self.attribute_path(index, "output_current")?,
            Attribute::Current,
            parse_reading,
        )
    }

    fn output_voltage(&self, index: usize) -> Result<f64, BackendError> {
        read_required(
            self.attribute_path(index, "output_voltage")?,
            Attribute::Voltage,
            parse_reading,
        )
    }
}

fn require_dir(dir: &Utf8Path) -> Result<(), BackendError> {
    let metadata = std::fs::metadata(dir)
        .map_err(|err| BackendError::Io { path: dir.to_owned(), err })?;
    if !metadata.is_dir() {
        return Err(BackendError::Unavailable {
            reason: format!("\"{dir}\" is not a directory"),
        });
    }
    Ok(())
}

fn read_supported<T>(
    path: Utf8PathBuf,
    attribute: Attribute,
    parse: fn(&str) -> Option<T>,
) -> Result<Support<T>, BackendError> {
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Support::NotImplemented);
        }
        Err(err) => return Err(BackendError::Io { path, err }),
    };
    parse_raw(path, attribute, &raw, parse).map(Support::Implemented)
}

fn read_required<T>(
    path: Utf8PathBuf,
    attribute: Attribute,
    parse: fn(&str) -> Option<T>,
) -> Result<T, BackendError> {
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => return Err(BackendError::Io { path, err }),
    };
    parse_raw(path, attribute, &raw, parse)
}

fn parse_raw<T>(
    path: Utf8PathBuf,
    attribute: Attribute,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, BackendError> {
    let value = raw.trim();
    parse(value).ok_or_else(|| BackendError::Parse {
        path,
        attribute,
        value: value.to_string(),
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_count(value: &str) -> Option<usize> {
    value.parse().ok()
}

fn parse_reading(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_text(value: &str) -> Option<String> {
    Some(value.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use camino_tempfile::Utf8TempDir;

    fn log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn write(root: &Utf8Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
    }

    #[test]
    fn chassis_reads_attribute_files() {
        let root = Utf8TempDir::new().unwrap();
        write(root.path(), "chassis/num_psus", "2\n");
        write(root.path(), "chassis/psu0/presence", "1\n");
        write(root.path(), "chassis/psu0/powergood", "True\n");
        write(root.path(), "chassis/psu0/serial", "  SN0001  \n");
        write(root.path(), "chassis/psu0/model", "R17-1K6P1AA\n");
        write(root.path(), "chassis/psu0/voltage", "12.04\n");
        write(root.path(), "chassis/psu1/presence", "0\n");

        let chassis = SysfsPlatform::new(root.path())
            .load_chassis(&log())
            .unwrap();
        assert_eq!(chassis.num_psus().unwrap(), Support::Implemented(2));

        let psu = chassis.psu(0).unwrap();
        assert_eq!(psu.presence().unwrap(), Support::Implemented(true));
        assert_eq!(psu.powergood_status().unwrap(), Support::Implemented(true));
        assert_eq!(
            psu.serial().unwrap(),
            Support::Implemented("SN0001".to_string())
        );
        assert_eq!(
            psu.model().unwrap(),
            Support::Implemented("R17-1K6P1AA".to_string())
        );
        assert_eq!(psu.voltage().unwrap(), Support::Implemented(12.04));
        assert_eq!(psu.current().unwrap(), Support::NotImplemented);
        assert_eq!(psu.power().unwrap(), Support::NotImplemented);

        let psu = chassis.psu(1).unwrap();
        assert_eq!(psu.presence().unwrap(), Support::Implemented(false));
        assert_eq!(psu.powergood_status().unwrap(), Support::NotImplemented);

        assert_matches!(
            chassis.psu(2).err(),
            Some(BackendError::NoSuchPsu { index: 2 })
        );
    }

    #[test]
    fn chassis_without_count_file_is_not_implemented() {
        let root = Utf8TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("chassis")).unwrap();
        let chassis = SysfsChassis::open(root.path()).unwrap();
        assert_eq!(chassis.num_psus().unwrap(), Support::NotImplemented);
    }

    #[test]
    fn chassis_rejects_garbage() {
        let root = Utf8TempDir::new().unwrap();
        write(root.path(), "chassis/psu0/presence", "maybe\n");
        write(root.path(), "chassis/psu0/power", "NaN\n");
        let chassis = SysfsChassis::open(root.path()).unwrap();
        let psu = chassis.psu(0).unwrap();
        assert_matches!(
            psu.presence(),
            Err(BackendError::Parse { attribute: Attribute::Presence, value, .. })
                if value == "maybe"
        );
        assert_matches!(
            psu.power(),
            Err(BackendError::Parse { attribute: Attribute::Power, .. })
        );
    }

    #[test]
    fn missing_directories_fail_to_load() {
        let root = Utf8TempDir::new().unwrap();
        let platform = SysfsPlatform::new(root.path());
        assert_matches!(
            platform.load_chassis(&log()).err(),
            Some(BackendError::Io { .. })
        );
        assert_matches!(
            platform.load_psuutil(&log()).err(),
            Some(BackendError::Io { .. })
        );

        // A plain file where the directory should be is also unusable.
        write(root.path(), "chassis", "");
        assert_matches!(
            platform.load_chassis(&log()).err(),
            Some(BackendError::Unavailable { .. })
        );
    }

    #[test]
    fn psuutil_reads_one_based_files() {
        let root = Utf8TempDir::new().unwrap();
        write(root.path(), "plugins/psuutil/num_psus", "2");
        write(root.path(), "plugins/psuutil/psu1_presence", "yes");
        write(root.path(), "plugins/psuutil/psu1_status", "no");
        write(root.path(), "plugins/psuutil/psu1_serial", "SN-LEGACY");
        write(root.path(), "plugins/psuutil/psu1_model", "DPS-1600");
        write(root.path(), "plugins/psuutil/psu1_output_power", "310.5");
        write(root.path(), "plugins/psuutil/psu1_output_current", "25.8");
        write(root.path(), "plugins/psuutil/psu1_output_voltage", "12000");

        let psuutil = SysfsPlatform::new(root.path())
            .load_psuutil(&log())
            .unwrap();
        assert_eq!(psuutil.num_psus().unwrap(), 2);
        assert!(psuutil.psu_presence(1).unwrap());
        assert!(!psuutil.psu_status(1).unwrap());
        assert_eq!(psuutil.serial(1).unwrap(), "SN-LEGACY");
        assert_eq!(psuutil.model(1).unwrap(), "DPS-1600");
        assert_eq!(psuutil.output_power(1).unwrap(), 310.5);
        assert_eq!(psuutil.output_current(1).unwrap(), 25.8);
        assert_eq!(psuutil.output_voltage(1).unwrap(), 12000.0);

        assert_matches!(
            psuutil.psu_presence(0),
            Err(BackendError::InvalidIndex { index: 0 })
        );
        // The psuutil has no notion of an unimplemented attribute.
        assert_matches!(psuutil.psu_presence(2), Err(BackendError::Io { .. }));
    }
}
