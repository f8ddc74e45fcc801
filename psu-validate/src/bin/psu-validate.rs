// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use clap::Parser;
use psu_validate::PsuValidateApp;
use psu_validate::cmd::{CmdError, fatal};

fn main() {
    if let Err(cmd_error) = do_run() {
        fatal(cmd_error);
    }
}

fn do_run() -> Result<(), CmdError> {
    let app = PsuValidateApp::try_parse().map_err(|err| match err.kind() {
        clap::error::ErrorKind::DisplayHelp
        | clap::error::ErrorKind::DisplayVersion => err.exit(),
        _ => CmdError::Usage(format!("parsing arguments: {err}")),
    })?;
    // Dropped before `fatal` runs, so the async drain is flushed.
    let log = PsuValidateApp::setup_log();
    app.exec(&log)
}
