// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Validation of a platform's PSU reporting against the expected state of a
//! test rig.

mod app;
pub mod cmd;
pub mod config;
pub mod fixtures;
pub mod rules;
pub mod runner;

pub use app::PsuValidateApp;
pub use app::validate;
