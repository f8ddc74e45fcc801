// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to the power supplies of a switch platform.
//!
//! A platform exposes its PSUs through one of two interfaces:
//!
//! * the structured [`Chassis`] API, which hands out per-PSU [`Psu`] objects
//!   using 0-based indices and may report individual attributes as
//!   [`Support::NotImplemented`], and
//! * the legacy flat [`PsuUtil`] API, which takes 1-based indices.
//!
//! A [`Resolver`] picks whichever of the two a [`PlatformSource`] can provide
//! (preferring the chassis) and produces a [`Backend`]. Callers query the
//! `Backend` with 0-based indices and never need to know which API answered.

mod api;
mod dispatch;
mod resolve;
pub mod sim;
pub mod sysfs;

pub use api::*;
pub use dispatch::Backend;
pub use dispatch::BackendKind;
pub use dispatch::DispatchError;
pub use resolve::PlatformSource;
pub use resolve::ResolveError;
pub use resolve::ResolveOptions;
pub use resolve::Resolver;
