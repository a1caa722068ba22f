/* Copyright (C) 2017 by Jacob Alexander
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

// ----- Crates -----

#[macro_use]
extern crate log;

// ----- Modules -----

pub mod action;
pub mod config;
pub mod error;
pub mod lcd;
pub mod logging;
pub mod macro_engine;
pub mod report;
pub mod sink;
pub mod supervisor;
pub mod usb;
pub mod worker;

pub mod built_info {
    // This file is generated at build time using build.rs
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// ----- Globals -----

use lazy_static::lazy_static;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

lazy_static! {
    /// Process-wide keep-running flag. Cleared by the signal handler;
    /// observed by the Supervisor and every Device Worker on each poll
    /// iteration.
    pub static ref RUNNING: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
}

/// USB identity of the G13.
pub const VENDOR_ID: u16 = 0x046d;
pub const PRODUCT_ID: u16 = 0xc21c;
