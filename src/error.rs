/* Copyright (C) 2026 g13d contributors
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

/// Error taxonomy
///
/// Kinds, not type names: every per-device error is local to the Worker
/// that produced it and never propagates past the Supervisor. Only
/// `InitFailure` is fatal to the daemon.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Cannot open the kernel virtual-input endpoint, or libusb context
    /// initialization failed. Fatal: daemon exits with status 1.
    #[error("initialization failure: {0}")]
    InitFailure(String),

    /// USB open/claim rejected for a specific device.
    #[error("device open failure: {0}")]
    DeviceOpenFailure(String),

    /// Interrupt read returned "no device" (surprise removal).
    #[error("device removed")]
    DeviceRemoved,

    /// Interrupt read failed for a reason other than timeout or no-device.
    #[error("transient I/O error: {0}")]
    TransientIoError(String),

    /// Bindings file not present on disk.
    #[error("config file missing: {0}")]
    ConfigMissing(String),

    /// Malformed line or out-of-range number while parsing a config file.
    #[error("config parse error: {0}")]
    ConfigParseError(String),

    /// Referenced macro file is missing.
    #[error("macro missing: {0}")]
    MacroMissing(String),

    /// Cannot create or open the LCD FIFO.
    #[error("FIFO failure: {0}")]
    FifoFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::InitFailure(format!("{}", e)),
            _ => Error::TransientIoError(format!("{}", e)),
        }
    }
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Error {
        match e {
            rusb::Error::NoDevice => Error::DeviceRemoved,
            rusb::Error::Timeout => Error::TransientIoError("timeout".to_string()),
            rusb::Error::Access => Error::DeviceOpenFailure(format!("{}", e)),
            _ => Error::TransientIoError(format!("{}", e)),
        }
    }
}
