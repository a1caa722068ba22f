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

/// Raw USB transport to a single G13.
///
/// `hidapi` (used elsewhere in this crate's ancestry) cannot issue the
/// class-specific control transfers the LCD and backlight need, so this
/// talks to the device directly through `rusb`.
use crate::error::{Error, Result};
use rusb::UsbContext;
use std::time::Duration;

const INTERFACE: u8 = 0;
const ENDPOINT_IN: u8 = 0x81;
const ENDPOINT_OUT: u8 = 0x02;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

// HID SET_REPORT, report type "feature" (0x03) in wValue's high byte;
// class request to the interface.
const LCD_REQUEST_TYPE: u8 = 0x21;
const LCD_REQUEST: u8 = 0x09;
const LCD_WAKE_VALUE: u16 = 0x0300;
const BACKLIGHT_VALUE: u16 = 0x0307;

/// (bus_number << 8) | device_address, used as the hot-plug identity
/// key since the G13 exposes no serial number.
pub fn device_key(device: &rusb::Device<rusb::Context>) -> u16 {
    ((device.bus_number() as u16) << 8) | device.address() as u16
}

pub fn matches_g13(device: &rusb::Device<rusb::Context>) -> bool {
    match device.device_descriptor() {
        Ok(desc) => {
            desc.vendor_id() == crate::VENDOR_ID && desc.product_id() == crate::PRODUCT_ID
        }
        Err(_) => false,
    }
}

pub struct UsbDevice {
    handle: rusb::DeviceHandle<rusb::Context>,
    detached_kernel_driver: bool,
}

impl UsbDevice {
    pub fn open(device: &rusb::Device<rusb::Context>) -> Result<UsbDevice> {
        let mut handle = device.open()?;

        let detached_kernel_driver = match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                handle.detach_kernel_driver(INTERFACE)?;
                true
            }
            _ => false,
        };

        handle.claim_interface(INTERFACE)?;

        Ok(UsbDevice {
            handle,
            detached_kernel_driver,
        })
    }

    /// Blocking interrupt read of one 8-byte input report. `-4`
    /// (rusb::Error::NoDevice) surfaces a surprise disconnect.
    pub fn read_report(&self, buf: &mut [u8; 8]) -> Result<usize> {
        self.handle
            .read_interrupt(ENDPOINT_IN, buf, READ_TIMEOUT)
            .map_err(Error::from)
    }

    pub fn write_lcd(&self, payload: &[u8]) -> Result<usize> {
        self.handle
            .write_interrupt(ENDPOINT_OUT, payload, WRITE_TIMEOUT)
            .map_err(Error::from)
    }

    pub fn set_backlight_color(&self, r: u8, g: u8, b: u8) -> Result<()> {
        let data = [5, r, g, b, 0];
        self.handle
            .write_control(
                LCD_REQUEST_TYPE,
                LCD_REQUEST,
                BACKLIGHT_VALUE,
                INTERFACE as u16,
                &data,
                WRITE_TIMEOUT,
            )
            .map(|_| ())
            .map_err(Error::from)
    }

    /// Wakes the LCD controller; some G13 units need this once before
    /// the first `write_lcd` after power-on.
    pub fn wake_lcd(&self) -> Result<()> {
        let data = [0x01u8];
        self.handle
            .write_control(
                LCD_REQUEST_TYPE,
                LCD_REQUEST,
                LCD_WAKE_VALUE,
                INTERFACE as u16,
                &data,
                WRITE_TIMEOUT,
            )
            .map(|_| ())
            .map_err(Error::from)
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(INTERFACE);
        if self.detached_kernel_driver {
            let _ = self.handle.attach_kernel_driver(INTERFACE);
        }
    }
}

/// Enumerates all currently attached G13s.
pub fn enumerate(ctx: &rusb::Context) -> Result<Vec<rusb::Device<rusb::Context>>> {
    let devices = ctx.devices().map_err(Error::from)?;
    Ok(devices.iter().filter(matches_g13).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_key_packs_bus_and_address() {
        // Can't construct a rusb::Device without a real context/device,
        // so this exercises only the pure bit-packing formula directly.
        let bus: u16 = 3;
        let addr: u16 = 42;
        assert_eq!((bus << 8) | addr, 0x032A);
    }
}
