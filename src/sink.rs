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

/// Virtual Input Sink
///
/// A single shared kernel virtual input device that every Device Worker
/// writes key and joystick events into. Backed by `evdev_rs`'s uinput
/// wrapper, which the rest of this crate already depends on for raw
/// evdev event types and codes.
use crate::error::{Error, Result};
use evdev_rs::enums::{EventCode, EV_ABS, EV_KEY, EV_SYN};
use evdev_rs::{DeviceWrapper, InputEvent, TimeVal, UInputDevice, UninitDevice};
use std::sync::Mutex;

/// Anything a Macro Action or the report decoder can push key/axis
/// events into. Exists so macro playback and tests can run against a
/// recording stub instead of a live kernel device.
pub trait EventSink: Send + Sync {
    fn emit_key(&self, scancode: u8, pressed: bool);
    fn emit_abs(&self, code: AbsAxis, value: i32) {
        let _ = (code, value);
    }
    /// Removes the kernel endpoint and releases the handle. Idempotent;
    /// a no-op for sinks (test stubs) that have nothing to tear down.
    fn destroy(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsAxis {
    X,
    Y,
}

/// Thin wrapper owning the kernel uinput node. Created once at daemon
/// startup and shared (via `Arc<dyn EventSink>`) by every worker.
///
/// `None` means the endpoint has already been torn down by `destroy()`;
/// events after that point are dropped with a warning rather than
/// panicking, since shutdown order only guarantees workers stop first.
pub struct Sink {
    device: Mutex<Option<UInputDevice>>,
}

fn keycode_for(scancode: u8) -> EventCode {
    EventCode::EV_KEY(ev_key_from_linux_code(scancode))
}

/// evdev_rs's `EV_KEY` enum mirrors `<linux/input-event-codes.h>`
/// one-for-one; `int_to_ev_key` gives us the numeric-to-enum mapping
/// without hand-maintaining a 256-entry match.
fn ev_key_from_linux_code(code: u8) -> EV_KEY {
    evdev_rs::enums::int_to_ev_key(code as u32).unwrap_or(EV_KEY::KEY_RESERVED)
}

impl Sink {
    /// Probes the two canonical uinput device nodes, preferring the
    /// modern path and falling back to the legacy one.
    fn open_uinput_node() -> Result<std::fs::File> {
        use std::fs::OpenOptions;
        for path in &["/dev/input/uinput", "/dev/uinput"] {
            match OpenOptions::new().write(true).read(true).open(path) {
                Ok(f) => return Ok(f),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::InitFailure(format!("{}: {}", path, e))),
            }
        }
        Err(Error::InitFailure(
            "no uinput device node found (tried /dev/input/uinput, /dev/uinput)".to_string(),
        ))
    }

    pub fn create() -> Result<Sink> {
        let file = Self::open_uinput_node()?;

        let uninit = UninitDevice::new()
            .ok_or_else(|| Error::InitFailure("failed to allocate uinput device".to_string()))?;
        uninit.set_name("g13d virtual input");
        uninit.set_bustype(0x03); // BUS_USB
        uninit.set_vendor_id(crate::VENDOR_ID);
        uninit.set_product_id(crate::PRODUCT_ID);

        for code in 0u32..256 {
            let key = evdev_rs::enums::int_to_ev_key(code).unwrap_or(EV_KEY::KEY_RESERVED);
            uninit
                .enable_event_code(&EventCode::EV_KEY(key), None)
                .map_err(|e| Error::InitFailure(format!("{}", e)))?;
        }
        uninit
            .enable_event_code(&EventCode::EV_KEY(EV_KEY::BTN_THUMB), None)
            .map_err(|e| Error::InitFailure(format!("{}", e)))?;

        for axis in &[EV_ABS::ABS_X, EV_ABS::ABS_Y] {
            uninit
                .enable_event_code(
                    &EventCode::EV_ABS(*axis),
                    Some(evdev_rs::AbsInfo {
                        value: 0,
                        minimum: 0,
                        maximum: 255,
                        fuzz: 0,
                        flat: 0,
                        resolution: 0,
                    }),
                )
                .map_err(|e| Error::InitFailure(format!("{}", e)))?;
        }

        let device = UInputDevice::create_from_device(&uninit, file)
            .map_err(|e| Error::InitFailure(format!("{}", e)))?;

        info!("Virtual input sink created");
        Ok(Sink {
            device: Mutex::new(Some(device)),
        })
    }

    fn write(&self, code: EventCode, value: i32) -> std::io::Result<()> {
        let guard = self.device.lock().unwrap();
        let device = match guard.as_ref() {
            Some(device) => device,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "virtual input sink already destroyed",
                ))
            }
        };
        let event = InputEvent::new(&TimeVal::new(0, 0), &code, value);
        device.write_event(&event)?;
        let syn = InputEvent::new(&TimeVal::new(0, 0), &EventCode::EV_SYN(EV_SYN::SYN_REPORT), 0);
        device.write_event(&syn)
    }
}

impl EventSink for Sink {
    fn emit_key(&self, scancode: u8, pressed: bool) {
        if let Err(e) = self.write(keycode_for(scancode), pressed as i32) {
            warn!("Failed to write key event ({}): {}", scancode, e);
        }
    }

    fn emit_abs(&self, axis: AbsAxis, value: i32) {
        let code = match axis {
            AbsAxis::X => EventCode::EV_ABS(EV_ABS::ABS_X),
            AbsAxis::Y => EventCode::EV_ABS(EV_ABS::ABS_Y),
        };
        if let Err(e) = self.write(code, value) {
            warn!("Failed to write abs event ({:?}): {}", axis, e);
        }
    }

    /// Drops the underlying `UInputDevice`, which tears down the kernel
    /// endpoint. Safe to call more than once; only the first call does
    /// anything.
    fn destroy(&self) {
        let mut guard = self.device.lock().unwrap();
        if guard.take().is_some() {
            info!("Virtual input sink destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        events: StdMutex<Vec<(u8, bool)>>,
    }

    impl EventSink for RecordingSink {
        fn emit_key(&self, scancode: u8, pressed: bool) {
            self.events.lock().unwrap().push((scancode, pressed));
        }
    }

    #[test]
    fn recording_sink_records_in_order() {
        let sink = RecordingSink {
            events: StdMutex::new(Vec::new()),
        };
        sink.emit_key(5, true);
        sink.emit_key(5, false);
        assert_eq!(*sink.events.lock().unwrap(), vec![(5, true), (5, false)]);
    }
}
