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

/// Per-device worker.
///
/// One Worker owns exactly one physical G13: its USB handle, its
/// bindings/profile state, its LCD framebuffer and FIFO, and the 40
/// Actions bound to its keys. It runs entirely on its own thread and
/// never touches another device's state.
use crate::action::Action;
use crate::config::{ConfigStore, NUM_KEYS, NUM_PROFILES};
use crate::error::Error;
use crate::lcd::{Fifo, Framebuffer};
use crate::report::{self, DecodedReport, StickMode};
use crate::sink::EventSink;
use crate::usb::UsbDevice;
use crate::RUNNING;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Opening,
    Initialized,
    Polling,
    Disconnected,
    Stopping,
}

pub struct DeviceWorker {
    key: u16,
    sink: Arc<dyn EventSink>,
    config: ConfigStore,
    profile: u8,
    actions: Vec<Action>,
    previous_keys: [bool; NUM_KEYS],
    stick_mode: StickMode,
    fb: Framebuffer,
    fifo: Option<Fifo>,
    pub state: WorkerState,
}

impl DeviceWorker {
    pub fn new(key: u16, sink: Arc<dyn EventSink>) -> DeviceWorker {
        DeviceWorker {
            key,
            sink,
            config: ConfigStore::new(),
            profile: 0,
            actions: (0..NUM_KEYS).map(|_| Action::NoOp).collect(),
            previous_keys: [false; NUM_KEYS],
            stick_mode: StickMode::Keys,
            fb: Framebuffer::new(),
            fifo: None,
            state: WorkerState::Opening,
        }
    }

    fn load_profile(&mut self, profile: u8, usb: &UsbDevice) {
        match self.config.load_bindings(profile) {
            Ok(parsed) => {
                // Only overwrite slots the file actually assigned; a key
                // bound to a macro whose file went missing keeps whatever
                // Action it already had.
                for (i, slot) in parsed.actions.into_iter().enumerate() {
                    if let Some(action) = slot {
                        self.actions[i] = action;
                    }
                }
                self.profile = profile;
                if let Some((r, g, b)) = parsed.color {
                    if let Err(e) = usb.set_backlight_color(r, g, b) {
                        warn!("[{:04x}] failed to set backlight color: {}", self.key, e);
                    }
                }
                info!("[{:04x}] loaded profile {}", self.key, profile);
            }
            Err(e) => {
                warn!("[{:04x}] failed to load profile {}: {}", self.key, profile, e);
            }
        }
    }

    /// Dispatches non-profile key transitions to their bound Actions.
    /// Profile keys (M1-MR) are handled separately by
    /// `handle_profile_keys`, which runs first and already records
    /// their transitions in `previous_keys`, so they are skipped here.
    fn dispatch(&mut self, decoded: &DecodedReport) {
        for key_index in 0..NUM_KEYS {
            if report::is_profile_key(key_index) {
                continue;
            }
            let pressed = decoded.keys[key_index];
            if pressed == self.previous_keys[key_index] {
                continue;
            }
            self.previous_keys[key_index] = pressed;
            self.actions[key_index].set(pressed, &self.sink);
        }
    }

    fn switch_profile(&mut self, profile: u8, usb: &UsbDevice) {
        if profile != self.profile && profile < NUM_PROFILES {
            self.load_profile(profile, usb);
        }
    }

    /// Runs until the device disconnects, a fatal error occurs, or the
    /// process is asked to shut down. Consumes no thread beyond its own.
    pub fn run(&mut self, device: &rusb::Device<rusb::Context>) {
        self.state = WorkerState::Opening;
        let usb = match UsbDevice::open(device) {
            Ok(usb) => usb,
            Err(e) => {
                warn!("[{:04x}] failed to open device: {}", self.key, e);
                self.state = WorkerState::Disconnected;
                return;
            }
        };

        let _ = usb.wake_lcd();
        self.load_profile(0, &usb);

        match Fifo::create(self.config.fifo_path()) {
            Ok(fifo) => self.fifo = Some(fifo),
            Err(e) => warn!("[{:04x}] failed to create LCD FIFO: {}", self.key, e),
        }

        self.state = WorkerState::Initialized;
        self.state = WorkerState::Polling;

        loop {
            if !RUNNING.load(Ordering::SeqCst) {
                self.state = WorkerState::Stopping;
                break;
            }

            if self.config.poll_for_update(self.profile) {
                self.load_profile(self.profile, &usb);
            }

            if let Some(fifo) = &mut self.fifo {
                if let Some(text) = fifo.poll_text() {
                    Fifo::render_into(&mut self.fb, &text);
                    if let Err(e) = usb.write_lcd(&self.fb.to_payload()) {
                        warn!("[{:04x}] failed to write LCD: {}", self.key, e);
                    }
                }
            }

            let mut raw = [0u8; 8];
            match usb.read_report(&mut raw) {
                Ok(_) => {
                    let decoded = report::decode(&raw, self.stick_mode);
                    self.handle_profile_keys(&decoded, &usb);
                    self.dispatch(&decoded);
                }
                Err(Error::DeviceRemoved) => {
                    info!("[{:04x}] device removed", self.key);
                    self.state = WorkerState::Disconnected;
                    break;
                }
                Err(_) => {
                    // Timeouts are the steady state between key presses.
                    continue;
                }
            }
        }
    }

    fn handle_profile_keys(&mut self, decoded: &DecodedReport, usb: &UsbDevice) {
        for key_index in [report::M1, report::M2, report::M3, report::MR] {
            let pressed = decoded.keys[key_index];
            if pressed && !self.previous_keys[key_index] {
                let next = match key_index {
                    report::M1 => 0,
                    report::M2 => 1,
                    report::M3 => 2,
                    report::MR => 3,
                    _ => unreachable!(),
                };
                self.switch_profile(next, usb);
            }
            self.previous_keys[key_index] = pressed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::EventSink;
    use std::sync::Mutex;

    struct NullSink;
    impl EventSink for NullSink {
        fn emit_key(&self, _scancode: u8, _pressed: bool) {}
    }

    #[test]
    fn new_worker_starts_in_opening_state() {
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        let worker = DeviceWorker::new(0x0301, sink);
        assert_eq!(worker.state, WorkerState::Opening);
        assert_eq!(worker.actions.len(), NUM_KEYS);
    }

    #[test]
    fn dispatch_only_fires_on_transitions() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        struct Recording(Arc<Mutex<Vec<(u8, bool)>>>);
        impl EventSink for Recording {
            fn emit_key(&self, scancode: u8, pressed: bool) {
                self.0.lock().unwrap().push((scancode, pressed));
            }
        }
        let sink: Arc<dyn EventSink> = Arc::new(Recording(recorded.clone()));
        let mut worker = DeviceWorker::new(0x0301, sink);
        worker.actions[0] = Action::PassThrough { scancode: 10 };

        let mut keys = [false; NUM_KEYS];
        keys[0] = true;
        let decoded = DecodedReport {
            stick_x: 128,
            stick_y: 128,
            keys,
        };
        worker.dispatch(&decoded);
        worker.dispatch(&decoded); // no change, should not re-fire
        assert_eq!(*recorded.lock().unwrap(), vec![(10, true)]);
    }
}
