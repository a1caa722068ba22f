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

/// Hot-plug supervisor.
///
/// Polls the USB bus roughly once a second for G13s, spawning a Device
/// Worker thread for each newly-seen `(bus, address)` pair and reaping
/// threads for devices that have disconnected.
use crate::error::Result;
use crate::sink::EventSink;
use crate::usb;
use crate::worker::DeviceWorker;
use crate::RUNNING;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const ENUMERATE_DELAY: Duration = Duration::from_millis(1000);

/// A spawned worker thread plus a flag it sets just before returning.
/// Lets `scan()` notice a finished thread without `JoinHandle::is_finished`,
/// which is not available on this crate's minimum supported rustc.
struct WorkerHandle {
    done: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the Virtual Input Sink and the USB context, in that order:
/// fields drop in declaration order, so a Supervisor dropped without an
/// explicit `shutdown()` still tears down the Sink before the USB
/// context. `run()` itself calls `shutdown()` on the way out, since the
/// Sink is shared (cloned into every worker thread) and dropping this
/// struct alone would not otherwise guarantee the kernel endpoint is
/// released before the context goes away.
pub struct Supervisor {
    sink: Arc<dyn EventSink>,
    ctx: rusb::Context,
    workers: Arc<Mutex<HashMap<u16, WorkerHandle>>>,
}

impl Supervisor {
    pub fn new(sink: Arc<dyn EventSink>) -> Result<Supervisor> {
        let ctx = rusb::Context::new()?;
        Ok(Supervisor {
            sink,
            ctx,
            workers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Runs the discovery loop until `RUNNING` is cleared, then waits
    /// for every still-running worker thread to exit and destroys the
    /// Virtual Input Sink before returning.
    pub fn run(&self) {
        info!("g13 supervisor starting discovery loop");
        while RUNNING.load(Ordering::SeqCst) {
            self.scan();
            std::thread::sleep(ENUMERATE_DELAY);
        }
        self.join_all();
        self.sink.destroy();
        info!("g13 supervisor stopped");
    }

    fn scan(&self) {
        let devices = match usb::enumerate(&self.ctx) {
            Ok(devices) => devices,
            Err(e) => {
                warn!("USB enumeration failed: {}", e);
                return;
            }
        };

        let mut workers = self.workers.lock().unwrap();
        let current_keys: std::collections::HashSet<u16> =
            devices.iter().map(usb::device_key).collect();

        // Drop and join workers for keys no longer on the bus. The
        // worker thread has already exited (its own read loop sees the
        // disconnect first), so this join does not block meaningfully.
        let stale: Vec<u16> = workers
            .keys()
            .filter(|k| !current_keys.contains(k))
            .copied()
            .collect();
        for key in stale {
            if let Some(worker) = workers.remove(&key) {
                debug!("reaping worker {:04x}", key);
                let _ = worker.handle.join();
            }
        }

        // A key can also go stale while still present in this scan: the
        // same (bus, address) pair reused by a fresh plug within one
        // ~1s window. Reap any worker whose thread has already finished
        // before the spawn loop below checks `contains_key`, so the
        // reconnect gets a new Worker instead of being silently ignored.
        let finished: Vec<u16> = workers
            .iter()
            .filter(|(_, w)| w.done.load(Ordering::SeqCst))
            .map(|(k, _)| *k)
            .collect();
        for key in finished {
            if let Some(worker) = workers.remove(&key) {
                debug!("reaping finished worker {:04x} (reconnect)", key);
                let _ = worker.handle.join();
            }
        }

        for device in devices {
            let key = usb::device_key(&device);
            if workers.contains_key(&key) {
                continue;
            }
            info!("new G13 detected, key={:04x}", key);
            let sink = self.sink.clone();
            let done = Arc::new(AtomicBool::new(false));
            let done_flag = done.clone();
            let handle = std::thread::Builder::new()
                .name(format!("g13-worker-{:04x}", key))
                .spawn(move || {
                    let mut worker = DeviceWorker::new(key, sink);
                    worker.run(&device);
                    done_flag.store(true, Ordering::SeqCst);
                })
                .expect("failed to spawn device worker thread");
            workers.insert(key, WorkerHandle { done, handle });
        }
    }

    fn join_all(&self) {
        let handles: Vec<(u16, WorkerHandle)> =
            self.workers.lock().unwrap().drain().collect();
        for (key, worker) in handles {
            debug!("joining worker {:04x}", key);
            let _ = worker.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::EventSink;

    struct NullSink;
    impl EventSink for NullSink {
        fn emit_key(&self, _scancode: u8, _pressed: bool) {}
    }

    #[test]
    #[ignore] // requires a libusb context; not available in CI sandboxes.
    fn creates_without_error_when_libusb_is_available() {
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        assert!(Supervisor::new(sink).is_ok());
    }
}
