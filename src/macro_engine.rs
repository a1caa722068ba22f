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

/// Macro scripting and playback.
///
/// A macro script is a comma-separated list of steps: `kd.N` (key down),
/// `ku.N` (key up), `d.N` (delay N milliseconds). Playback runs on a
/// dedicated background thread owned by the Action that triggered it, so
/// it can be cooperatively stopped without touching other Actions.
use crate::sink::EventSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    /// Runs once per key-down, ignores key-up.
    Once,
    /// Runs for as long as the key is held, stops on key-up.
    WhileHeld,
    /// Runs a fixed number of passes per key-down, ignores key-up.
    FixedCount(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroStep {
    KeyDown(u8),
    KeyUp(u8),
    Delay(u64),
}

/// Parses a `kd.N,d.50,ku.N` style script. Unrecognized or malformed
/// tokens are skipped, matching the tolerant-parser behavior of bindings
/// files in general.
pub fn parse_script(script: &str) -> Vec<MacroStep> {
    let mut steps = Vec::new();
    for token in script.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let step = if let Some(n) = token.strip_prefix("kd.") {
            n.parse::<u16>().ok().filter(|v| *v <= 255).map(|v| MacroStep::KeyDown(v as u8))
        } else if let Some(n) = token.strip_prefix("ku.") {
            n.parse::<u16>().ok().filter(|v| *v <= 255).map(|v| MacroStep::KeyUp(v as u8))
        } else if let Some(n) = token.strip_prefix("d.") {
            n.parse::<u64>().ok().map(MacroStep::Delay)
        } else {
            None
        };
        if let Some(step) = step {
            steps.push(step);
        }
    }
    steps
}

fn run_once(steps: &[MacroStep], sink: &Arc<dyn EventSink>, stop: &Arc<AtomicBool>) {
    for step in steps {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match *step {
            MacroStep::KeyDown(code) => sink.emit_key(code, true),
            MacroStep::KeyUp(code) => sink.emit_key(code, false),
            MacroStep::Delay(ms) => std::thread::sleep(Duration::from_millis(ms)),
        }
    }
}

/// Owns the background thread for a single running macro playback.
pub struct MacroRunner {
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MacroRunner {
    /// Spawns the playback thread. `label` is used only for the thread
    /// name, to make `ps`/`top` output legible.
    pub fn start(
        label: String,
        steps: Arc<Vec<MacroStep>>,
        repeat_mode: RepeatMode,
        sink: Arc<dyn EventSink>,
    ) -> MacroRunner {
        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread_done = done.clone();
        let handle = std::thread::Builder::new()
            .name(label)
            .spawn(move || {
                match repeat_mode {
                    RepeatMode::Once => run_once(&steps, &sink, &thread_stop),
                    RepeatMode::FixedCount(n) => {
                        for _ in 0..n {
                            if thread_stop.load(Ordering::SeqCst) {
                                break;
                            }
                            run_once(&steps, &sink, &thread_stop);
                        }
                    }
                    RepeatMode::WhileHeld => {
                        while !thread_stop.load(Ordering::SeqCst) {
                            run_once(&steps, &sink, &thread_stop);
                        }
                    }
                }
                thread_done.store(true, Ordering::SeqCst);
            })
            .expect("failed to spawn macro playback thread");

        MacroRunner {
            stop,
            done,
            handle: Some(handle),
        }
    }

    /// Returns true once the background thread has exited on its own
    /// (Once/FixedCount macros run to completion without being stopped).
    pub fn finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Signals the playback thread to stop and joins it. Idempotent.
    pub fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MacroRunner {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<(u8, bool)>>,
    }

    impl EventSink for RecordingSink {
        fn emit_key(&self, scancode: u8, pressed: bool) {
            self.events.lock().unwrap().push((scancode, pressed));
        }
    }

    #[test]
    fn parses_mixed_script() {
        let steps = parse_script("kd.30,d.5,ku.30,bogus,kd.999");
        assert_eq!(
            steps,
            vec![
                MacroStep::KeyDown(30),
                MacroStep::Delay(5),
                MacroStep::KeyUp(30),
            ]
        );
    }

    #[test]
    fn once_runs_all_steps_exactly_once() {
        let concrete = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let sink: Arc<dyn EventSink> = concrete.clone();
        let steps = Arc::new(parse_script("kd.5,ku.5"));
        let mut runner =
            MacroRunner::start("test-once".to_string(), steps, RepeatMode::Once, sink);
        runner.stop_and_join();
        assert_eq!(*concrete.events.lock().unwrap(), vec![(5, true), (5, false)]);
    }

    #[test]
    fn while_held_stops_promptly() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let steps = Arc::new(parse_script("kd.1,d.10,ku.1"));
        let mut runner =
            MacroRunner::start("test-held".to_string(), steps, RepeatMode::WhileHeld, sink);
        std::thread::sleep(Duration::from_millis(25));
        runner.stop_and_join();
        assert!(runner.finished());
    }
}
