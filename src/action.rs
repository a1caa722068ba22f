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

/// The Action bound to a single G-key.
///
/// Each of the 40 keys on the pad owns exactly one Action at a time. A
/// Worker calls `set()` on every bit transition it decodes from an input
/// report; the Action is responsible for emitting into the shared sink
/// and, for macros, for owning the background thread that plays it back.
pub use crate::macro_engine::{parse_script, MacroRunner, MacroStep, RepeatMode};
use crate::sink::EventSink;
use std::sync::Arc;

pub enum Action {
    NoOp,
    PassThrough {
        scancode: u8,
    },
    Macro {
        script: Arc<Vec<MacroStep>>,
        repeat_mode: RepeatMode,
        label: String,
        runner: Option<MacroRunner>,
    },
}

impl Action {
    pub fn macro_from_script(script: &str, repeat_mode: RepeatMode) -> Action {
        Action::Macro {
            script: Arc::new(parse_script(script)),
            repeat_mode,
            label: "g13-macro".to_string(),
            runner: None,
        }
    }

    /// Applies a key transition. Returns true if the Action produced a
    /// visible effect (used by the Worker only for logging).
    pub fn set(&mut self, pressed: bool, sink: &Arc<dyn EventSink>) -> bool {
        match self {
            Action::NoOp => false,
            Action::PassThrough { scancode } => {
                sink.emit_key(*scancode, pressed);
                true
            }
            Action::Macro {
                script,
                repeat_mode,
                label,
                runner,
            } => {
                match repeat_mode {
                    RepeatMode::WhileHeld => {
                        if pressed {
                            if runner.is_none() {
                                *runner = Some(MacroRunner::start(
                                    label.clone(),
                                    script.clone(),
                                    *repeat_mode,
                                    sink.clone(),
                                ));
                            }
                        } else if let Some(mut r) = runner.take() {
                            r.stop_and_join();
                        }
                    }
                    RepeatMode::Once | RepeatMode::FixedCount(_) => {
                        if pressed {
                            // Reap a finished previous run before deciding
                            // whether this press starts or stops one.
                            if matches!(runner, Some(r) if r.finished()) {
                                *runner = None;
                            }
                            if let Some(mut r) = runner.take() {
                                // Already running: this press is a stop toggle.
                                r.stop_and_join();
                            } else {
                                *runner = Some(MacroRunner::start(
                                    label.clone(),
                                    script.clone(),
                                    *repeat_mode,
                                    sink.clone(),
                                ));
                            }
                        }
                    }
                }
                true
            }
        }
    }

    /// Assigns a thread-name label, used only for diagnostics.
    pub fn with_label(mut self, label: String) -> Action {
        if let Action::Macro { label: l, .. } = &mut self {
            *l = label;
        }
        self
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Action) -> bool {
        match (self, other) {
            (Action::NoOp, Action::NoOp) => true,
            (Action::PassThrough { scancode: a }, Action::PassThrough { scancode: b }) => a == b,
            (Action::Macro { script: a, repeat_mode: m1, .. }, Action::Macro { script: b, repeat_mode: m2, .. }) => {
                a == b && m1 == m2
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::NoOp => write!(f, "NoOp"),
            Action::PassThrough { scancode } => write!(f, "PassThrough({})", scancode),
            Action::Macro { repeat_mode, .. } => write!(f, "Macro({:?})", repeat_mode),
        }
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
    fn noop_never_touches_sink() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let mut action = Action::NoOp;
        assert!(!action.set(true, &sink));
    }

    #[test]
    fn passthrough_emits_matching_key() {
        let concrete = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let sink: Arc<dyn EventSink> = concrete.clone();
        let mut action = Action::PassThrough { scancode: 42 };
        action.set(true, &sink);
        action.set(false, &sink);
        assert_eq!(
            *concrete.events.lock().unwrap(),
            vec![(42, true), (42, false)]
        );
    }

    #[test]
    fn while_held_macro_starts_and_stops_with_key() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let mut action = Action::macro_from_script("kd.1,d.5,ku.1", RepeatMode::WhileHeld);
        action.set(true, &sink);
        std::thread::sleep(std::time::Duration::from_millis(20));
        action.set(false, &sink);
        if let Action::Macro { runner, .. } = &action {
            assert!(runner.is_none());
        }
    }

    #[test]
    fn once_macro_ignores_key_up() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let mut action = Action::macro_from_script("kd.1,ku.1", RepeatMode::Once);
        action.set(true, &sink);
        action.set(false, &sink);
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    #[test]
    fn second_press_stops_a_still_running_fixed_count_macro() {
        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        });
        let mut action =
            Action::macro_from_script("kd.1,d.100,ku.1", RepeatMode::FixedCount(1000));
        action.set(true, &sink);
        std::thread::sleep(std::time::Duration::from_millis(10));
        action.set(true, &sink); // second press while still running: stop toggle
        if let Action::Macro { runner, .. } = &action {
            assert!(runner.is_none());
        } else {
            panic!("expected Macro action");
        }
    }

    #[test]
    fn equality_ignores_runtime_state() {
        let a = Action::PassThrough { scancode: 7 };
        let b = Action::PassThrough { scancode: 7 };
        assert_eq!(a, b);
        assert_ne!(a, Action::NoOp);
    }
}
