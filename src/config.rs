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

/// Config Store
///
/// Resolves the XDG configuration directory, parses/writes bindings and
/// macro `.properties` files, and tracks the active bindings file's
/// modification time for live reload.
use crate::action::{Action, RepeatMode};
use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NUM_KEYS: usize = 40;
pub const NUM_PROFILES: u8 = 4;
pub const MAX_MACRO_ID: u16 = 200;

/// Bundled with the repo verbatim from the original driver's defaults.
/// Includes the (deliberately preserved, not "fixed") duplicate
/// assignment of scancode 57 to both G21 and G22, and the reuse of the
/// modifier scancode 1 for G0. See DESIGN.md.
const DEFAULT_BINDINGS: &str = "
# Default G13 Key Bindings
G19=p,k.42
G18=p,k.18
G17=p,k.16
G16=p,k.10
G9=p,k.3
G15=p,k.9
G8=p,k.2
G14=p,k.8
G7=p,k.15
G13=p,k.7
G12=p,k.6
G6=p,k.46
G11=p,k.5
G5=p,k.76
G10=p,k.4
G4=p,k.75
G3=p,k.81
G2=p,k.80
G1=p,k.79
G0=p,k.1
G39=p,k.31
color=0,0,255
G38=p,k.32
G37=p,k.30
G36=p,k.17
G35=p,k.11
G34=p,k.72
G33=p,k.71
G32=p,k.62
G31=p,k.61
G30=p,k.60
G29=p,k.59
G23=p,k.58
G22=p,k.57
G21=p,k.57
G20=p,k.50
";

/// Result of loading and parsing a bindings file.
///
/// `actions[i]` is `None` for any key the file does not assign (or
/// assigns to a macro whose file is missing) — the caller is expected
/// to leave that key's existing Action untouched rather than reset it.
pub struct ParsedBindings {
    pub actions: Vec<Option<Action>>,
    pub color: Option<(u8, u8, u8)>,
}

pub struct ConfigStore {
    config_dir: PathBuf,
    fifo_path: PathBuf,
    /// mtime (seconds since epoch) recorded at the last successful load.
    /// Zero means "never loaded"; poll-for-update never fires against it.
    last_mtime: u64,
}

fn dir_env(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `getpwuid(getuid())`-equivalent fallback for a user's home directory.
fn passwd_home_dir() -> Option<PathBuf> {
    unsafe {
        let uid = libc::getuid();
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        let dir = (*pw).pw_dir;
        if dir.is_null() {
            return None;
        }
        let cstr = std::ffi::CStr::from_ptr(dir);
        Some(PathBuf::from(cstr.to_string_lossy().into_owned()))
    }
}

fn resolve_config_dir() -> PathBuf {
    let base = if let Some(xdg) = dir_env("XDG_CONFIG_HOME") {
        xdg
    } else if let Some(home) = dir_env("HOME") {
        home.join(".config")
    } else if let Some(home) = passwd_home_dir() {
        home.join(".config")
    } else {
        std::env::temp_dir()
    };
    base.join("g13")
}

fn resolve_fifo_path() -> PathBuf {
    if let Some(runtime) = dir_env("XDG_RUNTIME_DIR") {
        runtime.join("g13-lcd")
    } else {
        std::env::temp_dir().join("g13-lcd")
    }
}

fn file_mtime_secs(path: &Path) -> Option<u64> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    mtime.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

impl ConfigStore {
    pub fn new() -> ConfigStore {
        ConfigStore {
            config_dir: resolve_config_dir(),
            fifo_path: resolve_fifo_path(),
            last_mtime: 0,
        }
    }

    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }

    fn ensure_config_dir(&self) -> std::io::Result<()> {
        if !self.config_dir.is_dir() {
            fs::create_dir_all(&self.config_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(&self.config_dir, fs::Permissions::from_mode(0o755));
            }
        }
        Ok(())
    }

    pub fn binding_path(&self, profile: u8) -> PathBuf {
        self.config_dir
            .join(format!("bindings-{}.properties", profile))
    }

    pub fn macro_path(&self, macro_id: u16) -> PathBuf {
        self.config_dir
            .join(format!("macro-{}.properties", macro_id))
    }

    /// Loads the macro file for `macro_id`. Returns `MacroMissing` if it
    /// is absent, per spec: the key at fault keeps its previous Action.
    fn load_macro_sequence(&self, macro_id: u16) -> Result<String> {
        self.ensure_config_dir().ok();
        let path = self.macro_path(macro_id);
        let text = fs::read_to_string(&path)
            .map_err(|_| Error::MacroMissing(format!("{}", path.display())))?;
        let mut sequence = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(eq) = line.find('=') {
                let key = line[..eq].trim();
                let value = line[eq + 1..].trim();
                if key == "sequence" {
                    sequence = value.to_string();
                }
            }
        }
        Ok(sequence)
    }

    fn parse_bindings(&self, text: &str) -> ParsedBindings {
        let mut actions: Vec<Option<Action>> = (0..NUM_KEYS).map(|_| None).collect();
        let mut color = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let eq = match line.find('=') {
                Some(i) => i,
                None => continue,
            };
            let key = line[..eq].trim();
            let value = line[eq + 1..].trim();

            if key == "color" {
                let parts: Vec<&str> = value.split(',').collect();
                if parts.len() == 3 {
                    if let (Ok(r), Ok(g), Ok(b)) = (
                        parts[0].trim().parse::<i32>(),
                        parts[1].trim().parse::<i32>(),
                        parts[2].trim().parse::<i32>(),
                    ) {
                        if (0..=255).contains(&r) && (0..=255).contains(&g) && (0..=255).contains(&b)
                        {
                            color = Some((r as u8, g as u8, b as u8));
                        }
                    }
                }
                continue;
            }

            if let Some(rest) = key.strip_prefix('G') {
                let g_key: usize = match rest.parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                if g_key >= NUM_KEYS {
                    continue;
                }
                let mut fields = value.split(',');
                match fields.next() {
                    Some("p") => {
                        let kt = match fields.next() {
                            Some(s) => s.trim(),
                            None => continue,
                        };
                        let code = match kt.strip_prefix("k.").and_then(|c| c.parse::<u16>().ok())
                        {
                            Some(c) if c <= 255 => c as u8,
                            _ => continue,
                        };
                        actions[g_key] = Some(Action::PassThrough { scancode: code });
                    }
                    Some("m") => {
                        let macro_id: u16 = match fields.next().and_then(|s| s.trim().parse().ok())
                        {
                            Some(id) if id < MAX_MACRO_ID => id,
                            _ => continue,
                        };
                        let repeats: u32 = match fields.next().and_then(|s| s.trim().parse().ok())
                        {
                            Some(r) => r,
                            None => continue,
                        };
                        if let Ok(sequence) = self.load_macro_sequence(macro_id) {
                            let repeat_mode = match repeats {
                                0 => RepeatMode::Once,
                                1 => RepeatMode::WhileHeld,
                                n => RepeatMode::FixedCount(n),
                            };
                            actions[g_key] =
                                Some(Action::macro_from_script(&sequence, repeat_mode));
                        }
                        // MacroMissing: leave this slot as None so the
                        // caller keeps the key's existing Action.
                    }
                    _ => continue,
                }
            }
        }

        ParsedBindings { actions, color }
    }

    fn write_default_bindings(&self, path: &Path) -> std::io::Result<()> {
        let mut f = fs::File::create(path)?;
        f.write_all(DEFAULT_BINDINGS.as_bytes())
    }

    /// Loads bindings for `profile`, writing the built-in defaults first
    /// if the file does not exist. Records the on-disk mtime before
    /// returning, per the invariant that it is always <= the last read.
    pub fn load_bindings(&mut self, profile: u8) -> Result<ParsedBindings> {
        self.ensure_config_dir().ok();
        let path = self.binding_path(profile);

        if !path.exists() {
            warn!("Config file not found: {}. Creating defaults.", path.display());
            self.write_default_bindings(&path)
                .map_err(|e| Error::FifoFailure(format!("{}", e)))?;
        } else {
            debug!("Loading config file: {}", path.display());
        }

        let text = fs::read_to_string(&path)?;
        self.last_mtime = file_mtime_secs(&path).unwrap_or(0);
        Ok(self.parse_bindings(&text))
    }

    /// Returns true iff the bindings file's mtime has strictly increased
    /// since the last successful load, and the last load was not the
    /// very first observation (last_mtime != 0).
    pub fn poll_for_update(&self, profile: u8) -> bool {
        if self.last_mtime == 0 {
            return false;
        }
        let path = self.binding_path(profile);
        match file_mtime_secs(&path) {
            Some(mtime) => mtime > self.last_mtime,
            None => false,
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        ConfigStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_dir(dir: &Path) -> ConfigStore {
        ConfigStore {
            config_dir: dir.to_path_buf(),
            fifo_path: dir.join("fifo"),
            last_mtime: 0,
        }
    }

    #[test]
    fn parses_passthrough_and_color() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_dir(tmp.path());
        let parsed = store.parse_bindings("color=1,2,3\nG1=p,k.30\n# comment\nbogus line\n");
        assert_eq!(parsed.color, Some((1, 2, 3)));
        assert_eq!(parsed.actions[1], Some(Action::PassThrough { scancode: 30 }));
        assert_eq!(parsed.actions[2], None);
    }

    #[test]
    fn ignores_out_of_range_color() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_dir(tmp.path());
        let parsed = store.parse_bindings("color=1,2,300\n");
        assert_eq!(parsed.color, None);
    }

    #[test]
    fn ignores_lines_without_equals_and_unknown_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_dir(tmp.path());
        let parsed = store.parse_bindings("no-equals-sign\nunknown=value\nG1=p,k.5\n");
        assert_eq!(parsed.actions[1], Some(Action::PassThrough { scancode: 5 }));
    }

    #[test]
    fn missing_macro_leaves_slot_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_dir(tmp.path());
        let parsed = store.parse_bindings("G3=m,17,0\n");
        assert_eq!(parsed.actions[3], None);
    }

    #[test]
    fn writes_and_loads_defaults_on_first_use() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_with_dir(tmp.path());
        let parsed = store.load_bindings(0).unwrap();
        assert_eq!(parsed.actions[0], Some(Action::PassThrough { scancode: 1 }));
        assert_eq!(parsed.actions[21], Some(Action::PassThrough { scancode: 57 }));
        assert_eq!(parsed.actions[22], Some(Action::PassThrough { scancode: 57 }));
        assert_eq!(parsed.color, Some((0, 0, 255)));
        assert!(store.binding_path(0).exists());
        assert!(!store.poll_for_update(0));
    }

    #[test]
    fn poll_for_update_never_fires_on_first_observation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_dir(tmp.path());
        assert!(!store.poll_for_update(0));
    }
}
