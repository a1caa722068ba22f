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

/// LCD framebuffer and the FIFO that feeds it text.
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

pub const LCD_WIDTH: usize = 160;
pub const LCD_HEIGHT: usize = 48;
const BUFFER_LEN: usize = LCD_WIDTH * LCD_HEIGHT / 8; // 960

lazy_static! {
    /// The 5x7 built-in font, one row of bytes per printable glyph
    /// starting at the space character (0x20). Each byte is a column,
    /// bit 0 at the top; only the low 7 bits are used.
    static ref FONT_5X7: [[u8; 5]; 95] = build_font();
}

fn build_font() -> [[u8; 5]; 95] {
    // Covers space, digits, and the uppercase letters status lines
    // actually use. Anything else renders blank.
    let mut table = [[0u8; 5]; 95];
    table[0] = [0x00, 0x00, 0x00, 0x00, 0x00]; // space
    table[('0' as usize) - 0x20] = [0x3E, 0x51, 0x49, 0x45, 0x3E];
    table[('1' as usize) - 0x20] = [0x00, 0x42, 0x7F, 0x40, 0x00];
    table[('2' as usize) - 0x20] = [0x42, 0x61, 0x51, 0x49, 0x46];
    table[('3' as usize) - 0x20] = [0x21, 0x41, 0x45, 0x4B, 0x31];
    table[('4' as usize) - 0x20] = [0x18, 0x14, 0x12, 0x7F, 0x10];
    table[('5' as usize) - 0x20] = [0x27, 0x45, 0x45, 0x45, 0x39];
    table[('6' as usize) - 0x20] = [0x3C, 0x4A, 0x49, 0x49, 0x30];
    table[('7' as usize) - 0x20] = [0x01, 0x71, 0x09, 0x05, 0x03];
    table[('8' as usize) - 0x20] = [0x36, 0x49, 0x49, 0x49, 0x36];
    table[('9' as usize) - 0x20] = [0x06, 0x49, 0x49, 0x29, 0x1E];
    table[('A' as usize) - 0x20] = [0x7E, 0x11, 0x11, 0x11, 0x7E];
    table[('B' as usize) - 0x20] = [0x7F, 0x49, 0x49, 0x49, 0x36];
    table[('C' as usize) - 0x20] = [0x3E, 0x41, 0x41, 0x41, 0x22];
    table[('D' as usize) - 0x20] = [0x7F, 0x41, 0x41, 0x22, 0x1C];
    table[('E' as usize) - 0x20] = [0x7F, 0x49, 0x49, 0x49, 0x41];
    table[('F' as usize) - 0x20] = [0x7F, 0x09, 0x09, 0x09, 0x01];
    table[('G' as usize) - 0x20] = [0x3E, 0x41, 0x49, 0x49, 0x7A];
    table[('I' as usize) - 0x20] = [0x00, 0x41, 0x7F, 0x41, 0x00];
    table[('L' as usize) - 0x20] = [0x7F, 0x40, 0x40, 0x40, 0x40];
    table[('M' as usize) - 0x20] = [0x7F, 0x02, 0x0C, 0x02, 0x7F];
    table[('O' as usize) - 0x20] = [0x3E, 0x41, 0x41, 0x41, 0x3E];
    table[('P' as usize) - 0x20] = [0x7F, 0x09, 0x09, 0x09, 0x06];
    table[('R' as usize) - 0x20] = [0x7F, 0x09, 0x19, 0x29, 0x46];
    table[('S' as usize) - 0x20] = [0x46, 0x49, 0x49, 0x49, 0x31];
    table[('T' as usize) - 0x20] = [0x01, 0x01, 0x7F, 0x01, 0x01];
    table[('.' as usize) - 0x20] = [0x00, 0x60, 0x60, 0x00, 0x00];
    table[(':' as usize) - 0x20] = [0x00, 0x36, 0x36, 0x00, 0x00];
    table
}

/// 160x48 monochrome framebuffer for the G13's LCD, packed column-major
/// into 960 bytes: byte index `x + (y/8)*160`, bit `y % 8`.
pub struct Framebuffer {
    buffer: [u8; BUFFER_LEN],
}

impl Framebuffer {
    pub fn new() -> Framebuffer {
        Framebuffer {
            buffer: [0u8; BUFFER_LEN],
        }
    }

    pub fn clear(&mut self) {
        self.buffer = [0u8; BUFFER_LEN];
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        if x >= LCD_WIDTH || y >= LCD_HEIGHT {
            return;
        }
        let index = x + (y / 8) * LCD_WIDTH;
        let bit = 1u8 << (y % 8);
        if on {
            self.buffer[index] |= bit;
        } else {
            self.buffer[index] &= !bit;
        }
    }

    fn write_char(&mut self, x: usize, y: usize, ch: char) {
        if !ch.is_ascii() {
            return;
        }
        let code = ch as usize;
        if code < 0x20 || code > 0x7E {
            return;
        }
        let glyph = &FONT_5X7[code - 0x20];
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..7 {
                self.set_pixel(x + col, y + row, bits & (1 << row) != 0);
            }
        }
    }

    /// Draws `text` left to right starting at `(x, y)`, 6px advance per
    /// glyph (5px glyph + 1px gap), clipping anything past the buffer.
    pub fn write_text(&mut self, x: usize, y: usize, text: &str) {
        let mut cursor = x;
        for ch in text.chars() {
            if cursor + 5 > LCD_WIDTH {
                break;
            }
            self.write_char(cursor, y, ch);
            cursor += 6;
        }
    }

    /// Builds the 992-byte USB payload: a `0x03` report header, 31
    /// reserved zero bytes, then the 960-byte buffer.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + 31 + BUFFER_LEN);
        payload.push(0x03);
        payload.extend(std::iter::repeat(0u8).take(31));
        payload.extend_from_slice(&self.buffer);
        payload
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Framebuffer::new()
    }
}

/// The named pipe baseline text drives the LCD: each `\n`-delimited
/// line is drawn at `(x=2, y = 8 * line_index)`, and anything at
/// `y >= 48` is simply dropped rather than wrapped.
pub struct Fifo {
    path: PathBuf,
    file: Option<std::fs::File>,
}

impl Fifo {
    pub fn create(path: &Path) -> Result<Fifo> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let cpath = std::ffi::CString::new(path.as_os_str().to_string_lossy().as_bytes())
            .map_err(|e| Error::FifoFailure(format!("{}", e)))?;
        let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o666) };
        if rc != 0 {
            return Err(Error::FifoFailure(format!(
                "mkfifo({}) failed: {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| Error::FifoFailure(format!("{}", e)))?;
        Ok(Fifo {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Non-blocking drain of whatever text is currently available.
    /// Returns `None` if nothing is queued.
    pub fn poll_text(&mut self) -> Option<String> {
        let file = self.file.as_mut()?;
        let mut buf = [0u8; 4096];
        match file.read(&mut buf) {
            Ok(0) => None,
            Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(_) => None,
        }
    }

    /// Splits `text` on `\n` and draws each line, dropping anything
    /// below the bottom row.
    pub fn render_into(fb: &mut Framebuffer, text: &str) {
        fb.clear();
        for (i, line) in text.split('\n').enumerate() {
            let y = i * 8;
            if y >= LCD_HEIGHT {
                break;
            }
            fb.write_text(2, y, line);
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        self.file = None;
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pixel_bit_layout_matches_column_major_packing() {
        let mut fb = Framebuffer::new();
        fb.set_pixel(0, 0, true);
        assert_eq!(fb.buffer[0] & 0x01, 0x01);
        fb.set_pixel(0, 9, true);
        assert_eq!(fb.buffer[LCD_WIDTH] & 0x02, 0x02);
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut fb = Framebuffer::new();
        fb.set_pixel(LCD_WIDTH, 0, true);
        fb.set_pixel(0, LCD_HEIGHT, true);
        assert_eq!(fb.buffer, [0u8; BUFFER_LEN]);
    }

    #[test]
    fn payload_has_header_and_reserved_block() {
        let fb = Framebuffer::new();
        let payload = fb.to_payload();
        assert_eq!(payload.len(), 992);
        assert_eq!(payload[0], 0x03);
        assert!(payload[1..32].iter().all(|b| *b == 0));
    }

    #[test]
    fn fifo_render_clips_lines_past_bottom() {
        let mut fb = Framebuffer::new();
        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&format!("line{}\n", i));
        }
        Fifo::render_into(&mut fb, &text);
        // Nothing should panic; lines at y>=48 (index 6+) are dropped.
    }

    #[test]
    fn fifo_render_starts_text_at_column_two() {
        let mut fb = Framebuffer::new();
        Fifo::render_into(&mut fb, "1");
        // Glyph '1' sets row y=1 at its leftmost column; that column
        // must land at x=2, not x=0.
        assert_ne!(fb.buffer[2] & 0x02, 0);
        assert_eq!(fb.buffer[0] & 0x02, 0);
    }
}
