//! Window and output stream state
//!
//! Tracks the two Z-machine windows as display window ids, the lazily
//! resized upper window, and the output stream selection: screen (1),
//! transcript (2) and the nested memory captures of stream 3.

use crate::display_trait::WindowId;
use crate::error::VmError;
use crate::game::Game;
use log::{debug, warn};
use std::io::Write;

/// Deepest permitted nesting of stream 3 captures
pub const MAX_STREAM3_DEPTH: usize = 16;

/// Colour table for `set_colour` codes 2 to 12
const COLOUR_TABLE: [u32; 11] = [
    0x000000, // black
    0xe80000, // red
    0x00d000, // green
    0xe8e800, // yellow
    0x0000d0, // blue
    0xf800f8, // magenta
    0x00e8e8, // cyan
    0xf8f8f8, // white
    0xb0b0b0, // light grey
    0x888888, // medium grey
    0x585858, // dark grey
];

/// Effect of a colour operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    /// Leave the colour as it is
    Current,
    /// Go back to the display's default
    Default,
    /// 0xRRGGBB
    Rgb(u32),
}

impl Colour {
    /// Decode a `set_colour` operand. Unknown codes give `None`.
    pub fn from_code(code: u16) -> Option<Colour> {
        match code {
            0 => Some(Colour::Current),
            1 | 13 | 14 | 15 => Some(Colour::Default),
            2..=12 => Some(Colour::Rgb(COLOUR_TABLE[code as usize - 2])),
            _ => None,
        }
    }

    /// Decode a `set_true_colour` operand: a 15-bit BGR value, -2 for the
    /// current colour and any other negative value for the default
    pub fn from_true_colour(value: u16) -> Colour {
        match value as i16 {
            -2 => Colour::Current,
            v if v < 0 => Colour::Default,
            _ => {
                let c = value as u32;
                Colour::Rgb(((c & 0x1f) << 19) | ((c & 0x3e0) << 6) | ((c & 0x7c00) >> 7))
            }
        }
    }
}

/// Where `set_cursor row col` moves the upper window cursor.
///
/// Positive values are 1-based, zero keeps the current coordinate and
/// negative values count back from the window edge. A negative row lands
/// at `height - row`, below the window.
pub fn cursor_target(row: i16, col: i16, current: (u16, u16), size: (u16, u16)) -> (u16, u16) {
    let (width, height) = (size.0 as i32, size.1 as i32);
    let (row, col) = (row as i32, col as i32);
    let x = match col {
        c if c > 0 => c - 1,
        c if c < 0 => width + c,
        _ => current.0 as i32,
    };
    let y = match row {
        r if r > 0 => r - 1,
        r if r < 0 => height - r,
        _ => current.1 as i32,
    };
    (x.max(0) as u16, y.max(0) as u16)
}

/// Right-hand side of the v1-3 status line
pub fn status_score(version: u8, time_game: bool, first: u16, second: u16) -> String {
    if version < 3 || !time_game {
        format!(" {}/{}", first as i16, second as i16)
    } else {
        format!(" {}:{:02}", first % 24, second % 60)
    }
}

/// Lay out a status line of exactly `width` characters
pub fn status_line(location: &str, score: &str, width: usize) -> String {
    let room = width.saturating_sub(score.chars().count());
    let mut line: String = location.chars().take(room).collect();
    let used = line.chars().count();
    line.extend(std::iter::repeat(' ').take(room - used));
    line.push_str(score);
    line
}

/// One stream 3 capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream3 {
    /// Table address; the count word goes here, characters from table + 2
    pub table: u32,
    pub count: u16,
}

/// Window ids, upper window sizing and output stream selection
pub struct ScreenState {
    pub main_window: Option<WindowId>,
    pub upper_window: Option<WindowId>,
    /// Window selected by `set_window` (0 main, otherwise upper)
    pub current_window: u16,
    /// Height asked for by the last `split_window`
    pub upper_target_height: u16,
    /// Height the upper window actually has
    pub upper_current_height: u16,
    /// Height at the last input
    pub upper_initial_height: u16,
    /// Stream 1
    pub screen_output: bool,
    /// Stream 2
    pub transcript: Option<Box<dyn Write>>,
    stream3: Vec<Stream3>,
    pub foreground: Option<u32>,
    pub background: Option<u32>,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenState {
    pub fn new() -> Self {
        ScreenState {
            main_window: None,
            upper_window: None,
            current_window: 0,
            upper_target_height: 0,
            upper_current_height: 0,
            upper_initial_height: 0,
            screen_output: true,
            transcript: None,
            stream3: Vec::new(),
            foreground: None,
            background: None,
        }
    }

    /// Window that text for the current window goes to
    pub fn output_window(&self) -> Option<WindowId> {
        if self.current_window != 0 && self.upper_window.is_some() {
            self.upper_window
        } else {
            self.main_window
        }
    }

    /// Whether the upper window is selected and open
    pub fn upper_selected(&self) -> Option<WindowId> {
        if self.current_window != 0 {
            self.upper_window
        } else {
            None
        }
    }

    pub fn capturing(&self) -> bool {
        !self.stream3.is_empty()
    }

    pub fn stream3_depth(&self) -> usize {
        self.stream3.len()
    }

    /// Start a stream 3 capture into `table`
    pub fn push_stream3(&mut self, table: u32) -> Result<(), VmError> {
        if self.stream3.len() >= MAX_STREAM3_DEPTH {
            return Err(VmError::Stream(format!(
                "More than {} nested stream 3 captures",
                MAX_STREAM3_DEPTH
            )));
        }
        debug!("Stream 3 capture to 0x{:04x} (depth {})", table, self.stream3.len() + 1);
        self.stream3.push(Stream3 { table, count: 0 });
        Ok(())
    }

    /// End the innermost capture and write its length to the table
    pub fn pop_stream3(&mut self, game: &mut Game) -> Result<(), VmError> {
        match self.stream3.pop() {
            Some(capture) => {
                debug!(
                    "Stream 3 capture to 0x{:04x} closed with {} characters",
                    capture.table, capture.count
                );
                game.write_word(capture.table, capture.count)
            }
            None => {
                warn!("output_stream -3 with no capture active");
                Ok(())
            }
        }
    }

    /// Append one ZSCII code to the innermost capture
    pub fn capture(&mut self, game: &mut Game, zscii: u16) -> Result<(), VmError> {
        let Some(capture) = self.stream3.last_mut() else {
            return Err(VmError::Stream("No stream 3 capture active".to_string()));
        };
        game.write_byte(capture.table + 2 + capture.count as u32, zscii as u8)?;
        capture.count += 1;
        Ok(())
    }

    /// Echo text to the transcript if one is open
    pub fn transcribe(&mut self, text: &str) -> Result<(), VmError> {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.write_all(text.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StoryBuilder, SCRATCH};
    use test_log::test;

    #[test]
    fn test_colour_codes() {
        assert_eq!(Colour::from_code(0), Some(Colour::Current));
        assert_eq!(Colour::from_code(1), Some(Colour::Default));
        assert_eq!(Colour::from_code(3), Some(Colour::Rgb(0xe80000)));
        assert_eq!(Colour::from_code(12), Some(Colour::Rgb(0x585858)));
        assert_eq!(Colour::from_code(15), Some(Colour::Default));
        assert_eq!(Colour::from_code(16), None);
    }

    #[test]
    fn test_true_colour_conversion() {
        assert_eq!(Colour::from_true_colour(0xfffe), Colour::Current);
        assert_eq!(Colour::from_true_colour(0xffff), Colour::Default);
        // pure red, green and blue in 5-bit components
        assert_eq!(Colour::from_true_colour(0x001f), Colour::Rgb(0xf80000));
        assert_eq!(Colour::from_true_colour(0x03e0), Colour::Rgb(0x00f800));
        assert_eq!(Colour::from_true_colour(0x7c00), Colour::Rgb(0x0000f8));
    }

    #[test]
    fn test_cursor_target() {
        assert_eq!(cursor_target(1, 1, (5, 5), (80, 3)), (0, 0));
        assert_eq!(cursor_target(0, 0, (5, 2), (80, 3)), (5, 2));
        assert_eq!(cursor_target(2, -1, (0, 0), (80, 3)), (79, 1));
        // a negative row moves below the window
        assert_eq!(cursor_target(-1, 3, (0, 0), (80, 3)), (2, 4));
    }

    #[test]
    fn test_status_line_layout() {
        assert_eq!(status_score(3, false, 10, 0xffff), " 10/-1");
        assert_eq!(status_score(3, true, 25, 7), " 1:07");
        assert_eq!(status_score(2, true, 25, 7), " 25/7");

        let line = status_line("West of House", " 0/1", 20);
        assert_eq!(line, "West of House    0/1");
        let line = status_line("A very long room name", " 0/1", 12);
        assert_eq!(line, "A very l 0/1");
    }

    #[test]
    fn test_stream3_nesting() {
        let mut game = Game::from_memory(StoryBuilder::new(5).build()).unwrap();
        let mut screen = ScreenState::new();
        let table = SCRATCH as u32;
        screen.push_stream3(table).unwrap();
        screen.capture(&mut game, b'h' as u16).unwrap();
        screen.capture(&mut game, b'i' as u16).unwrap();
        screen.push_stream3(table + 0x20).unwrap();
        screen.capture(&mut game, b'x' as u16).unwrap();
        screen.pop_stream3(&mut game).unwrap();
        screen.pop_stream3(&mut game).unwrap();

        assert_eq!(game.read_word(table), 2);
        assert_eq!(game.read_byte(table + 2), b'h');
        assert_eq!(game.read_word(table + 0x20), 1);
        assert!(!screen.capturing());
    }

    #[test]
    fn test_stream3_depth_limit() {
        let mut screen = ScreenState::new();
        for i in 0..MAX_STREAM3_DEPTH {
            screen.push_stream3(SCRATCH as u32 + i as u32 * 8).unwrap();
        }
        assert!(matches!(screen.push_stream3(SCRATCH as u32), Err(VmError::Stream(_))));
    }
}
