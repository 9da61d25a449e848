//! Display and I/O capability consumed by the interpreter core
//!
//! The core never renders anything itself. It opens windows, writes text,
//! requests input events and obtains save/transcript files through this
//! trait. Implementations decide how (or whether) any of it reaches a user.

use std::fmt;
use std::io::{Read, Write};

/// Identifier for a window opened through the display
pub type WindowId = u32;

/// Kind of window to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Scrolling, word-wrapped text (the main window)
    TextBuffer,
    /// Fixed character grid with an addressable cursor (the upper window)
    TextGrid,
}

/// Where a new window is carved out of the window it splits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Root window, fills the screen
    Root,
    /// Fixed number of rows above the split window
    Above { rows: u16 },
}

/// Abstract text styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Normal,
    Reverse,
    Bold,
    Italic,
    Fixed,
}

/// Style hints that may be set per window kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleHint {
    TextColour,
    BackColour,
    ReverseColour,
}

/// Keys delivered by character input events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Delete,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Function(u8),
}

/// Events returned by `select`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Nothing pending (only from `select_poll`, or a display with no more input)
    None,
    /// A completed line of input
    LineInput { window: WindowId, text: String },
    /// A single keypress
    CharInput { window: WindowId, key: Key },
    /// A timer tick
    Timer,
    /// The screen was resized
    Arrange,
}

/// What a file reference is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileUsage {
    SavedGame,
    Transcript,
}

/// Direction a file is opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// Handle on a named file owned by the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub usage: FileUsage,
}

/// Core trait for displays the interpreter drives
pub trait ZMachineDisplay {
    /// Open a window. `split` names the window to carve space from.
    fn open_window(
        &mut self,
        split: Option<WindowId>,
        placement: Placement,
        kind: WindowKind,
    ) -> Result<Option<WindowId>, DisplayError>;

    fn close_window(&mut self, window: WindowId) -> Result<(), DisplayError>;

    /// Change the number of rows of a window opened with `Placement::Above`
    fn set_window_rows(&mut self, window: WindowId, rows: u16) -> Result<(), DisplayError>;

    /// Size of a window in characters (width, height)
    fn window_size(&self, window: WindowId) -> (u16, u16);

    /// Cursor position in a grid window, 0-based (x, y)
    fn cursor(&self, window: WindowId) -> (u16, u16);

    fn move_cursor(&mut self, window: WindowId, x: u16, y: u16) -> Result<(), DisplayError>;

    fn clear_window(&mut self, window: WindowId) -> Result<(), DisplayError>;

    /// Write text to a window's stream
    fn put_str(&mut self, window: WindowId, text: &str) -> Result<(), DisplayError>;

    fn put_char(&mut self, window: WindowId, ch: char) -> Result<(), DisplayError> {
        let mut buf = [0u8; 4];
        self.put_str(window, ch.encode_utf8(&mut buf))
    }

    fn set_style(&mut self, window: WindowId, style: TextStyle) -> Result<(), DisplayError>;

    /// Set a style hint for every style of a window kind. `value` is 0xRRGGBB.
    fn set_style_hint(&mut self, kind: WindowKind, hint: StyleHint, value: u32);

    fn clear_style_hint(&mut self, kind: WindowKind, hint: StyleHint);

    /// Ask for a line of input of at most `max_len` characters
    fn request_line_event(&mut self, window: WindowId, max_len: usize) -> Result<(), DisplayError>;

    /// Cancel a pending line request, returning what was typed so far
    fn cancel_line_event(&mut self, window: WindowId) -> Result<String, DisplayError>;

    fn request_char_event(&mut self, window: WindowId) -> Result<(), DisplayError>;

    fn cancel_char_event(&mut self, window: WindowId) -> Result<(), DisplayError>;

    /// Deliver `Event::Timer` every `millis` milliseconds; 0 cancels
    fn request_timer_events(&mut self, millis: u32);

    /// Block until the next event
    fn select(&mut self) -> Result<Event, DisplayError>;

    /// Return the next event if one is already pending
    fn select_poll(&mut self) -> Result<Event, DisplayError>;

    /// Ask the user for a file
    fn file_by_prompt(&mut self, usage: FileUsage, mode: FileMode) -> Option<FileRef>;

    /// Refer to a file by name without prompting
    fn file_by_name(&mut self, usage: FileUsage, name: &str) -> FileRef;

    fn delete_file(&mut self, file: &FileRef) -> Result<(), DisplayError>;

    fn open_writer(&mut self, file: &FileRef) -> Result<Box<dyn Write>, DisplayError>;

    fn open_reader(&mut self, file: &FileRef) -> Result<Box<dyn Read>, DisplayError>;

    /// Whether a Unicode character can be (output, input)
    fn supports_unicode(&self, ch: char) -> (bool, bool) {
        (!ch.is_control(), ch.is_ascii())
    }

    /// Screen size in characters (width, height)
    fn screen_size(&self) -> (u16, u16);
}

/// Display error type
#[derive(Debug, Clone)]
pub struct DisplayError {
    pub message: String,
}

impl DisplayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Display error: {}", self.message)
    }
}

impl std::error::Error for DisplayError {}

impl From<std::io::Error> for DisplayError {
    fn from(error: std::io::Error) -> Self {
        Self::new(format!("I/O error: {}", error))
    }
}

impl From<DisplayError> for String {
    fn from(error: DisplayError) -> String {
        error.message
    }
}
