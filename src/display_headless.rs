//! Headless display implementation for testing and CI environments
//!
//! Collects all output in memory, replays scripted input and keeps saved
//! files in a map. State lives behind a shared handle so tests can inspect
//! it after handing the display to an interpreter.

use crate::display_trait::{
    DisplayError, Event, FileMode, FileRef, FileUsage, Key, Placement, StyleHint, TextStyle,
    WindowId, WindowKind, ZMachineDisplay,
};
use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::rc::Rc;

/// One scripted input event
#[derive(Debug, Clone)]
pub enum ScriptedInput {
    Line(String),
    Key(Key),
    Timer,
}

#[derive(Debug)]
struct HeadlessWindow {
    kind: WindowKind,
    rows: u16,
    cursor: (u16, u16),
    text: String,
    grid: Vec<Vec<char>>,
    style: TextStyle,
}

/// Shared state of a headless display
#[derive(Debug, Default)]
pub struct HeadlessState {
    windows: HashMap<WindowId, HeadlessWindow>,
    next_id: WindowId,
    root: Option<WindowId>,
    width: u16,
    height: u16,
    script: VecDeque<ScriptedInput>,
    line_request: Option<WindowId>,
    char_request: Option<WindowId>,
    timer_millis: u32,
    files: HashMap<String, Vec<u8>>,
    prompt_answer: Option<String>,
    hints: HashMap<(u8, u8), u32>,
    styles: Vec<TextStyle>,
}

/// Cloneable view onto a headless display's state
#[derive(Debug, Clone)]
pub struct HeadlessHandle(Rc<RefCell<HeadlessState>>);

impl HeadlessHandle {
    /// Queue a line of input
    pub fn push_line(&self, line: &str) {
        self.0
            .borrow_mut()
            .script
            .push_back(ScriptedInput::Line(line.to_string()));
    }

    pub fn push_key(&self, key: Key) {
        self.0.borrow_mut().script.push_back(ScriptedInput::Key(key));
    }

    pub fn push_timer(&self) {
        self.0.borrow_mut().script.push_back(ScriptedInput::Timer);
    }

    /// Everything written to the root (main) window
    pub fn main_text(&self) -> String {
        let state = self.0.borrow();
        state
            .root
            .and_then(|id| state.windows.get(&id))
            .map(|w| w.text.clone())
            .unwrap_or_default()
    }

    /// Rows of the first open grid window, trailing spaces trimmed
    pub fn grid_lines(&self) -> Vec<String> {
        let state = self.0.borrow();
        let mut ids: Vec<_> = state
            .windows
            .iter()
            .filter(|(_, w)| w.kind == WindowKind::TextGrid)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids.first()
            .and_then(|id| state.windows.get(id))
            .map(|w| {
                w.grid
                    .iter()
                    .map(|row| row.iter().collect::<String>().trim_end().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of open grid windows
    pub fn grid_window_count(&self) -> usize {
        self.0
            .borrow()
            .windows
            .values()
            .filter(|w| w.kind == WindowKind::TextGrid)
            .count()
    }

    /// Rows of the first open grid window
    pub fn grid_rows(&self) -> u16 {
        self.0
            .borrow()
            .windows
            .values()
            .find(|w| w.kind == WindowKind::TextGrid)
            .map(|w| w.rows)
            .unwrap_or(0)
    }

    /// Answer for the next file prompt; `None` cancels prompts
    pub fn set_prompt_answer(&self, name: Option<&str>) {
        self.0.borrow_mut().prompt_answer = name.map(str::to_string);
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.0.borrow().files.get(name).cloned()
    }

    pub fn put_file(&self, name: &str, bytes: Vec<u8>) {
        self.0.borrow_mut().files.insert(name.to_string(), bytes);
    }

    pub fn style_hint(&self, kind: WindowKind, hint: StyleHint) -> Option<u32> {
        self.0
            .borrow()
            .hints
            .get(&(kind as u8, hint as u8))
            .copied()
    }

    /// Styles applied so far, in order
    pub fn styles(&self) -> Vec<TextStyle> {
        self.0.borrow().styles.clone()
    }

    pub fn timer_millis(&self) -> u32 {
        self.0.borrow().timer_millis
    }
}

/// In-memory display
#[derive(Debug)]
pub struct HeadlessDisplay {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessDisplay {
    pub fn new(width: u16, height: u16) -> Self {
        let state = HeadlessState {
            width,
            height,
            next_id: 1,
            prompt_answer: Some("story.qzl".to_string()),
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle(self.state.clone())
    }

    fn with_window<T>(
        &self,
        window: WindowId,
        f: impl FnOnce(&mut HeadlessWindow, u16) -> T,
    ) -> Result<T, DisplayError> {
        let mut state = self.state.borrow_mut();
        let width = state.width;
        state
            .windows
            .get_mut(&window)
            .map(|w| f(w, width))
            .ok_or_else(|| DisplayError::new(format!("No such window {}", window)))
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

struct MemoryFileWriter {
    name: String,
    state: Rc<RefCell<HeadlessState>>,
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.state
            .borrow_mut()
            .files
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ZMachineDisplay for HeadlessDisplay {
    fn open_window(
        &mut self,
        split: Option<WindowId>,
        placement: Placement,
        kind: WindowKind,
    ) -> Result<Option<WindowId>, DisplayError> {
        let mut state = self.state.borrow_mut();
        if split.is_none() && state.root.is_some() {
            return Ok(None);
        }
        let id = state.next_id;
        state.next_id += 1;
        let rows = match placement {
            Placement::Root => state.height,
            Placement::Above { rows } => rows,
        };
        let width = state.width as usize;
        state.windows.insert(
            id,
            HeadlessWindow {
                kind,
                rows,
                cursor: (0, 0),
                text: String::new(),
                grid: vec![vec![' '; width]; rows as usize],
                style: TextStyle::Normal,
            },
        );
        if split.is_none() {
            state.root = Some(id);
        }
        debug!("Headless window {} opened ({:?}, {:?})", id, kind, placement);
        Ok(Some(id))
    }

    fn close_window(&mut self, window: WindowId) -> Result<(), DisplayError> {
        let mut state = self.state.borrow_mut();
        state.windows.remove(&window);
        if state.root == Some(window) {
            state.root = None;
        }
        Ok(())
    }

    fn set_window_rows(&mut self, window: WindowId, rows: u16) -> Result<(), DisplayError> {
        self.with_window(window, |w, width| {
            w.rows = rows;
            w.grid.resize(rows as usize, vec![' '; width as usize]);
        })
    }

    fn window_size(&self, window: WindowId) -> (u16, u16) {
        let state = self.state.borrow();
        match state.windows.get(&window) {
            Some(w) if w.kind == WindowKind::TextGrid => (state.width, w.rows),
            Some(_) => {
                let above: u16 = state
                    .windows
                    .values()
                    .filter(|w| w.kind == WindowKind::TextGrid)
                    .map(|w| w.rows)
                    .sum();
                (state.width, state.height.saturating_sub(above))
            }
            None => (0, 0),
        }
    }

    fn cursor(&self, window: WindowId) -> (u16, u16) {
        self.state
            .borrow()
            .windows
            .get(&window)
            .map(|w| w.cursor)
            .unwrap_or((0, 0))
    }

    fn move_cursor(&mut self, window: WindowId, x: u16, y: u16) -> Result<(), DisplayError> {
        self.with_window(window, |w, _| w.cursor = (x, y))
    }

    fn clear_window(&mut self, window: WindowId) -> Result<(), DisplayError> {
        self.with_window(window, |w, width| {
            if w.kind == WindowKind::TextGrid {
                w.grid = vec![vec![' '; width as usize]; w.rows as usize];
            } else {
                w.text.push_str("\n\n");
            }
        })
    }

    fn put_str(&mut self, window: WindowId, text: &str) -> Result<(), DisplayError> {
        self.with_window(window, |w, width| {
            if w.kind == WindowKind::TextBuffer {
                w.text.push_str(text);
                return;
            }
            for ch in text.chars() {
                let (x, y) = w.cursor;
                if ch == '\n' {
                    w.cursor = (0, y + 1);
                    continue;
                }
                if let Some(cell) = w
                    .grid
                    .get_mut(y as usize)
                    .and_then(|row| row.get_mut(x as usize))
                {
                    *cell = ch;
                }
                w.cursor = if x + 1 >= width { (0, y + 1) } else { (x + 1, y) };
            }
        })
    }

    fn set_style(&mut self, window: WindowId, style: TextStyle) -> Result<(), DisplayError> {
        self.with_window(window, |w, _| w.style = style)?;
        self.state.borrow_mut().styles.push(style);
        Ok(())
    }

    fn set_style_hint(&mut self, kind: WindowKind, hint: StyleHint, value: u32) {
        self.state
            .borrow_mut()
            .hints
            .insert((kind as u8, hint as u8), value);
    }

    fn clear_style_hint(&mut self, kind: WindowKind, hint: StyleHint) {
        self.state.borrow_mut().hints.remove(&(kind as u8, hint as u8));
    }

    fn request_line_event(&mut self, window: WindowId, max_len: usize) -> Result<(), DisplayError> {
        debug!("Line input requested on window {} (max {})", window, max_len);
        self.state.borrow_mut().line_request = Some(window);
        Ok(())
    }

    fn cancel_line_event(&mut self, _window: WindowId) -> Result<String, DisplayError> {
        self.state.borrow_mut().line_request = None;
        Ok(String::new())
    }

    fn request_char_event(&mut self, window: WindowId) -> Result<(), DisplayError> {
        self.state.borrow_mut().char_request = Some(window);
        Ok(())
    }

    fn cancel_char_event(&mut self, _window: WindowId) -> Result<(), DisplayError> {
        self.state.borrow_mut().char_request = None;
        Ok(())
    }

    fn request_timer_events(&mut self, millis: u32) {
        self.state.borrow_mut().timer_millis = millis;
    }

    fn select(&mut self) -> Result<Event, DisplayError> {
        let mut state = self.state.borrow_mut();
        let Some(next) = state.script.pop_front() else {
            return Ok(Event::None);
        };
        match next {
            ScriptedInput::Line(text) => {
                let window = state.line_request.take().unwrap_or(0);
                if let Some(w) = state.windows.get_mut(&window) {
                    w.text.push_str(&text);
                    w.text.push('\n');
                }
                Ok(Event::LineInput { window, text })
            }
            ScriptedInput::Key(key) => {
                let window = state.char_request.take().unwrap_or(0);
                Ok(Event::CharInput { window, key })
            }
            ScriptedInput::Timer => Ok(Event::Timer),
        }
    }

    fn select_poll(&mut self) -> Result<Event, DisplayError> {
        if matches!(self.state.borrow().script.front(), Some(ScriptedInput::Timer)) {
            return self.select();
        }
        Ok(Event::None)
    }

    fn file_by_prompt(&mut self, usage: FileUsage, mode: FileMode) -> Option<FileRef> {
        let state = self.state.borrow();
        let name = state.prompt_answer.clone()?;
        if mode == FileMode::Read && !state.files.contains_key(&name) {
            return None;
        }
        Some(FileRef { name, usage })
    }

    fn file_by_name(&mut self, usage: FileUsage, name: &str) -> FileRef {
        FileRef {
            name: name.to_string(),
            usage,
        }
    }

    fn delete_file(&mut self, file: &FileRef) -> Result<(), DisplayError> {
        self.state.borrow_mut().files.remove(&file.name);
        Ok(())
    }

    fn open_writer(&mut self, file: &FileRef) -> Result<Box<dyn Write>, DisplayError> {
        if file.usage == FileUsage::SavedGame {
            self.state.borrow_mut().files.insert(file.name.clone(), Vec::new());
        }
        Ok(Box::new(MemoryFileWriter {
            name: file.name.clone(),
            state: self.state.clone(),
        }))
    }

    fn open_reader(&mut self, file: &FileRef) -> Result<Box<dyn Read>, DisplayError> {
        let bytes = self
            .state
            .borrow()
            .files
            .get(&file.name)
            .cloned()
            .ok_or_else(|| DisplayError::new(format!("No file named {}", file.name)))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn screen_size(&self) -> (u16, u16) {
        let state = self.state.borrow();
        (state.width, state.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_grid_window_writes_at_cursor() {
        let mut display = HeadlessDisplay::new(20, 10);
        let handle = display.handle();
        let main = display
            .open_window(None, Placement::Root, WindowKind::TextBuffer)
            .unwrap()
            .unwrap();
        let upper = display
            .open_window(Some(main), Placement::Above { rows: 2 }, WindowKind::TextGrid)
            .unwrap()
            .unwrap();
        display.move_cursor(upper, 3, 1).unwrap();
        display.put_str(upper, "hi").unwrap();
        assert_eq!(handle.grid_lines(), vec!["".to_string(), "   hi".to_string()]);
        assert_eq!(display.window_size(main), (20, 8));
    }

    #[test]
    fn test_scripted_line_is_echoed() {
        let mut display = HeadlessDisplay::default();
        let handle = display.handle();
        let main = display
            .open_window(None, Placement::Root, WindowKind::TextBuffer)
            .unwrap()
            .unwrap();
        handle.push_line("look");
        display.request_line_event(main, 80).unwrap();
        let event = display.select().unwrap();
        assert_eq!(
            event,
            Event::LineInput {
                window: main,
                text: "look".to_string()
            }
        );
        assert_eq!(handle.main_text(), "look\n");
        assert_eq!(display.select().unwrap(), Event::None);
    }

    #[test]
    fn test_memory_files() {
        let mut display = HeadlessDisplay::default();
        let handle = display.handle();
        assert!(display
            .file_by_prompt(FileUsage::SavedGame, FileMode::Read)
            .is_none());
        let file = display
            .file_by_prompt(FileUsage::SavedGame, FileMode::Write)
            .unwrap();
        display.open_writer(&file).unwrap().write_all(b"FORM").unwrap();
        assert_eq!(handle.file("story.qzl"), Some(b"FORM".to_vec()));
        let mut buf = Vec::new();
        display.open_reader(&file).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"FORM");
    }
}
