//! Crossterm-based terminal display
//!
//! The main window scrolls character by character below any grid windows,
//! which are kept as character buffers so they can be repainted after the
//! terminal scrolls. Input is read in raw mode: `select` polls crossterm in
//! short slices so timer ticks and the cancel flag are noticed while a line
//! is being typed.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, ScrollUp},
};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Stdout, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::display_trait::{
    DisplayError, Event, FileMode, FileRef, FileUsage, Key, Placement, StyleHint, TextStyle,
    WindowId, WindowKind, ZMachineDisplay,
};

/// Longest wait inside one crossterm poll
const POLL_SLICE: Duration = Duration::from_millis(100);

const DEFAULT_SAVE_NAME: &str = "story.qzl";

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    ch: char,
    style: TextStyle,
}

const BLANK: Cell = Cell {
    ch: ' ',
    style: TextStyle::Normal,
};

#[derive(Debug)]
struct TermWindow {
    kind: WindowKind,
    rows: u16,
    /// 0-based (x, y) for grids
    cursor: (u16, u16),
    cells: Vec<Vec<Cell>>,
    style: TextStyle,
}

#[derive(Debug, Default)]
struct LineRequest {
    window: WindowId,
    max_len: usize,
    buffer: String,
}

/// Terminal display driving stdout in raw mode
pub struct TerminalDisplay {
    stdout: Stdout,
    width: u16,
    height: u16,
    windows: HashMap<WindowId, TermWindow>,
    /// Grid windows from the top of the screen down
    grid_order: Vec<WindowId>,
    root: Option<WindowId>,
    next_id: WindowId,
    /// Main window cursor in screen coordinates (col, row)
    lower_cursor: (u16, u16),
    line_request: Option<LineRequest>,
    char_request: Option<WindowId>,
    timer: Option<Duration>,
    last_tick: Instant,
    hints: HashMap<(u8, u8), u32>,
    save_dir: PathBuf,
    cancel: Option<Arc<AtomicBool>>,
}

impl TerminalDisplay {
    /// Take over the terminal. Files are resolved relative to `save_dir`.
    pub fn new(save_dir: PathBuf) -> Result<Self, DisplayError> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()
            .map_err(|e| DisplayError::new(format!("Failed to enable raw mode: {}", e)))?;
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))
            .map_err(|e| DisplayError::new(format!("Failed to initialize terminal: {}", e)))?;
        let (width, height) = terminal::size()
            .map_err(|e| DisplayError::new(format!("Failed to get terminal size: {}", e)))?;
        debug!("TerminalDisplay: {}x{}", width, height);

        Ok(TerminalDisplay {
            stdout,
            width,
            height,
            windows: HashMap::new(),
            grid_order: Vec::new(),
            root: None,
            next_id: 1,
            lower_cursor: (0, 0),
            line_request: None,
            char_request: None,
            timer: None,
            last_tick: Instant::now(),
            hints: HashMap::new(),
            save_dir,
            cancel: None,
        })
    }

    /// Give up waiting in `select` once `flag` is raised
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn grid_rows(&self) -> u16 {
        self.grid_order
            .iter()
            .filter_map(|id| self.windows.get(id))
            .map(|w| w.rows)
            .sum::<u16>()
            .min(self.height)
    }

    /// Screen row where a grid window starts
    fn grid_top(&self, window: WindowId) -> u16 {
        self.grid_order
            .iter()
            .take_while(|&&id| id != window)
            .filter_map(|id| self.windows.get(id))
            .map(|w| w.rows)
            .sum()
    }

    fn hint(&self, kind: WindowKind, hint: StyleHint) -> Option<Color> {
        self.hints.get(&(kind as u8, hint as u8)).map(|&rgb| Color::Rgb {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        })
    }

    fn queue_style(&mut self, kind: WindowKind, style: TextStyle) -> io::Result<()> {
        queue!(self.stdout, SetAttribute(Attribute::Reset), ResetColor)?;
        if let Some(fg) = self.hint(kind, StyleHint::TextColour) {
            queue!(self.stdout, SetForegroundColor(fg))?;
        }
        if let Some(bg) = self.hint(kind, StyleHint::BackColour) {
            queue!(self.stdout, SetBackgroundColor(bg))?;
        }
        match style {
            TextStyle::Normal | TextStyle::Fixed => {}
            TextStyle::Reverse => queue!(self.stdout, SetAttribute(Attribute::Reverse))?,
            TextStyle::Bold => queue!(self.stdout, SetAttribute(Attribute::Bold))?,
            TextStyle::Italic => queue!(self.stdout, SetAttribute(Attribute::Italic))?,
        }
        Ok(())
    }

    fn put_lower_char(&mut self, ch: char, style: TextStyle) -> io::Result<()> {
        let top = self.grid_rows();
        let (mut col, mut row) = self.lower_cursor;
        row = row.max(top);
        if ch == '\n' {
            col = 0;
            row += 1;
        } else {
            self.queue_style(WindowKind::TextBuffer, style)?;
            queue!(self.stdout, MoveTo(col, row), Print(ch))?;
            col += 1;
            if col >= self.width {
                col = 0;
                row += 1;
            }
        }
        if row >= self.height {
            self.scroll_lower()?;
            row = self.height.saturating_sub(1);
        }
        self.lower_cursor = (col, row);
        Ok(())
    }

    /// Scroll the whole screen one line and repaint the grids over it
    fn scroll_lower(&mut self) -> io::Result<()> {
        queue!(self.stdout, ResetColor, ScrollUp(1))?;
        self.redraw_grids()
    }

    fn redraw_grids(&mut self) -> io::Result<()> {
        let mut top = 0;
        for id in self.grid_order.clone() {
            let Some(window) = self.windows.get(&id) else {
                continue;
            };
            let (rows, lines) = (window.rows, window.cells.clone());
            for (y, line) in lines.iter().enumerate().take(rows as usize) {
                queue!(self.stdout, MoveTo(0, top + y as u16))?;
                for cell in line {
                    self.queue_style(WindowKind::TextGrid, cell.style)?;
                    queue!(self.stdout, Print(cell.ch))?;
                }
            }
            top += rows;
        }
        queue!(self.stdout, SetAttribute(Attribute::Reset), ResetColor)
    }

    fn put_grid_str(&mut self, window: WindowId, text: &str) -> io::Result<()> {
        let top = self.grid_top(window);
        let width = self.width;
        let Some(w) = self.windows.get_mut(&window) else {
            return Ok(());
        };
        let style = w.style;
        let mut drawn = Vec::new();
        for ch in text.chars() {
            let (x, y) = w.cursor;
            if ch == '\n' {
                w.cursor = (0, y + 1);
                continue;
            }
            if let Some(cell) = w
                .cells
                .get_mut(y as usize)
                .and_then(|row| row.get_mut(x as usize))
            {
                *cell = Cell { ch, style };
                drawn.push((x, top + y, ch));
            }
            w.cursor = if x + 1 >= width { (0, y + 1) } else { (x + 1, y) };
        }
        self.queue_style(WindowKind::TextGrid, style)?;
        for (x, y, ch) in drawn {
            queue!(self.stdout, MoveTo(x, y), Print(ch))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.stdout
            .flush()
            .map_err(|e| DisplayError::new(format!("Failed to flush output: {}", e)))
    }

    fn main_style(&self) -> TextStyle {
        self.root
            .and_then(|id| self.windows.get(&id))
            .map(|w| w.style)
            .unwrap_or(TextStyle::Normal)
    }

    /// Echo typed text into the main window
    fn echo(&mut self, text: &str) -> Result<(), DisplayError> {
        let style = self.main_style();
        for ch in text.chars() {
            self.put_lower_char(ch, style)?;
        }
        queue!(self.stdout, MoveTo(self.lower_cursor.0, self.lower_cursor.1))?;
        self.flush()
    }

    fn rub_out(&mut self) -> Result<(), DisplayError> {
        let (col, row) = self.lower_cursor;
        let (col, row) = if col > 0 {
            (col - 1, row)
        } else {
            (self.width.saturating_sub(1), row.saturating_sub(1))
        };
        self.lower_cursor = (col, row);
        queue!(self.stdout, MoveTo(col, row), Print(' '), MoveTo(col, row))?;
        self.flush()
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn timer_due(&mut self) -> bool {
        match self.timer {
            Some(interval) if self.last_tick.elapsed() >= interval => {
                self.last_tick = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Poll once for up to `timeout` and turn what arrives into an event
    fn poll_once(&mut self, timeout: Duration) -> Result<Event, DisplayError> {
        let ready = event::poll(timeout)
            .map_err(|e| DisplayError::new(format!("Event poll error: {}", e)))?;
        if ready {
            match event::read().map_err(|e| DisplayError::new(format!("Event read error: {}", e)))? {
                TermEvent::Key(key) if key.kind != KeyEventKind::Release => {
                    return self.handle_key(key);
                }
                TermEvent::Paste(text) => {
                    if let Some(request) = self.line_request.as_mut() {
                        let room = request.max_len.saturating_sub(request.buffer.chars().count());
                        let pasted: String = text.chars().filter(|c| !c.is_control()).take(room).collect();
                        request.buffer.push_str(&pasted);
                        self.echo(&pasted)?;
                    }
                }
                TermEvent::Resize(width, height) => {
                    debug!("Terminal resized to {}x{}", width, height);
                    self.width = width;
                    self.height = height;
                    return Ok(Event::Arrange);
                }
                _ => {}
            }
        }
        if self.timer_due() {
            return Ok(Event::Timer);
        }
        Ok(Event::None)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<Event, DisplayError> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            debug!("Ctrl+C pressed");
            if let Some(flag) = &self.cancel {
                flag.store(true, Ordering::SeqCst);
            }
            return Ok(Event::None);
        }

        if let Some(window) = self.char_request {
            let mapped = match key.code {
                KeyCode::Char(c) => Some(Key::Char(c)),
                KeyCode::Enter => Some(Key::Enter),
                KeyCode::Backspace | KeyCode::Delete => Some(Key::Delete),
                KeyCode::Esc => Some(Key::Escape),
                KeyCode::Up => Some(Key::Up),
                KeyCode::Down => Some(Key::Down),
                KeyCode::Left => Some(Key::Left),
                KeyCode::Right => Some(Key::Right),
                KeyCode::F(n) => Some(Key::Function(n)),
                _ => None,
            };
            if let Some(key) = mapped {
                self.char_request = None;
                return Ok(Event::CharInput { window, key });
            }
            return Ok(Event::None);
        }

        if self.line_request.is_none() {
            return Ok(Event::None);
        }
        if key.code == KeyCode::Enter {
            let request = self.line_request.take().unwrap_or_default();
            self.echo("\n")?;
            debug!("Line entered: '{}'", request.buffer);
            return Ok(Event::LineInput {
                window: request.window,
                text: request.buffer,
            });
        }
        let Some(request) = self.line_request.as_mut() else {
            return Ok(Event::None);
        };
        match key.code {
            KeyCode::Char(c) if request.buffer.chars().count() < request.max_len => {
                request.buffer.push(c);
                let mut buf = [0u8; 4];
                self.echo(c.encode_utf8(&mut buf))?;
            }
            KeyCode::Backspace => {
                if request.buffer.pop().is_some() {
                    self.rub_out()?;
                }
            }
            _ => {}
        }
        Ok(Event::None)
    }

    /// Read a file name typed at a prompt in the main window
    fn prompt_name(&mut self, prompt: &str) -> Result<Option<String>, DisplayError> {
        let saved_line = self.line_request.take();
        let saved_char = self.char_request.take();
        self.echo(prompt)?;
        self.line_request = Some(LineRequest {
            window: 0,
            max_len: 128,
            buffer: String::new(),
        });
        let answer = loop {
            if self.cancelled() {
                break None;
            }
            let ready = event::poll(POLL_SLICE)
                .map_err(|e| DisplayError::new(format!("Event poll error: {}", e)))?;
            if !ready {
                continue;
            }
            let read = event::read().map_err(|e| DisplayError::new(format!("Event read error: {}", e)))?;
            match read {
                TermEvent::Key(key) if key.code == KeyCode::Esc => {
                    self.echo("\n")?;
                    break None;
                }
                TermEvent::Key(key) if key.kind != KeyEventKind::Release => {
                    if let Event::LineInput { text, .. } = self.handle_key(key)? {
                        break Some(text);
                    }
                }
                _ => {}
            }
        };
        self.line_request = saved_line;
        self.char_request = saved_char;
        Ok(answer.map(|name| {
            let name = name.trim();
            if name.is_empty() {
                DEFAULT_SAVE_NAME.to_string()
            } else {
                name.to_string()
            }
        }))
    }

    fn path(&self, file: &FileRef) -> PathBuf {
        self.save_dir.join(&file.name)
    }
}

impl ZMachineDisplay for TerminalDisplay {
    fn open_window(
        &mut self,
        split: Option<WindowId>,
        placement: Placement,
        kind: WindowKind,
    ) -> Result<Option<WindowId>, DisplayError> {
        if split.is_none() && self.root.is_some() {
            return Ok(None);
        }
        let id = self.next_id;
        self.next_id += 1;
        let rows = match placement {
            Placement::Root => self.height,
            Placement::Above { rows } => rows,
        };
        self.windows.insert(
            id,
            TermWindow {
                kind,
                rows,
                cursor: (0, 0),
                cells: vec![vec![BLANK; self.width as usize]; rows as usize],
                style: TextStyle::Normal,
            },
        );
        match split {
            None => self.root = Some(id),
            Some(_) if kind == WindowKind::TextGrid => self.grid_order.push(id),
            Some(_) => {}
        }
        debug!("Window {} opened ({:?}, {:?})", id, kind, placement);
        let top = self.grid_rows();
        if self.lower_cursor.1 < top {
            self.lower_cursor = (0, top);
        }
        Ok(Some(id))
    }

    fn close_window(&mut self, window: WindowId) -> Result<(), DisplayError> {
        self.windows.remove(&window);
        self.grid_order.retain(|&id| id != window);
        if self.root == Some(window) {
            self.root = None;
        }
        Ok(())
    }

    fn set_window_rows(&mut self, window: WindowId, rows: u16) -> Result<(), DisplayError> {
        let width = self.width as usize;
        if let Some(w) = self.windows.get_mut(&window) {
            w.rows = rows;
            w.cells.resize(rows as usize, vec![BLANK; width]);
        }
        let top = self.grid_rows();
        if self.lower_cursor.1 < top {
            self.lower_cursor = (0, top);
        }
        Ok(())
    }

    fn window_size(&self, window: WindowId) -> (u16, u16) {
        match self.windows.get(&window) {
            Some(w) if w.kind == WindowKind::TextGrid => (self.width, w.rows),
            Some(_) => (self.width, self.height.saturating_sub(self.grid_rows())),
            None => (0, 0),
        }
    }

    fn cursor(&self, window: WindowId) -> (u16, u16) {
        match self.windows.get(&window) {
            Some(w) if w.kind == WindowKind::TextGrid => w.cursor,
            Some(_) => (
                self.lower_cursor.0,
                self.lower_cursor.1.saturating_sub(self.grid_rows()),
            ),
            None => (0, 0),
        }
    }

    fn move_cursor(&mut self, window: WindowId, x: u16, y: u16) -> Result<(), DisplayError> {
        let top = self.grid_rows();
        match self.windows.get_mut(&window) {
            Some(w) if w.kind == WindowKind::TextGrid => w.cursor = (x, y),
            Some(_) => self.lower_cursor = (x, (top + y).min(self.height.saturating_sub(1))),
            None => warn!("move_cursor on unknown window {}", window),
        }
        Ok(())
    }

    fn clear_window(&mut self, window: WindowId) -> Result<(), DisplayError> {
        let kind = match self.windows.get_mut(&window) {
            Some(w) => {
                for row in w.cells.iter_mut() {
                    row.fill(BLANK);
                }
                w.cursor = (0, 0);
                w.kind
            }
            None => return Ok(()),
        };
        let (start, rows) = match kind {
            WindowKind::TextGrid => (self.grid_top(window), self.windows[&window].rows),
            WindowKind::TextBuffer => {
                let top = self.grid_rows();
                self.lower_cursor = (0, top);
                (top, self.height.saturating_sub(top))
            }
        };
        self.queue_style(kind, TextStyle::Normal)?;
        for y in start..start + rows {
            queue!(self.stdout, MoveTo(0, y), Clear(ClearType::UntilNewLine))?;
        }
        self.flush()
    }

    fn put_str(&mut self, window: WindowId, text: &str) -> Result<(), DisplayError> {
        match self.windows.get(&window).map(|w| (w.kind, w.style)) {
            Some((WindowKind::TextGrid, _)) => self.put_grid_str(window, text)?,
            Some((WindowKind::TextBuffer, style)) => {
                for ch in text.chars() {
                    self.put_lower_char(ch, style)?;
                }
            }
            None => return Err(DisplayError::new(format!("No such window {}", window))),
        }
        queue!(self.stdout, MoveTo(self.lower_cursor.0, self.lower_cursor.1))?;
        self.flush()
    }

    fn set_style(&mut self, window: WindowId, style: TextStyle) -> Result<(), DisplayError> {
        if let Some(w) = self.windows.get_mut(&window) {
            w.style = style;
        }
        Ok(())
    }

    fn set_style_hint(&mut self, kind: WindowKind, hint: StyleHint, value: u32) {
        self.hints.insert((kind as u8, hint as u8), value);
    }

    fn clear_style_hint(&mut self, kind: WindowKind, hint: StyleHint) {
        self.hints.remove(&(kind as u8, hint as u8));
    }

    fn request_line_event(&mut self, window: WindowId, max_len: usize) -> Result<(), DisplayError> {
        self.line_request = Some(LineRequest {
            window,
            max_len,
            buffer: String::new(),
        });
        execute!(self.stdout, Show)?;
        Ok(())
    }

    fn cancel_line_event(&mut self, _window: WindowId) -> Result<String, DisplayError> {
        let typed = self
            .line_request
            .take()
            .map(|request| request.buffer)
            .unwrap_or_default();
        self.echo("\n")?;
        Ok(typed)
    }

    fn request_char_event(&mut self, window: WindowId) -> Result<(), DisplayError> {
        self.char_request = Some(window);
        execute!(self.stdout, Hide)?;
        Ok(())
    }

    fn cancel_char_event(&mut self, _window: WindowId) -> Result<(), DisplayError> {
        self.char_request = None;
        Ok(())
    }

    fn request_timer_events(&mut self, millis: u32) {
        self.timer = (millis > 0).then(|| Duration::from_millis(millis as u64));
        self.last_tick = Instant::now();
    }

    fn select(&mut self) -> Result<Event, DisplayError> {
        loop {
            if self.cancelled() {
                return Ok(Event::None);
            }
            if self.line_request.is_none() && self.char_request.is_none() && self.timer.is_none() {
                warn!("select called with nothing requested");
                return Ok(Event::None);
            }
            match self.poll_once(POLL_SLICE)? {
                Event::None => continue,
                event => return Ok(event),
            }
        }
    }

    fn select_poll(&mut self) -> Result<Event, DisplayError> {
        self.poll_once(Duration::ZERO)
    }

    fn file_by_prompt(&mut self, usage: FileUsage, mode: FileMode) -> Option<FileRef> {
        let prompt = match (usage, mode) {
            (FileUsage::SavedGame, FileMode::Write) => "Save to file: ",
            (FileUsage::SavedGame, FileMode::Read) => "Restore from file: ",
            (FileUsage::Transcript, _) => "Transcript file: ",
        };
        let name = match self.prompt_name(prompt) {
            Ok(Some(name)) => name,
            Ok(None) => return None,
            Err(e) => {
                warn!("File prompt failed: {}", e);
                return None;
            }
        };
        let file = FileRef { name, usage };
        if mode == FileMode::Read && !self.path(&file).exists() {
            warn!("No such file {}", self.path(&file).display());
            return None;
        }
        Some(file)
    }

    fn file_by_name(&mut self, usage: FileUsage, name: &str) -> FileRef {
        FileRef {
            name: name.to_string(),
            usage,
        }
    }

    fn delete_file(&mut self, file: &FileRef) -> Result<(), DisplayError> {
        fs::remove_file(self.path(file))?;
        Ok(())
    }

    fn open_writer(&mut self, file: &FileRef) -> Result<Box<dyn Write>, DisplayError> {
        let path = self.path(file);
        let out = match file.usage {
            FileUsage::Transcript => fs::OpenOptions::new().create(true).append(true).open(&path)?,
            FileUsage::SavedGame => File::create(&path)?,
        };
        debug!("Writing {}", path.display());
        Ok(Box::new(BufWriter::new(out)))
    }

    fn open_reader(&mut self, file: &FileRef) -> Result<Box<dyn Read>, DisplayError> {
        let path = self.path(file);
        debug!("Reading {}", path.display());
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn screen_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = execute!(
            self.stdout,
            SetAttribute(Attribute::Reset),
            ResetColor,
            Show,
            MoveTo(0, self.height.saturating_sub(1)),
            Print("\r\n")
        );
        let _ = terminal::disable_raw_mode();
    }
}
