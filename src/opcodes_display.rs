/// Window and screen model operations for Z-Machine interpreter
///
/// This module handles all display-related operations including:
/// - Window management (split_window, set_window, erase_window, erase_line)
/// - Cursor control (set_cursor, get_cursor)
/// - Text styling and colour (set_text_style, set_colour, set_true_colour)
/// - Output control (show_status, buffer_mode, print_table)
///
/// The upper window is a text grid opened above the main window on demand.
/// From v4 on, shrinking it is deferred until after the next input.
use crate::display_trait::{Placement, StyleHint, TextStyle, WindowKind};
use crate::error::VmError;
use crate::header::FLAGS1_TIME_GAME;
use crate::instruction::Instruction;
use crate::interpreter::{arg, Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use crate::screen::{cursor_target, status_line, status_score, Colour};
use log::{debug, trace, warn};

/// set_text_style bits
const STYLE_BITS: [(u16, TextStyle); 4] = [
    (1, TextStyle::Reverse),
    (2, TextStyle::Bold),
    (4, TextStyle::Italic),
    (8, TextStyle::Fixed),
];

impl Interpreter {
    /// Handle display opcodes
    pub fn execute_display_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        match inst.opcode {
            Opcode::SplitWindow => {
                let rows = arg(operands, 0);
                debug!(
                    "split_window {} (current {})",
                    rows, self.screen.upper_current_height
                );
                if self.vm.version() <= 3 || rows >= self.screen.upper_current_height {
                    self.resize_upper(rows)?;
                }
                self.screen.upper_target_height = rows;
                if let Some(upper) = self.screen.upper_window {
                    self.display.move_cursor(upper, 0, 0)?;
                }
                Ok(StepResult::Continue)
            }
            Opcode::SetWindow => {
                let window = arg(operands, 0);
                self.screen.current_window = window;
                if let Some(upper) = self.screen.upper_selected() {
                    self.display.move_cursor(upper, 0, 0)?;
                }
                Ok(StepResult::Continue)
            }
            Opcode::EraseWindow => {
                self.erase_window(arg(operands, 0) as i16)?;
                Ok(StepResult::Continue)
            }
            Opcode::EraseLine => {
                if arg(operands, 0) == 1 {
                    if let Some(upper) = self.screen.upper_selected() {
                        let (x, y) = self.display.cursor(upper);
                        let (width, _) = self.display.window_size(upper);
                        let blank = " ".repeat(width.saturating_sub(x) as usize);
                        self.display.put_str(upper, &blank)?;
                        self.display.move_cursor(upper, x, y)?;
                    }
                }
                Ok(StepResult::Continue)
            }

            Opcode::SetCursor => {
                let row = arg(operands, 0) as i16;
                let col = arg(operands, 1) as i16;
                match self.screen.upper_selected() {
                    Some(upper) => {
                        let (x, y) = cursor_target(
                            row,
                            col,
                            self.display.cursor(upper),
                            self.display.window_size(upper),
                        );
                        trace!("set_cursor {} {} -> ({}, {})", row, col, x, y);
                        self.display.move_cursor(upper, x, y)?;
                    }
                    None => debug!("set_cursor {} {} ignored outside the upper window", row, col),
                }
                Ok(StepResult::Continue)
            }
            Opcode::GetCursor => {
                let array = arg(operands, 0) as u32;
                let (x, y) = self
                    .screen
                    .output_window()
                    .map(|w| self.display.cursor(w))
                    .unwrap_or((0, 0));
                self.vm.game.write_word(array, y + 1)?;
                self.vm.game.write_word(array + 2, x + 1)?;
                Ok(StepResult::Continue)
            }

            Opcode::SetTextStyle => {
                let style = arg(operands, 0);
                let styles: Vec<TextStyle> = if style == 0 {
                    vec![TextStyle::Normal]
                } else {
                    STYLE_BITS
                        .iter()
                        .filter(|(bit, _)| style & bit != 0)
                        .map(|(_, s)| *s)
                        .collect()
                };
                let windows = [self.screen.main_window, self.screen.upper_window];
                for window in windows.into_iter().flatten() {
                    for s in &styles {
                        self.display.set_style(window, *s)?;
                    }
                }
                Ok(StepResult::Continue)
            }
            Opcode::BufferMode => {
                trace!("buffer_mode {} (no effect)", arg(operands, 0));
                Ok(StepResult::Continue)
            }
            Opcode::SetColour => {
                for (code, hint) in [
                    (arg(operands, 0), StyleHint::TextColour),
                    (arg(operands, 1), StyleHint::BackColour),
                ] {
                    match Colour::from_code(code) {
                        Some(colour) => self.apply_colour(colour, hint),
                        None => warn!("set_colour with unknown colour {}", code),
                    }
                }
                Ok(StepResult::Continue)
            }
            Opcode::SetTrueColour => {
                self.apply_colour(
                    Colour::from_true_colour(arg(operands, 0)),
                    StyleHint::TextColour,
                );
                self.apply_colour(
                    Colour::from_true_colour(arg(operands, 1)),
                    StyleHint::BackColour,
                );
                Ok(StepResult::Continue)
            }

            Opcode::ShowStatus => {
                if self.vm.version() <= 3 {
                    self.draw_status_line()?;
                }
                Ok(StepResult::Continue)
            }
            Opcode::PrintTable => {
                let height = if operands.len() > 2 {
                    arg(operands, 2)
                } else {
                    1
                };
                self.print_table(arg(operands, 0) as u32, arg(operands, 1), height, arg(operands, 3))?;
                Ok(StepResult::Continue)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }

    /// Give the upper window `rows` rows, opening or closing it as needed
    fn resize_upper(&mut self, rows: u16) -> Result<(), VmError> {
        debug!("Upper window resized to {} rows", rows);
        if rows == 0 {
            if let Some(upper) = self.screen.upper_window.take() {
                self.display.close_window(upper)?;
            }
        } else if let Some(upper) = self.screen.upper_window {
            self.display.set_window_rows(upper, rows)?;
            if self.vm.version() <= 3 {
                self.display.clear_window(upper)?;
            }
        } else {
            let main = self.main_window()?;
            self.screen.upper_window = self.display.open_window(
                Some(main),
                Placement::Above { rows },
                WindowKind::TextGrid,
            )?;
            if self.screen.upper_window.is_none() {
                warn!("Display refused to open the upper window");
            }
        }
        self.screen.upper_current_height = rows;
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), VmError> {
        debug!("erase_window {}", window);
        let main = self.screen.main_window;
        match window {
            0 => {}
            -1 => {
                self.resize_upper(0)?;
                self.screen.upper_target_height = 0;
                self.screen.upper_initial_height = 0;
                self.screen.current_window = 0;
            }
            _ => {
                if let Some(upper) = self.screen.upper_window {
                    self.display.clear_window(upper)?;
                    self.display.move_cursor(upper, 0, 0)?;
                }
            }
        }
        if matches!(window, 0 | -1 | -2) {
            if let Some(main) = main {
                self.display.clear_window(main)?;
            }
        }
        Ok(())
    }

    /// Set or clear a colour style hint on both window kinds
    fn apply_colour(&mut self, colour: Colour, hint: StyleHint) {
        let value = match colour {
            Colour::Current => return,
            Colour::Default => None,
            Colour::Rgb(rgb) => Some(rgb),
        };
        for kind in [WindowKind::TextBuffer, WindowKind::TextGrid] {
            match value {
                Some(rgb) => self.display.set_style_hint(kind, hint, rgb),
                None => self.display.clear_style_hint(kind, hint),
            }
        }
        match hint {
            StyleHint::BackColour => self.screen.background = value,
            _ => self.screen.foreground = value,
        }
    }

    /// Print a `width` by `height` block of ZSCII, skipping `skip` bytes
    /// after each row
    fn print_table(&mut self, addr: u32, width: u16, height: u16, skip: u16) -> Result<(), VmError> {
        let upper = self.screen.upper_selected();
        let (x, y) = upper.map(|w| self.display.cursor(w)).unwrap_or((0, 0));
        let mut at = addr;
        for row in 0..height {
            if row > 0 {
                match upper {
                    Some(w) => self.display.move_cursor(w, x, y + row)?,
                    None => self.output_text("\n")?,
                }
            }
            for _ in 0..width {
                let code = self.vm.game.read_byte(at);
                self.output_zscii(code as u16)?;
                at += 1;
            }
            at += skip as u32;
        }
        Ok(())
    }

    /// Draw the v1-3 status line: location on the left, score and turns
    /// (or the time) on the right
    pub(crate) fn draw_status_line(&mut self) -> Result<(), VmError> {
        if self.screen.upper_window.is_none() {
            self.resize_upper(1)?;
        }
        let Some(upper) = self.screen.upper_window else {
            return Ok(());
        };

        let location = self.vm.read_variable(0x10)?;
        let first = self.vm.read_variable(0x11)?;
        let second = self.vm.read_variable(0x12)?;
        let time_game = self.vm.game.read_byte(0x01) & FLAGS1_TIME_GAME != 0;
        let name = self.object_name(location)?;
        let score = status_score(self.vm.version(), time_game, first, second);
        let (width, _) = self.display.window_size(upper);
        let line = status_line(&name, &score, width as usize);
        trace!("Status line {:?}", line);

        self.display.move_cursor(upper, 0, 0)?;
        self.display.set_style(upper, TextStyle::Reverse)?;
        self.display.put_str(upper, &line)?;
        self.display.set_style(upper, TextStyle::Normal)?;
        Ok(())
    }

    /// Apply a deferred upper window shrink once input has been read
    pub(crate) fn post_input(&mut self) -> Result<(), VmError> {
        if self.screen.upper_current_height != self.screen.upper_target_height {
            self.resize_upper(self.screen.upper_target_height)?;
        }
        self.screen.upper_initial_height = self.screen.upper_current_height;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_trait::Key;
    use crate::test_utils::{interpreter, StoryBuilder, SCRATCH};
    use test_log::test;

    fn steps(interp: &mut Interpreter, n: usize) {
        for _ in 0..n {
            interp.step().unwrap();
        }
    }

    #[test]
    fn test_split_grows_now_and_shrinks_after_input() {
        let mut story = StoryBuilder::new(5);
        // split_window #3; split_window #1; read_char #1 -> G00; quit
        story.code(&[0xea, 0x7f, 3, 0xea, 0x7f, 1, 0xf6, 0x7f, 1, 0x10, 0xba]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 1);
        assert_eq!(handle.grid_rows(), 3);
        steps(&mut interp, 1);
        assert_eq!(handle.grid_rows(), 3);
        assert_eq!(interp.screen.upper_target_height, 1);

        handle.push_key(Key::Char('a'));
        interp.run().unwrap();
        assert_eq!(handle.grid_rows(), 1);
        assert_eq!(interp.screen.upper_initial_height, 1);
    }

    #[test]
    fn test_v3_split_resizes_immediately() {
        let mut story = StoryBuilder::new(3);
        // split_window #3; split_window #1; split_window #0
        story.code(&[0xea, 0x7f, 3, 0xea, 0x7f, 1, 0xea, 0x7f, 0]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 2);
        assert_eq!(handle.grid_rows(), 1);
        steps(&mut interp, 1);
        assert_eq!(handle.grid_window_count(), 0);
    }

    #[test]
    fn test_set_cursor_negative_row_lands_below_window() {
        let mut story = StoryBuilder::new(5);
        let array = (SCRATCH as u16).to_be_bytes();
        // split_window #3; set_window #1; set_cursor #-1 #3; get_cursor array
        story.code(&[
            0xea, 0x7f, 3, 0xeb, 0x7f, 1, 0xef, 0x1f, 0xff, 0xff, 3, 0xf0, 0x3f, array[0],
            array[1],
        ]);
        let (mut interp, _) = interpreter(&story);
        steps(&mut interp, 4);
        // row 3 - (-1) = 4, one past the bottom row of a 3-row window
        assert_eq!(interp.vm.game.read_word(SCRATCH as u32), 5);
        assert_eq!(interp.vm.game.read_word(SCRATCH as u32 + 2), 3);
    }

    #[test]
    fn test_set_cursor_in_main_window_is_ignored() {
        let mut story = StoryBuilder::new(5);
        // split_window #2; set_cursor #2 #2
        story.code(&[0xea, 0x7f, 2, 0xef, 0x5f, 2, 2]);
        let (mut interp, _) = interpreter(&story);
        steps(&mut interp, 2);
        let upper = interp.screen.upper_window.unwrap();
        assert_eq!(interp.display.cursor(upper), (0, 0));
    }

    #[test]
    fn test_print_in_upper_window_and_erase_line() {
        let mut story = StoryBuilder::new(5);
        // split_window #2; set_window #1; print "abc"; set_cursor #1 #2; erase_line #1
        story.code(&[
            0xea, 0x7f, 2, 0xeb, 0x7f, 1, 0xb2, 0x98, 0xe8, 0xef, 0x5f, 1, 2, 0xee, 0x7f, 1,
        ]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 4);
        assert_eq!(handle.grid_lines()[0], "abc");
        steps(&mut interp, 1);
        assert_eq!(handle.grid_lines()[0], "a");
        let upper = interp.screen.upper_window.unwrap();
        assert_eq!(interp.display.cursor(upper), (1, 0));
        assert_eq!(handle.main_text(), "");
    }

    #[test]
    fn test_erase_window_minus_one_unsplits() {
        let mut story = StoryBuilder::new(5);
        // split_window #2; set_window #1; erase_window #-1
        story.code(&[0xea, 0x7f, 2, 0xeb, 0x7f, 1, 0xed, 0x3f, 0xff, 0xff]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 3);
        assert_eq!(handle.grid_window_count(), 0);
        assert_eq!(interp.screen.current_window, 0);
        assert_eq!(interp.screen.upper_current_height, 0);
        assert_eq!(interp.screen.output_window(), interp.screen.main_window);
    }

    #[test]
    fn test_text_style_bits() {
        let mut story = StoryBuilder::new(5);
        // set_text_style #3; set_text_style #0
        story.code(&[0xf1, 0x7f, 3, 0xf1, 0x7f, 0]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 2);
        assert_eq!(
            handle.styles(),
            vec![TextStyle::Reverse, TextStyle::Bold, TextStyle::Normal]
        );
    }

    #[test]
    fn test_set_colour_hints() {
        let mut story = StoryBuilder::new(5);
        // set_colour #3 #16; set_colour #1 #0
        story.code(&[0x1b, 3, 16, 0x1b, 1, 0]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 1);
        assert_eq!(
            handle.style_hint(WindowKind::TextBuffer, StyleHint::TextColour),
            Some(0xe80000)
        );
        assert_eq!(
            handle.style_hint(WindowKind::TextGrid, StyleHint::BackColour),
            None
        );
        assert_eq!(interp.screen.foreground, Some(0xe80000));
        steps(&mut interp, 1);
        assert_eq!(
            handle.style_hint(WindowKind::TextGrid, StyleHint::TextColour),
            None
        );
        assert_eq!(interp.screen.foreground, None);
    }

    #[test]
    fn test_set_true_colour() {
        let mut story = StoryBuilder::new(5);
        // set_true_colour #0x001f #-2
        story.code(&[0xbe, 0x0d, 0x0f, 0x00, 0x1f, 0xff, 0xfe]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 1);
        assert_eq!(
            handle.style_hint(WindowKind::TextBuffer, StyleHint::TextColour),
            Some(0xf80000)
        );
        assert_eq!(interp.screen.background, None);
    }

    #[test]
    fn test_print_table_rows() {
        let mut story = StoryBuilder::new(5);
        story.bytes(SCRATCH, b"abXcdX");
        let table = (SCRATCH as u16).to_be_bytes();
        // print_table table #2 #2 #1
        story.code(&[0xfe, 0x15, table[0], table[1], 2, 2, 1]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 1);
        assert_eq!(handle.main_text(), "ab\ncd");
    }

    #[test]
    fn test_print_table_in_upper_window_keeps_column() {
        let mut story = StoryBuilder::new(5);
        story.bytes(SCRATCH, b"abcd");
        let table = (SCRATCH as u16).to_be_bytes();
        // split_window #3; set_window #1; set_cursor #1 #3; print_table table #2 #2
        story.code(&[
            0xea, 0x7f, 3, 0xeb, 0x7f, 1, 0xef, 0x5f, 1, 3, 0xfe, 0x17, table[0], table[1], 2, 2,
        ]);
        let (mut interp, handle) = interpreter(&story);
        steps(&mut interp, 4);
        assert_eq!(handle.grid_lines()[..2], ["  ab".to_string(), "  cd".to_string()]);
    }

    #[test]
    fn test_status_line_shows_location_and_score() {
        let mut story = StoryBuilder::new(3);
        story.object(1, 0, 0, 0).properties_named(1, "cellar", &[]);
        story.global(0, 1).global(1, 10).global(2, 0xfffe);
        // show_status; quit
        story.code(&[0xbc, 0xba]);
        let (mut interp, handle) = interpreter(&story);
        interp.run().unwrap();
        let expected = status_line("cellar", " 10/-2", 40);
        assert_eq!(handle.grid_lines()[0], expected);
        assert_eq!(handle.grid_rows(), 1);
    }

    #[test]
    fn test_status_line_time_game() {
        let mut story = StoryBuilder::new(3);
        story.bytes(0x01, &[FLAGS1_TIME_GAME]);
        story.global(1, 14).global(2, 5);
        story.code(&[0xbc, 0xba]);
        let (mut interp, handle) = interpreter(&story);
        interp.run().unwrap();
        assert!(handle.grid_lines()[0].ends_with(" 14:05"));
    }
}
