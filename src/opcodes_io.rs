/// Text output and input operations for Z-Machine interpreter
///
/// This module handles:
/// - Printing (print, print_ret, new_line, print_char, print_num, print_addr,
///   print_paddr, print_obj, print_unicode, check_unicode)
/// - Line and character input (sread/aread, read_char) including timed input
/// - Lexical analysis (tokenise, encode_text)
/// - Output stream selection (output_stream) and the transcript file
///
/// Input instructions run in two halves. The first execution makes the
/// display request, records a [`PendingInput`] and leaves the PC on the
/// instruction; once `wait_for_input` has attached an event the instruction
/// is executed again with the same operands and completes.
use crate::dictionary::{self, TextBuffer};
use crate::display_trait::{FileUsage, WindowId};
use crate::error::VmError;
use crate::header::FLAGS2_TRANSCRIPT;
use crate::instruction::Instruction;
use crate::interpreter::{
    arg, InputEvent, InputKind, InputState, Interpreter, PendingInput, StepResult,
};
use crate::opcode_tables::Opcode;
use log::{debug, info, warn};
use std::io::Write;

impl Interpreter {
    /// Handle text output, input and stream opcodes
    pub fn execute_io_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        match inst.opcode {
            Opcode::Print => {
                if let Some(text) = &inst.text {
                    self.output_text(text)?;
                }
                Ok(StepResult::Continue)
            }
            Opcode::PrintRet => {
                if let Some(text) = &inst.text {
                    self.output_text(text)?;
                }
                self.output_text("\n")?;
                self.do_return(1)
            }
            Opcode::NewLine => {
                self.output_text("\n")?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintChar => {
                self.output_zscii(arg(operands, 0))?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintNum => {
                let value = arg(operands, 0) as i16;
                self.output_text(&value.to_string())?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintAddr => {
                let addr = arg(operands, 0) as usize;
                let (text, _) = self.codec.decode_string(&self.vm.game.memory, addr)?;
                self.output_text(&text)?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintPaddr => {
                let addr = self.vm.game.header.unpack_string(arg(operands, 0)) as usize;
                let (text, _) = self.codec.decode_string(&self.vm.game.memory, addr)?;
                self.output_text(&text)?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintObj => {
                let name = self.object_name(arg(operands, 0))?;
                self.output_text(&name)?;
                Ok(StepResult::Continue)
            }
            Opcode::PrintUnicode => {
                match char::from_u32(arg(operands, 0) as u32) {
                    Some(ch) => {
                        let mut buf = [0u8; 4];
                        self.output_text(ch.encode_utf8(&mut buf))?;
                    }
                    None => warn!("print_unicode of invalid character {}", arg(operands, 0)),
                }
                Ok(StepResult::Continue)
            }
            Opcode::CheckUnicode => {
                let (output, input) = match char::from_u32(arg(operands, 0) as u32) {
                    Some(ch) => self.display.supports_unicode(ch),
                    None => (false, false),
                };
                self.store(inst, output as u16 | (input as u16) << 1)?;
                Ok(StepResult::Continue)
            }

            Opcode::Sread => self.execute_read_line(inst, operands),
            Opcode::ReadChar => self.execute_read_char(inst, operands),

            Opcode::Tokenise => {
                let text = arg(operands, 0) as u32;
                let parse = arg(operands, 1) as u32;
                let dictionary = match arg(operands, 2) {
                    0 => self.vm.game.header.dictionary as u32,
                    addr => addr as u32,
                };
                let buffer = self.typed_text(text);
                dictionary::tokenise(
                    &mut self.vm.game,
                    &self.codec,
                    buffer,
                    parse,
                    dictionary,
                    arg(operands, 3) != 0,
                )?;
                Ok(StepResult::Continue)
            }
            Opcode::EncodeText => {
                let text = arg(operands, 0) as u32;
                let length = arg(operands, 1) as u32;
                let from = arg(operands, 2) as u32;
                let coded = arg(operands, 3) as u32;
                let bytes: Vec<u8> = (0..length)
                    .map(|i| self.vm.game.read_byte(text + from + i))
                    .collect();
                for (i, word) in self.codec.encode_word(&bytes).into_iter().enumerate() {
                    self.vm.game.write_word(coded + 2 * i as u32, word)?;
                }
                Ok(StepResult::Continue)
            }

            Opcode::OutputStream => {
                self.select_output_stream(arg(operands, 0) as i16, arg(operands, 1))?;
                Ok(StepResult::Continue)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }

    /// Where the typed characters of a text buffer are
    fn typed_text(&self, text: u32) -> TextBuffer {
        let game = &self.vm.game;
        if self.vm.version() < 5 {
            let start = text + 1;
            let len = (0..game.read_byte(text) as u32)
                .take_while(|&i| game.read_byte(start + i) != 0)
                .count();
            TextBuffer {
                base: text,
                start,
                len,
            }
        } else {
            TextBuffer {
                base: text,
                start: text + 2,
                len: game.read_byte(text + 1) as usize,
            }
        }
    }

    /// Whether the instruction at `inst` has made its request, and what it
    /// has been given
    fn input_state(&mut self, inst: &Instruction) -> Result<InputState, VmError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(InputState::Fresh);
        };
        if pending.addr != inst.addr {
            return Err(VmError::Unsupported {
                name: "input inside a timed-input routine",
                pc: inst.addr,
            });
        }
        match pending.ready.take() {
            Some(event) => {
                self.pending = None;
                Ok(InputState::Ready(event))
            }
            None => Ok(InputState::Waiting),
        }
    }

    /// Park the PC on an input instruction until its event arrives
    fn await_input(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
        kind: InputKind,
        window: WindowId,
        routine: Option<u16>,
    ) -> StepResult {
        self.pending = Some(PendingInput {
            addr: inst.addr,
            operands: operands.to_vec(),
            kind,
            window,
            routine,
            ready: None,
        });
        self.vm.pc = inst.addr;
        StepResult::AwaitingInput
    }

    /// Timed-input routine for `time` tenths of a second, if both are given
    fn start_timer(&mut self, time: u16, routine: u16) -> Option<u16> {
        if self.vm.version() < 4 || time == 0 || routine == 0 {
            return None;
        }
        debug!("Timed input every {} ms via 0x{:04x}", time as u32 * 100, routine);
        self.display.request_timer_events(time as u32 * 100);
        Some(routine)
    }

    /// sread / aread
    fn execute_read_line(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        let version = self.vm.version();
        let text = arg(operands, 0) as u32;
        let capacity = self.vm.game.read_byte(text) as usize;
        let max = if version < 5 {
            capacity.saturating_sub(1)
        } else {
            capacity
        };

        let (typed, terminator) = match self.input_state(inst)? {
            InputState::Fresh => {
                if version <= 3 {
                    self.draw_status_line()?;
                }
                let window = self.main_window()?;
                self.display.request_line_event(window, max)?;
                let routine = self.start_timer(arg(operands, 2), arg(operands, 3));
                return Ok(self.await_input(inst, operands, InputKind::Line, window, routine));
            }
            InputState::Waiting => {
                self.vm.pc = inst.addr;
                return Ok(StepResult::AwaitingInput);
            }
            InputState::Ready(InputEvent::Line { text, terminator }) => (text, terminator),
            InputState::Ready(other) => {
                return Err(VmError::Display(format!(
                    "Line input completed with {:?}",
                    other
                )))
            }
        };
        self.display.request_timer_events(0);

        let codes: Vec<u8> = typed
            .to_lowercase()
            .chars()
            .filter_map(|ch| self.codec.char_to_zscii(ch))
            .map(|code| code as u8)
            .take(max)
            .collect();
        debug!("Read {:?} (terminator {})", typed, terminator);

        let start = if version < 5 { text + 1 } else { text + 2 };
        for (i, code) in codes.iter().enumerate() {
            self.vm.game.write_byte(start + i as u32, *code)?;
        }
        if version < 5 {
            self.vm.game.write_byte(start + codes.len() as u32, 0)?;
        } else {
            self.vm.game.write_byte(text + 1, codes.len() as u8)?;
        }

        self.sync_transcript()?;
        self.screen.transcribe(&typed)?;
        self.screen.transcribe("\n")?;

        let parse = arg(operands, 1) as u32;
        if parse != 0 {
            let buffer = TextBuffer {
                base: text,
                start,
                len: codes.len(),
            };
            let dictionary = self.vm.game.header.dictionary as u32;
            dictionary::tokenise(&mut self.vm.game, &self.codec, buffer, parse, dictionary, false)?;
        }

        if version > 3 {
            self.post_input()?;
        }
        self.store(inst, terminator)?;
        Ok(StepResult::Continue)
    }

    /// read_char 1 [time routine]
    fn execute_read_char(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        let code = match self.input_state(inst)? {
            InputState::Fresh => {
                let window = self.main_window()?;
                self.display.request_char_event(window)?;
                let routine = self.start_timer(arg(operands, 1), arg(operands, 2));
                return Ok(self.await_input(inst, operands, InputKind::Char, window, routine));
            }
            InputState::Waiting => {
                self.vm.pc = inst.addr;
                return Ok(StepResult::AwaitingInput);
            }
            InputState::Ready(InputEvent::Char(code)) => code,
            InputState::Ready(other) => {
                return Err(VmError::Display(format!(
                    "Character input completed with {:?}",
                    other
                )))
            }
        };
        self.display.request_timer_events(0);
        debug!("read_char -> {}", code);
        self.post_input()?;
        self.store(inst, code)?;
        Ok(StepResult::Continue)
    }

    /// output_stream n [table]
    fn select_output_stream(&mut self, stream: i16, table: u16) -> Result<(), VmError> {
        debug!("output_stream {} 0x{:04x}", stream, table);
        match stream {
            0 => {}
            1 => self.screen.screen_output = true,
            -1 => self.screen.screen_output = false,
            2 | -2 => {
                let flags2 = self.vm.game.read_word(0x10);
                let flags2 = if stream > 0 {
                    flags2 | FLAGS2_TRANSCRIPT
                } else {
                    flags2 & !FLAGS2_TRANSCRIPT
                };
                self.vm.game.write_word(0x10, flags2)?;
                self.sync_transcript()?;
            }
            3 => self.screen.push_stream3(table as u32)?,
            -3 => self.screen.pop_stream3(&mut self.vm.game)?,
            other => warn!("output_stream {} is not supported", other),
        }
        Ok(())
    }

    /// Open or close the transcript to match flags 2 bit 0, which the
    /// story may also change directly
    pub(crate) fn sync_transcript(&mut self) -> Result<(), VmError> {
        let wanted = self.vm.game.read_word(0x10) & FLAGS2_TRANSCRIPT != 0;
        if wanted == self.screen.transcript.is_some() {
            return Ok(());
        }
        if !wanted {
            if let Some(mut transcript) = self.screen.transcript.take() {
                transcript.flush()?;
            }
            info!("Transcript closed");
            return Ok(());
        }

        let file = self
            .display
            .file_by_name(FileUsage::Transcript, &self.config.transcript_name);
        match self.display.open_writer(&file) {
            Ok(writer) => {
                info!("Transcript started in {}", file.name);
                self.screen.transcript = Some(writer);
            }
            Err(e) => {
                warn!("Cannot open transcript {}: {}", file.name, e);
                let flags2 = self.vm.game.read_word(0x10) & !FLAGS2_TRANSCRIPT;
                self.vm.game.write_word(0x10, flags2)?;
            }
        }
        Ok(())
    }
}
