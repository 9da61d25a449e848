//! Fetch-decode-execute loop
//!
//! [`Interpreter`] owns the machine (`vm`), the text codec, screen and
//! stream state, the random generator, the undo ring and the display.
//! Each opcode family lives in its own `opcodes_*` module as a further
//! `impl Interpreter` block; [`Interpreter::execute_instruction`] is the one
//! place that routes a decoded [`Opcode`] to its family.

use crate::config::InterpreterConfig;
use crate::display_trait::{Event, Placement, WindowId, WindowKind, ZMachineDisplay};
use crate::error::VmError;
use crate::game::Game;
use crate::header::{FLAGS1_NO_STATUS_LINE, FLAGS1_SPLIT_AVAILABLE, FLAGS1_V4_CAPABILITIES};
use crate::instruction::{BranchInfo, Instruction, OperandType};
use crate::opcode_tables::Opcode;
use crate::screen::ScreenState;
use crate::snapshot::UndoRing;
use crate::text::{ZsciiCodec, ZSCII_NEWLINE};
use crate::vm::VM;
use crate::zrand::ZRand;
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flags 2 bits the interpreter clears: pictures, mouse, sound, menus
const FLAGS2_UNSUPPORTED: u16 = 0x0008 | 0x0020 | 0x0080 | 0x0100;
/// Flags 2 bit: story wants undo
const FLAGS2_UNDO: u16 = 0x0010;

/// What a single step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Next instruction follows this one
    Continue,
    /// Control moved elsewhere (jump, taken branch, call or return)
    Yield,
    /// An input instruction is waiting on the display; PC still points at it
    AwaitingInput,
    /// The story has finished
    Quit,
}

/// Why `run` handed control back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Quit,
    /// Waiting for input that has not arrived (cancelled or no more input)
    Suspended,
}

/// Result of waiting on the display for pending input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// Input arrived (or nothing was pending); the instruction can complete
    Ready,
    /// Cancelled or the display has no more input
    Suspended,
    /// A timed-input routine quit the story
    Quit,
}

/// Kind of input an instruction is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputKind {
    Line,
    Char,
}

/// Input delivered to a waiting instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputEvent {
    /// Typed text and the ZSCII code that ended it (13, or 0 on timeout)
    Line { text: String, terminator: u16 },
    /// ZSCII code of the key, 0 on timeout
    Char(u16),
}

/// An input instruction that has made its display request
#[derive(Debug, Clone)]
pub(crate) struct PendingInput {
    /// Address of the instruction
    pub addr: u32,
    /// Operands as resolved the first time round
    pub operands: Vec<u16>,
    pub kind: InputKind,
    pub window: WindowId,
    /// Packed address of the timed-input routine
    pub routine: Option<u16>,
    pub ready: Option<InputEvent>,
}

/// Where an input instruction stands
pub(crate) enum InputState {
    /// No request made yet
    Fresh,
    /// Requested, nothing delivered yet
    Waiting,
    Ready(InputEvent),
}

/// Operand `n`, or 0 when it was omitted
pub(crate) fn arg(operands: &[u16], n: usize) -> u16 {
    operands.get(n).copied().unwrap_or(0)
}

/// The main Z-Machine interpreter
pub struct Interpreter {
    /// Memory, PC and call stack
    pub vm: VM,
    pub codec: ZsciiCodec,
    pub screen: ScreenState,
    pub rng: ZRand,
    pub undo: UndoRing,
    pub display: Box<dyn ZMachineDisplay>,
    pub config: InterpreterConfig,
    cancel: Arc<AtomicBool>,
    pub(crate) pending: Option<PendingInput>,
    instruction_count: u64,
}

impl Interpreter {
    /// Create an interpreter for a loaded story, opening the main window
    pub fn new(
        game: Game,
        display: Box<dyn ZMachineDisplay>,
        config: InterpreterConfig,
    ) -> Result<Self, VmError> {
        let codec = ZsciiCodec::new(&game.memory, &game.header);
        let rng = match config.random_seed {
            Some(seed) => ZRand::new_predictable(seed),
            None => ZRand::new_uniform(),
        };
        let mut interpreter = Interpreter {
            vm: VM::new(game),
            codec,
            screen: ScreenState::new(),
            rng,
            undo: UndoRing::new(config.undo_slots),
            display,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            pending: None,
            instruction_count: 0,
        };

        interpreter.screen.main_window =
            interpreter
                .display
                .open_window(None, Placement::Root, WindowKind::TextBuffer)?;
        if interpreter.screen.main_window.is_none() {
            warn!("Display refused to open the main window; screen output is lost");
        }
        interpreter.write_header_fields()?;
        info!(
            "Interpreter ready: v{} story, PC=0x{:05x}, {} undo slots",
            interpreter.vm.version(),
            interpreter.vm.pc,
            interpreter.undo.capacity()
        );
        Ok(interpreter)
    }

    /// Flag that makes a blocked input wait hand control back to the host
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Share a cancel flag with the display or a signal handler
    pub fn with_cancel_handle(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Instructions executed so far
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Fill in the interpreter's part of the header
    pub(crate) fn write_header_fields(&mut self) -> Result<(), VmError> {
        let version = self.vm.version();
        let (width, height) = self.display.screen_size();
        let number = self.config.interpreter_number;
        let revision = u8::try_from(self.config.interpreter_version).unwrap_or(b'A');
        let undo_available = self.undo.capacity() > 0;
        let game = &mut self.vm.game;

        let mut flags1 = game.read_byte(0x01);
        if version <= 3 {
            flags1 = (flags1 & !FLAGS1_NO_STATUS_LINE) | FLAGS1_SPLIT_AVAILABLE;
        } else {
            flags1 |= FLAGS1_V4_CAPABILITIES;
        }
        game.write_byte(0x01, flags1)?;

        if version >= 4 {
            game.write_byte(0x1e, number)?;
            game.write_byte(0x1f, revision)?;
            game.write_byte(0x20, height.min(255) as u8)?;
            game.write_byte(0x21, width.min(255) as u8)?;
        }
        if version >= 5 {
            // one unit per character
            game.write_word(0x22, width)?;
            game.write_word(0x24, height)?;
            game.write_byte(0x26, 1)?;
            game.write_byte(0x27, 1)?;

            let mut flags2 = game.read_word(0x10) & !FLAGS2_UNSUPPORTED;
            if !undo_available {
                flags2 &= !FLAGS2_UNDO;
            }
            game.write_word(0x10, flags2)?;
        }
        // standard revision 1.1
        game.write_byte(0x32, 1)?;
        game.write_byte(0x33, 1)?;
        Ok(())
    }

    /// Execute one instruction
    pub fn step(&mut self) -> Result<StepResult, VmError> {
        let pc = self.vm.pc;
        let inst = Instruction::decode(
            &self.vm.game.memory,
            pc as usize,
            self.vm.version(),
            &self.codec,
        )?;
        trace!("{}", inst);

        let operands = match self.pending.as_ref() {
            Some(pending) if pending.addr == pc => pending.operands.clone(),
            _ => self.resolve_operands(&inst).map_err(|e| e.at_pc(pc))?,
        };
        self.vm.pc = inst.next_pc();
        self.instruction_count += 1;
        self.execute_instruction(&inst, &operands)
            .map_err(|e| e.at_pc(pc))
    }

    /// Run until the story quits or input cannot be obtained
    pub fn run(&mut self) -> Result<RunOutcome, VmError> {
        loop {
            match self.step()? {
                StepResult::Continue | StepResult::Yield => {}
                StepResult::AwaitingInput => match self.wait_for_input()? {
                    InputStatus::Ready => {}
                    InputStatus::Suspended => {
                        debug!("Run suspended at PC 0x{:05x}", self.vm.pc);
                        return Ok(RunOutcome::Suspended);
                    }
                    InputStatus::Quit => return Ok(RunOutcome::Quit),
                },
                StepResult::Quit => {
                    info!(
                        "Story quit after {} instructions",
                        self.instruction_count
                    );
                    return Ok(RunOutcome::Quit);
                }
            }
        }
    }

    /// Block on the display until the pending input instruction can finish.
    /// Timer events run the timed-input routine; a true result ends the
    /// input early.
    pub fn wait_for_input(&mut self) -> Result<InputStatus, VmError> {
        loop {
            let Some(pending) = self.pending.as_ref() else {
                return Ok(InputStatus::Ready);
            };
            if pending.ready.is_some() {
                return Ok(InputStatus::Ready);
            }
            if self.cancel.load(Ordering::SeqCst) {
                debug!("Input wait cancelled");
                return Ok(InputStatus::Suspended);
            }
            let (kind, window, routine) = (pending.kind, pending.window, pending.routine);

            let ready = match self.display.select()? {
                Event::LineInput { text, .. } if kind == InputKind::Line => {
                    Some(InputEvent::Line {
                        text,
                        terminator: ZSCII_NEWLINE,
                    })
                }
                Event::CharInput { key, .. } if kind == InputKind::Char => {
                    Some(InputEvent::Char(self.codec.key_to_zscii(key)))
                }
                Event::Timer => match routine {
                    Some(routine) => match self.run_interrupt_routine(routine)? {
                        None => return Ok(InputStatus::Quit),
                        Some(0) => None,
                        Some(_) => {
                            debug!("Timed input ended by its routine");
                            Some(match kind {
                                InputKind::Line => InputEvent::Line {
                                    text: self.display.cancel_line_event(window)?,
                                    terminator: 0,
                                },
                                InputKind::Char => {
                                    self.display.cancel_char_event(window)?;
                                    InputEvent::Char(0)
                                }
                            })
                        }
                    },
                    None => None,
                },
                Event::None => return Ok(InputStatus::Suspended),
                other => {
                    trace!("Ignoring event {:?} while waiting for {:?}", other, kind);
                    None
                }
            };
            if let (Some(event), Some(pending)) = (ready, self.pending.as_mut()) {
                pending.ready = Some(event);
            }
        }
    }

    /// Call a routine from inside an input wait and run it to completion.
    /// `None` when the routine quit the story.
    pub(crate) fn run_interrupt_routine(&mut self, packed: u16) -> Result<Option<u16>, VmError> {
        debug!("Calling timed-input routine 0x{:04x}", packed);
        let saved_pc = self.vm.pc;
        let depth = self.vm.frames.len();
        let addr = self.vm.game.header.unpack_routine(packed);
        self.vm.enter_routine(addr, &[], Some(0))?;

        while self.vm.frames.len() > depth {
            match self.step()? {
                StepResult::Quit => return Ok(None),
                StepResult::AwaitingInput => {
                    return Err(VmError::Unsupported {
                        name: "input inside a timed-input routine",
                        pc: self.vm.pc,
                    })
                }
                StepResult::Continue | StepResult::Yield => {}
            }
        }

        let value = self.vm.pop()?;
        self.vm.pc = saved_pc;
        debug!("Timed-input routine returned {}", value);
        Ok(Some(value))
    }

    /// Evaluate operands in order; variable operands are read (and the
    /// stack popped) here
    pub fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>, VmError> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for (op_type, raw) in inst.operand_types.iter().zip(&inst.operands) {
            let value = match op_type {
                OperandType::LargeConstant | OperandType::SmallConstant => *raw,
                OperandType::Variable => self.vm.read_variable(*raw as u8)?,
                OperandType::Omitted => continue,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Route a decoded instruction to its opcode family
    pub fn execute_instruction(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        use Opcode::*;
        let version = self.vm.version();
        match inst.opcode {
            op if !op.is_supported(version) => Err(VmError::Unsupported {
                name: op.name(),
                pc: inst.addr,
            }),

            Add | Sub | Mul | Div | Mod | Or | And | Not | LogShift | ArtShift | Je | Jl | Jg
            | Jz | Test | Random => self.execute_math_op(inst, operands),

            Load | Store | Loadw | Loadb | Storew | Storeb | Inc | Dec | IncChk | DecChk
            | ScanTable | CopyTable => self.execute_memory_op(inst, operands),

            CallVs | CallVs2 | Call1s | Call2s | CallVn | CallVn2 | Call1n | Call2n | Ret
            | Rtrue | Rfalse | RetPopped | Jump | Push | Pull | Pop | Catch | Throw
            | CheckArgCount => self.execute_stack_op(inst, operands),

            Jin | TestAttr | SetAttr | ClearAttr | InsertObj | RemoveObj | GetParent
            | GetSibling | GetChild | GetProp | GetPropAddr | GetPropLen | GetNextProp
            | PutProp => self.execute_object_op(inst, operands),

            Print | PrintRet | NewLine | PrintChar | PrintNum | PrintAddr | PrintPaddr
            | PrintObj | PrintUnicode | CheckUnicode | Sread | ReadChar | Tokenise
            | EncodeText | OutputStream => self.execute_io_op(inst, operands),

            SplitWindow | SetWindow | EraseWindow | EraseLine | SetCursor | GetCursor
            | SetTextStyle | BufferMode | SetColour | SetTrueColour | ShowStatus
            | PrintTable => self.execute_display_op(inst, operands),

            Save | Restore | Restart | SaveUndo | RestoreUndo | Quit | Verify | Piracy => {
                self.execute_state_op(inst, operands)
            }

            Nop => Ok(StepResult::Continue),

            op => Err(VmError::Unsupported {
                name: op.name(),
                pc: inst.addr,
            }),
        }
    }

    /// Write an instruction's result to its store variable
    pub(crate) fn store(&mut self, inst: &Instruction, value: u16) -> Result<(), VmError> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Take the branch if `condition` matches the instruction's polarity.
    /// Offsets 0 and 1 return false/true from the current routine.
    pub(crate) fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> Result<StepResult, VmError> {
        match inst.branch {
            Some(branch) => self.follow_branch(branch, condition),
            None => Ok(StepResult::Continue),
        }
    }

    /// Take `branch` if `condition` matches its sense; the PC must already
    /// be past the branch bytes
    pub(crate) fn follow_branch(
        &mut self,
        branch: BranchInfo,
        condition: bool,
    ) -> Result<StepResult, VmError> {
        if condition != branch.on_true {
            return Ok(StepResult::Continue);
        }
        match branch.offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            offset => {
                let new_pc = (self.vm.pc as i64 + offset as i64 - 2) as u32;
                trace!("Branch from 0x{:05x} to 0x{:05x}", self.vm.pc, new_pc);
                self.vm.pc = new_pc;
                Ok(StepResult::Yield)
            }
        }
    }

    /// Call a packed routine; address 0 stores 0 and calls nothing
    pub(crate) fn do_call(
        &mut self,
        packed: u16,
        args: &[u16],
        store: Option<u8>,
    ) -> Result<StepResult, VmError> {
        if packed == 0 {
            if let Some(var) = store {
                self.vm.write_variable(var, 0)?;
            }
            return Ok(StepResult::Continue);
        }
        let addr = self.vm.game.header.unpack_routine(packed);
        self.vm.enter_routine(addr, args, store)?;
        Ok(StepResult::Yield)
    }

    /// Return from the current routine; returning from the outermost frame
    /// ends the story
    pub(crate) fn do_return(&mut self, value: u16) -> Result<StepResult, VmError> {
        if self.vm.return_from_routine(value)? {
            Ok(StepResult::Yield)
        } else {
            Ok(StepResult::Quit)
        }
    }

    /// Send text down the selected output streams
    pub(crate) fn output_text(&mut self, text: &str) -> Result<(), VmError> {
        if self.screen.capturing() {
            for ch in text.chars() {
                let code = self.codec.char_to_zscii(ch).unwrap_or(b'?' as u16);
                self.screen.capture(&mut self.vm.game, code)?;
            }
            return Ok(());
        }
        if self.screen.screen_output {
            if let Some(window) = self.screen.output_window() {
                self.display.put_str(window, text)?;
            }
        }
        if self.screen.current_window == 0 {
            self.sync_transcript()?;
            self.screen.transcribe(text)?;
        }
        Ok(())
    }

    /// Output a single ZSCII code
    pub(crate) fn output_zscii(&mut self, code: u16) -> Result<(), VmError> {
        if self.screen.capturing() {
            return self.screen.capture(&mut self.vm.game, code);
        }
        match self.codec.zscii_to_char(code) {
            Some(ch) => {
                let mut buf = [0u8; 4];
                self.output_text(ch.encode_utf8(&mut buf))
            }
            None => Ok(()),
        }
    }

    /// The main window id, or a display error when there is none
    pub(crate) fn main_window(&self) -> Result<WindowId, VmError> {
        self.screen
            .main_window
            .ok_or_else(|| VmError::Display("No main window".to_string()))
    }
}
