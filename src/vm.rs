use crate::error::VmError;
use crate::game::Game;
use log::{debug, trace};

/// Maximum number of local variables per routine
pub const MAX_LOCALS: usize = 15;

/// One routine invocation on the call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Return address (PC to return to)
    pub return_pc: u32,
    /// Where to store the return value (None = discard, Some(n) = variable n)
    pub return_store: Option<u8>,
    /// Local variable values
    pub locals: Vec<u16>,
    /// Evaluation stack owned by this invocation
    pub stack: Vec<u16>,
    /// Bit n set when argument n+1 was supplied
    pub arg_mask: u8,
}

impl CallFrame {
    /// The outermost frame: no locals, nowhere to return to
    pub fn outermost() -> Self {
        CallFrame {
            return_pc: 0,
            return_store: None,
            locals: Vec::new(),
            stack: Vec::new(),
            arg_mask: 0,
        }
    }
}

/// Argument bitmask recorded for `check_arg_count`
pub fn arg_mask(argc: usize) -> u8 {
    127u8 >> (7 - argc.min(7))
}

/// Memory, program counter and call stack of a running story
pub struct VM {
    /// The story being executed
    pub game: Game,
    /// Program counter - next byte to fetch
    pub pc: u32,
    /// Call stack, outermost frame first
    pub frames: Vec<CallFrame>,
    globals_addr: u32,
}

impl VM {
    /// Create a new VM positioned at the story's entry point
    pub fn new(game: Game) -> Self {
        let globals_addr = game.header.global_variables as u32;
        let mut vm = VM {
            game,
            pc: 0,
            frames: Vec::new(),
            globals_addr,
        };
        vm.reset();
        vm
    }

    /// Reset the PC and call stack to the story's entry point.
    /// For v6 the entry is a packed routine whose locals live in the
    /// outermost frame.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frames.push(CallFrame::outermost());
        let initial = self.game.header.initial_pc;
        if self.game.version() == 6 {
            let addr = self.game.header.unpack_routine(initial);
            let locals = self.game.read_byte(addr) as usize;
            self.frames[0].locals = vec![0; locals.min(MAX_LOCALS)];
            self.pc = addr + 1;
        } else {
            self.pc = initial as u32;
        }
        debug!("VM reset, PC=0x{:05x}", self.pc);
    }

    pub fn version(&self) -> u8 {
        self.game.version()
    }

    /// Index of the current frame (used by catch/throw)
    pub fn frame_index(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    fn frame(&self) -> Result<&CallFrame, VmError> {
        self.frames
            .last()
            .ok_or(VmError::StackUnderflow { pc: self.pc })
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, VmError> {
        let pc = self.pc;
        self.frames.last_mut().ok_or(VmError::StackUnderflow { pc })
    }

    /// Push a value onto the current evaluation stack
    pub fn push(&mut self, value: u16) -> Result<(), VmError> {
        trace!("push 0x{:04x}", value);
        self.frame_mut()?.stack.push(value);
        Ok(())
    }

    /// Pop a value from the current evaluation stack
    pub fn pop(&mut self) -> Result<u16, VmError> {
        let pc = self.pc;
        self.frame_mut()?
            .stack
            .pop()
            .ok_or(VmError::StackUnderflow { pc })
    }

    /// Top of the current evaluation stack
    pub fn peek(&self) -> Result<u16, VmError> {
        self.frame()?
            .stack
            .last()
            .copied()
            .ok_or(VmError::StackUnderflow { pc: self.pc })
    }

    fn global_addr(&self, var: u8) -> u32 {
        self.globals_addr + 2 * (var as u32 - 0x10)
    }

    fn local_slot(&mut self, var: u8) -> Result<&mut u16, VmError> {
        let pc = self.pc;
        let frame = self.frame_mut()?;
        frame
            .locals
            .get_mut(var as usize - 1)
            .ok_or_else(|| VmError::Memory(format!("Local {} out of range at PC 0x{:05x}", var, pc)))
    }

    /// Read a variable (0x00 = pop, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn read_variable(&mut self, var: u8) -> Result<u16, VmError> {
        match var {
            0x00 => self.pop(),
            0x01..=0x0f => Ok(*self.local_slot(var)?),
            _ => Ok(self.game.read_word(self.global_addr(var))),
        }
    }

    /// Write a variable (0x00 = push, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn write_variable(&mut self, var: u8, value: u16) -> Result<(), VmError> {
        match var {
            0x00 => self.push(value),
            0x01..=0x0f => {
                *self.local_slot(var)? = value;
                Ok(())
            }
            _ => {
                let addr = self.global_addr(var);
                self.game.write_word(addr, value)
            }
        }
    }

    /// Read a variable named indirectly by an operand: variable 0 is the top
    /// of stack, left in place
    pub fn peek_variable(&mut self, var: u8) -> Result<u16, VmError> {
        match var {
            0x00 => self.peek(),
            _ => self.read_variable(var),
        }
    }

    /// Write a variable named indirectly by an operand: variable 0 replaces
    /// the top of stack instead of pushing
    pub fn overwrite_variable(&mut self, var: u8, value: u16) -> Result<(), VmError> {
        match var {
            0x00 => {
                let pc = self.pc;
                let top = self
                    .frame_mut()?
                    .stack
                    .last_mut()
                    .ok_or(VmError::StackUnderflow { pc })?;
                *top = value;
                Ok(())
            }
            _ => self.write_variable(var, value),
        }
    }

    /// Push a frame for a routine at byte address `addr` and enter it
    pub fn enter_routine(
        &mut self,
        addr: u32,
        args: &[u16],
        return_store: Option<u8>,
    ) -> Result<(), VmError> {
        let count = self.game.read_byte(addr) as usize;
        if count > MAX_LOCALS {
            return Err(VmError::Memory(format!(
                "Routine at 0x{:05x} declares {} locals",
                addr, count
            )));
        }
        let mut header_end = addr + 1;
        let mut locals = vec![0u16; count];
        if self.version() < 5 {
            for local in locals.iter_mut() {
                *local = self.game.read_word(header_end);
                header_end += 2;
            }
        }
        for (local, arg) in locals.iter_mut().zip(args) {
            *local = *arg;
        }

        debug!(
            "Call 0x{:05x} with {:?} ({} locals), depth {}",
            addr,
            args,
            count,
            self.frames.len()
        );
        self.frames.push(CallFrame {
            return_pc: self.pc,
            return_store,
            locals,
            stack: Vec::new(),
            arg_mask: arg_mask(args.len()),
        });
        self.pc = header_end;
        Ok(())
    }

    /// Pop the current frame and deliver its result.
    /// Returns false when the outermost frame was popped.
    pub fn return_from_routine(&mut self, value: u16) -> Result<bool, VmError> {
        let frame = self
            .frames
            .pop()
            .ok_or(VmError::StackUnderflow { pc: self.pc })?;
        if self.frames.is_empty() {
            debug!("Return {} from the outermost frame", value);
            return Ok(false);
        }
        debug!("Return {} to 0x{:05x}", value, frame.return_pc);
        self.pc = frame.return_pc;
        if let Some(var) = frame.return_store {
            self.write_variable(var, value)?;
        }
        Ok(true)
    }

    /// Whether argument `n` (1-based) was supplied to the current routine
    pub fn argument_supplied(&self, n: u16) -> Result<bool, VmError> {
        if n == 0 || n > 7 {
            return Ok(false);
        }
        Ok(self.frame()?.arg_mask & (1 << (n - 1)) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StoryBuilder, GLOBALS};
    use test_log::test;

    fn vm(version: u8) -> VM {
        let mut story = StoryBuilder::new(version);
        story.global(0, 0x1234);
        VM::new(Game::from_memory(story.build()).unwrap())
    }

    #[test]
    fn test_arg_mask() {
        assert_eq!(arg_mask(0), 0);
        assert_eq!(arg_mask(1), 1);
        assert_eq!(arg_mask(3), 0b111);
        assert_eq!(arg_mask(7), 0x7f);
    }

    #[test]
    fn test_stack_variable_pops_and_pushes() {
        let mut vm = vm(3);
        vm.write_variable(0, 5).unwrap();
        vm.write_variable(0, 6).unwrap();
        assert_eq!(vm.read_variable(0).unwrap(), 6);
        assert_eq!(vm.read_variable(0).unwrap(), 5);
        assert!(matches!(vm.read_variable(0), Err(VmError::StackUnderflow { .. })));
    }

    #[test]
    fn test_indirect_stack_access_stays_in_place() {
        let mut vm = vm(3);
        vm.push(1).unwrap();
        vm.push(2).unwrap();
        assert_eq!(vm.peek_variable(0).unwrap(), 2);
        vm.overwrite_variable(0, 9).unwrap();
        assert_eq!(vm.frames[0].stack, vec![1, 9]);
    }

    #[test]
    fn test_globals() {
        let mut vm = vm(3);
        assert_eq!(vm.read_variable(0x10).unwrap(), 0x1234);
        vm.write_variable(0x11, 7).unwrap();
        assert_eq!(vm.game.read_word(GLOBALS as u32 + 2), 7);
    }

    #[test]
    fn test_enter_routine_v3_initial_values_and_args() {
        let mut story = StoryBuilder::new(3);
        let packed = story.routine(&[10, 20, 30], &[0xb0]);
        let mut vm = VM::new(Game::from_memory(story.build()).unwrap());
        let addr = vm.game.header.unpack_routine(packed);
        vm.enter_routine(addr, &[1, 2, 3, 4], Some(0x10)).unwrap();

        let frame = vm.frames.last().unwrap();
        assert_eq!(frame.locals, vec![1, 2, 3]);
        assert_eq!(vm.pc, addr + 7);

        vm.frames.pop();
        vm.enter_routine(addr, &[5], None).unwrap();
        assert_eq!(vm.frames.last().unwrap().locals, vec![5, 20, 30]);
        assert!(vm.argument_supplied(1).unwrap());
        assert!(!vm.argument_supplied(2).unwrap());
    }

    #[test]
    fn test_enter_routine_v5_zeroes_locals() {
        let mut story = StoryBuilder::new(5);
        let packed = story.routine(&[0, 0], &[0xb0]);
        let mut vm = VM::new(Game::from_memory(story.build()).unwrap());
        let addr = vm.game.header.unpack_routine(packed);
        vm.enter_routine(addr, &[], None).unwrap();
        assert_eq!(vm.frames.last().unwrap().locals, vec![0, 0]);
        assert_eq!(vm.pc, addr + 1);
    }

    #[test]
    fn test_return_stores_result_in_caller() {
        let mut story = StoryBuilder::new(5);
        let packed = story.routine(&[0], &[0xb0]);
        let mut vm = VM::new(Game::from_memory(story.build()).unwrap());
        let addr = vm.game.header.unpack_routine(packed);
        vm.pc = 0x1500;
        vm.enter_routine(addr, &[], Some(0)).unwrap();
        assert!(vm.return_from_routine(42).unwrap());
        assert_eq!(vm.pc, 0x1500);
        assert_eq!(vm.pop().unwrap(), 42);
        assert!(!vm.return_from_routine(0).unwrap());
    }
}
