/// Memory operations for Z-Machine interpreter
///
/// This module handles all memory access operations including:
/// - Variable operations (load, store, inc, dec, inc_chk, dec_chk)
/// - Word operations (loadw, storew) - 16-bit values at word boundaries
/// - Byte operations (loadb, storeb) - 8-bit values at byte addresses
/// - Table operations (scan_table, copy_table)
///
/// Variable operands of load, store and the inc/dec family name a variable
/// indirectly; variable 0 then means the top of the stack, read or replaced
/// in place.
use crate::error::VmError;
use crate::instruction::Instruction;
use crate::interpreter::{arg, Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use log::{debug, trace};

/// Default `scan_table` form: word entries, two bytes apart
const DEFAULT_SCAN_FORM: u16 = 0x82;

impl Interpreter {
    /// Handle memory access opcodes
    pub fn execute_memory_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        match inst.opcode {
            Opcode::Load => {
                let value = self.vm.peek_variable(arg(operands, 0) as u8)?;
                self.store(inst, value)?;
                Ok(StepResult::Continue)
            }
            Opcode::Store => {
                let var = arg(operands, 0) as u8;
                trace!("store: var={:02x}, value={}", var, arg(operands, 1));
                self.vm.overwrite_variable(var, arg(operands, 1))?;
                Ok(StepResult::Continue)
            }

            Opcode::Loadw => {
                let addr = arg(operands, 0).wrapping_add(arg(operands, 1).wrapping_mul(2));
                let value = self.vm.game.read_word(addr as u32);
                self.store(inst, value)?;
                Ok(StepResult::Continue)
            }
            Opcode::Loadb => {
                let addr = arg(operands, 0).wrapping_add(arg(operands, 1));
                let value = self.vm.game.read_byte(addr as u32) as u16;
                self.store(inst, value)?;
                Ok(StepResult::Continue)
            }
            Opcode::Storew => {
                let addr = arg(operands, 0).wrapping_add(arg(operands, 1).wrapping_mul(2));
                self.vm.game.write_word(addr as u32, arg(operands, 2))?;
                Ok(StepResult::Continue)
            }
            Opcode::Storeb => {
                let addr = arg(operands, 0).wrapping_add(arg(operands, 1));
                self.vm.game.write_byte(addr as u32, arg(operands, 2) as u8)?;
                Ok(StepResult::Continue)
            }

            Opcode::Inc | Opcode::Dec | Opcode::IncChk | Opcode::DecChk => {
                let var = arg(operands, 0) as u8;
                let old = self.vm.peek_variable(var)? as i16;
                let new = match inst.opcode {
                    Opcode::Inc | Opcode::IncChk => old.wrapping_add(1),
                    _ => old.wrapping_sub(1),
                };
                self.vm.overwrite_variable(var, new as u16)?;
                let limit = arg(operands, 1) as i16;
                match inst.opcode {
                    Opcode::IncChk => self.do_branch(inst, new > limit),
                    Opcode::DecChk => self.do_branch(inst, new < limit),
                    _ => Ok(StepResult::Continue),
                }
            }

            Opcode::ScanTable => {
                let form = operands.get(3).copied().unwrap_or(DEFAULT_SCAN_FORM);
                let found = self.scan_table(
                    arg(operands, 0),
                    arg(operands, 1) as u32,
                    arg(operands, 2),
                    form,
                );
                self.store(inst, found.unwrap_or(0) as u16)?;
                self.do_branch(inst, found.is_some())
            }
            Opcode::CopyTable => {
                self.copy_table(arg(operands, 0), arg(operands, 1), arg(operands, 2) as i16)?;
                Ok(StepResult::Continue)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }

    /// Address of the first entry of `len` entries equal to `value`.
    /// Bit 7 of `form` selects word entries; bits 0-6 give the entry size.
    fn scan_table(&self, value: u16, table: u32, len: u16, form: u16) -> Option<u32> {
        let entry_len = (form & 0x7f) as u32;
        let words = form & 0x80 != 0;
        let game = &self.vm.game;
        let found = (0..len as u32).map(|i| table + i * entry_len).find(|&addr| {
            let entry = if words {
                game.read_word(addr)
            } else {
                game.read_byte(addr) as u16
            };
            entry == value
        });
        debug!(
            "scan_table {} in 0x{:04x}[{}] form 0x{:02x} -> {:?}",
            value, table, len, form, found
        );
        found
    }

    /// Copy `size` bytes from `first` to `second`. A zero `second` clears
    /// the bytes at `first` instead; a negative size forces a forward copy.
    fn copy_table(&mut self, first: u16, second: u16, size: i16) -> Result<(), VmError> {
        let len = size.unsigned_abs() as u32;
        let (from, to) = (first as u32, second as u32);
        let game = &mut self.vm.game;
        if second == 0 {
            for i in 0..len {
                game.write_byte(from + i, 0)?;
            }
        } else if size < 0 || to <= from {
            for i in 0..len {
                let byte = game.read_byte(from + i);
                game.write_byte(to + i, byte)?;
            }
        } else {
            for i in (0..len).rev() {
                let byte = game.read_byte(from + i);
                game.write_byte(to + i, byte)?;
            }
        }
        Ok(())
    }
}
