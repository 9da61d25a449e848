/// Mathematical, logical and comparison operations
///
/// This module handles the arithmetic and bitwise operations together with
/// the pure comparisons that only branch:
/// - Arithmetic (add, sub, mul, div, mod) on signed 16-bit values, wrapping
/// - Bitwise (and, or, not) and the two v5 shifts
/// - Comparisons (je, jl, jg, jz, test)
/// - random
use crate::error::VmError;
use crate::instruction::Instruction;
use crate::interpreter::{arg, Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use log::debug;

/// Shift `value` left by `places`, right for negative places, filling
/// with zeros
pub fn logical_shift(value: u16, places: i16) -> u16 {
    match places {
        p if p >= 16 || p <= -16 => 0,
        p if p >= 0 => value << p,
        p => value >> -p,
    }
}

/// As `logical_shift` but right shifts copy the sign bit
pub fn arithmetic_shift(value: u16, places: i16) -> u16 {
    let signed = value as i16;
    match places {
        p if p >= 16 => 0,
        p if p >= 0 => (signed << p) as u16,
        p if p <= -16 => (signed >> 15) as u16,
        p => (signed >> -p) as u16,
    }
}

impl Interpreter {
    /// Handle mathematical and logical opcodes
    pub fn execute_math_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        let a = arg(operands, 0);
        let b = arg(operands, 1);
        match inst.opcode {
            Opcode::Add => {
                self.store(inst, (a as i16).wrapping_add(b as i16) as u16)?;
                Ok(StepResult::Continue)
            }
            Opcode::Sub => {
                self.store(inst, (a as i16).wrapping_sub(b as i16) as u16)?;
                Ok(StepResult::Continue)
            }
            Opcode::Mul => {
                self.store(inst, (a as i16).wrapping_mul(b as i16) as u16)?;
                Ok(StepResult::Continue)
            }
            Opcode::Div | Opcode::Mod => {
                let op = inst.name();
                if b == 0 {
                    return Err(VmError::Arithmetic { op, pc: inst.addr });
                }
                // truncates toward zero; -32768 / -1 wraps
                let result = if inst.opcode == Opcode::Div {
                    (a as i16).wrapping_div(b as i16)
                } else {
                    (a as i16).wrapping_rem(b as i16)
                };
                self.store(inst, result as u16)?;
                Ok(StepResult::Continue)
            }

            Opcode::Or => {
                self.store(inst, a | b)?;
                Ok(StepResult::Continue)
            }
            Opcode::And => {
                self.store(inst, a & b)?;
                Ok(StepResult::Continue)
            }
            Opcode::Not => {
                self.store(inst, !a)?;
                Ok(StepResult::Continue)
            }
            Opcode::LogShift => {
                self.store(inst, logical_shift(a, b as i16))?;
                Ok(StepResult::Continue)
            }
            Opcode::ArtShift => {
                self.store(inst, arithmetic_shift(a, b as i16))?;
                Ok(StepResult::Continue)
            }

            Opcode::Je => {
                // true if the first operand equals any of the others
                let condition = operands.len() > 1 && operands[1..].contains(&a);
                self.do_branch(inst, condition)
            }
            Opcode::Jl => self.do_branch(inst, (a as i16) < (b as i16)),
            Opcode::Jg => self.do_branch(inst, (a as i16) > (b as i16)),
            Opcode::Jz => self.do_branch(inst, a == 0),
            Opcode::Test => self.do_branch(inst, a & b == b),

            Opcode::Random => {
                let range = a as i16;
                let result = match range {
                    r if r > 0 => self.rng.gen_range(r as u16),
                    r if r < 0 => {
                        self.rng.seed(-(r as i64) as u64);
                        0
                    }
                    _ => {
                        self.rng.reseed();
                        0
                    }
                };
                debug!("random {} -> {}", range, result);
                self.store(inst, result)?;
                Ok(StepResult::Continue)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }
}
