/// Stack and control flow operations for Z-Machine interpreter
///
/// This module handles routine calls and returns, the unconditional jump,
/// direct stack manipulation (push, pull, pop) and the v5 catch/throw pair
/// together with check_arg_count.
use crate::error::VmError;
use crate::instruction::Instruction;
use crate::interpreter::{arg, Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use log::debug;

impl Interpreter {
    /// Handle stack and control flow opcodes
    pub fn execute_stack_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        match inst.opcode {
            Opcode::CallVs
            | Opcode::CallVs2
            | Opcode::Call1s
            | Opcode::Call2s
            | Opcode::CallVn
            | Opcode::CallVn2
            | Opcode::Call1n
            | Opcode::Call2n => {
                let routine = arg(operands, 0);
                let args = operands.get(1..).unwrap_or(&[]);
                self.do_call(routine, args, inst.store_var)
            }

            Opcode::Ret => self.do_return(arg(operands, 0)),
            Opcode::Rtrue => self.do_return(1),
            Opcode::Rfalse => self.do_return(0),
            Opcode::RetPopped => {
                let value = self.vm.pop()?;
                self.do_return(value)
            }

            Opcode::Jump => {
                let offset = arg(operands, 0) as i16;
                self.vm.pc = (self.vm.pc as i64 + offset as i64 - 2) as u32;
                Ok(StepResult::Yield)
            }

            Opcode::Push => {
                self.vm.push(arg(operands, 0))?;
                Ok(StepResult::Continue)
            }
            Opcode::Pull => {
                let value = self.vm.pop()?;
                self.vm.overwrite_variable(arg(operands, 0) as u8, value)?;
                Ok(StepResult::Continue)
            }
            Opcode::Pop => {
                self.vm.pop()?;
                Ok(StepResult::Continue)
            }

            Opcode::Catch => {
                let frame = self.vm.frame_index() as u16;
                self.store(inst, frame)?;
                Ok(StepResult::Continue)
            }
            Opcode::Throw => {
                let value = arg(operands, 0);
                let frame = arg(operands, 1) as usize;
                if frame >= self.vm.frames.len() {
                    return Err(VmError::Memory(format!(
                        "throw to frame {} with only {} frames",
                        frame,
                        self.vm.frames.len()
                    )));
                }
                debug!("throw {} to frame {}", value, frame);
                self.vm.frames.truncate(frame + 1);
                self.do_return(value)
            }
            Opcode::CheckArgCount => {
                let supplied = self.vm.argument_supplied(arg(operands, 0))?;
                self.do_branch(inst, supplied)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }
}
