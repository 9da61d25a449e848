/// Object system operations for Z-Machine interpreter
///
/// This module handles all object-related operations including:
/// - Object hierarchy operations (get_sibling, get_child, get_parent, insert_obj, remove_obj)
/// - Object properties (get_prop, put_prop, get_prop_addr, get_next_prop, get_prop_len)
/// - Object attributes (test_attr, set_attr, clear_attr)
/// - Object relationships (jin - test if object is inside another)
///
/// The offsets themselves are computed by the accessors in `zobject`.
use crate::error::VmError;
use crate::instruction::Instruction;
use crate::interpreter::{arg, Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use crate::zobject::Link;
use log::{debug, warn};

impl Interpreter {
    /// Handle object system opcodes
    pub fn execute_object_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        let obj = arg(operands, 0);
        let second = arg(operands, 1);
        match inst.opcode {
            Opcode::GetSibling | Opcode::GetChild => {
                let link = if inst.opcode == Opcode::GetSibling {
                    Link::Sibling
                } else {
                    Link::Child
                };
                let found = self.vm.game.object_link(obj, link)?;
                self.store(inst, found)?;
                self.do_branch(inst, found != 0)
            }
            Opcode::GetParent => {
                let parent = self.vm.game.object_link(obj, Link::Parent)?;
                self.store(inst, parent)?;
                Ok(StepResult::Continue)
            }
            Opcode::Jin => {
                let parent = self.vm.game.object_link(obj, Link::Parent)?;
                self.do_branch(inst, parent == second)
            }

            Opcode::TestAttr => {
                let set = self.vm.game.test_attribute(obj, second)?;
                self.do_branch(inst, set)
            }
            Opcode::SetAttr | Opcode::ClearAttr => {
                let value = inst.opcode == Opcode::SetAttr;
                self.vm.game.set_attribute(obj, second, value)?;
                Ok(StepResult::Continue)
            }

            Opcode::InsertObj => {
                self.vm.game.insert_object(obj, second)?;
                Ok(StepResult::Continue)
            }
            Opcode::RemoveObj => {
                self.vm.game.remove_object(obj)?;
                Ok(StepResult::Continue)
            }

            Opcode::GetProp => {
                let value = self.vm.game.property_value(obj, second)?;
                self.store(inst, value)?;
                Ok(StepResult::Continue)
            }
            Opcode::GetPropAddr => {
                let addr = self.vm.game.property_addr(obj, second)?;
                self.store(inst, addr)?;
                Ok(StepResult::Continue)
            }
            Opcode::GetPropLen => {
                let len = self.vm.game.property_len(obj);
                self.store(inst, len)?;
                Ok(StepResult::Continue)
            }
            Opcode::GetNextProp => {
                let next = self.vm.game.next_property(obj, second)?;
                self.store(inst, next)?;
                Ok(StepResult::Continue)
            }
            Opcode::PutProp => {
                debug!("put_prop {} {} {}", obj, second, arg(operands, 2));
                self.vm.game.put_property(obj, second, arg(operands, 2))?;
                Ok(StepResult::Continue)
            }

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }

    /// Decoded short name of an object; object 0 has none
    pub(crate) fn object_name(&self, obj: u16) -> Result<String, VmError> {
        if obj == 0 {
            warn!("Short name of object 0 requested");
            return Ok(String::new());
        }
        let addr = self.vm.game.object_name_addr(obj)?;
        // an empty name has a zero-length header and no text
        if self.vm.game.read_byte(addr - 1) == 0 {
            return Ok(String::new());
        }
        let (name, _) = self
            .codec
            .decode_string(&self.vm.game.memory, addr as usize)?;
        Ok(name)
    }
}
