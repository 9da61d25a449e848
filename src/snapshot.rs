//! Captured machine state for save, restore and undo

use crate::error::VmError;
use crate::vm::{CallFrame, VM};
use log::debug;
use std::collections::VecDeque;

/// Dynamic memory, call stack and resume PC at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub dynamic: Vec<u8>,
    pub frames: Vec<CallFrame>,
    pub pc: u32,
}

impl Snapshot {
    pub fn capture(vm: &VM) -> Self {
        Snapshot {
            dynamic: vm.game.dynamic_memory(),
            frames: vm.frames.clone(),
            pc: vm.pc,
        }
    }

    /// Write a value into a variable of the captured state, the way a store
    /// would have done had the snapshot been live
    pub fn store_variable(&mut self, var: u8, value: u16, globals_addr: u32) -> Result<(), VmError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(VmError::StackUnderflow { pc: self.pc })?;
        match var {
            0x00 => frame.stack.push(value),
            0x01..=0x0f => {
                let slot = frame.locals.get_mut(var as usize - 1).ok_or_else(|| {
                    VmError::Memory(format!("Local {} out of range in snapshot", var))
                })?;
                *slot = value;
            }
            _ => {
                let addr = (globals_addr + 2 * (var as u32 - 0x10)) as usize;
                let bytes = self.dynamic.get_mut(addr..addr + 2).ok_or_else(|| {
                    VmError::Memory(format!("Global {} outside snapshot memory", var))
                })?;
                bytes.copy_from_slice(&value.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Replace the live state with this snapshot
    pub fn apply_to(self, vm: &mut VM) -> Result<(), VmError> {
        if self.frames.is_empty() {
            return Err(VmError::StackUnderflow { pc: self.pc });
        }
        vm.game.load_dynamic_memory(&self.dynamic)?;
        vm.frames = self.frames;
        vm.pc = self.pc;
        debug!(
            "Snapshot applied: PC=0x{:05x}, {} frames",
            vm.pc,
            vm.frames.len()
        );
        Ok(())
    }
}

/// Bounded history for save_undo / restore_undo; the oldest entry is
/// dropped when full
#[derive(Debug, Clone)]
pub struct UndoRing {
    slots: VecDeque<Snapshot>,
    capacity: usize,
}

impl UndoRing {
    pub fn new(capacity: usize) -> Self {
        UndoRing {
            slots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(snapshot);
    }

    /// Most recent entry
    pub fn pop(&mut self) -> Option<Snapshot> {
        self.slots.pop_back()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
