/// Game state operations for Z-Machine interpreter
///
/// This module handles save, restore, restart, the undo ring, quit, verify
/// and piracy. Save files are Quetzal and reach the display as plain
/// readers and writers. A failed save or restore is reported to the story
/// (branch not taken, or 0 stored) and leaves the machine as it was.
///
/// The PC in a save file points at the store byte (v5+) or the branch
/// bytes (v1-4) of the `save` that wrote it. Restoring finishes that
/// instruction: 2 is stored, or the branch is followed as if it succeeded.
use crate::display_trait::{FileMode, FileUsage};
use crate::error::VmError;
use crate::instruction::{BranchInfo, Instruction};
use crate::interpreter::{Interpreter, StepResult};
use crate::opcode_tables::Opcode;
use crate::quetzal::{RestoreGame, SaveGame};
use crate::snapshot::Snapshot;
use log::{debug, info, warn};
use std::io::Write;

/// Flags 2 bits that survive restore and restart: transcript and fixed pitch
const FLAGS2_PRESERVED: u16 = 0x0003;

impl Interpreter {
    /// Handle save/restore/restart and the other state opcodes
    pub fn execute_state_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<StepResult, VmError> {
        match inst.opcode {
            Opcode::Save => {
                if !operands.is_empty() {
                    debug!("save with table operands: saving the whole game instead");
                }
                if self.vm.version() <= 4 {
                    self.save_branching(inst)
                } else {
                    self.save_storing(inst)
                }
            }
            Opcode::Restore => {
                if !operands.is_empty() {
                    debug!("restore with table operands: restoring the whole game instead");
                }
                match self.read_save() {
                    Some(snapshot) => {
                        self.splice_in(snapshot)?;
                        let result = self.finish_saved_instruction()?;
                        info!("Game restored, resuming at 0x{:05x}", self.vm.pc);
                        Ok(result)
                    }
                    // a failed v1-3 restore just continues
                    None if self.vm.version() <= 3 => Ok(StepResult::Continue),
                    None => {
                        self.store(inst, 0)?;
                        Ok(StepResult::Continue)
                    }
                }
            }
            Opcode::Restart => {
                info!("Restarting story");
                let kept = self.vm.game.read_word(0x10) & FLAGS2_PRESERVED;
                self.vm.game.reset_dynamic_memory();
                self.keep_flags2(kept)?;
                self.vm.reset();
                self.pending = None;
                self.write_header_fields()?;
                Ok(StepResult::Yield)
            }

            Opcode::SaveUndo => {
                if self.undo.capacity() == 0 {
                    // -1: undo is not available
                    self.store(inst, 0xffff)?;
                    return Ok(StepResult::Continue);
                }
                let mut snapshot = Snapshot::capture(&self.vm);
                if let Some(var) = inst.store_var {
                    let globals = self.vm.game.header.global_variables as u32;
                    snapshot.store_variable(var, 2, globals)?;
                }
                self.undo.push(snapshot);
                debug!("save_undo: {} of {} slots used", self.undo.len(), self.undo.capacity());
                self.store(inst, 1)?;
                Ok(StepResult::Continue)
            }
            Opcode::RestoreUndo => match self.undo.pop() {
                Some(snapshot) => {
                    self.splice_in(snapshot)?;
                    debug!("restore_undo: resuming at 0x{:05x}", self.vm.pc);
                    Ok(StepResult::Yield)
                }
                None => {
                    warn!("restore_undo with nothing saved");
                    self.store(inst, 0)?;
                    Ok(StepResult::Continue)
                }
            },

            Opcode::Quit => Ok(StepResult::Quit),
            Opcode::Verify => {
                let ok = self.vm.game.verify();
                debug!("verify -> {}", ok);
                self.do_branch(inst, ok)
            }
            Opcode::Piracy => self.do_branch(inst, true),

            _ => Err(VmError::Unsupported {
                name: inst.name(),
                pc: inst.addr,
            }),
        }
    }

    /// v1-4 save: 0OP, so the branch bytes follow the opcode byte
    fn save_branching(&mut self, inst: &Instruction) -> Result<StepResult, VmError> {
        let mut snapshot = Snapshot::capture(&self.vm);
        snapshot.pc = inst.addr + 1;
        let saved = self.write_save(&snapshot);
        self.do_branch(inst, saved)
    }

    /// v5+ save: the store byte is the last byte of the instruction
    fn save_storing(&mut self, inst: &Instruction) -> Result<StepResult, VmError> {
        let mut snapshot = Snapshot::capture(&self.vm);
        snapshot.pc = inst.next_pc() - 1;
        let saved = self.write_save(&snapshot);
        self.store(inst, saved as u16)?;
        Ok(StepResult::Continue)
    }

    /// Complete the restored `save`: the PC sits on its store byte or its
    /// branch bytes
    fn finish_saved_instruction(&mut self) -> Result<StepResult, VmError> {
        let at = self.vm.pc;
        if self.vm.version() <= 4 {
            let (branch, len) = BranchInfo::read(&self.vm.game.memory, at as usize)?;
            self.vm.pc = at + len as u32;
            return match self.follow_branch(branch, true)? {
                StepResult::Continue => Ok(StepResult::Yield),
                other => Ok(other),
            };
        }
        let var = self.vm.game.read_byte(at);
        self.vm.pc = at + 1;
        self.vm.write_variable(var, 2)?;
        Ok(StepResult::Yield)
    }

    /// Ask the display for a file and write a Quetzal image to it
    fn write_save(&mut self, snapshot: &Snapshot) -> bool {
        let Some(file) = self
            .display
            .file_by_prompt(FileUsage::SavedGame, FileMode::Write)
        else {
            debug!("Save cancelled");
            return false;
        };
        let mut writer = match self.display.open_writer(&file) {
            Ok(writer) => writer,
            Err(e) => {
                warn!("Cannot open {} for saving: {}", file.name, e);
                return false;
            }
        };
        let save = SaveGame::from_snapshot(snapshot, &self.vm.game);
        let written = save
            .write_to(writer.as_mut())
            .and_then(|()| writer.flush().map_err(|e| e.to_string()));
        match written {
            Ok(()) => {
                info!("Game saved to {}", file.name);
                true
            }
            Err(e) => {
                warn!("Save to {} failed: {}", file.name, e);
                false
            }
        }
    }

    /// Ask the display for a file and read a validated snapshot from it
    fn read_save(&mut self) -> Option<Snapshot> {
        let file = self
            .display
            .file_by_prompt(FileUsage::SavedGame, FileMode::Read)?;
        let mut reader = match self.display.open_reader(&file) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Cannot open {} for restoring: {}", file.name, e);
                return None;
            }
        };
        let restored = RestoreGame::from_reader(reader.as_mut())
            .and_then(|save| save.to_snapshot(&self.vm.game));
        match restored {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Restore from {} failed: {}", file.name, e);
                None
            }
        }
    }

    /// Replace the live state, keeping the interpreter's own header fields
    /// and the transcript/fixed-pitch bits
    fn splice_in(&mut self, snapshot: Snapshot) -> Result<(), VmError> {
        let kept = self.vm.game.read_word(0x10) & FLAGS2_PRESERVED;
        snapshot.apply_to(&mut self.vm)?;
        self.keep_flags2(kept)?;
        self.write_header_fields()?;
        self.pending = None;
        Ok(())
    }

    fn keep_flags2(&mut self, kept: u16) -> Result<(), VmError> {
        let flags2 = (self.vm.game.read_word(0x10) & !FLAGS2_PRESERVED) | kept;
        self.vm.game.write_word(0x10, flags2)
    }
}
