use crate::error::VmError;
use crate::opcode_tables::{self, Opcode, OperandRequirement};
use crate::text::ZsciiCodec;
use std::fmt::{Display, Error, Formatter};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }

    /// Get the size in bytes for this operand type
    pub fn size(&self) -> usize {
        match self {
            OperandType::LargeConstant => 2,
            OperandType::SmallConstant => 1,
            OperandType::Variable => 1,
            OperandType::Omitted => 0,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

/// Operand count categories
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
    EXT,
}

/// Branch information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// Branch offset (0-1 = return false/true, otherwise relative jump)
    pub offset: i16,
}

impl BranchInfo {
    /// Read the one or two branch bytes at `addr`, returning the branch and
    /// its length
    pub fn read(memory: &[u8], addr: usize) -> Result<(Self, usize), VmError> {
        let byte = |at: usize| {
            memory.get(at).copied().ok_or_else(|| {
                VmError::Memory(format!("Branch at 0x{:05x} runs past end of memory", addr))
            })
        };
        let first = byte(addr)?;
        let on_true = first & 0x80 != 0;
        if first & 0x40 != 0 {
            return Ok((
                BranchInfo {
                    on_true,
                    offset: (first & 0x3f) as i16,
                },
                1,
            ));
        }
        let raw = (((first & 0x3f) as u16) << 8) | byte(addr + 1)? as u16;
        // sign-extend 14 bits
        let offset = ((raw << 2) as i16) >> 2;
        Ok((BranchInfo { on_true, offset }, 2))
    }
}

/// A decoded Z-Machine instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address of the first opcode byte
    pub addr: u32,
    pub opcode: Opcode,
    /// Opcode number within its operand-count class
    pub number: u8,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    pub operand_types: Vec<OperandType>,
    /// Raw operand values; variable operands still hold the variable number
    pub operands: Vec<u16>,
    /// Variable to store result (if applicable)
    pub store_var: Option<u8>,
    /// Branch information (if applicable)
    pub branch: Option<BranchInfo>,
    /// String data for print and print_ret
    pub text: Option<String>,
    /// Total size of instruction in bytes
    pub size: usize,
}

struct Cursor<'a> {
    memory: &'a [u8],
    offset: usize,
    start: usize,
}

impl Cursor<'_> {
    fn byte(&mut self) -> Result<u8, VmError> {
        let b = self.memory.get(self.offset).copied().ok_or_else(|| {
            VmError::Memory(format!(
                "Instruction at 0x{:05x} runs past end of memory",
                self.start
            ))
        })?;
        self.offset += 1;
        Ok(b)
    }

    fn word(&mut self) -> Result<u16, VmError> {
        Ok(((self.byte()? as u16) << 8) | self.byte()? as u16)
    }
}

fn push_types(types: &mut Vec<OperandType>, type_byte: u8) -> bool {
    for i in 0..4 {
        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
        if op_type == OperandType::Omitted {
            return false;
        }
        types.push(op_type);
    }
    true
}

impl Instruction {
    /// Decode an instruction from memory at the given address
    pub fn decode(
        memory: &[u8],
        addr: usize,
        version: u8,
        codec: &ZsciiCodec,
    ) -> Result<Self, VmError> {
        let mut cursor = Cursor {
            memory,
            offset: addr,
            start: addr,
        };
        let opcode_byte = cursor.byte()?;

        let form = if opcode_byte == 0xbe && version >= 5 {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let (number, operand_count) = match form {
            InstructionForm::Long => (opcode_byte & 0x1f, OperandCount::OP2),
            InstructionForm::Short => {
                let count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OperandCount::OP0
                } else {
                    OperandCount::OP1
                };
                (opcode_byte & 0x0f, count)
            }
            InstructionForm::Variable => {
                let count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                (opcode_byte & 0x1f, count)
            }
            InstructionForm::Extended => (cursor.byte()?, OperandCount::EXT),
        };

        let opcode = opcode_tables::lookup(operand_count, number, version).ok_or(
            VmError::UnknownOpcode {
                opcode: if form == InstructionForm::Extended {
                    number
                } else {
                    opcode_byte
                },
                extended: form == InstructionForm::Extended,
                pc: addr as u32,
            },
        )?;

        if version < opcode.introduced() {
            return Err(VmError::Unsupported {
                name: opcode.name(),
                pc: addr as u32,
            });
        }

        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                for mask in [0x40, 0x20] {
                    operand_types.push(if opcode_byte & mask != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                if operand_count == OperandCount::OP1 {
                    operand_types.push(OperandType::from_bits(opcode_byte >> 4));
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                if opcode.is_double_variable() {
                    let first = cursor.byte()?;
                    let second = cursor.byte()?;
                    if push_types(&mut operand_types, first) {
                        push_types(&mut operand_types, second);
                    }
                } else {
                    let types = cursor.byte()?;
                    push_types(&mut operand_types, types);
                }
            }
        }

        let mut operands = Vec::with_capacity(operand_types.len());
        for op_type in &operand_types {
            operands.push(match op_type {
                OperandType::LargeConstant => cursor.word()?,
                _ => cursor.byte()? as u16,
            });
        }

        let requirement = opcode.requirement(version);
        let store_var = match requirement {
            OperandRequirement::Store | OperandRequirement::StoreAndBranch => {
                Some(cursor.byte()?)
            }
            _ => None,
        };

        let branch = match requirement {
            OperandRequirement::Branch | OperandRequirement::StoreAndBranch => {
                let (branch, len) = BranchInfo::read(memory, cursor.offset).map_err(|_| {
                    VmError::Memory(format!(
                        "Instruction at 0x{:05x} runs past end of memory",
                        addr
                    ))
                })?;
                cursor.offset += len;
                Some(branch)
            }
            _ => None,
        };

        let text = if requirement == OperandRequirement::LiteralString {
            let (string, len) = codec.decode_string(memory, cursor.offset)?;
            cursor.offset += len;
            Some(string)
        } else {
            None
        };

        Ok(Instruction {
            addr: addr as u32,
            opcode,
            number,
            form,
            operand_count,
            operand_types,
            operands,
            store_var,
            branch,
            text,
            size: cursor.offset - addr,
        })
    }

    /// Address of the next instruction
    pub fn next_pc(&self) -> u32 {
        self.addr + self.size as u32
    }

    pub fn name(&self) -> &'static str {
        self.opcode.name()
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{:05x}: {}", self.addr, self.name())?;

        for (i, op) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match self.operand_types[i] {
                OperandType::Variable => write!(f, "V{:02x}", op)?,
                _ => write!(f, "#{:04x}", op)?,
            }
        }

        if let Some(var) = self.store_var {
            write!(f, " -> V{:02x}", var)?;
        }

        if let Some(ref branch) = self.branch {
            write!(
                f,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {:+}", n),
                }
            )?;
        }

        if let Some(ref text) = self.text {
            write!(f, " {:?}", text)?;
        }

        Ok(())
    }
}
