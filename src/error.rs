//! Error types for the Z-Machine core
//!
//! Fatal conditions raised while decoding or executing story code. Save and
//! restore failures are not errors here: they are reported back to the story
//! through the instruction's branch or store.

use crate::display_trait::DisplayError;
use std::fmt;

/// Errors that stop the execution loop
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    /// An opcode byte with no instruction descriptor
    UnknownOpcode { opcode: u8, extended: bool, pc: u32 },
    /// A decoded instruction this engine declines to execute
    Unsupported { name: &'static str, pc: u32 },
    /// Division or modulo by zero
    Arithmetic { op: &'static str, pc: u32 },
    /// Out-of-range or read-only memory access
    Memory(String),
    /// Pop from an empty evaluation stack or return with no frame
    StackUnderflow { pc: u32 },
    /// Object number outside the object table
    InvalidObject { object: u16, pc: u32 },
    /// Property missing or of an unusable size
    InvalidProperty { object: u16, property: u16, pc: u32 },
    /// Output stream misuse (stream 3 overflow or underflow)
    Stream(String),
    /// Failure reported by the display capability
    Display(String),
    /// Story file could not be loaded
    Load(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::UnknownOpcode {
                opcode,
                extended,
                pc,
            } => {
                if *extended {
                    write!(f, "Unknown EXT opcode 0x{:02x} at PC 0x{:05x}", opcode, pc)
                } else {
                    write!(f, "Unknown opcode 0x{:02x} at PC 0x{:05x}", opcode, pc)
                }
            }
            VmError::Unsupported { name, pc } => {
                write!(f, "Unsupported instruction '{}' at PC 0x{:05x}", name, pc)
            }
            VmError::Arithmetic { op, pc } => {
                write!(f, "Arithmetic error: {} by zero at PC 0x{:05x}", op, pc)
            }
            VmError::Memory(msg) => write!(f, "Memory error: {}", msg),
            VmError::StackUnderflow { pc } => {
                write!(f, "Stack underflow at PC 0x{:05x}", pc)
            }
            VmError::InvalidObject { object, pc } => {
                write!(f, "Invalid object {} at PC 0x{:05x}", object, pc)
            }
            VmError::InvalidProperty {
                object,
                property,
                pc,
            } => write!(
                f,
                "Invalid property {} on object {} at PC 0x{:05x}",
                property, object, pc
            ),
            VmError::Stream(msg) => write!(f, "Stream error: {}", msg),
            VmError::Display(msg) => write!(f, "Display error: {}", msg),
            VmError::Load(msg) => write!(f, "Load error: {}", msg),
        }
    }
}

impl std::error::Error for VmError {}

impl VmError {
    /// Whether this is the division/modulo-by-zero failure
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, VmError::Arithmetic { .. })
    }

    /// Stamp the program counter of the failing instruction
    pub fn at_pc(self, at: u32) -> VmError {
        match self {
            VmError::Unsupported { name, .. } => VmError::Unsupported { name, pc: at },
            VmError::Arithmetic { op, .. } => VmError::Arithmetic { op, pc: at },
            VmError::StackUnderflow { .. } => VmError::StackUnderflow { pc: at },
            VmError::InvalidObject { object, .. } => VmError::InvalidObject { object, pc: at },
            VmError::InvalidProperty {
                object, property, ..
            } => VmError::InvalidProperty {
                object,
                property,
                pc: at,
            },
            other => other,
        }
    }
}

impl From<DisplayError> for VmError {
    fn from(error: DisplayError) -> Self {
        VmError::Display(error.message)
    }
}

impl From<std::io::Error> for VmError {
    fn from(error: std::io::Error) -> Self {
        VmError::Display(format!("I/O error: {}", error))
    }
}

impl From<VmError> for String {
    fn from(error: VmError) -> String {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_error_messages_name_opcode_and_pc() {
        let err = VmError::UnknownOpcode {
            opcode: 0x1d,
            extended: false,
            pc: 0x4f05,
        };
        assert_eq!(err.to_string(), "Unknown opcode 0x1d at PC 0x04f05");

        let err = VmError::Unsupported {
            name: "draw_picture",
            pc: 0x100,
        };
        assert!(err.to_string().contains("draw_picture"));
        assert!(!err.is_arithmetic());
    }

    #[test]
    fn test_arithmetic_error_is_distinguishable() {
        let err = VmError::Arithmetic { op: "div", pc: 0 };
        assert!(err.is_arithmetic());
        assert_eq!(err.to_string(), "Arithmetic error: div by zero at PC 0x00000");
    }

    #[test]
    fn test_display_error_conversion() {
        let err: VmError = DisplayError::new("window gone").into();
        assert_eq!(err, VmError::Display("window gone".to_string()));
    }
}
