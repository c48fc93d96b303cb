//! Instruction decoder for the LS-8.
//!
//! Instructions are 1-3 bytes: an opcode byte followed by 0-2 operand
//! bytes. Opcodes follow an `AABCDDDD` layout: the top two bits give the
//! operand count, bit 5 marks ALU operations, bit 4 marks instructions
//! that set the program counter themselves, and the low four bits
//! identify the instruction within its group.

use crate::cpu::registers::NUM_REGISTERS;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Opcode byte values.
pub mod opcodes {
    pub const LDI: u8 = 0b1000_0010;
    pub const PRN: u8 = 0b0100_0111;
    pub const ADD: u8 = 0b1010_0000;
    pub const MUL: u8 = 0b1010_0010;
    pub const CMP: u8 = 0b1010_0111;
    pub const PUSH: u8 = 0b0100_0101;
    pub const POP: u8 = 0b0100_0110;
    pub const JMP: u8 = 0b0101_0100;
    pub const JEQ: u8 = 0b0101_0101;
    pub const JNE: u8 = 0b0101_0110;
    pub const CALL: u8 = 0b0101_0000;
    pub const RET: u8 = 0b0001_0001;
    pub const HLT: u8 = 0b0000_0001;
}

/// Bit marking ALU operations in the opcode layout.
const ALU_BIT: u8 = 0b0010_0000;

/// Decoded LS-8 instruction.
///
/// The instruction set has five groups:
/// - Data movement: LDI
/// - Arithmetic/logic: ADD, MUL, CMP
/// - Stack: PUSH, POP
/// - Control transfer: JMP, JEQ, JNE, CALL, RET
/// - Misc: PRN, HLT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Data Movement ====================

    /// Load an immediate value into a register.
    Ldi { reg: u8, value: u8 },

    // ==================== Arithmetic ====================

    /// reg_a := reg_a + reg_b, wrapping at 8 bits.
    Add { reg_a: u8, reg_b: u8 },

    /// reg_a := reg_a * reg_b, wrapping at 8 bits.
    Mul { reg_a: u8, reg_b: u8 },

    /// Compare two registers and set the E/L/G flags.
    Cmp { reg_a: u8, reg_b: u8 },

    // ==================== Stack ====================

    /// Decrement SP, then store the register at the new SP.
    Push { reg: u8 },

    /// Load the byte at SP into the register, then increment SP.
    Pop { reg: u8 },

    // ==================== Control Flow ====================

    /// Unconditional jump to the address held in a register.
    Jmp { reg: u8 },

    /// Jump to the address in the register if the Equal flag is set.
    Jeq { reg: u8 },

    /// Jump to the address in the register if the Equal flag is clear.
    Jne { reg: u8 },

    /// Push the return address, then jump to the address in the register.
    Call { reg: u8 },

    /// Pop the return address into the program counter.
    Ret,

    /// Halt execution.
    Hlt,

    // ==================== Output ====================

    /// Emit the decimal value of a register.
    Prn { reg: u8 },
}

impl Instruction {
    /// Total instruction length in bytes, opcode included.
    pub const fn len(&self) -> u16 {
        match self {
            Instruction::Ldi { .. }
            | Instruction::Add { .. }
            | Instruction::Mul { .. }
            | Instruction::Cmp { .. } => 3,
            Instruction::Prn { .. }
            | Instruction::Push { .. }
            | Instruction::Pop { .. }
            | Instruction::Jmp { .. }
            | Instruction::Jeq { .. }
            | Instruction::Jne { .. }
            | Instruction::Call { .. } => 2,
            Instruction::Ret | Instruction::Hlt => 1,
        }
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Ldi { .. } => "LDI",
            Instruction::Add { .. } => "ADD",
            Instruction::Mul { .. } => "MUL",
            Instruction::Cmp { .. } => "CMP",
            Instruction::Push { .. } => "PUSH",
            Instruction::Pop { .. } => "POP",
            Instruction::Jmp { .. } => "JMP",
            Instruction::Jeq { .. } => "JEQ",
            Instruction::Jne { .. } => "JNE",
            Instruction::Call { .. } => "CALL",
            Instruction::Ret => "RET",
            Instruction::Hlt => "HLT",
            Instruction::Prn { .. } => "PRN",
        }
    }

    /// Opcode byte for this instruction.
    pub const fn opcode(&self) -> u8 {
        match self {
            Instruction::Ldi { .. } => opcodes::LDI,
            Instruction::Add { .. } => opcodes::ADD,
            Instruction::Mul { .. } => opcodes::MUL,
            Instruction::Cmp { .. } => opcodes::CMP,
            Instruction::Push { .. } => opcodes::PUSH,
            Instruction::Pop { .. } => opcodes::POP,
            Instruction::Jmp { .. } => opcodes::JMP,
            Instruction::Jeq { .. } => opcodes::JEQ,
            Instruction::Jne { .. } => opcodes::JNE,
            Instruction::Call { .. } => opcodes::CALL,
            Instruction::Ret => opcodes::RET,
            Instruction::Hlt => opcodes::HLT,
            Instruction::Prn { .. } => opcodes::PRN,
        }
    }
}

/// Total length in bytes of the instruction starting with `op`.
///
/// The operand count lives in the top two opcode bits, so the engine can
/// fetch a whole instruction before knowing whether the opcode is valid.
/// Returns `None` for count bits `11`, which no instruction uses.
pub fn instruction_len(op: u8) -> Option<u16> {
    match op >> 6 {
        0b11 => None,
        count => Some(u16::from(count) + 1),
    }
}

/// Decode an opcode and its operand bytes.
///
/// Operand bytes beyond the instruction's length are ignored, so callers
/// may pass zeros for bytes they did not fetch.
pub fn decode(op: u8, a: u8, b: u8) -> Result<Instruction, DecodeError> {
    use opcodes::*;

    let instruction = match op {
        LDI => Instruction::Ldi { reg: reg_index(a)?, value: b },
        PRN => Instruction::Prn { reg: reg_index(a)? },
        ADD => Instruction::Add { reg_a: reg_index(a)?, reg_b: reg_index(b)? },
        MUL => Instruction::Mul { reg_a: reg_index(a)?, reg_b: reg_index(b)? },
        CMP => Instruction::Cmp { reg_a: reg_index(a)?, reg_b: reg_index(b)? },
        PUSH => Instruction::Push { reg: reg_index(a)? },
        POP => Instruction::Pop { reg: reg_index(a)? },
        JMP => Instruction::Jmp { reg: reg_index(a)? },
        JEQ => Instruction::Jeq { reg: reg_index(a)? },
        JNE => Instruction::Jne { reg: reg_index(a)? },
        CALL => Instruction::Call { reg: reg_index(a)? },
        RET => Instruction::Ret,
        HLT => Instruction::Hlt,
        _ if op >> 6 != 0b11 && op & ALU_BIT != 0 => {
            return Err(DecodeError::UnsupportedAluOp(op));
        }
        _ => return Err(DecodeError::UnknownOpcode(op)),
    };

    Ok(instruction)
}

/// Encode an instruction back to its byte sequence.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let mut bytes = vec![instr.opcode()];

    match *instr {
        Instruction::Ldi { reg, value } => {
            bytes.push(reg);
            bytes.push(value);
        }
        Instruction::Add { reg_a, reg_b }
        | Instruction::Mul { reg_a, reg_b }
        | Instruction::Cmp { reg_a, reg_b } => {
            bytes.push(reg_a);
            bytes.push(reg_b);
        }
        Instruction::Prn { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Jmp { reg }
        | Instruction::Jeq { reg }
        | Instruction::Jne { reg }
        | Instruction::Call { reg } => {
            bytes.push(reg);
        }
        Instruction::Ret | Instruction::Hlt => {}
    }

    bytes
}

/// Validate a register operand byte.
fn reg_index(byte: u8) -> Result<u8, DecodeError> {
    if (byte as usize) < NUM_REGISTERS {
        Ok(byte)
    } else {
        Err(DecodeError::InvalidRegister(byte))
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode: {0:#010b}")]
    UnknownOpcode(u8),

    #[error("unsupported ALU operation: {0:#010b}")]
    UnsupportedAluOp(u8),

    #[error("register index out of range: {0}")]
    InvalidRegister(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hlt() {
        assert_eq!(decode(opcodes::HLT, 0, 0).unwrap(), Instruction::Hlt);
    }

    #[test]
    fn test_decode_ldi() {
        let instr = decode(opcodes::LDI, 0, 8).unwrap();
        assert_eq!(instr, Instruction::Ldi { reg: 0, value: 8 });
        assert_eq!(instr.len(), 3);
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(decode(0b1111_1111, 0, 0), Err(DecodeError::UnknownOpcode(0xFF)));
        assert_eq!(decode(0, 0, 0), Err(DecodeError::UnknownOpcode(0)));
    }

    #[test]
    fn test_decode_unsupported_alu_op() {
        // Has the ALU bit and valid count bits, but no matching handler
        assert_eq!(
            decode(0b1010_0001, 0, 1),
            Err(DecodeError::UnsupportedAluOp(0b1010_0001))
        );
    }

    #[test]
    fn test_decode_invalid_register() {
        assert_eq!(decode(opcodes::PRN, 8, 0), Err(DecodeError::InvalidRegister(8)));
        assert_eq!(decode(opcodes::ADD, 0, 200), Err(DecodeError::InvalidRegister(200)));
    }

    #[test]
    fn test_instruction_len_from_count_bits() {
        assert_eq!(instruction_len(opcodes::HLT), Some(1));
        assert_eq!(instruction_len(opcodes::PUSH), Some(2));
        assert_eq!(instruction_len(opcodes::LDI), Some(3));
        assert_eq!(instruction_len(0b1111_1111), None);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let test_cases = [
            Instruction::Hlt,
            Instruction::Ret,
            Instruction::Ldi { reg: 2, value: 0xFE },
            Instruction::Cmp { reg_a: 0, reg_b: 1 },
            Instruction::Jne { reg: 3 },
            Instruction::Call { reg: 1 },
        ];

        for instr in test_cases {
            let bytes = encode(&instr);
            assert_eq!(bytes.len() as u16, instr.len());

            let a = bytes.get(1).copied().unwrap_or(0);
            let b = bytes.get(2).copied().unwrap_or(0);
            assert_eq!(decode(bytes[0], a, b).unwrap(), instr);
        }
    }
}
