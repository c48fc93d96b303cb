//! Disassembler for LS-8 programs.
//!
//! Converts program bytes back to readable assembly. Instructions are
//! variable length, so the stream is walked from the front; a byte that
//! does not decode consumes one cell and renders as raw data.

use crate::cpu::decode::{self, Instruction};

/// Disassemble the instruction starting at `addr`.
///
/// Returns the rendered text and the number of bytes consumed (always
/// at least 1, so a walk over undecodable data still makes progress).
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let Some(&op) = bytes.get(addr) else {
        return ("???".to_string(), 1);
    };

    let Some(len) = decode::instruction_len(op) else {
        return (format!("???  # {:02X}", op), 1);
    };

    if addr + len as usize > bytes.len() {
        return (format!("???  # {:02X}", op), 1);
    }

    let a = if len > 1 { bytes[addr + 1] } else { 0 };
    let b = if len > 2 { bytes[addr + 2] } else { 0 };

    match decode::decode(op, a, b) {
        Ok(instr) => (format_instruction(&instr), len as usize),
        Err(_) => (format!("???  # {:02X}", op), 1),
    }
}

/// Disassemble a whole program image into a listing.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("# LS-8 Disassembly\n");
    output.push_str("# ----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, consumed) = disassemble_at(bytes, addr);
        let raw = bytes[addr..addr + consumed.min(bytes.len() - addr)]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");

        output.push_str(&format!("0x{:02X}: {:<8}  {}\n", addr, raw, text));
        addr += consumed;
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    match *instr {
        Instruction::Ldi { reg, value } => {
            format!("{} R{},{}", instr.mnemonic(), reg, value)
        }
        Instruction::Add { reg_a, reg_b }
        | Instruction::Mul { reg_a, reg_b }
        | Instruction::Cmp { reg_a, reg_b } => {
            format!("{} R{},R{}", instr.mnemonic(), reg_a, reg_b)
        }
        Instruction::Prn { reg }
        | Instruction::Push { reg }
        | Instruction::Pop { reg }
        | Instruction::Jmp { reg }
        | Instruction::Jeq { reg }
        | Instruction::Jne { reg }
        | Instruction::Call { reg } => {
            format!("{} R{}", instr.mnemonic(), reg)
        }
        Instruction::Ret | Instruction::Hlt => instr.mnemonic().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_hlt() {
        let (text, consumed) = disassemble_at(&[0b0000_0001], 0);
        assert_eq!(text, "HLT");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_disassemble_ldi() {
        let (text, consumed) = disassemble_at(&[0b1000_0010, 0, 8], 0);
        assert_eq!(text, "LDI R0,8");
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_disassemble_unknown_byte_consumes_one() {
        let (text, consumed) = disassemble_at(&[0xFF, 0x01], 0);
        assert!(text.starts_with("???"));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_disassemble_listing() {
        let listing = disassemble(&[0x82, 0x00, 0x08, 0x47, 0x00, 0x01]);

        assert!(listing.contains("LDI R0,8"));
        assert!(listing.contains("PRN R0"));
        assert!(listing.contains("HLT"));
        assert!(listing.contains("0x03"));
    }
}
