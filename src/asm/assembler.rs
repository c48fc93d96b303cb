//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! # Comment
//! LOOP:            # Define a label
//!     LDI R0,10    # Load an immediate
//!     LDI R1,LOOP  # Labels resolve to their program address
//!     CMP R0,R2
//!     JEQ R1       # Jumps are register-indirect
//!     HLT
//!
//!     ORG 16       # Pad with zeros up to an address
//!     DS8 42       # Define a data byte
//! ```

use crate::cpu::decode::{Instruction, encode};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a program byte image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> program address).
    symbols: HashMap<String, usize>,
    /// Pending references (byte_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes. Programs load at address 0, so the output index
    /// of a byte is also its address.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve forward references
        self.resolve_references()?;

        Ok(self.output.clone())
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Strip comments and surrounding whitespace
        let line = line.split('#').next().unwrap_or("").trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if !label.is_empty() {
                self.symbols.insert(label, self.output.len());
            }

            // Process rest of line if any
            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        let mnemonic = parts[0].to_uppercase();
        // Rejoin so "R0, 8" and "R0,8" read the same
        let operand = if parts.len() > 1 {
            Some(parts[1..].concat())
        } else {
            None
        };
        let operand = operand.as_deref();

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let addr = self.parse_literal(require_operand(operand, "ORG", line_num)?, line_num)?;
                let addr = addr as usize;
                if addr < self.output.len() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("ORG {} is behind the current address {}", addr, self.output.len()),
                    });
                }
                self.output.resize(addr, 0);
            }

            "DS8" | "DB" => {
                let token = require_operand(operand, "DS8", line_num)?;
                let value = self.parse_value(token, line_num)?;
                self.output.push(value);
            }

            // Instructions
            _ => {
                let instr = self.parse_instruction(&mnemonic, operand, line_num)?;
                self.output.extend(encode(&instr));
            }
        }

        Ok(())
    }

    fn parse_instruction(&mut self, mnemonic: &str, operand: Option<&str>, line_num: usize)
        -> Result<Instruction, AssemblerError>
    {
        let instr = match mnemonic {
            // Data movement
            "LDI" => {
                let (reg_tok, value_tok) = split_pair(operand, mnemonic, line_num)?;
                let reg = parse_register(reg_tok, line_num)?;
                // The value byte sits two past the opcode; labels used as
                // immediates are patched there in pass 2
                let value_index = self.output.len() + 2;
                let value = self.parse_value_at(value_tok, value_index, line_num)?;
                Instruction::Ldi { reg, value }
            }

            // Arithmetic
            "ADD" | "MUL" | "CMP" => {
                let (a_tok, b_tok) = split_pair(operand, mnemonic, line_num)?;
                let reg_a = parse_register(a_tok, line_num)?;
                let reg_b = parse_register(b_tok, line_num)?;
                match mnemonic {
                    "ADD" => Instruction::Add { reg_a, reg_b },
                    "MUL" => Instruction::Mul { reg_a, reg_b },
                    _ => Instruction::Cmp { reg_a, reg_b },
                }
            }

            // Stack
            "PUSH" => Instruction::Push { reg: single_register(operand, mnemonic, line_num)? },
            "POP" => Instruction::Pop { reg: single_register(operand, mnemonic, line_num)? },

            // Control flow
            "JMP" => Instruction::Jmp { reg: single_register(operand, mnemonic, line_num)? },
            "JEQ" => Instruction::Jeq { reg: single_register(operand, mnemonic, line_num)? },
            "JNE" => Instruction::Jne { reg: single_register(operand, mnemonic, line_num)? },
            "CALL" => Instruction::Call { reg: single_register(operand, mnemonic, line_num)? },
            "RET" => Instruction::Ret,
            "HLT" | "HALT" => Instruction::Hlt,

            // Output
            "PRN" => Instruction::Prn { reg: single_register(operand, mnemonic, line_num)? },

            _ => return Err(AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.to_string(),
            }),
        };

        Ok(instr)
    }

    /// Parse a value token that will land at the next output byte.
    fn parse_value(&mut self, token: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let index = self.output.len();
        self.parse_value_at(token, index, line_num)
    }

    /// Parse a value token destined for a known output byte index:
    /// a numeric literal, or a label reference patched in pass 2.
    fn parse_value_at(&mut self, token: &str, index: usize, line_num: usize)
        -> Result<u8, AssemblerError>
    {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return self.parse_literal(token, line_num);
        }

        // Label reference: emit a placeholder, resolve in pass 2
        self.pending.push((index, token.to_uppercase(), line_num));
        Ok(0)
    }

    /// Parse a numeric literal: decimal, 0x hex, or 0b binary.
    fn parse_literal(&self, token: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if let Some(bin) = token.strip_prefix("0b").or_else(|| token.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2)
        } else {
            token.parse::<i64>()
        };

        let value = parsed.map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid numeric literal {:?}", token),
        })?;

        u8::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange {
            line: line_num,
            value,
        })
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (index, label, line_num) in &self.pending {
            let addr = self.symbols.get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;

            let byte = u8::try_from(*addr).map_err(|_| AssemblerError::ValueOutOfRange {
                line: *line_num,
                value: *addr as i64,
            })?;

            self.output[*index] = byte;
        }
        Ok(())
    }
}

fn require_operand<'a>(operand: Option<&'a str>, mnemonic: &str, line_num: usize)
    -> Result<&'a str, AssemblerError>
{
    operand.ok_or_else(|| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("{} requires an operand", mnemonic),
    })
}

/// Split a two-operand field like `R0,R1` or `R0,8`.
fn split_pair<'a>(operand: Option<&'a str>, mnemonic: &str, line_num: usize)
    -> Result<(&'a str, &'a str), AssemblerError>
{
    let operand = require_operand(operand, mnemonic, line_num)?;
    operand.split_once(',')
        .map(|(a, b)| (a.trim(), b.trim()))
        .ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("{} requires two comma-separated operands", mnemonic),
        })
}

fn single_register(operand: Option<&str>, mnemonic: &str, line_num: usize)
    -> Result<u8, AssemblerError>
{
    parse_register(require_operand(operand, mnemonic, line_num)?, line_num)
}

/// Parse a register token: `R0` through `R7`.
fn parse_register(token: &str, line_num: usize) -> Result<u8, AssemblerError> {
    token.strip_prefix('R')
        .or_else(|| token.strip_prefix('r'))
        .and_then(|digits| digits.parse::<u8>().ok())
        .filter(|&r| r < 8)
        .ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("expected a register R0-R7, found {:?}", token),
        })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            # Print the number 8
            LDI R0,8
            PRN R0
            HLT
        "#;

        let bytes = assemble(source).unwrap();
        assert_eq!(bytes, vec![0x82, 0x00, 0x08, 0x47, 0x00, 0x01]);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
            LDI R1,END
            JMP R1
            LDI R2,1
        END:
            HLT
        "#;

        let bytes = assemble(source).unwrap();
        // END is at address 8: LDI(3) + JMP(2) + LDI(3)
        assert_eq!(bytes[2], 8);
        assert_eq!(bytes[8], 0b0000_0001);
    }

    #[test]
    fn test_assemble_data() {
        let source = r#"
            HLT
            DS8 42
            DS8 0xFF
            DS8 0b101
        "#;

        let bytes = assemble(source).unwrap();
        assert_eq!(bytes, vec![0x01, 42, 0xFF, 5]);
    }

    #[test]
    fn test_assemble_org_pads() {
        let source = "HLT\nORG 4\nDS8 7\n";

        let bytes = assemble(source).unwrap();
        assert_eq!(bytes, vec![0x01, 0, 0, 0, 7]);
    }

    #[test]
    fn test_assemble_undefined_label() {
        let err = assemble("LDI R0,NOWHERE\nHLT\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UndefinedLabel { line: 1, .. }));
    }

    #[test]
    fn test_assemble_unknown_mnemonic() {
        let err = assemble("FROB R0\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UnknownMnemonic { line: 1, .. }));
    }

    #[test]
    fn test_assemble_value_out_of_range() {
        let err = assemble("LDI R0,300\n").unwrap_err();
        assert!(matches!(err, AssemblerError::ValueOutOfRange { line: 1, value: 300 }));
    }

    #[test]
    fn test_assembled_program_runs() {
        let source = r#"
            LDI R0,5
            LDI R1,3
            MUL R0,R1
            PRN R0
            HLT
        "#;

        let mut cpu = Cpu::new();
        cpu.load_program(&assemble(source).unwrap()).unwrap();
        cpu.run().unwrap();

        assert_eq!(cpu.output(), &[15]);
    }
}
