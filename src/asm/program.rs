//! LS-8 program file format.
//!
//! Programs are plain text, one 8-bit binary literal per line:
//! - `#` introduces a comment, inline or whole-line
//! - blank lines are ignored
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 01000111 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```

use std::path::Path;
use std::io::{BufRead, BufReader, Write};
use thiserror::Error;

/// A loaded program file.
#[derive(Debug, Clone)]
pub struct ProgramFile {
    /// The program byte image, loaded at address 0.
    pub bytes: Vec<u8>,
    /// Original source lines (for debugging).
    pub source_lines: Vec<String>,
}

impl ProgramFile {
    /// Create a new empty program file.
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            source_lines: Vec::new(),
        }
    }

    /// Add a byte with its source line.
    pub fn push(&mut self, byte: u8, source: &str) {
        self.bytes.push(byte);
        self.source_lines.push(source.to_string());
    }

    /// Get the number of program bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for ProgramFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse program text into its byte image.
///
/// Errors before the engine ever starts: a line that is not a valid
/// 8-bit binary literal is reported with its line number.
pub fn parse_program(source: &str) -> Result<Vec<u8>, ProgramError> {
    let mut bytes = Vec::new();

    for (line_num, line) in source.lines().enumerate() {
        let code = line.split('#').next().unwrap_or("").trim();

        if code.is_empty() {
            continue;
        }

        let value = u8::from_str_radix(code, 2).map_err(|_| ProgramError::ParseError {
            line: line_num + 1,
            message: format!("expected an 8-bit binary literal, found {:?}", code),
        })?;

        bytes.push(value);
    }

    Ok(bytes)
}

/// Load a program file from disk.
pub fn load_program<P: AsRef<Path>>(path: P) -> Result<ProgramFile, ProgramError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| ProgramError::IoError(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut program = ProgramFile::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| ProgramError::IoError(e.to_string()))?;
        let code = line.split('#').next().unwrap_or("").trim();

        if code.is_empty() {
            continue;
        }

        let value = u8::from_str_radix(code, 2).map_err(|_| ProgramError::ParseError {
            line: line_num + 1,
            message: format!("expected an 8-bit binary literal, found {:?}", code),
        })?;

        program.push(value, line.trim());
    }

    Ok(program)
}

/// Save a program file to disk.
pub fn save_program<P: AsRef<Path>>(path: P, program: &ProgramFile) -> Result<(), ProgramError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ProgramError::IoError(e.to_string()))?;

    writeln!(file, "# LS-8 program file")
        .map_err(|e| ProgramError::IoError(e.to_string()))?;
    writeln!(file, "# {} bytes", program.len())
        .map_err(|e| ProgramError::IoError(e.to_string()))?;
    writeln!(file).map_err(|e| ProgramError::IoError(e.to_string()))?;

    for (addr, byte) in program.bytes.iter().enumerate() {
        writeln!(file, "{:08b} # 0x{:02X}", byte, addr)
            .map_err(|e| ProgramError::IoError(e.to_string()))?;
    }

    Ok(())
}

/// Save a raw byte image directly to a program file.
pub fn save_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ProgramError> {
    let program = ProgramFile {
        bytes: bytes.to_vec(),
        source_lines: bytes.iter().map(|b| format!("{:08b}", b)).collect(),
    };
    save_program(path, &program)
}

/// Errors that can occur while loading or saving program files.
#[derive(Debug, Clone, Error)]
pub enum ProgramError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}
