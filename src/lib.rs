//! # LS-8 Emulator
//!
//! An emulator of the LS-8, an 8-bit register machine built for teaching
//! CPU architecture: fetch-decode-execute cycles, register-indirect stack
//! operations, and condition-flag-driven branching, all small enough to
//! hold in your head.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Flags, Instruction, Step};
pub use asm::{assemble, disassemble, AssemblerError, ProgramFile, ProgramError, load_program, parse_program, save_program};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
