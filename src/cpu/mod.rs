//! CPU emulation for the LS-8 machine.
//!
//! This module implements the complete LS-8 architecture:
//! - 256 byte-wide memory cells
//! - 8 general-purpose registers, R7 doubling as the stack pointer
//! - E/L/G condition flags driven by CMP
//! - a 13-instruction set with 1-3 byte instructions

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::Memory;
pub use registers::{Registers, Flags};
pub use decode::{Instruction, DecodeError};
pub use execute::{Cpu, CpuError, CpuState, Step};
