//! WebAssembly bindings for the LS-8 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::Cpu;
use crate::asm::assembler::assemble;
use crate::asm::disasm::{disassemble, format_instruction};
use crate::asm::program::parse_program;
use crate::cpu::registers::NUM_REGISTERS;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    program: Vec<u8>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            program: Vec::new(),
        }
    }

    /// Load a program from `.ls8` binary-literal text.
    #[wasm_bindgen]
    pub fn load_source(&mut self, source: &str) -> Result<usize, JsError> {
        let bytes = parse_program(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load_bytes(bytes)
    }

    /// Load a program from assembly source code.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let bytes = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load_bytes(bytes)
    }

    fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<usize, JsError> {
        let len = bytes.len();
        self.program = bytes;
        self.cpu = Cpu::new();
        self.cpu.load_program(&self.program)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(len)
    }

    /// Step one instruction. Returns the disassembled instruction,
    /// with any PRN output appended.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.cpu.is_running() {
            return Err(JsError::new("CPU is not running"));
        }

        let step = self.cpu.step()
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        let text = format_instruction(&step.instr);
        Ok(match step.output {
            Some(value) => format!("{}  => {}", text, value),
            None => text,
        })
    }

    /// Run until halt or max cycles.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> u64 {
        let _ = self.cpu.run_limited(u64::from(max_cycles));
        self.cpu.cycles
    }

    /// Reset CPU to initial state with loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu = Cpu::new();
        if !self.program.is_empty() {
            let _ = self.cpu.load_program(&self.program);
        }
    }

    /// Check if CPU is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Check if CPU stopped on a fault.
    #[wasm_bindgen]
    pub fn is_faulted(&self) -> bool {
        self.cpu.is_faulted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    /// Get a general-purpose register value (0-7).
    #[wasm_bindgen]
    pub fn register(&self, r: u8) -> u8 {
        if (r as usize) < NUM_REGISTERS {
            self.cpu.regs.read(r)
        } else {
            0
        }
    }

    /// Get the stack pointer.
    #[wasm_bindgen]
    pub fn sp(&self) -> u8 {
        self.cpu.regs.sp()
    }

    /// Get the condition flags as a string, e.g. `E--`.
    #[wasm_bindgen]
    pub fn flags(&self) -> String {
        format!("{}", self.cpu.regs.flags)
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get memory cell value at an address (0-255).
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u8 {
        if addr < crate::cpu::memory::MEMORY_SIZE {
            self.cpu.mem.get(addr)
        } else {
            0
        }
    }

    /// Get all memory as an array of bytes.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<u8> {
        (0..crate::cpu::memory::MEMORY_SIZE)
            .map(|i| self.cpu.mem.get(i))
            .collect()
    }

    /// Get everything PRN has emitted, one value per line.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.cpu.output()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get registers and machine state as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> String {
        let regs: Vec<u8> = (0..NUM_REGISTERS as u8)
            .map(|r| self.cpu.regs.read(r))
            .collect();

        serde_json::json!({
            "regs": regs,
            "pc": self.cpu.regs.pc,
            "flags": format!("{}", self.cpu.regs.flags),
            "state": format!("{:?}", self.cpu.state),
            "cycles": self.cpu.cycles,
        })
        .to_string()
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the program bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u8>, JsError> {
    assemble(source).map_err(|e| JsError::new(&format!("{}", e)))
}

/// Disassemble a program byte image to a listing.
#[wasm_bindgen]
pub fn wasm_disassemble(bytes: Vec<u8>) -> String {
    disassemble(&bytes)
}
