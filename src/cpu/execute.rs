//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Instruction, DecodeError};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::NUM_REGISTERS;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// CPU stopped on an invariant violation. Terminal, like Halted.
    Faulted,
}

/// One completed fetch-decode-execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// The instruction that was executed.
    pub instr: Instruction,
    /// Value emitted by PRN, if this instruction produced output.
    pub output: Option<u8>,
}

/// The LS-8 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers, program counter, and flags.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Every value PRN has emitted, in order. The engine never prints;
    /// frontends render this log or the per-step output.
    output: Vec<u8>,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU in its power-on state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            output: Vec::new(),
            last_instr: None,
        }
    }

    /// Reset the CPU to its initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.output.clear();
        self.last_instr = None;
    }

    /// Load a program image into memory at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)
    }

    /// Execute a single instruction.
    ///
    /// Any error transitions the CPU to [`CpuState::Faulted`] before it
    /// is returned; Faulted and Halted are terminal.
    pub fn step(&mut self) -> Result<Step, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        match self.try_step() {
            Ok(step) => Ok(step),
            Err(e) => {
                self.state = CpuState::Faulted;
                Err(e)
            }
        }
    }

    fn try_step(&mut self) -> Result<Step, CpuError> {
        // Fetch: the opcode's count bits say how many operand bytes to
        // read, so only the bytes the instruction actually uses are
        // bounds-checked.
        let pc = i32::from(self.regs.pc);
        let op = self.mem.read(pc)?;
        let len = decode::instruction_len(op).ok_or(DecodeError::UnknownOpcode(op))?;
        let a = if len > 1 { self.mem.read(pc + 1)? } else { 0 };
        let b = if len > 2 { self.mem.read(pc + 2)? } else { 0 };

        // Decode
        let instr = decode::decode(op, a, b)?;

        // Execute
        let output = self.execute(instr)?;

        // Update state
        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(Step { instr, output })
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed. PRN values accumulate
    /// in [`Cpu::output`].
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    ///
    /// The bound guards against programs with no reachable HLT, which
    /// would otherwise loop forever.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    ///
    /// Each handler either assigns the fall-through address (`pc` plus
    /// the instruction length) or an explicit jump target; HLT leaves
    /// the program counter at the halt instruction.
    fn execute(&mut self, instr: Instruction) -> Result<Option<u8>, CpuError> {
        let mut output = None;
        let next = self.regs.pc + instr.len();

        match instr {
            // ==================== Data Movement ====================

            Instruction::Ldi { reg, value } => {
                self.regs.write(reg, value);
                self.regs.pc = next;
            }

            // ==================== Arithmetic ====================

            Instruction::Add { reg_a, reg_b } => {
                let sum = self.regs.read(reg_a).wrapping_add(self.regs.read(reg_b));
                self.regs.write(reg_a, sum);
                self.regs.pc = next;
            }

            Instruction::Mul { reg_a, reg_b } => {
                let product = self.regs.read(reg_a).wrapping_mul(self.regs.read(reg_b));
                self.regs.write(reg_a, product);
                self.regs.pc = next;
            }

            Instruction::Cmp { reg_a, reg_b } => {
                let a = self.regs.read(reg_a);
                let b = self.regs.read(reg_b);
                self.regs.flags.compare(a, b);
                self.regs.pc = next;
            }

            // ==================== Stack ====================

            Instruction::Push { reg } => {
                let value = self.regs.read(reg);
                self.push_byte(value)?;
                self.regs.pc = next;
            }

            Instruction::Pop { reg } => {
                let value = self.pop_byte()?;
                self.regs.write(reg, value);
                self.regs.pc = next;
            }

            // ==================== Control Flow ====================

            Instruction::Jmp { reg } => {
                let target = self.regs.read(reg);
                self.regs.jump(target);
            }

            Instruction::Jeq { reg } => {
                if self.regs.flags.equal {
                    let target = self.regs.read(reg);
                    self.regs.jump(target);
                } else {
                    self.regs.pc = next;
                }
            }

            Instruction::Jne { reg } => {
                if !self.regs.flags.equal {
                    let target = self.regs.read(reg);
                    self.regs.jump(target);
                } else {
                    self.regs.pc = next;
                }
            }

            Instruction::Call { reg } => {
                // The return address shares the data stack with pushed
                // register values; unbalanced pushes before RET corrupt it.
                let ret = u8::try_from(next)
                    .map_err(|_| MemoryError::AddressOutOfRange(i32::from(next)))?;
                self.push_byte(ret)?;
                let target = self.regs.read(reg);
                self.regs.jump(target);
            }

            Instruction::Ret => {
                let addr = self.pop_byte()?;
                self.regs.jump(addr);
            }

            Instruction::Hlt => {
                self.state = CpuState::Halted;
            }

            // ==================== Output ====================

            Instruction::Prn { reg } => {
                let value = self.regs.read(reg);
                self.output.push(value);
                output = Some(value);
                self.regs.pc = next;
            }
        }

        Ok(output)
    }

    /// Push one byte onto the stack: decrement SP, then store.
    fn push_byte(&mut self, value: u8) -> Result<(), CpuError> {
        let addr = i32::from(self.regs.sp()) - 1;
        self.mem.write(addr, value)?;
        self.regs.set_sp(addr as u8);
        Ok(())
    }

    /// Pop one byte off the stack: load from SP, then increment.
    fn pop_byte(&mut self) -> Result<u8, CpuError> {
        let addr = i32::from(self.regs.sp());
        let value = self.mem.read(addr)?;

        // The stack pointer itself must stay a valid address.
        let next = addr + 1;
        if next >= crate::cpu::memory::MEMORY_SIZE as i32 {
            return Err(CpuError::MemoryError(MemoryError::AddressOutOfRange(next)));
        }
        self.regs.set_sp(next as u8);
        Ok(value)
    }

    /// Render a one-line trace of the CPU state: the program counter,
    /// the three bytes at it, all register values, and the flags.
    pub fn trace(&self) -> String {
        let pc = i32::from(self.regs.pc);
        let byte_at = |offset: i32| match self.mem.read(pc + offset) {
            Ok(value) => format!("{:02X}", value),
            Err(_) => "--".to_string(),
        };

        let regs = (0..NUM_REGISTERS as u8)
            .map(|r| format!("{:02X}", self.regs.read(r)))
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "TRACE: {:02X} | {} {} {} | {} | {}",
            self.regs.pc,
            byte_at(0),
            byte_at(1),
            byte_at(2),
            regs,
            self.regs.flags,
        )
    }

    /// Every value PRN has emitted so far, in order.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Check if the CPU stopped on a fault.
    pub fn is_faulted(&self) -> bool {
        self.state == CpuState::Faulted
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::{SP, STACK_TOP};
    use proptest::prelude::*;

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    fn run_program(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(instructions)).unwrap();
        cpu.run().unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[Instruction::Hlt])).unwrap();

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0);
    }

    #[test]
    fn test_cpu_ldi() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 8 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(0), 8);
    }

    #[test]
    fn test_cpu_prn_output() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 8 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.output(), &[8]);
    }

    #[test]
    fn test_cpu_multiply() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 5 },
            Instruction::Ldi { reg: 1, value: 3 },
            Instruction::Mul { reg_a: 0, reg_b: 1 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.output(), &[15]);
    }

    #[test]
    fn test_cpu_add_wraps_at_8_bits() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 200 },
            Instruction::Ldi { reg: 1, value: 100 },
            Instruction::Add { reg_a: 0, reg_b: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(0), 44);
    }

    #[test]
    fn test_cpu_mul_wraps_at_8_bits() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 16 },
            Instruction::Ldi { reg: 1, value: 16 },
            Instruction::Mul { reg_a: 0, reg_b: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(0), 0);
    }

    #[test]
    fn test_cpu_cmp_sets_flags_only() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 3 },
            Instruction::Ldi { reg: 1, value: 5 },
            Instruction::Cmp { reg_a: 0, reg_b: 1 },
            Instruction::Hlt,
        ]);

        assert!(cpu.regs.flags.less);
        assert!(!cpu.regs.flags.equal);
        assert!(!cpu.regs.flags.greater);
        // CMP must not disturb the registers
        assert_eq!(cpu.regs.read(0), 3);
        assert_eq!(cpu.regs.read(1), 5);
    }

    #[test]
    fn test_cpu_jmp() {
        // 0: LDI R0,8  3: JMP R0  5: LDI R1,1  8: HLT
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 8 },
            Instruction::Jmp { reg: 0 },
            Instruction::Ldi { reg: 1, value: 1 },
            Instruction::Hlt,
        ]);

        // The LDI at address 5 was jumped over
        assert_eq!(cpu.regs.read(1), 0);
        assert_eq!(cpu.cycles, 3);
    }

    #[test]
    fn test_cpu_jeq_taken() {
        // 0: LDI R0,5  3: LDI R1,5  6: CMP  9: LDI R2,17  12: JEQ R2
        // 14: LDI R3,1  17: HLT
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 5 },
            Instruction::Ldi { reg: 1, value: 5 },
            Instruction::Cmp { reg_a: 0, reg_b: 1 },
            Instruction::Ldi { reg: 2, value: 17 },
            Instruction::Jeq { reg: 2 },
            Instruction::Ldi { reg: 3, value: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(3), 0);
    }

    #[test]
    fn test_cpu_jeq_falls_through() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 5 },
            Instruction::Ldi { reg: 1, value: 6 },
            Instruction::Cmp { reg_a: 0, reg_b: 1 },
            Instruction::Ldi { reg: 2, value: 17 },
            Instruction::Jeq { reg: 2 },
            Instruction::Ldi { reg: 3, value: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(3), 1);
    }

    #[test]
    fn test_cpu_jne_taken() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 5 },
            Instruction::Ldi { reg: 1, value: 6 },
            Instruction::Cmp { reg_a: 0, reg_b: 1 },
            Instruction::Ldi { reg: 2, value: 17 },
            Instruction::Jne { reg: 2 },
            Instruction::Ldi { reg: 3, value: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(3), 0);
    }

    #[test]
    fn test_cpu_push_pop() {
        let cpu = run_program(&[
            Instruction::Ldi { reg: 0, value: 42 },
            Instruction::Push { reg: 0 },
            Instruction::Pop { reg: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(cpu.regs.read(1), 42);
        // Down one, up one: net zero stack movement
        assert_eq!(cpu.regs.sp(), STACK_TOP);
    }

    #[test]
    fn test_cpu_call_ret() {
        // 0: LDI R1,7  3: CALL R1  5: HLT  [6: pad]  7: LDI R0,42  10: RET
        let mut cpu = Cpu::new();
        let mut program = make_program(&[
            Instruction::Ldi { reg: 1, value: 7 },
            Instruction::Call { reg: 1 },
            Instruction::Hlt,
        ]);
        program.push(0); // pad to address 7
        program.extend(make_program(&[
            Instruction::Ldi { reg: 0, value: 42 },
            Instruction::Ret,
        ]));
        cpu.load_program(&program).unwrap();

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(0), 42);
        // RET came back to the byte after CALL, where HLT sits
        assert_eq!(cpu.regs.pc, 5);
        assert_eq!(cpu.regs.sp(), STACK_TOP);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_cpu_call_unbalanced_push_corrupts_return() {
        // The return address and pushed data share one stack. A PUSH
        // inside the subroutine with no matching POP makes RET jump to
        // the pushed value instead of the return address.
        let mut cpu = Cpu::new();
        let mut program = make_program(&[
            Instruction::Ldi { reg: 1, value: 7 },
            Instruction::Call { reg: 1 },
            Instruction::Hlt,
        ]);
        program.push(0); // pad to address 7
        program.extend(make_program(&[
            Instruction::Ldi { reg: 0, value: 99 },
            Instruction::Push { reg: 0 },
            Instruction::Ret,
        ]));
        cpu.load_program(&program).unwrap();

        let err = cpu.run().unwrap_err();

        // RET "returned" to address 99, which holds a zero byte
        assert_eq!(cpu.regs.pc, 99);
        assert!(matches!(
            err,
            CpuError::DecodeError(DecodeError::UnknownOpcode(0))
        ));
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_cpu_unknown_opcode_faults() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0b1111_1111]).unwrap();

        let err = cpu.run().unwrap_err();

        assert!(matches!(
            err,
            CpuError::DecodeError(DecodeError::UnknownOpcode(0xFF))
        ));
        assert!(cpu.is_faulted());
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_cpu_unsupported_alu_op_faults() {
        // ALU bit set, but not ADD/MUL/CMP
        let mut cpu = Cpu::new();
        cpu.load_program(&[0b1010_0001, 0, 1]).unwrap();

        let err = cpu.run().unwrap_err();

        assert!(matches!(
            err,
            CpuError::DecodeError(DecodeError::UnsupportedAluOp(0b1010_0001))
        ));
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_cpu_stack_overflow_faults() {
        // Point SP at the bottom of memory, then push past it
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: SP, value: 0 },
            Instruction::Push { reg: 0 },
            Instruction::Hlt,
        ])).unwrap();

        let err = cpu.run().unwrap_err();

        assert!(matches!(
            err,
            CpuError::MemoryError(MemoryError::AddressOutOfRange(-1))
        ));
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_cpu_stack_underflow_faults() {
        // Pop with SP at the top of memory would push SP out of range
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: SP, value: 0xFF },
            Instruction::Pop { reg: 0 },
            Instruction::Hlt,
        ])).unwrap();

        let err = cpu.run().unwrap_err();

        assert!(matches!(
            err,
            CpuError::MemoryError(MemoryError::AddressOutOfRange(256))
        ));
        assert!(cpu.is_faulted());
    }

    #[test]
    fn test_cpu_run_limited_bounds_runaway_program() {
        // 0: LDI R0,0  3: JMP R0 — no HLT anywhere
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: 0, value: 0 },
            Instruction::Jmp { reg: 0 },
        ])).unwrap();

        let executed = cpu.run_limited(100).unwrap();

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_cpu_step_after_halt() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[Instruction::Hlt])).unwrap();
        cpu.run().unwrap();

        assert!(matches!(
            cpu.step(),
            Err(CpuError::NotRunning(CpuState::Halted))
        ));
    }

    proptest! {
        #[test]
        fn ldi_then_read_back(reg in 0u8..8, value: u8) {
            let cpu = run_program(&[
                Instruction::Ldi { reg, value },
                Instruction::Hlt,
            ]);
            prop_assert_eq!(cpu.regs.read(reg), value);
        }

        #[test]
        fn push_pop_restores_value(src in 0u8..7, dst in 0u8..7, value: u8) {
            let cpu = run_program(&[
                Instruction::Ldi { reg: src, value },
                Instruction::Push { reg: src },
                Instruction::Pop { reg: dst },
                Instruction::Hlt,
            ]);
            prop_assert_eq!(cpu.regs.read(dst), value);
            prop_assert_eq!(cpu.regs.sp(), STACK_TOP);
        }
    }
}
