//! LS-8 register file and condition flags.
//!
//! The LS-8 has 8 byte-wide general-purpose registers, R0 through R7.
//! R7 is reserved by convention as the stack pointer and starts at 0xF4,
//! so the stack grows downward from near the top of memory. The program
//! counter and the E/L/G condition flags live alongside them.

use std::cmp::Ordering;
use serde::{Serialize, Deserialize};

/// Number of general-purpose registers.
pub const NUM_REGISTERS: usize = 8;

/// Register index reserved for the stack pointer.
pub const SP: u8 = 7;

/// Initial stack pointer value; the stack grows downward from here.
pub const STACK_TOP: u8 = 0xF4;

/// Condition flags set by CMP and read by the conditional jumps.
///
/// At most one flag is set at any time: a compare sets exactly one and
/// clears the other two, and the result persists until the next compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    /// Set when the compared registers were equal.
    pub equal: bool,
    /// Set when the first register was less than the second.
    pub less: bool,
    /// Set when the first register was greater than the second.
    pub greater: bool,
}

impl Flags {
    /// All flags clear, the state before any compare has run.
    pub const fn clear() -> Self {
        Self { equal: false, less: false, greater: false }
    }

    /// Compare two values and set exactly one flag.
    pub fn compare(&mut self, a: u8, b: u8) {
        *self = match a.cmp(&b) {
            Ordering::Equal => Self { equal: true, less: false, greater: false },
            Ordering::Less => Self { equal: false, less: true, greater: false },
            Ordering::Greater => Self { equal: false, less: false, greater: true },
        };
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.equal { 'E' } else { '-' },
            if self.less { 'L' } else { '-' },
            if self.greater { 'G' } else { '-' },
        )
    }
}

/// The LS-8 register file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7. R7 doubles as the stack pointer.
    regs: [u8; NUM_REGISTERS],

    /// Program counter: address of the next instruction to fetch.
    /// Wider than a byte so an advance past 255 faults on the next
    /// fetch instead of wrapping.
    pub pc: u16,

    /// E/L/G condition flags.
    pub flags: Flags,
}

impl Registers {
    /// Create a new register file: everything zeroed, SP at [`STACK_TOP`].
    pub fn new() -> Self {
        let mut regs = [0; NUM_REGISTERS];
        regs[SP as usize] = STACK_TOP;
        Self {
            regs,
            pc: 0,
            flags: Flags::clear(),
        }
    }

    /// Reset all registers to their power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general-purpose register.
    ///
    /// # Panics
    /// Panics if the index is out of range. Operand bytes from a running
    /// program are validated during decode, so this is unreachable from
    /// the execution engine.
    #[inline]
    pub fn read(&self, r: u8) -> u8 {
        assert!((r as usize) < NUM_REGISTERS, "Register index {} out of range (0-7)", r);
        self.regs[r as usize]
    }

    /// Write a general-purpose register.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    #[inline]
    pub fn write(&mut self, r: u8, value: u8) {
        assert!((r as usize) < NUM_REGISTERS, "Register index {} out of range (0-7)", r);
        self.regs[r as usize] = value;
    }

    /// Current stack pointer value.
    #[inline]
    pub fn sp(&self) -> u8 {
        self.regs[SP as usize]
    }

    /// Set the stack pointer.
    #[inline]
    pub fn set_sp(&mut self, value: u8) {
        self.regs[SP as usize] = value;
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = u16::from(addr);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_initial_state() {
        let regs = Registers::new();

        for r in 0..NUM_REGISTERS as u8 {
            if r == SP {
                assert_eq!(regs.read(r), STACK_TOP);
            } else {
                assert_eq!(regs.read(r), 0);
            }
        }
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.flags, Flags::clear());
    }

    #[test]
    fn test_read_write() {
        let mut regs = Registers::new();

        regs.write(3, 0xAB);
        assert_eq!(regs.read(3), 0xAB);
    }

    #[test]
    fn test_compare_sets_one_flag() {
        let mut flags = Flags::clear();

        flags.compare(5, 5);
        assert_eq!(flags, Flags { equal: true, less: false, greater: false });

        flags.compare(3, 5);
        assert_eq!(flags, Flags { equal: false, less: true, greater: false });

        flags.compare(5, 3);
        assert_eq!(flags, Flags { equal: false, less: false, greater: true });
    }

    proptest! {
        #[test]
        fn compare_is_exclusive(a: u8, b: u8) {
            let mut flags = Flags::clear();
            flags.compare(a, b);

            let set = [flags.equal, flags.less, flags.greater]
                .iter()
                .filter(|&&f| f)
                .count();
            prop_assert_eq!(set, 1);
        }

        #[test]
        fn compare_swapped_operands(a: u8, b: u8) {
            let mut forward = Flags::clear();
            let mut swapped = Flags::clear();
            forward.compare(a, b);
            swapped.compare(b, a);

            prop_assert_eq!(forward.equal, swapped.equal);
            prop_assert_eq!(forward.less, swapped.greater);
            prop_assert_eq!(forward.greater, swapped.less);
        }
    }
}
