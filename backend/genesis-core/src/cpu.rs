//! Minimal CPU-side bookkeeping: the bus-interface boundary both CPUs are
//! driven through, and the register/cycle state the debugger's `p` command
//! and single-step logic need. Instruction decoding and execution are out
//! of scope (§1); this module only carries what a caller outside the
//! decoder needs to observe or drive.

/// Bus-interface boundary the (externally supplied) main-CPU decoder would
/// be written against, grounded on `m68000-emu`'s own `BusInterface` trait.
/// `MainBus` in `memory.rs` is the concrete implementor.
pub trait BusInterface {
    const ADDRESS_MASK: u32 = 0x00FF_FFFF;

    fn read_byte(&mut self, address: u32) -> u8;
    fn read_word(&mut self, address: u32) -> u16;
    fn write_byte(&mut self, address: u32, value: u8);
    fn write_word(&mut self, address: u32, value: u16);

    fn read_long_word(&mut self, address: u32) -> u32 {
        let high = self.read_word(address);
        let low = self.read_word(address.wrapping_add(2));
        (u32::from(high) << 16) | u32::from(low)
    }

    fn write_long_word(&mut self, address: u32, value: u32) {
        self.write_word(address, (value >> 16) as u16);
        self.write_word(address.wrapping_add(2), value as u16);
    }

    /// Auto-vectored interrupt level; 0 means no interrupt requested.
    fn interrupt_level(&self) -> u8;
    fn acknowledge_interrupt(&mut self);
}

/// Main-CPU (68000) register file and cycle position, as far as the
/// debugger's `p` command and the bus glue need to see it. Populated by
/// whatever decoder/translator drives it; this crate never mutates it on
/// its own other than advancing `current_cycle` and the status register's
/// IPL field around interrupt acknowledgement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainCpuRegisters {
    pub d: [u32; 8],
    pub a: [u32; 8],
    pub pc: u32,
    pub sr: u16,
    pub current_cycle: u64,
}

impl MainCpuRegisters {
    #[must_use]
    pub fn ipl(&self) -> u8 {
        (self.sr & 7) as u8
    }

    pub fn set_ipl(&mut self, level: u8) {
        self.sr = (self.sr & !7) | u16::from(level & 7);
    }
}

/// Sound-CPU (Z80) register file and cycle position; far less of it is
/// observable from outside the decoder, so only what the bus glue and
/// interrupt scheduler actually reference is carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoundCpuRegisters {
    pub pc: u16,
    pub current_cycle: u64,
    pub interrupts_enabled: bool,
    /// Sound-domain cycle at which an `EI`-equivalent's one-instruction
    /// acceptance delay elapses; `current_cycle` until set otherwise.
    pub interrupts_enabled_at_cycle: u64,
}

/// What a single-step over the instruction at the debugger's current
/// address should do, per §4.10's per-opcode breakpoint placement rules.
/// Produced by the (out-of-scope) disassembler; this crate only consumes
/// it to decide where to install breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedStep {
    /// Break at the textual next instruction address.
    Ordinary { next_address: u32 },
    /// `rts`/`rtr`/etc.: the return address is read from the stack at A7.
    SubroutineReturn,
    /// A conditional branch whose condition is always true: break at the
    /// target, never at the fall-through.
    AlwaysTrueBranch { target: u32 },
    /// An ordinary conditional branch: install breakpoints at both paths.
    ConditionalBranch { fall_through: u32, target: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipl_round_trips_through_status_register() {
        let mut regs = MainCpuRegisters::default();
        regs.sr = 0x2700;
        regs.set_ipl(4);
        assert_eq!(regs.ipl(), 4);
        assert_eq!(regs.sr & !7, 0x2700);
    }
}
