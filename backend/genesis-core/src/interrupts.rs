//! Main/sound-CPU interrupt scheduling (§4.9). The VDP is the only
//! interrupt source the bus glue cares about; everything else (the IPL
//! mask on the status register, the sound CPU's own enable-delay pipeline
//! effect) lives here rather than inside the VDP port itself.

use crate::clock::{self, CYCLE_NEVER};
use crate::vdp_port::VdpPort;

/// `int_cycle`/`int_num` pair the frame scheduler feeds into
/// `target_cycle = min(int_cycle, sync_cycle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInterrupt {
    pub main_cycle: u64,
    pub level: u8,
}

/// Computes the main CPU's next interrupt, if any, per §4.9: VINT (level 6)
/// wins over HINT (level 4) when both are possible and VINT arrives no
/// later; either is masked out once `status & 7` is at least as high.
#[must_use]
pub fn next_main_interrupt(status: u16, vdp: &VdpPort) -> Option<PendingInterrupt> {
    let ipl = (status & 7) as u8;

    let vint = if ipl < 6 { vdp.next_vint_mclk() } else { None };
    let hint = if ipl < 4 { vdp.next_hint_mclk() } else { None };

    match (vint, hint) {
        (Some(v), Some(h)) if h < v => Some(PendingInterrupt { main_cycle: clock::mclk_to_main(h), level: 4 }),
        (Some(v), _) => Some(PendingInterrupt { main_cycle: clock::mclk_to_main(v), level: 6 }),
        (None, Some(h)) => Some(PendingInterrupt { main_cycle: clock::mclk_to_main(h), level: 4 }),
        (None, None) => None,
    }
}

/// The sound CPU only cares about VINT, taken in its own clock domain and
/// clamped to not precede `interrupts_enabled_at_sound_cycle` — reflecting
/// the one-instruction pipeline delay after an `EI`-equivalent before
/// interrupts are actually accepted.
#[must_use]
pub fn next_sound_interrupt(vdp: &VdpPort, interrupts_enabled_at_sound_cycle: u64) -> u64 {
    match vdp.next_vint_mclk() {
        Some(vint_mclk) => clock::mclk_to_sound(vint_mclk).max(interrupts_enabled_at_sound_cycle),
        None => CYCLE_NEVER,
    }
}

#[must_use]
pub fn target_cycle(int_cycle: Option<u64>, sync_cycle: u64) -> u64 {
    match int_cycle {
        Some(cycle) => cycle.min(sync_cycle),
        None => sync_cycle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimingMode;

    #[test]
    fn vint_enabled_and_sooner_wins_when_hint_disabled() {
        let vdp = VdpPort::new(TimingMode::Ntsc);
        let interrupt = next_main_interrupt(0, &vdp);
        assert!(interrupt.is_none());
    }

    #[test]
    fn masked_by_status_register_ipl() {
        let mut vdp = VdpPort::new(TimingMode::Ntsc);
        vdp.write_word(0xC00004, 0x8120, 0, &mut ());
        assert!(next_main_interrupt(0, &vdp).is_some());
        assert!(next_main_interrupt(6, &vdp).is_none());
    }

    #[test]
    fn target_cycle_picks_the_sooner_of_interrupt_and_sync() {
        assert_eq!(target_cycle(Some(100), 200), 100);
        assert_eq!(target_cycle(Some(300), 200), 200);
        assert_eq!(target_cycle(None, 200), 200);
    }
}
