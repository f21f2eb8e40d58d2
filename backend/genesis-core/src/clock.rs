//! Conversions between the four clock domains that drive the machine.
//!
//! `M = 7 * main = 15 * sound = 240 * psg`. All conversions are integer
//! division with truncation; callers needing rounding document it locally.

/// Master clocks per main-CPU (68000) cycle.
pub const MCLKS_PER_MAIN: u64 = 7;
/// Master clocks per sound-CPU (Z80) cycle.
pub const MCLKS_PER_SOUND: u64 = 15;
/// Master clocks per PSG cycle.
pub const MCLKS_PER_PSG: u64 = MCLKS_PER_SOUND * 16;
/// Master clocks the FM chip advances per generated sample.
pub const MCLKS_PER_FM_SAMPLE: u64 = 6;

/// Master-cycle length of one scanline, constant across NTSC/PAL.
pub const MCLKS_PER_SCANLINE: u64 = 3420;

pub const NTSC_SCANLINES_PER_FRAME: u64 = 262;
pub const PAL_SCANLINES_PER_FRAME: u64 = 312;

/// Sentinel meaning "no scheduled event"; never reached by normal arithmetic
/// because device cycle counts are bounded to within one frame by the
/// frame-boundary rebase.
pub const CYCLE_NEVER: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingMode {
    Ntsc,
    Pal,
}

impl TimingMode {
    #[must_use]
    pub const fn scanlines_per_frame(self) -> u64 {
        match self {
            Self::Ntsc => NTSC_SCANLINES_PER_FRAME,
            Self::Pal => PAL_SCANLINES_PER_FRAME,
        }
    }

    #[must_use]
    pub const fn mclks_per_frame(self) -> u64 {
        self.scanlines_per_frame() * MCLKS_PER_SCANLINE
    }
}

/// Converts a master-cycle count to the main-CPU domain, truncating.
#[must_use]
pub const fn mclk_to_main(mclk: u64) -> u64 {
    mclk / MCLKS_PER_MAIN
}

/// Converts a main-CPU cycle count to master cycles.
#[must_use]
pub const fn main_to_mclk(main: u64) -> u64 {
    main * MCLKS_PER_MAIN
}

/// Converts a master-cycle count to the sound-CPU domain, truncating.
#[must_use]
pub const fn mclk_to_sound(mclk: u64) -> u64 {
    mclk / MCLKS_PER_SOUND
}

/// Converts a sound-CPU cycle count to master cycles.
#[must_use]
pub const fn sound_to_mclk(sound: u64) -> u64 {
    sound * MCLKS_PER_SOUND
}

/// Converts directly between main-CPU and sound-CPU domains, as used by the
/// bus arbiter's acknowledge/release latency computations.
#[must_use]
pub const fn sound_to_main(sound: u64) -> u64 {
    (sound * MCLKS_PER_SOUND) / MCLKS_PER_MAIN
}

#[must_use]
pub const fn mclk_to_psg(mclk: u64) -> u64 {
    mclk / MCLKS_PER_PSG
}

/// `current_cycle`/`sync_cycle`/`target_cycle` bookkeeping shared by every
/// clocked device other than the main CPU (the main CPU is the driver of
/// time and does not carry this triple itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCursor {
    pub current_cycle: u64,
    pub sync_cycle: u64,
}

impl CycleCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { current_cycle: 0, sync_cycle: 0 }
    }

    #[must_use]
    pub const fn target_cycle(&self, next_interrupt: u64) -> u64 {
        if self.sync_cycle < next_interrupt { self.sync_cycle } else { next_interrupt }
    }

    /// Subtracts one frame's worth of ticks, clamping at zero rather than
    /// underflowing (a device can be below a frame's length after a deep
    /// stall, per §4.8's rebase rule).
    pub fn rebase(&mut self, frame_ticks: u64) {
        self.current_cycle = self.current_cycle.saturating_sub(frame_ticks);
        self.sync_cycle = self.sync_cycle.saturating_sub(frame_ticks);
    }
}

impl Default for CycleCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_match_fixed_points() {
        assert_eq!(MCLKS_PER_MAIN, 7);
        assert_eq!(MCLKS_PER_SOUND, 15);
        assert_eq!(MCLKS_PER_PSG, 240);
    }

    #[test]
    fn frame_lengths() {
        assert_eq!(TimingMode::Ntsc.scanlines_per_frame(), 262);
        assert_eq!(TimingMode::Pal.scanlines_per_frame(), 312);
    }

    #[test]
    fn round_trip_truncates() {
        assert_eq!(mclk_to_main(20), 2);
        assert_eq!(main_to_mclk(mclk_to_main(21)), 21 - 21 % MCLKS_PER_MAIN);
    }

    #[test]
    fn rebase_clamps_instead_of_underflowing() {
        let mut cursor = CycleCursor { current_cycle: 4, sync_cycle: 4 };
        cursor.rebase(1000);
        assert_eq!(cursor.current_cycle, 0);
        assert_eq!(cursor.sync_cycle, 0);
    }
}
