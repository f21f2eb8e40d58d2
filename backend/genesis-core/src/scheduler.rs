//! Frame scheduler (§4.8): the top-level pacing loop that keeps every
//! device's own `current_cycle` no further ahead than the main CPU's
//! current instant, and performs the once-per-frame rebase that keeps all
//! of those counters from growing without bound. The main CPU itself is
//! external (its decoder is out of scope, §1); this module is driven by
//! whatever owns that decoder, once per instruction or batch of
//! instructions, by calling [`FrameScheduler::tick`] with the main CPU's
//! current cycle position.

use crate::audio::{FmChip, Psg};
use crate::clock;
use crate::cpu::SoundCpuRegisters;
use crate::interrupts;
use crate::memory::Memory;
use crate::vdp_port::{FrameBoundaryHook, VdpPort};

/// The only suspension point in the whole machine (§5 "Suspension points"):
/// waiting for the render layer at frame end. Returns whether the host
/// requested a debugger break.
pub trait RenderWait {
    fn wait_for_frame(&mut self) -> bool;
}

impl RenderWait for () {
    fn wait_for_frame(&mut self) -> bool {
        false
    }
}

/// What the caller should do after a `tick` call: where to next stop the
/// main CPU, and whether a debugger break was requested at a frame
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub target_cycle: u64,
    pub interrupt_level: u8,
    pub break_requested: bool,
}

#[derive(Debug)]
pub struct FrameScheduler {
    pub sound: SoundCpuRegisters,
    fm: FmChip,
    psg: Psg,
    headless: bool,
    sound_cpu_enabled: bool,
}

impl FrameScheduler {
    #[must_use]
    pub fn new(headless: bool, sound_cpu_enabled: bool) -> Self {
        Self { sound: SoundCpuRegisters::default(), fm: FmChip::new(), psg: Psg::new(), headless, sound_cpu_enabled }
    }

    #[must_use]
    pub fn fm(&self) -> &FmChip {
        &self.fm
    }

    #[must_use]
    pub fn fm_mut(&mut self) -> &mut FmChip {
        &mut self.fm
    }

    #[must_use]
    pub fn psg(&self) -> &Psg {
        &self.psg
    }

    #[must_use]
    pub fn psg_mut(&mut self) -> &mut Psg {
        &mut self.psg
    }

    fn drain_dma(&self, memory: &mut Memory, vdp: &mut VdpPort) {
        while let Some(request) = vdp.take_pending_dma() {
            match request.mode {
                crate::vdp_port::DmaMode::MemoryToVdp => {
                    let mut address = request.source_address;
                    for _ in 0..request.length {
                        let word = memory.cartridge.read_word(address & 0x00FF_FFFE);
                        vdp.dma_write_word(word);
                        address = address.wrapping_add(2);
                    }
                }
                crate::vdp_port::DmaMode::VramFill => {
                    let fill_byte = (request.source_address >> 8) as u8;
                    vdp.dma_fill(&request, fill_byte);
                }
                crate::vdp_port::DmaMode::VramCopy => vdp.dma_copy(&request),
            }
        }
    }

    /// Advances every device up to `main_cycle` (step 1, 3), running the
    /// frame-boundary sequence (step 2) if that crosses into the next
    /// frame, then recomputes the next interrupt (step 5). Step 6 (the
    /// debugger trap) is the caller's responsibility once `break_requested`
    /// or an explicit breakpoint address is observed, since the decoder
    /// that would supply "the instruction address" lives outside this crate.
    pub fn tick(
        &mut self,
        memory: &mut Memory,
        vdp: &mut VdpPort,
        main_cycle: u64,
        status_register: u16,
        interrupt_ack: bool,
        render: &mut dyn RenderWait,
    ) -> TickOutcome {
        self.drain_dma(memory, vdp);

        let mclk = clock::main_to_mclk(main_cycle);
        if self.sound_cpu_enabled {
            self.sound.current_cycle = self.sound.current_cycle.max(clock::mclk_to_sound(mclk));
        }

        // §4.6 reset-release: once the Z80 reset line goes high again,
        // resync its clock to the main CPU's current time in the sound
        // domain rather than leaving it wherever it was when reset began.
        if memory.bus_arbiter.take_need_reset() {
            self.sound.current_cycle = clock::mclk_to_sound(mclk);
        }

        let frame_mclks = vdp.frame_mclks();
        let mut break_requested = false;

        if mclk >= frame_mclks {
            let frame_main_cycles = frame_mclks / clock::MCLKS_PER_MAIN;
            self.fm.advance_and_rebase(main_cycle, frame_main_cycles);
            vdp.sync_to_frame_end();
            self.psg.advance_to_frame_end(frame_mclks);

            if !self.headless {
                break_requested = render.wait_for_frame();
            }

            vdp.rebase_frame_boundary();
            self.psg.rebase(frame_mclks);
            self.sound.current_cycle = self.sound.current_cycle.saturating_sub(clock::mclk_to_sound(frame_mclks));
            memory.bus_arbiter.rebase_frame(frame_main_cycles);
            memory.gamepad_1.rebase_frame(frame_main_cycles);
            memory.gamepad_2.rebase_frame(frame_main_cycles);

            let remainder = mclk - frame_mclks;
            vdp.apply_remainder(remainder);
            log::debug!("frame boundary rebase: -{frame_main_cycles} main cycles");
        } else {
            vdp.sync_to(main_cycle);
            self.psg.advance_to(mclk);
        }

        // The simplified VDP model recomputes vint/hint occurrence lazily
        // from register state rather than latching a one-shot pending flag,
        // so there's no separate VDP-side state to clear here; the ack is
        // only meaningful to the (external) CPU decoder's own interrupt
        // pipeline.
        let _ = interrupt_ack;

        let interrupt = interrupts::next_main_interrupt(status_register, vdp);
        let sync_cycle = main_cycle + 1;
        let target_cycle = interrupts::target_cycle(interrupt.map(|i| i.main_cycle), sync_cycle);

        TickOutcome {
            target_cycle,
            interrupt_level: interrupt.map_or(0, |i| i.level),
            break_requested,
        }
    }
}

/// Forwards frame-boundary crossings the VDP's own FIFO-stall loop hits
/// mid-write (outside a [`FrameScheduler::tick`] call) into the same
/// FM/PSG/sound-CPU rebase §4.8 step 2 performs, so a main-CPU write that
/// happens to straddle a frame boundary doesn't leave those counters
/// stale relative to the VDP's own (already-rebased) cycle position.
/// `bus_arbiter`/gamepad rebasing is the caller's job once this hook
/// reports `crossed_frame_mclks`, since those live on [`Memory`] rather
/// than on the scheduler itself.
pub struct SchedulerFrameBoundaryHook<'a> {
    scheduler: &'a mut FrameScheduler,
    main_cycle: u64,
    crossed_frame_mclks: Option<u64>,
}

impl<'a> SchedulerFrameBoundaryHook<'a> {
    pub fn new(scheduler: &'a mut FrameScheduler, main_cycle: u64) -> Self {
        Self { scheduler, main_cycle, crossed_frame_mclks: None }
    }

    /// The frame length crossed mid-write, if any; the caller rebases its
    /// own (non-scheduler) per-frame state by this amount afterward.
    #[must_use]
    pub fn crossed_frame_mclks(&self) -> Option<u64> {
        self.crossed_frame_mclks
    }
}

impl FrameBoundaryHook for SchedulerFrameBoundaryHook<'_> {
    fn on_frame_boundary(&mut self, frame_mclks: u64) {
        let frame_main_cycles = frame_mclks / clock::MCLKS_PER_MAIN;
        self.scheduler.fm.advance_and_rebase(self.main_cycle, frame_main_cycles);
        self.scheduler.psg.rebase(frame_mclks);
        self.scheduler.sound.current_cycle =
            self.scheduler.sound.current_cycle.saturating_sub(clock::mclk_to_sound(frame_mclks));
        self.crossed_frame_mclks = Some(frame_mclks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::clock::TimingMode;
    use crate::memory::GenesisRegion;

    fn new_memory() -> Memory {
        let rom = vec![0u8; 0x200];
        let cartridge = Cartridge::new(rom, None).unwrap();
        Memory::new(cartridge, GenesisRegion::Americas)
    }

    #[test]
    fn tick_within_frame_does_not_rebase() {
        let mut scheduler = FrameScheduler::new(true, true);
        let mut memory = new_memory();
        let mut vdp = VdpPort::new(TimingMode::Ntsc);
        let outcome = scheduler.tick(&mut memory, &mut vdp, 100, 0, false, &mut ());
        assert!(!outcome.break_requested);
    }

    #[test]
    fn tick_past_frame_boundary_rebases_vdp() {
        let mut scheduler = FrameScheduler::new(true, true);
        let mut memory = new_memory();
        let mut vdp = VdpPort::new(TimingMode::Ntsc);
        let frame_main_cycles = vdp.frame_mclks() / clock::MCLKS_PER_MAIN;
        let outcome = scheduler.tick(&mut memory, &mut vdp, frame_main_cycles + 10, 0, false, &mut ());
        assert!(!outcome.break_requested);
    }

    #[test]
    fn headless_never_calls_render_wait() {
        struct PanicsOnWait;
        impl RenderWait for PanicsOnWait {
            fn wait_for_frame(&mut self) -> bool {
                panic!("render_wait should not be called when headless");
            }
        }
        let mut scheduler = FrameScheduler::new(true, true);
        let mut memory = new_memory();
        let mut vdp = VdpPort::new(TimingMode::Ntsc);
        let frame_main_cycles = vdp.frame_mclks() / clock::MCLKS_PER_MAIN;
        scheduler.tick(&mut memory, &mut vdp, frame_main_cycles + 1, 0, false, &mut PanicsOnWait);
    }
}
