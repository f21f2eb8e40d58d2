//! Main-CPU/sound-CPU bus arbitration (§4.6, §3 "Bus arbitration"). The
//! sound CPU's own cycle position isn't modeled as a separate running clock
//! here — there is no standalone Z80 core in this crate, only its memory
//! glue — so "synchronise the sound CPU to the main CPU's current time"
//! is approximated as the sound-domain cycle a perfectly caught-up sound
//! CPU would be at for the given main-CPU cycle. The frame scheduler is
//! the actual source of truth for the sound CPU's real position; this
//! approximation only affects the latency windows computed here.

use crate::clock::{self, CYCLE_NEVER};

/// Named per Open Question (b), §9/§4.6, rather than an inline literal.
pub const BUS_ACK_DELAY_SOUND_CYCLES: u64 = 3;
pub const BUS_RELEASE_DELAY_SOUND_CYCLES: u64 = 1;

#[derive(Debug, Clone, Copy)]
struct PendingAck {
    effective_cycle: u64,
    value: bool,
}

#[derive(Debug)]
pub struct BusArbiter {
    request_line: bool,
    reset_line: bool,
    bus_acknowledged: bool,
    need_reset: bool,
    pending: Option<PendingAck>,
}

impl BusArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_line: false,
            reset_line: false,
            bus_acknowledged: false,
            need_reset: false,
            pending: None,
        }
    }

    #[must_use]
    pub fn bus_acknowledged(&self) -> bool {
        self.bus_acknowledged
    }

    #[must_use]
    pub fn reset_asserted(&self) -> bool {
        self.reset_line
    }

    #[must_use]
    pub fn take_need_reset(&mut self) -> bool {
        std::mem::take(&mut self.need_reset)
    }

    fn sound_cycle_caught_up_to(main_cycle: u64) -> u64 {
        clock::mclk_to_sound(clock::main_to_mclk(main_cycle))
    }

    /// Commits a scheduled ACK/BUSY transition once wall time reaches it.
    fn sync_pending(&mut self, main_cycle: u64) {
        if let Some(pending) = self.pending {
            if main_cycle >= pending.effective_cycle {
                self.bus_acknowledged = pending.value;
                self.pending = None;
            }
        }
    }

    fn schedule(&mut self, main_cycle: u64, delay_sound_cycles: u64, value: bool) {
        let sound_now = Self::sound_cycle_caught_up_to(main_cycle);
        let effective_cycle = clock::sound_to_main(sound_now + delay_sound_cycles);
        self.pending = Some(PendingAck { effective_cycle, value });
    }

    fn set_request_line(&mut self, main_cycle: u64, requested: bool) {
        if requested && !self.request_line && !self.reset_line {
            self.schedule(main_cycle, BUS_ACK_DELAY_SOUND_CYCLES, true);
        } else if !requested && self.request_line {
            self.schedule(main_cycle, BUS_RELEASE_DELAY_SOUND_CYCLES, false);
        }
        self.request_line = requested;
    }

    fn set_reset_line(&mut self, asserted: bool) {
        if self.reset_line && !asserted {
            self.need_reset = true;
        }
        self.reset_line = asserted;
    }

    #[must_use]
    pub fn read_request_port_byte(&mut self, main_cycle: u64) -> u8 {
        self.sync_pending(main_cycle);
        u8::from(self.reset_line || self.bus_acknowledged)
    }

    #[must_use]
    pub fn read_request_port_word(&mut self, main_cycle: u64) -> u16 {
        self.sync_pending(main_cycle);
        if self.reset_line || self.bus_acknowledged { 0x8000 } else { 0 }
    }

    pub fn write_request_port_byte(&mut self, main_cycle: u64, value: u8) {
        self.sync_pending(main_cycle);
        self.set_request_line(main_cycle, value & 1 != 0);
    }

    pub fn write_request_port_word(&mut self, main_cycle: u64, value: u16) {
        self.sync_pending(main_cycle);
        self.set_request_line(main_cycle, value & 1 != 0);
    }

    #[must_use]
    pub fn read_reset_port_byte(&self) -> u8 {
        u8::from(self.reset_line)
    }

    pub fn write_reset_port_byte(&mut self, main_cycle: u64, value: u8) {
        self.sync_pending(main_cycle);
        self.set_reset_line(value & 1 != 0);
    }

    /// Scales a pending ACK/BUSY deadline by one frame's main-CPU cycles,
    /// per §4.8 step 2d's "rebase... busack... deadlines by the same amount".
    pub fn rebase_frame(&mut self, frame_main_cycles: u64) {
        if let Some(pending) = &mut self.pending {
            pending.effective_cycle = pending.effective_cycle.saturating_sub(frame_main_cycles);
        }
    }
}

impl Default for BusArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_schedules_ack_after_delay() {
        let mut arbiter = BusArbiter::new();
        arbiter.write_request_port_byte(0, 1);
        assert_eq!(arbiter.read_request_port_byte(0), 0);
        let effective = arbiter.pending.unwrap().effective_cycle;
        assert_eq!(arbiter.read_request_port_byte(effective), 1);
        assert!(arbiter.bus_acknowledged());
    }

    #[test]
    fn release_has_shorter_latency_than_request() {
        let mut arbiter = BusArbiter::new();
        arbiter.write_request_port_byte(0, 1);
        let ack_cycle = arbiter.pending.unwrap().effective_cycle;
        arbiter.read_request_port_byte(ack_cycle);
        arbiter.write_request_port_byte(ack_cycle, 0);
        let release_cycle = arbiter.pending.unwrap().effective_cycle;
        assert!(release_cycle - ack_cycle < clock::sound_to_main(BUS_ACK_DELAY_SOUND_CYCLES));
    }

    #[test]
    fn reset_falling_edge_sets_need_reset() {
        let mut arbiter = BusArbiter::new();
        arbiter.write_reset_port_byte(0, 1); // assert
        assert!(!arbiter.take_need_reset());
        arbiter.write_reset_port_byte(0, 0); // release
        assert!(arbiter.take_need_reset());
    }

    #[test]
    fn never_sentinel_unused_when_no_pending() {
        let arbiter = BusArbiter::new();
        assert!(arbiter.pending.is_none());
        let _ = CYCLE_NEVER;
    }
}
