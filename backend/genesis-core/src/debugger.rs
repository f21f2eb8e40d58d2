//! Interactive debugger trap (§4.10). Installed as a breakpoint handler
//! inside the main CPU's dispatch loop rather than as a nested event-loop
//! coroutine, per §9's design note: the CPU calls [`Debugger::on_break`],
//! which runs the REPL to completion and returns an action describing what
//! breakpoints to (re)install before resuming.

use crate::cpu::{DecodedStep, MainCpuRegisters};
use crate::vdp_port::VdpPort;
use std::fmt;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintFormat {
    Hex,
    UpperHex,
    Decimal,
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTarget {
    DataRegister(u8),
    AddressRegister(u8),
    StatusRegister,
    Cycle,
    Memory(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Continue,
    SetBreakpoint { address: u32 },
    DeleteBreakpoint { index: usize },
    RunUntil { address: u32 },
    Step,
    Print { format: PrintFormat, target: PrintTarget },
    DumpVdpSprites,
    DumpVdpRegisters,
    Quit,
    Repeat,
    Invalid(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Repeat;
    }
    let (head, rest) = line.split_at(1);
    let rest = rest.trim();
    match head {
        "c" => Command::Continue,
        "q" => Command::Quit,
        "n" => Command::Step,
        "b" => match u32::from_str_radix(rest.trim_start_matches("0x"), 16) {
            Ok(address) => Command::SetBreakpoint { address },
            Err(_) => Command::Invalid(line.to_string()),
        },
        "a" => match u32::from_str_radix(rest.trim_start_matches("0x"), 16) {
            Ok(address) => Command::RunUntil { address },
            Err(_) => Command::Invalid(line.to_string()),
        },
        "d" => match rest.parse::<usize>() {
            Ok(index) => Command::DeleteBreakpoint { index },
            Err(_) => Command::Invalid(line.to_string()),
        },
        "v" => match rest {
            "s" => Command::DumpVdpSprites,
            "r" => Command::DumpVdpRegisters,
            _ => Command::Invalid(line.to_string()),
        },
        "p" => parse_print(rest),
        _ => Command::Invalid(line.to_string()),
    }
}

fn parse_print(rest: &str) -> Command {
    let (format_part, expr) = if let Some(slash) = rest.strip_prefix('/') {
        let mut parts = slash.splitn(2, char::is_whitespace);
        (parts.next().unwrap_or("x"), parts.next().unwrap_or("").trim())
    } else {
        let mut parts = rest.splitn(2, char::is_whitespace);
        (parts.next().unwrap_or(""), parts.next().unwrap_or("").trim())
    };
    let format = match format_part {
        "X" => PrintFormat::UpperHex,
        "d" => PrintFormat::Decimal,
        "c" => PrintFormat::Char,
        _ => PrintFormat::Hex,
    };
    let target = parse_print_target(expr);
    match target {
        Some(target) => Command::Print { format, target },
        None => Command::Invalid(format!("p {rest}")),
    }
}

fn parse_print_target(expr: &str) -> Option<PrintTarget> {
    if let Some(digit) = expr.strip_prefix('d') {
        return digit.parse().ok().map(PrintTarget::DataRegister);
    }
    if let Some(digit) = expr.strip_prefix('a') {
        return digit.parse().ok().map(PrintTarget::AddressRegister);
    }
    if expr.eq_ignore_ascii_case("sr") {
        return Some(PrintTarget::StatusRegister);
    }
    if expr == "c" {
        return Some(PrintTarget::Cycle);
    }
    if let Some(hex) = expr.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).ok().map(PrintTarget::Memory);
    }
    None
}

/// What the CPU's dispatch loop should do with its breakpoint table after
/// a REPL session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerAction {
    /// Resume with the current breakpoint table unchanged.
    Resume,
    /// Quit the process.
    Quit,
}

pub struct Debugger {
    breakpoints: Vec<u32>,
    /// Temporary breakpoints installed for the current single-step, torn
    /// down as soon as one of them fires.
    step_breakpoints: Vec<u32>,
    run_until: Option<u32>,
    last_command: Option<String>,
    address_log: Option<Box<dyn Write>>,
}

impl fmt::Debug for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger")
            .field("breakpoints", &self.breakpoints)
            .field("step_breakpoints", &self.step_breakpoints)
            .field("run_until", &self.run_until)
            .field("last_command", &self.last_command)
            .field("address_log", &self.address_log.is_some())
            .finish()
    }
}

impl Debugger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            step_breakpoints: Vec::new(),
            run_until: None,
            last_command: None,
            address_log: None,
        }
    }

    /// Installs a writer that receives one line per executed address when
    /// single-stepping, per §6's `-l` disassembly-log flag (§10.5); the
    /// actual disassembly text formatting is left to the caller.
    #[must_use]
    pub fn with_address_log(mut self, writer: impl Write + 'static) -> Self {
        self.address_log = Some(Box::new(writer));
        self
    }

    pub fn log_address(&mut self, line: &str) {
        if let Some(writer) = &mut self.address_log {
            let _ = writeln!(writer, "{line}");
        }
    }

    pub fn insert_breakpoint(&mut self, address: u32) {
        if !self.breakpoints.contains(&address) {
            self.breakpoints.push(address);
        }
    }

    pub fn remove_breakpoint(&mut self, address: u32) {
        self.breakpoints.retain(|&a| a != address);
    }

    #[must_use]
    pub fn breakpoints(&self) -> &[u32] {
        &self.breakpoints
    }

    /// Computes the breakpoint(s) a single-step over `step` should install,
    /// per §4.10's per-opcode table. The always-true-branch case installs
    /// exactly one breakpoint (the target), by the equality decision in
    /// §4.10/§9 Open Question (a) — it never falls through to the other arm.
    pub fn plan_single_step(&mut self, step: DecodedStep, return_address: u32) {
        self.step_breakpoints.clear();
        match step {
            DecodedStep::Ordinary { next_address } => self.step_breakpoints.push(next_address),
            DecodedStep::SubroutineReturn => self.step_breakpoints.push(return_address),
            DecodedStep::AlwaysTrueBranch { target } => self.step_breakpoints.push(target),
            DecodedStep::ConditionalBranch { fall_through, target } => {
                self.step_breakpoints.push(fall_through);
                self.step_breakpoints.push(target);
            }
        }
    }

    /// Called once a step breakpoint fires; tears down the sibling
    /// breakpoint from a two-way conditional-branch step.
    pub fn clear_step_breakpoints(&mut self) {
        self.step_breakpoints.clear();
    }

    #[must_use]
    pub fn step_breakpoints(&self) -> &[u32] {
        &self.step_breakpoints
    }

    fn print(&self, format: PrintFormat, target: PrintTarget, regs: &MainCpuRegisters, read_byte: impl Fn(u32) -> u8) {
        let value: u32 = match target {
            PrintTarget::DataRegister(n) => regs.d[n as usize],
            PrintTarget::AddressRegister(n) => regs.a[n as usize],
            PrintTarget::StatusRegister => u32::from(regs.sr),
            PrintTarget::Cycle => regs.current_cycle as u32,
            PrintTarget::Memory(address) => u32::from(read_byte(address)),
        };
        match format {
            PrintFormat::Hex => println!("{value:x}"),
            PrintFormat::UpperHex => println!("{value:X}"),
            PrintFormat::Decimal => println!("{value}"),
            PrintFormat::Char => println!("{}", char::from_u32(value).unwrap_or('?')),
        }
    }

    fn dump_vdp_registers(&self, vdp: &VdpPort) {
        for i in 0..24 {
            println!("r{i:02}: {:02x}", vdp.register(i));
        }
    }

    /// Prints the sprite-attribute table's base VRAM offset and each of its
    /// 80 possible entry offsets; raw byte contents are left to `v r`'s
    /// sibling VRAM inspection since reading them doesn't need the VDP port
    /// itself, only the shared VRAM buffer the scheduler also holds.
    fn dump_vdp_sprites(&self, vdp: &VdpPort) {
        let base = u32::from(vdp.register(5) & 0x7F) << 9;
        println!("sprite table base: {base:04x}");
        for i in 0..80u32 {
            println!("sprite {i:02}: table+{:04x}", base + i * 8);
        }
    }

    /// Runs the REPL until a command that returns control to the CPU
    /// (`c`, `n`, `a`, `q`) is entered. Every other command either succeeds
    /// or prints a diagnostic and re-prompts, per §7: "the debugger itself
    /// may not fail."
    pub fn repl(
        &mut self,
        mut input: impl BufRead,
        regs: &MainCpuRegisters,
        vdp: &VdpPort,
        read_byte: impl Fn(u32) -> u8,
    ) -> DebuggerAction {
        loop {
            print!("> ");
            let _ = io::stdout().flush();
            let mut line = String::new();
            if input.read_line(&mut line).unwrap_or(0) == 0 {
                return DebuggerAction::Quit;
            }

            let command = if line.trim().is_empty() {
                match &self.last_command {
                    Some(prev) => parse_command(prev),
                    None => Command::Repeat,
                }
            } else {
                self.last_command = Some(line.clone());
                parse_command(&line)
            };

            match command {
                Command::Continue => {
                    self.run_until = None;
                    return DebuggerAction::Resume;
                }
                Command::Step => return DebuggerAction::Resume,
                Command::RunUntil { address } => {
                    self.run_until = Some(address);
                    return DebuggerAction::Resume;
                }
                Command::SetBreakpoint { address } => self.insert_breakpoint(address),
                Command::DeleteBreakpoint { index } => {
                    if index < self.breakpoints.len() {
                        self.breakpoints.remove(index);
                    } else {
                        println!("no breakpoint at index {index}");
                    }
                }
                Command::Print { format, target } => self.print(format, target, regs, &read_byte),
                Command::DumpVdpRegisters => self.dump_vdp_registers(vdp),
                Command::DumpVdpSprites => self.dump_vdp_sprites(vdp),
                Command::Quit => return DebuggerAction::Quit,
                Command::Repeat => println!("no previous command"),
                Command::Invalid(text) => println!("unrecognized command: {text}"),
            }
        }
    }

    /// Moves a pending `run_until` target (set by the `a` command) into the
    /// step-breakpoint table so [`GenesisMachine::tick`](crate::api::GenesisMachine::tick)'s
    /// breakpoint check picks it up as a one-shot stop condition, torn down
    /// like any other step breakpoint once it fires.
    pub fn install_pending_run_until(&mut self) {
        if let Some(address) = self.run_until.take() {
            self.step_breakpoints.push(address);
        }
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_breakpoint_and_print_commands() {
        assert_eq!(parse_command("b 1234"), Command::SetBreakpoint { address: 0x1234 });
        assert_eq!(
            parse_command("p/x d3"),
            Command::Print { format: PrintFormat::Hex, target: PrintTarget::DataRegister(3) }
        );
        assert_eq!(
            parse_command("p/d a7"),
            Command::Print { format: PrintFormat::Decimal, target: PrintTarget::AddressRegister(7) }
        );
        assert_eq!(parse_command("p SR"), Command::Print { format: PrintFormat::Hex, target: PrintTarget::StatusRegister });
    }

    #[test]
    fn always_true_branch_installs_exactly_one_breakpoint() {
        let mut debugger = Debugger::new();
        debugger.plan_single_step(DecodedStep::AlwaysTrueBranch { target: 0x2000 }, 0);
        assert_eq!(debugger.step_breakpoints(), &[0x2000]);
    }

    #[test]
    fn conditional_branch_installs_both_paths() {
        let mut debugger = Debugger::new();
        debugger.plan_single_step(
            DecodedStep::ConditionalBranch { fall_through: 0x1002, target: 0x2000 },
            0,
        );
        assert_eq!(debugger.step_breakpoints(), &[0x1002, 0x2000]);
    }

    #[test]
    fn run_until_command_installs_a_step_breakpoint() {
        let mut debugger = Debugger::new();
        let regs = MainCpuRegisters::default();
        let vdp = VdpPort::new(crate::clock::TimingMode::Ntsc);
        let input = io::Cursor::new(b"a 4000\n".to_vec());
        let action = debugger.repl(input, &regs, &vdp, |_| 0);
        assert_eq!(action, DebuggerAction::Resume);
        debugger.install_pending_run_until();
        assert_eq!(debugger.step_breakpoints(), &[0x4000]);
        debugger.clear_step_breakpoints();
        debugger.install_pending_run_until();
        assert!(debugger.step_breakpoints().is_empty());
    }

    #[test]
    fn address_log_receives_one_line_per_logged_address() {
        let mut debugger = Debugger::new().with_address_log(Vec::<u8>::new());
        debugger.log_address("001000");
        debugger.log_address("001002");
    }

    #[test]
    fn empty_line_repeats_last_command() {
        let mut debugger = Debugger::new();
        let regs = MainCpuRegisters::default();
        let vdp = VdpPort::new(crate::clock::TimingMode::Ntsc);
        let input = io::Cursor::new(b"b 100\n\nc\n".to_vec());
        let action = debugger.repl(input, &regs, &vdp, |_| 0);
        assert_eq!(action, DebuggerAction::Resume);
        assert_eq!(debugger.breakpoints(), &[0x100]);
    }
}
