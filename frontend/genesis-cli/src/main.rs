//! Headless command-line driver (§6). Everything outside the bus/sync core
//! this crate implements — rendering, audio output, and 68k/Z80 instruction
//! decoding — is an external collaborator (§1), so this binary's job is
//! limited to parsing arguments, loading the ROM and ROM database, and
//! handing a [`genesis_core::GenesisMachine`] to whatever would drive it.

use clap::Parser;
use env_logger::Env;
use genesis_config::parse_region_code;
use genesis_core::api::{self, GenesisMachineConfig};
use genesis_core::memory::GenesisRegion;
use genesis_core::rom_loader;
use std::path::PathBuf;
use std::process::ExitCode;

/// `prog ROMFILE [WIDTH [HEIGHT]] [-d|-f|-l|-v|-n|-r {J,U,E}]`
#[derive(Debug, Parser)]
#[command(version, about = "Headless Genesis bus/sync core driver")]
struct Args {
    /// ROM file path (raw binary or SMD-interleaved)
    rom_path: PathBuf,

    /// Initial window width in pixels (accepted for compatibility; rendering is out of scope)
    width: Option<u32>,

    /// Initial window height in pixels (accepted for compatibility; rendering is out of scope)
    height: Option<u32>,

    /// Start in the debugger
    #[arg(short = 'd')]
    debugger_on_start: bool,

    /// Cap to display refresh rate (accepted for compatibility; rendering is out of scope)
    #[arg(short = 'f')]
    cap_to_refresh: bool,

    /// Write a disassembled address log to address.log
    #[arg(short = 'l')]
    disassembly_log: bool,

    /// Run headless (no rendering)
    #[arg(short = 'v')]
    headless: bool,

    /// Disable the sound CPU
    #[arg(short = 'n')]
    sound_cpu_disabled: bool,

    /// Force region
    #[arg(short = 'r', value_parser = parse_region_arg)]
    forced_region: Option<GenesisRegion>,

    /// Override the ROM database path (defaults to rom.db next to this binary)
    #[arg(long)]
    romdb: Option<PathBuf>,
}

fn parse_region_arg(s: &str) -> Result<GenesisRegion, String> {
    parse_region_code(s).map_err(|err| err.to_string())
}

fn default_romdb_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("rom.db"))
}

fn run(args: Args) -> anyhow::Result<()> {
    let _ = args.width;
    let _ = args.height;
    let _ = args.cap_to_refresh;

    let rom = rom_loader::load_rom_file(&args.rom_path)?;

    let romdb_path = args.romdb.or_else(default_romdb_path);
    let romdb = match &romdb_path {
        Some(path) if path.exists() => api::load_romdb(Some(path))?,
        _ => api::load_romdb(None)?,
    };

    let sound_cpu_enabled = !args.sound_cpu_disabled;
    let disassembly_log_path = args.disassembly_log.then(api::default_disassembly_log_path);
    if let Some(path) = &disassembly_log_path {
        log::info!("disassembly log enabled at '{}'", path.display());
    }

    let config = GenesisMachineConfig {
        forced_region: args.forced_region,
        headless: args.headless,
        sound_cpu_enabled,
        debugger_on_start: args.debugger_on_start,
        disassembly_log_path,
    };

    let mut machine = genesis_core::GenesisMachine::create(rom, &args.rom_path, config, &romdb)?;
    log::info!(
        "loaded '{}' for region {:?}, sound CPU {}",
        args.rom_path.display(),
        machine.memory.region,
        if sound_cpu_enabled { "enabled" } else { "disabled" },
    );

    // The 68k/Z80 decoders that would actually drive `machine.tick` in a
    // loop are external collaborators (§1); this binary's job ends at
    // standing up the machine and handing it off.
    machine.flush_save();

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match Args::try_parse() {
        Ok(args) => match run(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            let _ = err.print();
            ExitCode::FAILURE
        }
    }
}
