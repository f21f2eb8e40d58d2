//! Error taxonomy. Configuration errors (§7 taxon 1) are ordinary `Result`
//! values; machine-freeze traps (§7 taxon 2) terminate the process directly
//! from wherever they're detected, since there is no sensible value to
//! return to a CPU core mid-instruction. Silent bus faults (§7 taxon 3)
//! never appear here at all — they're a `0xFF`/`0xFFFF` return value.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CartridgeError {
    #[error("error reading ROM file '{path}': {source}")]
    RomRead { path: String, #[source] source: std::io::Error },
    #[error("ROM is too large ({size} bytes, max 4 MiB)")]
    RomTooLarge { size: usize },
    #[error("SMD ROM declares a split file (header byte 2 = {byte:#04X}); split SMD ROMs are not supported")]
    SplitSmdRom { byte: u8 },
    #[error("unrecognized region code '{code}' passed to -r")]
    UnknownRegionCode { code: String },
    #[error("error reading ROM database file '{path}': {source}")]
    RomDbRead { path: String, #[source] source: std::io::Error },
    #[error("error parsing ROM database file '{path}': {source}")]
    RomDbParse { path: String, #[source] source: toml::de::Error },
    #[error("ROM database entry for '{product_id}' declares an unsupported mapper shape")]
    UnsupportedMapperShape { product_id: String },
    #[error("error opening disassembly log '{path}': {source}")]
    DisassemblyLogOpen { path: String, #[source] source: std::io::Error },
}

/// A condition which, per §7 taxon 2, is reported and treated as fatal:
/// the offending address is logged and the process exits with status 1.
#[derive(Debug, Clone, Copy)]
pub enum MachineFreezeReason {
    ReservedVdpControlBits { address: u32 },
    HvCounterWrite { address: u32 },
    UnknownMapperShape { address: u32 },
}

impl fmt::Display for MachineFreezeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedVdpControlBits { address } => {
                write!(f, "write to reserved VDP control bits at {address:#08X}")
            }
            Self::HvCounterWrite { address } => {
                write!(f, "write to HV-counter port at {address:#08X}")
            }
            Self::UnknownMapperShape { address } => {
                write!(f, "access to unrecognized mapper shape at {address:#08X}")
            }
        }
    }
}

/// Logs `reason` at `error!` and terminates the process with status 1, per
/// §7's "print the offending bus address and exit 1".
pub fn machine_freeze(reason: MachineFreezeReason) -> ! {
    log::error!("machine freeze: {reason}");
    std::process::exit(1);
}
