//! Process-level configuration surface (§10.3), kept deliberately separate
//! from the ROM-DB: this is the handful of flags the command line exposes
//! (§6), not the per-game cartridge overrides that live in
//! `genesis_core::romdb`.

use genesis_core::error::CartridgeError;
use genesis_core::memory::GenesisRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenesisConfig {
    pub forced_region: Option<GenesisRegion>,
    pub headless: bool,
    pub sound_cpu_enabled: bool,
    pub debugger_on_start: bool,
    pub disassembly_log: bool,
}

impl GenesisConfig {
    #[must_use]
    pub fn new() -> Self {
        Self { sound_cpu_enabled: true, ..Self::default() }
    }
}

/// Parses the single-character region codes `-r` accepts on the command
/// line (§6), distinct from the three-character header region bits
/// `genesis_core::cartridge` derives from the ROM itself.
pub fn parse_region_code(s: &str) -> Result<GenesisRegion, CartridgeError> {
    match s {
        "J" | "j" => Ok(GenesisRegion::Japan),
        "U" | "u" => Ok(GenesisRegion::Americas),
        "E" | "e" => Ok(GenesisRegion::Europe),
        _ => Err(CartridgeError::UnknownRegionCode { code: s.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_region_codes() {
        assert_eq!(parse_region_code("J").unwrap(), GenesisRegion::Japan);
        assert_eq!(parse_region_code("u").unwrap(), GenesisRegion::Americas);
        assert_eq!(parse_region_code("E").unwrap(), GenesisRegion::Europe);
    }

    #[test]
    fn rejects_unknown_region_code() {
        assert!(parse_region_code("X").is_err());
    }

    #[test]
    fn default_config_has_sound_cpu_disabled() {
        assert!(!GenesisConfig::default().sound_cpu_enabled);
        assert!(GenesisConfig::new().sound_cpu_enabled);
    }
}
