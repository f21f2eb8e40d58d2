//! ROM database: a TOML file keyed by product ID that overrides the
//! header-inferred memory map for cartridges whose save hardware the
//! header doesn't describe accurately (§4.3 step 2, §10.3).

use crate::cartridge::external::SramBusWidth;
use crate::error::CartridgeError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RomDbDevice {
    Rom,
    Sram,
    Eeprom,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomDbMapEntry {
    pub start: u32,
    pub last: u32,
    pub device: RomDbDevice,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub bus_width: Option<RomDbBusWidth>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RomDbBusWidth {
    Both,
    Odd,
    Even,
}

impl From<RomDbBusWidth> for SramBusWidth {
    fn from(value: RomDbBusWidth) -> Self {
        match value {
            RomDbBusWidth::Both => Self::Both,
            RomDbBusWidth::Odd => Self::Odd,
            RomDbBusWidth::Even => Self::Even,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomDbEepromEntry {
    pub size: usize,
    #[serde(default)]
    pub sda_in_bit: Option<u8>,
    #[serde(default)]
    pub sda_out_bit: Option<u8>,
    #[serde(default)]
    pub scl_bit: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomDbEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub regions: Option<String>,
    #[serde(default)]
    pub map: Vec<RomDbMapEntry>,
    #[serde(default)]
    pub eeprom: Option<RomDbEepromEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RomDb {
    #[serde(flatten)]
    entries: HashMap<String, RomDbEntry>,
}

impl RomDb {
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn load(path: &Path) -> Result<Self, CartridgeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| CartridgeError::RomDbRead { path: path.display().to_string(), source })?;
        toml::from_str(&text)
            .map_err(|source| CartridgeError::RomDbParse { path: path.display().to_string(), source })
    }

    #[must_use]
    pub fn entry(&self, product_id: &str) -> Option<&RomDbEntry> {
        self.entries.get(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_map_entry_table() {
        let toml = r#"
            [MK-1234]
            name = "Example Cart"

            [[MK-1234.map]]
            start = 0x200000
            last = 0x203FFF
            device = "sram"
            bus_width = "odd"
        "#;
        let db: RomDb = toml::from_str(toml).unwrap();
        let entry = db.entry("MK-1234").unwrap();
        assert_eq!(entry.name.as_deref(), Some("Example Cart"));
        assert_eq!(entry.map.len(), 1);
        assert_eq!(entry.map[0].start, 0x200000);
    }

    #[test]
    fn missing_entry_returns_none() {
        let db = RomDb::empty();
        assert!(db.entry("GM 00000000").is_none());
    }
}
