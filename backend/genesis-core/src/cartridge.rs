//! Cartridge configuration (§4.3): header parsing, ROM-database overlay,
//! and the cartridge's own internal memory map. This is the one place in
//! the address space where more than one kind of backing store (ROM,
//! SRAM, EEPROM) can occupy the same range depending on how a given
//! cartridge is wired, so it's the one place the §3 "memory-map chunk"
//! model is implemented directly rather than folded into a static `match`.

pub mod eeprom;
pub mod external;

use crate::error::CartridgeError;
use crate::memory::GenesisRegion;
use crate::romdb::{RomDbDevice, RomDbEntry};
use external::{EepromStorage, EepromWiring, SaveStorage, SramBusWidth, SramStorage};

const TITLE_START: usize = 0x150;
const TITLE_LEN: usize = 48;
const PRODUCT_ID_START: usize = 0x183;
const PRODUCT_ID_MAX_LEN: usize = 14;
const REGION_START: usize = 0x1F0;
const REGION_LEN: usize = 3;
const ROM_END_FIELD: usize = 0x1A4;
const RAM_ID: usize = 0x1B0;
const RAM_FLAGS: usize = 0x1B2;
const RAM_START_FIELD: usize = 0x1B4;
const RAM_END_FIELD: usize = 0x1B8;

const RAM_FLAG_BOTH: u8 = 0;
const RAM_FLAG_ODD: u8 = 1;
const RAM_FLAG_EVEN: u8 = 2;
const RAM_FLAG_MASK: u8 = 0x3;

const BANKED_WINDOW_START: u32 = 0x200000;
const BANKED_WINDOW_END: u32 = 0x3FFFFF;

fn get_u32be(rom: &[u8], offset: usize) -> u32 {
    if offset + 4 > rom.len() {
        return 0;
    }
    u32::from_be_bytes([rom[offset], rom[offset + 1], rom[offset + 2], rom[offset + 3]])
}

/// Region support bits parsed from header offset 0x1F0, per §4.3 step 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionSupport {
    pub japan: bool,
    pub americas: bool,
    pub europe: bool,
}

impl RegionSupport {
    fn from_header_chars(chars: &[u8]) -> Self {
        let mut support = Self::default();
        for &c in chars {
            match c {
                b'J' => support.japan = true,
                b'U' | b'B' | b'4' => support.americas = true,
                b'E' | b'A' => support.europe = true,
                _ => {}
            }
        }
        support
    }

    fn from_db_string(s: &str) -> Self {
        Self::from_header_chars(s.as_bytes())
    }

    #[must_use]
    pub fn supports(&self, region: GenesisRegion) -> bool {
        match region {
            GenesisRegion::Japan => self.japan,
            GenesisRegion::Americas => self.americas,
            GenesisRegion::Europe => self.europe,
        }
    }

    /// Prefers the cartridge's own region over whatever the caller asked
    /// for, falling back to Americas, then Europe, then Japan.
    #[must_use]
    pub fn best_match(&self, preferred: GenesisRegion) -> GenesisRegion {
        if self.supports(preferred) {
            return preferred;
        }
        if self.americas {
            GenesisRegion::Americas
        } else if self.europe {
            GenesisRegion::Europe
        } else {
            GenesisRegion::Japan
        }
    }
}

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub product_id: String,
    pub title: String,
    pub regions: RegionSupport,
}

fn parse_title(rom: &[u8]) -> String {
    let end = (TITLE_START + TITLE_LEN).min(rom.len());
    if TITLE_START >= end {
        return String::new();
    }
    rom[TITLE_START..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_product_id(rom: &[u8]) -> String {
    let end = (PRODUCT_ID_START + PRODUCT_ID_MAX_LEN).min(rom.len());
    if PRODUCT_ID_START >= end {
        return String::new();
    }
    let mut id = String::new();
    for &b in &rom[PRODUCT_ID_START..end] {
        if b <= b' ' {
            break;
        }
        id.push(b as char);
    }
    id
}

/// Reads a ROM's product ID ahead of [`Cartridge::new`], so a caller can
/// look up the matching ROM-DB entry before building the cartridge.
#[must_use]
pub fn peek_product_id(rom: &[u8]) -> String {
    parse_product_id(rom)
}

fn parse_header(rom: &[u8]) -> CartridgeHeader {
    let region_end = (REGION_START + REGION_LEN).min(rom.len());
    let regions = if REGION_START < region_end {
        RegionSupport::from_header_chars(&rom[REGION_START..region_end])
    } else {
        RegionSupport::default()
    };
    CartridgeHeader { product_id: parse_product_id(rom), title: parse_title(rom), regions }
}

/// The §3 "memory-map chunk" tagged variant, scoped to the cartridge's own
/// address window rather than the whole bus.
#[derive(Debug, Clone)]
enum ChunkKind {
    Sram,
    Eeprom,
    /// Sega banked mapper window 2: LSB of the bank register selects
    /// between a ROM mirror (`rom_offset`) and the save-storage window.
    Banked { rom_offset: u32 },
}

#[derive(Debug, Clone)]
struct MapChunk {
    start: u32,
    end: u32,
    kind: ChunkKind,
}

impl MapChunk {
    fn contains(&self, address: u32) -> bool {
        (self.start..=self.end).contains(&address)
    }
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    chunks: Vec<MapChunk>,
    save: SaveStorage,
    bank_register: u8,
    pub header: CartridgeHeader,
}

impl Cartridge {
    pub fn new(rom: Vec<u8>, romdb_entry: Option<&RomDbEntry>) -> Result<Self, CartridgeError> {
        let header = parse_header(&rom);
        let header = match romdb_entry.and_then(|entry| entry.regions.as_deref()) {
            Some(regions) => {
                CartridgeHeader { regions: RegionSupport::from_db_string(regions), ..header }
            }
            None => header,
        };

        if let Some(entry) = romdb_entry.filter(|entry| !entry.map.is_empty()) {
            return Self::from_explicit_map(rom, header, entry);
        }

        Ok(Self::from_header_inference(rom, header))
    }

    fn from_explicit_map(
        rom: Vec<u8>,
        header: CartridgeHeader,
        entry: &RomDbEntry,
    ) -> Result<Self, CartridgeError> {
        let mut chunks = Vec::new();
        let mut save = SaveStorage::None;

        for map_entry in &entry.map {
            match map_entry.device {
                RomDbDevice::Rom => {}
                RomDbDevice::Sram => {
                    let size = (map_entry.last - map_entry.start + 1) as usize;
                    let width = map_entry.bus_width.map_or(SramBusWidth::Both, Into::into);
                    save = SaveStorage::Sram(SramStorage::new(size, width));
                    chunks.push(MapChunk { start: map_entry.start, end: map_entry.last, kind: ChunkKind::Sram });
                }
                RomDbDevice::Eeprom => {
                    let eeprom_config = entry.eeprom.as_ref().ok_or_else(|| {
                        CartridgeError::UnsupportedMapperShape { product_id: header.product_id.clone() }
                    })?;
                    let wiring = EepromWiring {
                        sda_in_bit: eeprom_config.sda_in_bit.unwrap_or(0),
                        sda_out_bit: eeprom_config.sda_out_bit.unwrap_or(0),
                        scl_bit: eeprom_config.scl_bit.unwrap_or(1),
                    };
                    save = SaveStorage::Eeprom(EepromStorage::new(eeprom_config.size, wiring));
                    chunks.push(MapChunk {
                        start: map_entry.start,
                        end: map_entry.last,
                        kind: ChunkKind::Eeprom,
                    });
                }
            }
        }

        Ok(Self { rom, chunks, save, bank_register: 0, header })
    }

    fn from_header_inference(rom: Vec<u8>, header: CartridgeHeader) -> Self {
        let has_save_header = rom.len() > RAM_ID + 1 && rom[RAM_ID] == b'R' && rom[RAM_ID + 1] == b'A';
        if !has_save_header {
            return Self { rom, chunks: Vec::new(), save: SaveStorage::None, bank_register: 0, header };
        }

        let rom_end = get_u32be(&rom, ROM_END_FIELD).wrapping_add(1);
        let ram_start = get_u32be(&rom, RAM_START_FIELD) & 0xFFFFFE;
        let ram_end = get_u32be(&rom, RAM_END_FIELD) | 1;
        let ram_flags = rom.get(RAM_FLAGS).copied().unwrap_or(RAM_FLAG_BOTH) & RAM_FLAG_MASK;
        let width = match ram_flags {
            RAM_FLAG_ODD => SramBusWidth::Odd,
            RAM_FLAG_EVEN => SramBusWidth::Even,
            _ => SramBusWidth::Both,
        };

        let window_size = (ram_end.saturating_sub(ram_start) + 1) as usize;
        let storage_size = if matches!(width, SramBusWidth::Both) { window_size } else { window_size / 2 };

        if ram_start >= rom_end {
            let chunks = vec![MapChunk { start: ram_start, end: ram_end, kind: ChunkKind::Sram }];
            let save = SaveStorage::Sram(SramStorage::new(storage_size, width));
            Self { rom, chunks, save, bank_register: 0, header }
        } else {
            let chunks = vec![MapChunk {
                start: BANKED_WINDOW_START,
                end: BANKED_WINDOW_END,
                kind: ChunkKind::Banked { rom_offset: BANKED_WINDOW_START },
            }];
            let save = SaveStorage::Sram(SramStorage::new(storage_size, width));
            Self { rom, chunks, save, bank_register: 0, header }
        }
    }

    fn find_chunk(&self, address: u32) -> Option<&MapChunk> {
        self.chunks.iter().find(|chunk| chunk.contains(address))
    }

    fn rom_byte(&self, address: u32) -> u8 {
        if self.rom.is_empty() {
            return 0xFF;
        }
        self.rom[(address as usize) % self.rom.len()]
    }

    #[must_use]
    pub fn read_byte(&mut self, address: u32) -> u8 {
        match self.find_chunk(address).map(|chunk| chunk.kind.clone()) {
            Some(ChunkKind::Sram) => match &self.save {
                SaveStorage::Sram(sram) => sram.read_byte(address),
                _ => 0xFF,
            },
            Some(ChunkKind::Eeprom) => match &self.save {
                SaveStorage::Eeprom(eeprom) => eeprom.read_byte(),
                _ => 0xFF,
            },
            Some(ChunkKind::Banked { rom_offset }) => {
                if self.bank_register & 1 == 0 {
                    self.rom_byte(address.wrapping_sub(BANKED_WINDOW_START).wrapping_add(rom_offset))
                } else {
                    match &self.save {
                        SaveStorage::Sram(sram) => sram.read_byte(address),
                        _ => 0xFF,
                    }
                }
            }
            None => self.rom_byte(address),
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        match self.find_chunk(address).map(|chunk| chunk.kind.clone()) {
            Some(ChunkKind::Sram) => {
                if let SaveStorage::Sram(sram) = &mut self.save {
                    sram.write_byte(address, value);
                }
            }
            Some(ChunkKind::Eeprom) => {
                if let SaveStorage::Eeprom(eeprom) = &mut self.save {
                    eeprom.write_byte(value);
                }
            }
            Some(ChunkKind::Banked { .. }) => {
                if self.bank_register & 1 != 0 {
                    if let SaveStorage::Sram(sram) = &mut self.save {
                        sram.write_byte(address, value);
                    }
                }
            }
            None => {}
        }
    }

    #[must_use]
    pub fn read_word(&mut self, address: u32) -> u16 {
        match self.find_chunk(address).map(|chunk| chunk.kind.clone()) {
            Some(ChunkKind::Sram) => match &self.save {
                SaveStorage::Sram(sram) => sram.read_word(address),
                _ => 0xFFFF,
            },
            Some(ChunkKind::Eeprom) => {
                let byte = match &self.save {
                    SaveStorage::Eeprom(eeprom) => eeprom.read_byte(),
                    _ => 0xFF,
                };
                u16::from_be_bytes([byte, byte])
            }
            Some(ChunkKind::Banked { .. }) if self.bank_register & 1 != 0 => match &self.save {
                SaveStorage::Sram(sram) => sram.read_word(address),
                _ => 0xFFFF,
            },
            _ => {
                let hi = self.rom_byte(address);
                let lo = self.rom_byte(address | 1);
                u16::from_be_bytes([hi, lo])
            }
        }
    }

    pub fn write_word(&mut self, address: u32, value: u16) {
        match self.find_chunk(address).map(|chunk| chunk.kind.clone()) {
            Some(ChunkKind::Sram) => {
                if let SaveStorage::Sram(sram) = &mut self.save {
                    sram.write_word(address, value);
                }
            }
            Some(ChunkKind::Eeprom) => {
                if let SaveStorage::Eeprom(eeprom) = &mut self.save {
                    eeprom.write_byte(value as u8);
                }
            }
            Some(ChunkKind::Banked { .. }) if self.bank_register & 1 != 0 => {
                if let SaveStorage::Sram(sram) = &mut self.save {
                    sram.write_word(address, value);
                }
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn read_bank_register_byte(&self) -> u8 {
        self.bank_register
    }

    pub fn write_bank_register(&mut self, address: u32, value: u16, is_word: bool) {
        if is_word {
            self.bank_register = value as u8;
        } else if address & 1 != 0 {
            // Byte writes with LSB=0 are ignored; only odd addresses reach
            // the register (§6/§8 scenario 5), matching blastem's
            // `write_bank_reg_b`'s `if (address & 1)` gate.
            self.bank_register = (value & 0xFF) as u8;
        }
    }

    #[must_use]
    pub fn save_memory(&self) -> Option<&[u8]> {
        self.save.persistable_memory()
    }

    #[must_use]
    pub fn save_dirty(&mut self) -> bool {
        self.save.take_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rom(len: usize) -> Vec<u8> {
        vec![0; len]
    }

    #[test]
    fn parses_product_id_trimmed_at_space() {
        let mut rom = make_rom(0x200);
        rom[PRODUCT_ID_START..PRODUCT_ID_START + 8].copy_from_slice(b"GM 12345");
        let header = parse_header(&rom);
        assert_eq!(header.product_id, "GM");
    }

    #[test]
    fn parses_region_support_bits() {
        let mut rom = make_rom(0x200);
        rom[REGION_START..REGION_START + 3].copy_from_slice(b"JUE");
        let header = parse_header(&rom);
        assert!(header.regions.japan);
        assert!(header.regions.americas);
        assert!(header.regions.europe);
    }

    #[test]
    fn no_save_header_yields_pure_rom_cartridge() {
        let rom = make_rom(0x1000);
        let cart = Cartridge::new(rom, None).unwrap();
        assert!(matches!(cart.save, SaveStorage::None));
    }

    #[test]
    fn standalone_save_window_when_ram_start_past_rom_end() {
        let mut rom = make_rom(0x10000);
        rom[ROM_END_FIELD..ROM_END_FIELD + 4].copy_from_slice(&0x0FFFFu32.to_be_bytes());
        rom[RAM_ID] = b'R';
        rom[RAM_ID + 1] = b'A';
        rom[RAM_FLAGS] = RAM_FLAG_BOTH;
        rom[RAM_START_FIELD..RAM_START_FIELD + 4].copy_from_slice(&0x200000u32.to_be_bytes());
        rom[RAM_END_FIELD..RAM_END_FIELD + 4].copy_from_slice(&0x200FFFu32.to_be_bytes());

        let mut cart = Cartridge::new(rom, None).unwrap();
        cart.write_byte(0x200010, 0x7A);
        assert_eq!(cart.read_byte(0x200010), 0x7A);
    }

    #[test]
    fn banked_mapper_toggles_between_rom_and_sram() {
        let mut rom = make_rom(0x10000);
        rom[ROM_END_FIELD..ROM_END_FIELD + 4].copy_from_slice(&0xFFFFu32.to_be_bytes());
        rom[RAM_ID] = b'R';
        rom[RAM_ID + 1] = b'A';
        rom[RAM_FLAGS] = RAM_FLAG_BOTH;
        rom[RAM_START_FIELD..RAM_START_FIELD + 4].copy_from_slice(&0x200000u32.to_be_bytes());
        rom[RAM_END_FIELD..RAM_END_FIELD + 4].copy_from_slice(&0x200FFFu32.to_be_bytes());

        let mut cart = Cartridge::new(rom, None).unwrap();
        cart.write_bank_register(0xA13001, 1, false);
        cart.write_byte(0x200010, 0x55);
        assert_eq!(cart.read_byte(0x200010), 0x55);

        cart.write_bank_register(0xA13001, 0, false);
        assert_ne!(cart.read_byte(0x200010), 0x55);
    }

    #[test]
    fn byte_write_to_even_bank_register_address_is_ignored() {
        let mut rom = make_rom(0x10000);
        rom[ROM_END_FIELD..ROM_END_FIELD + 4].copy_from_slice(&0xFFFFu32.to_be_bytes());
        rom[RAM_ID] = b'R';
        rom[RAM_ID + 1] = b'A';
        rom[RAM_FLAGS] = RAM_FLAG_BOTH;
        rom[RAM_START_FIELD..RAM_START_FIELD + 4].copy_from_slice(&0x200000u32.to_be_bytes());
        rom[RAM_END_FIELD..RAM_END_FIELD + 4].copy_from_slice(&0x200FFFu32.to_be_bytes());

        let mut cart = Cartridge::new(rom, None).unwrap();
        cart.write_bank_register(0xA13000, 1, false);
        assert_eq!(cart.read_bank_register_byte(), 0);
    }
}
