//! I2C-EEPROM state machine (§4.4). A single FSM parameterized by the
//! device's address-word size, rather than one Rust type per capacity
//! tier — the capacity alone determines whether the address phase is 0, 1,
//! or 2 bytes wide (§3: "Device-address size is implicit in the declared
//! capacity").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromState {
    Idle,
    Start,
    DeviceAck,
    AddressHi,
    AddressHiAck,
    Address,
    AddressAck,
    Read,
    ReadAck,
    Write,
    WriteAck,
}

/// How many address bytes follow the device/rw byte, derived from capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressWidth {
    /// Device word itself carries the full (7-bit) address; no separate phase.
    None,
    /// One address byte follows the device word.
    OneByte,
    /// Two address bytes follow the device word (AddressHi then Address).
    TwoBytes,
}

impl AddressWidth {
    fn for_capacity(size: usize) -> Self {
        if size <= 256 {
            Self::None
        } else if size <= 8192 {
            Self::OneByte
        } else {
            Self::TwoBytes
        }
    }
}

#[derive(Debug, Clone)]
pub struct EepromDevice {
    buffer: Vec<u8>,
    state: EepromState,
    host_sda: bool,
    slave_sda: bool,
    scl: bool,
    latch: u8,
    counter: u8,
    address: u32,
    address_width: AddressWidth,
    read_write: bool,
    dirty: bool,
}

impl EepromDevice {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            address_width: AddressWidth::for_capacity(size),
            buffer: vec![0; size],
            state: EepromState::Idle,
            host_sda: false,
            slave_sda: true,
            scl: false,
            latch: 0,
            counter: 0,
            address: 0,
            read_write: false,
            dirty: false,
        }
    }

    #[must_use]
    pub fn seeded(size: usize, contents: &[u8]) -> Self {
        let mut device = Self::new(size);
        let n = contents.len().min(device.buffer.len());
        device.buffer[..n].copy_from_slice(&contents[..n]);
        device
    }

    #[must_use]
    pub fn host_sda(&self) -> bool {
        self.host_sda
    }

    #[must_use]
    pub fn slave_sda(&self) -> bool {
        self.slave_sda
    }

    /// Output to the cartridge bus: wired-AND of host and slave drivers.
    #[must_use]
    pub fn bus_sda(&self) -> bool {
        self.host_sda && self.slave_sda
    }

    #[must_use]
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.buffer
    }

    /// `set_host_sda`: detects START/STOP only while SCL is held high.
    pub fn set_host_sda(&mut self, value: bool) {
        if self.scl {
            if value && !self.host_sda {
                // low-to-high while SCL high: STOP condition
                self.state = EepromState::Idle;
                self.slave_sda = true;
            } else if !value && self.host_sda {
                // high-to-low while SCL high: START condition
                self.state = EepromState::Start;
                self.slave_sda = true;
                self.counter = 8;
            }
        }
        self.host_sda = value;
    }

    /// `set_scl`: rising edges shift/commit the latch; falling edges drive
    /// `slave_sda` for the next bit.
    pub fn set_scl(&mut self, value: bool) {
        if value && !self.scl {
            self.rising_edge();
        } else if !value && self.scl {
            self.falling_edge();
        }
        self.scl = value;
    }

    fn rising_edge(&mut self) {
        match self.state {
            EepromState::Start | EepromState::AddressHi | EepromState::Address | EepromState::Write => {
                self.latch = (self.latch << 1) | u8::from(self.host_sda);
                self.counter -= 1;
                if self.counter == 0 {
                    self.commit_byte();
                }
            }
            _ => {}
        }
    }

    fn commit_byte(&mut self) {
        match self.state {
            EepromState::Start => {
                self.read_write = self.latch & 1 != 0;
                self.state = EepromState::DeviceAck;
            }
            EepromState::AddressHi => {
                self.address = u32::from(self.latch) << 8;
                self.state = EepromState::AddressHiAck;
            }
            EepromState::Address => {
                self.address |= u32::from(self.latch);
                self.state = EepromState::AddressAck;
            }
            EepromState::Write => {
                let size = self.buffer.len();
                if size > 0 {
                    self.buffer[(self.address as usize) % size] = self.latch;
                    self.dirty = true;
                    self.address = (self.address + 1) % size as u32;
                }
                self.state = EepromState::WriteAck;
            }
            _ => {}
        }
    }

    /// Advances past an ACK phase (8th falling edge after the ack bit).
    fn advance_past_ack(&mut self) {
        self.state = match self.state {
            EepromState::DeviceAck => {
                if self.read_write {
                    self.preload_read_latch();
                    EepromState::Read
                } else {
                    match self.address_width {
                        AddressWidth::None => {
                            self.address = u32::from(self.latch & 0x7F);
                            EepromState::Write
                        }
                        AddressWidth::OneByte => {
                            self.counter = 8;
                            EepromState::Address
                        }
                        AddressWidth::TwoBytes => {
                            self.counter = 8;
                            EepromState::AddressHi
                        }
                    }
                }
            }
            EepromState::AddressHiAck => {
                self.counter = 8;
                EepromState::Address
            }
            EepromState::AddressAck => {
                if self.read_write {
                    self.preload_read_latch();
                    EepromState::Read
                } else {
                    self.counter = 8;
                    EepromState::Write
                }
            }
            EepromState::WriteAck => {
                self.counter = 8;
                EepromState::Write
            }
            EepromState::ReadAck => {
                self.preload_read_latch();
                EepromState::Read
            }
            other => other,
        };
    }

    fn preload_read_latch(&mut self) {
        let size = self.buffer.len();
        self.latch = if size > 0 { self.buffer[(self.address as usize) % size] } else { 0xFF };
        if size > 0 {
            self.address = (self.address + 1) % size as u32;
        }
        self.counter = 8;
    }

    fn falling_edge(&mut self) {
        self.slave_sda = match self.state {
            EepromState::DeviceAck
            | EepromState::AddressHiAck
            | EepromState::AddressAck
            | EepromState::WriteAck => false,
            EepromState::Read | EepromState::ReadAck => {
                let bit = self.latch & 0x80 != 0;
                self.latch <<= 1;
                bit
            }
            _ => true,
        };

        match self.state {
            EepromState::DeviceAck
            | EepromState::AddressHiAck
            | EepromState::AddressAck
            | EepromState::WriteAck => self.advance_past_ack(),
            EepromState::Read => {
                self.counter -= 1;
                if self.counter == 0 {
                    self.state = EepromState::ReadAck;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_bit(device: &mut EepromDevice, bit: bool) {
        device.set_host_sda(bit);
        device.set_scl(true);
        device.set_scl(false);
    }

    fn write_byte(device: &mut EepromDevice, byte: u8) {
        for i in (0..8).rev() {
            clock_bit(device, (byte >> i) & 1 != 0);
        }
    }

    fn start(device: &mut EepromDevice) {
        device.set_host_sda(true);
        device.set_scl(true);
        device.set_host_sda(false);
    }

    fn stop(device: &mut EepromDevice) {
        device.set_scl(true);
        device.set_host_sda(true);
    }

    #[test]
    fn write_then_read_128_byte_device() {
        let mut device = EepromDevice::new(128);

        start(&mut device);
        write_byte(&mut device, 0xA0); // device address, write
        device.set_scl(false);
        write_byte(&mut device, 0x05); // address
        device.set_scl(false);
        write_byte(&mut device, 0x42); // data
        stop(&mut device);

        assert_eq!(device.memory()[5], 0x42);

        start(&mut device);
        write_byte(&mut device, 0xA1); // device address, read
        // clock out 8 bits, sampling slave_sda after each falling edge
        let mut byte = 0u8;
        for _ in 0..8 {
            device.set_scl(true);
            device.set_scl(false);
            byte = (byte << 1) | u8::from(device.slave_sda());
        }
        assert_eq!(byte, 0x42);
    }

    #[test]
    fn address_wraps_modulo_size() {
        let mut device = EepromDevice::new(4);
        device.address_width = AddressWidth::None;
        device.state = EepromState::Write;
        device.counter = 1;
        device.address = 3;
        device.latch = 0xAB;
        device.commit_byte();
        assert_eq!(device.address, 0);
        assert_eq!(device.buffer[3], 0xAB);
    }
}
