//! Bit-banged 1-Wire master for the three temperature probe ports.
//!
//! Each port is a single open-drain line with external pull-up. Timing
//! follows the standard-speed slots; busy-waits are short enough that the
//! executor sees at most one slot of latency at a time. The 750 ms
//! conversion delay is awaited by the sensor task, not here.

use embassy_stm32::gpio::{Flex, Pull, Speed};
use embassy_time::block_for;
use embassy_time::Duration;

use logger_core::sensing::{
    Bus, BusTopology, SensorAddress, SensorBus, ALL_BUSES, BUS_COUNT, MAX_SENSORS_PER_BUS,
};

const CMD_SKIP_ROM: u8 = 0xCC;
const CMD_MATCH_ROM: u8 = 0x55;
const CMD_SEARCH_ROM: u8 = 0xF0;
const CMD_CONVERT: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

pub struct OneWirePorts<'d> {
    lines: [Flex<'d>; BUS_COUNT],
}

impl<'d> OneWirePorts<'d> {
    pub fn new(mut lines: [Flex<'d>; BUS_COUNT]) -> Self {
        for line in &mut lines {
            line.set_as_input(Pull::None);
        }
        Self { lines }
    }

    fn line(&mut self, bus: Bus) -> &mut Flex<'d> {
        &mut self.lines[bus.as_index()]
    }

    fn reset(&mut self, bus: Bus) -> bool {
        let line = self.line(bus);
        line.set_as_output(Speed::Low);
        line.set_low();
        block_for(Duration::from_micros(480));
        line.set_as_input(Pull::None);
        block_for(Duration::from_micros(70));
        let presence = line.is_low();
        block_for(Duration::from_micros(410));
        presence
    }

    fn write_bit(&mut self, bus: Bus, bit: bool) {
        let line = self.line(bus);
        line.set_as_output(Speed::Low);
        line.set_low();
        block_for(Duration::from_micros(if bit { 6 } else { 60 }));
        line.set_as_input(Pull::None);
        block_for(Duration::from_micros(if bit { 64 } else { 10 }));
    }

    fn read_bit(&mut self, bus: Bus) -> bool {
        let line = self.line(bus);
        line.set_as_output(Speed::Low);
        line.set_low();
        block_for(Duration::from_micros(6));
        line.set_as_input(Pull::None);
        block_for(Duration::from_micros(9));
        let bit = line.is_high();
        block_for(Duration::from_micros(55));
        bit
    }

    fn write_byte(&mut self, bus: Bus, byte: u8) {
        for shift in 0..8 {
            self.write_bit(bus, byte & (1 << shift) != 0);
        }
    }

    fn read_byte(&mut self, bus: Bus) -> u8 {
        let mut byte = 0;
        for shift in 0..8 {
            if self.read_bit(bus) {
                byte |= 1 << shift;
            }
        }
        byte
    }

    fn match_rom(&mut self, bus: Bus, address: &SensorAddress) {
        self.write_byte(bus, CMD_MATCH_ROM);
        for byte in address.0 {
            self.write_byte(bus, byte);
        }
    }

    /// Standard ROM search, bounded to the per-port sensor limit.
    fn search(&mut self, bus: Bus, topology: &mut BusTopology) {
        let mut last_discrepancy = 0usize;
        let mut rom = [0u8; 8];

        for _ in 0..MAX_SENSORS_PER_BUS {
            if !self.reset(bus) {
                return;
            }
            self.write_byte(bus, CMD_SEARCH_ROM);

            let mut discrepancy_marker = 0usize;
            for position in 1..=64 {
                let bit = self.read_bit(bus);
                let complement = self.read_bit(bus);
                let chosen = match (bit, complement) {
                    (true, true) => return,
                    (false, false) => {
                        // Both branches populated; replay the previous path
                        // and fork at the newest unexplored discrepancy.
                        if position == last_discrepancy {
                            true
                        } else if position > last_discrepancy {
                            discrepancy_marker = position;
                            false
                        } else {
                            let prior = rom[(position - 1) / 8] & (1 << ((position - 1) % 8)) != 0;
                            if !prior {
                                discrepancy_marker = position;
                            }
                            prior
                        }
                    }
                    (bit, _) => bit,
                };

                let index = (position - 1) / 8;
                let mask = 1 << ((position - 1) % 8);
                if chosen {
                    rom[index] |= mask;
                } else {
                    rom[index] &= !mask;
                }
                self.write_bit(bus, chosen);
            }

            topology.push(bus, SensorAddress(rom));
            last_discrepancy = discrepancy_marker;
            if last_discrepancy == 0 {
                return;
            }
        }
    }
}

impl SensorBus for OneWirePorts<'_> {
    fn scan_topology(&mut self) -> BusTopology {
        let mut topology = BusTopology::new();
        for bus in ALL_BUSES {
            self.search(bus, &mut topology);
        }
        topology
    }

    fn request_all(&mut self) {
        for bus in ALL_BUSES {
            if self.reset(bus) {
                self.write_byte(bus, CMD_SKIP_ROM);
                self.write_byte(bus, CMD_CONVERT);
            }
        }
    }

    fn read_one(&mut self, bus: Bus, address: &SensorAddress) -> Option<f32> {
        if !self.reset(bus) {
            return None;
        }
        self.match_rom(bus, address);
        self.write_byte(bus, CMD_READ_SCRATCHPAD);
        let lsb = self.read_byte(bus);
        let msb = self.read_byte(bus);
        let raw = i16::from_le_bytes([lsb, msb]);
        // All-ones scratchpad means the probe vanished mid-cycle.
        if raw == -1 && lsb == 0xFF {
            return None;
        }
        Some(f32::from(raw) / 16.0)
    }
}
