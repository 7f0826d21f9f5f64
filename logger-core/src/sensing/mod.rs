//! Sensor data model and the sensor-bus driver seam.
//!
//! Readings are working-memory only: the bus topology is rescanned and every
//! value rewritten on each acquisition cycle, so nothing here crosses the
//! sleep boundary. Raw bus scanning and temperature conversion belong to the
//! driver behind [`SensorBus`]; the core only carries identities, values, and
//! per-sensor error flags.

use heapless::{String, Vec};

/// Number of physical sensor ports on the carrier board.
pub const BUS_COUNT: usize = 3;

/// Maximum sensors resolvable per bus.
pub const MAX_SENSORS_PER_BUS: usize = 5;

/// Upper bound on sensors across all buses.
pub const MAX_SENSORS: usize = BUS_COUNT * MAX_SENSORS_PER_BUS;

/// One of the physical sensor ports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bus {
    Port1,
    Port2,
    Port3,
}

/// Every bus, in scan order.
pub const ALL_BUSES: [Bus; BUS_COUNT] = [Bus::Port1, Bus::Port2, Bus::Port3];

impl Bus {
    /// Deterministic index for lookups.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            Bus::Port1 => 0,
            Bus::Port2 => 1,
            Bus::Port3 => 2,
        }
    }

    /// Attempts to construct a [`Bus`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Bus::Port1),
            1 => Some(Bus::Port2),
            2 => Some(Bus::Port3),
            _ => None,
        }
    }
}

/// 64-bit sensor ROM address as reported by the bus enumeration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorAddress(pub [u8; 8]);

impl SensorAddress {
    /// Four-character column label: the high nibble of address bytes
    /// 1, 3, 5, and 7 rendered as hex.
    #[must_use]
    pub fn short_label(&self) -> String<4> {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        let mut out = String::new();
        for byte_index in [1usize, 3, 5, 7] {
            let nibble = (self.0[byte_index] >> 4) & 0x0F;
            let _ = out.push(HEX[nibble as usize] as char);
        }
        out
    }
}

/// Per-reading status flag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadingStatus {
    Ok,
    Disconnected,
}

/// One sensor's value for the current acquisition cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub bus: Bus,
    pub address: SensorAddress,
    pub value: f32,
    pub status: ReadingStatus,
}

impl SensorReading {
    /// A reading placeholder created at scan time, before any value arrives.
    /// Stays `Disconnected` if the read never completes.
    #[must_use]
    pub const fn pending(bus: Bus, address: SensorAddress) -> Self {
        Self {
            bus,
            address,
            value: 0.0,
            status: ReadingStatus::Disconnected,
        }
    }
}

/// Working set of readings for one acquisition cycle.
pub type ReadingSet = Vec<SensorReading, MAX_SENSORS>;

/// Enumerated bus topology: which sensors answered the scan, per port.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BusTopology {
    sensors: Vec<(Bus, SensorAddress), MAX_SENSORS>,
}

impl BusTopology {
    /// Empty topology (no sensors attached).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    /// Registers a scanned sensor. Silently drops sensors beyond
    /// [`MAX_SENSORS`]; the hardware cannot address more anyway.
    pub fn push(&mut self, bus: Bus, address: SensorAddress) {
        let _ = self.sensors.push((bus, address));
    }

    /// Iterates sensors in scan order.
    pub fn iter(&self) -> impl Iterator<Item = &(Bus, SensorAddress)> {
        self.sensors.iter()
    }

    /// Number of enumerated sensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Returns `true` when no sensor answered the scan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Builds the pending reading set for this topology.
    #[must_use]
    pub fn pending_readings(&self) -> ReadingSet {
        let mut readings = ReadingSet::new();
        for (bus, address) in self.iter() {
            let _ = readings.push(SensorReading::pending(*bus, *address));
        }
        readings
    }
}

/// Abstraction over the external sensor-bus driver.
///
/// `request_all` kicks off conversion on every enumerated sensor;
/// `read_one` collects a value after the conversion delay has passed, with
/// `None` standing for a sensor that no longer answers.
pub trait SensorBus {
    /// Enumerates the sensors currently answering on all ports.
    fn scan_topology(&mut self) -> BusTopology;

    /// Starts a conversion on every enumerated sensor.
    fn request_all(&mut self);

    /// Reads one converted value; `None` when the sensor is disconnected.
    fn read_one(&mut self, bus: Bus, address: &SensorAddress) -> Option<f32>;
}

/// Sensor bus that answers with an empty topology. Useful for boots where
/// the sensor harness is unplugged entirely.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopSensorBus;

impl SensorBus for NoopSensorBus {
    fn scan_topology(&mut self) -> BusTopology {
        BusTopology::new()
    }

    fn request_all(&mut self) {}

    fn read_one(&mut self, _: Bus, _: &SensorAddress) -> Option<f32> {
        None
    }
}
