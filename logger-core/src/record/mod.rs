//! Log-record formatting and the storage seam.
//!
//! The persisted format is append-only delimited text, one row per
//! acquisition cycle: `timestamp,battery_mv[,value]*`. A header row naming
//! the columns (derived from the scanned topology) is written once, only
//! when the file is empty at creation time; the [`LogStore`] implementation
//! owns that check because only it can see the file.

use core::fmt::{self, Write};

use heapless::String;

use crate::sensing::{ReadingStatus, SensorReading};
use crate::session::LogId;
use crate::time::Timestamp;

/// Upper bound on one rendered row: timestamp, battery, and a full
/// 15-sensor sweep with sign and two decimals each.
pub const MAX_ROW_LEN: usize = 192;

/// Rendered row buffer.
pub type Row = String<MAX_ROW_LEN>;

/// Placeholder written for a reading whose sensor was disconnected or whose
/// conversion never completed.
pub const ERROR_FIELD: &str = "ERR";

/// Builds the one-time header row for a freshly created log.
#[must_use]
pub fn header_row(readings: &[SensorReading]) -> Row {
    let mut out = Row::new();
    let _ = out.push_str("timestamp,battery_mv");
    for reading in readings {
        let _ = out.push(',');
        let _ = out.push_str(reading.address.short_label().as_str());
    }
    out
}

/// Builds one data row for the current acquisition cycle.
#[must_use]
pub fn data_row(timestamp: &Timestamp, battery_mv: u16, readings: &[SensorReading]) -> Row {
    let mut out = Row::new();
    let _ = write!(out, "{timestamp},{battery_mv}");
    for reading in readings {
        match reading.status {
            ReadingStatus::Ok => {
                let _ = write!(out, ",{:.2}", reading.value);
            }
            ReadingStatus::Disconnected => {
                let _ = write!(out, ",{ERROR_FIELD}");
            }
        }
    }
    out
}

/// Failures surfaced by the storage service. Per-boot conditions: logged,
/// never fatal, retried on the next cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageError {
    /// The card/filesystem failed to mount.
    Unmounted,
    /// The append target could not be opened or created.
    OpenFailed,
    /// The row could not be written out.
    WriteFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unmounted => f.write_str("storage unmounted"),
            StorageError::OpenFailed => f.write_str("append target open failed"),
            StorageError::WriteFailed => f.write_str("row write failed"),
        }
    }
}

/// Abstraction over the append-only storage service.
pub trait LogStore {
    /// Brings the backing medium up for this boot. Returns `false` when the
    /// card or filesystem is unavailable; appends are skipped for the cycle.
    fn mount(&mut self) -> bool;

    /// Appends one row to the log identified by `log`, creating the file on
    /// first use. `header` is written first if, and only if, the file is
    /// empty at creation time.
    fn append(&mut self, log: LogId, header: &str, row: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::{Bus, SensorAddress};
    use crate::time::CivilTime;

    fn reading(value: f32, status: ReadingStatus) -> SensorReading {
        SensorReading {
            bus: Bus::Port2,
            address: SensorAddress([0x28, 0x1A, 0, 0x2B, 0, 0x3C, 0, 0x4D]),
            value,
            status,
        }
    }

    #[test]
    fn header_names_battery_and_sensor_columns() {
        let readings = [
            reading(0.0, ReadingStatus::Ok),
            reading(0.0, ReadingStatus::Ok),
        ];
        assert_eq!(
            header_row(&readings).as_str(),
            "timestamp,battery_mv,1234,1234"
        );
    }

    #[test]
    fn data_row_renders_values_and_error_fields() {
        let timestamp = CivilTime::new(2024, 6, 3, 10, 15, 0).timestamp();
        let readings = [
            reading(21.5, ReadingStatus::Ok),
            reading(0.0, ReadingStatus::Disconnected),
            reading(-3.25, ReadingStatus::Ok),
        ];
        assert_eq!(
            data_row(&timestamp, 3712, &readings).as_str(),
            "03/06/24,10:15:00,3712,21.50,ERR,-3.25"
        );
    }

    #[test]
    fn sensorless_row_carries_only_timestamp_and_battery() {
        let timestamp = CivilTime::new(2024, 6, 3, 10, 15, 0).timestamp();
        assert_eq!(
            data_row(&timestamp, 3650, &[]).as_str(),
            "03/06/24,10:15:00,3650"
        );
    }
}
