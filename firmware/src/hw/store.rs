//! Append-only record journal on a raw SPI SD card.
//!
//! The card carries no filesystem: each 512-byte block holds one tagged
//! record (log id, kind, length, text), written sequentially from block
//! zero. Host tooling reassembles the per-log CSV files from the journal.
//! The header-on-creation rule from the storage contract maps to "emit a
//! header record the first time a log id appears".

use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::Spi;
use embassy_time::{block_for, Duration};

use logger_core::record::{LogStore, StorageError};
use logger_core::session::LogId;

const BLOCK_LEN: usize = 512;
const RECORD_MAGIC: u16 = 0x4A52;
const KIND_HEADER: u8 = 1;
const KIND_ROW: u8 = 2;

/// Record framing: magic (2), kind (1), reserved (1), text length as a
/// little-endian u16 (2), log id (4), then the text. The length field is
/// wide enough for any payload the block can hold.
const PAYLOAD_OFFSET: usize = 10;
const LENGTH_OFFSET: usize = 4;
const LOG_ID_OFFSET: usize = 6;
const MAX_TEXT: usize = BLOCK_LEN - PAYLOAD_OFFSET;

pub struct BlockJournal<'d> {
    spi: Spi<'d, Blocking>,
    cs: Output<'d>,
    next_block: u32,
    last_log: Option<LogId>,
    mounted: bool,
}

impl<'d> BlockJournal<'d> {
    pub fn new(spi: Spi<'d, Blocking>, cs: Output<'d>) -> Self {
        Self {
            spi,
            cs,
            next_block: 0,
            last_log: None,
            mounted: false,
        }
    }

    fn command(&mut self, cmd: u8, arg: u32) -> u8 {
        let mut frame = [0u8; 6];
        frame[0] = 0x40 | cmd;
        frame[1..5].copy_from_slice(&arg.to_be_bytes());
        frame[5] = match cmd {
            0 => 0x95,
            8 => 0x87,
            _ => 0x01,
        };
        let _ = self.spi.blocking_write(&frame);

        let mut response = [0xFFu8; 1];
        for _ in 0..8 {
            let _ = self.spi.blocking_read(&mut response);
            if response[0] & 0x80 == 0 {
                break;
            }
        }
        response[0]
    }

    fn init_card(&mut self) -> bool {
        self.cs.set_high();
        let warmup = [0xFFu8; 10];
        let _ = self.spi.blocking_write(&warmup);

        self.cs.set_low();
        if self.command(0, 0) != 0x01 {
            self.cs.set_high();
            return false;
        }
        let _ = self.command(8, 0x0000_01AA);
        for _ in 0..1000 {
            let _ = self.command(55, 0);
            if self.command(41, 0x4000_0000) == 0x00 {
                self.cs.set_high();
                return true;
            }
            block_for(Duration::from_millis(1));
        }
        self.cs.set_high();
        false
    }

    fn read_block(&mut self, block: u32, buffer: &mut [u8; BLOCK_LEN]) -> bool {
        self.cs.set_low();
        if self.command(17, block) != 0x00 {
            self.cs.set_high();
            return false;
        }
        let mut token = [0xFFu8; 1];
        for _ in 0..10_000 {
            let _ = self.spi.blocking_read(&mut token);
            if token[0] == 0xFE {
                break;
            }
        }
        let ok = token[0] == 0xFE && self.spi.blocking_read(buffer).is_ok();
        let mut crc = [0u8; 2];
        let _ = self.spi.blocking_read(&mut crc);
        self.cs.set_high();
        ok
    }

    fn write_block(&mut self, block: u32, buffer: &[u8; BLOCK_LEN]) -> bool {
        self.cs.set_low();
        if self.command(24, block) != 0x00 {
            self.cs.set_high();
            return false;
        }
        let _ = self.spi.blocking_write(&[0xFF, 0xFE]);
        let _ = self.spi.blocking_write(buffer);
        let _ = self.spi.blocking_write(&[0xFF, 0xFF]);

        let mut response = [0xFFu8; 1];
        let _ = self.spi.blocking_read(&mut response);
        let accepted = response[0] & 0x1F == 0x05;
        while {
            let mut busy = [0u8; 1];
            let _ = self.spi.blocking_read(&mut busy);
            busy[0] == 0x00
        } {}
        self.cs.set_high();
        accepted
    }

    /// Walks the journal to the first unwritten block, remembering the log
    /// id of the final record so headers are not duplicated across boots.
    fn seek_end(&mut self) {
        let mut buffer = [0u8; BLOCK_LEN];
        self.next_block = 0;
        self.last_log = None;
        while self.read_block(self.next_block, &mut buffer) {
            let magic = u16::from_le_bytes([buffer[0], buffer[1]]);
            if magic != RECORD_MAGIC {
                return;
            }
            let raw = u32::from_le_bytes([
                buffer[LOG_ID_OFFSET],
                buffer[LOG_ID_OFFSET + 1],
                buffer[LOG_ID_OFFSET + 2],
                buffer[LOG_ID_OFFSET + 3],
            ]);
            if raw != 0 {
                self.last_log = Some(LogId::from_raw(raw));
            }
            self.next_block += 1;
        }
    }

    fn append_record(&mut self, log: LogId, kind: u8, text: &str) -> Result<(), StorageError> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_TEXT {
            return Err(StorageError::WriteFailed);
        }
        let mut buffer = [0u8; BLOCK_LEN];
        buffer[0..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        buffer[2] = kind;
        buffer[LENGTH_OFFSET..LENGTH_OFFSET + 2]
            .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        buffer[LOG_ID_OFFSET..LOG_ID_OFFSET + 4].copy_from_slice(&log.raw().to_le_bytes());
        buffer[PAYLOAD_OFFSET..PAYLOAD_OFFSET + bytes.len()].copy_from_slice(bytes);

        if self.write_block(self.next_block, &buffer) {
            self.next_block += 1;
            self.last_log = Some(log);
            Ok(())
        } else {
            Err(StorageError::WriteFailed)
        }
    }
}

impl LogStore for BlockJournal<'_> {
    fn mount(&mut self) -> bool {
        if self.mounted {
            return true;
        }
        if self.init_card() {
            self.seek_end();
            self.mounted = true;
        }
        self.mounted
    }

    fn append(&mut self, log: LogId, header: &str, row: &str) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::Unmounted);
        }
        if self.last_log != Some(log) {
            self.append_record(log, KIND_HEADER, header)?;
        }
        self.append_record(log, KIND_ROW, row)
    }
}
