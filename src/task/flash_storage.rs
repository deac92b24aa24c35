//! Flash storage task for persistent calibration data
//!
//! Keeps the encoder calibration (pulses per revolution and both inversion
//! flags) in a reserved flash range managed by `sequential-storage`. The
//! control loop loads it once at boot and saves it again whenever a
//! revolution capture produces a new value.
//!
//! The range is the last two sectors of the 2 MB flash; memory.x leaves them
//! out of the FLASH region.

use amr_nav::config::CalibrationConfig;
use defmt::{debug, error, info, warn, Format};
use embassy_rp::flash::{Async, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};
use sequential_storage::{
    cache::NoCache,
    map::{fetch_item, store_item, Key, SerializationError, Value},
};

/// Total on-board flash
pub const FLASH_SIZE: usize = 2048 * 1024;

/// Number of sectors used for storage (2 sectors for wear leveling)
const STORAGE_SECTOR_COUNT: usize = 2;

/// Total storage size
const STORAGE_SIZE: usize = ERASE_SIZE * STORAGE_SECTOR_COUNT;

/// Storage offset from the start of flash; must match memory.x
const STORAGE_OFFSET: u32 = (FLASH_SIZE - STORAGE_SIZE) as u32;

/// Serialized size of [`StoredCalibration`]
const CALIBRATION_BYTES: usize = 5;

/// Flash requests
static FLASH_COMMANDS: Channel<CriticalSectionRawMutex, FlashCommand, 3> = Channel::new();

/// Answer to [`FlashCommand::Load`]
static CALIBRATION_LOADED: Signal<CriticalSectionRawMutex, Option<StoredCalibration>> = Signal::new();

#[derive(Debug, Clone, Copy, Format)]
enum FlashCommand {
    Load,
    Save(StoredCalibration),
}

/// Encoder calibration as it is kept in flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct StoredCalibration {
    pub pulses_per_revolution: u32,
    pub left_inverted: bool,
    pub right_inverted: bool,
}

impl StoredCalibration {
    pub fn from_config(calibration: &CalibrationConfig) -> Self {
        Self {
            pulses_per_revolution: calibration.pulses_per_revolution(),
            left_inverted: calibration.left_inverted,
            right_inverted: calibration.right_inverted,
        }
    }

    /// Writes the stored values into `calibration`; a zero PPR keeps the current one
    pub fn apply(&self, calibration: &mut CalibrationConfig) {
        if calibration.set_pulses_per_revolution(self.pulses_per_revolution).is_err() {
            warn!("stored pulses per revolution is zero, keeping {}", calibration.pulses_per_revolution());
        }
        calibration.left_inverted = self.left_inverted;
        calibration.right_inverted = self.right_inverted;
    }
}

/// Storage keys for sequential-storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum StorageKey {
    EncoderCalibration = 0,
}

impl Key for StorageKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.is_empty() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[0] = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError>
    where
        Self: Sized,
    {
        match buffer.first() {
            None => Err(SerializationError::BufferTooSmall),
            Some(0) => Ok((StorageKey::EncoderCalibration, 1)),
            Some(_) => Err(SerializationError::InvalidFormat),
        }
    }
}

/// Little-endian PPR followed by one flags byte (bit 0 left, bit 1 right)
impl Value<'_> for StoredCalibration {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.len() < CALIBRATION_BYTES {
            return Err(SerializationError::BufferTooSmall);
        }

        buffer[0..4].copy_from_slice(&self.pulses_per_revolution.to_le_bytes());
        buffer[4] = u8::from(self.left_inverted) | (u8::from(self.right_inverted) << 1);

        Ok(CALIBRATION_BYTES)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        if buffer.len() < CALIBRATION_BYTES {
            return Err(SerializationError::BufferTooSmall);
        }

        let flags = buffer[4];
        if flags > 0b11 {
            return Err(SerializationError::InvalidFormat);
        }

        Ok(StoredCalibration {
            pulses_per_revolution: u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]),
            left_inverted: flags & 0b01 != 0,
            right_inverted: flags & 0b10 != 0,
        })
    }
}

/// Reads the stored calibration; `None` if nothing was saved yet or the read failed
pub async fn load_calibration() -> Option<StoredCalibration> {
    CALIBRATION_LOADED.reset();
    FLASH_COMMANDS.send(FlashCommand::Load).await;
    CALIBRATION_LOADED.wait().await
}

/// Queues a save without waiting; dropped with a warning if the queue is full
pub fn request_save(calibration: StoredCalibration) {
    if FLASH_COMMANDS.try_send(FlashCommand::Save(calibration)).is_err() {
        warn!("flash queue full, calibration not saved");
    }
}

#[embassy_executor::task]
pub async fn flash_storage(mut flash: Flash<'static, FLASH, Async, FLASH_SIZE>) {
    info!("Flash storage task started");

    let flash_range = STORAGE_OFFSET..(STORAGE_OFFSET + STORAGE_SIZE as u32);
    let mut cache = NoCache::new();
    let mut data_buffer: [u8; 32] = [0; 32];

    loop {
        let command = FLASH_COMMANDS.receive().await;
        debug!("Flash command received: {:?}", command);

        match command {
            FlashCommand::Load => {
                let loaded = match fetch_item::<StorageKey, StoredCalibration, _>(
                    &mut flash,
                    flash_range.clone(),
                    &mut cache,
                    &mut data_buffer,
                    &StorageKey::EncoderCalibration,
                )
                .await
                {
                    Ok(Some(calibration)) => {
                        info!("Calibration loaded: {}", calibration);
                        Some(calibration)
                    }
                    Ok(None) => {
                        info!("No calibration found in flash");
                        None
                    }
                    Err(e) => {
                        error!("Failed to load calibration: {}", defmt::Debug2Format(&e));
                        None
                    }
                };
                CALIBRATION_LOADED.signal(loaded);
            }

            FlashCommand::Save(calibration) => {
                match store_item(
                    &mut flash,
                    flash_range.clone(),
                    &mut cache,
                    &mut data_buffer,
                    &StorageKey::EncoderCalibration,
                    &calibration,
                )
                .await
                {
                    Ok(_) => info!("Calibration saved: {}", calibration),
                    Err(e) => error!("Failed to save calibration: {}", defmt::Debug2Format(&e)),
                }
            }
        }
    }
}
