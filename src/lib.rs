//! A `no_std` fault-detection tester for the Microchip 23K640 64-Kbit SPI SRAM,
//! built on [`embedded-hal`](https://crates.io/crates/embedded-hal) traits.
//!
//! Works with any platform that implements the [`Spi`] trait, or any
//! [`embedded_hal::spi::SpiDevice`] through [`spi_device::SpiDeviceAdapter`].
//!
//! # Features
//!
//! - Byte read/write with full 16-bit addressing, one full-duplex exchange per call
//! - Status register read with a typed [`Status`] view
//! - Checkerboard, March A and uniform sequence tests ([`MemoryTester`])
//! - Bit-lane March primitives M1-M4 ([`march`])
//! - Optional [`defmt`](https://crates.io/crates/defmt) logging via the `defmt` feature
//!
//! Only the chip's Byte operating mode is driven. Page and Sequential modes are not
//! supported and the status register is never written.
//!
//! # Example
//!
//! ```rust,no_run
//! # use sram23k640::{CheckerboardStep, MemoryTester, Sram23k640};
//! # fn example<S: sram23k640::Spi>(spi: S) -> Result<(), sram23k640::SramError> {
//! let mut sram = Sram23k640::new(spi);
//!
//! // Refuses to continue unless the chip is in Byte mode
//! sram.init()?;
//!
//! sram.write(0x1234, 0xAB)?;
//! assert_eq!(sram.read(0x1234)?, 0xAB);
//!
//! let mut tester = MemoryTester::new(&mut sram);
//! let outcome = tester.checkerboard(CheckerboardStep::One)?;
//! if let Some(failure) = outcome.failure() {
//!     // e.g. "Checkerboard test step 1 failed at address 2 (...)"
//!     let _ = failure.address;
//! }
//!
//! for outcome in tester.run_diagnostics()? {
//!     // "Checkerboard test step 1 complete!", ..., "March A test complete!"
//!     let _ = outcome.is_passed();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Bus configuration
//!
//! Bus setup belongs to the caller. The chip is driven in SPI [`SPI_MODE`] with 8-bit
//! words; [`MAX_SPI_FREQUENCY_HZ`] is the conservative clock the tests were validated at.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "defmt")]
use defmt::trace;

use core::fmt;
use core::fmt::Display;

use embedded_hal::spi::{Mode, MODE_0};

pub mod march;
pub mod spi_device;
mod tester;

#[cfg(test)]
mod mock;

pub use tester::{Algorithm, CheckerboardStep, MemoryTester, Phase, TestFailure, TestOutcome};

// Re-export Operation for convenience
pub use embedded_hal::spi::Operation;

/// Number of byte cells on the 23K640.
pub const MEMORY_SIZE: u32 = 1 << ADDRESS_BITS;
/// Width of a cell address.
pub const ADDRESS_BITS: u8 = 16;
/// Width of a cell.
pub const DATA_BITS: u8 = 8;

/// SPI mode the chip is driven in (CPOL = 0, CPHA = 0).
pub const SPI_MODE: Mode = MODE_0;
/// Conservative SCK rate for long test runs on breadboarded parts.
pub const MAX_SPI_FREQUENCY_HZ: u32 = 5_000;

/// 23K640 instruction set, restricted to what Byte mode testing needs.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    /// READ: read data from memory starting at the selected address.
    Read = 0x03,
    /// WRITE: write data to memory starting at the selected address.
    Write = 0x02,
    /// RDSR: read the status register.
    ReadStatus = 0x05,
}

impl Instruction {
    /// The opcode clocked out as the first byte of a frame.
    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

/// SPI communication trait for the 23K640 driver.
///
/// Each call is one chip-select window. Implementations must perform the operations
/// synchronously and must not retry on failure.
pub trait Spi {
    /// Perform a transaction with the SPI device.
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SramError>;
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SramError {
    /// The bus exchange itself failed.
    Spi,
    /// Address wider than [`ADDRESS_BITS`].
    AddressOutOfRange,
    /// Value wider than [`DATA_BITS`].
    ValueOutOfRange,
    /// The status register reports a mode other than Byte mode.
    UnsupportedMode,
    /// Checkerboard step other than 1 or 2.
    InvalidStep,
}

impl Display for SramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SramError::Spi => f.write_str("SramError: SPI exchange failed"),
            SramError::AddressOutOfRange => {
                write!(f, "SramError: address needs to be a {ADDRESS_BITS}-bit value at most")
            }
            SramError::ValueOutOfRange => {
                write!(f, "SramError: value needs to be a {DATA_BITS}-bit value at most")
            }
            SramError::UnsupportedMode => f.write_str("SramError: device is not in Byte mode"),
            SramError::InvalidStep => f.write_str("SramError: checkerboard step must be 1 or 2"),
        }
    }
}

impl core::error::Error for SramError {}

/// Operating mode encoded in status register bits 7..6.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// MODE = 00
    Byte,
    /// MODE = 01
    Sequential,
    /// MODE = 10
    Page,
    /// MODE = 11
    Reserved,
}

/// Raw 23K640 status register with named field access.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
    const MODE_SHIFT: u8 = 6;
    const HOLD_BIT: u8 = 1 << 0;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn mode(self) -> OperatingMode {
        match self.0 >> Self::MODE_SHIFT {
            0b00 => OperatingMode::Byte,
            0b01 => OperatingMode::Sequential,
            0b10 => OperatingMode::Page,
            _ => OperatingMode::Reserved,
        }
    }

    /// `true` when the HOLD pin function is disabled.
    pub const fn hold_disabled(self) -> bool {
        self.0 & Self::HOLD_BIT != 0
    }
}

/// 23K640 SRAM driver, generic over any SPI implementation.
///
/// Every operation is exactly one full-duplex exchange. Nothing read from the chip is
/// cached: the device is the only source of truth for its contents.
pub struct Sram23k640<S: Spi> {
    spi: S,
}

impl<S: Spi> Sram23k640<S> {
    /// Create a new driver instance that exclusively owns `spi`.
    ///
    /// Note: call [`init()`](Self::init) to confirm the device is in Byte mode.
    pub fn new(spi: S) -> Self {
        Self { spi }
    }

    /// Confirm the device answers and is in Byte mode.
    ///
    /// # Errors
    ///
    /// Returns [`SramError::UnsupportedMode`] if the status register reports another mode.
    /// Returns [`SramError::Spi`] if the SPI transaction fails.
    pub fn init(&mut self) -> Result<(), SramError> {
        let status = self.status()?;
        if status.mode() != OperatingMode::Byte {
            return Err(SramError::UnsupportedMode);
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("Device initialized, status {=u8:#x}", status.bits());

        Ok(())
    }

    /// Get a mutable reference to the underlying SPI interface.
    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    /// Release the underlying SPI interface.
    pub fn release(self) -> S {
        self.spi
    }

    /// Reads the raw status register with frame `[RDSR, 0x00]`.
    ///
    /// # Errors
    ///
    /// Returns [`SramError::Spi`] if the SPI transaction fails.
    pub fn read_status(&mut self) -> Result<u8, SramError> {
        let mut frame = [Instruction::ReadStatus.opcode(), 0x00];
        self.exchange(&mut frame)?;
        Ok(frame[1])
    }

    /// Reads the status register as a typed [`Status`].
    ///
    /// # Errors
    ///
    /// Returns [`SramError::Spi`] if the SPI transaction fails.
    pub fn status(&mut self) -> Result<Status, SramError> {
        self.read_status().map(Status::from_bits)
    }

    /// Reads the byte at `address` with frame `[READ, hi, lo, 0x00]`.
    ///
    /// # Errors
    ///
    /// - [`SramError::AddressOutOfRange`] if `address` does not fit in 16 bits.
    /// - [`SramError::Spi`] if the SPI transaction fails.
    pub fn read(&mut self, address: u32) -> Result<u8, SramError> {
        let [hi, lo] = Self::address_bytes(address)?;
        let mut frame = [Instruction::Read.opcode(), hi, lo, 0x00];
        self.exchange(&mut frame)?;
        Ok(frame[3])
    }

    /// Writes `value` to `address` with frame `[WRITE, hi, lo, value, 0x00]`.
    ///
    /// The write is always issued, even if the cell already holds `value`.
    ///
    /// # Errors
    ///
    /// - [`SramError::AddressOutOfRange`] if `address` does not fit in 16 bits.
    /// - [`SramError::ValueOutOfRange`] if `value` does not fit in 8 bits.
    /// - [`SramError::Spi`] if the SPI transaction fails.
    pub fn write(&mut self, address: u32, value: u32) -> Result<(), SramError> {
        let [hi, lo] = Self::address_bytes(address)?;
        let value = u8::try_from(value).map_err(|_| SramError::ValueOutOfRange)?;
        let mut frame = [Instruction::Write.opcode(), hi, lo, value, 0x00];
        self.exchange(&mut frame)
    }

    fn address_bytes(address: u32) -> Result<[u8; 2], SramError> {
        u16::try_from(address)
            .map(u16::to_be_bytes)
            .map_err(|_| SramError::AddressOutOfRange)
    }

    fn exchange(&mut self, frame: &mut [u8]) -> Result<(), SramError> {
        #[cfg(feature = "defmt")]
        trace!("SPI out {=[u8]:x}", &frame[..]);

        self.spi
            .transaction(&mut [Operation::TransferInPlace(frame)])
    }
}
