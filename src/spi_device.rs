//! Adapter from [`embedded_hal::spi::SpiDevice`] to this crate's [`Spi`] trait.
//!
//! Use this when your SPI peripheral is a **device** (bus plus its own CS), which is
//! what most HALs and `linux-embedded-hal`'s `spidev` wrapper hand out. The device must
//! be configured by the caller for [`SPI_MODE`](crate::SPI_MODE) and 8-bit words.
//!
//! # Example
//!
//! ```ignore
//! use sram23k640::{spi_device::SpiDeviceAdapter, MemoryTester, Sram23k640};
//!
//! let spi = SpidevDevice::open("/dev/spidev0.0")?;
//! let mut sram = Sram23k640::new(SpiDeviceAdapter::new(spi));
//! sram.init()?;
//! let outcomes = MemoryTester::new(&mut sram).run_diagnostics()?;
//! ```

use crate::{Operation, Spi, SramError};
use embedded_hal::spi::SpiDevice;

/// Wraps an [`embedded_hal::spi::SpiDevice`] and implements this crate's [`Spi`] trait.
#[derive(Debug)]
pub struct SpiDeviceAdapter<D> {
    device: D,
}

impl<D> SpiDeviceAdapter<D> {
    /// Create an adapter from any blocking SPI device.
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Unwrap and return the underlying device.
    pub fn into_inner(self) -> D {
        self.device
    }
}

impl<D> SpiDeviceAdapter<D>
where
    D: SpiDevice<u8>,
{
    fn map_err(_: D::Error) -> SramError {
        SramError::Spi
    }
}

impl<D> Spi for SpiDeviceAdapter<D>
where
    D: SpiDevice<u8>,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SramError> {
        self.device
            .transaction(operations)
            .map_err(SpiDeviceAdapter::<D>::map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sram23k640;
    use embedded_hal::spi::{ErrorKind, ErrorType};

    /// Records outgoing bytes and answers the final byte of every transfer.
    struct FakeDevice {
        sent: Vec<Vec<u8>>,
        answer: u8,
        broken: bool,
    }

    impl FakeDevice {
        fn new(answer: u8) -> Self {
            Self {
                sent: Vec::new(),
                answer,
                broken: false,
            }
        }
    }

    impl ErrorType for FakeDevice {
        type Error = ErrorKind;
    }

    impl SpiDevice<u8> for FakeDevice {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
            if self.broken {
                return Err(ErrorKind::Other);
            }
            for operation in operations {
                if let Operation::TransferInPlace(frame) = operation {
                    self.sent.push(frame.to_vec());
                    if let Some(last) = frame.last_mut() {
                        *last = self.answer;
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn read_goes_through_device() {
        let mut sram = Sram23k640::new(SpiDeviceAdapter::new(FakeDevice::new(0x5A)));
        assert_eq!(sram.read(0x1234).unwrap(), 0x5A);
        let device = sram.release().into_inner();
        assert_eq!(device.sent, vec![vec![0x03, 0x12, 0x34, 0x00]]);
    }

    #[test]
    fn status_goes_through_device() {
        let mut sram = Sram23k640::new(SpiDeviceAdapter::new(FakeDevice::new(0x01)));
        assert_eq!(sram.read_status().unwrap(), 0x01);
        sram.init().unwrap();
    }

    #[test]
    fn device_error_maps_to_spi() {
        let mut device = FakeDevice::new(0);
        device.broken = true;
        let mut sram = Sram23k640::new(SpiDeviceAdapter::new(device));
        assert_eq!(sram.write(0, 0), Err(SramError::Spi));
    }
}
