//! In-memory 23K640 used by the unit tests, with fault injection.

use std::collections::HashMap;

use crate::{Instruction, Operation, Spi, SramError, MEMORY_SIZE};

/// One decoded exchange, in bus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(u16),
    Write(u16, u8),
    ReadStatus,
}

/// Writing `trigger` to `aggressor` forces bit `bit` of `victim` to `value`.
#[derive(Debug, Clone, Copy)]
struct Coupling {
    aggressor: u16,
    trigger: u8,
    victim: u16,
    bit: u8,
    value: bool,
}

/// Bytes the chip drives on MISO while it is still receiving opcode and address.
const IDLE_RESPONSE: u8 = 0xFF;

#[derive(Debug)]
pub struct MockSpi {
    pub memory: Vec<u8>,
    pub status_register: u8,
    /// Every frame as sent by the driver, before the response overwrote it.
    pub frames: Vec<Vec<u8>>,
    pub log: Vec<Access>,
    /// Exchanges allowed before every further exchange fails.
    pub fail_after: Option<usize>,
    /// Applied to every incoming address; clearing a bit models a stuck address line.
    pub address_mask: u16,
    stuck_high: HashMap<u16, u8>,
    stuck_low: HashMap<u16, u8>,
    forced_reads: HashMap<u16, u8>,
    couplings: Vec<Coupling>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE as usize],
            status_register: 0,
            frames: Vec::new(),
            log: Vec::new(),
            fail_after: None,
            address_mask: 0xFFFF,
            stuck_high: HashMap::new(),
            stuck_low: HashMap::new(),
            forced_reads: HashMap::new(),
            couplings: Vec::new(),
        }
    }

    /// Pre-populate a byte in simulated memory.
    pub fn set_memory(&mut self, address: u16, data: u8) {
        self.memory[address as usize] = data;
    }

    /// Bit `bit` of `address` always reads as 1.
    pub fn stick_high(&mut self, address: u16, bit: u8) {
        *self.stuck_high.entry(address).or_default() |= 1 << bit;
    }

    /// Bit `bit` of `address` always reads as 0.
    pub fn stick_low(&mut self, address: u16, bit: u8) {
        *self.stuck_low.entry(address).or_default() |= 1 << bit;
    }

    /// Reads of `address` return `value` whatever was written.
    pub fn force_read(&mut self, address: u16, value: u8) {
        self.forced_reads.insert(address, value);
    }

    /// State coupling: storing `trigger` at `aggressor` sets or clears bit `bit` of `victim`.
    pub fn couple(&mut self, aggressor: u16, trigger: u8, victim: u16, bit: u8, value: bool) {
        self.couplings.push(Coupling {
            aggressor,
            trigger,
            victim,
            bit,
            value,
        });
    }

    /// Addresses read, in order.
    pub fn reads(&self) -> Vec<u16> {
        self.log
            .iter()
            .filter_map(|access| match access {
                Access::Read(address) => Some(*address),
                _ => None,
            })
            .collect()
    }

    fn cell(&self, address: u16) -> u8 {
        let address = address & self.address_mask;
        if let Some(&forced) = self.forced_reads.get(&address) {
            return forced;
        }
        let high = self.stuck_high.get(&address).copied().unwrap_or(0);
        let low = self.stuck_low.get(&address).copied().unwrap_or(0);
        (self.memory[address as usize] | high) & !low
    }

    fn exchange(&mut self, frame: &mut [u8]) -> Result<(), SramError> {
        if self.fail_after.is_some_and(|limit| self.frames.len() >= limit) {
            return Err(SramError::Spi);
        }
        self.frames.push(frame.to_vec());

        const READ: u8 = Instruction::Read.opcode();
        const WRITE: u8 = Instruction::Write.opcode();
        const RDSR: u8 = Instruction::ReadStatus.opcode();

        let response = match (frame[0], frame.len()) {
            (READ, 4) => {
                let address = u16::from_be_bytes([frame[1], frame[2]]);
                self.log.push(Access::Read(address));
                self.cell(address)
            }
            (WRITE, 5) => {
                let address = u16::from_be_bytes([frame[1], frame[2]]);
                self.log.push(Access::Write(address, frame[3]));
                let cell = address & self.address_mask;
                self.memory[cell as usize] = frame[3];
                for coupling in &self.couplings {
                    if coupling.aggressor == cell && coupling.trigger == frame[3] {
                        let victim = &mut self.memory[coupling.victim as usize];
                        let mask = 1u8 << coupling.bit;
                        *victim = if coupling.value { *victim | mask } else { *victim & !mask };
                    }
                }
                IDLE_RESPONSE
            }
            (RDSR, 2) => {
                self.log.push(Access::ReadStatus);
                self.status_register
            }
            _ => {
                println!("MockSpi: unhandled frame {frame:02x?}");
                return Err(SramError::Spi);
            }
        };

        let last = frame.len() - 1;
        frame[..last].fill(IDLE_RESPONSE);
        frame[last] = response;
        Ok(())
    }
}

impl Spi for MockSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SramError> {
        for operation in operations {
            match operation {
                Operation::TransferInPlace(frame) => self.exchange(frame)?,
                _ => return Err(SramError::Spi),
            }
        }
        Ok(())
    }
}
