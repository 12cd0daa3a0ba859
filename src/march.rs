//! Bit-lane March primitives.
//!
//! The chip only offers byte-wide operations, so every March element is built from
//! whole-byte reads and read-modify-write cycles on a single bit lane. An element visits
//! the lanes of one address in a fixed order and, for each lane:
//!
//! 1. reads the byte and checks the lane holds the expected value, stopping at the first
//!    lane that does not;
//! 2. performs its write sequence on that lane, each write being a fresh read of the
//!    byte followed by a write of the byte with only that lane changed.
//!
//! Using the usual notation, March A is `⇑(w0); ⇑(r0,w1,w0,w1); ⇑(r1,w0,w1);
//! ⇓(r1,w0,w1,w0); ⇓(r0,w1,w0)`. The first element is a plain byte fill done by
//! [`MemoryTester::march_a`](crate::MemoryTester::march_a); the other four are [`M1`]
//! through [`M4`].

use crate::{Phase, Spi, Sram23k640, SramError, DATA_BITS};

/// Traversal order for addresses or bit lanes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lowest first.
    Up,
    /// Highest first.
    Down,
}

impl Direction {
    /// Addresses `0..size` in this order.
    pub fn sweep(self, size: u32) -> impl Iterator<Item = u32> {
        (0..size).map(move |i| match self {
            Direction::Up => i,
            Direction::Down => size - 1 - i,
        })
    }

    /// Bit lanes `0..DATA_BITS` in this order.
    pub fn lanes(self) -> impl Iterator<Item = u8> {
        (0..DATA_BITS).map(move |i| match self {
            Direction::Up => i,
            Direction::Down => DATA_BITS - 1 - i,
        })
    }
}

/// A lane that did not hold the value an element expected.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneMismatch {
    pub bit: u8,
    pub observed: bool,
    pub expected: bool,
}

/// One March element applied lane by lane to a single address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarchElement {
    pub phase: Phase,
    /// Order in which the engine visits addresses.
    pub addresses: Direction,
    /// Order in which lanes of one address are visited.
    pub lanes: Direction,
    /// Value each lane must read before it is written.
    pub expect: bool,
    /// Values written to the lane, in order.
    pub writes: &'static [bool],
}

/// `⇑(r0,w1,w0,w1)`: leaves every lane at 1.
pub const M1: MarchElement = MarchElement {
    phase: Phase::M1,
    addresses: Direction::Up,
    lanes: Direction::Up,
    expect: false,
    writes: &[true, false, true],
};

/// `⇑(r1,w0,w1)`: leaves every lane at 1.
pub const M2: MarchElement = MarchElement {
    phase: Phase::M2,
    addresses: Direction::Up,
    lanes: Direction::Up,
    expect: true,
    writes: &[false, true],
};

/// `⇓(r1,w0,w1,w0)`: leaves every lane at 0.
pub const M3: MarchElement = MarchElement {
    phase: Phase::M3,
    addresses: Direction::Down,
    lanes: Direction::Down,
    expect: true,
    writes: &[false, true, false],
};

/// `⇓(r0,w1,w0)`: leaves every lane at 0.
pub const M4: MarchElement = MarchElement {
    phase: Phase::M4,
    addresses: Direction::Down,
    lanes: Direction::Down,
    expect: false,
    writes: &[true, false],
};

/// Elements following the initial fill, in execution order.
pub const MARCH_A: [MarchElement; 4] = [M1, M2, M3, M4];

impl MarchElement {
    /// Run this element over every lane of `address`.
    ///
    /// Returns the first lane that failed its read, leaving that lane and every later
    /// lane untouched.
    ///
    /// # Errors
    ///
    /// Propagates any [`SramError`] from the underlying exchanges.
    pub fn apply<S: Spi>(
        &self,
        sram: &mut Sram23k640<S>,
        address: u32,
    ) -> Result<Option<LaneMismatch>, SramError> {
        for bit in self.lanes.lanes() {
            let observed = read_bit(sram, address, bit)?;
            if observed != self.expect {
                return Ok(Some(LaneMismatch {
                    bit,
                    observed,
                    expected: self.expect,
                }));
            }
            for &value in self.writes {
                write_bit(sram, address, bit, value)?;
            }
        }
        Ok(None)
    }
}

/// Reads bit `bit` of the byte at `address`.
///
/// # Errors
///
/// Propagates any [`SramError`] from the read.
pub fn read_bit<S: Spi>(sram: &mut Sram23k640<S>, address: u32, bit: u8) -> Result<bool, SramError> {
    Ok((sram.read(address)? >> bit) & 1 == 1)
}

/// Sets or clears bit `bit` at `address` with a read-modify-write of the whole byte.
///
/// # Errors
///
/// Propagates any [`SramError`] from the read or the write.
pub fn write_bit<S: Spi>(
    sram: &mut Sram23k640<S>,
    address: u32,
    bit: u8,
    value: bool,
) -> Result<(), SramError> {
    let byte = sram.read(address)?;
    let mask = 1u8 << bit;
    let updated = if value { byte | mask } else { byte & !mask };
    sram.write(address, u32::from(updated))
}
