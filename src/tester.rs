//! Full-array memory tests.

#[cfg(feature = "defmt")]
use defmt::{debug, warn};

use core::fmt;
use core::fmt::Display;

use crate::march::{self, MarchElement};
use crate::{Spi, Sram23k640, SramError, MEMORY_SIZE};

const PATTERN: u8 = 0xAA;
const PATTERN_COMPLEMENT: u8 = 0x55;

/// Which of the two checkerboard assignments to write.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerboardStep {
    /// Even addresses get 0xAA, odd addresses 0x55.
    One,
    /// Even addresses get 0x55, odd addresses 0xAA.
    Two,
}

impl CheckerboardStep {
    pub const fn number(self) -> u8 {
        match self {
            CheckerboardStep::One => 1,
            CheckerboardStep::Two => 2,
        }
    }

    /// Byte this step writes at `address`.
    pub const fn pattern(self, address: u32) -> u8 {
        let even = address % 2 == 0;
        match (self, even) {
            (CheckerboardStep::One, true) | (CheckerboardStep::Two, false) => PATTERN,
            _ => PATTERN_COMPLEMENT,
        }
    }
}

impl TryFrom<u8> for CheckerboardStep {
    type Error = SramError;

    fn try_from(step: u8) -> Result<Self, Self::Error> {
        match step {
            1 => Ok(CheckerboardStep::One),
            2 => Ok(CheckerboardStep::Two),
            _ => Err(SramError::InvalidStep),
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Checkerboard(CheckerboardStep),
    MarchA,
    /// Uniform fill with the given datum.
    Sequence(u8),
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Checkerboard(step) => write!(f, "Checkerboard test step {}", step.number()),
            Algorithm::MarchA => f.write_str("March A test"),
            Algorithm::Sequence(datum) => write!(f, "Sequence test (0x{datum:02X})"),
        }
    }
}

/// Verify phase in which a mismatch was seen.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Checkerboard,
    M1,
    M2,
    M3,
    M4,
    Sequence,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Checkerboard => "checkerboard",
            Phase::M1 => "M1",
            Phase::M2 => "M2",
            Phase::M3 => "M3",
            Phase::M4 => "M4",
            Phase::Sequence => "sequence",
        };
        f.write_str(name)
    }
}

/// First mismatch of a run. Verification stops as soon as one is found.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestFailure {
    pub algorithm: Algorithm,
    pub phase: Phase,
    pub address: u32,
    /// Expected byte, or expected lane value (0 or 1) when `bit` is set.
    pub expected: u8,
    /// Observed byte, or observed lane value (0 or 1) when `bit` is set.
    pub observed: u8,
    /// Lane that failed, for bit-oriented phases.
    pub bit: Option<u8>,
}

impl Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at address {}", self.algorithm, self.address)?;
        match self.bit {
            Some(bit) => write!(
                f,
                " ({}, bit {}: expected {}, observed {})",
                self.phase, bit, self.expected, self.observed
            ),
            None => write!(
                f,
                " ({}: expected 0x{:02X}, observed 0x{:02X})",
                self.phase, self.expected, self.observed
            ),
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed(Algorithm),
    Failed(TestFailure),
}

impl TestOutcome {
    pub const fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed(_))
    }

    pub const fn algorithm(&self) -> Algorithm {
        match self {
            TestOutcome::Passed(algorithm) => *algorithm,
            TestOutcome::Failed(failure) => failure.algorithm,
        }
    }

    pub const fn failure(&self) -> Option<&TestFailure> {
        match self {
            TestOutcome::Passed(_) => None,
            TestOutcome::Failed(failure) => Some(failure),
        }
    }
}

impl Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Passed(algorithm) => write!(f, "{algorithm} complete!"),
            TestOutcome::Failed(failure) => Display::fmt(failure, f),
        }
    }
}

/// Runs memory tests against an exclusively borrowed [`Sram23k640`].
///
/// Every sweep covers `0..memory_size`. Verification failures come back as
/// [`TestOutcome::Failed`]; bus and range errors abort with `Err`. Nothing is retried
/// and writes already issued are never rolled back.
pub struct MemoryTester<'d, S: Spi> {
    sram: &'d mut Sram23k640<S>,
    memory_size: u32,
}

impl<'d, S: Spi> MemoryTester<'d, S> {
    /// Tester covering the whole [`MEMORY_SIZE`] array.
    pub fn new(sram: &'d mut Sram23k640<S>) -> Self {
        Self {
            sram,
            memory_size: MEMORY_SIZE,
        }
    }

    /// Restrict sweeps to `0..memory_size`.
    ///
    /// Sizes past [`MEMORY_SIZE`] are not clamped: the sweep fails with
    /// [`SramError::AddressOutOfRange`] once it reaches the first invalid address.
    #[must_use]
    pub fn with_memory_size(mut self, memory_size: u32) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn memory_size(&self) -> u32 {
        self.memory_size
    }

    /// Checkerboard test: fill with `step`'s pattern, then read everything back.
    ///
    /// # Errors
    ///
    /// Propagates any [`SramError`] from the underlying exchanges.
    pub fn checkerboard(&mut self, step: CheckerboardStep) -> Result<TestOutcome, SramError> {
        let algorithm = Algorithm::Checkerboard(step);
        self.fill(|address| step.pattern(address))?;
        self.verify(algorithm, Phase::Checkerboard, |address| step.pattern(address))
    }

    /// Sequence test: fill every cell with `datum`, then read everything back.
    ///
    /// # Errors
    ///
    /// Propagates any [`SramError`] from the underlying exchanges.
    pub fn sequence(&mut self, datum: u8) -> Result<TestOutcome, SramError> {
        let algorithm = Algorithm::Sequence(datum);
        self.fill(|_| datum)?;
        self.verify(algorithm, Phase::Sequence, |_| datum)
    }

    /// March A: zero fill, then [`march::M1`] to [`march::M4`] each over the whole array.
    ///
    /// The first lane mismatch ends the test.
    ///
    /// # Errors
    ///
    /// Propagates any [`SramError`] from the underlying exchanges.
    pub fn march_a(&mut self) -> Result<TestOutcome, SramError> {
        #[cfg(feature = "defmt")]
        debug!("March A M0 over {} cells", self.memory_size);

        self.fill(|_| 0x00)?;
        for element in &march::MARCH_A {
            if let Some(failure) = self.run_element(element)? {
                return Ok(Self::failed(failure));
            }
        }
        Ok(TestOutcome::Passed(Algorithm::MarchA))
    }

    /// Checkerboard step 1, checkerboard step 2, then March A.
    ///
    /// A failed algorithm does not stop the ones after it.
    ///
    /// # Errors
    ///
    /// Propagates any [`SramError`]; the run stops at the first one.
    pub fn run_diagnostics(&mut self) -> Result<[TestOutcome; 3], SramError> {
        Ok([
            self.checkerboard(CheckerboardStep::One)?,
            self.checkerboard(CheckerboardStep::Two)?,
            self.march_a()?,
        ])
    }

    fn run_element(&mut self, element: &MarchElement) -> Result<Option<TestFailure>, SramError> {
        #[cfg(feature = "defmt")]
        debug!("March A {} starting", element.phase);

        for address in element.addresses.sweep(self.memory_size) {
            if let Some(mismatch) = element.apply(&mut *self.sram, address)? {
                return Ok(Some(TestFailure {
                    algorithm: Algorithm::MarchA,
                    phase: element.phase,
                    address,
                    expected: u8::from(mismatch.expected),
                    observed: u8::from(mismatch.observed),
                    bit: Some(mismatch.bit),
                }));
            }
        }
        Ok(None)
    }

    fn fill(&mut self, pattern: impl Fn(u32) -> u8) -> Result<(), SramError> {
        for address in 0..self.memory_size {
            self.sram.write(address, u32::from(pattern(address)))?;
        }
        Ok(())
    }

    fn verify(
        &mut self,
        algorithm: Algorithm,
        phase: Phase,
        expected: impl Fn(u32) -> u8,
    ) -> Result<TestOutcome, SramError> {
        for address in 0..self.memory_size {
            let observed = self.sram.read(address)?;
            let expected = expected(address);
            if observed != expected {
                return Ok(Self::failed(TestFailure {
                    algorithm,
                    phase,
                    address,
                    expected,
                    observed,
                    bit: None,
                }));
            }
        }

        #[cfg(feature = "defmt")]
        debug!("{} passed over {} cells", algorithm, self.memory_size);

        Ok(TestOutcome::Passed(algorithm))
    }

    fn failed(failure: TestFailure) -> TestOutcome {
        #[cfg(feature = "defmt")]
        warn!("{} failed at address {}", failure.algorithm, failure.address);

        TestOutcome::Failed(failure)
    }
}
