use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{Result, TemporaError};

// ------------- Identifiers -------------
pub type Id = i64;

/// The smallest id a generator may hand out; ids are positive.
pub const GENESIS: Id = 1;

/// What a generator needs to know about the ids already taken.
pub trait IdSpace {
    fn contains_id(&self, id: Id) -> Result<bool>;
    /// The largest id in use, or 0 when nothing is.
    fn max_id(&self) -> Result<Id>;
}

/// Produces an id not currently in use. Must terminate: either by
/// construction or by giving up after a bounded number of attempts.
pub trait IdGenerator: fmt::Debug + Send {
    fn generate(&mut self, space: &dyn IdSpace) -> Result<Id>;
}

/// How new ids are chosen when a row does not bring its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Sequential,
    Random,
}

// ------------- Sequential -------------
/// Max plus one; an empty space yields [`GENESIS`]. Fails only once the
/// largest id is `i64::MAX`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialGenerator;

impl IdGenerator for SequentialGenerator {
    fn generate(&mut self, space: &dyn IdSpace) -> Result<Id> {
        let max = space.max_id()?.max(GENESIS - 1);
        max.checked_add(1).ok_or(TemporaError::IdGeneratorExhausted {
            attempts: 1,
            min: GENESIS,
            max: Id::MAX,
        })
    }
}

// ------------- Random -------------
#[derive(Debug)]
pub struct RandomGenerator {
    min: Id,
    max: Id,
    max_attempts: u32,
    rng: StdRng,
}

impl RandomGenerator {
    pub fn new(min: Id, max: Id, max_attempts: u32) -> Result<Self> {
        Self::with_rng(min, max, max_attempts, StdRng::from_entropy())
    }
    /// Deterministic draws, for reproducible tests.
    pub fn seeded(min: Id, max: Id, max_attempts: u32, seed: u64) -> Result<Self> {
        Self::with_rng(min, max, max_attempts, StdRng::seed_from_u64(seed))
    }
    fn with_rng(min: Id, max: Id, max_attempts: u32, rng: StdRng) -> Result<Self> {
        if min < GENESIS {
            return Err(TemporaError::Config(format!("random id range must start at {GENESIS} or above, got {min}")));
        }
        if min > max {
            return Err(TemporaError::Config(format!("random id range [{min}, {max}] is empty")));
        }
        if max_attempts == 0 {
            return Err(TemporaError::Config("random id generator needs at least one attempt".into()));
        }
        Ok(Self { min, max, max_attempts, rng })
    }
    pub fn range(&self) -> (Id, Id) {
        (self.min, self.max)
    }
}

impl IdGenerator for RandomGenerator {
    fn generate(&mut self, space: &dyn IdSpace) -> Result<Id> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.rng.gen_range(self.min..=self.max);
            if !space.contains_id(candidate)? {
                debug!(candidate, attempt, "random id drawn");
                return Ok(candidate);
            }
        }
        Err(TemporaError::IdGeneratorExhausted {
            attempts: self.max_attempts,
            min: self.min,
            max: self.max,
        })
    }
}
