use std::{error::Error, fmt, io};

/// Exit status for a run that was given bad arguments.
pub const EXIT_BAD_ARGS: u8 = 2;
/// Exit status for a run that ran out of memory or threads.
pub const EXIT_EXHAUSTED: u8 = 3;

#[derive(Debug)]
pub enum SimError {
    /// A station with no service points would block everybody forever.
    ZeroCapacity { station: &'static str },
    /// The requested station count doesn't fit the token pool.
    CapacityOverflow { station: &'static str, requested: u64 },
    OutOfMemory { what: &'static str, requested: usize },
    /// Customer threads couldn't be started even after retrying.
    SpawnExhausted {
        arrival: usize,
        attempts: u32,
        source: io::Error,
    },
}

impl SimError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SimError::ZeroCapacity { .. } | SimError::CapacityOverflow { .. } => EXIT_BAD_ARGS,
            SimError::OutOfMemory { .. } | SimError::SpawnExhausted { .. } => EXIT_EXHAUSTED,
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ZeroCapacity { station } => {
                write!(f, "station `{station}' needs at least one service point")
            }
            SimError::CapacityOverflow { station, requested } => {
                write!(f, "station `{station}' can't have {requested} service points")
            }
            SimError::OutOfMemory { what, requested } => {
                write!(f, "out of memory allocating {what} for {requested} entries")
            }
            SimError::SpawnExhausted {
                arrival, attempts, ..
            } => write!(
                f,
                "simulation aborted: customer {arrival} couldn't start after {attempts} attempts"
            ),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimError::SpawnExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
