use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A slot in the global total order of the shared log.
///
/// Addresses are issued monotonically by the sequencer and are immutable once
/// issued: exactly one entry occupies exactly one address, forever.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LogAddress(u64);

impl LogAddress {
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// The raw slot number.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The address immediately after this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The address immediately before this one, if any.
    pub fn prev(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl From<u64> for LogAddress {
    fn from(address: u64) -> Self {
        Self(address)
    }
}

impl fmt::Debug for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogAddress({})", self.0)
    }
}

impl fmt::Display for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in the global order, with sentinels.
///
/// Wraps a [`LogAddress`]; `Min` orders below every real address, `Max`
/// above every real address, and `Invalid` is not comparable to anything —
/// comparisons involving it yield `None`, which is why `Timestamp` is
/// `PartialOrd` but not `Ord`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timestamp {
    /// Below every real address.
    Min,
    /// Above every real address.
    Max,
    /// Not comparable; produced by operations that cannot name a position.
    Invalid,
    /// A real position in the global order.
    At(LogAddress),
}

impl Timestamp {
    /// A timestamp at the given raw address.
    pub const fn at(address: u64) -> Self {
        Self::At(LogAddress::new(address))
    }

    /// The wrapped address, if this timestamp names a real position.
    pub fn address(&self) -> Option<LogAddress> {
        match self {
            Self::At(addr) => Some(*addr),
            _ => None,
        }
    }

    /// The wrapped address, or an error for sentinels.
    pub fn require_address(&self) -> Result<LogAddress, TypeError> {
        self.address()
            .ok_or_else(|| TypeError::NoAddress(self.to_string()))
    }

    /// Pure arithmetic: the timestamp one slot later. Sentinels have no
    /// successor and map to `Invalid`.
    pub fn next(&self) -> Self {
        match self {
            Self::At(addr) => Self::At(addr.next()),
            _ => Self::Invalid,
        }
    }

    /// Pure arithmetic: the timestamp one slot earlier. Sentinels, and the
    /// first slot, map to `Invalid`.
    pub fn prev(&self) -> Self {
        match self {
            Self::At(addr) => addr.prev().map(Self::At).unwrap_or(Self::Invalid),
            _ => Self::Invalid,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Timestamp::*;
        match (self, other) {
            (Invalid, _) | (_, Invalid) => None,
            (Min, Min) | (Max, Max) => Some(Ordering::Equal),
            (Min, _) => Some(Ordering::Less),
            (_, Min) => Some(Ordering::Greater),
            (Max, _) => Some(Ordering::Greater),
            (_, Max) => Some(Ordering::Less),
            (At(a), At(b)) => Some(a.cmp(b)),
        }
    }
}

impl From<LogAddress> for Timestamp {
    fn from(address: LogAddress) -> Self {
        Self::At(address)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "Timestamp(MIN)"),
            Self::Max => write!(f, "Timestamp(MAX)"),
            Self::Invalid => write!(f, "Timestamp(INVALID)"),
            Self::At(addr) => write!(f, "Timestamp({})", addr),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
            Self::Invalid => write!(f, "INVALID"),
            Self::At(addr) => write!(f, "{}", addr),
        }
    }
}
