//! Output identifier type

use std::fmt;

/// Output identifier for routing
///
/// Assigned sequentially as outputs are registered, so it doubles as an
/// index into the router's output handle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u16);

impl OutputId {
    /// Maximum number of outputs supported
    pub const MAX: u16 = u16::MAX;

    /// Create an output ID from a numeric index
    #[inline]
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get the index as usize (for slice indexing)
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

impl From<u16> for OutputId {
    #[inline]
    fn from(index: u16) -> Self {
        Self::new(index)
    }
}
