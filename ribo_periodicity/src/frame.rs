use std::{fmt, ops::AddAssign};

use serde::{Deserialize, Serialize};

/// Read counts summed by reading frame
///
/// Element i holds the total coverage at positions p with p % 3 == i,
/// where p is measured from the start of the coding region.
/// Serialized as a plain three element array.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameVector([u64; 3]);

impl FrameVector {
    pub fn new(counts: [u64; 3]) -> Self {
        Self(counts)
    }

    pub fn counts(&self) -> &[u64; 3] {
        &self.0
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl AddAssign for FrameVector {
    fn add_assign(&mut self, other: Self) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b
        }
    }
}

impl fmt::Display for FrameVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

/// Sum coverage by position modulo 3
pub fn count_frames(coverage: &[u32]) -> FrameVector {
    let mut fv = [0u64; 3];
    for (i, c) in coverage.iter().enumerate() {
        fv[i % 3] += *c as u64
    }
    FrameVector(fv)
}
