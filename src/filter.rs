//! Outlier-robust smoothing for the per-phase angle estimates.

use crate::angle::Angle;

/// Fixed-capacity ring of the last `N` samples, averaged with the `TRIM`
/// lowest and `TRIM` highest values discarded once the ring is full.
///
/// Until `N` samples have been pushed the output is the plain mean of what is
/// there, so the filter is usable (if less robust) from the first sample.
#[derive(Debug, Clone)]
pub struct TrimmedMeanFilter<const N: usize, const TRIM: usize> {
    samples: [Angle; N],
    idx: usize,
    len: usize,
}

impl<const N: usize, const TRIM: usize> TrimmedMeanFilter<N, TRIM> {
    pub const fn new() -> Self {
        Self {
            samples: [Angle::ZERO; N],
            idx: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: Angle) {
        self.samples[self.idx] = value;
        self.idx = (self.idx + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current filter output.
    pub fn value(&self) -> Angle {
        if self.len == 0 {
            return Angle::ZERO;
        }
        if self.len < N {
            let mut sum = Angle::ZERO;
            for &s in &self.samples[..self.len] {
                sum += s;
            }
            return sum / self.len as i32;
        }
        let mut sorted = self.samples;
        sorted.sort_unstable();
        let kept = &sorted[TRIM..N - TRIM];
        let mut sum = Angle::ZERO;
        for &s in kept {
            sum += s;
        }
        sum / kept.len() as i32
    }
}

impl<const N: usize, const TRIM: usize> Default for TrimmedMeanFilter<N, TRIM> {
    fn default() -> Self {
        Self::new()
    }
}
