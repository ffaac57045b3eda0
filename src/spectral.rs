//! Fundamental-harmonic phase extraction from a captured mains cycle.
//!
//! One captured buffer holds exactly one cycle, so the fundamental lands in
//! FFT bin 1. The bin's components go through the CORDIC angle primitive and
//! the result is referenced to the sinusoid's zero crossing: the raw bin angle
//! is cosine-referenced, so the tracking chain rotates it by +90° after
//! removing the capture baseline.

use fixed::types::I16F16;
use microfft::{complex::cfft_32, Complex32};

use crate::angle::{self, Angle, QUARTER_TURN};
use crate::capture::CaptureBuffer;
use crate::filter::TrimmedMeanFilter;
use crate::sequence::Phase;
use crate::{Error, FFT_SIZE};

/// Depth of the per-phase angle filter.
pub const FILTER_DEPTH: usize = 7;
/// Samples discarded at each end of the sorted filter window.
pub const FILTER_TRIM: usize = 2;

pub(crate) fn phase_index(phase: Phase) -> Result<usize, Error> {
    match phase {
        Phase::A => Ok(0),
        Phase::B => Ok(1),
        Phase::C => Ok(2),
        Phase::Unknown => Err(Error::InvalidPhase),
    }
}

/// Raw fundamental-bin angle of one phase of the read buffer.
///
/// A partially filled buffer is zero-padded; an empty one is a non-fatal
/// [`Error::NoData`]. The result is not yet baseline-corrected or rotated.
pub fn fundamental_phase(buffer: &CaptureBuffer, phase: Phase) -> Result<Angle, Error> {
    let idx = phase_index(phase)?;
    if buffer.fill == 0 {
        return Err(Error::NoData);
    }

    let mut bins = [Complex32::new(0.0, 0.0); FFT_SIZE];
    for (bin, &sample) in bins.iter_mut().zip(&buffer.samples[idx][..buffer.fill]) {
        bin.re = f32::from(sample) / 32768.0;
    }
    let spectrum = cfft_32(&mut bins);
    let fundamental = spectrum[1];

    let re = I16F16::from_num(fundamental.re / FFT_SIZE as f32);
    let im = I16F16::from_num(fundamental.im / FFT_SIZE as f32);
    Ok(angle::from_radians(cordic::atan2(im, re)))
}

/// Tracking state of one mains phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracking {
    pub(crate) angle: Angle,
    pub(crate) offset_angle: Angle,
    pub(crate) delta_angle: Angle,
    pub(crate) offset_time_us: I16F16,
    pub(crate) filter: TrimmedMeanFilter<FILTER_DEPTH, FILTER_TRIM>,
}

impl PhaseTracking {
    pub(crate) const fn new() -> Self {
        Self {
            angle: Angle::ZERO,
            offset_angle: Angle::ZERO,
            delta_angle: Angle::ZERO,
            offset_time_us: I16F16::ZERO,
            filter: TrimmedMeanFilter::new(),
        }
    }

    /// Folds one raw bin angle into the filtered estimate.
    pub(crate) fn apply(&mut self, raw: Angle, baseline: Angle) {
        let aligned = angle::wrap_signed(raw - baseline + QUARTER_TURN);
        self.filter.push(aligned);
        self.angle = self.filter.value();
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Filtered zero-crossing phase angle, `(-180°, +180°]`.
    pub fn angle(&self) -> Angle {
        self.angle
    }

    /// Deviation from this phase's ideal reference position.
    pub fn offset_angle(&self) -> Angle {
        self.offset_angle
    }

    /// Wrap-aware spacing from the logical predecessor phase, ideally +120°.
    pub fn delta_angle(&self) -> Angle {
        self.delta_angle
    }

    /// [`offset_angle`](Self::offset_angle) converted to microseconds.
    pub fn offset_time_us(&self) -> I16F16 {
        self.offset_time_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_capture(theta_deg: f32) -> CaptureBuffer {
        let mut buf = CaptureBuffer::new();
        for k in 0..FFT_SIZE {
            let arg =
                2.0 * core::f32::consts::PI * k as f32 / FFT_SIZE as f32 + theta_deg.to_radians();
            buf.samples[0][k] = (arg.sin() * 20000.0) as i16;
        }
        buf.fill = FFT_SIZE;
        buf
    }

    fn extract_aligned(buf: &CaptureBuffer) -> Angle {
        let raw = fundamental_phase(buf, Phase::A).unwrap();
        angle::wrap_signed(raw - buf.baseline + QUARTER_TURN)
    }

    #[test]
    fn recovers_known_phase_offsets() {
        let tolerance = Angle::from_num(1.0);
        for theta in [-150.0f32, -120.0, -45.0, 0.0, 30.0, 90.0, 179.0] {
            let buf = synthetic_capture(theta);
            let got = extract_aligned(&buf);
            let err = angle::wrap_sub(got, Angle::from_num(theta));
            assert!(
                err.abs() < tolerance,
                "theta {} recovered as {}",
                theta,
                got
            );
        }
    }

    #[test]
    fn baseline_shifts_the_result() {
        let mut buf = synthetic_capture(50.0);
        buf.baseline = Angle::from_num(30);
        let got = extract_aligned(&buf);
        let err = angle::wrap_sub(got, Angle::from_num(20));
        assert!(err.abs() < Angle::from_num(1.0));
    }

    #[test]
    fn empty_buffer_is_no_data() {
        let buf = CaptureBuffer::new();
        assert_eq!(fundamental_phase(&buf, Phase::A), Err(Error::NoData));
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let buf = synthetic_capture(0.0);
        assert_eq!(
            fundamental_phase(&buf, Phase::Unknown),
            Err(Error::InvalidPhase)
        );
    }

    #[test]
    fn partial_fill_is_zero_padded() {
        let mut buf = synthetic_capture(0.0);
        buf.fill = FFT_SIZE / 2;
        assert!(fundamental_phase(&buf, Phase::A).is_ok());
    }

    #[test]
    fn tracking_holds_value_between_updates() {
        let mut tracking = PhaseTracking::new();
        tracking.apply(Angle::from_num(-60), Angle::ZERO);
        let first = tracking.angle();
        assert_eq!(first, Angle::from_num(30));
        // A failed analysis performs no apply(); the stored angle is untouched.
        assert_eq!(tracking.angle(), first);
    }
}
