//! Mains phase sequencing and synchronization for phase-controlled rectifier
//! drives.
//!
//! A thyristor rectifier needs the instantaneous electrical angle of each
//! mains phase with sub-degree precision, even while its own timing reference
//! drifts against the mains. This crate provides the two halves of that
//! problem:
//!
//! - [`sequence::SequenceDetector`]: a finite-state detector that locks the
//!   rotation direction from zero-crossing events and flags wiring/sequence
//!   faults.
//! - [`PhaseSync`]: the spectral tracking engine. Per-phase waveforms are
//!   captured into a double buffer at ISR rate, the fundamental's phase is
//!   extracted by FFT and CORDIC, smoothed through a trimmed-mean filter, and
//!   fed to a PID-based PLL that keeps the firing-angle reference locked to
//!   the mains.
//!
//! The calling control loop drives [`PhaseSync::append_sample`] once per ADC
//! tick (interrupt context) and [`PhaseSync::process`] once per scheduling
//! tick (task context). Everything is fixed-point, allocation-free and
//! panic-free; per-tick failures are reported as [`Error`] values and never
//! retried internally.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

use fixed::types::I16F16;

pub mod angle;
pub mod capture;
pub mod filter;
pub mod pid;
pub mod sequence;
pub mod spectral;

pub use angle::Angle;
pub use capture::Voltage;
pub use pid::PidController;
pub use sequence::{next_phase, Direction, Phase, SequenceDetector, SequenceFault};
pub use spectral::PhaseTracking;

use angle::{HALF_TURN, THIRD_TURN};
use capture::WaveformCapture;

/// Samples captured per phase per mains cycle; also the FFT length.
pub const FFT_SIZE: usize = 32;

/// Scheduling ticks spent in [`SchedulerState::WaitingForData`] before the
/// first analysis, letting the bootstrap buffer accumulate a full cycle.
const BOOTSTRAP_TICKS: u8 = 3;

/// Non-fatal per-tick failure of a subsystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The read buffer holds no samples yet.
    NoData,
    /// An unrecognized phase was passed where A/B/C was required.
    InvalidPhase,
    /// Rotation direction cannot be derived from the measured angles.
    DirectionUnknown,
    /// Not all phase filters are full yet.
    NotReady,
}

/// State of the phase-calculation scheduler.
///
/// One step per scheduling tick; the three phases' FFT work and the buffer
/// swap are spread over consecutive ticks instead of running back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    Init,
    WaitingForData,
    ComputeA,
    ComputeB,
    ComputeC,
}

/// Drive-supplied physical configuration.
///
/// The crate never invents calibration values; the mains period and the ADC
/// prescale come from the drive's settings.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncConfig {
    /// Nominal mains period in microseconds (20_000 for 50 Hz).
    pub period_us: u32,
    /// Raw ADC ticks per stored waveform sample; the ADC rate divided by this
    /// must give `FFT_SIZE` samples per mains cycle.
    pub prescale: u32,
}

impl SyncConfig {
    pub const fn new(period_us: u32, prescale: u32) -> Self {
        Self {
            period_us,
            prescale,
        }
    }
}

/// The mains synchronization engine.
///
/// An owned context created once at drive initialization; no global state.
/// See the crate docs for the two entry points and their contexts.
pub struct PhaseSync {
    capture: WaveformCapture,
    tracking: [PhaseTracking; 3],
    state: SchedulerState,
    wait_ticks: u8,
    pll: PidController,
    accuracy: Angle,
    max_error: Angle,
    us_per_degree: I16F16,
    pll_dt: I16F16,
}

impl PhaseSync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            capture: WaveformCapture::new(config.prescale),
            tracking: [
                PhaseTracking::new(),
                PhaseTracking::new(),
                PhaseTracking::new(),
            ],
            state: SchedulerState::Init,
            wait_ticks: 0,
            pll: PidController::new(),
            accuracy: Angle::ZERO,
            // 180° puts the guard at the wrap boundary itself, i.e. inert
            // until the drive configures a tighter limit.
            max_error: HALF_TURN,
            us_per_degree: I16F16::from_num(config.period_us) / 360,
            pll_dt: I16F16::from_num(config.period_us) / 1_000_000,
        }
    }

    // --- configuration ---------------------------------------------------

    pub fn set_pid_gains(&mut self, k_p: I16F16, k_i: I16F16, k_d: I16F16) {
        self.pll.set_gains(k_p, k_i, k_d);
    }

    pub fn set_pid_output_limit(&mut self, limit: Option<I16F16>) {
        self.pll.set_output_limit(limit);
    }

    /// Maximum |angle of phase A| still considered synchronized.
    pub fn set_accuracy(&mut self, accuracy: Angle) {
        self.accuracy = accuracy.abs();
    }

    /// Threshold of the wrap guard in [`regulate`](Self::regulate).
    pub fn set_max_error(&mut self, max_error: Angle) {
        self.max_error = max_error.abs();
    }

    /// See [`capture::WaveformCapture::set_angle_source`].
    pub fn set_angle_source(&mut self, source: Option<fn() -> Angle>) {
        self.capture.set_angle_source(source);
    }

    /// See [`capture::WaveformCapture::set_voltage_scale`].
    pub fn set_voltage_scale(&mut self, scale: I16F16) {
        self.capture.set_voltage_scale(scale);
    }

    // --- entry points ----------------------------------------------------

    /// ISR-context producer; see [`capture::WaveformCapture::append_sample`].
    pub fn append_sample(&mut self, voltages: [Voltage; 3]) {
        self.capture.append_sample(voltages);
    }

    /// Manual buffer rotation; [`process_calc`](Self::process_calc) performs
    /// this on its own schedule.
    pub fn swap_buffers(&mut self) {
        self.capture.swap_buffers();
    }

    /// One scheduler step. Call once per scheduling tick.
    ///
    /// A failed analysis is reported but never stalls the schedule; the state
    /// always advances.
    pub fn process_calc(&mut self) -> Result<(), Error> {
        match self.state {
            SchedulerState::Init => {
                self.capture.swap_buffers();
                self.wait_ticks = 0;
                self.state = SchedulerState::WaitingForData;
                // Init performs one waiting step within the same tick.
                self.wait_step();
                Ok(())
            }
            SchedulerState::WaitingForData => {
                self.wait_step();
                Ok(())
            }
            SchedulerState::ComputeA => {
                // Promotes the buffer that has accumulated a full cycle; the
                // only swap of the steady-state cycle.
                self.capture.swap_buffers();
                self.state = SchedulerState::ComputeB;
                self.analyze(Phase::A)
            }
            SchedulerState::ComputeB => {
                self.state = SchedulerState::ComputeC;
                self.analyze(Phase::B)
            }
            SchedulerState::ComputeC => {
                self.state = SchedulerState::ComputeA;
                self.analyze(Phase::C)
            }
        }
    }

    fn wait_step(&mut self) {
        self.wait_ticks += 1;
        if self.wait_ticks >= BOOTSTRAP_TICKS {
            self.state = SchedulerState::ComputeA;
        }
    }

    fn analyze(&mut self, phase: Phase) -> Result<(), Error> {
        let idx = spectral::phase_index(phase)?;
        let buffer = self.capture.read_buffer();
        let baseline = buffer.baseline();
        let raw = spectral::fundamental_phase(buffer, phase)?;
        self.tracking[idx].apply(raw, baseline);
        Ok(())
    }

    /// One PLL step per full three-phase cycle.
    ///
    /// Acts only in [`SchedulerState::ComputeB`], i.e. immediately after
    /// phase A was analyzed this cycle. Returns whether the PID output
    /// changed.
    pub fn regulate(&mut self) -> bool {
        if self.state != SchedulerState::ComputeB {
            return false;
        }
        let mut error = self.tracking[0].angle;
        // Near the ±180° wrap a sign-flipped error would destabilize the
        // loop; fold it back to its magnitude.
        if error < -self.max_error {
            error = error.abs();
        }
        self.pll.compute(error, self.pll_dt)
    }

    /// Full tick orchestration: scheduler step, then PLL regulation, then
    /// offset and delta diagnostics.
    ///
    /// `Ok(true)` means fresh diagnostics are valid this tick.
    pub fn process(&mut self) -> Result<bool, Error> {
        self.process_calc()?;
        if !self.regulate() {
            return Ok(false);
        }
        self.compute_offsets()?;
        self.compute_delta_angles()?;
        Ok(true)
    }

    /// Clears buffers, filters, counters and PID state. Drive stop/restart.
    pub fn reset(&mut self) {
        self.capture.reset();
        for tracking in &mut self.tracking {
            tracking.reset();
        }
        self.pll.reset();
        self.state = SchedulerState::Init;
        self.wait_ticks = 0;
    }

    // --- diagnostics -----------------------------------------------------

    /// Derives each phase's deviation from its ideal reference position and
    /// the equivalent timing offset in microseconds.
    pub fn compute_offsets(&mut self) -> Result<(), Error> {
        if !self.data_available() {
            return Err(Error::NotReady);
        }
        let direction = self.current_direction();
        if direction == Direction::Unknown {
            return Err(Error::DirectionUnknown);
        }
        for (idx, tracking) in self.tracking.iter_mut().enumerate() {
            let offset = angle::wrap_sub(tracking.angle, ideal_position(idx, direction));
            tracking.offset_angle = offset;
            tracking.offset_time_us = offset * self.us_per_degree;
        }
        Ok(())
    }

    /// Derives each phase's wrap-aware spacing from its logical predecessor;
    /// ideally +120° for either direction.
    pub fn compute_delta_angles(&mut self) -> Result<(), Error> {
        if !self.data_available() {
            return Err(Error::NotReady);
        }
        let direction = self.current_direction();
        if direction == Direction::Unknown {
            return Err(Error::DirectionUnknown);
        }
        let reverse = direction.reversed();
        let angles = [
            self.tracking[0].angle,
            self.tracking[1].angle,
            self.tracking[2].angle,
        ];
        for (idx, phase) in [Phase::A, Phase::B, Phase::C].into_iter().enumerate() {
            let pred = next_phase(phase, reverse);
            let pred_idx = spectral::phase_index(pred)?;
            self.tracking[idx].delta_angle = angle::wrap_sub(angles[pred_idx], angles[idx]);
        }
        Ok(())
    }

    // --- accessors -------------------------------------------------------

    pub fn scheduler_state(&self) -> SchedulerState {
        self.state
    }

    /// Tracking state of one phase.
    pub fn tracking(&self, phase: Phase) -> Result<&PhaseTracking, Error> {
        Ok(&self.tracking[spectral::phase_index(phase)?])
    }

    /// Filtered zero-crossing angle of one phase.
    pub fn phase_angle(&self, phase: Phase) -> Result<Angle, Error> {
        Ok(self.tracking(phase)?.angle())
    }

    pub fn offset_angle(&self, phase: Phase) -> Result<Angle, Error> {
        Ok(self.tracking(phase)?.offset_angle())
    }

    pub fn offset_time_us(&self, phase: Phase) -> Result<I16F16, Error> {
        Ok(self.tracking(phase)?.offset_time_us())
    }

    pub fn delta_angle(&self, phase: Phase) -> Result<Angle, Error> {
        Ok(self.tracking(phase)?.delta_angle())
    }

    /// Measured predecessor spacing minus the ideal 120°.
    pub fn delta_from_ideal(&self, phase: Phase) -> Result<Angle, Error> {
        Ok(angle::wrap_sub(
            self.tracking(phase)?.delta_angle(),
            THIRD_TURN,
        ))
    }

    /// True once every phase's filter holds a full window.
    pub fn data_available(&self) -> bool {
        self.tracking.iter().all(|t| t.filter.is_full())
    }

    /// True iff data is available and |angle A| is within the configured
    /// accuracy.
    pub fn synchronized(&self) -> bool {
        self.data_available() && self.tracking[0].angle.abs() <= self.accuracy
    }

    /// Current PLL output for the firing-control consumer.
    pub fn pll_value(&self) -> I16F16 {
        self.pll.value()
    }

    /// Rotation direction derived from the pairwise ordering of the measured
    /// angles. Independent cross-check of the zero-cross sequence detector.
    pub fn current_direction(&self) -> Direction {
        if !self.data_available() {
            return Direction::Unknown;
        }
        let a = self.tracking[0].angle;
        let gap_b = angle::wrap_sub(self.tracking[1].angle, a);
        let gap_c = angle::wrap_sub(self.tracking[2].angle, a);
        if gap_b == gap_c {
            Direction::Unknown
        } else if gap_b < gap_c {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// The phase whose zero-crossing interval the system is currently in,
    /// for callers that schedule per-phase actions by identity.
    pub fn current_phase(&self) -> Phase {
        let direction = self.current_direction();
        if direction == Direction::Unknown {
            return Phase::Unknown;
        }
        match self.state {
            SchedulerState::ComputeB => Phase::A,
            SchedulerState::ComputeC => next_phase(Phase::A, direction),
            SchedulerState::ComputeA => {
                next_phase(next_phase(Phase::A, direction), direction)
            }
            _ => Phase::Unknown,
        }
    }

    /// The phase whose zero-crossing comes up next.
    pub fn next_phase(&self) -> Phase {
        next_phase(self.current_phase(), self.current_direction())
    }
}

fn ideal_position(idx: usize, direction: Direction) -> Angle {
    let third = match direction {
        Direction::Backward => -THIRD_TURN,
        _ => THIRD_TURN,
    };
    match idx {
        1 => -third,
        2 => third,
        _ => Angle::ZERO,
    }
}
