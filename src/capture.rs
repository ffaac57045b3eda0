//! Double-buffered acquisition of one mains cycle per phase.
//!
//! [`WaveformCapture::append_sample`] runs in interrupt context at the raw ADC
//! rate; a prescaler divides that down so exactly [`FFT_SIZE`](crate::FFT_SIZE)
//! samples span one mains cycle. The task context takes finished cycles with
//! [`WaveformCapture::swap_buffers`]. Only the slot indices are shared between
//! the two contexts, and they rotate inside a critical section; the sample
//! arrays themselves never need locking because exactly one slot is writable
//! and the other readable at any instant.

use fixed::types::I16F16;

use crate::angle::Angle;
use crate::FFT_SIZE;

/// Instantaneous phase voltage, fixed-point.
pub type Voltage = I16F16;

/// 16-bit sample format fed to the FFT.
pub type Sample = i16;

/// One set of per-phase sample arrays plus its capture metadata.
#[derive(Debug)]
pub struct CaptureBuffer {
    pub(crate) samples: [[Sample; FFT_SIZE]; 3],
    pub(crate) fill: usize,
    pub(crate) baseline: Angle,
}

impl CaptureBuffer {
    pub(crate) const fn new() -> Self {
        Self {
            samples: [[0; FFT_SIZE]; 3],
            fill: 0,
            baseline: Angle::ZERO,
        }
    }

    fn clear(&mut self) {
        self.fill = 0;
        self.baseline = Angle::ZERO;
    }

    /// Number of samples captured so far (0..=FFT_SIZE).
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// Electrical angle recorded at the first sample of this capture.
    pub fn baseline(&self) -> Angle {
        self.baseline
    }
}

/// Per-phase double buffer with rotating capture/analyze roles.
pub struct WaveformCapture {
    buffers: [CaptureBuffer; 2],
    write_slot: usize,
    read_slot: usize,
    prescale: u32,
    prescale_count: u32,
    voltage_scale: I16F16,
    angle_source: Option<fn() -> Angle>,
}

impl WaveformCapture {
    /// `prescale` is the number of raw ADC ticks per stored sample; the ADC
    /// rate divided by it must equal `FFT_SIZE` samples per mains cycle.
    pub fn new(prescale: u32) -> Self {
        Self {
            buffers: [CaptureBuffer::new(), CaptureBuffer::new()],
            write_slot: 0,
            read_slot: 1,
            prescale: prescale.max(1),
            prescale_count: 0,
            voltage_scale: I16F16::ONE,
            angle_source: None,
        }
    }

    /// Injects the reference-angle callback sampled at capture start.
    ///
    /// Without a source the baseline stays zero and no correction is applied.
    pub fn set_angle_source(&mut self, source: Option<fn() -> Angle>) {
        self.angle_source = source;
    }

    /// Volts-to-counts quantization factor for the stored samples.
    pub fn set_voltage_scale(&mut self, scale: I16F16) {
        self.voltage_scale = scale;
    }

    /// Consumes one raw ADC tick of instantaneous phase voltages.
    ///
    /// Interrupt-context entry point. Stores the three line-difference
    /// voltages; once the write buffer is full, further ticks are ignored
    /// until the next swap.
    pub fn append_sample(&mut self, voltages: [Voltage; 3]) {
        self.prescale_count += 1;
        if self.prescale_count < self.prescale {
            return;
        }
        self.prescale_count = 0;

        let baseline = if self.buffers[self.write_slot].fill == 0 {
            self.angle_source.map(|source| source())
        } else {
            None
        };
        let buf = &mut self.buffers[self.write_slot];
        if buf.fill >= FFT_SIZE {
            return;
        }
        if let Some(angle) = baseline {
            buf.baseline = angle;
        }

        let [a, b, c] = voltages;
        let diffs = [a - b, b - c, c - a];
        for (phase, diff) in diffs.iter().enumerate() {
            let quantized: Sample = diff.saturating_mul(self.voltage_scale).saturating_to_num();
            buf.samples[phase][buf.fill] = quantized;
        }
        buf.fill += 1;
    }

    /// Rotates the capture/analyze roles and empties the new write buffer.
    ///
    /// The index update is indivisible with respect to `append_sample`; the
    /// interrupt is held off only for this rotation, never for sample writes.
    pub fn swap_buffers(&mut self) {
        critical_section::with(|_| {
            self.write_slot ^= 1;
            self.read_slot ^= 1;
            self.buffers[self.write_slot].clear();
            self.prescale_count = 0;
        });
    }

    /// The buffer currently owned by the analysis side.
    pub fn read_buffer(&self) -> &CaptureBuffer {
        &self.buffers[self.read_slot]
    }

    /// Clears both buffers and the prescaler without breaking the slot
    /// invariant. Drive stop/restart path.
    pub fn reset(&mut self) {
        critical_section::with(|_| {
            self.buffers[0].clear();
            self.buffers[1].clear();
            self.prescale_count = 0;
        });
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> (usize, usize) {
        (self.write_slot, self.read_slot)
    }

    #[cfg(test)]
    pub(crate) fn write_buffer(&self) -> &CaptureBuffer {
        &self.buffers[self.write_slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volts(a: i32, b: i32, c: i32) -> [Voltage; 3] {
        [
            Voltage::from_num(a),
            Voltage::from_num(b),
            Voltage::from_num(c),
        ]
    }

    #[test]
    fn slots_stay_distinct_across_swaps() {
        let mut cap = WaveformCapture::new(1);
        for _ in 0..5 {
            let (w, r) = cap.slots();
            assert_ne!(w, r);
            cap.swap_buffers();
        }
    }

    #[test]
    fn stores_line_differences() {
        let mut cap = WaveformCapture::new(1);
        cap.append_sample(volts(100, 60, -40));
        let buf = cap.write_buffer();
        assert_eq!(buf.fill(), 1);
        assert_eq!(buf.samples[0][0], 40); // a - b
        assert_eq!(buf.samples[1][0], 100); // b - c
        assert_eq!(buf.samples[2][0], -140); // c - a
    }

    #[test]
    fn baseline_taken_at_first_sample_only() {
        fn source() -> Angle {
            Angle::from_num(33)
        }
        let mut cap = WaveformCapture::new(1);
        cap.set_angle_source(Some(source));
        cap.append_sample(volts(1, 0, 0));
        cap.append_sample(volts(2, 0, 0));
        assert_eq!(cap.write_buffer().baseline(), Angle::from_num(33));
        cap.swap_buffers();
        assert_eq!(cap.write_buffer().baseline(), Angle::ZERO);
    }

    #[test]
    fn prescaler_divides_the_raw_rate() {
        let mut cap = WaveformCapture::new(4);
        for _ in 0..16 {
            cap.append_sample(volts(1, 0, 0));
        }
        assert_eq!(cap.write_buffer().fill(), 4);
    }

    #[test]
    fn full_buffer_ignores_extra_ticks() {
        let mut cap = WaveformCapture::new(1);
        for _ in 0..FFT_SIZE + 10 {
            cap.append_sample(volts(1, 0, 0));
        }
        assert_eq!(cap.write_buffer().fill(), FFT_SIZE);
    }

    #[test]
    fn swap_presents_the_filled_cycle() {
        let mut cap = WaveformCapture::new(1);
        for _ in 0..FFT_SIZE {
            cap.append_sample(volts(5, -5, 0));
        }
        cap.swap_buffers();
        assert_eq!(cap.read_buffer().fill(), FFT_SIZE);
        assert_eq!(cap.write_buffer().fill(), 0);
    }

    #[test]
    fn quantization_saturates() {
        let mut cap = WaveformCapture::new(1);
        cap.set_voltage_scale(I16F16::from_num(1000));
        cap.append_sample(volts(100, -100, 0));
        assert_eq!(cap.write_buffer().samples[0][0], i16::MAX);
    }
}
