//! PID controller primitive consumed by the PLL regulator.

use fixed::types::I16F16;

/// PID controller over fixed-point values.
///
/// Gains are zero at creation, so the controller is inert until configured.
#[derive(Debug, Clone, Default)]
pub struct PidController {
    k_p: I16F16,
    integral: IntegralComponent,
    derivative: DerivativeComponent,
    limit: Option<I16F16>,
    output: I16F16,
}

impl PidController {
    pub const fn new() -> Self {
        Self {
            k_p: I16F16::ZERO,
            integral: IntegralComponent::new(),
            derivative: DerivativeComponent::new(),
            limit: None,
            output: I16F16::ZERO,
        }
    }

    pub fn set_gains(&mut self, k_p: I16F16, k_i: I16F16, k_d: I16F16) {
        self.k_p = k_p;
        self.integral.k_i = k_i;
        self.derivative.k_d = k_d;
    }

    /// Symmetric output clamp; `None` leaves the output unbounded.
    pub fn set_output_limit(&mut self, limit: Option<I16F16>) {
        self.limit = limit.map(|l| l.abs());
    }

    /// One controller step. Returns whether the output value changed.
    pub fn compute(&mut self, error: I16F16, dt: I16F16) -> bool {
        let mut next =
            self.k_p * error + self.integral.update(error, dt) + self.derivative.update(error, dt);
        if let Some(limit) = self.limit {
            next = next.clamp(-limit, limit);
        }
        let changed = next != self.output;
        self.output = next;
        changed
    }

    /// Current controller output.
    pub fn value(&self) -> I16F16 {
        self.output
    }

    /// Clears accumulated state and the output, keeping gains and clamp.
    pub fn reset(&mut self) {
        self.integral.integral = I16F16::ZERO;
        self.derivative.last_error = None;
        self.output = I16F16::ZERO;
    }
}

#[derive(Debug, Clone, Default)]
struct IntegralComponent {
    k_i: I16F16,
    integral: I16F16,
}

impl IntegralComponent {
    const fn new() -> Self {
        Self {
            k_i: I16F16::ZERO,
            integral: I16F16::ZERO,
        }
    }

    fn update(&mut self, error: I16F16, dt: I16F16) -> I16F16 {
        self.integral += error * dt;
        self.k_i * self.integral
    }
}

#[derive(Debug, Clone, Default)]
struct DerivativeComponent {
    k_d: I16F16,
    last_error: Option<I16F16>,
}

impl DerivativeComponent {
    const fn new() -> Self {
        Self {
            k_d: I16F16::ZERO,
            last_error: None,
        }
    }

    fn update(&mut self, error: I16F16, dt: I16F16) -> I16F16 {
        let derivative = self
            .last_error
            .map(|last| (error - last) / dt)
            .unwrap_or(I16F16::ZERO);

        self.last_error = Some(error);

        self.k_d * derivative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f32) -> I16F16 {
        I16F16::from_num(v)
    }

    #[test]
    fn zero_gains_hold_zero_output() {
        let mut pid = PidController::new();
        assert!(!pid.compute(num(5.0), num(1.0)));
        assert_eq!(pid.value(), I16F16::ZERO);
    }

    #[test]
    fn proportional_term() {
        let mut pid = PidController::new();
        pid.set_gains(num(2.0), I16F16::ZERO, I16F16::ZERO);
        assert!(pid.compute(num(3.0), num(1.0)));
        assert_eq!(pid.value(), num(6.0));
        // Same error, same output, no change reported.
        assert!(!pid.compute(num(3.0), num(1.0)));
    }

    #[test]
    fn integral_accumulates() {
        let mut pid = PidController::new();
        pid.set_gains(I16F16::ZERO, num(1.0), I16F16::ZERO);
        pid.compute(num(1.0), num(0.5));
        pid.compute(num(1.0), num(0.5));
        assert_eq!(pid.value(), num(1.0));
    }

    #[test]
    fn output_clamped() {
        let mut pid = PidController::new();
        pid.set_gains(num(10.0), I16F16::ZERO, I16F16::ZERO);
        pid.set_output_limit(Some(num(4.0)));
        pid.compute(num(100.0), num(1.0));
        assert_eq!(pid.value(), num(4.0));
        pid.compute(num(-100.0), num(1.0));
        assert_eq!(pid.value(), num(-4.0));
    }

    #[test]
    fn reset_keeps_configuration() {
        let mut pid = PidController::new();
        pid.set_gains(num(1.0), num(1.0), I16F16::ZERO);
        pid.compute(num(2.0), num(1.0));
        assert_ne!(pid.value(), I16F16::ZERO);
        pid.reset();
        assert_eq!(pid.value(), I16F16::ZERO);
        assert!(pid.compute(num(2.0), num(1.0)));
    }
}
