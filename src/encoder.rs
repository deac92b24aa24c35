//! Quadrature pulse counting
//!
//! One [`PulseCounter`] per wheel, mutated only from the edge handler and read
//! from the control loop. Both sides go through a `critical_section`, so a read
//! can never observe a half-applied increment and a reset can never lose to a
//! concurrent edge.
//!
//! # Decoding
//! On every transition of the interrupt channel both channel levels are read:
//! equal levels count `-1`, different levels count `+1`. A wheel whose encoder
//! is mounted mirrored has its inversion flag set, which flips every delta.
//! Wrong wiring just yields wrong-signed counts; the calibration capture is the
//! place where that gets noticed, not here.

use core::cell::Cell;

use critical_section::Mutex;

use crate::config::CalibrationConfig;

/// Direction of one quadrature edge given both channel levels
pub fn quadrature_delta(channel_a: bool, channel_b: bool, inverted: bool) -> i32 {
    let delta = if channel_a == channel_b { -1 } else { 1 };
    if inverted {
        -delta
    } else {
        delta
    }
}

/// Signed running pulse count of one wheel
pub struct PulseCounter {
    count: Mutex<Cell<i32>>,
    inverted: Mutex<Cell<bool>>,
}

impl PulseCounter {
    pub const fn new(inverted: bool) -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
            inverted: Mutex::new(Cell::new(inverted)),
        }
    }

    /// Edge handler entry point: applies one ±1 step
    pub fn on_edge(&self, channel_a: bool, channel_b: bool) {
        critical_section::with(|cs| {
            let delta = quadrature_delta(channel_a, channel_b, self.inverted.borrow(cs).get());
            let count = self.count.borrow(cs);
            count.set(count.get().wrapping_add(delta));
        });
    }

    /// Atomic snapshot of the running count
    pub fn read(&self) -> i32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    /// Atomically zeroes the running count
    pub fn reset(&self) {
        critical_section::with(|cs| self.count.borrow(cs).set(0));
    }

    pub fn set_inverted(&self, inverted: bool) {
        critical_section::with(|cs| self.inverted.borrow(cs).set(inverted));
    }

    pub fn is_inverted(&self) -> bool {
        critical_section::with(|cs| self.inverted.borrow(cs).get())
    }
}

/// Left and right pulse counts taken at the same instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelPulses {
    pub left: i32,
    pub right: i32,
}

impl WheelPulses {
    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    /// Per-wheel pulses travelled since an earlier snapshot
    pub fn since(self, earlier: WheelPulses) -> WheelPulses {
        WheelPulses {
            left: self.left.wrapping_sub(earlier.left),
            right: self.right.wrapping_sub(earlier.right),
        }
    }

    /// Larger of the two wheel magnitudes
    pub fn max_abs(self) -> i32 {
        self.left.saturating_abs().max(self.right.saturating_abs())
    }

    /// Mean of the two wheel magnitudes
    pub fn mean_abs(self) -> i32 {
        ((self.left.saturating_abs() as i64 + self.right.saturating_abs() as i64) / 2) as i32
    }
}

/// Both wheel counters of the chassis
pub struct Encoders {
    pub left: PulseCounter,
    pub right: PulseCounter,
}

impl Encoders {
    pub const fn new(left_inverted: bool, right_inverted: bool) -> Self {
        Self {
            left: PulseCounter::new(left_inverted),
            right: PulseCounter::new(right_inverted),
        }
    }

    /// Reads both counters inside one critical section
    pub fn snapshot(&self) -> WheelPulses {
        critical_section::with(|cs| WheelPulses {
            left: self.left.count.borrow(cs).get(),
            right: self.right.count.borrow(cs).get(),
        })
    }

    /// Zeroes both counters inside one critical section
    pub fn reset(&self) {
        critical_section::with(|cs| {
            self.left.count.borrow(cs).set(0);
            self.right.count.borrow(cs).set(0);
        });
    }

    /// Applies the inversion flags of a (possibly updated) calibration
    pub fn apply_calibration(&self, calibration: &CalibrationConfig) {
        self.left.set_inverted(calibration.left_inverted);
        self.right.set_inverted(calibration.right_inverted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One full forward quadrature cycle as (A, B) levels seen on each edge
    const FORWARD_EDGES: [(bool, bool); 4] = [(true, false), (false, true), (true, false), (false, true)];
    const BACKWARD_EDGES: [(bool, bool); 4] = [(true, true), (false, false), (true, true), (false, false)];

    #[test]
    fn delta_sign_follows_channel_equality() {
        assert_eq!(quadrature_delta(true, true, false), -1);
        assert_eq!(quadrature_delta(false, false, false), -1);
        assert_eq!(quadrature_delta(true, false, false), 1);
        assert_eq!(quadrature_delta(false, true, false), 1);
        assert_eq!(quadrature_delta(true, false, true), -1);
        assert_eq!(quadrature_delta(true, true, true), 1);
    }

    #[test]
    fn count_is_signed_sum_of_edges() {
        let counter = PulseCounter::new(false);
        let mut expected = 0;
        for (i, &(a, b)) in FORWARD_EDGES.iter().cycle().take(10).enumerate() {
            counter.on_edge(a, b);
            expected += 1;
            assert_eq!(counter.read(), expected, "after edge {}", i);
        }
        for &(a, b) in BACKWARD_EDGES.iter().cycle().take(13) {
            counter.on_edge(a, b);
        }
        assert_eq!(counter.read(), 10 - 13);
    }

    #[test]
    fn inversion_flips_every_edge() {
        let plain = PulseCounter::new(false);
        let inverted = PulseCounter::new(true);
        let edges = FORWARD_EDGES.iter().chain(BACKWARD_EDGES.iter()).chain(FORWARD_EDGES.iter());
        for &(a, b) in edges {
            plain.on_edge(a, b);
            inverted.on_edge(a, b);
        }
        assert_eq!(plain.read(), 4);
        assert_eq!(inverted.read(), -4);
    }

    #[test]
    fn reset_zeroes_counts() {
        let encoders = Encoders::new(false, true);
        encoders.left.on_edge(true, false);
        encoders.right.on_edge(true, false);
        encoders.right.on_edge(true, false);
        assert_eq!(encoders.snapshot(), WheelPulses::new(1, -2));

        encoders.reset();
        assert_eq!(encoders.snapshot(), WheelPulses::default());
    }

    #[test]
    fn calibration_updates_inversion() {
        let encoders = Encoders::new(false, false);
        let mut calibration = CalibrationConfig::default();
        calibration.left_inverted = true;
        encoders.apply_calibration(&calibration);
        assert!(encoders.left.is_inverted());
        assert!(encoders.right.is_inverted());
    }

    #[test]
    fn pulse_deltas() {
        let start = WheelPulses::new(100, -50);
        let now = WheelPulses::new(40, 30);
        let delta = now.since(start);
        assert_eq!(delta, WheelPulses::new(-60, 80));
        assert_eq!(delta.max_abs(), 80);
        assert_eq!(delta.mean_abs(), 70);
    }
}
