//! Sensor conversions and edge detection.
//!
//! The sampling task converts raw ADC readings with the helpers below and
//! feeds the rounded values into a [`SensorTracker`], which decides when the
//! motor and supply countdowns start or stop.

use heapless::Vec;

/// ADC reference voltage.
pub const ADC_REFERENCE_VOLTS: f32 = 3.3;
/// Full-scale count of the 12-bit ADC.
pub const ADC_FULL_SCALE: f32 = 4096.0;

const PRESSURE_MIN_VOLTS: f32 = 0.333;
const PRESSURE_MAX_VOLTS: f32 = 3.0;
const SENSOR_MIN_VOLTS: f32 = 0.5;
const SENSOR_MAX_VOLTS: f32 = 4.5;
const KPA_PER_SENSOR_VOLT: f32 = 100.0;
const KPA_OFFSET: f32 = -100.0;
const PSI_PER_KPA: f32 = 0.145_037_73;

const CURRENT_QUIESCENT_VOLTS: f32 = 1.65;
const CURRENT_VOLTS_PER_AMP: f32 = 0.0264;

/// Converts a raw 12-bit sample to volts.
#[must_use]
pub fn adc_volts(raw: u16) -> f32 {
    f32::from(raw) * ADC_REFERENCE_VOLTS / ADC_FULL_SCALE
}

/// Converts the divided pressure transducer output to PSI.
#[must_use]
pub fn pressure_psi(volts: f32) -> f32 {
    let volts = volts.clamp(PRESSURE_MIN_VOLTS, PRESSURE_MAX_VOLTS);
    let sensor_volts = (volts - PRESSURE_MIN_VOLTS) * (SENSOR_MAX_VOLTS - SENSOR_MIN_VOLTS)
        / (PRESSURE_MAX_VOLTS - PRESSURE_MIN_VOLTS)
        + SENSOR_MIN_VOLTS;
    let kpa = (sensor_volts - SENSOR_MIN_VOLTS) * KPA_PER_SENSOR_VOLT + KPA_OFFSET;
    kpa * PSI_PER_KPA
}

/// Converts the hall-effect current sensor output to amps.
#[must_use]
pub fn current_amps(volts: f32) -> f32 {
    let volts = volts.clamp(CURRENT_QUIESCENT_VOLTS, ADC_REFERENCE_VOLTS);
    (volts - CURRENT_QUIESCENT_VOLTS) / CURRENT_VOLTS_PER_AMP
}

/// Rounds to one decimal place, half away from zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn round_tenth(value: f32) -> f32 {
    let scaled = value * 10.0;
    let nudged = if scaled < 0.0 { scaled - 0.5 } else { scaled + 0.5 };
    (nudged as i32) as f32 / 10.0
}

/// Entry points the sampling task drives on the control state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorTrigger {
    MotorStart,
    MotorStop,
    SupplyStart,
    SupplyStop,
}

/// Outcome of one sampling pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorReport {
    /// New rounded pressure when it differs from the previous sample.
    pub pressure_changed: Option<f32>,
    pub triggers: Vec<SensorTrigger, 2>,
}

/// Remembers the previous sample to detect edges.
#[derive(Clone, Debug, Default)]
pub struct SensorTracker {
    last_pressure: f32,
    last_current: f32,
    pressurized: bool,
    supplying: bool,
}

impl SensorTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_pressure: 0.0,
            last_current: 0.0,
            pressurized: false,
            supplying: false,
        }
    }

    #[must_use]
    pub fn is_pressurized(&self) -> bool {
        self.pressurized
    }

    /// Consumes one rounded sample pair.
    #[allow(clippy::float_cmp)]
    pub fn update(&mut self, pressure: f32, current: f32) -> SensorReport {
        let mut report = SensorReport::default();

        if current > 0.0 && self.last_current == 0.0 {
            report.triggers.push(SensorTrigger::MotorStart).ok();
        } else if current == 0.0 && self.last_current > 0.0 {
            report.triggers.push(SensorTrigger::MotorStop).ok();
        }
        self.last_current = current;

        if pressure != self.last_pressure {
            report.pressure_changed = Some(pressure);
        }

        if pressure > self.last_pressure {
            if self.pressurized && self.supplying {
                self.supplying = false;
                report.triggers.push(SensorTrigger::SupplyStop).ok();
            }
        } else if pressure < self.last_pressure {
            if pressure <= 0.0 {
                self.pressurized = false;
                if self.supplying {
                    self.supplying = false;
                    report.triggers.push(SensorTrigger::SupplyStop).ok();
                }
            } else if self.pressurized && !self.supplying {
                self.supplying = true;
                report.triggers.push(SensorTrigger::SupplyStart).ok();
            }
        } else if !self.pressurized && pressure > 0.0 {
            self.pressurized = true;
        }

        self.last_pressure = pressure;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn pressure_conversion_covers_transducer_range() {
        assert!(close(pressure_psi(0.0), -14.5));
        assert!(close(pressure_psi(3.0), 43.5));
        assert!(close(pressure_psi(5.0), 43.5));
        let atmospheric = PRESSURE_MIN_VOLTS + (PRESSURE_MAX_VOLTS - PRESSURE_MIN_VOLTS) / 4.0;
        assert!(close(pressure_psi(atmospheric), 0.0));
    }

    #[test]
    fn current_conversion_clamps_quiescent() {
        assert_eq!(current_amps(1.0), 0.0);
        assert!(close(current_amps(1.65 + 0.264), 10.0));
    }

    #[test]
    fn rounds_to_tenths() {
        assert_eq!(round_tenth(1.26), 1.3);
        assert_eq!(round_tenth(-1.24), -1.2);
        assert_eq!(round_tenth(0.04), 0.0);
    }

    #[test]
    fn current_edges_drive_motor_triggers() {
        let mut tracker = SensorTracker::new();
        assert_eq!(tracker.update(0.0, 2.5).triggers.as_slice(), &[SensorTrigger::MotorStart]);
        assert!(tracker.update(0.0, 2.4).triggers.is_empty());
        assert_eq!(tracker.update(0.0, 0.0).triggers.as_slice(), &[SensorTrigger::MotorStop]);
    }

    #[test]
    fn falling_pressure_after_stabilising_starts_supply() {
        let mut tracker = SensorTracker::new();
        assert_eq!(tracker.update(30.0, 0.0).pressure_changed, Some(30.0));
        let stable = tracker.update(30.0, 0.0);
        assert_eq!(stable.pressure_changed, None);
        assert!(tracker.is_pressurized());

        assert_eq!(tracker.update(29.5, 0.0).triggers.as_slice(), &[SensorTrigger::SupplyStart]);
        assert!(tracker.update(29.0, 0.0).triggers.is_empty());
        assert_eq!(tracker.update(29.4, 0.0).triggers.as_slice(), &[SensorTrigger::SupplyStop]);
    }

    #[test]
    fn reaching_zero_clears_pressurized() {
        let mut tracker = SensorTracker::new();
        tracker.update(10.0, 0.0);
        tracker.update(10.0, 0.0);
        tracker.update(5.0, 0.0);
        let report = tracker.update(0.0, 0.0);
        assert_eq!(report.triggers.as_slice(), &[SensorTrigger::SupplyStop]);
        assert!(!tracker.is_pressurized());
    }
}
