use compressor_core::control::ControlOutputs;
use embassy_rp::gpio::Output;

/// Relay on GPIO 17 and release solenoid on GPIO 15, both active high.
pub struct PinOutputs {
    relay: Output<'static>,
    solenoid: Output<'static>,
}

impl PinOutputs {
    #[must_use]
    pub fn new(relay: Output<'static>, solenoid: Output<'static>) -> Self {
        Self { relay, solenoid }
    }
}

impl ControlOutputs for PinOutputs {
    fn set_relay(&mut self, energized: bool) {
        self.relay.set_level(energized.into());
    }

    fn set_solenoid(&mut self, open: bool) {
        self.solenoid.set_level(open.into());
    }
}
