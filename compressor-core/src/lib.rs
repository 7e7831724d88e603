#![no_std]

// Shared logic for the compressor controller.
//
// Everything here stays portable across the RP2040 firmware, the host emulator,
// and `cargo test`: hardware, radio, and sockets are reached through traits so
// the state machines can be driven with mocks.

#[macro_use]
mod fmt;

pub mod bridge;
pub mod config;
pub mod control;
pub mod protocol;
pub mod provisioning;
pub mod session;
pub mod settings;
pub mod status;
pub mod time;
