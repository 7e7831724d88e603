//! Board adapters that implement the `compressor-core` hardware traits.

pub mod flash;
pub mod outputs;
pub mod radio;

pub use flash::FlashStore;
pub use outputs::PinOutputs;
pub use radio::CywRadio;
