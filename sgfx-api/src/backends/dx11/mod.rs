mod command_encoder;
mod device;
pub use device::*;

mod internal;
