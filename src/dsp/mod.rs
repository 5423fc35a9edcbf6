//! Low-level DSP primitives.

pub mod fastmath;
pub mod phase;
pub mod window;

pub use fastmath::ftz;
pub use phase::wrap_phase;
pub use window::hann_periodic;
