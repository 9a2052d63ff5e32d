//! Frequency-domain filters

pub mod butterworth;

pub use butterworth::{Biquad, ButterworthLowpass};
