// Audio capture, analysis, and feature extraction for audiobrain.

pub mod assembler;
pub mod capture;
pub mod device;
pub mod error;
pub mod features;
pub mod mono;
pub mod pipeline;
pub mod ring;
pub mod spectrum;
