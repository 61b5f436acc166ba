//! # Configuration Management
//!
//! Rotation configuration is read from the environment (optionally seeded from a
//! `.env` file by the CLI) and validated with the `validator` crate.

pub mod settings;

pub use settings::{CredhubConfig, RotationConfig};
