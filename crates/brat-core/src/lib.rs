//! # brat-core
//!
//! Foundational types shared by the brat crates: the error type, service
//! configuration, page geometry, and logging setup.

pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;

pub use config::{
    BratConfig, CounterConfig, LoggingConfig, RenderConfig, ServerConfig, SettleMode, VideoConfig,
};
pub use error::{BratError, BratResult};
pub use geometry::{BoundingBox, Viewport};
