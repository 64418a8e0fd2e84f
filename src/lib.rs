pub mod button;
pub mod catalog;
pub mod config;
pub mod config_store;
pub mod controller;
pub mod display;
pub mod error;
pub mod frame;
pub mod import;
pub mod netimage;
pub mod power;
pub mod schedule;
pub mod status;
pub mod transform;

pub use config_model::{ConfigSnapshot, ModeId};
pub use error::{Error, Result};
pub use frame::Frame;
