//! Configuration parsing for wsbar
//!
//! This crate handles parsing the KDL configuration file that drives the
//! workspace reconciler: output filtering, sort order, label formats,
//! persistent workspaces and window rewrite rules.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
