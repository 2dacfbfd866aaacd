// src/core/commands/mod.rs

//! Commands as seen by the routers, and the rules that locate their keys.

pub mod command;
pub mod key_extractor;

pub use command::Command;
pub use key_extractor::{CommandSlotResolver, KeyRule};
