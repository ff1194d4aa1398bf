//! Speech synthesis adapters.

pub mod command;

pub use command::CommandSynthesizer;
