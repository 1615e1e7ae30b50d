// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

pub mod analyzer;
pub mod config;
pub mod convert;
pub mod loader;
pub mod parser;
pub mod progress;
pub mod sequence;
pub mod writer;
