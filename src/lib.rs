//! declscope - Declaration inventory for module-organized source trees
//!
//! This crate scans a source tree with an external structure command,
//! collects the visible declarations of every module and reports them as a
//! grouped, box-drawn table alongside JSON artifacts.

pub mod analysis;
pub mod export;
pub mod parser;
