//! CLI command implementations.
//!
//! - [`serve`] - run the HTTP tile server
//! - [`render`] - render one tile to a file
//! - [`sources`] - list candidate sources for a tile
//! - [`init`] - write the default config file

pub mod common;
pub mod init;
pub mod render;
pub mod serve;
pub mod sources;
