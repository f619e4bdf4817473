//!
//! Documentation on the design of layerfs
//!
//! layerfs stacks copy-on-write layers on a single device. Each layer is
//! described by one superblock; the layers form a forest rooted at the
//! primary layer, whose superblock sits at a fixed block.
//!

pub mod forest;
pub mod superblock;
