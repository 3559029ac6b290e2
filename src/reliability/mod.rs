//! Durability helpers shared by the notes store and the plotting config writer.

pub mod atomic;
pub mod locks;
