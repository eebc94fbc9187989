//! Database helpers local to the loader

pub mod staging;

pub use staging::StagingArena;
