//! Data models for the loader

pub mod rows;

pub use rows::{ArtistRow, ProtoSongplay, SongRow, SongplayRow, StageRow, TimeRow, UserRow};
