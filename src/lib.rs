//! A networked slideshow component.
//!
//! One peer of a session drives playback: it downloads each image in turn,
//! advances on a timer and replicates its position. Every other peer mirrors
//! the position and downloads the same image. See [`slideshow::Slideshow`].

pub mod authority;
pub mod config;
pub mod cursor;
pub mod download_slots;
pub mod error_poller;
pub mod errors;
pub mod host;
pub mod log_surface;
pub mod media_pipeline;
pub mod model;
pub mod presentation;
pub mod replication;
pub mod session;
pub mod slideshow;

#[cfg(test)]
mod test_support;
