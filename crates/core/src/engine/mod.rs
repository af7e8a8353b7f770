//! Download engine abstraction.
//!
//! This module provides a `MediaEngine` trait for extracting media across
//! two backends: the broad-coverage yt-dlp subprocess engine and a
//! lightweight direct HTTP engine.

mod direct;
mod select;
mod types;
mod ytdlp;

pub use direct::DirectHttpEngine;
pub use select::select_engine;
pub use types::*;
pub use ytdlp::YtDlpEngine;
