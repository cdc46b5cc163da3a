//! Subtitle timing correction

pub mod offset;
pub mod vtt;

pub use offset::{OffsetReport, SubtitleError, SubtitleOffsetApplier, TextTrack, TrackHost};
pub use vtt::{shift_timestamp, shift_vtt, TimestampError};
