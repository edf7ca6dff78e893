pub mod controller;
pub mod source;
pub mod track;

pub use controller::{MediaTrackController, OutgoingVideo};
pub use source::{MediaSource, SampleMediaSource, UserMedia};
pub use track::{LocalMediaBundle, MediaTrack, TrackKind, VideoSource};
