//! Media URL players with an optional graphic equalizer.
//!
//! Decoding is done by Symphonia, sample-rate conversion by Rubato, and output
//! by CPAL. [`SimplePlayer`] and [`EqPlayer`] are the entry points; the stage
//! modules are public for front ends that need device listing or finer control.

pub mod config;
pub mod decode;
pub mod device;
pub mod eq;
pub mod http_stream;
pub mod pipeline;
pub mod playback;
pub mod player;
pub mod queue;
pub mod resample;
pub mod source;
pub mod status;
pub mod transport;
mod worker;

pub use config::{PlaybackConfig, PlayerConfig};
pub use decode::SourceInfo;
pub use player::{EqPlayer, Player, SimplePlayer};
pub use player_types::{EqPresetInfo, PlaybackEndReason, PlaybackState, PlayerStatus};
