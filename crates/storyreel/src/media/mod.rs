//! Media encoding: GIF assembly and the raw recording container.

mod gif_encoder;
mod recording;

pub use gif_encoder::{GifAssembler, RgbaFrame};
pub use recording::{spawn_flush, FrameTimeline, TimedFrame, RECORDING_FILE};
