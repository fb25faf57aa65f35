//! Audio rendering: asset loading, format decoding and device management

pub mod ambisonics;
pub mod clip;
pub mod decode;
pub mod hrtf;
pub mod manager;
pub mod output;
pub mod sample;
pub mod wav;

pub use clip::ClipRenderer;
pub use decode::{DecodePath, DecodePipeline, HrtfTarget};
pub use hrtf::{HrtfBank, HrtfPair};
pub use manager::{AudioDeviceManager, DeviceState, OpenOutcome, RenderCallback, RenderFn, RenderStats};
pub use output::{AudioBackend, BackendOpen, CpalBackend};
pub use wav::WavFile;
