//! Audio subsystem
//!
//! Handles the audio graph, output devices, spectrum analysis and the
//! playback controller.
//!

pub mod analyser;
pub mod engine;
pub mod graph;
pub mod output;
pub mod sampler;
pub mod source;
pub mod types;

pub use analyser::{Analyser, AnalyzingSource};
pub use engine::{ActiveSource, AmbienceEngine, PlayRequest};
pub use graph::{AudioGraph, Connection, DeviceFactory, GainNode, OutputDevice};
pub use output::{OfflineOutput, RodioOutput};
pub use sampler::{FrequencyBuffer, FrequencySampler};
pub use source::LoopingSource;
pub use types::{EnginePhase, PlayOutcome, PlaybackState, SoundType, SourceKind};
