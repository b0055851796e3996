//! Remote asset access
//!
//! Availability probing, timed loading and whole-file decoding of hosted
//! ambience assets.

pub mod decoder;
pub mod http;
pub mod loader;
pub mod probe;

pub use decoder::{decode_all, RemoteTrack};
pub use http::HttpClient;
pub use loader::{HttpStreamLoader, RemoteStreamLoader, StreamLoader};
pub use probe::{AssetCheck, AvailabilityProbe, HttpAssetCheck};
