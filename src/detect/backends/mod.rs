pub mod stub;
pub mod threshold;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;
pub use threshold::ThresholdBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
