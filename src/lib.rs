mod error;
pub use error::{
    EngineError,
    EngineResult,
};

pub mod primitives;

pub mod chain;

pub mod signer;

pub mod tx;

pub mod events;

pub mod tokens;

pub mod segments;

pub mod config;

pub mod utils;

#[cfg(any(test, feature = "test"))]
pub mod test_utils;
