//! ABIs of the contracts the engine was built against.
//!
//! Used when no ABI file is configured.

pub const TOKEN_ABI: &str = include_str!("../../abi/Token.json");
pub const CONTAINER_ABI: &str = include_str!("../../abi/Container.json");
pub const SEGMENT_ABI: &str = include_str!("../../abi/Segment.json");
