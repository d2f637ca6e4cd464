//! Event decoding and historical event scanning.

mod decoder;
pub use decoder::{
    decode_log,
    decode_receipt,
};

mod scanner;
pub use scanner::{
    BlockRange,
    EventHistoryScanner,
    EventQuery,
    TOKEN_ID_PARAM,
};
