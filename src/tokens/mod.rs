//! Token read models and the operations that assemble them.

mod fields;
pub use fields::{
    update_event_kinds,
    TokenField,
};

pub mod models;
pub use models::{
    BurnedToken,
    CreateTokenRequest,
    Document,
    DocumentPatch,
    Hierarchy,
    ProvenanceEntry,
    TokenBase,
    TokenReadModel,
    UpdateTokenRequest,
};

mod service;
pub use service::TokenService;
