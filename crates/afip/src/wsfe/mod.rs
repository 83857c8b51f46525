//! Electronic invoicing service (WSFE).

pub mod category;
pub mod client;
pub mod request;
pub mod response;

pub use category::{CategoryEncoder, encoder_for};
pub use client::{WsfeAuth, WsfeClient};
pub use request::{AuthorizationRequest, OptionalField};
pub use response::{AuthorizationResult, ConsultedVoucher, ServerStatus};
