//! Session authentication service (WSAA).
//!
//! A login ticket request is signed as CMS with the company's certificate
//! and exchanged for a token/sign pair valid for about twelve hours.

pub mod authenticator;
pub mod client;
pub mod signer;
pub mod ticket;

pub use authenticator::SessionAuthenticator;
pub use client::{LoginError, WsaaClient};
pub use signer::sign_ticket;
pub use ticket::LoginTicketRequest;
