//! Authority credentials: certificate, sealed private key and cached session.

pub mod cipher;
pub mod model;

pub use cipher::{CipherError, KeyCipher};
pub use model::{Credential, SessionBlock, SessionTicket, UnsealedKey};
