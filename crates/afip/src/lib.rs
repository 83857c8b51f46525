//! Tax authority (AFIP) integration for Facturo.
//!
//! - [`wsaa`]: login ticket signing and the per-company session cache
//! - [`wsfe`]: electronic voucher authorization protocol
//! - [`service`]: the operations the rest of the system calls
//!
//! Remote calls go through [`transport::SoapTransport`] so they can be
//! replaced in tests.

pub mod error;
pub mod service;
pub mod transport;
pub mod wsaa;
pub mod wsfe;
pub mod xml;

pub use error::{AuthError, AuthorityMessage, FiscalError, ProtocolError, ProtocolErrorKind};
pub use service::{AuthorizationOutcome, FiscalService};
pub use transport::{HttpTransport, SoapTransport, TransportError};
