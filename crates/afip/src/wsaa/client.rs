//! WSAA `loginCms` client.

use std::sync::Arc;

use facturo_core::credential::SessionTicket;
use tracing::{debug, warn};

use super::ticket::parse_login_ticket;
use crate::transport::SoapTransport;
use crate::xml::{Element, SoapFault, XmlError, XmlWriter};

const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WSAA_NS: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";

/// Fault code returned while a previous session is still valid.
pub const ALREADY_AUTHENTICATED: &str = "coe.alreadyAuthenticated";

/// Ways a login can fail once the request is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The authority still holds an unexpired session for this certificate.
    AlreadyAuthenticated(String),
    /// The authority refused the request.
    Rejected {
        /// Fault code.
        code: String,
        /// Fault message.
        message: String,
    },
    /// Transport failure or unreadable response.
    Transient(String),
}

/// Builds the `loginCms` envelope for a signed ticket.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn login_envelope(signed_ticket: &str) -> Result<String, XmlError> {
    let mut w = XmlWriter::new();
    w.open_with("soapenv:Envelope", &[("xmlns:soapenv", SOAP_ENV), ("xmlns:wsaa", WSAA_NS)])?;
    w.open("soapenv:Header")?;
    w.close("soapenv:Header")?;
    w.open("soapenv:Body")?;
    w.open("wsaa:loginCms")?;
    w.leaf("wsaa:in0", signed_ticket)?;
    w.close("wsaa:loginCms")?;
    w.close("soapenv:Body")?;
    w.close("soapenv:Envelope")?;
    w.finish()
}

/// Interprets a `loginCms` response body.
///
/// # Errors
///
/// Returns the fault or parse failure as a `LoginError`.
pub fn parse_login_response(body: &str) -> Result<SessionTicket, LoginError> {
    let envelope =
        Element::parse(body).map_err(|e| LoginError::Transient(format!("unreadable response: {e}")))?;

    if let Some(fault) = SoapFault::from_envelope(&envelope) {
        return Err(match fault.code.as_str() {
            ALREADY_AUTHENTICATED => LoginError::AlreadyAuthenticated(fault.message),
            "wsaa.unavailable" => LoginError::Transient(fault.message),
            _ => LoginError::Rejected {
                code: fault.code,
                message: fault.message,
            },
        });
    }

    let ticket = envelope
        .find("loginCmsReturn")
        .ok_or_else(|| LoginError::Transient("missing loginCmsReturn".to_string()))?;
    parse_login_ticket(&ticket.text).map_err(LoginError::Transient)
}

/// Client for the login endpoint.
#[derive(Clone)]
pub struct WsaaClient {
    transport: Arc<dyn SoapTransport>,
}

impl WsaaClient {
    /// Creates a client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn SoapTransport>) -> Self {
        Self { transport }
    }

    /// Exchanges a signed ticket for a session.
    ///
    /// # Errors
    ///
    /// Returns a `LoginError` describing the failure.
    pub async fn login(
        &self,
        endpoint: &str,
        signed_ticket: &str,
    ) -> Result<SessionTicket, LoginError> {
        let envelope = login_envelope(signed_ticket)
            .map_err(|e| LoginError::Transient(e.to_string()))?;

        debug!(endpoint, "Calling loginCms");
        let body = self
            .transport
            .call(endpoint, "", envelope)
            .await
            .map_err(|e| {
                warn!(endpoint, error = %e, "loginCms transport failure");
                LoginError::Transient(e.to_string())
            })?;

        parse_login_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlWriter;

    fn success(expiration: &str) -> String {
        let mut inner = XmlWriter::new();
        inner.declaration().unwrap();
        inner.open("loginTicketResponse").unwrap();
        inner.open("header").unwrap();
        inner.leaf("expirationTime", expiration).unwrap();
        inner.close("header").unwrap();
        inner.open("credentials").unwrap();
        inner.leaf("token", "VE9L\nRU4=").unwrap();
        inner.leaf("sign", "U0lH").unwrap();
        inner.close("credentials").unwrap();
        inner.close("loginTicketResponse").unwrap();
        let inner = inner.finish().unwrap();

        let mut w = XmlWriter::new();
        w.open("soapenv:Envelope").unwrap();
        w.open("soapenv:Body").unwrap();
        w.open("loginCmsResponse").unwrap();
        w.leaf("loginCmsReturn", inner).unwrap();
        w.close("loginCmsResponse").unwrap();
        w.close("soapenv:Body").unwrap();
        w.close("soapenv:Envelope").unwrap();
        w.finish().unwrap()
    }

    fn fault(code: &str, message: &str) -> String {
        format!(
            "<soapenv:Envelope xmlns:soapenv=\"{SOAP_ENV}\"><soapenv:Body><soapenv:Fault>\
             <faultcode xmlns:ns1=\"http://xml.apache.org/axis/\">ns1:{code}</faultcode>\
             <faultstring>{message}</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>"
        )
    }

    #[test]
    fn test_envelope_carries_ticket() {
        let envelope = login_envelope("TUlJRw==").unwrap();
        assert!(envelope.contains("<wsaa:in0>TUlJRw==</wsaa:in0>"));
        assert!(envelope.contains(WSAA_NS));
    }

    #[test]
    fn test_parse_success() {
        let ticket = parse_login_response(&success("2026-10-20T00:00:00-03:00")).unwrap();
        assert_eq!(ticket.token, "VE9LRU4=");
        assert_eq!(ticket.sign, "U0lH");
    }

    #[test]
    fn test_parse_faults() {
        assert_eq!(
            parse_login_response(&fault(ALREADY_AUTHENTICATED, "El CEE ya posee un TA valido")),
            Err(LoginError::AlreadyAuthenticated(
                "El CEE ya posee un TA valido".to_string()
            ))
        );
        assert_eq!(
            parse_login_response(&fault("cms.cert.untrusted", "Certificado no emitido por AC de confianza")),
            Err(LoginError::Rejected {
                code: "cms.cert.untrusted".to_string(),
                message: "Certificado no emitido por AC de confianza".to_string(),
            })
        );
        assert!(matches!(
            parse_login_response(&fault("wsaa.unavailable", "down")),
            Err(LoginError::Transient(_))
        ));
        assert!(matches!(
            parse_login_response("<html>502</html>"),
            Err(LoginError::Transient(_))
        ));
    }
}
