//! Login ticket request (TRA) and login ticket response.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use facturo_core::credential::SessionTicket;

use crate::xml::{Element, XmlError, XmlWriter};

/// Clock skew allowance applied to the generation time.
const GENERATION_SKEW_SECS: i64 = 60;

/// The document signed and exchanged for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicketRequest {
    /// Unique request id; seconds since the epoch.
    pub unique_id: i64,
    /// Start of the request's validity window.
    pub generation_time: DateTime<Utc>,
    /// End of the request's validity window.
    pub expiration_time: DateTime<Utc>,
    /// Target service name.
    pub service: String,
}

impl LoginTicketRequest {
    /// Builds a request valid from shortly before `now` until `now + ttl`.
    #[must_use]
    pub fn new(service: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            unique_id: now.timestamp(),
            generation_time: now - Duration::seconds(GENERATION_SKEW_SECS),
            expiration_time: now + ttl,
            service: service.into(),
        }
    }

    /// Renders the XML document.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut w = XmlWriter::new();
        w.declaration()?;
        w.open_with("loginTicketRequest", &[("version", "1.0")])?;
        w.open("header")?;
        w.leaf("uniqueId", self.unique_id.to_string())?;
        w.leaf("generationTime", timestamp(self.generation_time))?;
        w.leaf("expirationTime", timestamp(self.expiration_time))?;
        w.close("header")?;
        w.leaf("service", &self.service)?;
        w.close("loginTicketRequest")?;
        w.finish()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parses the login ticket response carried in `loginCmsReturn`.
///
/// Whitespace inside token and sign is removed; the authority wraps them.
///
/// # Errors
///
/// Returns a description of the missing or malformed part.
pub fn parse_login_ticket(document: &str) -> Result<SessionTicket, String> {
    let root = Element::parse(document).map_err(|e| e.to_string())?;

    let expiration = root
        .path(&["header", "expirationTime"])
        .ok_or("missing header/expirationTime")?;
    let expires_at = DateTime::parse_from_rfc3339(expiration.text.trim())
        .map_err(|e| format!("invalid expirationTime: {e}"))?
        .with_timezone(&Utc);

    let credentials = root.child("credentials").ok_or("missing credentials")?;
    let token = compact(credentials.child("token").ok_or("missing credentials/token")?);
    let sign = compact(credentials.child("sign").ok_or("missing credentials/sign")?);
    if token.is_empty() || sign.is_empty() {
        return Err("empty token or sign".to_string());
    }

    Ok(SessionTicket {
        token,
        sign,
        expires_at,
    })
}

fn compact(element: &Element) -> String {
    element.text.chars().filter(|c| !c.is_whitespace()).collect()
}
