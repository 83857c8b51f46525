//! WSFE response parsing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::request::parse_date;
use crate::error::{AuthorityMessage, ProtocolError};
use crate::xml::{Element, SoapFault};

/// Authority code for "voucher not found" in `FECompConsultar`.
pub const NOT_FOUND_CODE: i64 = 602;

/// An approved authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Authorization code (CAE).
    pub code: String,
    /// Code expiry.
    pub expires_on: NaiveDate,
    /// Observations returned alongside the approval.
    pub observations: Vec<AuthorityMessage>,
}

/// A voucher as the authority has it recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultedVoucher {
    /// Number.
    pub number: u64,
    /// Authorization code.
    pub code: String,
    /// Code expiry.
    pub expires_on: NaiveDate,
    /// Issue date.
    pub issue_date: Option<NaiveDate>,
    /// Total.
    pub total: Option<Decimal>,
}

/// `FEDummy` server status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Application server.
    pub app_server: String,
    /// Database server.
    pub db_server: String,
    /// Authentication server.
    pub auth_server: String,
}

impl ServerStatus {
    /// Returns true if all three servers report OK.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        [&self.app_server, &self.db_server, &self.auth_server]
            .iter()
            .all(|s| s.eq_ignore_ascii_case("OK"))
    }
}

/// Parses the envelope and returns the `<method>Result` element.
fn result_element(body: &str, result: &str) -> Result<Element, ProtocolError> {
    let envelope = Element::parse(body)
        .map_err(|e| ProtocolError::transient(format!("unreadable response: {e}")))?;

    if let Some(fault) = SoapFault::from_envelope(&envelope) {
        let message = format!("{}: {}", fault.code, fault.message);
        return Err(if fault.code.ends_with("Client") {
            ProtocolError::rejected(vec![AuthorityMessage { code: 0, message }])
        } else {
            ProtocolError::transient(message)
        });
    }

    envelope
        .find(result)
        .cloned()
        .ok_or_else(|| ProtocolError::transient(format!("missing {result}")))
}

fn messages(parent: Option<&Element>, item: &str) -> Vec<AuthorityMessage> {
    parent
        .map(|p| {
            p.children_named(item)
                .map(|m| AuthorityMessage {
                    code: m
                        .child_text("Code")
                        .and_then(|c| c.parse().ok())
                        .unwrap_or_default(),
                    message: m.child_text("Msg").unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn errors(result: &Element) -> Vec<AuthorityMessage> {
    messages(result.child("Errors"), "Err")
}

/// Parses `FECompUltimoAutorizado`.
///
/// # Errors
///
/// Returns `Rejected` for authority errors and `Transient` for unreadable responses.
pub fn parse_last_authorized(body: &str) -> Result<u64, ProtocolError> {
    let result = result_element(body, "FECompUltimoAutorizadoResult")?;
    let errors = errors(&result);
    if !errors.is_empty() {
        return Err(ProtocolError::rejected(errors));
    }
    result
        .child_text("CbteNro")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ProtocolError::transient("missing CbteNro"))
}

/// Parses `FECAESolicitar`.
///
/// # Errors
///
/// - `Rejected` if the authority reported errors
/// - `Observed` if the voucher was not approved
/// - `Transient` if the response cannot be interpreted
pub fn parse_authorization(body: &str) -> Result<AuthorizationResult, ProtocolError> {
    let result = result_element(body, "FECAESolicitarResult")?;
    let detail = result.path(&["FeDetResp", "FECAEDetResponse"]);
    let observations = messages(detail.and_then(|d| d.child("Observaciones")), "Obs");

    let errors = errors(&result);
    if !errors.is_empty() {
        return Err(ProtocolError::rejected(
            errors.into_iter().chain(observations).collect(),
        ));
    }

    let detail = detail.ok_or_else(|| ProtocolError::transient("missing FECAEDetResponse"))?;
    match detail.child_text("Resultado") {
        Some("A") => {
            let code = detail
                .child_text("CAE")
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ProtocolError::transient("approved without CAE"))?;
            let expires_on = detail
                .child_text("CAEFchVto")
                .and_then(parse_date)
                .ok_or_else(|| ProtocolError::transient("approved without CAEFchVto"))?;
            Ok(AuthorizationResult {
                code: code.to_string(),
                expires_on,
                observations,
            })
        }
        Some("R") => Err(ProtocolError::observed(observations)),
        other => Err(ProtocolError::transient(format!(
            "unexpected Resultado {}",
            other.unwrap_or("<none>")
        ))),
    }
}

/// Parses `FECompConsultar`. A voucher unknown to the authority is `None`.
///
/// # Errors
///
/// Returns `Rejected` for other authority errors and `Transient` for
/// unreadable responses.
pub fn parse_consult(body: &str) -> Result<Option<ConsultedVoucher>, ProtocolError> {
    let result = result_element(body, "FECompConsultarResult")?;
    let errors = errors(&result);
    if errors.iter().any(|e| e.code == NOT_FOUND_CODE) {
        return Ok(None);
    }
    if !errors.is_empty() {
        return Err(ProtocolError::rejected(errors));
    }

    let get = result
        .child("ResultGet")
        .ok_or_else(|| ProtocolError::transient("missing ResultGet"))?;
    let code = get
        .child_text("CodAutorizacion")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ProtocolError::transient("missing CodAutorizacion"))?;
    let expires_on = get
        .child_text("FchVto")
        .and_then(parse_date)
        .ok_or_else(|| ProtocolError::transient("missing FchVto"))?;
    let number = get
        .child_text("CbteDesde")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ProtocolError::transient("missing CbteDesde"))?;

    Ok(Some(ConsultedVoucher {
        number,
        code: code.to_string(),
        expires_on,
        issue_date: get.child_text("CbteFch").and_then(parse_date),
        total: get
            .child_text("ImpTotal")
            .and_then(|t| Decimal::from_str(t).ok()),
    }))
}

/// Parses `FEDummy`.
///
/// # Errors
///
/// Returns `Transient` if the response cannot be interpreted.
pub fn parse_dummy(body: &str) -> Result<ServerStatus, ProtocolError> {
    let result = result_element(body, "FEDummyResult")?;
    let field = |name: &str| result.child_text(name).unwrap_or_default().to_string();
    Ok(ServerStatus {
        app_server: field("AppServer"),
        db_server: field("DbServer"),
        auth_server: field("AuthServer"),
    })
}
