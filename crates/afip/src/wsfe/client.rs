//! WSFE client.

use std::sync::Arc;

use facturo_core::credential::SessionTicket;
use facturo_shared::types::Cuit;
use tracing::{debug, warn};

use super::request::AuthorizationRequest;
use super::response::{
    AuthorizationResult, ConsultedVoucher, ServerStatus, parse_authorization, parse_consult,
    parse_dummy, parse_last_authorized,
};
use crate::error::ProtocolError;
use crate::transport::SoapTransport;
use crate::xml::{XmlError, XmlWriter};

const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const FEV1_NS: &str = "http://ar.gov.afip.dif.FEV1/";

/// Credentials sent in every WSFE call.
#[derive(Debug, Clone)]
pub struct WsfeAuth<'a> {
    /// Session ticket.
    pub ticket: &'a SessionTicket,
    /// Issuer CUIT.
    pub cuit: &'a Cuit,
}

fn envelope(
    method: &str,
    auth: Option<&WsfeAuth<'_>>,
    body: impl FnOnce(&mut XmlWriter) -> Result<(), XmlError>,
) -> Result<String, ProtocolError> {
    let render = || -> Result<String, XmlError> {
        let mut w = XmlWriter::new();
        w.open_with("soap:Envelope", &[("xmlns:soap", SOAP_ENV), ("xmlns:ar", FEV1_NS)])?;
        w.open("soap:Header")?;
        w.close("soap:Header")?;
        w.open("soap:Body")?;
        let element = format!("ar:{method}");
        w.open(&element)?;
        if let Some(auth) = auth {
            w.open("ar:Auth")?;
            w.leaf("ar:Token", &auth.ticket.token)?;
            w.leaf("ar:Sign", &auth.ticket.sign)?;
            w.leaf("ar:Cuit", auth.cuit.digits())?;
            w.close("ar:Auth")?;
        }
        body(&mut w)?;
        w.close(&element)?;
        w.close("soap:Body")?;
        w.close("soap:Envelope")?;
        w.finish()
    };
    render().map_err(|e| ProtocolError::transient(e.to_string()))
}

/// Client for the invoicing endpoint.
#[derive(Clone)]
pub struct WsfeClient {
    transport: Arc<dyn SoapTransport>,
}

impl WsfeClient {
    /// Creates a client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn SoapTransport>) -> Self {
        Self { transport }
    }

    async fn call(&self, endpoint: &str, method: &str, envelope: String) -> Result<String, ProtocolError> {
        let action = format!("{FEV1_NS}{method}");
        debug!(endpoint, method, "Calling WSFE");
        self.transport
            .call(endpoint, &action, envelope)
            .await
            .map_err(|e| {
                warn!(endpoint, method, error = %e, "WSFE transport failure");
                ProtocolError::transient(e.to_string())
            })
    }

    /// Last number the authority authorized for a sales point and type.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` classifying the failure.
    pub async fn last_authorized_number(
        &self,
        endpoint: &str,
        auth: &WsfeAuth<'_>,
        sales_point: u16,
        voucher_type: u16,
    ) -> Result<u64, ProtocolError> {
        let envelope = envelope("FECompUltimoAutorizado", Some(auth), |w| {
            w.leaf("ar:PtoVta", sales_point.to_string())?;
            w.leaf("ar:CbteTipo", voucher_type.to_string())
        })?;
        let body = self.call(endpoint, "FECompUltimoAutorizado", envelope).await?;
        parse_last_authorized(&body)
    }

    /// Requests an authorization code for one voucher.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` classifying the failure.
    pub async fn authorize(
        &self,
        endpoint: &str,
        auth: &WsfeAuth<'_>,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationResult, ProtocolError> {
        let envelope = envelope("FECAESolicitar", Some(auth), |w| request.write(w))?;
        let body = self.call(endpoint, "FECAESolicitar", envelope).await?;
        parse_authorization(&body)
    }

    /// Looks up an authorized voucher. `None` if the authority has no record.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` classifying the failure.
    pub async fn consult(
        &self,
        endpoint: &str,
        auth: &WsfeAuth<'_>,
        sales_point: u16,
        voucher_type: u16,
        number: u64,
    ) -> Result<Option<ConsultedVoucher>, ProtocolError> {
        let envelope = envelope("FECompConsultar", Some(auth), |w| {
            w.open("ar:FeCompConsReq")?;
            w.leaf("ar:CbteTipo", voucher_type.to_string())?;
            w.leaf("ar:CbteNro", number.to_string())?;
            w.leaf("ar:PtoVta", sales_point.to_string())?;
            w.close("ar:FeCompConsReq")
        })?;
        let body = self.call(endpoint, "FECompConsultar", envelope).await?;
        parse_consult(&body)
    }

    /// Checks the service's servers. Needs no session.
    ///
    /// # Errors
    ///
    /// Returns a `ProtocolError` classifying the failure.
    pub async fn dummy(&self, endpoint: &str) -> Result<ServerStatus, ProtocolError> {
        let envelope = envelope("FEDummy", None, |_| Ok(()))?;
        let body = self.call(endpoint, "FEDummy", envelope).await?;
        parse_dummy(&body)
    }
}
