//! Shared fixtures: an in-process fake of the authority's endpoints,
//! certificates issued by a throwaway CA, and voucher builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use facturo_afip::xml::{Element, XmlWriter};
use facturo_afip::{FiscalService, SoapTransport, TransportError};
use facturo_core::certificate::{CompanyIdentity, KeySource};
use facturo_core::credential::KeyCipher;
use facturo_core::store::MemoryStore;
use facturo_core::voucher::{
    Authorization, Concept, Counterparty, Letter, Voucher, VoucherAmounts, VoucherCategory,
    VoucherKind, VoucherStatus, VoucherType,
};
use facturo_shared::types::{CompanyId, Cuit, Currency, VoucherId};
use facturo_shared::{AfipConfig, AfipEnvironment};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder, X509Req};
use rust_decimal::Decimal;

pub const COMPANY_CUIT: &str = "20-11111111-2";

/// How the fake answers the next `FECAESolicitar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeMode {
    /// Records the voucher and returns the CAE.
    Approve,
    /// Answers with an authority error.
    Reject,
    /// Records the voucher, then drops the response.
    LoseResponse,
    /// Drops the request without recording anything.
    Unreachable,
    /// Records the voucher, drops the response and stops answering
    /// last-number queries.
    Blackout,
    /// Answers with an expired-token error.
    SessionExpired,
}

/// How the fake answers `loginCms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Grant,
    AlreadyAuthenticated,
}

#[derive(Debug, Clone)]
struct Recorded {
    code: String,
    total: String,
    issue_date: String,
}

#[derive(Debug)]
struct State {
    last: HashMap<(u16, u16), u64>,
    recorded: HashMap<(u16, u16, u64), Recorded>,
    login: LoginMode,
    authorize: VecDeque<AuthorizeMode>,
    last_authorized_down: bool,
    calls: Vec<String>,
    next_code: u64,
}

/// Fake WSAA + WSFE endpoints.
///
/// Approves a voucher only when its number is the last authorized plus one.
pub struct FakeAfip {
    state: Mutex<State>,
    login_delay: Duration,
}

impl FakeAfip {
    pub fn new() -> Arc<Self> {
        Self::with_login_delay(Duration::ZERO)
    }

    pub fn with_login_delay(login_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                last: HashMap::new(),
                recorded: HashMap::new(),
                login: LoginMode::Grant,
                authorize: VecDeque::new(),
                last_authorized_down: false,
                calls: Vec::new(),
                next_code: 76_423_412_345_600,
            }),
            login_delay,
        })
    }

    pub fn set_login(&self, mode: LoginMode) {
        self.state.lock().unwrap().login = mode;
    }

    pub fn queue_authorize(&self, mode: AuthorizeMode) {
        self.state.lock().unwrap().authorize.push_back(mode);
    }

    pub fn set_last(&self, sales_point: u16, voucher_type: u16, number: u64) {
        self.state
            .lock()
            .unwrap()
            .last
            .insert((sales_point, voucher_type), number);
    }

    pub fn last(&self, sales_point: u16, voucher_type: u16) -> u64 {
        self.state
            .lock()
            .unwrap()
            .last
            .get(&(sales_point, voucher_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_last_authorized_down(&self, down: bool) {
        self.state.lock().unwrap().last_authorized_down = down;
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|m| *m == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    fn login(&self) -> Result<String, TransportError> {
        match self.state.lock().unwrap().login {
            LoginMode::Grant => Ok(login_success()),
            LoginMode::AlreadyAuthenticated => Ok(soap_fault(
                "ns1:coe.alreadyAuthenticated",
                "El CEE ya posee un TA valido para el acceso al WSN solicitado",
            )),
        }
    }

    fn last_authorized(&self, request: &Element) -> Result<String, TransportError> {
        let state = self.state.lock().unwrap();
        if state.last_authorized_down {
            return Err(TransportError::Timeout);
        }
        let key = (field(request, "PtoVta"), field(request, "CbteTipo"));
        let last = state.last.get(&key).copied().unwrap_or(0);
        Ok(wsfe_result(
            "FECompUltimoAutorizado",
            &format!(
                "<PtoVta>{}</PtoVta><CbteTipo>{}</CbteTipo><CbteNro>{last}</CbteNro>",
                key.0, key.1
            ),
        ))
    }

    fn authorize(&self, request: &Element) -> Result<String, TransportError> {
        let mut state = self.state.lock().unwrap();
        let mode = state.authorize.pop_front().unwrap_or(AuthorizeMode::Approve);
        let sales_point = field(request, "PtoVta");
        let voucher_type = field(request, "CbteTipo");
        let number: u64 = field(request, "CbteDesde");

        match mode {
            AuthorizeMode::Unreachable => return Err(TransportError::Timeout),
            AuthorizeMode::Reject => {
                return Ok(wsfe_result(
                    "FECAESolicitar",
                    "<Errors><Err><Code>10048</Code><Msg>ImpTotal no coincide</Msg></Err></Errors>",
                ));
            }
            AuthorizeMode::SessionExpired => {
                return Ok(wsfe_result(
                    "FECAESolicitar",
                    "<Errors><Err><Code>600</Code><Msg>ValidacionDeToken: token expirado</Msg></Err></Errors>",
                ));
            }
            AuthorizeMode::Approve | AuthorizeMode::LoseResponse | AuthorizeMode::Blackout => {}
        }

        let last = state
            .last
            .get(&(sales_point, voucher_type))
            .copied()
            .unwrap_or(0);
        if number != last + 1 {
            return Ok(wsfe_result(
                "FECAESolicitar",
                "<FeDetResp><FECAEDetResponse><Resultado>R</Resultado><CAE></CAE>\
                 <Observaciones><Obs><Code>10016</Code>\
                 <Msg>El numero o fecha del comprobante no se corresponde con el proximo a autorizar</Msg>\
                 </Obs></Observaciones></FECAEDetResponse></FeDetResp>",
            ));
        }

        state.next_code += 1;
        let code = state.next_code.to_string();
        state.last.insert((sales_point, voucher_type), number);
        state.recorded.insert(
            (sales_point, voucher_type, number),
            Recorded {
                code: code.clone(),
                total: text(request, "ImpTotal"),
                issue_date: text(request, "CbteFch"),
            },
        );

        match mode {
            AuthorizeMode::LoseResponse => return Err(TransportError::Timeout),
            AuthorizeMode::Blackout => {
                state.last_authorized_down = true;
                return Err(TransportError::Timeout);
            }
            _ => {}
        }
        Ok(wsfe_result(
            "FECAESolicitar",
            &format!(
                "<FeDetResp><FECAEDetResponse><CbteDesde>{number}</CbteDesde><Resultado>A</Resultado>\
                 <CAE>{code}</CAE><CAEFchVto>20261029</CAEFchVto></FECAEDetResponse></FeDetResp>"
            ),
        ))
    }

    fn consult(&self, request: &Element) -> Result<String, TransportError> {
        let state = self.state.lock().unwrap();
        let key = (
            field(request, "PtoVta"),
            field(request, "CbteTipo"),
            field(request, "CbteNro"),
        );
        Ok(match state.recorded.get(&key) {
            Some(recorded) => wsfe_result(
                "FECompConsultar",
                &format!(
                    "<ResultGet><CbteDesde>{}</CbteDesde><CbteFch>{}</CbteFch><ImpTotal>{}</ImpTotal>\
                     <CodAutorizacion>{}</CodAutorizacion><FchVto>20261029</FchVto></ResultGet>",
                    key.2, recorded.issue_date, recorded.total, recorded.code
                ),
            ),
            None => wsfe_result(
                "FECompConsultar",
                "<Errors><Err><Code>602</Code><Msg>No existen datos en nuestros registros</Msg></Err></Errors>",
            ),
        })
    }
}

#[async_trait]
impl SoapTransport for FakeAfip {
    async fn call(
        &self,
        _endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<String, TransportError> {
        let method = if action.is_empty() {
            "loginCms".to_string()
        } else {
            action.rsplit('/').next().unwrap_or(action).to_string()
        };
        self.state.lock().unwrap().calls.push(method.clone());

        if method == "loginCms" {
            if !self.login_delay.is_zero() {
                tokio::time::sleep(self.login_delay).await;
            }
            return self.login();
        }

        let request = Element::parse(&envelope)
            .map_err(|e| TransportError::Connection(format!("bad request: {e}")))?;
        match method.as_str() {
            "FECompUltimoAutorizado" => self.last_authorized(&request),
            "FECAESolicitar" => self.authorize(&request),
            "FECompConsultar" => self.consult(&request),
            "FEDummy" => Ok(wsfe_result(
                "FEDummy",
                "<AppServer>OK</AppServer><DbServer>OK</DbServer><AuthServer>OK</AuthServer>",
            )),
            other => Err(TransportError::Status {
                status: 404,
                body: format!("unknown action {other}"),
            }),
        }
    }
}

fn text(request: &Element, name: &str) -> String {
    request
        .find(name)
        .map(|e| e.text.clone())
        .unwrap_or_default()
}

fn field<T: std::str::FromStr + Default>(request: &Element, name: &str) -> T {
    text(request, name).parse().unwrap_or_default()
}

fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <soap:Body>{body}</soap:Body></soap:Envelope>"
    )
}

fn wsfe_result(method: &str, inner: &str) -> String {
    envelope(&format!(
        "<{method}Response xmlns=\"http://ar.gov.afip.dif.FEV1/\">\
         <{method}Result>{inner}</{method}Result></{method}Response>"
    ))
}

fn soap_fault(code: &str, message: &str) -> String {
    envelope(&format!(
        "<soap:Fault><faultcode>{code}</faultcode><faultstring>{message}</faultstring></soap:Fault>"
    ))
}

fn login_success() -> String {
    let expires = (Utc::now() + chrono::Duration::hours(12)).to_rfc3339();
    let mut ticket = XmlWriter::new();
    ticket.declaration().unwrap();
    ticket.open_with("loginTicketResponse", &[("version", "1.0")]).unwrap();
    ticket.open("header").unwrap();
    ticket.leaf("expirationTime", &expires).unwrap();
    ticket.close("header").unwrap();
    ticket.open("credentials").unwrap();
    ticket.leaf("token", "UEQ5NGJtMXNJSFpsY25OcGIyNDlJakV1TUNJ").unwrap();
    ticket.leaf("sign", "Wm9NcTNqY0dzRDR0SW1ZbjI=").unwrap();
    ticket.close("credentials").unwrap();
    ticket.close("loginTicketResponse").unwrap();
    let ticket = ticket.finish().unwrap();

    let mut w = XmlWriter::new();
    w.open_with(
        "soapenv:Envelope",
        &[("xmlns:soapenv", "http://schemas.xmlsoap.org/soap/envelope/")],
    )
    .unwrap();
    w.open("soapenv:Body").unwrap();
    w.open("loginCmsResponse").unwrap();
    w.leaf("loginCmsReturn", ticket).unwrap();
    w.close("loginCmsResponse").unwrap();
    w.close("soapenv:Body").unwrap();
    w.close("soapenv:Envelope").unwrap();
    w.finish().unwrap()
}

pub fn identity(cuit: &str) -> CompanyIdentity {
    CompanyIdentity {
        cuit: Cuit::parse(cuit).unwrap(),
        legal_name: "Ferreteria El Tornillo SRL".to_string(),
        alias: "facturo".to_string(),
    }
}

/// Signs `csr_pem` with a throwaway CA, valid between the two day offsets.
pub fn issue(csr_pem: &str, from_days: i64, to_days: i64) -> String {
    let ca_key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut issuer = X509NameBuilder::new().unwrap();
    issuer.append_entry_by_text("O", "Test CA").unwrap();
    issuer.append_entry_by_text("CN", "Computadores Test").unwrap();
    let issuer = issuer.build();

    let req = X509Req::from_pem(csr_pem.as_bytes()).unwrap();
    let now = Utc::now().timestamp();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(req.subject_name()).unwrap();
    builder.set_issuer_name(&issuer).unwrap();
    builder.set_pubkey(&req.public_key().unwrap()).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(now + from_days * 86_400).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(now + to_days * 86_400).unwrap())
        .unwrap();
    builder.sign(&ca_key, MessageDigest::sha256()).unwrap();
    String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
}

pub fn config() -> AfipConfig {
    AfipConfig {
        wsaa_url: Some("https://wsaa.test/ws/services/LoginCms".to_string()),
        wsfe_url: Some("https://wsfe.test/wsfev1/service.asmx".to_string()),
        ..AfipConfig::default()
    }
}

pub struct Harness {
    pub service: Arc<FiscalService>,
    pub store: Arc<MemoryStore>,
    pub afip: Arc<FakeAfip>,
    pub company_id: CompanyId,
}

impl Harness {
    /// Service with no credential installed yet.
    pub fn bare(afip: Arc<FakeAfip>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let service = FiscalService::new(
            config(),
            KeyCipher::new([7u8; 32]),
            store.clone(),
            store.clone(),
            afip.clone(),
        );
        Self {
            service: Arc::new(service),
            store,
            afip,
            company_id: CompanyId::new(),
        }
    }

    /// Service with a valid certificate installed for [`COMPANY_CUIT`].
    pub async fn installed(afip: Arc<FakeAfip>) -> Self {
        let harness = Self::bare(afip);
        let identity = identity(COMPANY_CUIT);
        let request = harness
            .service
            .generate_request(harness.company_id, &identity)
            .await
            .unwrap();
        let certificate = issue(&request.csr_pem, -1, 365);
        harness
            .service
            .install(
                harness.company_id,
                &identity,
                &certificate,
                None,
                AfipEnvironment::Sandbox,
            )
            .await
            .unwrap();
        harness
    }

    pub async fn with_provided_key(afip: Arc<FakeAfip>, key: KeySource, certificate: &str) -> Self {
        let harness = Self::bare(afip);
        harness
            .service
            .install(
                harness.company_id,
                &identity(COMPANY_CUIT),
                certificate,
                Some(key),
                AfipEnvironment::Sandbox,
            )
            .await
            .unwrap();
        harness
    }

    /// Stores a draft voucher and returns its id.
    pub fn draft(&self, voucher_type: VoucherType, total: Decimal, linked: Option<VoucherId>) -> VoucherId {
        let voucher = draft(self.company_id, voucher_type, total, linked);
        let id = voucher.id;
        self.store.put_voucher(voucher);
        id
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn invoice_c() -> VoucherType {
    VoucherType::new(VoucherKind::Invoice, Letter::C)
}

pub fn credit_note_c() -> VoucherType {
    VoucherType::new(VoucherKind::CreditNote, Letter::C)
}

pub fn debit_note_c() -> VoucherType {
    VoucherType::new(VoucherKind::DebitNote, Letter::C)
}

pub fn draft(
    company_id: CompanyId,
    voucher_type: VoucherType,
    total: Decimal,
    linked: Option<VoucherId>,
) -> Voucher {
    Voucher {
        id: VoucherId::new(),
        company_id,
        voucher_type,
        category: VoucherCategory::Standard,
        sales_point: 2,
        number: None,
        pending_number: None,
        issue_date: Utc::now().date_naive(),
        concept: Concept::Products,
        service_period: None,
        counterparty: Counterparty::final_consumer(),
        currency: Currency::Ars,
        exchange_rate: Decimal::ONE,
        amounts: VoucherAmounts::without_vat(total),
        authorization: None,
        linked_voucher_id: linked,
        balance_pending: None,
        balance_status: None,
        status: VoucherStatus::Draft,
    }
}

/// An invoice already authorized outside the service.
pub fn authorized_invoice(company_id: CompanyId, total: Decimal, number: u64) -> Voucher {
    let mut voucher = draft(company_id, invoice_c(), total, None);
    voucher.number = Some(number);
    voucher.status = VoucherStatus::Authorized;
    voucher.authorization = Some(Authorization {
        code: "76423412345001".to_string(),
        expires_on: date(2026, 10, 29),
        authorized_at: Utc::now(),
    });
    voucher
}
