//! Certificate signing request generation.

use facturo_shared::types::Cuit;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Name, X509NameBuilder, X509Req, X509ReqBuilder};
use serde::{Deserialize, Serialize};

const KEY_BITS: u32 = 2048;

/// The company data a certificate is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyIdentity {
    /// Tax identifier, embedded as the subject serial number.
    pub cuit: Cuit,
    /// Legal name, embedded as the organization.
    pub legal_name: String,
    /// Certificate alias, embedded as the common name.
    pub alias: String,
}

/// Value of the subject serial number for a CUIT.
#[must_use]
pub fn subject_serial(cuit: &Cuit) -> String {
    format!("CUIT {}", cuit.digits())
}

pub(crate) fn subject_name(identity: &CompanyIdentity) -> Result<X509Name, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COUNTRYNAME, "AR")?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &identity.legal_name)?;
    name.append_entry_by_nid(Nid::COMMONNAME, &identity.alias)?;
    name.append_entry_by_nid(Nid::SERIALNUMBER, &subject_serial(&identity.cuit))?;
    Ok(name.build())
}

pub(crate) fn generate_key() -> Result<PKey<Private>, ErrorStack> {
    PKey::from_rsa(Rsa::generate(KEY_BITS)?)
}

pub(crate) fn build_request(
    identity: &CompanyIdentity,
    key: &PKey<Private>,
) -> Result<X509Req, ErrorStack> {
    let mut builder = X509ReqBuilder::new()?;
    builder.set_version(0)?;
    let name = subject_name(identity)?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(key)?;
    builder.sign(key, MessageDigest::sha256())?;
    Ok(builder.build())
}

/// A generated request and the sealed key it was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    /// PKCS#10 request, PEM, to upload to the authority.
    pub csr_pem: String,
    /// PKCS#8 private key PEM sealed with the key encryption key.
    pub sealed_key: String,
}
