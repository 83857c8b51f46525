//! CMS signing of login ticket requests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::cms::{CMSOptions, CmsContentInfo};
use openssl::pkey::PKey;
use openssl::x509::X509;

use crate::error::AuthError;

/// Signs `document` as CMS signed-data with the content embedded, and
/// returns the DER encoding in base64.
///
/// Key and certificate are checked against each other first, so a
/// mismatched pair never reaches the network.
///
/// # Errors
///
/// Returns `SigningFailed` for unreadable material, a wrong password, a
/// certificate/key mismatch or a crypto library failure.
pub fn sign_ticket(
    document: &str,
    certificate_pem: &[u8],
    key_pem: &[u8],
    password: &[u8],
) -> Result<String, AuthError> {
    let certificate = X509::from_pem(certificate_pem)
        .map_err(|_| AuthError::SigningFailed("unreadable certificate".to_string()))?;
    let key = PKey::private_key_from_pem_passphrase(key_pem, password).map_err(|_| {
        AuthError::SigningFailed("unreadable private key or wrong password".to_string())
    })?;

    let public = certificate
        .public_key()
        .map_err(|e| AuthError::SigningFailed(e.to_string()))?;
    if !public.public_eq(&key) {
        return Err(AuthError::SigningFailed(
            "certificate does not match private key".to_string(),
        ));
    }

    let cms = CmsContentInfo::sign(
        Some(&*certificate),
        Some(&*key),
        None,
        Some(document.as_bytes()),
        CMSOptions::BINARY,
    )
    .map_err(|e| AuthError::SigningFailed(e.to_string()))?;
    let der = cms
        .to_der()
        .map_err(|e| AuthError::SigningFailed(e.to_string()))?;

    Ok(STANDARD.encode(der))
}
