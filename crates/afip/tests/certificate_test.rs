//! Certificate request and installation through the service.

mod common;

use common::{COMPANY_CUIT, FakeAfip, Harness, identity, issue};
use facturo_afip::FiscalError;
use facturo_core::certificate::{CertificateStatus, KeySource, ValidationError};
use facturo_core::store::CredentialStore;
use facturo_shared::AfipEnvironment;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};

#[tokio::test]
async fn test_request_then_install() {
    let harness = Harness::bare(FakeAfip::new());
    let identity = identity(COMPANY_CUIT);

    let request = harness
        .service
        .generate_request(harness.company_id, &identity)
        .await
        .unwrap();
    assert!(
        harness
            .store
            .pending_key(harness.company_id)
            .await
            .unwrap()
            .is_some()
    );

    let certificate = issue(&request.csr_pem, -1, 365);
    let credential = harness
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

    assert_eq!(credential.cuit, identity.cuit);
    assert_ne!(credential.sealed_private_key, "");
    assert!(!credential.sealed_private_key.contains("PRIVATE KEY"));
    assert!(
        harness
            .store
            .pending_key(harness.company_id)
            .await
            .unwrap()
            .is_none()
    );

    // The installed credential can sign a login.
    harness
        .service
        .acquire_session(harness.company_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_install_without_request() {
    let harness = Harness::bare(FakeAfip::new());
    let other = Harness::bare(FakeAfip::new());
    let identity = identity(COMPANY_CUIT);
    let request = other
        .service
        .generate_request(other.company_id, &identity)
        .await
        .unwrap();
    let certificate = issue(&request.csr_pem, -1, 365);

    let err = harness
        .service
        .install(
            harness.company_id,
            &identity,
            &certificate,
            None,
            AfipEnvironment::Sandbox,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FiscalError::Validation(ValidationError::KeyUnavailable(_))
    ));
}

#[tokio::test]
async fn test_identity_mismatch_saves_nothing() {
    let harness = Harness::bare(FakeAfip::new());
    let request = harness
        .service
        .generate_request(harness.company_id, &identity(COMPANY_CUIT))
        .await
        .unwrap();
    let certificate = issue(&request.csr_pem, -1, 365);

    let err = harness
        .service
        .install(
            harness.company_id,
            &identity("20-22222222-3"),
            &certificate,
            None,
            AfipEnvironment::Sandbox,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FiscalError::Validation(ValidationError::IdentityMismatch { .. })
    ));
    assert!(
        harness
            .store
            .find_by_company(harness.company_id)
            .await
            .unwrap()
            .is_none()
    );
    // The pending key survives a failed attempt.
    assert!(
        harness
            .store
            .pending_key(harness.company_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_install_provided_key() {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "AR").unwrap();
    name.append_entry_by_text("O", "Ferreteria El Tornillo SRL").unwrap();
    name.append_entry_by_text("CN", "facturo").unwrap();
    name.append_entry_by_text("serialNumber", "CUIT 20111111112")
        .unwrap();
    let name = name.build();
    let mut req = X509ReqBuilder::new().unwrap();
    req.set_subject_name(&name).unwrap();
    req.set_pubkey(&key).unwrap();
    req.sign(&key, MessageDigest::sha256()).unwrap();
    let csr = String::from_utf8(req.build().to_pem().unwrap()).unwrap();
    let certificate = issue(&csr, -1, 10);

    let pem = String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    let harness = Harness::with_provided_key(
        FakeAfip::new(),
        KeySource::Provided {
            pem,
            password: None,
        },
        &certificate,
    )
    .await;

    let status = harness
        .service
        .certificate_status(harness.company_id)
        .await
        .unwrap();
    assert!(matches!(status, CertificateStatus::ExpiringSoon { days_left } if days_left <= 10));
}

#[tokio::test]
async fn test_certificate_status_valid() {
    let harness = Harness::installed(FakeAfip::new()).await;
    let status = harness
        .service
        .certificate_status(harness.company_id)
        .await
        .unwrap();
    assert!(matches!(status, CertificateStatus::Valid { days_left } if days_left >= 360));
    assert!(status.is_usable());
}
