// src/cert.rs
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("unparsable certificate: {0}")]
    Unparsable(String),
}

/// Extract the DNS subject-alternative-names from a DER certificate.
///
/// Names are returned in extension order; general-name forms other than
/// dNSName (IP, email, URI, ...) are discarded. A certificate without a SAN
/// extension yields an empty list, which is not an error.
pub fn dns_names(der: &[u8]) -> Result<Vec<String>, CertError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| CertError::Unparsable(format!("{e:?}")))?;

    let mut names = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for general_name in &san.general_names {
                if let GeneralName::DNSName(dns_name) = general_name {
                    names.push(dns_name.to_string());
                }
            }
        }
    }

    Ok(names)
}

/// SHA-256 fingerprint of the DER bytes, lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}
