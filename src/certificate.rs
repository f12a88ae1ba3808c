//! Client certificate materialization.
//!
//! Deploy environments hand us certificate material in inconsistent shapes:
//! a base64 blob in an environment variable (often stripped of its line
//! breaks or padding by whatever copied it there), a path to a PEM file, or
//! nothing at all. This module normalizes all of that into one validated
//! PEM on disk with owner-only permissions, so the connection chain only
//! ever sees a pass/fail result.
//!
//! Repair heuristics are deliberately bounded: one padding fix for base64,
//! one reflow pass for missing line breaks. Anything else fails with a
//! matchable [`CertificateError`] and the chain skips certificate rungs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::CertificateConfig;
use crate::error::CertificateError;

const BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const END_MARKER: &str = "-----END CERTIFICATE-----";

/// Canonical file name under the certificate directory.
const CANONICAL_NAME: &str = "client.pem";
/// Secondary well-known copy kept byte-identical for older consumers.
const SECONDARY_NAME: &str = "store-client.pem";

/// Well-known location probed when neither an inline blob nor a path is
/// configured. Deploy images that bake the certificate in rely on this.
const SYSTEM_FALLBACK_PATH: &str = "/etc/lodestone/client.pem";

/// A validated on-disk certificate ready for the TLS strategies.
#[derive(Debug, Clone)]
pub struct MaterializedCert {
    pub path: PathBuf,
    pub source: CertSource,
}

/// Where the certificate material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertSource {
    /// Decoded from a configured base64 blob.
    Environment,
    /// Read from a configured or well-known file path.
    File,
}

/// Materialize the configured certificate, if any.
///
/// Returns `Ok(None)` when no source is configured and no well-known file
/// exists; that is not an error, the connection chain simply skips the
/// certificate strategies.
pub fn materialize(
    config: &CertificateConfig,
) -> Result<Option<MaterializedCert>, CertificateError> {
    if let Some(ref blob) = config.inline {
        let cert = materialize_inline(blob, &config.dir)?;
        return Ok(Some(cert));
    }

    if let Some(ref path) = config.path {
        let cert = validate_file(path)?;
        return Ok(Some(cert));
    }

    // No source configured: probe well-known locations.
    let probes = [
        config.dir.join(CANONICAL_NAME),
        config.dir.join(SECONDARY_NAME),
        PathBuf::from(SYSTEM_FALLBACK_PATH),
    ];
    for probe in &probes {
        if probe.is_file() {
            debug!(path = %probe.display(), "using certificate from well-known location");
            return validate_file(probe).map(Some);
        }
    }

    debug!("no certificate configured and no well-known file present");
    Ok(None)
}

/// Decode, validate, reflow, and write an inline base64 blob.
fn materialize_inline(blob: &str, dir: &Path) -> Result<MaterializedCert, CertificateError> {
    let decoded = decode_base64(blob)?;
    let text = String::from_utf8(decoded)
        .map_err(|e| CertificateError::Decode(format!("decoded blob is not UTF-8: {e}")))?;

    if !text.contains(BEGIN_MARKER) || !text.contains(END_MARKER) {
        return Err(CertificateError::Format);
    }

    let pem = reflow_pem(&text)?;

    fs::create_dir_all(dir)?;
    let canonical = dir.join(CANONICAL_NAME);
    let secondary = dir.join(SECONDARY_NAME);
    write_restricted(&canonical, pem.as_bytes())?;
    write_restricted(&secondary, pem.as_bytes())?;

    debug!(
        path = %canonical.display(),
        lines = pem.lines().count(),
        "client certificate materialized"
    );

    Ok(MaterializedCert {
        path: canonical,
        source: CertSource::Environment,
    })
}

/// Decode base64 with whitespace stripped. On failure, retry once with
/// `=` padding appended to the correct length.
fn decode_base64(blob: &str) -> Result<Vec<u8>, CertificateError> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();

    match BASE64.decode(compact.as_bytes()) {
        Ok(bytes) => Ok(bytes),
        Err(first_err) => {
            let remainder = compact.len() % 4;
            if remainder == 0 {
                return Err(CertificateError::Decode(first_err.to_string()));
            }
            debug!("base64 decode failed; retrying once with repaired padding");
            let padded = format!("{}{}", compact, "=".repeat(4 - remainder));
            BASE64
                .decode(padded.as_bytes())
                .map_err(|e| CertificateError::Decode(e.to_string()))
        }
    }
}

/// Put the delimiters on their own lines and wrap the body at 64
/// characters. Naive copy-paste encodings commonly flatten the PEM onto
/// one line; servers reject that.
fn reflow_pem(text: &str) -> Result<String, CertificateError> {
    let begin = text.find(BEGIN_MARKER).ok_or(CertificateError::Format)?;
    let body_start = begin + BEGIN_MARKER.len();
    let end = text.find(END_MARKER).ok_or(CertificateError::Format)?;
    if end < body_start {
        return Err(CertificateError::Format);
    }

    let body: String = text[body_start..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Err(CertificateError::Format);
    }

    let mut out = String::with_capacity(text.len() + body.len() / 64 + 4);
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    let bytes = body.as_bytes();
    for chunk in bytes.chunks(64) {
        // body is filtered ASCII base64, chunks stay on char boundaries
        out.push_str(std::str::from_utf8(chunk).map_err(|_| CertificateError::Format)?);
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out.push('\n');
    Ok(out)
}

/// Confirm a configured file exists and holds a certificate.
fn validate_file(path: &Path) -> Result<MaterializedCert, CertificateError> {
    if !path.is_file() {
        return Err(CertificateError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    if !text.contains(BEGIN_MARKER) || !text.contains(END_MARKER) {
        return Err(CertificateError::Format);
    }
    debug!(path = %path.display(), "certificate file validated");
    Ok(MaterializedCert {
        path: path.to_path_buf(),
        source: CertSource::File,
    })
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<(), CertificateError> {
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), "unable to set certificate permissions: {e}");
        }
    }
    Ok(())
}
