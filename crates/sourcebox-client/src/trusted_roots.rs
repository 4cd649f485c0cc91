//! Bundled trusted organization keys.
//!
//! One hex-encoded Ed25519 key per line. Blank lines and lines starting with
//! `#` are ignored.

use std::path::Path;

use sourcebox_shared::keys::{PublicSigningKey, TrustedOrganization};

use crate::error::{ClientError, Result};

pub fn parse_trusted_roots(text: &str) -> Result<Vec<PublicSigningKey<TrustedOrganization>>> {
    let roots = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, hex)| {
            PublicSigningKey::from_hex(hex)
                .map_err(|source| ClientError::InvalidTrustedRoot { line, source })
        })
        .collect::<Result<Vec<_>>>()?;

    if roots.is_empty() {
        return Err(ClientError::NoTrustedRoots);
    }
    Ok(roots)
}

pub fn load_trusted_roots(path: &Path) -> Result<Vec<PublicSigningKey<TrustedOrganization>>> {
    let roots = parse_trusted_roots(&std::fs::read_to_string(path)?)?;
    tracing::info!(path = %path.display(), count = roots.len(), "Loaded trusted roots");
    Ok(roots)
}
