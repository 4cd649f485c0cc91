//! `sourcebox`: verify a key document and a dead drop document against the
//! configured trusted roots and print what a client would accept.

use std::fs;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use sourcebox_client::{load_trusted_roots, ClientConfig};
use sourcebox_shared::{DeadDropData, PublicKeysData, VerifiedDeadDrops, VerifiedPublicKeys};

fn main() -> anyhow::Result<()> {
    sourcebox_client::init_tracing();

    info!("Starting sourcebox v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let roots_path = config
        .trusted_roots_path
        .as_ref()
        .context("SOURCEBOX_TRUSTED_ROOTS must point at the trusted roots file")?;
    let trusted_roots = load_trusted_roots(roots_path)?;

    let keys_path = config
        .public_keys_path
        .as_ref()
        .context("SOURCEBOX_PUBLIC_KEYS must point at a public keys document")?;
    let data: PublicKeysData = serde_json::from_slice(
        &fs::read(keys_path).with_context(|| format!("reading {}", keys_path.display()))?,
    )?;

    let now = Utc::now();
    let keys = VerifiedPublicKeys::from_public_keys_data(&data, &trusted_roots, now)
        .context("no key hierarchy verified")?;

    println!("Verified {} key hierarchies", keys.hierarchies().len());
    println!("CoverNode messaging keys: {}", keys.latest_covernode_messaging_keys(now).len());

    for profile in keys.journalist_profiles().iter().filter(|p| p.is_visible()) {
        let reachable = keys.latest_journalist_messaging_key(&profile.id, now).is_some();
        let default = keys.default_journalist().map(|d| d.id == profile.id).unwrap_or(false);
        println!(
            "  {:<32} {}{}{}",
            profile.id.as_str(),
            profile.display_name,
            if profile.is_desk { " [desk]" } else { "" },
            match (reachable, default) {
                (false, _) => " (no messaging key)",
                (true, true) => " (default)",
                (true, false) => "",
            },
        );
    }

    if let Some(path) = &config.dead_drops_path {
        let data: DeadDropData = serde_json::from_slice(
            &fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        )?;
        let verified =
            VerifiedDeadDrops::from_dead_drop_data(&data, &keys, now, config.dead_drop_signature_mode);

        println!(
            "Dead drops: {} of {} verified, latest id {}",
            verified.len(),
            data.dead_drops.len(),
            verified.max_id().map_or_else(|| "-".to_string(), |id| id.to_string()),
        );
    }

    Ok(())
}
