use std::sync::Arc;

use chrono::Utc;
use ingestlake_common::Result;
use ingestlake_objectstore::ObjectStore;
use tracing::{info, warn};

use crate::types::SessionManifest;

/// Scans manifests under `prefix` and deletes finalized, expired session
/// objects (spec §4.2 "TTL & GC" — default TTL 7 days, finalized runs
/// only). Returns the number of sessions swept.
pub async fn sweep_expired_sessions(store: &Arc<dyn ObjectStore>, prefix: &str) -> Result<u32> {
    let keys = store.list(prefix).await?;
    let manifest_keys: Vec<&String> = keys.iter().filter(|k| k.ends_with("_manifest.json")).collect();
    let mut swept = 0u32;
    let now = Utc::now();

    for manifest_key in manifest_keys {
        let Some(bytes) = store.get(manifest_key).await? else { continue };
        let manifest: SessionManifest = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(key = manifest_key.as_str(), error = %e, "skipping unreadable staging manifest");
                continue;
            }
        };

        if !manifest.finalized || !manifest.is_expired(now) {
            continue;
        }

        let session_prefix = manifest_key.trim_end_matches("_manifest.json");
        let session_keys = store.list(session_prefix).await?;
        for key in session_keys {
            store.delete(&key).await?;
        }
        swept += 1;
        info!(prefix = session_prefix, "swept expired staging session");
    }

    Ok(swept)
}
