use std::env;

/// Process-wide configuration loaded from environment variables.
///
/// Each `*_from_env()` constructor loads only the variables that process
/// actually needs, mirroring the per-role constructors in the teacher's
/// config (a scout process doesn't need web server vars, and vice versa).
#[derive(Debug, Clone)]
pub struct Config {
    // Catalog store (Postgres: kv_entries, graph_nodes, graph_edges, metadata_records, ...)
    pub catalog_database_url: String,

    // Object store (staging artifacts)
    pub object_store_bucket: String,
    pub object_store_endpoint: Option<String>,

    // Orchestrator
    pub max_parallel_slices_default: u32,
    pub default_fetch_size: u32,

    // Signal evaluator
    pub signal_page_size: u32,
}

impl Config {
    /// Load configuration for the orchestrator worker process.
    pub fn orchestrator_from_env() -> Self {
        Self {
            catalog_database_url: required_env("CATALOG_DATABASE_URL"),
            object_store_bucket: env::var("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|_| "ingestlake-staging".to_string()),
            object_store_endpoint: env::var("OBJECT_STORE_ENDPOINT").ok(),
            max_parallel_slices_default: env::var("MAX_PARALLEL_SLICES_DEFAULT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            default_fetch_size: env::var("DEFAULT_FETCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            signal_page_size: 200,
        }
    }

    /// Load configuration for the signal evaluator process.
    pub fn signals_from_env() -> Self {
        Self {
            catalog_database_url: required_env("CATALOG_DATABASE_URL"),
            object_store_bucket: String::new(),
            object_store_endpoint: None,
            max_parallel_slices_default: 1,
            default_fetch_size: 0,
            signal_page_size: env::var("SIGNAL_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
        }
    }

    /// Log variable presence/length, never raw values.
    pub fn log_redacted(&self) {
        let vars = [
            ("CATALOG_DATABASE_URL", self.catalog_database_url.len()),
            ("OBJECT_STORE_BUCKET", self.object_store_bucket.len()),
        ];
        for (name, len) in vars {
            if len == 0 {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({len} chars)");
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_from_env_panics_without_database_url() {
        // SAFETY-equivalent: run in isolation; just assert the panic message shape
        let result = std::panic::catch_unwind(|| {
            env::remove_var("CATALOG_DATABASE_URL");
            Config::orchestrator_from_env()
        });
        assert!(result.is_err());
    }

    #[test]
    fn orchestrator_from_env_applies_defaults() {
        env::set_var("CATALOG_DATABASE_URL", "postgres://localhost/test");
        let cfg = Config::orchestrator_from_env();
        assert_eq!(cfg.max_parallel_slices_default, 1);
        assert_eq!(cfg.default_fetch_size, 500);
        env::remove_var("CATALOG_DATABASE_URL");
    }
}
