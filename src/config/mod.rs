use std::env;

/// Config holds all runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub design_path: String,
    pub output_dir: String,
    pub branch: String,
    pub pools_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            db_path: get_env("DB_PATH", "fabric.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            design_path: get_env("DESIGN_PATH", "design.json"),
            output_dir: get_env("OUTPUT_DIR", "generated-configs"),
            branch: get_env("BRANCH", "main"),
            pools_path: env::var("POOLS_PATH").ok().filter(|p| !p.is_empty()),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_falls_back_to_default() {
        assert_eq!(get_env("FABRIC_FORGE_SURELY_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn test_load_defaults() {
        let cfg = Config::load();
        if env::var("DB_MAX_CONNECTIONS").is_err() {
            assert_eq!(cfg.db_max_connections, 5);
        }
        if env::var("BRANCH").is_err() {
            assert_eq!(cfg.branch, "main");
        }
    }
}
