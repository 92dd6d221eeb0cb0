use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub backend_timeout_ms: u64,
    /// Dedicated connections kept for optimistic transactions
    pub redis_pool_size: usize,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub environment: String,
    /// Admin created at startup when missing
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let backend_timeout_ms = env::var("BACKEND_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .map_err(|_| "Invalid BACKEND_TIMEOUT_MS")?;

        let redis_pool_size = env::var("REDIS_POOL_SIZE")
            .unwrap_or_else(|_| "16".to_string())
            .parse()
            .map_err(|_| "Invalid REDIS_POOL_SIZE")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_USER"),
            env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(user), Ok(password)) => Some((user, password)),
            (Ok(_), Err(_)) => {
                return Err(
                    "BOOTSTRAP_ADMIN_PASSWORD must be set together with BOOTSTRAP_ADMIN_USER"
                        .to_string(),
                )
            }
            _ => None,
        };

        Ok(Config {
            server_host,
            server_port,
            redis_url,
            backend_timeout_ms,
            redis_pool_size,
            allowed_origins,
            environment,
            bootstrap_admin,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}
