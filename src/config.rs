use std::env;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Process-wide configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = match env::var("PORT") {
            Ok(raw) => match raw.parse::<u16>() {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!(value = %raw, "PORT is not a valid u16, falling back to default");
                    DEFAULT_PORT
                }
            },
            Err(_) => DEFAULT_PORT,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Self { port, log_level }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
