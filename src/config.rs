use clap::Parser;

/// Server settings, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "planningpoker", version, about = "Planning poker room server")]
pub struct Config {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://planningpoker.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 16)]
    pub max_connections: u32,

    /// Events buffered per room before a slow socket is resynchronised.
    #[arg(long, env = "BROADCAST_CAPACITY", default_value_t = 64)]
    pub broadcast_capacity: usize,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from(["planningpoker", "--port", "8080", "--host", "127.0.0.1"])
            .unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 16);
    }
}
