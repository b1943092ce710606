use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on the sponsor-chain walk; guards against malformed data.
    pub upline_max_depth: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("server_port", 8000)?
            .set_default("max_connections", 8)?
            .set_default("upline_max_depth", 10)?
            .add_source(config::Environment::default())
            .build()?;
        config.try_deserialize()
    }
}
