// Server configuration

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
}
