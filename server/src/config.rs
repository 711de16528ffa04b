use std::path::PathBuf;

/// Runtime settings for the canvas server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the regular `N.png` images
    pub images_dir: PathBuf,
    /// Directory holding the peaceful `N.jpg` images shown during chaos mode
    pub peaceful_dir: PathBuf,
    /// Connections beyond this many are turned away
    pub max_sessions: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            images_dir: PathBuf::from("public/images"),
            peaceful_dir: PathBuf::from("public/peaceful"),
            max_sessions: 64,
        }
    }
}
