use clap::Parser;

/// Server configuration, sourced from CLI flags with environment fallback
/// for the port (`ADB_SERVER_PORT`), matching real `adb`'s override knob.
#[derive(Parser, Debug, Clone)]
#[command(name = "adb-server")]
#[command(about = "Host-side ADB smart-socket server")]
pub struct Config {
    /// Address to bind the smart-socket listener on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the smart-socket listener on.
    #[arg(long, env = "ADB_SERVER_PORT", default_value_t = 5037)]
    pub port: u16,

    /// Serial reported by the built-in single-device manager.
    #[arg(long, default_value = "emulator-5554")]
    pub serial: String,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 5037,
            serial: "emulator-5554".to_string(),
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:5037");
    }
}
