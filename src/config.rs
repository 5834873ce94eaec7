//! Konfigurasi event loop, listener, dan socket

use std::time::Duration;

/// Server/session configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Alamat bind untuk `LoopHandle::serve`
    pub bind_addr: String,
    /// Batas session aktif per event loop
    pub max_connections: usize,
    /// Kapasitas `mio::Events` per poll
    pub events_capacity: usize,
    /// TCP_NODELAY untuk setiap session
    pub nodelay: bool,
    /// SO_SNDBUF/SO_RCVBUF (unix saja); `None` = default OS
    pub socket_buffer_size: Option<usize>,
    /// Timeout poll, batas latensi untuk cek shutdown
    pub poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
            max_connections: 1024,
            events_capacity: 1024,
            nodelay: true,
            socket_buffer_size: Some(256 * 1024),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

impl Config {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:7777");
        assert_eq!(config.max_connections, 1024);
        assert!(config.nodelay);

        let config = config.with_bind_addr("127.0.0.1:0");
        assert_eq!(config.bind_addr, "127.0.0.1:0");
    }
}
