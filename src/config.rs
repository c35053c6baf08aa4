//! Server and registry configuration

use std::net::SocketAddr;
use std::time::Duration;

/// HTTP/websocket facing configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Frame width used when a create request omits one
    pub default_width: u32,

    /// Frame height used when a create request omits one
    pub default_height: u32,

    /// Interval between liveness pings on a websocket consumer
    pub ping_interval: Duration,

    /// Rolling deadline for inbound websocket traffic
    pub read_deadline: Duration,

    /// Per-message deadline for outbound websocket writes
    pub write_deadline: Duration,

    /// Maximum size of an inbound websocket message
    pub read_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8091".parse().unwrap(),
            default_width: 640,
            default_height: 480,
            ping_interval: Duration::from_secs(54),
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            read_limit: 512,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the default resolution for create requests that omit one
    pub fn default_resolution(mut self, width: u32, height: u32) -> Self {
        self.default_width = width;
        self.default_height = height;
        self
    }

    /// Set the websocket ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the websocket read deadline
    pub fn read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = deadline;
        self
    }

    /// Set the websocket write deadline
    pub fn write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = deadline;
        self
    }
}

/// Per-stream pipeline configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of the frame pipe between ingest and fan-out
    pub pipe_capacity: usize,

    /// Capacity of each consumer's send queue
    pub client_queue_capacity: usize,

    /// Delay before relaunching the transcoder after an error
    pub restart_delay: Duration,

    /// Interval between health monitor checks
    pub health_interval: Duration,

    /// Time without a frame before a running stream counts as stalled
    pub stall_threshold: Duration,

    /// How long the pull endpoint waits for a frame
    pub frame_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: 100,
            client_queue_capacity: 10,
            restart_delay: Duration::from_secs(2),
            health_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(10),
            frame_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set the frame pipe capacity
    pub fn pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Set the per-consumer queue capacity
    pub fn client_queue_capacity(mut self, capacity: usize) -> Self {
        self.client_queue_capacity = capacity;
        self
    }

    /// Set the transcoder restart delay
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Set the health monitor interval
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Set the stall threshold
    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Set the pull-endpoint frame timeout
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8091);
        assert_eq!(config.default_width, 640);
        assert_eq!(config.default_height, 480);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.read_deadline, Duration::from_secs(60));
        assert_eq!(config.write_deadline, Duration::from_secs(10));
        assert_eq!(config.read_limit, 512);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_server_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8091".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .default_resolution(320, 240)
            .ping_interval(Duration::from_secs(30))
            .read_deadline(Duration::from_secs(45))
            .write_deadline(Duration::from_secs(5));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.default_width, 320);
        assert_eq!(config.default_height, 240);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.read_deadline, Duration::from_secs(45));
        assert_eq!(config.write_deadline, Duration::from_secs(5));
    }

    #[test]
    fn test_default_registry_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.pipe_capacity, 100);
        assert_eq!(config.client_queue_capacity, 10);
        assert_eq!(config.restart_delay, Duration::from_secs(2));
        assert_eq!(config.health_interval, Duration::from_secs(5));
        assert_eq!(config.stall_threshold, Duration::from_secs(10));
        assert_eq!(config.frame_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_registry_builder_chaining() {
        let config = RegistryConfig::default()
            .pipe_capacity(4)
            .client_queue_capacity(2)
            .restart_delay(Duration::from_millis(100))
            .health_interval(Duration::from_millis(200))
            .stall_threshold(Duration::from_millis(500))
            .frame_timeout(Duration::from_millis(250));

        assert_eq!(config.pipe_capacity, 4);
        assert_eq!(config.client_queue_capacity, 2);
        assert_eq!(config.restart_delay, Duration::from_millis(100));
        assert_eq!(config.health_interval, Duration::from_millis(200));
        assert_eq!(config.stall_threshold, Duration::from_millis(500));
        assert_eq!(config.frame_timeout, Duration::from_millis(250));
    }
}
