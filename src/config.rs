use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub tunnel: Tunnel,
    pub http: Http,
}

impl Config {
    pub fn from_file<P>(path: P) -> Result<Self, Box<dyn std::error::Error>>
    where
        P: AsRef<Path>,
    {
        let mut file = File::open(path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        Ok(toml::from_slice(&buf)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Http {
    pub enabled: bool,
    pub bind: SocketAddr,
}

/// Pipeline tunables: queue sizes, worker counts, and timeouts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tunnel {
    pub bind: SocketAddr,

    #[serde(default = "Tunnel::default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "Tunnel::default_min_message_size")]
    pub min_message_size: usize,

    /// Handshake queue occupancy above which the device is considered
    /// "busy" and requires MAC2 admission.
    #[serde(default = "Tunnel::default_queue_handshake_busy_size")]
    pub queue_handshake_busy_size: usize,
    #[serde(default = "Tunnel::default_handshake_queue_capacity")]
    pub handshake_queue_capacity: usize,
    #[serde(default = "Tunnel::default_decryption_queue_capacity")]
    pub decryption_queue_capacity: usize,
    #[serde(default = "Tunnel::default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,
    #[serde(default = "Tunnel::default_tun_queue_capacity")]
    pub tun_queue_capacity: usize,

    /// Number of parallel AEAD decryption workers.
    #[serde(default = "Tunnel::default_decryption_workers")]
    pub decryption_workers: usize,
    /// Number of handshake workers.
    #[serde(default = "Tunnel::default_handshake_workers")]
    pub handshake_workers: usize,

    /// Bounded read deadline so shutdown is observed promptly even when no
    /// datagrams arrive.
    #[serde(default = "Tunnel::default_read_timeout", with = "duration_millis")]
    pub read_timeout: Duration,
}

impl Tunnel {
    fn default_max_message_size() -> usize {
        crate::wire::MAX_MESSAGE_SIZE
    }

    fn default_min_message_size() -> usize {
        crate::wire::MIN_MESSAGE_SIZE
    }

    fn default_queue_handshake_busy_size() -> usize {
        64
    }

    fn default_handshake_queue_capacity() -> usize {
        128
    }

    fn default_decryption_queue_capacity() -> usize {
        1024
    }

    fn default_peer_queue_capacity() -> usize {
        1024
    }

    fn default_tun_queue_capacity() -> usize {
        1024
    }

    fn default_decryption_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn default_handshake_workers() -> usize {
        1
    }

    fn default_read_timeout() -> Duration {
        Duration::from_secs(1)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
