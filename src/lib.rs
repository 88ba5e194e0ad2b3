pub mod collab;
pub mod config;
pub mod http;
pub mod metrics;
pub mod peer;
pub mod pipeline;
pub mod proto;
pub mod queue;
pub mod signal;
pub mod socket;
pub mod state;
pub mod tun;
pub mod wire;
pub mod work;
