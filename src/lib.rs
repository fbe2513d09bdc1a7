//! High-throughput publish/subscribe fan-out proxy for seismic data packets
//!
//! Publishers stream sample-burst packets into the **frontend** endpoint;
//! subscribers open a call on the **backend** endpoint and receive every
//! packet the proxy admits. In between, the proxy validates and
//! normalizes packets, applies admission control (shared token,
//! concurrent-caller caps, consecutive-invalid kick, optional duplicate
//! detection), and bounds memory at every stage with drop-oldest queues
//! so a slow consumer can never stall the pipeline.
//!
//! ```text
//!  publishers          ┌────────────────── Proxy ──────────────────┐    subscribers
//!      │               │                                           │        ▲
//!      ▼               │   ┌─────────┐    ┌──────────────────┐     │        │
//!  ────────► frontend ─┼──► ingress  ├──► │ pump → registry  │ ────┼─ backend ──►
//!            reactors  │   │ queue   │    │ fan-out          │     │  reactors
//!                      │   └─────────┘    └──────────────────┘     │
//!                      └───────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use packet_proxy::{Config, Proxy, ProxyMetrics};
//!
//! # async fn example() -> packet_proxy::Result<()> {
//! let config = Config::load("proxy.toml")?;
//! let metrics = Arc::new(ProxyMetrics::new());
//! let mut proxy = Proxy::new(config, metrics)?;
//! proxy.start().await?;
//! tokio::signal::ctrl_c().await?;
//! proxy.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod frontend;
pub mod packet;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod stats;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
pub use packet::{DataType, Packet, StreamIdentifier};
pub use proxy::Proxy;
pub use stats::ProxyMetrics;
