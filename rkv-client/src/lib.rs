//! # RKV Sync Client
//!
//! Purpose: Provide a blocking, RESP-speaking key-value client that spreads
//! concurrent callers over a fixed pool of persistent connections.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Dial every connection once and reuse it.
//! 2. **Generic Commands**: Any command is a name plus [`Arg`] values; there
//!    is no per-command API.
//! 3. **Status-Carrying Replies**: [`Reply`] reports network, timeout and auth
//!    failures as a [`Status`] instead of an error.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.
//!
//! ```no_run
//! use rkv_client::{args, ClientConfig, ConnectionPool};
//!
//! let pool = ConnectionPool::new(ClientConfig::default())?;
//! pool.execute("set", &args!["greeting", "hello"])?;
//! let reply = pool.execute("get", &args!["greeting"])?;
//! if reply.is_ok() {
//!     println!("{}", reply.string());
//! }
//! pool.close();
//! # Ok::<(), rkv_client::ClientError>(())
//! ```

mod config;
mod connection;
mod error;
mod pool;
mod reply;
mod resp;

pub use config::{
    clamp_max_connections, clamp_timeout, ClientConfig, ConnectionOptions, Endpoint,
    MAX_CONNECTIONS_CAP, MAX_TIMEOUT, MIN_TIMEOUT,
};
pub use connection::{ConnState, Connection, DeadlineStream, Transport};
pub use error::{BadArgument, ClientError, ClientResult, DecodeError, ParseError};
pub use pool::{ConnectionPool, PooledConnection};
pub use reply::{Reply, Status};
pub use resp::{encode_command, read_reply, Arg, CodecConfig};
