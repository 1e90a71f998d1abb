//! # Connection
//!
//! Purpose: Run one command at a time over a single TCP or Unix socket,
//! redialing lazily after the transport fails.
//!
//! ## Design Principles
//! 1. **Explicit State Machine**: A connection is either `Disconnected` or
//!    `Connected`; [`Connection::execute`] performs the transition before
//!    touching the wire.
//! 2. **Failures Are Replies**: Dial, deadline and IO failures come back as
//!    reply statuses and leave the connection `Disconnected`.
//! 3. **Buffer Reuse**: Line and write buffers live on the connection.
//! 4. **No Internal Locking**: The pool guarantees a single owner per call.

use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{ConnectionOptions, Endpoint};
use crate::error::{ClientError, ClientResult, DecodeError};
use crate::reply::{Reply, Status};
use crate::resp::{encode_command, read_reply, Arg, CodecConfig};

/// Byte stream to the server.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    /// Dials the endpoint, bounding TCP connects by `timeout`.
    pub fn dial(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let mut last_err = None;
                for addr in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            // Disable Nagle to keep request latency low for small payloads.
                            stream.set_nodelay(true)?;
                            return Ok(Transport::Tcp(stream));
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
                }))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
        }
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.set_read_timeout(Some(timeout)),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.set_read_timeout(Some(timeout)),
        }
    }

    fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    /// Shuts down both directions of the socket.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}

/// Transport bounded by one absolute deadline per command.
///
/// Socket timeouts only limit a single syscall, so every read and write
/// re-arms them with the time left until the deadline.
#[derive(Debug)]
pub struct DeadlineStream {
    inner: Transport,
    deadline: Option<Instant>,
}

impl DeadlineStream {
    /// Wraps a transport with no deadline armed.
    pub fn new(inner: Transport) -> Self {
        DeadlineStream {
            inner,
            deadline: None,
        }
    }

    /// Starts a new deadline `timeout` from now.
    pub fn arm(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Underlying transport.
    pub fn get_ref(&self) -> &Transport {
        &self.inner
    }

    /// Time left before the deadline; `TimedOut` once it has passed.
    fn remaining(&self) -> io::Result<Option<Duration>> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "command deadline exceeded"));
        }
        Ok(Some(left))
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(left) = self.remaining()? {
            self.inner.set_read_timeout(left)?;
        }
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = self.remaining()? {
            self.inner.set_write_timeout(left)?;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Link state of a [`Connection`].
#[derive(Debug)]
pub enum ConnState {
    Disconnected,
    // Buffered reader reduces syscalls while still allowing direct writes.
    Connected(BufReader<DeadlineStream>),
}

/// Single server connection with reusable buffers.
pub struct Connection {
    options: Arc<ConnectionOptions>,
    state: ConnState,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    /// Creates a connection that dials on first use.
    pub fn new(options: Arc<ConnectionOptions>) -> Self {
        Connection {
            options,
            state: ConnState::Disconnected,
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        }
    }

    /// Dials and authenticates immediately, surfacing failures as errors.
    pub fn open(options: Arc<ConnectionOptions>) -> ClientResult<Self> {
        let mut conn = Connection::new(options);
        conn.dial()?;
        if !conn.authenticate() {
            return Err(ClientError::Auth);
        }
        Ok(conn)
    }

    /// Returns true while a transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnState::Connected(_))
    }

    /// Executes one command and returns its reply.
    ///
    /// Only malformed reply frames are returned as `Err`; every other failure
    /// is a reply status.
    pub fn execute(&mut self, cmd: &str, args: &[Arg]) -> ClientResult<Reply> {
        if let Some(failure) = self.ensure_connected() {
            return Ok(failure);
        }
        self.round_trip(cmd, args)
    }

    /// Like [`Connection::execute`] for dynamically typed arguments.
    ///
    /// Arrays and objects have no wire form; they yield a `BadArgument` reply
    /// without any IO.
    pub fn execute_dynamic(
        &mut self,
        cmd: &str,
        values: Vec<serde_json::Value>,
    ) -> ClientResult<Reply> {
        let args = match values
            .into_iter()
            .map(Arg::try_from)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(args) => args,
            Err(err) => return Ok(Reply::failure(Status::BadArgument, err)),
        };
        self.execute(cmd, &args)
    }

    /// Shuts the transport down. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let ConnState::Connected(reader) =
            std::mem::replace(&mut self.state, ConnState::Disconnected)
        {
            if let Err(err) = reader.get_ref().get_ref().shutdown() {
                debug!(error = %err, "shutdown on close failed");
            }
        }
    }

    /// Moves `Disconnected` to `Connected`, returning a failure reply when the
    /// dial or the AUTH handshake fails.
    fn ensure_connected(&mut self) -> Option<Reply> {
        if self.is_connected() {
            return None;
        }

        debug!(endpoint = ?self.options.endpoint, "redialing");
        if let Err(err) = self.dial() {
            warn!(endpoint = ?self.options.endpoint, error = %err, "redial failed");
            return Some(io_failure(err));
        }
        if !self.authenticate() {
            warn!(endpoint = ?self.options.endpoint, "auth rejected after redial");
            return Some(Reply::failure(Status::NoAuth, ClientError::Auth));
        }
        None
    }

    fn dial(&mut self) -> io::Result<()> {
        let transport = Transport::dial(&self.options.endpoint, self.options.timeout)?;
        debug!(endpoint = ?self.options.endpoint, "connected");
        self.state = ConnState::Connected(BufReader::with_capacity(
            self.options.read_buffer_size,
            DeadlineStream::new(transport),
        ));
        Ok(())
    }

    /// Sends AUTH when a token is configured. A rejected handshake closes the
    /// connection so that only a later redial can make it usable again.
    fn authenticate(&mut self) -> bool {
        let Some(token) = self.options.auth.clone() else {
            return true;
        };
        let accepted = matches!(self.round_trip("auth", &[Arg::Str(token)]), Ok(reply) if reply.is_ok());
        if !accepted {
            self.close();
        }
        accepted
    }

    fn round_trip(&mut self, cmd: &str, args: &[Arg]) -> ClientResult<Reply> {
        let reader = match &mut self.state {
            ConnState::Connected(reader) => reader,
            ConnState::Disconnected => {
                return Ok(Reply::failure(Status::NetworkException, "not connected"));
            }
        };

        self.write_buf.clear();
        encode_command(cmd, args, &mut self.write_buf);

        let outcome = send_and_read(
            reader,
            &self.write_buf,
            &mut self.line_buf,
            &self.options.codec,
            self.options.timeout,
        );
        match outcome {
            Ok(reply) => Ok(reply),
            Err(DecodeError::Io(err)) => {
                warn!(endpoint = ?self.options.endpoint, error = %err, "dropping connection");
                self.state = ConnState::Disconnected;
                Ok(io_failure(err))
            }
            Err(DecodeError::Parse(err)) => {
                // The stream position is unknown after a bad frame.
                warn!(endpoint = ?self.options.endpoint, error = %err, "dropping connection");
                self.state = ConnState::Disconnected;
                Err(err.into())
            }
        }
    }
}

fn send_and_read(
    reader: &mut BufReader<DeadlineStream>,
    message: &[u8],
    line_buf: &mut Vec<u8>,
    codec: &CodecConfig,
    timeout: Duration,
) -> Result<Reply, DecodeError> {
    let stream = reader.get_mut();
    stream.arm(timeout);
    stream.write_all(message)?;
    stream.flush()?;

    read_reply(reader, line_buf, codec)
}

/// Socket timeouts surface as `WouldBlock` on unix and `TimedOut` elsewhere;
/// an already-passed deadline is `TimedOut`.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn io_failure(err: io::Error) -> Reply {
    let status = if is_timeout(&err) {
        Status::Timeout
    } else {
        Status::NetworkException
    };
    Reply::failure(status, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connected_pair() -> (DeadlineStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());
        let transport = Transport::dial(&endpoint, Duration::from_secs(1)).unwrap();
        let (peer, _) = listener.accept().unwrap();
        (DeadlineStream::new(transport), peer)
    }

    #[test]
    fn passed_deadline_fails_without_blocking() {
        let (mut stream, mut peer) = connected_pair();
        peer.write_all(b"+OK\r\n").unwrap();

        stream.arm(Duration::ZERO);
        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let err = stream.write(b"ping").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(is_timeout(&err));
    }

    #[test]
    fn deadline_spans_several_reads() {
        let (mut stream, mut peer) = connected_pair();
        stream.arm(Duration::from_millis(300));

        peer.write_all(b"+O").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        std::thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        let err = stream.read(&mut buf).unwrap_err();
        assert!(is_timeout(&err));
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn rearming_restores_the_full_budget() {
        let (mut stream, mut peer) = connected_pair();
        stream.arm(Duration::ZERO);
        assert!(stream.read(&mut [0u8; 1]).is_err());

        stream.arm(Duration::from_secs(1));
        peer.write_all(b":1\r\n").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b":1\r\n");
    }
}
