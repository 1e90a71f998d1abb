//! In-process RESP servers scripted per accepted connection.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rkv_client::ClientConfig;

/// Server side of one accepted connection.
pub struct Session<S: Read + Write> {
    reader: BufReader<S>,
}

impl<S: Read + Write> Session<S> {
    pub fn new(stream: S) -> Self {
        Session {
            reader: BufReader::new(stream),
        }
    }

    /// Reads one command, `None` once the client hangs up.
    pub fn read_command(&mut self) -> Option<Vec<Vec<u8>>> {
        read_command(&mut self.reader).ok()
    }

    /// Reads one command and checks its name.
    pub fn expect(&mut self, name: &[u8]) -> Vec<Vec<u8>> {
        let args = self.read_command().expect("command");
        assert_eq!(args[0], name, "unexpected command");
        args
    }

    pub fn write_raw(&mut self, data: &[u8]) {
        let stream = self.reader.get_mut();
        let _ = stream.write_all(data);
        let _ = stream.flush();
    }

    pub fn write_simple(&mut self, msg: &str) {
        self.write_raw(format!("+{msg}\r\n").as_bytes());
    }

    pub fn write_error(&mut self, msg: &str) {
        self.write_raw(format!("-{msg}\r\n").as_bytes());
    }

    pub fn write_bulk(&mut self, data: &[u8]) {
        let mut frame = format!("${}\r\n", data.len()).into_bytes();
        frame.extend_from_slice(data);
        frame.extend_from_slice(b"\r\n");
        self.write_raw(&frame);
    }

    /// Blocks until the client closes its side.
    pub fn drain(&mut self) {
        while self.read_command().is_some() {}
    }
}

/// Serves `connections` accepted sockets, each on its own thread.
///
/// The handler receives the accept index so scripts can differ between the
/// first dial and later redials.
pub fn spawn_server<F>(connections: usize, handler: F) -> SocketAddr
where
    F: Fn(usize, &mut Session<std::net::TcpStream>) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handler = Arc::new(handler);

    thread::spawn(move || {
        for idx in 0..connections {
            let (stream, _) = listener.accept().expect("accept");
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            let handler = handler.clone();
            thread::spawn(move || {
                let mut session = Session::new(stream);
                handler(idx, &mut session);
            });
        }
    });

    addr
}

pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout_secs: 1,
        ..ClientConfig::default()
    }
}

fn read_command<R: BufRead>(reader: &mut R) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(args)
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("length"))
}

fn invalid(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())
}
