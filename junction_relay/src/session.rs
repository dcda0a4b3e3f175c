//! Telnet session to the relay board.
//!
//! The board speaks a line-oriented plain-text protocol on port 23:
//! it prompts for a user name and password after connect, then accepts
//! `relay ...` command lines. Receive is bounded by a per-read timeout
//! and a retry budget so a wedged board can never stall the scheduler
//! indefinitely.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use junction_common::consts::RELAY_PORT;
use tracing::{debug, trace};

use crate::RelayError;

/// Connect attempts before giving up on the board.
pub const CONNECT_RETRIES: u32 = 5;
/// Receive retries per response.
pub const RECV_RETRIES: u32 = 5;
/// Per-receive timeout.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TelnetSession {
    stream: TcpStream,
}

impl TelnetSession {
    /// Connect and authenticate against the board.
    pub fn open(host: &str, username: &str, password: &str) -> Result<Self, RelayError> {
        let addr = (host, RELAY_PORT)
            .to_socket_addrs()
            .map_err(|e| RelayError::Resolve {
                host: host.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| RelayError::NoAddress {
                host: host.to_string(),
            })?;

        let stream = TcpStream::connect_timeout(&addr, RECV_TIMEOUT)?;
        stream.set_read_timeout(Some(RECV_TIMEOUT))?;
        stream.set_write_timeout(Some(RECV_TIMEOUT))?;

        let mut session = Self { stream };
        session.authenticate(username, password)?;
        debug!(host, "relay session established");
        Ok(session)
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), RelayError> {
        self.expect_prompt("User Name:")?;
        self.send_line(username)?;
        self.expect_prompt("Password:")?;
        self.send_line(password)?;

        let banner = self.receive_response(RECV_RETRIES)?;
        if banner.contains("Access denied") || banner.contains("Bad user name") {
            return Err(RelayError::AuthFailed);
        }
        Ok(())
    }

    /// Read until `prompt` appears in the accumulated response.
    fn expect_prompt(&mut self, prompt: &str) -> Result<(), RelayError> {
        let mut seen = String::new();
        for _ in 0..RECV_RETRIES {
            match self.read_chunk() {
                Ok(chunk) => {
                    seen.push_str(&chunk);
                    if seen.contains(prompt) {
                        return Ok(());
                    }
                }
                Err(RelayError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }
        Err(RelayError::PromptTimeout {
            prompt: prompt.to_string(),
        })
    }

    /// Send one command line.
    pub fn send_line(&mut self, line: &str) -> Result<(), RelayError> {
        trace!(line, "relay send");
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Collect a response, retrying timed-out reads up to `retries`.
    pub fn receive_response(&mut self, retries: u32) -> Result<String, RelayError> {
        let mut response = String::new();
        for _ in 0..retries {
            match self.read_chunk() {
                Ok(chunk) => {
                    response.push_str(&chunk);
                    if !response.is_empty() {
                        return Ok(response);
                    }
                }
                Err(RelayError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        if response.is_empty() {
            Err(RelayError::ReceiveTimeout)
        } else {
            Ok(response)
        }
    }

    fn read_chunk(&mut self) -> Result<String, RelayError> {
        let mut buf = [0u8; 512];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            return Err(RelayError::ConnectionClosed);
        }
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}
