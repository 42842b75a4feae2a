// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Links to a bootloader: serial device, Unix domain socket or TCP socket.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serialport::SerialPort;
use tracing::{debug, info};

/// Serial line rate of the bootloader UART.
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout for open links, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Where a link goes, parsed from `unix:<path>`, `tcp:<host:port>` or a
/// plain serial device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSpec {
    Serial(String),
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for LinkSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err("unix: link needs a socket path".to_string());
            }
            Ok(LinkSpec::Unix(PathBuf::from(path)))
        } else if let Some(addr) = s.strip_prefix("tcp:") {
            if !addr.contains(':') {
                return Err(format!("tcp link '{}' needs host:port", addr));
            }
            Ok(LinkSpec::Tcp(addr.to_string()))
        } else if s.is_empty() {
            Err("empty link".to_string())
        } else {
            Ok(LinkSpec::Serial(s.to_string()))
        }
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSpec::Serial(port) => write!(f, "{}", port),
            LinkSpec::Unix(path) => write!(f, "unix:{}", path.display()),
            LinkSpec::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Open byte stream to the peer.
pub enum Link {
    Serial(Box<dyn SerialPort>),
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Link {
    /// Connect to a bootloader. Reads time out after `timeout`.
    pub fn open(spec: &LinkSpec, timeout: Duration) -> Result<Self> {
        let link = match spec {
            LinkSpec::Serial(port) => {
                let port = serialport::new(port, BAUD_RATE)
                    .timeout(timeout)
                    .open()
                    .with_context(|| format!("Failed to open serial port {}", port))?;
                Link::Serial(port)
            }
            #[cfg(unix)]
            LinkSpec::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .with_context(|| format!("Failed to connect to {}", path.display()))?;
                stream.set_read_timeout(Some(timeout))?;
                Link::Unix(stream)
            }
            #[cfg(not(unix))]
            LinkSpec::Unix(_) => bail!("Unix domain sockets are not available on this platform"),
            LinkSpec::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())
                    .with_context(|| format!("Failed to connect to {}", addr))?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                Link::Tcp(stream)
            }
        };
        debug!(link = %spec, "link open");
        Ok(link)
    }
}

impl Read for Link {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Link::Serial(port) => port.read(buf),
            #[cfg(unix)]
            Link::Unix(stream) => stream.read(buf),
            Link::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Link {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Link::Serial(port) => port.write(buf),
            #[cfg(unix)]
            Link::Unix(stream) => stream.write(buf),
            Link::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Link::Serial(port) => port.flush(),
            #[cfg(unix)]
            Link::Unix(stream) => stream.flush(),
            Link::Tcp(stream) => stream.flush(),
        }
    }
}

/// Listening socket for the bootloader emulator.
pub enum Listener {
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

impl Listener {
    pub fn bind(spec: &LinkSpec) -> Result<Self> {
        match spec {
            LinkSpec::Serial(port) => {
                bail!("Cannot listen on serial device {}, use unix: or tcp:", port)
            }
            #[cfg(unix)]
            LinkSpec::Unix(path) => {
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("Failed to bind {}", path.display()))?;
                Ok(Listener::Unix(listener, path.clone()))
            }
            #[cfg(not(unix))]
            LinkSpec::Unix(_) => bail!("Unix domain sockets are not available on this platform"),
            LinkSpec::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str())
                    .with_context(|| format!("Failed to bind {}", addr))?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    /// Address to hand to `fwseal update --port`.
    pub fn describe(&self) -> String {
        match self {
            #[cfg(unix)]
            Listener::Unix(_, path) => format!("unix:{}", path.display()),
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => format!("tcp:{}", addr),
                Err(_) => "tcp:?".to_string(),
            },
        }
    }

    /// Block until one client connects. Reads on the accepted link block
    /// without timeout.
    pub fn accept(&self) -> Result<Link> {
        let link = match self {
            #[cfg(unix)]
            Listener::Unix(listener, _) => Link::Unix(listener.accept()?.0),
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept()?;
                info!(%peer, "client connected");
                stream.set_nodelay(true)?;
                Link::Tcp(stream)
            }
        };
        Ok(link)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Listener::Unix(_, path) = self {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
