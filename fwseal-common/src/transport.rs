// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte channel between the update client and the bootloader.

use std::io::{self, Read, Write};

/// Half-duplex byte channel. Reads block until satisfied or the channel
/// reports an error (closed, timed out).
pub trait Transport {
    /// Read exactly `n` bytes. Bytes that arrived before a failed read are
    /// kept for the next call.
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Read up to and including `delimiter`.
    fn read_until(&mut self, delimiter: u8) -> io::Result<Vec<u8>>;

    /// Queue `bytes` for transmission.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and release the channel. Later calls fail.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        (**self).read(n)
    }

    fn read_until(&mut self, delimiter: u8) -> io::Result<Vec<u8>> {
        (**self).read_until(delimiter)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// [`Transport`] over any blocking byte stream: serial port, Unix domain
/// socket, TCP socket.
///
/// A read that times out part way keeps the bytes already received, so a
/// retried read resumes where the stream left off.
pub struct StreamTransport<S> {
    stream: Option<S>,
    pending: Vec<u8>,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            pending: Vec::new(),
        }
    }

    /// `None` once closed.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    /// Received bytes not yet handed out by a read.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn stream(&mut self) -> io::Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport closed"))
    }

    /// Read from the stream until at least `want` bytes are pending.
    fn fill(&mut self, want: usize) -> io::Result<()> {
        while self.pending.len() < want {
            let mut buf = vec![0u8; want - self.pending.len()];
            let got = match self.stream()?.read(&mut buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(got) => got,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.pending.extend_from_slice(&buf[..got]);
        }
        Ok(())
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.fill(n)?;
        Ok(self.pending.drain(..n).collect())
    }

    fn read_until(&mut self, delimiter: u8) -> io::Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == delimiter) {
                return Ok(self.pending.drain(..=pos).collect());
            }
            let want = self.pending.len() + 1;
            self.fill(want)?;
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.flush(),
            None => Ok(()),
        }
    }
}

/// True for the error kinds a read timeout surfaces as.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
