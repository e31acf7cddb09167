//! Self-pipe used to interrupt the loop's blocking wait.
//!
//! Writing a byte is the only operation performed on the writer side, which
//! keeps it usable from signal handlers.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

/// Writer half of the loop wakeup pipe.
#[derive(Debug)]
pub struct WakeHandle {
    writer: UnixStream,
}

impl WakeHandle {
    pub(super) fn new(writer: UnixStream) -> Self {
        Self { writer }
    }

    /// Interrupts the loop's wait so it runs another dispatch cycle.
    ///
    /// A full pipe already guarantees a pending wakeup, so it is not an error.
    pub fn wake(&self) -> io::Result<()> {
        match (&self.writer).write(&[1]) {
            Ok(_) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Duplicates the underlying descriptor.
    pub fn try_clone(&self) -> io::Result<Self> {
        self.writer.try_clone().map(Self::new)
    }

    /// Releases the raw stream, e.g. to hand it to a signal handler.
    #[must_use]
    pub fn into_stream(self) -> UnixStream {
        self.writer
    }
}

/// Creates the non-blocking pipe pair.
pub(super) fn pipe() -> io::Result<(mio::net::UnixStream, WakeHandle)> {
    let (reader, writer) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;
    writer.set_nonblocking(true)?;
    Ok((mio::net::UnixStream::from_std(reader), WakeHandle::new(writer)))
}

/// Empties the reader so level-triggered readiness does not spin.
pub(super) fn drain(reader: &mut mio::net::UnixStream) -> io::Result<()> {
    let mut buffer = [0_u8; 64];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}
