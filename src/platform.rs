//! Native transport handles.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{ChannelError, Result};

/// Single-owner wrapper around a native transport descriptor.
///
/// Not `Clone`: the descriptor moves into a channel exactly once, at
/// initialization. Dropping a valid handle closes the descriptor.
#[derive(Debug, Default)]
pub struct PlatformHandle {
    fd: Option<OwnedFd>,
}

impl PlatformHandle {
    /// A handle that owns nothing. Channel creation rejects it.
    pub const fn invalid() -> Self {
        Self { fd: None }
    }

    /// Create a connected pair of Unix-domain stream sockets.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair().map_err(ChannelError::SocketPair)?;
        Ok((Self::from(OwnedFd::from(a)), Self::from(OwnedFd::from(b))))
    }

    pub fn is_valid(&self) -> bool {
        self.fd.is_some()
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Take the descriptor out, leaving this handle invalid.
    pub fn take(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    pub fn into_inner(self) -> Option<OwnedFd> {
        self.fd
    }
}

impl From<OwnedFd> for PlatformHandle {
    fn from(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }
}
