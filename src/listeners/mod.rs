// src/listeners/mod.rs

//! Listener set: bound endpoints owned by the launcher for its lifetime.
//!
//! - [`uri`] parses `tcp://`, `ssl://` and `unix://` bind strings.
//! - [`handoff`] encodes/decodes the `RESPAWN_INHERIT_<n>` variables used to
//!   pass descriptors across a hot restart (and to worker processes).
//!
//! Binding first re-adopts inherited descriptors whose URI matches a
//! requested bind, so a re-executed launcher never has a bind-time gap.

pub mod handoff;
pub mod uri;

use std::net::TcpListener;

use tracing::{debug, info, warn};

use crate::errors::{LaunchError, Result};

pub use handoff::{ENV_PREFIX, decode_inherit_vars, encode_inherit_vars};
pub use uri::{BindUri, Scheme};

/// Raw descriptor number as carried in handoff variables.
pub type RawDescriptor = i32;

/// `{scheme, address, descriptor}` for one bound endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerDescriptor {
    pub uri: BindUri,
    pub fd: RawDescriptor,
}

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixListener),
}

impl BoundSocket {
    fn raw_descriptor(&self) -> RawDescriptor {
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            match self {
                BoundSocket::Tcp(l) => l.as_raw_fd(),
                BoundSocket::Unix(l) => l.as_raw_fd(),
            }
        }
        #[cfg(not(unix))]
        {
            -1
        }
    }
}

/// One bound endpoint plus its socket.
#[derive(Debug)]
pub struct Listener {
    descriptor: ListenerDescriptor,
    socket: BoundSocket,
}

impl Listener {
    pub fn descriptor(&self) -> &ListenerDescriptor {
        &self.descriptor
    }

    pub fn uri(&self) -> &BindUri {
        &self.descriptor.uri
    }

    /// Local address of a TCP listener (useful when bound to port 0).
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(l) => l.local_addr().ok(),
            #[cfg(unix)]
            BoundSocket::Unix(_) => None,
        }
    }
}

/// Ordered collection of bound listeners.
#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: Vec<Listener>,
}

impl ListenerSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bind `uris`, re-adopting descriptors advertised by `RESPAWN_INHERIT_<n>`
    /// variables in the current environment.
    pub fn bind_from_env(uris: &[BindUri]) -> Result<Self> {
        let inherited = match decode_inherit_vars(ENV_PREFIX, std::env::vars()) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "ignoring malformed inherited listener variables");
                Vec::new()
            }
        };
        Self::bind(uris, inherited)
    }

    /// Bind `uris` in order. Each `inherited` descriptor whose URI string
    /// matches a requested bind is adopted instead of binding again; the
    /// remaining inherited descriptors are closed.
    pub fn bind(uris: &[BindUri], mut inherited: Vec<ListenerDescriptor>) -> Result<Self> {
        let mut listeners = Vec::with_capacity(uris.len());

        for uri in uris {
            let adopted = inherited
                .iter()
                .position(|d| &d.uri == uri)
                .map(|idx| inherited.remove(idx));

            let socket = match adopted {
                Some(descriptor) => match adopt(&descriptor) {
                    Some(socket) => {
                        info!(%uri, fd = descriptor.fd, "* Inherited {uri}");
                        socket
                    }
                    None => bind_fresh(uri)?,
                },
                None => bind_fresh(uri)?,
            };

            let fd = socket.raw_descriptor();
            listeners.push(Listener {
                descriptor: ListenerDescriptor {
                    uri: uri.clone(),
                    fd,
                },
                socket,
            });
        }

        for unused in inherited {
            info!(uri = %unused.uri, fd = unused.fd, "* Closing unused inherited connection");
            if let Some(socket) = adopt(&unused) {
                drop(socket);
            }
        }

        Ok(Self { listeners })
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    pub fn descriptors(&self) -> Vec<ListenerDescriptor> {
        self.listeners.iter().map(|l| l.descriptor.clone()).collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.listeners.iter().map(|l| l.uri().to_string()).collect()
    }

    /// Raw descriptor numbers, in listener order.
    pub fn raw_descriptors(&self) -> Vec<RawDescriptor> {
        self.listeners.iter().map(|l| l.descriptor.fd).collect()
    }

    /// Handoff variables describing this set.
    pub fn handoff_env(&self) -> Vec<(String, String)> {
        encode_inherit_vars(ENV_PREFIX, self.listeners.iter().map(|l| &l.descriptor))
    }

    /// Close every listener and remove the socket files of unix binds.
    ///
    /// Only used on final shutdown; a hot restart must keep them open.
    pub fn close(self) {
        for listener in self.listeners {
            let path = listener.uri().unix_path();
            drop(listener.socket);
            if let Some(path) = path {
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!(path = %path.display(), error = %e, "could not remove unix socket file");
                }
            }
        }
    }
}

fn bind_fresh(uri: &BindUri) -> Result<BoundSocket> {
    match uri.scheme() {
        Scheme::Tcp | Scheme::Ssl => {
            let addr = uri.host_port().unwrap_or(uri.address());
            let listener = TcpListener::bind(addr).map_err(|e| LaunchError::InvalidBind {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
            info!(%uri, "* Listening on {uri}");
            Ok(BoundSocket::Tcp(listener))
        }
        Scheme::Unix => bind_unix(uri),
    }
}

#[cfg(unix)]
fn bind_unix(uri: &BindUri) -> Result<BoundSocket> {
    use std::os::unix::net::UnixListener;

    let path = uri.unix_path().unwrap_or_default();

    remove_stale_socket(&path).map_err(|reason| LaunchError::InvalidBind {
        uri: uri.to_string(),
        reason,
    })?;

    let listener = UnixListener::bind(&path).map_err(|e| LaunchError::InvalidBind {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    info!(%uri, "* Listening on {uri}");
    Ok(BoundSocket::Unix(listener))
}

/// Clear the way for binding a unix socket at `path`.
///
/// Only a socket nobody answers on is removed; a live socket or any other
/// kind of file is left alone and reported.
#[cfg(unix)]
pub(crate) fn remove_stale_socket(path: &std::path::Path) -> std::result::Result<(), String> {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixStream;

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.to_string()),
    };
    if !meta.file_type().is_socket() {
        return Err(format!("{} exists and is not a socket", path.display()));
    }
    if UnixStream::connect(path).is_ok() {
        return Err("socket already in use by another process".to_string());
    }
    debug!(path = %path.display(), "removing stale unix socket");
    std::fs::remove_file(path).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn bind_unix(uri: &BindUri) -> Result<BoundSocket> {
    Err(LaunchError::UnsupportedCombination(format!(
        "unix socket bind {uri} is not supported on this platform"
    )))
}

/// Take ownership of an inherited descriptor, if it is actually open.
#[cfg(unix)]
fn adopt(descriptor: &ListenerDescriptor) -> Option<BoundSocket> {
    use nix::fcntl::{FcntlArg, fcntl};
    use std::os::fd::FromRawFd;

    if fcntl(descriptor.fd, FcntlArg::F_GETFD).is_err() {
        warn!(
            uri = %descriptor.uri,
            fd = descriptor.fd,
            "inherited descriptor is not open; binding fresh"
        );
        return None;
    }

    // SAFETY: the descriptor was handed over by the process that exec'd us,
    // is open (checked above) and is adopted at most once because each
    // inherited entry is removed from the list before adoption.
    let socket = unsafe {
        if descriptor.uri.scheme().is_tcp() {
            BoundSocket::Tcp(TcpListener::from_raw_fd(descriptor.fd))
        } else {
            BoundSocket::Unix(std::os::unix::net::UnixListener::from_raw_fd(descriptor.fd))
        }
    };

    set_cloexec(descriptor.fd, true);
    Some(socket)
}

#[cfg(not(unix))]
fn adopt(_descriptor: &ListenerDescriptor) -> Option<BoundSocket> {
    None
}

/// Toggle `FD_CLOEXEC` on a descriptor, logging failures.
#[cfg(unix)]
pub(crate) fn set_cloexec(fd: RawDescriptor, on: bool) -> bool {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};

    let flags = if on { FdFlag::FD_CLOEXEC } else { FdFlag::empty() };
    match fcntl(fd, FcntlArg::F_SETFD(flags)) {
        Ok(_) => true,
        Err(e) => {
            warn!(fd, error = %e, "failed to update FD_CLOEXEC");
            false
        }
    }
}
