//! Startup acquisition of the two listening sockets
//!
//! A process manager may hand us pre-bound listeners via the socket
//! activation convention: `LISTEN_PID` names the process the descriptors
//! were opened for, `LISTEN_FDS` counts them, and the descriptors occupy a
//! contiguous range starting at fd 3. Inherited descriptors are matched by
//! bound address; whatever the environment does not provide gets a fresh
//! wildcard bind.
//!
//! Every descriptor is held as an owned handle from the moment it is taken,
//! so any exit path, success or failure, closes everything this call
//! acquired and did not hand to the caller. A failed acquisition leaks
//! nothing and may simply be invoked again.

use std::net::TcpListener;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, warn};

use crate::error::Error;

/// First descriptor slot used for inherited sockets, after stdio.
pub const LISTEN_FDS_START: RawFd = 3;

const ENV_LISTEN_PID: &str = "LISTEN_PID";
const ENV_LISTEN_FDS: &str = "LISTEN_FDS";

/// The two sockets the service runs on. Ownership passes to the caller.
#[derive(Debug)]
pub struct ListenerPair {
    pub secure: TcpListener,
    pub plain: TcpListener,
}

/// Snapshot of the activation environment.
///
/// `acquire` builds one from the real process environment; tests construct
/// their own with a controlled descriptor range.
#[derive(Debug, Clone, Default)]
pub struct ActivationEnv {
    pub pid: Option<String>,
    pub fds: Option<String>,
    pub first_fd: RawFd,
}

impl ActivationEnv {
    pub fn from_env() -> Self {
        Self {
            pid: std::env::var(ENV_LISTEN_PID).ok(),
            fds: std::env::var(ENV_LISTEN_FDS).ok(),
            first_fd: LISTEN_FDS_START,
        }
    }
}

/// Resolve the secure and plain listeners, preferring inherited descriptors
/// and binding fresh wildcard sockets for whatever is missing.
///
/// Runs once at startup, before anything is served. A fallback bind failure
/// is fatal to the whole acquisition.
pub fn acquire(secure_port: u16, plain_port: u16) -> Result<ListenerPair, Error> {
    acquire_with(&ActivationEnv::from_env(), secure_port, plain_port)
}

/// [`acquire`] with an explicit environment snapshot.
pub fn acquire_with(
    env: &ActivationEnv,
    secure_port: u16,
    plain_port: u16,
) -> Result<ListenerPair, Error> {
    // Inheritance is best effort: an error here has already closed whatever
    // the phase picked up, and both slots fall through to fresh binds.
    let (inherited_secure, inherited_plain) = match inherit(env, secure_port, plain_port) {
        Ok(slots) => slots,
        Err(err) => {
            warn!(error = %err, "ignoring inherited descriptors");
            (None, None)
        }
    };

    // An early return below drops (closes) any listener already acquired.
    let secure = match inherited_secure {
        Some(listener) => listener,
        None => bind_wildcard(secure_port)?,
    };
    let plain = match inherited_plain {
        Some(listener) => listener,
        None => bind_wildcard(plain_port)?,
    };

    Ok(ListenerPair { secure, plain })
}

fn bind_wildcard(port: u16) -> Result<TcpListener, Error> {
    TcpListener::bind(("0.0.0.0", port))
        .map_err(|e| Error::Listener(format!("bind 0.0.0.0:{}: {}", port, e)))
}

type Slots = (Option<TcpListener>, Option<TcpListener>);

/// Inheritance phase: walk the declared descriptor range and fill whichever
/// slots match a wildcard listener on the expected ports.
///
/// Absent environment variables yield empty slots, not an error. A pid
/// mismatch, an unparseable value, or a descriptor that is not a socket at
/// all is an error; descriptors that merely fail to match (wrong type,
/// wrong address, duplicate) are closed and skipped.
fn inherit(env: &ActivationEnv, secure_port: u16, plain_port: u16) -> Result<Slots, Error> {
    let (Some(pid), Some(fds)) = (&env.pid, &env.fds) else {
        return Ok((None, None));
    };

    let pid: u32 = pid
        .parse()
        .map_err(|_| Error::Listener(format!("unparseable {}: {:?}", ENV_LISTEN_PID, pid)))?;
    if pid != std::process::id() {
        return Err(Error::Listener(format!(
            "{} is {} but this process is {}",
            ENV_LISTEN_PID,
            pid,
            std::process::id()
        )));
    }
    let count: usize = fds
        .parse()
        .map_err(|_| Error::Listener(format!("unparseable {}: {:?}", ENV_LISTEN_FDS, fds)))?;

    let mut secure = None;
    let mut plain = None;
    for i in 0..count {
        let raw = env.first_fd + i as RawFd;
        // Take ownership immediately so every path out of this loop closes
        // the descriptor unless it landed in a slot.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let kind = socket_option(&fd, libc::SO_TYPE)
            .map_err(|e| Error::Listener(format!("descriptor {} is not a socket: {}", raw, e)))?;
        if kind != libc::SOCK_STREAM {
            debug!(fd = raw, "skipping non-stream inherited descriptor");
            continue;
        }
        if socket_option(&fd, libc::SO_ACCEPTCONN).unwrap_or(0) == 0 {
            debug!(fd = raw, "skipping non-listening inherited descriptor");
            continue;
        }

        let listener = TcpListener::from(fd);
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(err) => {
                debug!(fd = raw, error = %err, "skipping unaddressable descriptor");
                continue;
            }
        };

        if addr.ip().is_unspecified() && addr.port() == secure_port && secure.is_none() {
            debug!(fd = raw, %addr, "inherited secure listener");
            secure = Some(listener);
        } else if addr.ip().is_unspecified() && addr.port() == plain_port && plain.is_none() {
            debug!(fd = raw, %addr, "inherited plain listener");
            plain = Some(listener);
        } else {
            debug!(fd = raw, %addr, "skipping unexpected inherited listener");
        }
    }

    Ok((secure, plain))
}

fn socket_option(fd: &OwnedFd, option: libc::c_int) -> std::io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            &mut value as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(value)
}
