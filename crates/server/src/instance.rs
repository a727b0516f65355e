//! Single-instance rendezvous.
//!
//! The server claims a well-known Unix socket name in the temp directory;
//! a second process probing the name finds it reachable and exits non-zero.

use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use tracing::{debug, info};

use termsim_core::{SimError, SimResult};

/// Well-known rendezvous name shared by every server build.
pub const INSTANCE_NAME: &str = "TerminalSimServerInstance";

/// Holds the rendezvous socket for the process lifetime; dropping it
/// releases the name.
pub struct SingleInstance {
    path: PathBuf,
    _listener: UnixListener,
}

impl SingleInstance {
    /// Probes `name`; if another process already holds it, fails with
    /// `InternalError`. Otherwise claims it with a world-accessible socket.
    pub fn acquire(name: &str) -> SimResult<SingleInstance> {
        let path = std::env::temp_dir().join(name);

        if UnixStream::connect(&path).is_ok() {
            return Err(SimError::Internal(
                "Another instance of the terminal simulation server is already running".into(),
            ));
        }

        // A leftover socket file without a listener is stale.
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666));

        // Answer probes by accepting and immediately dropping connections.
        let accept = listener.try_clone()?;
        std::thread::spawn(move || {
            for stream in accept.incoming() {
                match stream {
                    Ok(_) => debug!("Instance probe answered"),
                    Err(_) => break,
                }
            }
        });

        info!(path = %path.display(), "Claimed single-instance rendezvous");
        Ok(SingleInstance {
            path,
            _listener: listener,
        })
    }
}

impl Drop for SingleInstance {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("termsim-test-{}-{tag}", std::process::id())
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let name = unique_name("held");
        let instance = SingleInstance::acquire(&name).unwrap();
        assert!(matches!(
            SingleInstance::acquire(&name),
            Err(SimError::Internal(_))
        ));
        drop(instance);
    }

    #[test]
    fn name_is_reusable_after_release() {
        let name = unique_name("release");
        drop(SingleInstance::acquire(&name).unwrap());
        let again = SingleInstance::acquire(&name).unwrap();
        drop(again);
    }

    #[test]
    fn stale_socket_file_is_reclaimed() {
        let name = unique_name("stale");
        let path = std::env::temp_dir().join(&name);
        {
            let _listener = UnixListener::bind(&path).unwrap();
        }
        // The file still exists but nothing is listening.
        let instance = SingleInstance::acquire(&name).unwrap();
        drop(instance);
    }
}
