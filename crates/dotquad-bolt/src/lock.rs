//! Advisory `flock(2)` acquisition with a bounded wait.

use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use dotquad_error::{DotquadError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

/// Delay between lock attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Take an exclusive lock on `file`, polling until `timeout` elapses.
///
/// A zero `timeout` waits indefinitely. The lock is released when the
/// returned guard is dropped.
pub(crate) fn lock_exclusive(file: File, path: &Path, timeout: Duration) -> Result<Flock<File>> {
    let started = Instant::now();
    let mut file = file;
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(guard) => {
                debug!(path = %path.display(), attempts, "acquired store lock");
                return Ok(guard);
            }
            Err((returned, Errno::EAGAIN | Errno::EINTR)) => file = returned,
            Err((_, errno)) => return Err(DotquadError::Io(errno.into())),
        }

        let waited = started.elapsed();
        if !timeout.is_zero() && waited > timeout {
            return Err(DotquadError::LockTimeout {
                path: path.to_path_buf(),
                waited,
            });
        }
        thread::sleep(LOCK_POLL_INTERVAL);
    }
}
