//! Termination of the tool together with everything it spawned.

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

/// The process group led by one tool invocation. The tool is started as the
/// leader of a fresh group, so its descendants share the group id.
///
/// Dropping the guard kills the group if it was not killed already.
#[derive(Debug)]
pub struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    /// Guard the group led by `leader`. `None` (the child already gone)
    /// yields a guard that does nothing.
    pub fn new(leader: Option<u32>) -> Self {
        Self { leader }
    }

    /// SIGKILL every process left in the group. Later calls do nothing.
    pub fn kill(&mut self) {
        let Some(pgid) = self.leader.take() else {
            return;
        };

        #[cfg(unix)]
        {
            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pgid, "killed process group"),
                // Nothing left in the group.
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
            }
        }

        #[cfg(not(unix))]
        debug!(pgid, "process groups not supported on this platform");
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
