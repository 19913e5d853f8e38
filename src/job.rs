use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// Child processes spawned for one pipeline, in stage order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PipelineHandle {
    pids: Vec<Pid>,
}

impl PipelineHandle {
    pub(crate) fn with_capacity(stages: usize) -> Self {
        Self {
            pids: Vec::with_capacity(stages),
        }
    }

    pub(crate) fn push(&mut self, pid: Pid) {
        self.pids.push(pid);
    }

    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

/// Waits for foreground pipelines and keeps background ones from turning
/// into zombies.
///
/// Only pids this interpreter spawned are ever waited on, never "any child",
/// so a host process embedding the interpreter keeps its own children.
#[derive(Debug, Default)]
pub struct Reaper {
    detached: Vec<Pid>,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a freshly spawned pipeline over.
    ///
    /// Foreground: blocks until every stage has terminated and returns the
    /// terminal stage's status. Background: returns `None` at once and
    /// remembers the pids for [`Reaper::sweep`].
    pub fn settle(&mut self, handle: PipelineHandle, background: bool) -> Option<WaitStatus> {
        if background {
            log::debug!("detached {:?}", handle.pids);
            self.detached.extend(handle.pids);
            return None;
        }

        let mut last = None;
        for pid in handle.pids {
            last = wait_blocking(pid);
            log::debug!("{} finished: {:?}", pid, last);
        }
        last
    }

    /// Reap whichever detached children have already terminated, without
    /// blocking. Returns how many were reaped.
    pub fn sweep(&mut self) -> usize {
        let before = self.detached.len();
        self.detached.retain(|&pid| !try_reap(pid));
        let reaped = before - self.detached.len();
        if reaped > 0 {
            log::debug!("reaped {} background process(es)", reaped);
        }
        reaped
    }

    /// Background children not reaped yet.
    pub fn detached(&self) -> &[Pid] {
        &self.detached
    }
}

fn wait_blocking(pid: Pid) -> Option<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                return Some(status);
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            // Already collected elsewhere.
            Err(Errno::ECHILD) => return None,
            Err(e) => {
                log::warn!("waitpid({}) failed: {}", pid, e);
                return None;
            }
        }
    }
}

/// True once `pid` is gone and needs no more attention.
fn try_reap(pid: Pid) -> bool {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => true,
        Ok(_) | Err(Errno::EINTR) => false,
        Err(Errno::ECHILD) => true,
        Err(e) => {
            log::warn!("waitpid({}) failed: {}", pid, e);
            true
        }
    }
}
