//! Turns pipeline stages into running processes.
//!
//! Every inter-stage pipe is created before the first fork. The parent drops
//! each pipe as soon as both of its ends belong to a child, and whatever is
//! left when spawning stops is closed when the [`PipeSet`] goes out of scope.
//! A child closes every pipe descriptor it inherited before replacing its
//! image, so the only writers a pipe ever has are the stage feeding it.

use std::ffi::{CString, c_char};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::ptr;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc::{self, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult};

use crate::command::Stage;
use crate::error::{ERROR_MESSAGE, SpawnError, StageError};
use crate::job::PipelineHandle;
use crate::search::SearchPath;

/// Spawning stopped part way through.
///
/// Stages in `spawned` are already running; they are not killed, only
/// reaped like any other pipeline.
#[derive(Debug)]
pub struct SpawnFailure {
    pub spawned: PipelineHandle,
    pub error: SpawnError,
}

/// Start one process per stage, wired together with pipes.
pub fn spawn(
    stages: &[Stage<'_>],
    search_path: &SearchPath,
) -> Result<PipelineHandle, SpawnFailure> {
    let fail = |error| SpawnFailure {
        spawned: PipelineHandle::default(),
        error,
    };

    let prepared = stages
        .iter()
        .map(|stage| PreparedStage::new(stage, search_path))
        .collect::<Result<Vec<_>, _>>()
        .map_err(fail)?;
    let mut pipes = PipeSet::allocate(prepared.len().saturating_sub(1)).map_err(fail)?;

    // Anything still buffered would be written once by every child.
    let _ = io::stdout().flush();

    let last = prepared.len().saturating_sub(1);
    let mut handle = PipelineHandle::with_capacity(prepared.len());
    for (i, stage) in prepared.iter().enumerate() {
        let stdin = if i > 0 { pipes.read_end(i - 1) } else { None };
        let stdout = if i < last { pipes.write_end(i) } else { None };

        // SAFETY: the child neither allocates nor takes locks before it execs
        // or exits. Everything `execv` needs was built in `PreparedStage`.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => run_child(stage, stdin, stdout, &pipes),
            Ok(ForkResult::Parent { child }) => {
                log::debug!("stage {} {:?} -> pid {}", i, stage.argv, child);
                handle.push(child);
                if i > 0 {
                    pipes.release(i - 1);
                }
            }
            Err(errno) => {
                return Err(SpawnFailure {
                    spawned: handle,
                    error: SpawnError::Fork(errno),
                });
            }
        }
    }
    Ok(handle)
}

/// A stage converted to what `execv` and `open` need, done before forking so
/// the child never allocates.
#[derive(Debug)]
struct PreparedStage {
    argv: Vec<CString>,
    /// Null-terminated pointers into `argv`.
    argv_ptrs: Vec<*const c_char>,
    candidates: Vec<CString>,
    redirect_out: Option<CString>,
}

impl PreparedStage {
    fn new(stage: &Stage<'_>, search_path: &SearchPath) -> Result<Self, SpawnError> {
        let argv = stage
            .argv
            .iter()
            .map(|&arg| CString::new(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let candidates = search_path.resolve_c(stage.program())?;
        let redirect_out = stage.redirect_out.map(CString::new).transpose()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain([ptr::null()])
            .collect();
        Ok(Self {
            argv,
            argv_ptrs,
            candidates,
            redirect_out,
        })
    }
}

struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

/// The `N-1` pipes of an `N` stage pipeline. Pipe `i` carries data from stage
/// `i` to stage `i+1`.
struct PipeSet {
    pipes: Vec<Option<Pipe>>,
}

impl PipeSet {
    fn allocate(count: usize) -> Result<Self, SpawnError> {
        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            // Programs that other code forks must not inherit these.
            let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(SpawnError::Pipe)?;
            pipes.push(Some(Pipe { read, write }));
        }
        Ok(Self { pipes })
    }

    fn read_end(&self, i: usize) -> Option<RawFd> {
        self.pipes[i].as_ref().map(|p| p.read.as_raw_fd())
    }

    fn write_end(&self, i: usize) -> Option<RawFd> {
        self.pipes[i].as_ref().map(|p| p.write.as_raw_fd())
    }

    /// Close both ends of pipe `i` in this process.
    fn release(&mut self, i: usize) {
        self.pipes[i] = None;
    }

    /// Close every descriptor still held, by hand. Only for a forked child,
    /// which never returns and so never runs the destructors.
    fn close_inherited(&self) {
        for pipe in self.pipes.iter().flatten() {
            let _ = unistd::close(pipe.read.as_raw_fd());
            let _ = unistd::close(pipe.write.as_raw_fd());
        }
    }
}

fn run_child(
    stage: &PreparedStage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    pipes: &PipeSet,
) -> ! {
    let error = exec_stage(stage, stdin, stdout, pipes);
    let _ = unistd::write(io::stderr(), ERROR_MESSAGE.as_bytes());
    let _ = unistd::write(io::stderr(), b"\n");
    // SAFETY: skips atexit handlers and stdio flushing that belong to the parent.
    unsafe { libc::_exit(error.exit_code()) }
}

/// Wire up the standard streams and replace the process image. Only returns
/// on failure.
fn exec_stage(
    stage: &PreparedStage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    pipes: &PipeSet,
) -> StageError {
    if let Some(fd) = stdin {
        if let Err(e) = unistd::dup2(fd, STDIN_FILENO) {
            return StageError::ExecFailed(e);
        }
    }

    match (stdout, &stage.redirect_out) {
        (Some(fd), _) => {
            if let Err(e) = unistd::dup2(fd, STDOUT_FILENO) {
                return StageError::ExecFailed(e);
            }
        }
        (None, Some(path)) => {
            if let Err(e) = redirect_stdout(path) {
                return StageError::Redirect(e);
            }
        }
        (None, None) => {}
    }

    pipes.close_inherited();
    exec_candidates(stage)
}

/// Point stdout at `path`, created with mode 0644 and truncated.
fn redirect_stdout(path: &CString) -> Result<(), Errno> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    let fd = fcntl::open(path.as_c_str(), OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, mode)?;
    if fd != STDOUT_FILENO {
        unistd::dup2(fd, STDOUT_FILENO)?;
        unistd::close(fd)?;
    }
    Ok(())
}

/// Try each candidate in turn; the first one that launches never returns.
fn exec_candidates(stage: &PreparedStage) -> StageError {
    let mut failure = StageError::CommandNotFound;
    for path in &stage.candidates {
        // SAFETY: `argv_ptrs` is null-terminated and points into `stage.argv`,
        // which outlives the call.
        unsafe { libc::execv(path.as_ptr(), stage.argv_ptrs.as_ptr()) };
        match Errno::last() {
            Errno::ENOENT | Errno::ENOTDIR => {}
            other => failure = StageError::ExecFailed(other),
        }
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Reaper;
    use nix::fcntl::{FcntlArg, FdFlag};
    use nix::sys::stat::{self, SFlag};
    use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn system_path() -> SearchPath {
        SearchPath::new(vec!["/usr/bin".into(), "/bin".into()])
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pipeline_{}_{}", name, std::process::id()))
    }

    fn stage<'a>(argv: &[&'a str], redirect_out: Option<&'a str>) -> Stage<'a> {
        Stage {
            argv: argv.to_vec(),
            redirect_out,
        }
    }

    fn run_foreground(
        stages: &[Stage<'_>],
        path: &SearchPath,
    ) -> (Vec<nix::unistd::Pid>, Option<WaitStatus>) {
        let handle = spawn(stages, path).unwrap();
        let pids = handle.pids().to_vec();
        let status = Reaper::new().settle(handle, false);
        (pids, status)
    }

    #[test]
    fn three_stage_pipeline_matches_direct_composition() {
        let out = temp_file("three_stage");
        let out_str = out.to_str().unwrap();
        let stages = [
            stage(&["printf", "foo"], None),
            stage(&["cat"], None),
            stage(&["wc", "-c"], Some(out_str)),
        ];

        let (pids, status) = run_foreground(&stages, &system_path());

        assert_eq!(pids.len(), 3);
        assert_eq!(status, Some(WaitStatus::Exited(pids[2], 0)));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");
        for pid in pids {
            assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
        }
        let _ = fs::remove_file(out);
    }

    #[test]
    fn redirect_creates_and_truncates() {
        let out = temp_file("truncate");
        let out_str = out.to_str().unwrap();
        fs::write(&out, "much longer previous content\n").unwrap();

        let stages = [stage(&["echo", "hi"], Some(out_str))];
        run_foreground(&stages, &system_path());
        run_foreground(&stages, &system_path());

        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
        let _ = fs::remove_file(out);
    }

    #[test]
    fn redirect_file_gets_mode_0644() {
        use std::os::unix::fs::PermissionsExt;

        let out = temp_file("mode");
        let _ = fs::remove_file(&out);
        let out_str = out.to_str().unwrap();
        run_foreground(&[stage(&["true"], Some(out_str))], &system_path());

        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        // The umask can only take bits away.
        assert_eq!(mode & !0o644, 0);
        assert_ne!(mode & 0o600, 0);
        let _ = fs::remove_file(out);
    }

    #[test]
    fn only_terminal_stage_output_reaches_the_file() {
        let out = temp_file("terminal_only");
        let out_str = out.to_str().unwrap();
        let stages = [
            stage(&["echo", "one", "two"], None),
            stage(&["wc", "-w"], Some(out_str)),
        ];
        run_foreground(&stages, &system_path());

        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");
        let _ = fs::remove_file(out);
    }

    #[test]
    fn unknown_program_fails_only_its_own_stage() {
        let out = temp_file("not_found");
        let out_str = out.to_str().unwrap();
        let stages = [
            stage(&["no-such-program-anywhere"], None),
            stage(&["wc", "-c"], Some(out_str)),
        ];

        let (pids, status) = run_foreground(&stages, &system_path());

        assert_eq!(pids.len(), 2);
        assert_eq!(status, Some(WaitStatus::Exited(pids[1], 0)));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
        let _ = fs::remove_file(out);
    }

    #[test]
    fn empty_search_path_means_command_not_found() {
        let stages = [stage(&["echo", "hi"], None)];
        let (pids, status) = run_foreground(&stages, &SearchPath::new(Vec::new()));
        assert_eq!(status, Some(WaitStatus::Exited(pids[0], 127)));
    }

    #[test]
    fn search_path_order_is_respected() {
        let out = temp_file("order");
        let out_str = out.to_str().unwrap();
        let path = SearchPath::new(vec![
            "/definitely/missing".into(),
            "/usr/bin".into(),
            "/bin".into(),
        ]);

        let (pids, status) = run_foreground(&[stage(&["echo", "found"], Some(out_str))], &path);

        assert_eq!(status, Some(WaitStatus::Exited(pids[0], 0)));
        assert_eq!(fs::read_to_string(&out).unwrap(), "found\n");
        let _ = fs::remove_file(out);
    }

    #[test]
    fn directory_as_program_is_exec_failure() {
        let root = SearchPath::new(vec!["/".into()]);
        let (pids, status) = run_foreground(&[stage(&["tmp"], None)], &root);
        assert_eq!(status, Some(WaitStatus::Exited(pids[0], 126)));
    }

    #[test]
    fn unopenable_redirect_fails_only_the_terminal_stage() {
        let stages = [
            stage(&["echo", "hi"], None),
            stage(&["cat"], Some("/definitely/missing/dir/out.txt")),
        ];
        let (pids, status) = run_foreground(&stages, &system_path());
        assert_eq!(status, Some(WaitStatus::Exited(pids[1], 1)));
    }

    #[test]
    fn nul_byte_spawns_nothing() {
        let err = spawn(&[stage(&["echo", "a\0b"], None)], &system_path()).unwrap_err();
        assert!(err.spawned.is_empty());
        assert!(matches!(err.error, SpawnError::InvalidArgument(_)));
    }

    #[test]
    fn pipe_set_marks_ends_close_on_exec_and_releases_them() {
        let mut pipes = PipeSet::allocate(2).unwrap();
        for i in 0..2 {
            for fd in [pipes.read_end(i).unwrap(), pipes.write_end(i).unwrap()] {
                let flags = fcntl::fcntl(fd, FcntlArg::F_GETFD).unwrap();
                assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
            }
        }

        pipes.release(0);
        assert_eq!(pipes.read_end(0), None);
        assert_eq!(pipes.write_end(0), None);
        assert!(pipes.read_end(1).is_some());
    }

    /// Bit `fd` is set for each pipe end an exec would keep open.
    fn inheritable_pipes() -> u64 {
        (3..64)
            .filter(|&fd| {
                let is_fifo = stat::fstat(fd).is_ok_and(|st| {
                    SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT == SFlag::S_IFIFO
                });
                let cloexec = fcntl::fcntl(fd, FcntlArg::F_GETFD)
                    .map(FdFlag::from_bits_truncate)
                    .is_ok_and(|flags| flags.contains(FdFlag::FD_CLOEXEC));
                is_fifo && !cloexec
            })
            .fold(0, |mask, fd| mask | 1u64 << fd)
    }

    #[test]
    fn pipes_are_close_on_exec_from_creation() {
        // Whatever the test runner itself handed down is not ours.
        let inherited = inheritable_pipes();
        let done = Arc::new(AtomicBool::new(false));
        let allocator = {
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let _ = PipeSet::allocate(4);
                }
            })
        };

        let mut leaked = 0;
        for _ in 0..2000 {
            // SAFETY: the child only inspects descriptors and exits.
            match unsafe { unistd::fork() }.unwrap() {
                ForkResult::Child => {
                    let leaked = inheritable_pipes() & !inherited != 0;
                    unsafe { libc::_exit(leaked as i32) }
                }
                ForkResult::Parent { child } => {
                    if waitpid(child, None) != Ok(WaitStatus::Exited(child, 0)) {
                        leaked += 1;
                    }
                }
            }
        }
        done.store(true, Ordering::Relaxed);
        allocator.join().unwrap();

        assert_eq!(leaked, 0);
    }
}
