//! Process lifecycle helpers for the update hand-off.
//!
//! The application and the updater coordinate only through the command file
//! and the liveness of the parent's pid; there is no shared memory. These
//! helpers cover both directions of that coordination: waiting for a pid to
//! disappear, and launching a child that survives the caller's exit.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Interval between liveness polls while waiting for a process to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of waiting for a process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The process was observed alive and exited within the timeout.
    Exited,
    /// The process was already gone at the first check. Treated as success:
    /// the parent may simply have exited before we started looking.
    AlreadyGone,
    /// The process was still alive when the timeout elapsed.
    TimedOut,
}

/// Poll until `pid` no longer exists or `timeout` elapses.
///
/// The overall deadline is respected regardless of how long individual
/// polls take; the loop never busy-spins.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> WaitOutcome {
    if !is_alive(pid) {
        return WaitOutcome::AlreadyGone;
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
        if !is_alive(pid) {
            return WaitOutcome::Exited;
        }
    }

    WaitOutcome::TimedOut
}

/// Launch a process fully disassociated from the caller's process group and
/// session, with stdio detached, so its lifetime does not depend on the
/// caller surviving. Returns the child's pid.
pub fn spawn_detached(path: &Path, args: &[String]) -> io::Result<u32> {
    let mut cmd = Command::new(path);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    configure_detached(&mut cmd);

    let child = cmd.spawn()?;
    Ok(child.id())
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Signal 0 checks for existence without delivering anything. EPERM
    // means the process exists but belongs to another user.
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
fn is_alive(pid: u32) -> bool {
    use windows::Win32::Foundation::{CloseHandle, WAIT_TIMEOUT};
    use windows::Win32::System::Threading::{
        OpenProcess, WaitForSingleObject, PROCESS_SYNCHRONIZE,
    };

    let handle = match unsafe { OpenProcess(PROCESS_SYNCHRONIZE, false, pid) } {
        Ok(handle) => handle,
        Err(_) => return false,
    };

    // Zero-timeout wait: WAIT_TIMEOUT means the process has not signalled
    // its handle yet, i.e. it is still running.
    let event = unsafe { WaitForSingleObject(handle, 0) };
    unsafe {
        let _ = CloseHandle(handle);
    }
    event == WAIT_TIMEOUT
}

#[cfg(unix)]
fn configure_detached(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // New session: the child leaves the caller's process group, so it is not
    // signalled when the caller's session or terminal goes away.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(|e| io::Error::from_raw_os_error(e as i32))
        });
    }
}

#[cfg(windows)]
fn configure_detached(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Spawn a short-lived process, reap it, and return its (now dead) pid.
    fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_wait_for_exit_already_gone_returns_immediately() {
        let pid = dead_pid();

        let start = Instant::now();
        let outcome = wait_for_exit(pid, Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::AlreadyGone);
        // No poll sleep should have happened.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_for_exit_observes_exit() {
        let mut child = Command::new("sleep").arg("0.3").spawn().unwrap();
        let pid = child.id();

        // Reap in the background so the pid actually disappears instead of
        // lingering as a zombie.
        let reaper = std::thread::spawn(move || {
            let _ = child.wait();
        });

        let outcome = wait_for_exit(pid, Duration::from_secs(5));
        assert!(matches!(
            outcome,
            WaitOutcome::Exited | WaitOutcome::AlreadyGone
        ));
        reaper.join().unwrap();
    }

    #[test]
    fn test_wait_for_exit_times_out_on_living_process() {
        let mut child = Command::new("sleep").arg("10").spawn().unwrap();
        let pid = child.id();

        let outcome = wait_for_exit(pid, Duration::from_millis(300));
        assert_eq!(outcome, WaitOutcome::TimedOut);

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_spawn_detached_returns_pid() {
        let pid = spawn_detached(Path::new("true"), &[]).unwrap();
        assert!(pid > 0);
    }

    #[test]
    fn test_spawn_detached_missing_binary_is_error() {
        let err = spawn_detached(Path::new("/nonexistent/binary"), &[]);
        assert!(err.is_err());
    }
}
