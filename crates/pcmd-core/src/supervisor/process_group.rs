//! Signalling a supervised child's process group

use std::io;

/// Send SIGKILL to the process group led by `pid`, falling back to `pid`
/// alone if the group cannot be signalled.
///
/// A process (or group) that no longer exists counts as success.
pub(crate) fn kill_group(pid: u32) -> io::Result<()> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("pid {pid} out of range"),
        ));
    };
    if pid <= 0 {
        return Ok(());
    }

    // SAFETY: kill(2) has no memory-safety preconditions.
    let group_err = match unsafe { libc::kill(-pid, libc::SIGKILL) } {
        0 => return Ok(()),
        _ => io::Error::last_os_error(),
    };

    // SAFETY: as above.
    let pid_err = match unsafe { libc::kill(pid, libc::SIGKILL) } {
        0 => return Ok(()),
        _ => io::Error::last_os_error(),
    };

    if is_gone(&group_err) || is_gone(&pid_err) {
        return Ok(());
    }

    Err(io::Error::new(
        pid_err.kind(),
        format!("kill(-{pid}) failed: {group_err}; kill({pid}) failed: {pid_err}"),
    ))
}

fn is_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_kill_group_ignores_zero_pid() {
        assert!(kill_group(0).is_ok());
    }

    #[test]
    fn test_kill_group_kills_group_members() {
        use std::os::unix::process::CommandExt;

        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 & wait"])
            .process_group(0)
            .spawn()
            .unwrap();

        kill_group(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_kill_group_tolerates_reaped_child() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        // The pid may be reused in theory; in practice it is free right after reaping.
        assert!(kill_group(pid).is_ok());
    }
}
