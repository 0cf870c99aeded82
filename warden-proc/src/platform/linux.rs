//! `/proc` walker.

use std::{fs, io, path::PathBuf};

use super::RawProcess;

/// Enumerate every readable pid under `/proc`.
///
/// A process that vanishes or denies access mid-read is skipped; only a
/// failure to read the `/proc` root itself is an error.
pub(crate) fn enumerate() -> io::Result<Vec<RawProcess>> {
    let mut processes = Vec::with_capacity(256);

    for entry in fs::read_dir("/proc")? {
        let Ok(entry) = entry else { continue };
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(process) = read_one(pid) {
            processes.push(process);
        }
    }

    Ok(processes)
}

/// Read one pid's attributes. Returns `None` when the process is gone;
/// individually unreadable attributes are left empty.
pub(crate) fn read_one(pid: u32) -> Option<RawProcess> {
    let base = PathBuf::from("/proc").join(pid.to_string());

    // `status` carries both the short name and the parent pid; if it is
    // unreadable the process has exited (or is invisible to us) and the
    // record is dropped entirely.
    let status = fs::read_to_string(base.join("status")).ok()?;
    let mut name = String::new();
    let mut ppid = 0;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Name:") {
            name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("PPid:") {
            ppid = rest.trim().parse().unwrap_or(0);
        }
    }

    let path = fs::read_link(base.join("exe"))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cmdline = fs::read(base.join("cmdline"))
        .map(|bytes| cmdline_to_string(&bytes))
        .unwrap_or_default();

    Some(RawProcess {
        pid,
        ppid,
        name,
        path,
        cmdline,
    })
}

/// `/proc/<pid>/cmdline` is NUL-separated with a trailing NUL.
fn cmdline_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .replace('\0', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdline_separators_become_spaces() {
        assert_eq!(cmdline_to_string(b"sleep\x00300\x00"), "sleep 300");
        assert_eq!(cmdline_to_string(b""), "");
    }

    #[test]
    fn enumerate_sees_ourselves() {
        let own_pid = std::process::id();
        let processes = enumerate().expect("/proc must be readable");
        let me = processes
            .iter()
            .find(|p| p.pid == own_pid)
            .expect("own pid should be enumerated");
        assert!(!me.name.is_empty());
    }

    #[test]
    fn read_one_of_missing_pid_is_none() {
        // Pid 0 has no /proc entry.
        assert!(read_one(0).is_none());
    }
}
