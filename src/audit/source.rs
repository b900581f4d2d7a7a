//! The single seam between the check catalog and the host.
//!
//! Every check is a pure function of `(CheckContext, &dyn DataSource)`; the
//! live source is a thin wrapper over filesystem reads and `getifaddrs`,
//! while the stub backs the same operations with in-memory fixtures so the
//! whole catalog is deterministically testable.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Upper bound on a single pseudo-file read. Pathological entries under
/// `/proc` and `/sys` can report bogus sizes or stream forever.
const MAX_FILE_SIZE: usize = 4 * 1024 * 1024;

/// Read-only view of host state consumed by checks.
pub trait DataSource {
    /// Read a file's contents, bounded by [`MAX_FILE_SIZE`]. `None` means
    /// not readable / not present. Values are raw; callers trim.
    fn read(&self, path: &str) -> Option<String>;

    /// Look up a kernel command-line parameter. A bare `key` token yields
    /// `Some("")` (boolean-like flag), `key=value` yields `Some(value)`,
    /// absence yields `None`.
    fn cmdline_param(&self, key: &str) -> Option<String>;

    /// Entry names of a directory. `None` means not readable / not present.
    fn list_dir(&self, path: &str) -> Option<Vec<String>>;

    /// Count of (IPv4, IPv6) addresses assigned to the interface, from the
    /// OS interface list. `None` means enumeration failed.
    fn interface_addrs(&self, nic: &str) -> Option<(u32, u32)>;
}

/// Extract `key` from a kernel command line string.
fn cmdline_param_from(cmdline: &str, key: &str) -> Option<String> {
    for token in cmdline.split_whitespace() {
        match token.split_once('=') {
            None => {
                if token == key {
                    return Some(String::new());
                }
            }
            Some((name, value)) => {
                if name == key {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Live data source backed by the host filesystem and `/proc/cmdline`.
pub struct FsDataSource;

impl DataSource for FsDataSource {
    fn read(&self, path: &str) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 8192];
        loop {
            let got = file.read(&mut chunk).ok()?;
            if got == 0 {
                break;
            }
            let take = got.min(MAX_FILE_SIZE - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            if buf.len() >= MAX_FILE_SIZE {
                break;
            }
        }
        Some(String::from_utf8_lossy(&buf).into_owned())
    }

    fn cmdline_param(&self, key: &str) -> Option<String> {
        let cmdline = self.read("/proc/cmdline")?;
        cmdline_param_from(&cmdline, key)
    }

    fn list_dir(&self, path: &str) -> Option<Vec<String>> {
        let entries = std::fs::read_dir(Path::new(path)).ok()?;
        let mut names = Vec::new();
        for entry in entries.flatten() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Some(names)
    }

    fn interface_addrs(&self, nic: &str) -> Option<(u32, u32)> {
        interface_addr_counts(nic)
    }
}

/// Walk `getifaddrs` and count IPv4/IPv6 addresses on `nic`.
fn interface_addr_counts(nic: &str) -> Option<(u32, u32)> {
    let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs allocates the list; we free it below on all paths.
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return None;
    }

    let mut v4 = 0u32;
    let mut v6 = 0u32;
    let mut cursor = addrs;
    while !cursor.is_null() {
        // SAFETY: cursor is a valid node of the list returned by getifaddrs.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_name.is_null() || entry.ifa_addr.is_null() {
            continue;
        }
        // SAFETY: ifa_name is a NUL-terminated C string owned by the list.
        let name = unsafe { std::ffi::CStr::from_ptr(entry.ifa_name) };
        if name.to_string_lossy() != nic {
            continue;
        }
        // SAFETY: ifa_addr points at a sockaddr with a valid sa_family.
        match unsafe { (*entry.ifa_addr).sa_family } as i32 {
            libc::AF_INET => v4 += 1,
            libc::AF_INET6 => v6 += 1,
            _ => {}
        }
    }

    // SAFETY: addrs came from getifaddrs above.
    unsafe { libc::freeifaddrs(addrs) };
    Some((v4, v6))
}

/// In-memory data source for tests: a path→content map, a cmdline string,
/// and optional interface address counts.
#[derive(Default)]
pub struct StubDataSource {
    files: HashMap<String, String>,
    cmdline: Option<String>,
    addrs: HashMap<String, (u32, u32)>,
}

impl StubDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pseudo-file.
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    /// Seed the kernel command line.
    pub fn with_cmdline(mut self, cmdline: &str) -> Self {
        self.cmdline = Some(cmdline.to_string());
        self
    }

    /// Seed interface address counts for `nic`.
    pub fn with_interface_addrs(mut self, nic: &str, v4: u32, v6: u32) -> Self {
        self.addrs.insert(nic.to_string(), (v4, v6));
        self
    }
}

impl DataSource for StubDataSource {
    fn read(&self, path: &str) -> Option<String> {
        if path == "/proc/cmdline" {
            if let Some(cmdline) = &self.cmdline {
                return Some(cmdline.clone());
            }
        }
        self.files.get(path).cloned()
    }

    fn cmdline_param(&self, key: &str) -> Option<String> {
        cmdline_param_from(self.cmdline.as_deref()?, key)
    }

    fn list_dir(&self, path: &str) -> Option<Vec<String>> {
        // Derive the listing from seeded paths: the first component below
        // `path` of every seeded file that lives under it.
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut names: Vec<String> = Vec::new();
        for file in self.files.keys() {
            if let Some(rest) = file.strip_prefix(&prefix) {
                let first = rest.split('/').next().unwrap_or(rest);
                if !first.is_empty() && !names.iter().any(|n| n == first) {
                    names.push(first.to_string());
                }
            }
        }
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }

    fn interface_addrs(&self, nic: &str) -> Option<(u32, u32)> {
        self.addrs.get(nic).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_stub_read_absent_path() {
        let stub = StubDataSource::new();
        assert_eq!(stub.read("/no/such/file"), None);
    }

    #[test]
    fn test_stub_cmdline_param_with_value() {
        let stub = StubDataSource::new().with_cmdline("a foo=bar baz");
        assert_eq!(stub.cmdline_param("foo").as_deref(), Some("bar"));
    }

    #[test]
    fn test_stub_cmdline_param_boolean_flag() {
        let stub = StubDataSource::new().with_cmdline("a foo baz");
        assert_eq!(stub.cmdline_param("foo").as_deref(), Some(""));
    }

    #[test]
    fn test_stub_cmdline_param_absent() {
        let stub = StubDataSource::new().with_cmdline("a bar");
        assert_eq!(stub.cmdline_param("foo"), None);
    }

    #[test]
    fn test_stub_cmdline_param_no_cmdline() {
        let stub = StubDataSource::new();
        assert_eq!(stub.cmdline_param("foo"), None);
    }

    #[test]
    fn test_stub_cmdline_key_prefix_does_not_match() {
        let stub = StubDataSource::new().with_cmdline("foobar=1 foo2=2");
        assert_eq!(stub.cmdline_param("foo"), None);
    }

    #[test]
    fn test_stub_list_dir_from_seeded_paths() {
        let stub = StubDataSource::new()
            .with_file("/sys/class/net/eth0/queues/rx-0/rps_cpus", "0")
            .with_file("/sys/class/net/eth0/queues/rx-1/rps_cpus", "0")
            .with_file("/sys/class/net/eth0/queues/tx-0/xps_cpus", "0");
        let mut names = stub.list_dir("/sys/class/net/eth0/queues").unwrap();
        names.sort();
        assert_eq!(names, vec!["rx-0", "rx-1", "tx-0"]);
        assert_eq!(stub.list_dir("/sys/class/net/eth1/queues"), None);
    }

    #[test]
    fn test_fs_read_and_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "performance").unwrap();

        let fs = FsDataSource;
        let content = fs.read(path.to_str().unwrap()).unwrap();
        assert_eq!(content.trim(), "performance");
        assert_eq!(fs.read(dir.path().join("absent").to_str().unwrap()), None);
    }

    #[test]
    fn test_fs_list_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rx-0")).unwrap();
        std::fs::create_dir(dir.path().join("rx-1")).unwrap();

        let fs = FsDataSource;
        let mut names = fs.list_dir(dir.path().to_str().unwrap()).unwrap();
        names.sort();
        assert_eq!(names, vec!["rx-0", "rx-1"]);
    }
}
