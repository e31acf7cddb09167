use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default forced restart period. Multicast on mesh links is unreliable
/// enough that peers only re-announce reliably when queried afresh.
pub const DEFAULT_RESTART_INTERVAL_SECS: u64 = 64;

/// Longest accepted restart period: one day.
pub const MAX_RESTART_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Domain browsed for service types.
pub const DEFAULT_BROWSE_DOMAIN: &str = "mesh.local";

/// Unicast DNS server consulted for wide-area DNS-SD.
pub const DEFAULT_WIDE_AREA_SERVER: &str = "192.168.50.1";

const SERVICES_FILE: &str = "services.json";
const SOCKET_FILE: &str = "meshsdd.sock";
const NAMESPACE: &str = "meshsd";

/// Default log filter expression used by the daemon.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default browse domain.
pub fn default_browse_domain() -> String {
    DEFAULT_BROWSE_DOMAIN.to_owned()
}

/// Default wide-area resolver.
pub fn default_wide_area_server() -> String {
    DEFAULT_WIDE_AREA_SERVER.to_owned()
}

/// Per-user directory for the lock, pid and health files.
pub fn default_runtime_dir() -> Utf8PathBuf {
    namespaced_base()
}

/// Management channel address inside the runtime directory.
pub fn default_management_socket() -> Utf8PathBuf {
    namespaced_base().join(SOCKET_FILE)
}

/// Default destination for service snapshots.
pub fn default_output_file() -> Utf8PathBuf {
    namespaced_base().join(SERVICES_FILE)
}

fn namespaced_base() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push(NAMESPACE);
    if apply_namespace {
        base.push(user_namespace());
    }
    base
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn user_namespace() -> String {
    String::from("default")
}
