//! Host platform helpers: naming, CPU count and the host clocks that
//! calibrated timestamps are compared against.

use tracing::warn;

/// Returns the platform name string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    { "windows" }
    #[cfg(target_os = "linux")]
    { "linux" }
    #[cfg(target_os = "macos")]
    { "macos" }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    { "unknown" }
}

/// Number of logical CPUs, falling back to 1 when the host won't say.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Host clocks a device time domain may be calibrated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClock {
    Monotonic,
    MonotonicRaw,
    QueryPerformanceCounter,
}

impl HostClock {
    /// Whether this clock can be read on the current platform.
    pub fn is_available(self) -> bool {
        match self {
            #[cfg(unix)]
            HostClock::Monotonic => true,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            HostClock::MonotonicRaw => true,
            #[cfg(windows)]
            HostClock::QueryPerformanceCounter => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Current reading in the clock's native unit, or `None` if the clock
    /// is unavailable here.
    pub fn now(self) -> Option<u64> {
        match self {
            #[cfg(unix)]
            HostClock::Monotonic => read_clock_gettime(libc::CLOCK_MONOTONIC),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            HostClock::MonotonicRaw => read_clock_gettime(libc::CLOCK_MONOTONIC_RAW),
            #[cfg(windows)]
            HostClock::QueryPerformanceCounter => read_qpc(),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Ticks per second of the clock.
    pub fn frequency(self) -> Option<u64> {
        match self {
            #[cfg(unix)]
            HostClock::Monotonic | HostClock::MonotonicRaw => Some(1_000_000_000),
            #[cfg(windows)]
            HostClock::QueryPerformanceCounter => qpc_frequency(),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

#[cfg(unix)]
fn read_clock_gettime(clock: libc::clockid_t) -> Option<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid out-pointer for the duration of the call.
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        warn!("clock_gettime({}) failed: {}", clock, std::io::Error::last_os_error());
        return None;
    }
    Some(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

#[cfg(windows)]
fn read_qpc() -> Option<u64> {
    let mut value: i64 = 0;
    // SAFETY: value is a valid out-pointer for the duration of the call.
    let ok = unsafe { windows_sys::Win32::System::Performance::QueryPerformanceCounter(&mut value) };
    if ok == 0 {
        warn!("QueryPerformanceCounter failed: {}", std::io::Error::last_os_error());
        return None;
    }
    Some(value as u64)
}

#[cfg(windows)]
fn qpc_frequency() -> Option<u64> {
    let mut value: i64 = 0;
    // SAFETY: value is a valid out-pointer for the duration of the call.
    let ok = unsafe { windows_sys::Win32::System::Performance::QueryPerformanceFrequency(&mut value) };
    if ok == 0 {
        warn!("QueryPerformanceFrequency failed: {}", std::io::Error::last_os_error());
        return None;
    }
    Some(value as u64)
}
