//! Administrator privilege check.

use crate::error::{AcquireError, Result};

/// Whether the process runs with administrator-equivalent privilege
#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows::Win32::UI::Shell::IsUserAnAdmin;
    unsafe { IsUserAnAdmin() }.as_bool()
}

/// Whether the process runs with administrator-equivalent privilege
#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Whether the process runs with administrator-equivalent privilege
#[cfg(not(any(windows, unix)))]
pub fn is_elevated() -> bool {
    false
}

/// Fail with [`AcquireError::Privilege`] unless elevated
pub fn ensure_elevated() -> Result<()> {
    if is_elevated() {
        tracing::debug!("running with administrator privileges");
        Ok(())
    } else {
        tracing::error!("administrator privileges are required");
        Err(AcquireError::Privilege)
    }
}
