/// Whether the current process may reconfigure the network stack.
pub trait PrivilegeCheck: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Asks the operating system.
///
/// On Windows this is membership in the built-in administrators group; on Unix the effective
/// user must be named `root`. Escalation is never attempted.
#[derive(Default)]
pub struct SystemPrivilege;

impl PrivilegeCheck for SystemPrivilege {
    #[cfg(windows)]
    fn is_elevated(&self) -> bool {
        // SAFETY: IsUserAnAdmin takes no arguments and only inspects the process token.
        unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
    }

    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        effective_user_name().as_deref() == Some("root")
    }

    #[cfg(not(any(windows, unix)))]
    fn is_elevated(&self) -> bool {
        false
    }
}

#[cfg(unix)]
fn effective_user_name() -> Option<String> {
    use std::ffi::CStr;

    // SAFETY: getpwuid returns either null or a pointer to a static passwd record, which is
    // copied out before any other libc call can overwrite it.
    unsafe {
        let passwd = libc::getpwuid(libc::geteuid());
        if passwd.is_null() || (*passwd).pw_name.is_null() {
            return None;
        }
        Some(
            CStr::from_ptr((*passwd).pw_name)
                .to_string_lossy()
                .into_owned(),
        )
    }
}
