// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host user/group lookups

use std::ffi::{CStr, CString};

use memvfs_core::Identity;
use tracing::warn;

/// Real uid/gid of this process
pub fn process_identity() -> Identity {
    // SAFETY: getuid/getgid cannot fail and touch no memory
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    Identity::new(uid, gid)
}

/// Numeric uid for `name`: a plain number is taken as is
pub fn resolve_user(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse() {
        return Some(uid);
    }
    let c_name = CString::new(name).ok()?;
    // SAFETY: the returned pointer refers to static storage owned by libc
    // and is read before any other passwd call on this thread.
    unsafe {
        let entry = libc::getpwnam(c_name.as_ptr());
        if entry.is_null() {
            return None;
        }
        Some((*entry).pw_uid)
    }
}

/// Numeric gid for `name`: a plain number is taken as is
pub fn resolve_group(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse() {
        return Some(gid);
    }
    let c_name = CString::new(name).ok()?;
    // SAFETY: as for getpwnam
    unsafe {
        let entry = libc::getgrnam(c_name.as_ptr());
        if entry.is_null() {
            return None;
        }
        Some((*entry).gr_gid)
    }
}

/// Resolve a user, falling back to the root id for unknown names
pub fn user_or_root(name: &str) -> u32 {
    resolve_user(name).unwrap_or_else(|| {
        warn!(name, "unknown user, using root id");
        Identity::ROOT_ID
    })
}

/// Resolve a group, falling back to the root id for unknown names
pub fn group_or_root(name: &str) -> u32 {
    resolve_group(name).unwrap_or_else(|| {
        warn!(name, "unknown group, using root id");
        Identity::ROOT_ID
    })
}

/// Login name for `uid`, if the host knows one
pub fn user_name(uid: u32) -> Option<String> {
    // SAFETY: as for getpwnam; the name is copied out immediately
    unsafe {
        let entry = libc::getpwuid(uid);
        if entry.is_null() || (*entry).pw_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*entry).pw_name).to_string_lossy().into_owned())
    }
}

/// Group name for `gid`, if the host knows one
pub fn group_name(gid: u32) -> Option<String> {
    // SAFETY: as for getpwnam; the name is copied out immediately
    unsafe {
        let entry = libc::getgrgid(gid);
        if entry.is_null() || (*entry).gr_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*entry).gr_name).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_names_parse_directly() {
        assert_eq!(resolve_user("1234"), Some(1234));
        assert_eq!(resolve_group("0"), Some(0));
    }

    #[test]
    fn test_root_user_resolves() {
        assert_eq!(resolve_user("root"), Some(0));
        assert_eq!(user_name(0).as_deref(), Some("root"));
        assert!(group_name(0).is_some());
    }

    #[test]
    fn test_unknown_names_fall_back_to_root() {
        assert_eq!(resolve_user("no-such-user-memvfs"), None);
        assert_eq!(user_or_root("no-such-user-memvfs"), Identity::ROOT_ID);
        assert_eq!(group_or_root("no-such-group-memvfs"), Identity::ROOT_ID);
        assert_eq!(resolve_user("nul\0byte"), None);
    }

    #[test]
    fn test_process_identity_matches_libc() {
        let identity = process_identity();
        assert_eq!(identity.uid, unsafe { libc::getuid() });
    }
}
