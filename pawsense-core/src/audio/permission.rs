//! Microphone permission interface.
//!
//! Mobile hosts gate the microphone behind a runtime prompt; desktop hosts
//! prompt (if at all) when the stream opens. The engine queries the status
//! once at start and requests it when not granted, but does not gate capture
//! on the answer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::Undetermined => "undetermined",
        }
    }
}

pub trait MicrophonePermission: Send + Sync {
    fn status(&self) -> PermissionStatus;

    /// Ask the user (or OS) for access. Returns the resulting status.
    fn request(&self) -> PermissionStatus;
}

/// Desktop default: the OS handles consent when the input stream opens.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermission;

impl MicrophonePermission for SystemPermission {
    fn status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// Check the current status and issue one request when it is not granted.
///
/// Returns the final status. Callers decide what to do with it.
pub fn ensure_microphone_access(permission: &dyn MicrophonePermission) -> PermissionStatus {
    let status = permission.status();
    if status.is_granted() {
        return status;
    }
    tracing::info!(status = status.as_str(), "requesting microphone permission");
    permission.request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        initial: PermissionStatus,
        answer: PermissionStatus,
        requests: AtomicUsize,
    }

    impl MicrophonePermission for Scripted {
        fn status(&self) -> PermissionStatus {
            self.initial
        }

        fn request(&self) -> PermissionStatus {
            self.requests.fetch_add(1, Ordering::Relaxed);
            self.answer
        }
    }

    #[test]
    fn granted_status_skips_the_request() {
        let p = Scripted {
            initial: PermissionStatus::Granted,
            answer: PermissionStatus::Denied,
            requests: AtomicUsize::new(0),
        };
        assert_eq!(ensure_microphone_access(&p), PermissionStatus::Granted);
        assert_eq!(p.requests.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn undetermined_status_requests_once() {
        let p = Scripted {
            initial: PermissionStatus::Undetermined,
            answer: PermissionStatus::Denied,
            requests: AtomicUsize::new(0),
        };
        assert_eq!(ensure_microphone_access(&p), PermissionStatus::Denied);
        assert_eq!(p.requests.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn system_permission_is_granted() {
        assert!(SystemPermission.status().is_granted());
    }
}
