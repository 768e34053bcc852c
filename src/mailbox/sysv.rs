//! System V message queue probe
//!
//! Clients of the daemon own kernel message queues; the registry only checks
//! that a presented identifier names one of them via `msgctl(IPC_STAT)`.

use super::{QueueHandle, QueueProbe};

/// Probe backed by the kernel's System V message queue table
#[derive(Debug, Default, Clone, Copy)]
pub struct SysvQueues;

impl SysvQueues {
    pub fn new() -> Self {
        Self
    }
}

impl QueueProbe for SysvQueues {
    #[cfg(target_os = "linux")]
    fn is_live(&self, handle: QueueHandle) -> bool {
        let Ok(id) = libc::c_int::try_from(handle.get()) else {
            return false;
        };

        // SAFETY: msqid_ds is plain old data and msgctl only writes into it.
        let mut stat: libc::msqid_ds = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::msgctl(id, libc::IPC_STAT, &mut stat) };
        if rc == 0 {
            return true;
        }

        // The queue exists but belongs to someone we may not read.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EACCES)
    }

    #[cfg(not(target_os = "linux"))]
    fn is_live(&self, _handle: QueueHandle) -> bool {
        false
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_probe_tracks_kernel_queue() {
        let id = unsafe { libc::msgget(libc::IPC_PRIVATE, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            eprintln!("System V message queues unavailable, skipping");
            return;
        }

        let handle = QueueHandle::new(id as u32);
        let probe = SysvQueues::new();
        assert!(probe.is_live(handle));

        let rc = unsafe { libc::msgctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
        assert_eq!(rc, 0);
        assert!(!probe.is_live(handle));
    }

    #[test]
    fn test_out_of_range_handle_is_dead() {
        assert!(!SysvQueues.is_live(QueueHandle::new(u32::MAX)));
    }
}
