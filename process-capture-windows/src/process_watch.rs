//! Liveness of the capture target process.

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{OpenProcess, WaitForSingleObject, PROCESS_SYNCHRONIZE};

use process_capture_core::models::error::ActivationError;

use crate::hresult;

/// A synchronize-only handle on the target process.
///
/// Process loopback on a process that already exited activates fine and
/// then delivers nothing, so the target is checked before activation and
/// periodically while capturing.
pub(crate) struct ProcessWatch {
    pid: u32,
    handle: HANDLE,
}

impl ProcessWatch {
    pub(crate) fn open(pid: u32) -> Result<Self, ActivationError> {
        let handle = unsafe { OpenProcess(PROCESS_SYNCHRONIZE, false, pid) }
            .map_err(|e| hresult::activation_error(e.code(), Some(pid)))?;
        let watch = Self { pid, handle };
        if watch.has_exited() {
            return Err(ActivationError::TargetNotFound(pid));
        }
        Ok(watch)
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn has_exited(&self) -> bool {
        unsafe { WaitForSingleObject(self.handle, 0) } == WAIT_OBJECT_0
    }
}

impl Drop for ProcessWatch {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
