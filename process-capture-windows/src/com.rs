//! COM apartment and MMCSS scoping for WASAPI threads.

use windows::core::w;
use windows::Win32::Foundation::{HANDLE, RPC_E_CHANGED_MODE};
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};
use windows::Win32::System::Threading::{AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW};

/// Joins the multithreaded apartment on the current thread and leaves it
/// again on drop. Must be dropped on the thread that created it.
pub(crate) struct ComGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    pub(crate) fn enter_mta() -> windows::core::Result<Self> {
        // S_FALSE (already in the MTA) still needs a balancing CoUninitialize.
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.ok()?;
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// Make sure the calling thread can make COM calls.
///
/// Used on caller threads we do not own, so the apartment is never left.
/// A thread already in an STA keeps it.
pub(crate) fn ensure_com() -> windows::core::Result<()> {
    let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
    if hr == RPC_E_CHANGED_MODE {
        return Ok(());
    }
    hr.ok()
}

/// Registers the current thread with the "Pro Audio" MMCSS task.
pub(crate) struct MmcssGuard {
    handle: HANDLE,
}

impl MmcssGuard {
    pub(crate) fn register() -> windows::core::Result<Self> {
        let mut task_index: u32 = 0;
        let handle = unsafe { AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) }?;
        log::debug!("capture thread registered with MMCSS (task {})", task_index);
        Ok(Self { handle })
    }
}

impl Drop for MmcssGuard {
    fn drop(&mut self) {
        if let Err(e) = unsafe { AvRevertMmThreadCharacteristics(self.handle) } {
            log::warn!("failed to revert MMCSS registration: {}", e);
        }
    }
}
