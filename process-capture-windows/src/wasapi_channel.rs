//! `CaptureChannel` over an initialized WASAPI loopback client.

use std::time::{Duration, Instant};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY, AUDCLNT_BUFFERFLAGS_SILENT,
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK, WAVEFORMATEX,
};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use process_capture_core::models::error::{ActivationError, ChannelError};
use process_capture_core::models::format::StreamFormat;
use process_capture_core::traits::capture_channel::{CaptureChannel, Segment};

use crate::com::{ComGuard, MmcssGuard};
use crate::hresult;
use crate::process_watch::ProcessWatch;

/// Shared-mode buffer requested from the engine, in 100 ns units (200 ms).
const BUFFER_DURATION: i64 = 2_000_000;

/// How often the target process is checked while capturing.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(250);

/// Auto-reset event signaled by the audio engine when a packet is ready.
struct EngineEvent(HANDLE);

impl EngineEvent {
    fn create() -> windows::core::Result<Self> {
        let handle = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }?;
        Ok(Self(handle))
    }
}

impl Drop for EngineEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// An initialized loopback client ready to be started.
///
/// Field order is drop order: MMCSS is reverted and the COM objects are
/// released before the capture thread leaves the apartment.
pub struct WasapiChannel {
    mmcss: Option<MmcssGuard>,
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    event: Option<EngineEvent>,
    watch: Option<ProcessWatch>,
    format: StreamFormat,
    last_liveness_check: Instant,
    com: Option<ComGuard>,
}

// SAFETY: the clients are created in the MTA and are only used by one
// thread at a time; the session hands the channel to its capture thread
// and never touches it again.
unsafe impl Send for WasapiChannel {}

impl WasapiChannel {
    /// Initialize a loopback channel, event-driven when asked and
    /// supported, otherwise polled.
    ///
    /// WASAPI does not allow a second `Initialize` on the same client, so
    /// falling back to polling asks `make_client` for a fresh one.
    pub(crate) fn open<F>(
        mut make_client: F,
        wave: &WAVEFORMATEX,
        format: StreamFormat,
        event_driven: bool,
        watch: Option<ProcessWatch>,
    ) -> Result<Self, ActivationError>
    where
        F: FnMut() -> Result<IAudioClient, ActivationError>,
    {
        let pid = watch.as_ref().map(ProcessWatch::pid);

        if event_driven {
            let client = make_client()?;
            match initialize_event_driven(&client, wave) {
                Ok(event) => return Self::assemble(client, Some(event), format, watch, pid),
                Err(e) => log::warn!("event-driven capture unavailable ({}), falling back to polling", e),
            }
        }

        let client = make_client()?;
        unsafe {
            client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK,
                BUFFER_DURATION,
                0,
                wave,
                None,
            )
        }
        .map_err(|e| hresult::activation_error(e.code(), pid))?;

        Self::assemble(client, None, format, watch, pid)
    }

    fn assemble(
        audio_client: IAudioClient,
        event: Option<EngineEvent>,
        format: StreamFormat,
        watch: Option<ProcessWatch>,
        pid: Option<u32>,
    ) -> Result<Self, ActivationError> {
        let capture_client: IAudioCaptureClient =
            unsafe { audio_client.GetService() }.map_err(|e| hresult::activation_error(e.code(), pid))?;

        Ok(Self {
            mmcss: None,
            capture_client,
            audio_client,
            event,
            watch,
            format,
            last_liveness_check: Instant::now(),
            com: None,
        })
    }

    fn check_target(&mut self) -> Result<(), ChannelError> {
        let Some(watch) = &self.watch else {
            return Ok(());
        };
        if self.last_liveness_check.elapsed() < LIVENESS_INTERVAL {
            return Ok(());
        }
        self.last_liveness_check = Instant::now();

        if watch.has_exited() {
            return Err(ChannelError::Fatal(format!("target process {} exited", watch.pid())));
        }
        Ok(())
    }
}

fn initialize_event_driven(client: &IAudioClient, wave: &WAVEFORMATEX) -> windows::core::Result<EngineEvent> {
    unsafe {
        client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
            BUFFER_DURATION,
            0,
            wave,
            None,
        )?;
        let event = EngineEvent::create()?;
        client.SetEventHandle(event.0)?;
        Ok(event)
    }
}

impl CaptureChannel for WasapiChannel {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn supports_event_wait(&self) -> bool {
        self.event.is_some()
    }

    fn start(&mut self) -> Result<(), ChannelError> {
        unsafe { self.audio_client.Start() }.map_err(|e| hresult::channel_error(&e, "IAudioClient::Start"))
    }

    fn stop(&mut self) -> Result<(), ChannelError> {
        unsafe { self.audio_client.Stop() }.map_err(|e| hresult::channel_error(&e, "IAudioClient::Stop"))
    }

    fn attach_thread(&mut self) {
        match ComGuard::enter_mta() {
            Ok(guard) => self.com = Some(guard),
            Err(e) => log::warn!("capture thread could not join the MTA: {}", e),
        }
        match MmcssGuard::register() {
            Ok(guard) => self.mmcss = Some(guard),
            Err(e) => log::warn!("MMCSS registration failed, running at normal priority: {}", e),
        }
    }

    fn frames_available(&mut self) -> Result<u32, ChannelError> {
        self.check_target()?;
        unsafe { self.capture_client.GetNextPacketSize() }
            .map_err(|e| hresult::channel_error(&e, "GetNextPacketSize"))
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<bool, ChannelError> {
        let Some(event) = &self.event else {
            std::thread::sleep(timeout);
            return Ok(false);
        };

        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        let result = unsafe { WaitForSingleObject(event.0, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(true)
        } else if result == WAIT_TIMEOUT {
            Ok(false)
        } else {
            Err(ChannelError::Transient(format!(
                "waiting on capture event returned {:#x}",
                result.0
            )))
        }
    }

    fn read_segment(&mut self) -> Result<Segment<'_>, ChannelError> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut frames: u32 = 0;
        let mut flags: u32 = 0;

        unsafe {
            self.capture_client
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .map_err(|e| hresult::channel_error(&e, "GetBuffer"))?;
        }

        if flags & AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32 != 0 {
            log::trace!("capture discontinuity before {} frames", frames);
        }
        let silent = flags & AUDCLNT_BUFFERFLAGS_SILENT.0 as u32 != 0;

        let len = if data.is_null() {
            0
        } else {
            frames as usize * self.format.block_align()
        };

        // SAFETY: the engine keeps the packet mapped until ReleaseBuffer,
        // which needs `&mut self` and therefore ends this borrow first.
        let bytes = if len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(data as *const u8, len) }
        };

        Ok(Segment {
            data: bytes,
            frames,
            silent,
        })
    }

    fn release_segment(&mut self, frames: u32) -> Result<(), ChannelError> {
        unsafe { self.capture_client.ReleaseBuffer(frames) }.map_err(|e| hresult::channel_error(&e, "ReleaseBuffer"))
    }
}
