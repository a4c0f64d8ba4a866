//! WASAPI activation for process-scoped and system-wide loopback.
//!
//! Process loopback goes through `ActivateAudioInterfaceAsync` on the
//! virtual `VAD\Process_Loopback` device; the completion callback arrives
//! on a system thread and is bridged back to the caller with the core
//! activation rendezvous. System-wide loopback opens the default render
//! endpoint directly and keeps its mix format.

use std::sync::Arc;

use windows::core::{implement, w, IUnknown, Interface, Ref, HRESULT, PROPVARIANT};
use windows::Win32::Media::Audio::{
    eConsole, eRender, ActivateAudioInterfaceAsync, IActivateAudioInterfaceAsyncOperation,
    IActivateAudioInterfaceCompletionHandler, IActivateAudioInterfaceCompletionHandler_Impl, IAudioClient,
    IMMDeviceEnumerator, MMDeviceEnumerator, WAVEFORMATEX, AUDIOCLIENT_ACTIVATION_PARAMS, AUDIOCLIENT_ACTIVATION_PARAMS_0,
    AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK, AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS,
    PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE, PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, IAgileObject, IAgileObject_Impl, CLSCTX_ALL};

use process_capture_core::activation::{await_completion, ActivationRendezvous, CompletionResult};
use process_capture_core::models::error::ActivationError;
use process_capture_core::models::format::StreamFormat;
use process_capture_core::models::target::CaptureTarget;
use process_capture_core::traits::device_activator::{
    Activation, ActivationOutcome, ActivationRequest, DeviceActivator,
};

use crate::com;
use crate::hresult;
use crate::process_watch::ProcessWatch;
use crate::wasapi_channel::WasapiChannel;
use crate::wave_format;

/// `VT_BLOB`
const VT_BLOB: u16 = 65;

/// An activated interface crossing from the callback thread.
struct SendUnknown(IUnknown);

// SAFETY: interfaces returned by ActivateAudioInterfaceAsync are agile.
unsafe impl Send for SendUnknown {}

/// A `PROPVARIANT` holding a `VT_BLOB`, laid out by hand: `vt`, six
/// reserved bytes, then `{ cbSize, pBlobData }`.
#[repr(C)]
struct BlobPropVariant {
    vt: u16,
    reserved: [u16; 3],
    size: u32,
    data: *const u8,
}

const _: () = assert!(std::mem::size_of::<BlobPropVariant>() >= std::mem::size_of::<PROPVARIANT>());

impl BlobPropVariant {
    fn wrap(params: &AUDIOCLIENT_ACTIVATION_PARAMS) -> Self {
        Self {
            vt: VT_BLOB,
            reserved: [0; 3],
            size: std::mem::size_of::<AUDIOCLIENT_ACTIVATION_PARAMS>() as u32,
            data: params as *const AUDIOCLIENT_ACTIVATION_PARAMS as *const u8,
        }
    }

    fn as_ptr(&self) -> *const PROPVARIANT {
        self as *const Self as *const PROPVARIANT
    }
}

#[implement(IActivateAudioInterfaceCompletionHandler, IAgileObject)]
struct CompletionHandler {
    pid: u32,
    rendezvous: Arc<ActivationRendezvous<CompletionResult<SendUnknown>>>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for CompletionHandler_Impl {
    fn ActivateCompleted(&self, operation: Ref<'_, IActivateAudioInterfaceAsyncOperation>) -> windows::core::Result<()> {
        let result = match operation.ok() {
            Ok(operation) => activate_result(operation, self.pid),
            Err(e) => Err(ActivationError::CompletionFailed(e.to_string())),
        };
        if !self.rendezvous.complete(result) {
            log::debug!("activation for process {} completed after the caller gave up", self.pid);
        }
        Ok(())
    }
}

impl IAgileObject_Impl for CompletionHandler_Impl {}

fn activate_result(operation: &IActivateAudioInterfaceAsyncOperation, pid: u32) -> CompletionResult<SendUnknown> {
    let mut hr = HRESULT(0);
    let mut unknown: Option<IUnknown> = None;
    unsafe { operation.GetActivateResult(&mut hr, &mut unknown) }
        .map_err(|e| ActivationError::CompletionFailed(hresult::describe(e.code())))?;
    if hr.is_err() {
        return Err(hresult::activation_error(hr, Some(pid)));
    }
    Ok(unknown.map(SendUnknown))
}

/// Activate a process-loopback `IAudioClient` and wait for the callback.
fn activate_process_client(
    pid: u32,
    include_tree: bool,
    timeout: std::time::Duration,
) -> Result<IAudioClient, ActivationError> {
    let params = AUDIOCLIENT_ACTIVATION_PARAMS {
        ActivationType: AUDIOCLIENT_ACTIVATION_TYPE_PROCESS_LOOPBACK,
        Anonymous: AUDIOCLIENT_ACTIVATION_PARAMS_0 {
            ProcessLoopbackParams: AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS {
                TargetProcessId: pid,
                ProcessLoopbackMode: if include_tree {
                    PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE
                } else {
                    PROCESS_LOOPBACK_MODE_EXCLUDE_TARGET_PROCESS_TREE
                },
            },
        },
    };
    let blob = BlobPropVariant::wrap(&params);

    let rendezvous = ActivationRendezvous::new();
    let handler: IActivateAudioInterfaceCompletionHandler = CompletionHandler {
        pid,
        rendezvous: Arc::clone(&rendezvous),
    }
    .into();

    let _operation = unsafe {
        ActivateAudioInterfaceAsync(
            w!("VAD\\Process_Loopback"),
            &IAudioClient::IID,
            Some(blob.as_ptr()),
            &handler,
        )
    }
    .map_err(|e| hresult::activation_error(e.code(), Some(pid)))?;

    let unknown = await_completion(&rendezvous, timeout)?;
    unknown
        .0
        .cast::<IAudioClient>()
        .map_err(|e| ActivationError::CompletionFailed(hresult::describe(e.code())))
}

fn default_render_client() -> Result<IAudioClient, ActivationError> {
    unsafe {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
            .map_err(|e| hresult::activation_error(e.code(), None))?;

        // Loopback reads from the render endpoint, not a capture endpoint.
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(|e| hresult::activation_error(e.code(), None))?;

        device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| hresult::activation_error(e.code(), None))
    }
}

/// A device mix format allocated by the audio engine.
struct MixFormat(*mut WAVEFORMATEX);

impl MixFormat {
    fn of(client: &IAudioClient) -> Result<Self, ActivationError> {
        let ptr = unsafe { client.GetMixFormat() }.map_err(|e| hresult::activation_error(e.code(), None))?;
        Ok(Self(ptr))
    }

    fn stream_format(&self) -> Result<StreamFormat, ActivationError> {
        unsafe { wave_format::from_wave_format(self.0) }
    }

    fn wave(&self) -> &WAVEFORMATEX {
        unsafe { &*self.0 }
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe { CoTaskMemFree(Some(self.0 as *const _)) };
    }
}

/// [`DeviceActivator`] backed by WASAPI.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiActivator;

impl WasapiActivator {
    pub fn new() -> Self {
        Self
    }

    fn activate_process(
        &self,
        pid: u32,
        include_tree: bool,
        request: &ActivationRequest,
    ) -> ActivationOutcome {
        let watch = match ProcessWatch::open(pid) {
            Ok(watch) => Some(watch),
            Err(ActivationError::PermissionDenied) => {
                log::warn!("cannot watch process {}, exit will not be detected", pid);
                None
            }
            Err(err) => return Err(err),
        };

        let format = request.process_format;
        let wave = wave_format::to_wave_format(format);
        log::debug!(
            "activating process loopback for {} ({} tree) as {}",
            pid,
            if include_tree { "including" } else { "excluding" },
            format
        );

        let channel = WasapiChannel::open(
            || activate_process_client(pid, include_tree, request.timeout),
            &wave,
            format,
            request.event_driven,
            watch,
        )?;

        Ok(Activation {
            channel: Box::new(channel),
            format,
        })
    }

    fn activate_system_wide(&self, request: &ActivationRequest) -> ActivationOutcome {
        let probe = default_render_client()?;
        let mix = MixFormat::of(&probe)?;
        let format = mix.stream_format()?;
        log::debug!("activating system-wide loopback as {}", format);

        // The probe client is still uninitialized; use it first.
        let mut probe = Some(probe);
        let channel = WasapiChannel::open(
            || match probe.take() {
                Some(client) => Ok(client),
                None => default_render_client(),
            },
            mix.wave(),
            format,
            request.event_driven,
            None,
        )?;

        Ok(Activation {
            channel: Box::new(channel),
            format,
        })
    }
}

impl DeviceActivator for WasapiActivator {
    fn activate(&mut self, request: &ActivationRequest) -> ActivationOutcome {
        com::ensure_com().map_err(|e| ActivationError::SubsystemCall(hresult::describe(e.code())))?;

        match &request.target {
            CaptureTarget::Process { pid, include_tree } => self.activate_process(*pid, *include_tree, request),
            CaptureTarget::SystemWide => self.activate_system_wide(request),
        }
    }
}
