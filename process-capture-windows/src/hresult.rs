//! Mapping of WASAPI failure codes onto the core error taxonomy.

use windows::core::HRESULT;
use windows::Win32::Foundation::{
    E_ACCESSDENIED, E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL, ERROR_INVALID_PARAMETER, ERROR_NOT_FOUND,
};
use windows::Win32::Media::Audio::{
    AUDCLNT_E_DEVICE_INVALIDATED, AUDCLNT_E_RESOURCES_INVALIDATED, AUDCLNT_E_SERVICE_NOT_RUNNING,
    AUDCLNT_E_UNSUPPORTED_FORMAT,
};

use process_capture_core::models::error::{ActivationError, ChannelError};

/// Classify an activation failure. `pid` is the process target, if any.
pub(crate) fn activation_error(hr: HRESULT, pid: Option<u32>) -> ActivationError {
    if hr == E_ACCESSDENIED {
        ActivationError::PermissionDenied
    } else if hr == E_NOTIMPL || hr == E_NOINTERFACE {
        ActivationError::UnsupportedOsVersion
    } else if hr == AUDCLNT_E_SERVICE_NOT_RUNNING {
        ActivationError::SubsystemUnavailable
    } else if hr == AUDCLNT_E_UNSUPPORTED_FORMAT {
        ActivationError::UnsupportedFormat(describe(hr))
    } else if hr == E_INVALIDARG
        || hr == HRESULT::from_win32(ERROR_NOT_FOUND.0)
        || hr == HRESULT::from_win32(ERROR_INVALID_PARAMETER.0)
    {
        match pid {
            Some(pid) => ActivationError::TargetNotFound(pid),
            // No default render endpoint.
            None => ActivationError::SubsystemUnavailable,
        }
    } else {
        ActivationError::SubsystemCall(describe(hr))
    }
}

/// Classify a failed call on a running capture client.
pub(crate) fn channel_error(err: &windows::core::Error, call: &str) -> ChannelError {
    let hr = err.code();
    let message = format!("{} failed: {}", call, describe(hr));
    if hr == AUDCLNT_E_DEVICE_INVALIDATED
        || hr == AUDCLNT_E_RESOURCES_INVALIDATED
        || hr == AUDCLNT_E_SERVICE_NOT_RUNNING
    {
        ChannelError::Fatal(message)
    } else {
        ChannelError::Transient(message)
    }
}

pub(crate) fn describe(hr: HRESULT) -> String {
    format!("0x{:08X} {}", hr.0 as u32, hr.message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_codes_map_to_distinct_variants() {
        assert_eq!(activation_error(E_ACCESSDENIED, Some(1)), ActivationError::PermissionDenied);
        assert_eq!(activation_error(E_NOTIMPL, Some(1)), ActivationError::UnsupportedOsVersion);
        assert_eq!(activation_error(E_INVALIDARG, Some(42)), ActivationError::TargetNotFound(42));
        assert_eq!(
            activation_error(AUDCLNT_E_SERVICE_NOT_RUNNING, None),
            ActivationError::SubsystemUnavailable
        );
    }

    #[test]
    fn invalidated_device_is_fatal() {
        let err = windows::core::Error::from(AUDCLNT_E_DEVICE_INVALIDATED);
        assert!(channel_error(&err, "GetBuffer").is_fatal());

        let err = windows::core::Error::from(E_INVALIDARG);
        assert!(!channel_error(&err, "GetBuffer").is_fatal());
    }
}
