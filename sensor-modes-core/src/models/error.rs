use thiserror::Error;

/// Errors raised by device controllers and hardware backends.
///
/// Only `CannotOpen` from the camera escalates to a runtime halt; every other
/// variant is recovered by the reaction that observed it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("cannot open {device}: {reason}")]
    CannotOpen { device: String, reason: String },

    #[error("frame missing: {0}")]
    FrameMissing(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("permission denied")]
    PermissionDenied,

    #[error("no active session")]
    NoSession,

    #[error("backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    pub fn cannot_open(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CannotOpen {
            device: device.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the runtime to its host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("reactor `{reactor}` halted: {source}")]
    Halted {
        reactor: String,
        #[source]
        source: DeviceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halted_error_carries_device_error() {
        let err = RuntimeError::Halted {
            reactor: "camera".into(),
            source: DeviceError::cannot_open("camera 3", "no such device"),
        };
        assert_eq!(
            err.to_string(),
            "reactor `camera` halted: cannot open camera 3: no such device"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
