//! Capture error taxonomy.
//!
//! Components use `anyhow::Result` internally and map failures into a
//! `CaptureError` at their boundary. The kind decides how the controller
//! reacts: fatal kinds end the session in `Error`, `CaptureTimeout` returns
//! to detection, `TransientInferenceFailure` is logged and skipped.

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureErrorKind {
    DeviceUnavailable,
    PermissionDenied,
    NegotiationFailed,
    ModelLoadFailed,
    InitializationTimeout,
    CaptureTimeout,
    TransientInferenceFailure,
    /// A command was issued in a state that does not accept it.
    InvalidState,
}

impl CaptureErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NegotiationFailed => "NEGOTIATION_FAILED",
            Self::ModelLoadFailed => "MODEL_LOAD_FAILED",
            Self::InitializationTimeout => "INITIALIZATION_TIMEOUT",
            Self::CaptureTimeout => "CAPTURE_TIMEOUT",
            Self::TransientInferenceFailure => "TRANSIENT_INFERENCE_FAILURE",
            Self::InvalidState => "INVALID_STATE",
        }
    }

    /// Fatal kinds end the session; the only ways out are a hard reset or close.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable
                | Self::PermissionDenied
                | Self::NegotiationFailed
                | Self::ModelLoadFailed
                | Self::InitializationTimeout
        )
    }

    /// Short human-readable summary for the operator.
    pub fn summary(self) -> &'static str {
        match self {
            Self::DeviceUnavailable => "No camera is available.",
            Self::PermissionDenied => "Camera access was refused.",
            Self::NegotiationFailed => "The camera cannot provide a suitable video stream.",
            Self::ModelLoadFailed => "The pose model could not be loaded.",
            Self::InitializationTimeout => "Camera or model setup took too long.",
            Self::CaptureTimeout => "No clear pose was detected in time.",
            Self::TransientInferenceFailure => "A frame could not be analysed.",
            Self::InvalidState => "That action is not available right now.",
        }
    }

    /// Remediation hints shown next to the summary.
    pub fn remediation(self) -> &'static [&'static str] {
        match self {
            Self::DeviceUnavailable => &[
                "Connect a camera and make sure no other application is using it.",
                "Reset the session once the camera is available.",
            ],
            Self::PermissionDenied => &[
                "Grant camera access to this application.",
                "On Linux, check that your user can read the video device.",
            ],
            Self::NegotiationFailed => &[
                "Try a lower capture resolution.",
                "Try a different camera.",
            ],
            Self::ModelLoadFailed => &[
                "Check that the model file exists and is readable.",
                "Enable a CPU backend as a fallback.",
            ],
            Self::InitializationTimeout => &[
                "Close other applications using the camera or GPU.",
                "Reset the session to try again.",
            ],
            Self::CaptureTimeout => &[
                "Step back so your whole body is in frame.",
                "Improve the lighting and hold still, then start the countdown again.",
            ],
            Self::TransientInferenceFailure => &[],
            Self::InvalidState => &[],
        }
    }
}

impl std::fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureError {
    pub kind: CaptureErrorKind,
    pub message: String,
}

impl CaptureError {
    pub fn new(kind: CaptureErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an internal error, keeping its full context chain in the message.
    pub fn from_anyhow(kind: CaptureErrorKind, err: &anyhow::Error) -> Self {
        Self::new(kind, format!("{:#}", err))
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_match_propagation_policy() {
        assert!(CaptureErrorKind::PermissionDenied.is_fatal());
        assert!(CaptureErrorKind::InitializationTimeout.is_fatal());
        assert!(!CaptureErrorKind::CaptureTimeout.is_fatal());
        assert!(!CaptureErrorKind::TransientInferenceFailure.is_fatal());
        assert!(!CaptureErrorKind::InvalidState.is_fatal());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = CaptureError::new(CaptureErrorKind::PermissionDenied, "camera refused");
        assert_eq!(err.to_string(), "PERMISSION_DENIED: camera refused");
    }

    #[test]
    fn anyhow_context_is_preserved() {
        let err = anyhow::anyhow!("no such file").context("load model");
        let wrapped = CaptureError::from_anyhow(CaptureErrorKind::ModelLoadFailed, &err);
        assert_eq!(wrapped.message, "load model: no such file");
    }
}
