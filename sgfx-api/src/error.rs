use crate::SgfxHandleKind;
use std::sync::Arc;

pub type SgfxResult<T> = Result<T, SgfxError>;

/// Generic error that contains all the different kinds of errors that may occur when using the API
#[derive(Debug, Clone)]
pub enum SgfxError {
    StringError(String),
    IoError(Arc<std::io::Error>),
    /// The handle was never created, was already destroyed, or belongs to another device
    InvalidHandle(SgfxHandleKind),
    /// Every slot of the device's table for this kind of object is in use
    HandleTableFull(SgfxHandleKind),
    /// Value returned by glGetError
    #[cfg(feature = "sgfx-gl4")]
    GlError(u32),
    #[cfg(all(windows, any(feature = "sgfx-dx11", feature = "sgfx-dx12")))]
    WindowsError(windows::core::Error),
}

impl std::error::Error for SgfxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            SgfxError::StringError(_) => None,
            SgfxError::IoError(ref e) => Some(&**e),
            SgfxError::InvalidHandle(_) => None,
            SgfxError::HandleTableFull(_) => None,
            #[cfg(feature = "sgfx-gl4")]
            SgfxError::GlError(_) => None,
            #[cfg(all(windows, any(feature = "sgfx-dx11", feature = "sgfx-dx12")))]
            SgfxError::WindowsError(ref e) => Some(e),
        }
    }
}

impl core::fmt::Display for SgfxError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            SgfxError::StringError(ref e) => e.fmt(fmt),
            SgfxError::IoError(ref e) => e.fmt(fmt),
            SgfxError::InvalidHandle(kind) => write!(fmt, "invalid {} handle", kind),
            SgfxError::HandleTableFull(kind) => write!(fmt, "{} handle table is full", kind),
            #[cfg(feature = "sgfx-gl4")]
            SgfxError::GlError(code) => write!(fmt, "GL error 0x{:04X}", code),
            #[cfg(all(windows, any(feature = "sgfx-dx11", feature = "sgfx-dx12")))]
            SgfxError::WindowsError(ref e) => e.fmt(fmt),
        }
    }
}

impl From<&str> for SgfxError {
    fn from(str: &str) -> Self {
        SgfxError::StringError(str.to_string())
    }
}

impl From<String> for SgfxError {
    fn from(string: String) -> Self {
        SgfxError::StringError(string)
    }
}

impl From<std::io::Error> for SgfxError {
    fn from(error: std::io::Error) -> Self {
        SgfxError::IoError(Arc::new(error))
    }
}

#[cfg(all(windows, any(feature = "sgfx-dx11", feature = "sgfx-dx12")))]
impl From<windows::core::Error> for SgfxError {
    fn from(error: windows::core::Error) -> Self {
        SgfxError::WindowsError(error)
    }
}
