pub mod null;

#[cfg(feature = "sgfx-gl4")]
pub mod gl4;

#[cfg(all(windows, any(feature = "sgfx-dx11", feature = "sgfx-dx12")))]
mod dxgi_common;

#[cfg(all(windows, feature = "sgfx-dx11"))]
pub mod dx11;

#[cfg(all(windows, feature = "sgfx-dx12"))]
pub mod dx12;
