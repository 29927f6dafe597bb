//! sgfx-api is a thin, handle-based abstraction over Direct3D 11, Direct3D 12 and OpenGL 4.5.
//!
//! Resources are created through `SgfxDevice` and referred to by small copyable handles. Work is
//! recorded into `SgfxDrawQueue`s (one per pipeline state) and `SgfxComputeQueue`s (one per
//! compute pipeline), which store each draw's state changes as a delta. Submitting a queue replays
//! it against the native API, batching bindings to contiguous slots into single native calls.
//!
//! A headless null backend is always available. Native backends are enabled with the `sgfx-gl4`,
//! `sgfx-dx11` and `sgfx-dx12` features.

pub use sgfx_base;

pub use api::*;
pub use backends::null::{SgfxDeviceNull, SgfxNullCall};
pub use binding::{
    SgfxBinding, SgfxBindingKind, SgfxBindingResource, SgfxIndexBufferBinding,
    SgfxVertexBufferBinding,
};
pub use compute_queue::*;
pub use device::*;
pub use draw_queue::*;
pub use error::*;
pub use handles::*;
pub use internal_shared::SgfxLiveResources;
pub use shader_package::*;
pub use types::*;

#[cfg(feature = "sgfx-gl4")]
pub use backends::gl4::{SgfxApiDefGl4, SgfxDeviceGl4};

#[cfg(all(windows, feature = "sgfx-dx11"))]
pub use backends::dx11::{SgfxApiDefDx11, SgfxDeviceDx11, SgfxDriverTypeDx11};

#[cfg(all(windows, feature = "sgfx-dx12"))]
pub use backends::dx12::{SgfxApiDefDx12, SgfxDeviceDx12};

pub mod backends;
pub mod binding;
mod types;

mod api;
mod compute_queue;
mod device;
mod draw_queue;
mod error;
mod handles;
mod internal_shared;
mod shader_package;
