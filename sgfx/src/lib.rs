//! sgfx is a thin graphics API over Direct3D 11, Direct3D 12 and OpenGL 4. Work is recorded into
//! `SgfxDrawQueue`s and `SgfxComputeQueue`s and replayed by the device with the fewest native
//! binding calls the backend allows.
//!
//! * `base`: data structures used by the api (`DynamicArray`, `HandleTable`)
//! * `api`: types, the device and the backends

pub use sgfx_base as base;

pub use sgfx_api as api;
