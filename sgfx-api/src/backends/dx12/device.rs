use super::command_encoder::{
    root_parameter_index, Dx12BindingTables, Dx12CommandEncoder, Dx12EncoderContext,
};
use super::internal::conversions::*;
use super::internal::descriptor_heap::{
    Dx12DescriptorHeapSet, Dx12DescriptorId, DEFAULT_SHADER_4_COMPONENT_MAPPING,
};
use super::internal::resource_state::{uav_barrier, Dx12BarrierBatch, Dx12TrackedState};
use super::internal::upload_ring::{Dx12UploadAllocation, Dx12UploadRing};
use super::internal::*;
use crate::backends::dxgi_common::{wchar_to_string, window_hwnd};
use crate::binding::{SgfxBindingKind, SgfxBindingResource};
use crate::internal_shared::*;
use crate::*;
use raw_window_handle::HasRawWindowHandle;
use sgfx_base::DynamicArray;
use std::ffi::{c_void, CString};
use windows::core::ComInterface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, RECT};
use windows::Win32::Graphics::{Dxgi as dxgi, Dxgi::Common as dxgi_common};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

const FRAME_COUNT: u32 = 3;
const UPLOAD_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;
const CONSTANT_BUFFER_ALIGNMENT: u64 =
    d3d12::D3D12_CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT as u64;

/// D3D12 specific configuration
#[derive(Clone, Debug, Default)]
pub struct SgfxApiDefDx12 {
    /// Use the WARP software adapter instead of the first hardware adapter
    pub use_warp_device: bool,
    /// Only applies when validation is enabled. Much slower.
    pub enable_gpu_based_validation: bool,
}

pub struct SgfxDx12Buffer {
    pub(super) resource: d3d12::ID3D12Resource,
    pub(super) state: Dx12TrackedState,
    pub(super) gpu_address: u64,
    pub(super) cbv: Option<Dx12DescriptorId>,
    pub(super) srv: Option<Dx12DescriptorId>,
    pub(super) uav: Option<Dx12DescriptorId>,
    // Append/consume counter, kept in its own 4 byte buffer
    pub(super) counter: Option<(d3d12::ID3D12Resource, Dx12TrackedState)>,
    // Staging buffers live in the readback heap and stay mapped
    mapped: Option<*mut u8>,
}

pub struct SgfxDx12Texture {
    pub(super) resource: d3d12::ID3D12Resource,
    pub(super) state: Dx12TrackedState,
    pub(super) srv: Option<Dx12DescriptorId>,
    pub(super) uav: Option<Dx12DescriptorId>,
    rtvs: Vec<((u32, u32), Dx12DescriptorId)>,
    dsv: Option<Dx12DescriptorId>,
    read_only_dsv: Option<Dx12DescriptorId>,
}

pub struct SgfxDx12Sampler {
    pub(super) descriptor: Dx12DescriptorId,
}

pub struct SgfxDx12Shader {
    bytecode: Vec<u8>,
}

pub struct SgfxDx12PipelineState {
    pipeline: d3d12::ID3D12PipelineState,
    topology: d3d::D3D_PRIMITIVE_TOPOLOGY,
}

pub struct SgfxDx12ComputePipeline {
    pipeline: d3d12::ID3D12PipelineState,
}

pub struct SgfxDx12Swapchain {
    swapchain: dxgi::IDXGISwapChain3,
    sync_interval: u32,
}

pub(super) struct Dx12CommandSignatures {
    pub draw: d3d12::ID3D12CommandSignature,
    pub draw_indexed: d3d12::ID3D12CommandSignature,
    pub dispatch: d3d12::ID3D12CommandSignature,
}

/// Objects the GPU may still be using, dropped once the frame that last used them completes
pub(super) enum Dx12Released {
    Resource(d3d12::ID3D12Resource),
    PipelineState(d3d12::ID3D12PipelineState),
    /// A cached table in the shader visible sampler heap
    SamplerTable(Dx12DescriptorId),
}

struct Dx12Frame {
    allocator: d3d12::ID3D12CommandAllocator,
    // Signaled when the GPU has finished the frame's command list
    fence_value: u64,
    released: Vec<Dx12Released>,
}

pub struct SgfxDeviceDx12 {
    device: d3d12::ID3D12Device,
    dxgi_factory: dxgi::IDXGIFactory4,
    queue: d3d12::ID3D12CommandQueue,
    command_list: d3d12::ID3D12GraphicsCommandList,
    frames: Vec<Dx12Frame>,
    frame_index: usize,
    fence: d3d12::ID3D12Fence,
    fence_event: HANDLE,
    next_fence_value: u64,
    root_signature: d3d12::ID3D12RootSignature,
    command_signatures: Dx12CommandSignatures,
    heaps: Dx12DescriptorHeapSet,
    tables: Dx12BindingTables,
    uploads: Dx12UploadRing,
    device_info: SgfxDeviceInfo,
    resources: SgfxResourceTables<SgfxDeviceDx12>,
}

impl SgfxBackendTypes for SgfxDeviceDx12 {
    type Buffer = SgfxDx12Buffer;
    type Texture = SgfxDx12Texture;
    type Sampler = SgfxDx12Sampler;
    type Shader = SgfxDx12Shader;
    type PipelineState = SgfxDx12PipelineState;
    type ComputePipeline = SgfxDx12ComputePipeline;
    type Swapchain = SgfxDx12Swapchain;
}

fn enable_debug_layer(
    api_def: &SgfxApiDef,
    dx12_api_def: &SgfxApiDefDx12,
) -> SgfxResult<bool> {
    if api_def.validation_mode == SgfxValidationMode::Disabled {
        return Ok(false);
    }

    let mut debug: Option<d3d12::ID3D12Debug> = None;
    let debug = unsafe { d3d12::D3D12GetDebugInterface(&mut debug) }
        .ok()
        .and(debug);
    match debug {
        Some(debug) => {
            unsafe {
                debug.EnableDebugLayer();
                if dx12_api_def.enable_gpu_based_validation {
                    let debug1: d3d12::ID3D12Debug1 = debug.cast()?;
                    debug1.SetEnableGPUBasedValidation(true);
                }
            }
            Ok(true)
        }
        // The debug layer is only present with the Graphics Tools feature installed
        None if api_def.validation_mode == SgfxValidationMode::EnabledIfAvailable => {
            log::warn!("D3D12 debug layer unavailable");
            Ok(false)
        }
        None => Err("validation was required but the D3D12 debug layer is unavailable".into()),
    }
}

fn create_d3d12_device(
    factory: &dxgi::IDXGIFactory4,
    use_warp_device: bool,
) -> SgfxResult<(d3d12::ID3D12Device, String)> {
    let mut adapters: Vec<dxgi::IDXGIAdapter1> = Vec::default();
    if use_warp_device {
        adapters.push(unsafe { factory.EnumWarpAdapter()? });
    } else {
        let mut index = 0;
        while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
            index += 1;
            let desc = unsafe { adapter.GetDesc1()? };
            // Skip the Basic Render Driver, use_warp_device selects it explicitly
            if desc.Flags & dxgi::DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
                continue;
            }
            adapters.push(adapter);
        }
    }

    for adapter in adapters {
        let name = wchar_to_string(&unsafe { adapter.GetDesc1()? }.Description);
        let mut device: Option<d3d12::ID3D12Device> = None;
        let result = unsafe {
            d3d12::D3D12CreateDevice(&adapter, d3d::D3D_FEATURE_LEVEL_11_0, &mut device)
        };
        match (result, device) {
            (Ok(()), Some(device)) => return Ok((device, name)),
            (Err(e), _) => log::warn!("Failed to create D3D12 device on {}: {}", name, e),
            (Ok(()), None) => log::warn!("D3D12CreateDevice returned no device for {}", name),
        }
    }

    Err("no adapter supports D3D12 at feature level 11_0".into())
}

fn blob_bytes(blob: &d3d::ID3DBlob) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            blob.GetBufferPointer() as *const u8,
            blob.GetBufferSize(),
        )
    }
}

/// One descriptor table per binding kind, visible to every stage. Shaders compiled for the
/// default register spaces (b#, t#, s#, u#) work with it unchanged.
fn create_root_signature(device: &d3d12::ID3D12Device) -> SgfxResult<d3d12::ID3D12RootSignature> {
    let mut ranges = [d3d12::D3D12_DESCRIPTOR_RANGE1::default(); 4];
    for kind in SgfxBindingKind::ALL {
        let (range_type, flags) = match kind {
            SgfxBindingKind::ConstantBuffer => (
                d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
                d3d12::D3D12_DESCRIPTOR_RANGE_FLAG_DATA_VOLATILE,
            ),
            SgfxBindingKind::ShaderResource => (
                d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
                d3d12::D3D12_DESCRIPTOR_RANGE_FLAG_DATA_VOLATILE,
            ),
            SgfxBindingKind::Sampler => (
                d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
                d3d12::D3D12_DESCRIPTOR_RANGE_FLAG_NONE,
            ),
            SgfxBindingKind::UnorderedAccess => (
                d3d12::D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
                d3d12::D3D12_DESCRIPTOR_RANGE_FLAG_DATA_VOLATILE,
            ),
        };

        ranges[root_parameter_index(kind)] = d3d12::D3D12_DESCRIPTOR_RANGE1 {
            RangeType: range_type,
            NumDescriptors: kind.slot_count(),
            BaseShaderRegister: 0,
            RegisterSpace: 0,
            Flags: flags,
            OffsetInDescriptorsFromTableStart: 0,
        };
    }

    let parameters: Vec<_> = ranges
        .iter()
        .map(|range| d3d12::D3D12_ROOT_PARAMETER1 {
            ParameterType: d3d12::D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
            Anonymous: d3d12::D3D12_ROOT_PARAMETER1_0 {
                DescriptorTable: d3d12::D3D12_ROOT_DESCRIPTOR_TABLE1 {
                    NumDescriptorRanges: 1,
                    pDescriptorRanges: range,
                },
            },
            ShaderVisibility: d3d12::D3D12_SHADER_VISIBILITY_ALL,
        })
        .collect();

    let mut desc = d3d12::D3D12_VERSIONED_ROOT_SIGNATURE_DESC {
        Version: d3d12::D3D_ROOT_SIGNATURE_VERSION_1_1,
        ..Default::default()
    };
    desc.Anonymous.Desc_1_1 = d3d12::D3D12_ROOT_SIGNATURE_DESC1 {
        NumParameters: parameters.len() as u32,
        pParameters: parameters.as_ptr(),
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: d3d12::D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    let mut blob = None;
    let mut error = None;
    let result = unsafe {
        d3d12::D3D12SerializeVersionedRootSignature(&desc, &mut blob, Some(&mut error))
    };
    if let Some(error) = &error {
        return Err(format!(
            "failed to serialize root signature: {}",
            String::from_utf8_lossy(blob_bytes(error))
        )
        .into());
    }
    result?;

    let blob = blob.ok_or("D3D12SerializeVersionedRootSignature did not return a blob")?;
    Ok(unsafe { device.CreateRootSignature(0, blob_bytes(&blob))? })
}

fn create_command_signature(
    device: &d3d12::ID3D12Device,
    argument_type: d3d12::D3D12_INDIRECT_ARGUMENT_TYPE,
    byte_stride: u32,
) -> SgfxResult<d3d12::ID3D12CommandSignature> {
    let argument = d3d12::D3D12_INDIRECT_ARGUMENT_DESC {
        Type: argument_type,
        ..Default::default()
    };
    let desc = d3d12::D3D12_COMMAND_SIGNATURE_DESC {
        ByteStride: byte_stride,
        NumArgumentDescs: 1,
        pArgumentDescs: &argument,
        NodeMask: 0,
    };

    let mut signature: Option<d3d12::ID3D12CommandSignature> = None;
    unsafe {
        device.CreateCommandSignature(&desc, None::<&d3d12::ID3D12RootSignature>, &mut signature)?;
    }
    Ok(signature.ok_or("CreateCommandSignature did not return a signature")?)
}

fn buffer_view_format(def: &SgfxBufferDef) -> dxgi_common::DXGI_FORMAT {
    if def.flags.contains(SgfxBufferFlags::STRUCTURED) {
        dxgi_common::DXGI_FORMAT_UNKNOWN
    } else if def.flags.contains(SgfxBufferFlags::RAW) {
        dxgi_common::DXGI_FORMAT_R32_TYPELESS
    } else {
        dxgi_common::DXGI_FORMAT_R32_UINT
    }
}

fn structure_stride(def: &SgfxBufferDef) -> u32 {
    if def.flags.contains(SgfxBufferFlags::STRUCTURED) {
        def.structure_stride
    } else {
        0
    }
}

fn texture_resource_desc(def: &SgfxTextureDef) -> d3d12::D3D12_RESOURCE_DESC {
    let sampled = def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE);
    let mut flags = d3d12::D3D12_RESOURCE_FLAG_NONE;
    if def.bind_flags.contains(SgfxBindFlags::RENDER_TARGET) {
        flags |= d3d12::D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
    }
    if def.bind_flags.contains(SgfxBindFlags::DEPTH_STENCIL) {
        flags |= d3d12::D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
        if !sampled {
            flags |= d3d12::D3D12_RESOURCE_FLAG_DENY_SHADER_RESOURCE;
        }
    }
    if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
        flags |= d3d12::D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
    }

    let (dimension, depth_or_array_size) = match def.dimensions {
        SgfxTextureDimensions::Dim1D => {
            (d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE1D, def.array_length)
        }
        SgfxTextureDimensions::Dim2D | SgfxTextureDimensions::Cube => {
            (d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE2D, def.array_length)
        }
        SgfxTextureDimensions::Dim3D => (d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE3D, def.depth),
    };

    d3d12::D3D12_RESOURCE_DESC {
        Dimension: dimension,
        Alignment: 0,
        Width: def.width as u64,
        Height: def.height,
        DepthOrArraySize: depth_or_array_size as u16,
        MipLevels: def.mip_count as u16,
        Format: def.format.dxgi_resource_format(sampled),
        SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
            Count: def.sample_count,
            Quality: 0,
        },
        Layout: d3d12::D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: flags,
    }
}

fn texture_srv_desc(def: &SgfxTextureDef) -> d3d12::D3D12_SHADER_RESOURCE_VIEW_DESC {
    let mut desc = d3d12::D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: def.format.dxgi_srv_format(),
        Shader4ComponentMapping: DEFAULT_SHADER_4_COMPONENT_MAPPING,
        ..Default::default()
    };

    match def.dimensions {
        SgfxTextureDimensions::Dim1D => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURE1DARRAY;
            desc.Anonymous.Texture1DArray = d3d12::D3D12_TEX1D_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                FirstArraySlice: 0,
                ArraySize: def.array_length,
                ResourceMinLODClamp: 0.0,
            };
        }
        SgfxTextureDimensions::Dim2D if def.sample_count > 1 => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURE2DMSARRAY;
            desc.Anonymous.Texture2DMSArray = d3d12::D3D12_TEX2DMS_ARRAY_SRV {
                FirstArraySlice: 0,
                ArraySize: def.array_length,
            };
        }
        SgfxTextureDimensions::Dim2D => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURE2DARRAY;
            desc.Anonymous.Texture2DArray = d3d12::D3D12_TEX2D_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                FirstArraySlice: 0,
                ArraySize: def.array_length,
                PlaneSlice: 0,
                ResourceMinLODClamp: 0.0,
            };
        }
        SgfxTextureDimensions::Dim3D => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURE3D;
            desc.Anonymous.Texture3D = d3d12::D3D12_TEX3D_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                ResourceMinLODClamp: 0.0,
            };
        }
        SgfxTextureDimensions::Cube if def.array_length > 6 => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURECUBEARRAY;
            desc.Anonymous.TextureCubeArray = d3d12::D3D12_TEXCUBE_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                First2DArrayFace: 0,
                NumCubes: def.array_length / 6,
                ResourceMinLODClamp: 0.0,
            };
        }
        SgfxTextureDimensions::Cube => {
            desc.ViewDimension = d3d12::D3D12_SRV_DIMENSION_TEXTURECUBE;
            desc.Anonymous.TextureCube = d3d12::D3D12_TEXCUBE_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                ResourceMinLODClamp: 0.0,
            };
        }
    }

    desc
}

fn texture_rtv_desc(
    def: &SgfxTextureDef,
    mip_slice: u32,
    array_slice: u32,
) -> d3d12::D3D12_RENDER_TARGET_VIEW_DESC {
    let mut desc = d3d12::D3D12_RENDER_TARGET_VIEW_DESC {
        Format: def.format.dxgi_format(),
        ..Default::default()
    };

    match def.dimensions {
        SgfxTextureDimensions::Dim1D => {
            desc.ViewDimension = d3d12::D3D12_RTV_DIMENSION_TEXTURE1DARRAY;
            desc.Anonymous.Texture1DArray = d3d12::D3D12_TEX1D_ARRAY_RTV {
                MipSlice: mip_slice,
                FirstArraySlice: array_slice,
                ArraySize: 1,
            };
        }
        SgfxTextureDimensions::Dim3D => {
            desc.ViewDimension = d3d12::D3D12_RTV_DIMENSION_TEXTURE3D;
            desc.Anonymous.Texture3D = d3d12::D3D12_TEX3D_RTV {
                MipSlice: mip_slice,
                FirstWSlice: array_slice,
                WSize: 1,
            };
        }
        _ if def.sample_count > 1 => {
            desc.ViewDimension = d3d12::D3D12_RTV_DIMENSION_TEXTURE2DMSARRAY;
            desc.Anonymous.Texture2DMSArray = d3d12::D3D12_TEX2DMS_ARRAY_RTV {
                FirstArraySlice: array_slice,
                ArraySize: 1,
            };
        }
        _ => {
            desc.ViewDimension = d3d12::D3D12_RTV_DIMENSION_TEXTURE2DARRAY;
            desc.Anonymous.Texture2DArray = d3d12::D3D12_TEX2D_ARRAY_RTV {
                MipSlice: mip_slice,
                FirstArraySlice: array_slice,
                ArraySize: 1,
                PlaneSlice: 0,
            };
        }
    }

    desc
}

fn texture_dsv_desc(
    def: &SgfxTextureDef,
    read_only: bool,
) -> d3d12::D3D12_DEPTH_STENCIL_VIEW_DESC {
    let mut flags = d3d12::D3D12_DSV_FLAG_NONE;
    if read_only {
        flags |= d3d12::D3D12_DSV_FLAG_READ_ONLY_DEPTH;
        if def.format.has_stencil() {
            flags |= d3d12::D3D12_DSV_FLAG_READ_ONLY_STENCIL;
        }
    }

    let mut desc = d3d12::D3D12_DEPTH_STENCIL_VIEW_DESC {
        Format: def.format.dxgi_format(),
        Flags: flags,
        ..Default::default()
    };

    if def.sample_count > 1 {
        desc.ViewDimension = d3d12::D3D12_DSV_DIMENSION_TEXTURE2DMSARRAY;
        desc.Anonymous.Texture2DMSArray = d3d12::D3D12_TEX2DMS_ARRAY_DSV {
            FirstArraySlice: 0,
            ArraySize: def.array_length,
        };
    } else {
        desc.ViewDimension = d3d12::D3D12_DSV_DIMENSION_TEXTURE2DARRAY;
        desc.Anonymous.Texture2DArray = d3d12::D3D12_TEX2D_ARRAY_DSV {
            MipSlice: 0,
            FirstArraySlice: 0,
            ArraySize: def.array_length,
        };
    }

    desc
}

fn texture_copy_location(
    resource: &d3d12::ID3D12Resource,
    subresource: u32,
) -> d3d12::D3D12_TEXTURE_COPY_LOCATION {
    d3d12::D3D12_TEXTURE_COPY_LOCATION {
        pResource: unsafe { std::mem::transmute_copy(resource) },
        Type: d3d12::D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
        Anonymous: d3d12::D3D12_TEXTURE_COPY_LOCATION_0 {
            SubresourceIndex: subresource,
        },
    }
}

fn record_buffer_copy(
    command_list: &d3d12::ID3D12GraphicsCommandList,
    resource: &d3d12::ID3D12Resource,
    state: &Dx12TrackedState,
    byte_offset: u64,
    upload: &Dx12UploadAllocation,
    size: u64,
) {
    let mut barriers = Dx12BarrierBatch::default();
    state.transition(resource, d3d12::D3D12_RESOURCE_STATE_COPY_DEST, &mut barriers);
    barriers.record(command_list);
    unsafe {
        command_list.CopyBufferRegion(resource, byte_offset, &upload.resource, upload.offset, size);
    }
}

fn shader_bytecode(shader: Option<&SgfxDx12Shader>) -> d3d12::D3D12_SHADER_BYTECODE {
    match shader {
        Some(shader) => d3d12::D3D12_SHADER_BYTECODE {
            pShaderBytecode: shader.bytecode.as_ptr() as *const c_void,
            BytecodeLength: shader.bytecode.len(),
        },
        None => d3d12::D3D12_SHADER_BYTECODE::default(),
    }
}

impl SgfxDeviceDx12 {
    pub(crate) fn new(
        api_def: &SgfxApiDef,
        dx12_api_def: &SgfxApiDefDx12,
    ) -> SgfxResult<Self> {
        let debug_layer = enable_debug_layer(api_def, dx12_api_def)?;
        let factory_flags = if debug_layer {
            dxgi::DXGI_CREATE_FACTORY_DEBUG
        } else {
            0
        };
        let dxgi_factory: dxgi::IDXGIFactory4 = unsafe { dxgi::CreateDXGIFactory2(factory_flags)? };

        let (device, adapter_name) =
            create_d3d12_device(&dxgi_factory, dx12_api_def.use_warp_device)?;
        log::info!("Using D3D12 adapter {}", adapter_name);

        let queue: d3d12::ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&d3d12::D3D12_COMMAND_QUEUE_DESC {
                Type: d3d12::D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })?
        };

        let mut frames = Vec::with_capacity(FRAME_COUNT as usize);
        for _ in 0..FRAME_COUNT {
            frames.push(Dx12Frame {
                allocator: unsafe {
                    device.CreateCommandAllocator(d3d12::D3D12_COMMAND_LIST_TYPE_DIRECT)?
                },
                fence_value: 0,
                released: Vec::default(),
            });
        }

        // Command lists are created open
        let command_list: d3d12::ID3D12GraphicsCommandList = unsafe {
            device.CreateCommandList(
                0,
                d3d12::D3D12_COMMAND_LIST_TYPE_DIRECT,
                &frames[0].allocator,
                None::<&d3d12::ID3D12PipelineState>,
            )?
        };

        let fence: d3d12::ID3D12Fence =
            unsafe { device.CreateFence(0, d3d12::D3D12_FENCE_FLAG_NONE)? };
        let fence_event = unsafe { CreateEventW(None, false, false, None)? };

        let root_signature = create_root_signature(&device)?;
        let command_signatures = Dx12CommandSignatures {
            draw: create_command_signature(&device, d3d12::D3D12_INDIRECT_ARGUMENT_TYPE_DRAW, 16)?,
            draw_indexed: create_command_signature(
                &device,
                d3d12::D3D12_INDIRECT_ARGUMENT_TYPE_DRAW_INDEXED,
                20,
            )?,
            dispatch: create_command_signature(
                &device,
                d3d12::D3D12_INDIRECT_ARGUMENT_TYPE_DISPATCH,
                12,
            )?,
        };

        let heaps = Dx12DescriptorHeapSet::new(&device, FRAME_COUNT)?;
        let tables = Dx12BindingTables::new(&heaps);
        let uploads = Dx12UploadRing::new(&device, UPLOAD_SEGMENT_SIZE, FRAME_COUNT)?;

        unsafe {
            command_list.SetDescriptorHeaps(&heaps.shader_visible_heaps());
        }

        let device_info = SgfxDeviceInfo {
            backend_type: SgfxBackendType::Dx12,
            adapter_name,
            constant_buffer_alignment: CONSTANT_BUFFER_ALIGNMENT,
            upload_row_pitch_alignment: d3d12::D3D12_TEXTURE_DATA_PITCH_ALIGNMENT,
            max_texture_dimension_2d: d3d12::D3D12_REQ_TEXTURE2D_U_OR_V_DIMENSION,
            supports_pixel_shader_uavs: true,
        };

        Ok(SgfxDeviceDx12 {
            device,
            dxgi_factory,
            queue,
            command_list,
            frames,
            frame_index: 0,
            fence,
            fence_event,
            next_fence_value: 1,
            root_signature,
            command_signatures,
            heaps,
            tables,
            uploads,
            device_info,
            resources: SgfxResourceTables::new(api_def),
        })
    }

    pub fn dx12_device(&self) -> &d3d12::ID3D12Device {
        &self.device
    }

    /// The command list currently being recorded. It is closed and replaced on every flush.
    pub fn dx12_command_list(&self) -> &d3d12::ID3D12GraphicsCommandList {
        &self.command_list
    }

    fn release(
        &mut self,
        released: Dx12Released,
    ) {
        self.frames[self.frame_index].released.push(released);
    }

    fn wait_for_fence(
        &self,
        value: u64,
    ) -> SgfxResult<()> {
        unsafe {
            if self.fence.GetCompletedValue() < value {
                self.fence.SetEventOnCompletion(value, self.fence_event)?;
                WaitForSingleObject(self.fence_event, u32::MAX);
            }
        }

        Ok(())
    }

    fn recycle_frame(
        &mut self,
        frame_index: usize,
    ) {
        for released in self.frames[frame_index].released.drain(..) {
            if let Dx12Released::SamplerTable(table) = released {
                self.heaps.gpu_sampler_heap.free(table, MAX_SAMPLER_SLOTS);
            }
        }
    }

    fn reset_command_list(&mut self) -> SgfxResult<()> {
        let frame = &self.frames[self.frame_index];
        unsafe {
            frame.allocator.Reset()?;
            self.command_list
                .Reset(&frame.allocator, None::<&d3d12::ID3D12PipelineState>)?;
            self.command_list
                .SetDescriptorHeaps(&self.heaps.shader_visible_heaps());
        }

        self.tables.mark_all_dirty();
        Ok(())
    }

    /// Space in the upload ring. A dedicated allocation is released with the current frame.
    fn stage_upload(
        &mut self,
        size: u64,
        alignment: u64,
    ) -> SgfxResult<Dx12UploadAllocation> {
        let upload = self.uploads.allocate(&self.device, size, alignment)?;
        if upload.dedicated {
            self.release(Dx12Released::Resource(upload.resource.clone()));
        }

        Ok(upload)
    }

    /// Re-lays `data` out with the row pitch the copy engine requires and records the copy.
    /// The resource must already be in the copy destination state.
    fn record_texture_upload(
        &mut self,
        resource: &d3d12::ID3D12Resource,
        subresource: u32,
        data: &[u8],
        row_pitch: u32,
        slice_pitch: u32,
    ) -> SgfxResult<()> {
        let desc = unsafe { resource.GetDesc() };
        let mut footprint = d3d12::D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default();
        let mut row_count = 0u32;
        let mut row_size = 0u64;
        let mut total_size = 0u64;
        unsafe {
            self.device.GetCopyableFootprints(
                &desc,
                subresource,
                1,
                0,
                Some(&mut footprint as *mut _),
                Some(&mut row_count as *mut _),
                Some(&mut row_size as *mut _),
                Some(&mut total_size as *mut _),
            );
        }

        let upload = self.stage_upload(
            total_size,
            d3d12::D3D12_TEXTURE_DATA_PLACEMENT_ALIGNMENT as u64,
        )?;
        let upload_row_pitch = footprint.Footprint.RowPitch as usize;
        let upload_slice_pitch = upload_row_pitch * row_count as usize;
        for z in 0..footprint.Footprint.Depth as usize {
            for y in 0..row_count as usize {
                let src = z * slice_pitch as usize + y * row_pitch as usize;
                let row = data
                    .get(src..src + row_size as usize)
                    .ok_or("texture data is smaller than the subresource")?;
                unsafe {
                    upload.write(z * upload_slice_pitch + y * upload_row_pitch, row);
                }
            }
        }

        footprint.Offset = upload.offset;
        let src = d3d12::D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(&upload.resource) },
            Type: d3d12::D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: d3d12::D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: footprint,
            },
        };
        let dst = texture_copy_location(resource, subresource);
        unsafe {
            self.command_list
                .CopyTextureRegion(&dst, 0, 0, 0, &src, None);
        }

        Ok(())
    }

    fn render_target_view(
        &mut self,
        texture: SgfxTextureHandle,
        mip_slice: u32,
        array_slice: u32,
    ) -> SgfxResult<Dx12DescriptorId> {
        let key = (mip_slice, array_slice);
        let entry = self.resources.texture_mut(texture)?;
        if let Some((_, id)) = entry.native.rtvs.iter().find(|(k, _)| *k == key) {
            return Ok(*id);
        }

        let id = self.heaps.rtv_heap.allocate(&self.device, 1)?;
        let desc = texture_rtv_desc(&entry.def, mip_slice, array_slice);
        unsafe {
            self.device.CreateRenderTargetView(
                &entry.native.resource,
                Some(&desc as *const _),
                self.heaps.rtv_heap.id_to_cpu_handle(id),
            );
        }
        entry.native.rtvs.push((key, id));
        Ok(id)
    }

    fn create_depth_stencil_view(
        &mut self,
        resource: &d3d12::ID3D12Resource,
        def: &SgfxTextureDef,
        read_only: bool,
    ) -> SgfxResult<Dx12DescriptorId> {
        let id = self.heaps.dsv_heap.allocate(&self.device, 1)?;
        let desc = texture_dsv_desc(def, read_only);
        unsafe {
            self.device.CreateDepthStencilView(
                resource,
                Some(&desc as *const _),
                self.heaps.dsv_heap.id_to_cpu_handle(id),
            );
        }
        Ok(id)
    }

    fn create_shader_resource_view(
        &mut self,
        resource: &d3d12::ID3D12Resource,
        desc: &d3d12::D3D12_SHADER_RESOURCE_VIEW_DESC,
    ) -> SgfxResult<Dx12DescriptorId> {
        let id = self.heaps.cbv_srv_uav_heap.allocate(&self.device, 1)?;
        unsafe {
            self.device.CreateShaderResourceView(
                resource,
                Some(desc as *const _),
                self.heaps.cbv_srv_uav_heap.id_to_cpu_handle(id),
            );
        }
        Ok(id)
    }

    fn create_unordered_access_view(
        &mut self,
        resource: &d3d12::ID3D12Resource,
        counter: Option<&d3d12::ID3D12Resource>,
        desc: Option<&d3d12::D3D12_UNORDERED_ACCESS_VIEW_DESC>,
    ) -> SgfxResult<Dx12DescriptorId> {
        let id = self.heaps.cbv_srv_uav_heap.allocate(&self.device, 1)?;
        unsafe {
            self.device.CreateUnorderedAccessView(
                resource,
                counter,
                desc.map(|desc| desc as *const _),
                self.heaps.cbv_srv_uav_heap.id_to_cpu_handle(id),
            );
        }
        Ok(id)
    }

    /// Frees a view in the CPU heap after clearing any binding slot that still refers to it
    fn free_view(
        &mut self,
        kind: SgfxBindingKind,
        id: Option<Dx12DescriptorId>,
    ) {
        if let Some(id) = id {
            self.tables.unbind_descriptor(kind, id);
            self.heaps.cbv_srv_uav_heap.free(id, 1);
        }
    }

    fn back_buffers(
        &self,
        swapchain: &dxgi::IDXGISwapChain3,
        buffer_count: u32,
    ) -> SgfxResult<Vec<SgfxDx12Texture>> {
        let mut back_buffers = Vec::with_capacity(buffer_count as usize);
        for i in 0..buffer_count {
            back_buffers.push(SgfxDx12Texture {
                resource: unsafe { swapchain.GetBuffer(i)? },
                state: Dx12TrackedState::new(d3d12::D3D12_RESOURCE_STATE_PRESENT),
                srv: None,
                uav: None,
                rtvs: Vec::default(),
                dsv: None,
                read_only_dsv: None,
            });
        }

        Ok(back_buffers)
    }

    fn resource_uav(
        &self,
        view: SgfxResourceView,
    ) -> SgfxResult<(&d3d12::ID3D12Resource, &Dx12TrackedState, Dx12DescriptorId)> {
        let (resource, state, uav) = match view {
            SgfxResourceView::Buffer(buffer) => {
                let native = &self.resources.buffer(buffer)?.native;
                (&native.resource, &native.state, native.uav)
            }
            SgfxResourceView::Texture(texture) => {
                let native = &self.resources.texture(texture)?.native;
                (&native.resource, &native.state, native.uav)
            }
        };

        Ok((
            resource,
            state,
            uav.ok_or("resource has no unordered access view")?,
        ))
    }

    /// Transitions the resource and returns the shader visible and CPU handles the clear needs
    fn prepare_uav_clear(
        &mut self,
        view: SgfxResourceView,
    ) -> SgfxResult<(
        d3d12::D3D12_GPU_DESCRIPTOR_HANDLE,
        d3d12::D3D12_CPU_DESCRIPTOR_HANDLE,
        d3d12::ID3D12Resource,
    )> {
        let table = self.heaps.gpu_cbv_srv_uav_ring.allocate(1)?;
        let (resource, state, uav) = self.resource_uav(view)?;

        let mut barriers = Dx12BarrierBatch::default();
        state.transition(
            resource,
            d3d12::D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
            &mut barriers,
        );
        barriers.record(&self.command_list);

        let ring = self.heaps.gpu_cbv_srv_uav_ring.heap();
        let cpu_handle = self.heaps.cbv_srv_uav_heap.id_to_cpu_handle(uav);
        unsafe {
            self.device.CopyDescriptorsSimple(
                1,
                ring.id_to_cpu_handle(table),
                cpu_handle,
                d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            );
        }

        Ok((ring.id_to_gpu_handle(table)?, cpu_handle, resource.clone()))
    }
}

impl SgfxBackend for SgfxDeviceDx12 {
    fn device_info(&self) -> &SgfxDeviceInfo {
        &self.device_info
    }

    fn resources(&self) -> &SgfxResourceTables<Self> {
        &self.resources
    }

    fn resources_mut(&mut self) -> &mut SgfxResourceTables<Self> {
        &mut self.resources
    }

    fn create_buffer(
        &mut self,
        def: &SgfxBufferDef,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<SgfxDx12Buffer> {
        let staging = def.usage == SgfxUsage::Staging;
        let size = if def.bind_flags.contains(SgfxBindFlags::CONSTANT_BUFFER) {
            align_up(def.size, CONSTANT_BUFFER_ALIGNMENT)
        } else {
            def.size
        };

        let mut flags = d3d12::D3D12_RESOURCE_FLAG_NONE;
        if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            flags |= d3d12::D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }

        let desc = buffer_resource_desc(size, flags);
        let (resource, state, mapped) = if staging {
            let resource = create_committed_resource(
                &self.device,
                d3d12::D3D12_HEAP_TYPE_READBACK,
                &desc,
                d3d12::D3D12_RESOURCE_STATE_COPY_DEST,
                None,
            )?;
            let mapped = map_resource(&resource, true)?;
            let state = Dx12TrackedState::fixed(d3d12::D3D12_RESOURCE_STATE_COPY_DEST);
            (resource, state, Some(mapped))
        } else {
            let resource = create_committed_resource(
                &self.device,
                d3d12::D3D12_HEAP_TYPE_DEFAULT,
                &desc,
                d3d12::D3D12_RESOURCE_STATE_COMMON,
                None,
            )?;
            let state = Dx12TrackedState::new(d3d12::D3D12_RESOURCE_STATE_COMMON);
            (resource, state, None)
        };

        // Committed resources start zeroed, so short initial data leaves the tail zero
        match (initial_data, mapped) {
            (Some(data), Some(mapped)) => unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            },
            (Some(data), None) if !data.is_empty() => {
                let upload = self.stage_upload(data.len() as u64, 16)?;
                unsafe {
                    upload.write(0, data);
                }
                record_buffer_copy(
                    &self.command_list,
                    &resource,
                    &state,
                    0,
                    &upload,
                    data.len() as u64,
                );
            }
            _ => {}
        }

        let gpu_address = unsafe { resource.GetGPUVirtualAddress() };

        let cbv = if def.bind_flags.contains(SgfxBindFlags::CONSTANT_BUFFER) {
            let id = self.heaps.cbv_srv_uav_heap.allocate(&self.device, 1)?;
            let desc = d3d12::D3D12_CONSTANT_BUFFER_VIEW_DESC {
                BufferLocation: gpu_address,
                SizeInBytes: size as u32,
            };
            unsafe {
                self.device.CreateConstantBufferView(
                    Some(&desc as *const _),
                    self.heaps.cbv_srv_uav_heap.id_to_cpu_handle(id),
                );
            }
            Some(id)
        } else {
            None
        };

        let format = buffer_view_format(def);
        let element_count = def.element_count() as u32;
        let raw = def.flags.contains(SgfxBufferFlags::RAW);

        let srv = if def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE) {
            let mut desc = d3d12::D3D12_SHADER_RESOURCE_VIEW_DESC {
                Format: format,
                ViewDimension: d3d12::D3D12_SRV_DIMENSION_BUFFER,
                Shader4ComponentMapping: DEFAULT_SHADER_4_COMPONENT_MAPPING,
                ..Default::default()
            };
            desc.Anonymous.Buffer = d3d12::D3D12_BUFFER_SRV {
                FirstElement: 0,
                NumElements: element_count,
                StructureByteStride: structure_stride(def),
                Flags: if raw {
                    d3d12::D3D12_BUFFER_SRV_FLAG_RAW
                } else {
                    d3d12::D3D12_BUFFER_SRV_FLAG_NONE
                },
            };
            Some(self.create_shader_resource_view(&resource, &desc)?)
        } else {
            None
        };

        let counter = if def.flags.contains(SgfxBufferFlags::APPEND_COUNTER) {
            let counter = create_committed_resource(
                &self.device,
                d3d12::D3D12_HEAP_TYPE_DEFAULT,
                &buffer_resource_desc(4, d3d12::D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS),
                d3d12::D3D12_RESOURCE_STATE_COMMON,
                None,
            )?;
            Some((counter, Dx12TrackedState::new(d3d12::D3D12_RESOURCE_STATE_COMMON)))
        } else {
            None
        };

        let uav = if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            let mut desc = d3d12::D3D12_UNORDERED_ACCESS_VIEW_DESC {
                Format: format,
                ViewDimension: d3d12::D3D12_UAV_DIMENSION_BUFFER,
                ..Default::default()
            };
            desc.Anonymous.Buffer = d3d12::D3D12_BUFFER_UAV {
                FirstElement: 0,
                NumElements: element_count,
                StructureByteStride: structure_stride(def),
                CounterOffsetInBytes: 0,
                Flags: if raw {
                    d3d12::D3D12_BUFFER_UAV_FLAG_RAW
                } else {
                    d3d12::D3D12_BUFFER_UAV_FLAG_NONE
                },
            };
            let counter_resource = counter.as_ref().map(|(counter, _)| counter);
            Some(self.create_unordered_access_view(&resource, counter_resource, Some(&desc))?)
        } else {
            None
        };

        Ok(SgfxDx12Buffer {
            resource,
            state,
            gpu_address,
            cbv,
            srv,
            uav,
            counter,
            mapped,
        })
    }

    fn destroy_buffer(
        &mut self,
        buffer: SgfxDx12Buffer,
    ) {
        self.free_view(SgfxBindingKind::ConstantBuffer, buffer.cbv);
        self.free_view(SgfxBindingKind::ShaderResource, buffer.srv);
        self.free_view(SgfxBindingKind::UnorderedAccess, buffer.uav);

        self.release(Dx12Released::Resource(buffer.resource));
        if let Some((counter, _)) = buffer.counter {
            self.release(Dx12Released::Resource(counter));
        }
    }

    fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        let entry = self.resources.buffer(buffer)?;
        if entry.def.usage == SgfxUsage::Immutable {
            return Err("immutable buffers cannot be updated".into());
        }

        if let Some(mapped) = entry.native.mapped {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    mapped.add(byte_offset as usize),
                    data.len(),
                );
            }
            return Ok(());
        }

        let upload = self.stage_upload(data.len() as u64, 16)?;
        unsafe {
            upload.write(0, data);
        }

        let native = &self.resources.buffer(buffer)?.native;
        record_buffer_copy(
            &self.command_list,
            &native.resource,
            &native.state,
            byte_offset,
            &upload,
            data.len() as u64,
        );
        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        let mapped = self
            .resources
            .buffer(buffer)?
            .native
            .mapped
            .ok_or("only staging buffers can be read")?;

        // The copies into the buffer are still in the current command list
        self.wait_idle()?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                mapped.add(byte_offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }

        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: SgfxBufferHandle,
        src_offset: u64,
        dst: SgfxBufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()> {
        let src_native = &self.resources.buffer(src)?.native;
        if src_native.mapped.is_some() {
            return Err("staging buffers cannot be copied from on dx12".into());
        }
        let dst_native = &self.resources.buffer(dst)?.native;

        let mut barriers = Dx12BarrierBatch::default();
        src_native.state.transition(
            &src_native.resource,
            d3d12::D3D12_RESOURCE_STATE_COPY_SOURCE,
            &mut barriers,
        );
        dst_native.state.transition(
            &dst_native.resource,
            d3d12::D3D12_RESOURCE_STATE_COPY_DEST,
            &mut barriers,
        );
        barriers.record(&self.command_list);

        unsafe {
            self.command_list.CopyBufferRegion(
                &dst_native.resource,
                dst_offset,
                &src_native.resource,
                src_offset,
                size,
            );
        }

        Ok(())
    }

    fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxDx12Texture> {
        if def.usage == SgfxUsage::Staging {
            return Err("dx12 has no staging textures, copy through a staging buffer".into());
        }

        let desc = texture_resource_desc(def);
        let initial_state = if initial_data.is_empty() {
            d3d12::D3D12_RESOURCE_STATE_COMMON
        } else {
            d3d12::D3D12_RESOURCE_STATE_COPY_DEST
        };
        let resource = create_committed_resource(
            &self.device,
            d3d12::D3D12_HEAP_TYPE_DEFAULT,
            &desc,
            initial_state,
            None,
        )?;

        // Ordered slice-major, matching D3D12 subresource indices
        for (subresource, data) in initial_data.iter().enumerate() {
            self.record_texture_upload(
                &resource,
                subresource as u32,
                data.data,
                data.row_pitch,
                data.slice_pitch,
            )?;
        }

        let srv = if def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE) {
            Some(self.create_shader_resource_view(&resource, &texture_srv_desc(def))?)
        } else {
            None
        };

        let uav = if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            Some(self.create_unordered_access_view(&resource, None, None)?)
        } else {
            None
        };

        let (dsv, read_only_dsv) = if def.bind_flags.contains(SgfxBindFlags::DEPTH_STENCIL) {
            let dsv = self.create_depth_stencil_view(&resource, def, false)?;
            let read_only_dsv = if srv.is_some() {
                Some(self.create_depth_stencil_view(&resource, def, true)?)
            } else {
                None
            };
            (Some(dsv), read_only_dsv)
        } else {
            (None, None)
        };

        Ok(SgfxDx12Texture {
            resource,
            state: Dx12TrackedState::new(initial_state),
            srv,
            uav,
            rtvs: Vec::default(),
            dsv,
            read_only_dsv,
        })
    }

    fn destroy_texture(
        &mut self,
        texture: SgfxDx12Texture,
    ) {
        self.free_view(SgfxBindingKind::ShaderResource, texture.srv);
        self.free_view(SgfxBindingKind::UnorderedAccess, texture.uav);
        for (_, rtv) in texture.rtvs {
            self.heaps.rtv_heap.free(rtv, 1);
        }
        for dsv in texture.dsv.into_iter().chain(texture.read_only_dsv) {
            self.heaps.dsv_heap.free(dsv, 1);
        }

        self.release(Dx12Released::Resource(texture.resource));
    }

    fn update_texture(
        &mut self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> SgfxResult<()> {
        let entry = self.resources.texture(texture)?;
        let (_, height, _) = entry.def.mip_extents(mip);
        let subresource = dx12_subresource_index(
            mip,
            array_slice,
            0,
            entry.def.mip_count,
            entry.def.array_length,
        );
        let resource = entry.native.resource.clone();

        let mut barriers = Dx12BarrierBatch::default();
        entry.native.state.transition(
            &resource,
            d3d12::D3D12_RESOURCE_STATE_COPY_DEST,
            &mut barriers,
        );
        barriers.record(&self.command_list);

        self.record_texture_upload(&resource, subresource, data, row_pitch, row_pitch * height)
    }

    fn create_sampler(
        &mut self,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<SgfxDx12Sampler> {
        let desc = sampler_def_sampler_desc(def);
        let descriptor = self.heaps.sampler_heap.allocate(&self.device, 1)?;
        unsafe {
            self.device
                .CreateSampler(&desc, self.heaps.sampler_heap.id_to_cpu_handle(descriptor));
        }

        Ok(SgfxDx12Sampler { descriptor })
    }

    fn destroy_sampler(
        &mut self,
        sampler: SgfxDx12Sampler,
    ) {
        self.tables
            .unbind_descriptor(SgfxBindingKind::Sampler, sampler.descriptor);
        for table in self.tables.evict_sampler_tables(sampler.descriptor) {
            self.release(Dx12Released::SamplerTable(table));
        }
        self.heaps.sampler_heap.free(sampler.descriptor, 1);
    }

    fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<SgfxDx12Shader> {
        // Nothing is created until the shader is used by a pipeline
        match &def.code {
            SgfxShaderCode::D3dBytecode(bytecode) => Ok(SgfxDx12Shader {
                bytecode: bytecode.clone(),
            }),
            _ => Err("dx12 shaders must be created from D3D bytecode".into()),
        }
    }

    fn destroy_shader(
        &mut self,
        _shader: SgfxDx12Shader,
    ) {
    }

    fn create_pipeline_state(
        &mut self,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<SgfxDx12PipelineState> {
        let mut stages: [Option<&SgfxDx12Shader>; 5] = Default::default();
        let expected = [
            (Some(def.vertex_shader), SgfxShaderStage::Vertex),
            (def.hull_shader, SgfxShaderStage::Hull),
            (def.domain_shader, SgfxShaderStage::Domain),
            (def.geometry_shader, SgfxShaderStage::Geometry),
            (def.pixel_shader, SgfxShaderStage::Pixel),
        ];
        for (i, (shader, stage)) in expected.iter().enumerate() {
            if let Some(shader) = shader {
                let entry = self.resources.shader(*shader)?;
                if entry.stage != *stage {
                    return Err(format!(
                        "pipeline {:?} shader is a {:?} shader",
                        stage, entry.stage
                    )
                    .into());
                }
                stages[i] = Some(&entry.native);
            }
        }

        let tessellated = def.hull_shader.is_some();
        let topology = def.primitive_topology.d3d_topology(tessellated)?;

        // The descs point into these strings
        let semantics = def
            .input_layout
            .iter()
            .map(|element| CString::new(element.semantic.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| "input element semantic contains a nul byte")?;
        let elements: Vec<_> = def
            .input_layout
            .iter()
            .zip(&semantics)
            .map(|(element, semantic)| d3d12::D3D12_INPUT_ELEMENT_DESC {
                SemanticName: windows::core::PCSTR(semantic.as_ptr() as *const u8),
                SemanticIndex: element.semantic_index,
                Format: element.format.dxgi_format(),
                InputSlot: element.slot,
                AlignedByteOffset: element.byte_offset,
                InputSlotClass: element.rate.into(),
                InstanceDataStepRate: match element.rate {
                    SgfxInputRate::PerVertex => 0,
                    SgfxInputRate::PerInstance => 1,
                },
            })
            .collect();
        let input_layout = if elements.is_empty() {
            d3d12::D3D12_INPUT_LAYOUT_DESC::default()
        } else {
            d3d12::D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: elements.as_ptr(),
                NumElements: elements.len() as u32,
            }
        };

        let mut rtv_formats = [dxgi_common::DXGI_FORMAT_UNKNOWN; 8];
        for (i, format) in def.color_formats.iter().enumerate() {
            rtv_formats[i] = format.dxgi_format();
        }

        let desc = d3d12::D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { std::mem::transmute_copy(&self.root_signature) },
            VS: shader_bytecode(stages[0]),
            HS: shader_bytecode(stages[1]),
            DS: shader_bytecode(stages[2]),
            GS: shader_bytecode(stages[3]),
            PS: shader_bytecode(stages[4]),
            StreamOutput: d3d12::D3D12_STREAM_OUTPUT_DESC::default(),
            BlendState: blend_state_blend_desc(&def.blend_state),
            SampleMask: u32::MAX,
            RasterizerState: rasterizer_state_rasterizer_desc(&def.rasterizer_state),
            DepthStencilState: depth_stencil_state_depth_stencil_desc(&def.depth_stencil_state),
            InputLayout: input_layout,
            IBStripCutValue: d3d12::D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_DISABLED,
            PrimitiveTopologyType: primitive_topology_type(def.primitive_topology, tessellated),
            NumRenderTargets: def.color_formats.len() as u32,
            RTVFormats: rtv_formats,
            DSVFormat: def
                .depth_format
                .map(|format| format.dxgi_format())
                .unwrap_or(dxgi_common::DXGI_FORMAT_UNKNOWN),
            SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
                Count: def.sample_count,
                Quality: 0,
            },
            NodeMask: 0,
            CachedPSO: d3d12::D3D12_CACHED_PIPELINE_STATE::default(),
            Flags: d3d12::D3D12_PIPELINE_STATE_FLAG_NONE,
        };

        let pipeline = unsafe { self.device.CreateGraphicsPipelineState(&desc)? };
        if let Some(name) = &def.debug_name {
            log::trace!("Created D3D12 pipeline state {}", name);
        }

        Ok(SgfxDx12PipelineState { pipeline, topology })
    }

    fn destroy_pipeline_state(
        &mut self,
        pipeline: SgfxDx12PipelineState,
    ) {
        self.release(Dx12Released::PipelineState(pipeline.pipeline));
    }

    fn create_compute_pipeline(
        &mut self,
        def: &SgfxComputePipelineDef,
    ) -> SgfxResult<SgfxDx12ComputePipeline> {
        let entry = self.resources.shader(def.compute_shader)?;
        if entry.stage != SgfxShaderStage::Compute {
            return Err("compute pipelines require a compute shader".into());
        }

        let desc = d3d12::D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { std::mem::transmute_copy(&self.root_signature) },
            CS: shader_bytecode(Some(&entry.native)),
            NodeMask: 0,
            CachedPSO: d3d12::D3D12_CACHED_PIPELINE_STATE::default(),
            Flags: d3d12::D3D12_PIPELINE_STATE_FLAG_NONE,
        };

        Ok(SgfxDx12ComputePipeline {
            pipeline: unsafe { self.device.CreateComputePipelineState(&desc)? },
        })
    }

    fn destroy_compute_pipeline(
        &mut self,
        pipeline: SgfxDx12ComputePipeline,
    ) {
        self.release(Dx12Released::PipelineState(pipeline.pipeline));
    }

    fn create_swapchain(
        &mut self,
        window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<(SgfxDx12Swapchain, Vec<SgfxDx12Texture>)> {
        let hwnd = window_hwnd(window)?;
        if def.buffer_count < 2 {
            return Err("dx12 swapchains need at least two buffers".into());
        }

        let desc = dxgi::DXGI_SWAP_CHAIN_DESC1 {
            Width: def.width,
            Height: def.height,
            Format: def.format.dxgi_swapchain_format(),
            Stereo: windows::Win32::Foundation::FALSE,
            SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: dxgi::DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: def.buffer_count,
            Scaling: dxgi::DXGI_SCALING_STRETCH,
            SwapEffect: dxgi::DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: dxgi_common::DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: 0,
        };

        // D3D12 swapchains present from a queue rather than a device
        let swapchain: dxgi::IDXGISwapChain3 = unsafe {
            let swapchain = self
                .dxgi_factory
                .CreateSwapChainForHwnd(&self.queue, hwnd, &desc, None, None)?
                .cast()?;
            self.dxgi_factory
                .MakeWindowAssociation(hwnd, dxgi::DXGI_MWA_NO_ALT_ENTER)?;
            swapchain
        };

        let back_buffers = self.back_buffers(&swapchain, def.buffer_count)?;
        Ok((
            SgfxDx12Swapchain {
                swapchain,
                sync_interval: def.enable_vsync as u32,
            },
            back_buffers,
        ))
    }

    fn destroy_swapchain(
        &mut self,
        _swapchain: SgfxDx12Swapchain,
    ) {
        // The back buffers were released with the current frame and must be idle first
        if let Err(e) = self.wait_idle() {
            log::error!("Failed to wait for the GPU before destroying a swapchain: {}", e);
        }
    }

    fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxDx12Texture>> {
        // ResizeBuffers fails while any reference to the old buffers is alive
        self.wait_idle()?;

        let entry = self.resources.swapchain_mut(swapchain)?;
        unsafe {
            entry.native.swapchain.ResizeBuffers(
                def.buffer_count,
                def.width,
                def.height,
                def.format.dxgi_swapchain_format(),
                0,
            )?;
        }
        entry.native.sync_interval = def.enable_vsync as u32;

        let native_swapchain = entry.native.swapchain.clone();
        self.back_buffers(&native_swapchain, def.buffer_count)
    }

    fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<usize> {
        profiling::scope!("present");
        let entry = self.resources.swapchain(swapchain)?;
        let native_swapchain = entry.native.swapchain.clone();
        let sync_interval = entry.native.sync_interval;

        let back_buffer = &self.resources.texture(entry.current_texture())?.native;
        let mut barriers = Dx12BarrierBatch::default();
        back_buffer.state.transition(
            &back_buffer.resource,
            d3d12::D3D12_RESOURCE_STATE_PRESENT,
            &mut barriers,
        );
        barriers.record(&self.command_list);

        self.flush()?;
        unsafe {
            native_swapchain.Present(sync_interval, 0).ok()?;
            Ok(native_swapchain.GetCurrentBackBufferIndex() as usize)
        }
    }

    fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
        render_pass: &SgfxActiveRenderPass,
    ) -> SgfxResult<()> {
        profiling::scope!("begin_render_pass");
        let mut barriers = Dx12BarrierBatch::default();

        let mut rtvs = DynamicArray::<d3d12::D3D12_CPU_DESCRIPTOR_HANDLE, 8>::new();
        for target in &def.color_targets {
            let id = self.render_target_view(target.texture, target.mip_slice, target.array_slice)?;
            rtvs.push(self.heaps.rtv_heap.id_to_cpu_handle(id));

            let resource = SgfxBindingResource::Texture(target.texture);
            self.tables
                .unbind(SgfxBindingKind::ShaderResource, resource);
            self.tables
                .unbind(SgfxBindingKind::UnorderedAccess, resource);

            let native = &self.resources.texture(target.texture)?.native;
            native.state.transition(
                &native.resource,
                d3d12::D3D12_RESOURCE_STATE_RENDER_TARGET,
                &mut barriers,
            );
        }

        let dsv = match &def.depth_target {
            Some(target) => {
                // A read-only depth target may be sampled during the pass
                if !target.read_only {
                    self.tables.unbind(
                        SgfxBindingKind::ShaderResource,
                        SgfxBindingResource::Texture(target.texture),
                    );
                }

                let native = &self.resources.texture(target.texture)?.native;
                let (view, state) = if target.read_only {
                    (native.read_only_dsv, d3d12::D3D12_RESOURCE_STATE_DEPTH_READ)
                } else {
                    (native.dsv, d3d12::D3D12_RESOURCE_STATE_DEPTH_WRITE)
                };
                let view = view.ok_or("depth target has no depth stencil view")?;
                native
                    .state
                    .transition(&native.resource, state, &mut barriers);
                Some(self.heaps.dsv_heap.id_to_cpu_handle(view))
            }
            None => None,
        };

        barriers.record(&self.command_list);

        let viewport = def.viewport.unwrap_or_else(|| {
            SgfxViewport::for_extents(render_pass.width, render_pass.height)
        });

        let command_list = &self.command_list;
        unsafe {
            command_list.OMSetRenderTargets(
                rtvs.len() as u32,
                if rtvs.is_empty() {
                    None
                } else {
                    Some(rtvs.as_ptr())
                },
                false,
                dsv.as_ref().map(|dsv| dsv as *const _),
            );
            command_list.RSSetViewports(&[d3d12::D3D12_VIEWPORT {
                TopLeftX: viewport.x,
                TopLeftY: viewport.y,
                Width: viewport.width,
                Height: viewport.height,
                MinDepth: viewport.min_depth,
                MaxDepth: viewport.max_depth,
            }]);
            command_list.RSSetScissorRects(&[RECT {
                left: 0,
                top: 0,
                right: render_pass.width as i32,
                bottom: render_pass.height as i32,
            }]);

            for (target, rtv) in def.color_targets.iter().zip(rtvs.iter()) {
                if target.load_op == SgfxLoadOp::Clear {
                    command_list.ClearRenderTargetView(*rtv, target.clear_value.as_ptr(), &[]);
                }
            }

            if let (Some(target), Some(dsv)) = (&def.depth_target, dsv) {
                let mut flags = d3d12::D3D12_CLEAR_FLAGS(0);
                if target.depth_load_op == SgfxLoadOp::Clear {
                    flags |= d3d12::D3D12_CLEAR_FLAG_DEPTH;
                }
                if target.stencil_load_op == SgfxLoadOp::Clear
                    && render_pass
                        .depth_format
                        .map_or(false, |format| format.has_stencil())
                {
                    flags |= d3d12::D3D12_CLEAR_FLAG_STENCIL;
                }

                if flags.0 != 0 && !target.read_only {
                    command_list.ClearDepthStencilView(
                        dsv,
                        flags,
                        target.clear_depth,
                        target.clear_stencil,
                        &[],
                    );
                }
            }
        }

        Ok(())
    }

    fn end_render_pass(&mut self) -> SgfxResult<()> {
        // Pixel shader UAVs end with the pass, as they do on dx11
        self.tables.unbind_all(SgfxBindingKind::UnorderedAccess);
        unsafe {
            self.command_list.OMSetRenderTargets(0, None, false, None);
        }

        Ok(())
    }

    fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.pipeline_state(queue.pipeline())?.native;
        unsafe {
            self.command_list
                .SetGraphicsRootSignature(&self.root_signature);
            self.command_list.SetPipelineState(&pipeline.pipeline);
            self.command_list.IASetPrimitiveTopology(pipeline.topology);
            self.command_list.OMSetStencilRef(0);
            self.command_list
                .OMSetBlendFactor(Some([1.0f32; 4].as_ptr()));
        }

        let context = Dx12EncoderContext {
            device: &self.device,
            command_list: &self.command_list,
            resources: &self.resources,
            heaps: &mut self.heaps,
            tables: &mut self.tables,
            uploads: &mut self.uploads,
            released: &mut self.frames[self.frame_index].released,
            command_signatures: &self.command_signatures,
        };
        let mut encoder = Dx12CommandEncoder::new(context, false);
        replay_draw_queue(&mut encoder, queue, SgfxBindingModel::SharedAcrossStages)
    }

    fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.compute_pipeline(queue.pipeline())?.native;
        unsafe {
            self.command_list
                .SetComputeRootSignature(&self.root_signature);
            self.command_list.SetPipelineState(&pipeline.pipeline);
        }

        let context = Dx12EncoderContext {
            device: &self.device,
            command_list: &self.command_list,
            resources: &self.resources,
            heaps: &mut self.heaps,
            tables: &mut self.tables,
            uploads: &mut self.uploads,
            released: &mut self.frames[self.frame_index].released,
            command_signatures: &self.command_signatures,
        };
        let mut encoder = Dx12CommandEncoder::new(context, true);
        replay_compute_queue(&mut encoder, queue, SgfxBindingModel::SharedAcrossStages)?;

        // Written resources may be bound as inputs by the next queue
        self.tables.unbind_all(SgfxBindingKind::UnorderedAccess);
        Ok(())
    }

    fn clear_unordered_access_uint(
        &mut self,
        view: SgfxResourceView,
        values: [u32; 4],
    ) -> SgfxResult<()> {
        let (gpu_handle, cpu_handle, resource) = self.prepare_uav_clear(view)?;
        unsafe {
            self.command_list.ClearUnorderedAccessViewUint(
                gpu_handle,
                cpu_handle,
                &resource,
                values.as_ptr(),
                &[],
            );
            self.command_list
                .ResourceBarrier(&[uav_barrier(Some(&resource))]);
        }

        Ok(())
    }

    fn clear_unordered_access_float(
        &mut self,
        view: SgfxResourceView,
        values: [f32; 4],
    ) -> SgfxResult<()> {
        let (gpu_handle, cpu_handle, resource) = self.prepare_uav_clear(view)?;
        unsafe {
            self.command_list.ClearUnorderedAccessViewFloat(
                gpu_handle,
                cpu_handle,
                &resource,
                values.as_ptr(),
                &[],
            );
            self.command_list
                .ResourceBarrier(&[uav_barrier(Some(&resource))]);
        }

        Ok(())
    }

    fn flush(&mut self) -> SgfxResult<()> {
        profiling::scope!("flush");
        let signal_value = self.next_fence_value;
        unsafe {
            self.command_list.Close()?;
            let command_list: d3d12::ID3D12CommandList = self.command_list.cast()?;
            self.queue.ExecuteCommandLists(&[Some(command_list)]);
            self.queue.Signal(&self.fence, signal_value)?;
        }
        self.frames[self.frame_index].fence_value = signal_value;
        self.next_fence_value += 1;

        // Reuse the oldest frame once the GPU is done with it
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        self.wait_for_fence(self.frames[self.frame_index].fence_value)?;
        self.recycle_frame(self.frame_index);
        self.heaps
            .gpu_cbv_srv_uav_ring
            .begin_frame(self.frame_index as u32);
        self.uploads.begin_frame(self.frame_index as u32);
        self.reset_command_list()
    }

    fn wait_idle(&mut self) -> SgfxResult<()> {
        profiling::scope!("wait_idle");
        self.flush()?;
        self.wait_for_fence(self.next_fence_value - 1)?;
        for frame_index in 0..self.frames.len() {
            self.recycle_frame(frame_index);
        }

        Ok(())
    }
}

impl Drop for SgfxDeviceDx12 {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("Failed to wait for the GPU while dropping the device: {}", e);
        }

        unsafe {
            CloseHandle(self.fence_event);
        }
    }
}
