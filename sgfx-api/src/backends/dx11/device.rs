use super::command_encoder::Dx11CommandEncoder;
use super::internal::conversions::*;
use super::internal::dx11_subresource_index;
use crate::backends::dxgi_common::{wchar_to_string, window_hwnd};
use crate::internal_shared::*;
use crate::*;
use raw_window_handle::HasRawWindowHandle;
use sgfx_base::DynamicArray;
use std::ffi::{c_void, CString};
use windows::core::ComInterface;
use windows::Win32::Foundation::{BOOL, HMODULE, RECT};
use windows::Win32::Graphics::{
    Direct3D as d3d, Direct3D11 as d3d11, Dxgi as dxgi, Dxgi::Common as dxgi_common,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SgfxDriverTypeDx11 {
    Hardware,
    /// Software rasterizer, available on every Windows install
    Warp,
}

/// D3D11 specific configuration
#[derive(Clone, Debug)]
pub struct SgfxApiDefDx11 {
    pub driver_type: SgfxDriverTypeDx11,
    /// Create a WARP device if no hardware device can be created
    pub allow_warp_fallback: bool,
}

impl Default for SgfxApiDefDx11 {
    fn default() -> Self {
        SgfxApiDefDx11 {
            driver_type: SgfxDriverTypeDx11::Hardware,
            allow_warp_fallback: true,
        }
    }
}

pub struct SgfxDx11Buffer {
    pub(super) buffer: d3d11::ID3D11Buffer,
    pub(super) srv: Option<d3d11::ID3D11ShaderResourceView>,
    pub(super) uav: Option<d3d11::ID3D11UnorderedAccessView>,
}

pub struct SgfxDx11Texture {
    resource: d3d11::ID3D11Resource,
    pub(super) srv: Option<d3d11::ID3D11ShaderResourceView>,
    pub(super) uav: Option<d3d11::ID3D11UnorderedAccessView>,
    // Created the first time a (mip, slice) is used as a render target
    rtvs: Vec<((u32, u32), d3d11::ID3D11RenderTargetView)>,
    dsv: Option<d3d11::ID3D11DepthStencilView>,
    read_only_dsv: Option<d3d11::ID3D11DepthStencilView>,
}

pub struct SgfxDx11Sampler {
    pub(super) sampler: d3d11::ID3D11SamplerState,
}

enum Dx11ShaderObject {
    Vertex(d3d11::ID3D11VertexShader),
    Hull(d3d11::ID3D11HullShader),
    Domain(d3d11::ID3D11DomainShader),
    Geometry(d3d11::ID3D11GeometryShader),
    Pixel(d3d11::ID3D11PixelShader),
    Compute(d3d11::ID3D11ComputeShader),
}

pub struct SgfxDx11Shader {
    object: Dx11ShaderObject,
    // Input layouts are validated against the vertex shader's input signature
    bytecode: Vec<u8>,
}

pub struct SgfxDx11PipelineState {
    vertex_shader: d3d11::ID3D11VertexShader,
    hull_shader: Option<d3d11::ID3D11HullShader>,
    domain_shader: Option<d3d11::ID3D11DomainShader>,
    geometry_shader: Option<d3d11::ID3D11GeometryShader>,
    pixel_shader: Option<d3d11::ID3D11PixelShader>,
    input_layout: Option<d3d11::ID3D11InputLayout>,
    topology: d3d::D3D_PRIMITIVE_TOPOLOGY,
    pub(super) blend_state: d3d11::ID3D11BlendState,
    pub(super) depth_stencil_state: d3d11::ID3D11DepthStencilState,
    rasterizer_state: d3d11::ID3D11RasterizerState,
}

pub struct SgfxDx11ComputePipeline {
    compute_shader: d3d11::ID3D11ComputeShader,
}

pub struct SgfxDx11Swapchain {
    swapchain: dxgi::IDXGISwapChain1,
    sync_interval: u32,
    buffer_count: u32,
    current_back_buffer: u32,
}

pub struct SgfxDeviceDx11 {
    device: d3d11::ID3D11Device,
    context: d3d11::ID3D11DeviceContext,
    dxgi_factory: dxgi::IDXGIFactory2,
    // D3D11_QUERY_EVENT used to wait for the GPU to drain
    idle_query: d3d11::ID3D11Query,
    device_info: SgfxDeviceInfo,
    resources: SgfxResourceTables<SgfxDeviceDx11>,
}

impl SgfxBackendTypes for SgfxDeviceDx11 {
    type Buffer = SgfxDx11Buffer;
    type Texture = SgfxDx11Texture;
    type Sampler = SgfxDx11Sampler;
    type Shader = SgfxDx11Shader;
    type PipelineState = SgfxDx11PipelineState;
    type ComputePipeline = SgfxDx11ComputePipeline;
    type Swapchain = SgfxDx11Swapchain;
}

fn create_d3d11_device(
    driver_type: d3d::D3D_DRIVER_TYPE,
    flags: d3d11::D3D11_CREATE_DEVICE_FLAG,
) -> SgfxResult<(d3d11::ID3D11Device, d3d11::ID3D11DeviceContext)> {
    let mut device = None;
    let mut context = None;
    unsafe {
        d3d11::D3D11CreateDevice(
            None,
            driver_type,
            HMODULE::default(),
            flags,
            Some(&[d3d::D3D_FEATURE_LEVEL_11_0]),
            d3d11::D3D11_SDK_VERSION,
            Some(&mut device as *mut _),
            None,
            Some(&mut context as *mut _),
        )?;
    }

    match (device, context) {
        (Some(device), Some(context)) => Ok((device, context)),
        _ => Err("D3D11CreateDevice did not return a device".into()),
    }
}

fn texture_srv_desc(def: &SgfxTextureDef) -> d3d11::D3D11_SHADER_RESOURCE_VIEW_DESC {
    let mut desc = d3d11::D3D11_SHADER_RESOURCE_VIEW_DESC {
        Format: def.format.dxgi_srv_format(),
        ..Default::default()
    };

    match def.dimensions {
        SgfxTextureDimensions::Dim1D => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURE1DARRAY;
            desc.Anonymous.Texture1DArray = d3d11::D3D11_TEX1D_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                FirstArraySlice: 0,
                ArraySize: def.array_length,
            };
        }
        SgfxTextureDimensions::Dim2D if def.sample_count > 1 => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURE2DMSARRAY;
            desc.Anonymous.Texture2DMSArray = d3d11::D3D11_TEX2DMS_ARRAY_SRV {
                FirstArraySlice: 0,
                ArraySize: def.array_length,
            };
        }
        SgfxTextureDimensions::Dim2D => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURE2DARRAY;
            desc.Anonymous.Texture2DArray = d3d11::D3D11_TEX2D_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                FirstArraySlice: 0,
                ArraySize: def.array_length,
            };
        }
        SgfxTextureDimensions::Dim3D => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURE3D;
            desc.Anonymous.Texture3D = d3d11::D3D11_TEX3D_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
            };
        }
        SgfxTextureDimensions::Cube if def.array_length > 6 => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURECUBEARRAY;
            desc.Anonymous.TextureCubeArray = d3d11::D3D11_TEXCUBE_ARRAY_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
                First2DArrayFace: 0,
                NumCubes: def.array_length / 6,
            };
        }
        SgfxTextureDimensions::Cube => {
            desc.ViewDimension = d3d::D3D_SRV_DIMENSION_TEXTURECUBE;
            desc.Anonymous.TextureCube = d3d11::D3D11_TEXCUBE_SRV {
                MostDetailedMip: 0,
                MipLevels: def.mip_count,
            };
        }
    }

    desc
}

fn texture_rtv_desc(
    def: &SgfxTextureDef,
    mip_slice: u32,
    array_slice: u32,
) -> d3d11::D3D11_RENDER_TARGET_VIEW_DESC {
    let mut desc = d3d11::D3D11_RENDER_TARGET_VIEW_DESC {
        Format: def.format.dxgi_format(),
        ..Default::default()
    };

    match def.dimensions {
        SgfxTextureDimensions::Dim1D => {
            desc.ViewDimension = d3d11::D3D11_RTV_DIMENSION_TEXTURE1DARRAY;
            desc.Anonymous.Texture1DArray = d3d11::D3D11_TEX1D_ARRAY_RTV {
                MipSlice: mip_slice,
                FirstArraySlice: array_slice,
                ArraySize: 1,
            };
        }
        SgfxTextureDimensions::Dim3D => {
            desc.ViewDimension = d3d11::D3D11_RTV_DIMENSION_TEXTURE3D;
            desc.Anonymous.Texture3D = d3d11::D3D11_TEX3D_RTV {
                MipSlice: mip_slice,
                FirstWSlice: array_slice,
                WSize: 1,
            };
        }
        _ if def.sample_count > 1 => {
            desc.ViewDimension = d3d11::D3D11_RTV_DIMENSION_TEXTURE2DMSARRAY;
            desc.Anonymous.Texture2DMSArray = d3d11::D3D11_TEX2DMS_ARRAY_RTV {
                FirstArraySlice: array_slice,
                ArraySize: 1,
            };
        }
        _ => {
            desc.ViewDimension = d3d11::D3D11_RTV_DIMENSION_TEXTURE2DARRAY;
            desc.Anonymous.Texture2DArray = d3d11::D3D11_TEX2D_ARRAY_RTV {
                MipSlice: mip_slice,
                FirstArraySlice: array_slice,
                ArraySize: 1,
            };
        }
    }

    desc
}

fn texture_dsv_desc(
    def: &SgfxTextureDef,
    read_only: bool,
) -> d3d11::D3D11_DEPTH_STENCIL_VIEW_DESC {
    let mut flags = 0;
    if read_only {
        flags |= d3d11::D3D11_DSV_READ_ONLY_DEPTH.0 as u32;
        if def.format.has_stencil() {
            flags |= d3d11::D3D11_DSV_READ_ONLY_STENCIL.0 as u32;
        }
    }

    let mut desc = d3d11::D3D11_DEPTH_STENCIL_VIEW_DESC {
        Format: def.format.dxgi_format(),
        Flags: flags,
        ..Default::default()
    };

    if def.sample_count > 1 {
        desc.ViewDimension = d3d11::D3D11_DSV_DIMENSION_TEXTURE2DMSARRAY;
        desc.Anonymous.Texture2DMSArray = d3d11::D3D11_TEX2DMS_ARRAY_DSV {
            FirstArraySlice: 0,
            ArraySize: def.array_length,
        };
    } else {
        desc.ViewDimension = d3d11::D3D11_DSV_DIMENSION_TEXTURE2DARRAY;
        desc.Anonymous.Texture2DArray = d3d11::D3D11_TEX2D_ARRAY_DSV {
            MipSlice: 0,
            FirstArraySlice: 0,
            ArraySize: def.array_length,
        };
    }

    desc
}

fn buffer_view_format(def: &SgfxBufferDef) -> dxgi_common::DXGI_FORMAT {
    if def.flags.contains(SgfxBufferFlags::STRUCTURED) {
        dxgi_common::DXGI_FORMAT_UNKNOWN
    } else if def.flags.contains(SgfxBufferFlags::RAW) {
        dxgi_common::DXGI_FORMAT_R32_TYPELESS
    } else {
        // Plain buffers are viewed as typed uint buffers
        dxgi_common::DXGI_FORMAT_R32_UINT
    }
}

impl SgfxDeviceDx11 {
    pub(crate) fn new(
        api_def: &SgfxApiDef,
        dx11_api_def: &SgfxApiDefDx11,
    ) -> SgfxResult<Self> {
        let mut driver_types = vec![match dx11_api_def.driver_type {
            SgfxDriverTypeDx11::Hardware => d3d::D3D_DRIVER_TYPE_HARDWARE,
            SgfxDriverTypeDx11::Warp => d3d::D3D_DRIVER_TYPE_WARP,
        }];
        if dx11_api_def.allow_warp_fallback
            && dx11_api_def.driver_type == SgfxDriverTypeDx11::Hardware
        {
            driver_types.push(d3d::D3D_DRIVER_TYPE_WARP);
        }

        let debug_flags =
            d3d11::D3D11_CREATE_DEVICE_SINGLETHREADED | d3d11::D3D11_CREATE_DEVICE_DEBUG;
        let mut created = None;
        let mut last_error: SgfxError = "no D3D11 driver type was tried".into();
        for driver_type in driver_types {
            let result = match api_def.validation_mode {
                SgfxValidationMode::Disabled => {
                    create_d3d11_device(driver_type, d3d11::D3D11_CREATE_DEVICE_SINGLETHREADED)
                }
                SgfxValidationMode::Enabled => create_d3d11_device(driver_type, debug_flags),
                // The debug layer is only present with the Graphics Tools feature installed
                SgfxValidationMode::EnabledIfAvailable => {
                    create_d3d11_device(driver_type, debug_flags).or_else(|e| {
                        log::warn!("D3D11 debug layer unavailable: {}", e);
                        create_d3d11_device(driver_type, d3d11::D3D11_CREATE_DEVICE_SINGLETHREADED)
                    })
                }
            };

            match result {
                Ok(device) => {
                    log::debug!("Created D3D11 device with driver type {:?}", driver_type);
                    created = Some(device);
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to create D3D11 device with driver type {:?}: {}",
                        driver_type,
                        e
                    );
                    last_error = e;
                }
            }
        }

        let (device, context) = created.ok_or(last_error)?;

        let (adapter_name, dxgi_factory) = unsafe {
            let dxgi_device: dxgi::IDXGIDevice = device.cast()?;
            let adapter = dxgi_device.GetAdapter()?;
            let desc = adapter.GetDesc()?;
            let factory: dxgi::IDXGIFactory2 = adapter.GetParent()?;
            (wchar_to_string(&desc.Description), factory)
        };
        log::info!("Using D3D11 adapter {}", adapter_name);

        let idle_query = unsafe {
            let desc = d3d11::D3D11_QUERY_DESC {
                Query: d3d11::D3D11_QUERY_EVENT,
                ..Default::default()
            };
            let mut query = None;
            device.CreateQuery(&desc, Some(&mut query as *mut _))?;
            query.ok_or("CreateQuery did not return a query")?
        };

        let device_info = SgfxDeviceInfo {
            backend_type: SgfxBackendType::Dx11,
            adapter_name,
            constant_buffer_alignment: 16,
            upload_row_pitch_alignment: 1,
            max_texture_dimension_2d: d3d11::D3D11_REQ_TEXTURE2D_U_OR_V_DIMENSION,
            supports_pixel_shader_uavs: true,
        };

        Ok(SgfxDeviceDx11 {
            device,
            context,
            dxgi_factory,
            idle_query,
            device_info,
            resources: SgfxResourceTables::new(api_def),
        })
    }

    pub fn dx11_device(&self) -> &d3d11::ID3D11Device {
        &self.device
    }

    pub fn dx11_context(&self) -> &d3d11::ID3D11DeviceContext {
        &self.context
    }

    fn map(
        &self,
        resource: &d3d11::ID3D11Resource,
        map_type: d3d11::D3D11_MAP,
    ) -> SgfxResult<*mut u8> {
        let mut mapped = d3d11::D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(resource, 0, map_type, 0, Some(&mut mapped as *mut _))?;
        }

        if mapped.pData.is_null() {
            unsafe { self.context.Unmap(resource, 0) };
            return Err("Map returned a null pointer".into());
        }

        Ok(mapped.pData as *mut u8)
    }

    fn create_shader_resource_view(
        &self,
        resource: &d3d11::ID3D11Resource,
        desc: &d3d11::D3D11_SHADER_RESOURCE_VIEW_DESC,
    ) -> SgfxResult<d3d11::ID3D11ShaderResourceView> {
        let mut view = None;
        unsafe {
            self.device.CreateShaderResourceView(
                resource,
                Some(desc as *const _),
                Some(&mut view as *mut _),
            )?;
        }
        Ok(view.ok_or("CreateShaderResourceView did not return a view")?)
    }

    fn create_unordered_access_view(
        &self,
        resource: &d3d11::ID3D11Resource,
        desc: Option<&d3d11::D3D11_UNORDERED_ACCESS_VIEW_DESC>,
    ) -> SgfxResult<d3d11::ID3D11UnorderedAccessView> {
        let mut view = None;
        unsafe {
            self.device.CreateUnorderedAccessView(
                resource,
                desc.map(|desc| desc as *const _),
                Some(&mut view as *mut _),
            )?;
        }
        Ok(view.ok_or("CreateUnorderedAccessView did not return a view")?)
    }

    fn create_depth_stencil_view(
        &self,
        resource: &d3d11::ID3D11Resource,
        def: &SgfxTextureDef,
        read_only: bool,
    ) -> SgfxResult<d3d11::ID3D11DepthStencilView> {
        let desc = texture_dsv_desc(def, read_only);
        let mut view = None;
        unsafe {
            self.device.CreateDepthStencilView(
                resource,
                Some(&desc as *const _),
                Some(&mut view as *mut _),
            )?;
        }
        Ok(view.ok_or("CreateDepthStencilView did not return a view")?)
    }

    fn render_target_view(
        &mut self,
        texture: SgfxTextureHandle,
        mip_slice: u32,
        array_slice: u32,
    ) -> SgfxResult<d3d11::ID3D11RenderTargetView> {
        let device = &self.device;
        let entry = self.resources.texture_mut(texture)?;
        let key = (mip_slice, array_slice);
        if let Some((_, view)) = entry.native.rtvs.iter().find(|(k, _)| *k == key) {
            return Ok(view.clone());
        }

        let desc = texture_rtv_desc(&entry.def, mip_slice, array_slice);
        let mut view = None;
        unsafe {
            device.CreateRenderTargetView(
                &entry.native.resource,
                Some(&desc as *const _),
                Some(&mut view as *mut _),
            )?;
        }
        let view: d3d11::ID3D11RenderTargetView =
            view.ok_or("CreateRenderTargetView did not return a view")?;
        entry.native.rtvs.push((key, view.clone()));
        Ok(view)
    }

    fn create_texture_resource(
        &self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<d3d11::ID3D11Resource> {
        let sampled = def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE);
        let format = def.format.dxgi_resource_format(sampled);
        let usage: d3d11::D3D11_USAGE = def.usage.into();
        let bind_flags = bind_flags_bind_flags(def.bind_flags);
        let cpu_access_flags = usage_cpu_access_flags(def.usage);

        let subresources: Vec<_> = initial_data
            .iter()
            .map(|subresource| d3d11::D3D11_SUBRESOURCE_DATA {
                pSysMem: subresource.data.as_ptr() as *const c_void,
                SysMemPitch: subresource.row_pitch,
                SysMemSlicePitch: subresource.slice_pitch,
            })
            .collect();
        let initial = if subresources.is_empty() {
            None
        } else {
            Some(subresources.as_ptr())
        };

        let resource: d3d11::ID3D11Resource = unsafe {
            match def.dimensions {
                SgfxTextureDimensions::Dim1D => {
                    let desc = d3d11::D3D11_TEXTURE1D_DESC {
                        Width: def.width,
                        MipLevels: def.mip_count,
                        ArraySize: def.array_length,
                        Format: format,
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: 0,
                    };
                    let mut texture = None;
                    self.device
                        .CreateTexture1D(&desc, initial, Some(&mut texture as *mut _))?;
                    texture
                        .ok_or("CreateTexture1D did not return a texture")?
                        .cast()?
                }
                SgfxTextureDimensions::Dim2D | SgfxTextureDimensions::Cube => {
                    let misc_flags = if def.dimensions == SgfxTextureDimensions::Cube {
                        d3d11::D3D11_RESOURCE_MISC_TEXTURECUBE.0 as u32
                    } else {
                        0
                    };
                    let desc = d3d11::D3D11_TEXTURE2D_DESC {
                        Width: def.width,
                        Height: def.height,
                        MipLevels: def.mip_count,
                        ArraySize: def.array_length,
                        Format: format,
                        SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
                            Count: def.sample_count,
                            Quality: 0,
                        },
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: misc_flags,
                    };
                    let mut texture = None;
                    self.device
                        .CreateTexture2D(&desc, initial, Some(&mut texture as *mut _))?;
                    texture
                        .ok_or("CreateTexture2D did not return a texture")?
                        .cast()?
                }
                SgfxTextureDimensions::Dim3D => {
                    let desc = d3d11::D3D11_TEXTURE3D_DESC {
                        Width: def.width,
                        Height: def.height,
                        Depth: def.depth,
                        MipLevels: def.mip_count,
                        Format: format,
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: 0,
                    };
                    let mut texture = None;
                    self.device
                        .CreateTexture3D(&desc, initial, Some(&mut texture as *mut _))?;
                    texture
                        .ok_or("CreateTexture3D did not return a texture")?
                        .cast()?
                }
            }
        };

        Ok(resource)
    }

    fn create_shader_object(
        &self,
        stage: SgfxShaderStage,
        bytecode: &[u8],
    ) -> SgfxResult<Dx11ShaderObject> {
        macro_rules! create {
            ($function:ident, $variant:ident) => {{
                let mut shader = None;
                self.device
                    .$function(bytecode, None, Some(&mut shader as *mut _))?;
                Dx11ShaderObject::$variant(shader.ok_or(concat!(
                    stringify!($function),
                    " did not return a shader"
                ))?)
            }};
        }

        let object = unsafe {
            match stage {
                SgfxShaderStage::Vertex => create!(CreateVertexShader, Vertex),
                SgfxShaderStage::Hull => create!(CreateHullShader, Hull),
                SgfxShaderStage::Domain => create!(CreateDomainShader, Domain),
                SgfxShaderStage::Geometry => create!(CreateGeometryShader, Geometry),
                SgfxShaderStage::Pixel => create!(CreatePixelShader, Pixel),
                SgfxShaderStage::Compute => create!(CreateComputeShader, Compute),
            }
        };

        Ok(object)
    }

    fn create_input_layout(
        &self,
        input_layout: &[SgfxInputElement],
        vertex_bytecode: &[u8],
    ) -> SgfxResult<Option<d3d11::ID3D11InputLayout>> {
        if input_layout.is_empty() {
            return Ok(None);
        }

        // The descs point into these strings
        let semantics = input_layout
            .iter()
            .map(|element| CString::new(element.semantic.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| "input element semantic contains a nul byte")?;

        let elements: Vec<_> = input_layout
            .iter()
            .zip(&semantics)
            .map(|(element, semantic)| d3d11::D3D11_INPUT_ELEMENT_DESC {
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

        let mut layout = None;
        unsafe {
            self.device.CreateInputLayout(
                &elements,
                vertex_bytecode,
                Some(&mut layout as *mut _),
            )?;
        }
        Ok(Some(
            layout.ok_or("CreateInputLayout did not return a layout")?,
        ))
    }

    fn apply_pipeline_state(&self, pipeline: &SgfxDx11PipelineState) {
        let context = &self.context;
        unsafe {
            context.IASetInputLayout(pipeline.input_layout.as_ref());
            context.IASetPrimitiveTopology(pipeline.topology);
            context.VSSetShader(&pipeline.vertex_shader, None);
            context.HSSetShader(pipeline.hull_shader.as_ref(), None);
            context.DSSetShader(pipeline.domain_shader.as_ref(), None);
            context.GSSetShader(pipeline.geometry_shader.as_ref(), None);
            context.PSSetShader(pipeline.pixel_shader.as_ref(), None);
            context.OMSetBlendState(&pipeline.blend_state, Some([1.0f32; 4].as_ptr()), u32::MAX);
            context.OMSetDepthStencilState(&pipeline.depth_stencil_state, 0);
            context.RSSetState(&pipeline.rasterizer_state);
        }
    }

    fn back_buffers(
        &self,
        swapchain: &dxgi::IDXGISwapChain1,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxDx11Texture>> {
        // Flip model swapchains only expose buffer 0, which always refers to the buffer being
        // rendered this frame. Every back buffer entry wraps it.
        let mut back_buffers = Vec::with_capacity(def.buffer_count as usize);
        for _ in 0..def.buffer_count {
            let texture: d3d11::ID3D11Texture2D = unsafe { swapchain.GetBuffer(0)? };
            back_buffers.push(SgfxDx11Texture {
                resource: texture.cast()?,
                srv: None,
                uav: None,
                rtvs: Vec::default(),
                dsv: None,
                read_only_dsv: None,
            });
        }

        Ok(back_buffers)
    }

    fn unbind_compute_views(&self) {
        let mut views = DynamicArray::<Option<d3d11::ID3D11UnorderedAccessView>, 8>::new();
        for _ in 0..MAX_UNORDERED_ACCESS_SLOTS {
            views.push(None);
        }
        let mut resources = DynamicArray::<Option<d3d11::ID3D11ShaderResourceView>, 32>::new();
        for _ in 0..MAX_SHADER_RESOURCE_SLOTS {
            resources.push(None);
        }

        unsafe {
            self.context.CSSetUnorderedAccessViews(
                0,
                views.len() as u32,
                Some(views.as_ptr()),
                None,
            );
            self.context
                .CSSetShaderResources(0, Some(resources.as_slice()));
        }
    }

    fn resource_uav(
        &self,
        view: SgfxResourceView,
    ) -> SgfxResult<&d3d11::ID3D11UnorderedAccessView> {
        let uav = match view {
            SgfxResourceView::Buffer(buffer) => &self.resources.buffer(buffer)?.native.uav,
            SgfxResourceView::Texture(texture) => &self.resources.texture(texture)?.native.uav,
        };

        Ok(uav
            .as_ref()
            .ok_or("resource has no unordered access view")?)
    }
}

impl SgfxBackend for SgfxDeviceDx11 {
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
    ) -> SgfxResult<SgfxDx11Buffer> {
        let desc = d3d11::D3D11_BUFFER_DESC {
            ByteWidth: def.size as u32,
            Usage: def.usage.into(),
            BindFlags: bind_flags_bind_flags(def.bind_flags),
            CPUAccessFlags: usage_cpu_access_flags(def.usage),
            MiscFlags: buffer_misc_flags(def.bind_flags, def.flags),
            StructureByteStride: if def.flags.contains(SgfxBufferFlags::STRUCTURED) {
                def.structure_stride
            } else {
                0
            },
        };

        // D3D11 reads the full buffer size from the initial data
        let padded;
        let initial_data = match initial_data {
            Some(data) if (data.len() as u64) < def.size => {
                let mut bytes = vec![0u8; def.size as usize];
                bytes[..data.len()].copy_from_slice(data);
                padded = bytes;
                Some(padded.as_slice())
            }
            other => other,
        };
        let initial = initial_data.map(|data| d3d11::D3D11_SUBRESOURCE_DATA {
            pSysMem: data.as_ptr() as *const c_void,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        });

        let mut buffer = None;
        unsafe {
            self.device.CreateBuffer(
                &desc,
                initial.as_ref().map(|data| data as *const _),
                Some(&mut buffer as *mut _),
            )?;
        }
        let buffer: d3d11::ID3D11Buffer = buffer.ok_or("CreateBuffer did not return a buffer")?;
        let resource: d3d11::ID3D11Resource = buffer.cast()?;

        let format = buffer_view_format(def);
        let element_count = def.element_count() as u32;
        let srv = if def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE) {
            let flags = if def.flags.contains(SgfxBufferFlags::RAW) {
                d3d11::D3D11_BUFFEREX_SRV_FLAG_RAW.0 as u32
            } else {
                0
            };
            let mut desc = d3d11::D3D11_SHADER_RESOURCE_VIEW_DESC {
                Format: format,
                ViewDimension: d3d::D3D_SRV_DIMENSION_BUFFEREX,
                ..Default::default()
            };
            desc.Anonymous.BufferEx = d3d11::D3D11_BUFFEREX_SRV {
                FirstElement: 0,
                NumElements: element_count,
                Flags: flags,
            };
            Some(self.create_shader_resource_view(&resource, &desc)?)
        } else {
            None
        };

        let uav = if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            let mut flags = 0;
            if def.flags.contains(SgfxBufferFlags::RAW) {
                flags |= d3d11::D3D11_BUFFER_UAV_FLAG_RAW.0 as u32;
            }
            if def.flags.contains(SgfxBufferFlags::APPEND_COUNTER) {
                flags |= d3d11::D3D11_BUFFER_UAV_FLAG_APPEND.0 as u32;
            }
            let mut desc = d3d11::D3D11_UNORDERED_ACCESS_VIEW_DESC {
                Format: format,
                ViewDimension: d3d11::D3D11_UAV_DIMENSION_BUFFER,
                ..Default::default()
            };
            desc.Anonymous.Buffer = d3d11::D3D11_BUFFER_UAV {
                FirstElement: 0,
                NumElements: element_count,
                Flags: flags,
            };
            Some(self.create_unordered_access_view(&resource, Some(&desc))?)
        } else {
            None
        };

        Ok(SgfxDx11Buffer { buffer, srv, uav })
    }

    fn destroy_buffer(
        &mut self,
        _buffer: SgfxDx11Buffer,
    ) {
        // Views and the buffer are released on drop
    }

    fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        let entry = self.resources.buffer(buffer)?;
        let def = &entry.def;
        let resource: d3d11::ID3D11Resource = entry.native.buffer.cast()?;
        let whole_buffer = byte_offset == 0 && data.len() as u64 == def.size;

        match def.usage {
            SgfxUsage::Dynamic | SgfxUsage::Staging => {
                let map_type = match def.usage {
                    // Partial updates must not touch data the GPU is still reading
                    SgfxUsage::Dynamic if whole_buffer => d3d11::D3D11_MAP_WRITE_DISCARD,
                    SgfxUsage::Dynamic => d3d11::D3D11_MAP_WRITE_NO_OVERWRITE,
                    _ => d3d11::D3D11_MAP_WRITE,
                };
                let mapped = self.map(&resource, map_type)?;
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        data.as_ptr(),
                        mapped.add(byte_offset as usize),
                        data.len(),
                    );
                    self.context.Unmap(&resource, 0);
                }
            }
            SgfxUsage::Default => {
                if def.bind_flags.contains(SgfxBindFlags::CONSTANT_BUFFER) && !whole_buffer {
                    return Err("default usage constant buffers are updated whole on dx11".into());
                }

                let region = d3d11::D3D11_BOX {
                    left: byte_offset as u32,
                    top: 0,
                    front: 0,
                    right: (byte_offset + data.len() as u64) as u32,
                    bottom: 1,
                    back: 1,
                };
                let region = if whole_buffer {
                    None
                } else {
                    Some(&region as *const _)
                };
                unsafe {
                    self.context.UpdateSubresource(
                        &resource,
                        0,
                        region,
                        data.as_ptr() as *const c_void,
                        0,
                        0,
                    );
                }
            }
            SgfxUsage::Immutable => return Err("immutable buffers cannot be updated".into()),
        }

        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        let resource: d3d11::ID3D11Resource = self.resources.buffer(buffer)?.native.buffer.cast()?;

        // Blocks until the GPU has written the staging buffer
        let mapped = self.map(&resource, d3d11::D3D11_MAP_READ)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                mapped.add(byte_offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
            self.context.Unmap(&resource, 0);
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
        let src_buffer = &self.resources.buffer(src)?.native.buffer;
        let dst_buffer = &self.resources.buffer(dst)?.native.buffer;
        let region = d3d11::D3D11_BOX {
            left: src_offset as u32,
            top: 0,
            front: 0,
            right: (src_offset + size) as u32,
            bottom: 1,
            back: 1,
        };

        unsafe {
            self.context.CopySubresourceRegion(
                dst_buffer,
                0,
                dst_offset as u32,
                0,
                0,
                src_buffer,
                0,
                Some(&region as *const _),
            );
        }

        Ok(())
    }

    fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxDx11Texture> {
        let resource = self.create_texture_resource(def, initial_data)?;

        let srv = if def.bind_flags.contains(SgfxBindFlags::SHADER_RESOURCE) {
            Some(self.create_shader_resource_view(&resource, &texture_srv_desc(def))?)
        } else {
            None
        };

        let uav = if def.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            Some(self.create_unordered_access_view(&resource, None)?)
        } else {
            None
        };

        let (dsv, read_only_dsv) = if def.bind_flags.contains(SgfxBindFlags::DEPTH_STENCIL) {
            let dsv = self.create_depth_stencil_view(&resource, def, false)?;
            // Sampling a depth texture while it is bound needs a read-only view
            let read_only_dsv = if srv.is_some() {
                Some(self.create_depth_stencil_view(&resource, def, true)?)
            } else {
                None
            };
            (Some(dsv), read_only_dsv)
        } else {
            (None, None)
        };

        Ok(SgfxDx11Texture {
            resource,
            srv,
            uav,
            rtvs: Vec::default(),
            dsv,
            read_only_dsv,
        })
    }

    fn destroy_texture(
        &mut self,
        _texture: SgfxDx11Texture,
    ) {
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
        let subresource = dx11_subresource_index(mip, array_slice, entry.def.mip_count);

        unsafe {
            self.context.UpdateSubresource(
                &entry.native.resource,
                subresource,
                None,
                data.as_ptr() as *const c_void,
                row_pitch,
                row_pitch * height,
            );
        }

        Ok(())
    }

    fn create_sampler(
        &mut self,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<SgfxDx11Sampler> {
        let desc = sampler_def_sampler_desc(def);
        let mut sampler = None;
        unsafe {
            self.device
                .CreateSamplerState(&desc, Some(&mut sampler as *mut _))?;
        }

        Ok(SgfxDx11Sampler {
            sampler: sampler.ok_or("CreateSamplerState did not return a sampler")?,
        })
    }

    fn destroy_sampler(
        &mut self,
        _sampler: SgfxDx11Sampler,
    ) {
    }

    fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<SgfxDx11Shader> {
        let bytecode = match &def.code {
            SgfxShaderCode::D3dBytecode(bytecode) => bytecode,
            _ => return Err("dx11 shaders must be created from D3D bytecode".into()),
        };

        let object = self.create_shader_object(def.stage, bytecode)?;
        Ok(SgfxDx11Shader {
            object,
            bytecode: bytecode.clone(),
        })
    }

    fn destroy_shader(
        &mut self,
        _shader: SgfxDx11Shader,
    ) {
    }

    fn create_pipeline_state(
        &mut self,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<SgfxDx11PipelineState> {
        let vertex = &self.resources.shader(def.vertex_shader)?.native;
        let vertex_shader = match &vertex.object {
            Dx11ShaderObject::Vertex(shader) => shader.clone(),
            _ => return Err("pipeline vertex shader is not a vertex shader".into()),
        };
        let input_layout = self.create_input_layout(&def.input_layout, &vertex.bytecode)?;

        let mut hull_shader = None;
        let mut domain_shader = None;
        let mut geometry_shader = None;
        let mut pixel_shader = None;
        let stages = [
            def.hull_shader,
            def.domain_shader,
            def.geometry_shader,
            def.pixel_shader,
        ];
        for shader in stages.iter().flatten() {
            match &self.resources.shader(*shader)?.native.object {
                Dx11ShaderObject::Hull(shader) => hull_shader = Some(shader.clone()),
                Dx11ShaderObject::Domain(shader) => domain_shader = Some(shader.clone()),
                Dx11ShaderObject::Geometry(shader) => geometry_shader = Some(shader.clone()),
                Dx11ShaderObject::Pixel(shader) => pixel_shader = Some(shader.clone()),
                _ => return Err("pipeline shader is bound to the wrong stage".into()),
            }
        }

        let topology = def
            .primitive_topology
            .d3d_topology(hull_shader.is_some())?;

        let blend_desc = blend_state_blend_desc(&def.blend_state);
        let depth_stencil_desc = depth_stencil_state_depth_stencil_desc(&def.depth_stencil_state);
        let rasterizer_desc = rasterizer_state_rasterizer_desc(&def.rasterizer_state);

        let mut blend_state = None;
        let mut depth_stencil_state = None;
        let mut rasterizer_state = None;
        unsafe {
            self.device
                .CreateBlendState(&blend_desc, Some(&mut blend_state as *mut _))?;
            self.device.CreateDepthStencilState(
                &depth_stencil_desc,
                Some(&mut depth_stencil_state as *mut _),
            )?;
            self.device
                .CreateRasterizerState(&rasterizer_desc, Some(&mut rasterizer_state as *mut _))?;
        }

        Ok(SgfxDx11PipelineState {
            vertex_shader,
            hull_shader,
            domain_shader,
            geometry_shader,
            pixel_shader,
            input_layout,
            topology,
            blend_state: blend_state.ok_or("CreateBlendState did not return a state")?,
            depth_stencil_state: depth_stencil_state
                .ok_or("CreateDepthStencilState did not return a state")?,
            rasterizer_state: rasterizer_state
                .ok_or("CreateRasterizerState did not return a state")?,
        })
    }

    fn destroy_pipeline_state(
        &mut self,
        _pipeline: SgfxDx11PipelineState,
    ) {
    }

    fn create_compute_pipeline(
        &mut self,
        def: &SgfxComputePipelineDef,
    ) -> SgfxResult<SgfxDx11ComputePipeline> {
        match &self.resources.shader(def.compute_shader)?.native.object {
            Dx11ShaderObject::Compute(shader) => Ok(SgfxDx11ComputePipeline {
                compute_shader: shader.clone(),
            }),
            _ => Err("compute pipelines require a compute shader".into()),
        }
    }

    fn destroy_compute_pipeline(
        &mut self,
        _pipeline: SgfxDx11ComputePipeline,
    ) {
    }

    fn create_swapchain(
        &mut self,
        window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<(SgfxDx11Swapchain, Vec<SgfxDx11Texture>)> {
        let hwnd = window_hwnd(window)?;

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

        let swapchain = unsafe {
            let swapchain = self
                .dxgi_factory
                .CreateSwapChainForHwnd(&self.device, hwnd, &desc, None, None)?;
            self.dxgi_factory
                .MakeWindowAssociation(hwnd, dxgi::DXGI_MWA_NO_ALT_ENTER)?;
            swapchain
        };

        let back_buffers = self.back_buffers(&swapchain, def)?;
        Ok((
            SgfxDx11Swapchain {
                swapchain,
                sync_interval: def.enable_vsync as u32,
                buffer_count: def.buffer_count,
                current_back_buffer: 0,
            },
            back_buffers,
        ))
    }

    fn destroy_swapchain(
        &mut self,
        _swapchain: SgfxDx11Swapchain,
    ) {
    }

    fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxDx11Texture>> {
        // Every reference to the old buffers must be released before resizing
        unsafe {
            self.context.OMSetRenderTargets(None, None);
            self.context.Flush();
        }

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
        entry.native.buffer_count = def.buffer_count;
        entry.native.current_back_buffer = 0;
        entry.native.sync_interval = def.enable_vsync as u32;

        let native_swapchain = entry.native.swapchain.clone();
        self.back_buffers(&native_swapchain, def)
    }

    fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<usize> {
        profiling::scope!("present");
        let native = &mut self.resources.swapchain_mut(swapchain)?.native;
        unsafe {
            native.swapchain.Present(native.sync_interval, 0).ok()?;
        }

        native.current_back_buffer = (native.current_back_buffer + 1) % native.buffer_count;
        Ok(native.current_back_buffer as usize)
    }

    fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
        render_pass: &SgfxActiveRenderPass,
    ) -> SgfxResult<()> {
        profiling::scope!("begin_render_pass");
        let mut rtvs = DynamicArray::<Option<d3d11::ID3D11RenderTargetView>, 8>::new();
        for target in &def.color_targets {
            rtvs.push(Some(self.render_target_view(
                target.texture,
                target.mip_slice,
                target.array_slice,
            )?));
        }

        let dsv = match &def.depth_target {
            Some(target) => {
                let native = &self.resources.texture(target.texture)?.native;
                let view = if target.read_only {
                    &native.read_only_dsv
                } else {
                    &native.dsv
                };
                Some(
                    view.clone()
                        .ok_or("depth target has no depth stencil view")?,
                )
            }
            None => None,
        };

        let viewport = def.viewport.unwrap_or_else(|| {
            SgfxViewport::for_extents(render_pass.width, render_pass.height)
        });

        let context = &self.context;
        unsafe {
            context.OMSetRenderTargets(Some(rtvs.as_slice()), dsv.as_ref());
            context.RSSetViewports(Some(&[d3d11::D3D11_VIEWPORT {
                TopLeftX: viewport.x,
                TopLeftY: viewport.y,
                Width: viewport.width,
                Height: viewport.height,
                MinDepth: viewport.min_depth,
                MaxDepth: viewport.max_depth,
            }]));
            context.RSSetScissorRects(Some(&[RECT {
                left: 0,
                top: 0,
                right: render_pass.width as i32,
                bottom: render_pass.height as i32,
            }]));

            for (target, rtv) in def.color_targets.iter().zip(rtvs.iter()) {
                if target.load_op == SgfxLoadOp::Clear {
                    if let Some(rtv) = rtv {
                        context.ClearRenderTargetView(rtv, target.clear_value.as_ptr());
                    }
                }
            }

            if let (Some(target), Some(dsv)) = (&def.depth_target, &dsv) {
                let mut flags = 0;
                if target.depth_load_op == SgfxLoadOp::Clear {
                    flags |= d3d11::D3D11_CLEAR_DEPTH.0 as u32;
                }
                if target.stencil_load_op == SgfxLoadOp::Clear
                    && render_pass
                        .depth_format
                        .map_or(false, |format| format.has_stencil())
                {
                    flags |= d3d11::D3D11_CLEAR_STENCIL.0 as u32;
                }

                if flags != 0 && !target.read_only {
                    context.ClearDepthStencilView(
                        dsv,
                        flags,
                        target.clear_depth,
                        target.clear_stencil,
                    );
                }
            }
        }

        Ok(())
    }

    fn end_render_pass(&mut self) -> SgfxResult<()> {
        // Unbinds the attachments and any pixel shader UAVs so they can be read afterwards
        unsafe {
            self.context.OMSetRenderTargetsAndUnorderedAccessViews(
                0, None, None, 0, 0, None, None,
            );
        }

        Ok(())
    }

    fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.pipeline_state(queue.pipeline())?.native;
        self.apply_pipeline_state(pipeline);

        let mut encoder = Dx11CommandEncoder::new(&self.context, &self.resources, Some(pipeline));
        replay_draw_queue(&mut encoder, queue, SgfxBindingModel::PerStage)
    }

    fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.compute_pipeline(queue.pipeline())?.native;
        unsafe {
            self.context.CSSetShader(&pipeline.compute_shader, None);
        }

        let mut encoder = Dx11CommandEncoder::new(&self.context, &self.resources, None);
        replay_compute_queue(&mut encoder, queue, SgfxBindingModel::PerStage)?;

        // Written resources may be bound as inputs by the next queue
        self.unbind_compute_views();
        Ok(())
    }

    fn clear_unordered_access_uint(
        &mut self,
        view: SgfxResourceView,
        values: [u32; 4],
    ) -> SgfxResult<()> {
        let uav = self.resource_uav(view)?;
        unsafe {
            self.context
                .ClearUnorderedAccessViewUint(uav, values.as_ptr());
        }

        Ok(())
    }

    fn clear_unordered_access_float(
        &mut self,
        view: SgfxResourceView,
        values: [f32; 4],
    ) -> SgfxResult<()> {
        let uav = self.resource_uav(view)?;
        unsafe {
            self.context
                .ClearUnorderedAccessViewFloat(uav, values.as_ptr());
        }

        Ok(())
    }

    fn flush(&mut self) -> SgfxResult<()> {
        unsafe {
            self.context.Flush();
        }

        Ok(())
    }

    fn wait_idle(&mut self) -> SgfxResult<()> {
        profiling::scope!("wait_idle");
        unsafe {
            self.context.End(&self.idle_query);
            self.context.Flush();

            let mut done = BOOL(0);
            loop {
                self.context.GetData(
                    &self.idle_query,
                    Some(&mut done as *mut BOOL as *mut c_void),
                    std::mem::size_of::<BOOL>() as u32,
                    0,
                )?;
                if done.as_bool() {
                    break;
                }
                std::thread::yield_now();
            }
        }

        Ok(())
    }
}

impl Drop for SgfxDeviceDx11 {
    fn drop(&mut self) {
        unsafe {
            self.context.ClearState();
            self.context.Flush();
        }
    }
}
