//! Pieces shared by the Direct3D 11 and Direct3D 12 backends: DXGI formats, topology and the
//! window handle a swapchain is created for.

use crate::{
    SgfxFilter, SgfxFormat, SgfxIndexFormat, SgfxPrimitiveTopology, SgfxResult, SgfxSamplerDef,
};
use raw_window_handle::{HasRawWindowHandle, RawWindowHandle};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D as d3d;
use windows::Win32::Graphics::Dxgi::Common as dxgi_common;

pub(crate) fn wchar_to_string(s: &[u16]) -> String {
    let end = s.iter().position(|&v| v == 0).unwrap_or(s.len());
    String::from_utf16_lossy(&s[..end])
}

/// D3D11_FILTER and D3D12_FILTER share an encoding: two bits each for min, mag and mip filtering,
/// 0x55 for anisotropic, plus 0x80 for comparison samplers
pub(crate) fn d3d_filter_bits(def: &SgfxSamplerDef) -> i32 {
    let linear = |filter: SgfxFilter| (filter != SgfxFilter::Point) as i32;
    let mut bits = if def.is_anisotropic() {
        0x55
    } else {
        (linear(def.min_filter) << 4) | (linear(def.mag_filter) << 2) | linear(def.mip_filter)
    };

    if def.compare_op.is_some() {
        bits |= 0x80;
    }

    bits
}

pub(crate) fn window_hwnd(window: Option<&dyn HasRawWindowHandle>) -> SgfxResult<HWND> {
    let window = window.ok_or("a window is required to create a swapchain")?;
    match window.raw_window_handle() {
        RawWindowHandle::Windows(handle) => Ok(HWND(handle.hwnd as isize)),
        _ => Err("swapchains can only be created for Win32 windows".into()),
    }
}

impl SgfxFormat {
    pub fn dxgi_format(self) -> dxgi_common::DXGI_FORMAT {
        use dxgi_common::*;
        match self {
            SgfxFormat::Unknown => DXGI_FORMAT_UNKNOWN,
            SgfxFormat::R8Unorm => DXGI_FORMAT_R8_UNORM,
            SgfxFormat::R8G8Unorm => DXGI_FORMAT_R8G8_UNORM,
            SgfxFormat::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
            SgfxFormat::R8G8B8A8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
            SgfxFormat::R8G8B8A8Uint => DXGI_FORMAT_R8G8B8A8_UINT,
            SgfxFormat::B8G8R8A8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
            SgfxFormat::B8G8R8A8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
            SgfxFormat::R10G10B10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
            SgfxFormat::R11G11B10Float => DXGI_FORMAT_R11G11B10_FLOAT,
            SgfxFormat::R16Float => DXGI_FORMAT_R16_FLOAT,
            SgfxFormat::R16Uint => DXGI_FORMAT_R16_UINT,
            SgfxFormat::R16G16Float => DXGI_FORMAT_R16G16_FLOAT,
            SgfxFormat::R16G16B16A16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
            SgfxFormat::R32Float => DXGI_FORMAT_R32_FLOAT,
            SgfxFormat::R32Uint => DXGI_FORMAT_R32_UINT,
            SgfxFormat::R32Sint => DXGI_FORMAT_R32_SINT,
            SgfxFormat::R32G32Float => DXGI_FORMAT_R32G32_FLOAT,
            SgfxFormat::R32G32Uint => DXGI_FORMAT_R32G32_UINT,
            SgfxFormat::R32G32B32Float => DXGI_FORMAT_R32G32B32_FLOAT,
            SgfxFormat::R32G32B32Uint => DXGI_FORMAT_R32G32B32_UINT,
            SgfxFormat::R32G32B32A32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
            SgfxFormat::R32G32B32A32Uint => DXGI_FORMAT_R32G32B32A32_UINT,
            SgfxFormat::D16Unorm => DXGI_FORMAT_D16_UNORM,
            SgfxFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
            SgfxFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
            SgfxFormat::D32FloatS8X24Uint => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
        }
    }

    /// Format of the texture resource. Depth textures that are also sampled must be created
    /// typeless so that both the depth view and the shader resource view can be made.
    pub fn dxgi_resource_format(
        self,
        sampled: bool,
    ) -> dxgi_common::DXGI_FORMAT {
        use dxgi_common::*;
        if !sampled {
            return self.dxgi_format();
        }

        match self {
            SgfxFormat::D16Unorm => DXGI_FORMAT_R16_TYPELESS,
            SgfxFormat::D24UnormS8Uint => DXGI_FORMAT_R24G8_TYPELESS,
            SgfxFormat::D32Float => DXGI_FORMAT_R32_TYPELESS,
            SgfxFormat::D32FloatS8X24Uint => DXGI_FORMAT_R32G8X24_TYPELESS,
            _ => self.dxgi_format(),
        }
    }

    /// Format shader resource views of this texture are created with
    pub fn dxgi_srv_format(self) -> dxgi_common::DXGI_FORMAT {
        use dxgi_common::*;
        match self {
            SgfxFormat::D16Unorm => DXGI_FORMAT_R16_UNORM,
            SgfxFormat::D24UnormS8Uint => DXGI_FORMAT_R24_UNORM_X8_TYPELESS,
            SgfxFormat::D32Float => DXGI_FORMAT_R32_FLOAT,
            SgfxFormat::D32FloatS8X24Uint => DXGI_FORMAT_R32_FLOAT_X8X24_TYPELESS,
            _ => self.dxgi_format(),
        }
    }

    /// Flip model swapchains hold linear formats, sRGB is applied by the render target view
    pub fn dxgi_swapchain_format(self) -> dxgi_common::DXGI_FORMAT {
        self.to_linear().dxgi_format()
    }
}

impl SgfxIndexFormat {
    pub fn dxgi_format(self) -> dxgi_common::DXGI_FORMAT {
        match self {
            SgfxIndexFormat::Uint16 => dxgi_common::DXGI_FORMAT_R16_UINT,
            SgfxIndexFormat::Uint32 => dxgi_common::DXGI_FORMAT_R32_UINT,
        }
    }
}

impl SgfxPrimitiveTopology {
    /// Pipelines with a hull shader draw patch lists with the control point count of the topology
    pub fn d3d_topology(
        self,
        tessellated: bool,
    ) -> SgfxResult<d3d::D3D_PRIMITIVE_TOPOLOGY> {
        if tessellated {
            return Ok(match self.patch_control_points()? {
                1 => d3d::D3D_PRIMITIVE_TOPOLOGY_1_CONTROL_POINT_PATCHLIST,
                2 => d3d::D3D_PRIMITIVE_TOPOLOGY_2_CONTROL_POINT_PATCHLIST,
                _ => d3d::D3D_PRIMITIVE_TOPOLOGY_3_CONTROL_POINT_PATCHLIST,
            });
        }

        Ok(match self {
            SgfxPrimitiveTopology::PointList => d3d::D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
            SgfxPrimitiveTopology::LineList => d3d::D3D_PRIMITIVE_TOPOLOGY_LINELIST,
            SgfxPrimitiveTopology::LineStrip => d3d::D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
            SgfxPrimitiveTopology::TriangleList => d3d::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
            SgfxPrimitiveTopology::TriangleStrip => d3d::D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bits() {
        assert_eq!(d3d_filter_bits(&SgfxSamplerDef::point_clamp()), 0x00);
        assert_eq!(d3d_filter_bits(&SgfxSamplerDef::linear_clamp()), 0x15);

        let mut shadow = SgfxSamplerDef::linear_clamp();
        shadow.compare_op = Some(crate::SgfxCompareOp::LessOrEqual);
        assert_eq!(d3d_filter_bits(&shadow), 0x95);
    }

    #[test]
    fn test_depth_formats() {
        assert_eq!(
            SgfxFormat::D32Float.dxgi_resource_format(true),
            dxgi_common::DXGI_FORMAT_R32_TYPELESS
        );
        assert_eq!(
            SgfxFormat::D32Float.dxgi_resource_format(false),
            dxgi_common::DXGI_FORMAT_D32_FLOAT
        );
        assert_eq!(
            SgfxFormat::D24UnormS8Uint.dxgi_srv_format(),
            dxgi_common::DXGI_FORMAT_R24_UNORM_X8_TYPELESS
        );
    }
}
