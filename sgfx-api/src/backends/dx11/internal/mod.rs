use windows::Win32::Graphics::Direct3D11 as d3d11;

pub mod conversions;

/// Index of a subresource as D3D11CalcSubresource computes it
pub fn dx11_subresource_index(
    mip_slice: u32,
    array_slice: u32,
    mip_count: u32,
) -> u32 {
    mip_slice + array_slice * mip_count
}
