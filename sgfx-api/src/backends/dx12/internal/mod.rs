pub use windows::Win32::Graphics::Direct3D as d3d;
pub use windows::Win32::Graphics::Direct3D12 as d3d12;

use crate::SgfxResult;

pub mod conversions;
pub mod descriptor_heap;
pub mod resource_state;
pub mod upload_ring;

pub fn dx12_subresource_index(
    mip_slice: u32,
    array_slice: u32,
    plane_slice: u32,
    mip_levels: u32,
    array_size: u32,
) -> u32 {
    mip_slice + array_slice * mip_levels + plane_slice * mip_levels * array_size
}

pub fn align_up(
    value: u64,
    alignment: u64,
) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

pub fn buffer_resource_desc(
    size: u64,
    flags: d3d12::D3D12_RESOURCE_FLAGS,
) -> d3d12::D3D12_RESOURCE_DESC {
    d3d12::D3D12_RESOURCE_DESC {
        Dimension: d3d12::D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN,
        SampleDesc: windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: d3d12::D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: flags,
    }
}

pub fn create_committed_resource(
    device: &d3d12::ID3D12Device,
    heap_type: d3d12::D3D12_HEAP_TYPE,
    desc: &d3d12::D3D12_RESOURCE_DESC,
    initial_state: d3d12::D3D12_RESOURCE_STATES,
    clear_value: Option<&d3d12::D3D12_CLEAR_VALUE>,
) -> SgfxResult<d3d12::ID3D12Resource> {
    let heap_properties = d3d12::D3D12_HEAP_PROPERTIES {
        Type: heap_type,
        CPUPageProperty: d3d12::D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
        MemoryPoolPreference: d3d12::D3D12_MEMORY_POOL_UNKNOWN,
        CreationNodeMask: 1,
        VisibleNodeMask: 1,
    };

    let mut resource: Option<d3d12::ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &heap_properties,
            d3d12::D3D12_HEAP_FLAG_NONE,
            desc,
            initial_state,
            clear_value.map(|value| value as *const _),
            &mut resource,
        )?;
    }

    Ok(resource.ok_or("CreateCommittedResource did not return a resource")?)
}

/// Maps subresource 0 for the lifetime of the resource. Nothing is read back through the pointer
/// unless `read` is set.
pub fn map_resource(
    resource: &d3d12::ID3D12Resource,
    read: bool,
) -> SgfxResult<*mut u8> {
    let empty_range = d3d12::D3D12_RANGE { Begin: 0, End: 0 };
    let mut mapped = std::ptr::null_mut::<std::ffi::c_void>();
    unsafe {
        resource.Map(
            0,
            if read {
                None
            } else {
                Some(&empty_range as *const _)
            },
            Some(&mut mapped),
        )?;
    }

    if mapped.is_null() {
        return Err("Map returned a null pointer".into());
    }

    Ok(mapped as *mut u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subresource_index() {
        assert_eq!(dx12_subresource_index(0, 0, 0, 4, 6), 0);
        assert_eq!(dx12_subresource_index(2, 1, 0, 4, 6), 6);
        assert_eq!(dx12_subresource_index(0, 0, 1, 4, 6), 24);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(300, 512), 512);
    }
}
