use super::{align_up, buffer_resource_desc, create_committed_resource, d3d12, map_resource};
use crate::SgfxResult;

/// Linear allocation within one segment of a buffer split per frame in flight
#[derive(Debug)]
pub struct Dx12UploadSegments {
    segment_size: u64,
    segment: u64,
    cursor: u64,
}

impl Dx12UploadSegments {
    pub fn new(
        segment_size: u64,
    ) -> Self {
        Dx12UploadSegments {
            segment_size,
            segment: 0,
            cursor: 0,
        }
    }

    /// Offset from the start of the buffer, or None if the segment is full
    pub fn allocate(
        &mut self,
        size: u64,
        alignment: u64,
    ) -> Option<u64> {
        let offset = align_up(self.cursor, alignment);
        if offset + size > self.segment_size {
            return None;
        }

        self.cursor = offset + size;
        Some(self.segment * self.segment_size + offset)
    }

    pub fn begin_segment(
        &mut self,
        segment: u32,
    ) {
        self.segment = segment as u64;
        self.cursor = 0;
    }
}

/// Space in an upload heap buffer that the caller copies from with the command list
pub struct Dx12UploadAllocation {
    pub resource: d3d12::ID3D12Resource,
    pub offset: u64,
    pub ptr: *mut u8,
    /// Allocated outside the ring because it did not fit. Must be released once the frame
    /// that copies from it completes.
    pub dedicated: bool,
}

impl Dx12UploadAllocation {
    /// # Safety
    ///
    /// `offset + data.len()` must be within the allocation
    pub unsafe fn write(
        &self,
        offset: usize,
        data: &[u8],
    ) {
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
    }
}

fn create_upload_buffer(
    device: &d3d12::ID3D12Device,
    size: u64,
) -> SgfxResult<(d3d12::ID3D12Resource, *mut u8)> {
    let resource = create_committed_resource(
        device,
        d3d12::D3D12_HEAP_TYPE_UPLOAD,
        &buffer_resource_desc(size, d3d12::D3D12_RESOURCE_FLAG_NONE),
        d3d12::D3D12_RESOURCE_STATE_GENERIC_READ,
        None,
    )?;
    let ptr = map_resource(&resource, false)?;
    Ok((resource, ptr))
}

/// Persistently mapped upload heap buffer, one segment per frame in flight. Buffer and texture
/// updates are staged here and copied on the GPU timeline so they are ordered with the draws
/// around them.
pub struct Dx12UploadRing {
    resource: d3d12::ID3D12Resource,
    ptr: *mut u8,
    segments: Dx12UploadSegments,
}

impl Dx12UploadRing {
    pub fn new(
        device: &d3d12::ID3D12Device,
        segment_size: u64,
        frame_count: u32,
    ) -> SgfxResult<Self> {
        let (resource, ptr) = create_upload_buffer(device, segment_size * frame_count as u64)?;
        Ok(Dx12UploadRing {
            resource,
            ptr,
            segments: Dx12UploadSegments::new(segment_size),
        })
    }

    pub fn allocate(
        &mut self,
        device: &d3d12::ID3D12Device,
        size: u64,
        alignment: u64,
    ) -> SgfxResult<Dx12UploadAllocation> {
        if let Some(offset) = self.segments.allocate(size, alignment) {
            return Ok(Dx12UploadAllocation {
                resource: self.resource.clone(),
                offset,
                ptr: unsafe { self.ptr.add(offset as usize) },
                dedicated: false,
            });
        }

        log::debug!("Upload of {} bytes does not fit the frame's upload segment", size);
        let (resource, ptr) = create_upload_buffer(device, size)?;
        Ok(Dx12UploadAllocation {
            resource,
            offset: 0,
            ptr,
            dedicated: true,
        })
    }

    pub fn begin_frame(
        &mut self,
        frame_index: u32,
    ) {
        self.segments.begin_segment(frame_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_segments() {
        let mut segments = Dx12UploadSegments::new(1024);
        assert_eq!(segments.allocate(100, 4), Some(0));
        // Texture rows start at 512 byte placement alignment
        assert_eq!(segments.allocate(256, 512), Some(512));
        assert_eq!(segments.allocate(512, 4), None);

        segments.begin_segment(2);
        assert_eq!(segments.allocate(1024, 4), Some(2048));
        assert_eq!(segments.allocate(1, 1), None);
    }
}
