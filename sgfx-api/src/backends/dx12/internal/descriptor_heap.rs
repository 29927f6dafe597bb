use super::d3d12;
use crate::binding::SgfxBindingKind;
use crate::SgfxResult;
use windows::Win32::Graphics::Dxgi::Common as dxgi_common;

// D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING
pub const DEFAULT_SHADER_4_COMPONENT_MAPPING: u32 = 0x1688;

// https://graphics.stanford.edu/~seander/bithacks.html#RoundUpPowerOf2
fn next_power_of_two(mut v: u32) -> u32 {
    v = v.saturating_sub(1);
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v + 1
}

struct HeapWithHandles {
    heap: d3d12::ID3D12DescriptorHeap,
    cpu_first_handle: d3d12::D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_first_handle: Option<d3d12::D3D12_GPU_DESCRIPTOR_HANDLE>,
}

fn create_heap(
    device: &d3d12::ID3D12Device,
    heap_type: d3d12::D3D12_DESCRIPTOR_HEAP_TYPE,
    descriptor_count: u32,
    shader_visible: bool,
) -> SgfxResult<HeapWithHandles> {
    let mut heap_desc = d3d12::D3D12_DESCRIPTOR_HEAP_DESC {
        Type: heap_type,
        NumDescriptors: descriptor_count,
        Flags: d3d12::D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
        NodeMask: 0,
    };

    if shader_visible {
        heap_desc.Flags |= d3d12::D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE;
    }

    log::trace!(
        "Creating descriptor heap of type {:?} with {} descriptors",
        heap_type,
        descriptor_count
    );

    unsafe {
        let heap: d3d12::ID3D12DescriptorHeap = device.CreateDescriptorHeap(&heap_desc)?;
        let cpu_first_handle = heap.GetCPUDescriptorHandleForHeapStart();
        let gpu_first_handle = if shader_visible {
            Some(heap.GetGPUDescriptorHandleForHeapStart())
        } else {
            None
        };

        Ok(HeapWithHandles {
            heap,
            cpu_first_handle,
            gpu_first_handle,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dx12DescriptorId(pub u32);

impl Dx12DescriptorId {
    pub fn add_offset(
        self,
        offset: u32,
    ) -> Dx12DescriptorId {
        Dx12DescriptorId(self.0 + offset)
    }
}

/// Tracks which descriptors of a heap are in use. Kept separate from the heap so the allocation
/// logic can be tested without a device.
#[derive(Default)]
pub struct Dx12DescriptorAllocator {
    allocated: Vec<bool>,
    allocated_count: u32,
}

impl Dx12DescriptorAllocator {
    pub fn new(descriptor_count: u32) -> Self {
        Dx12DescriptorAllocator {
            allocated: vec![false; descriptor_count as usize],
            allocated_count: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.allocated.len() as u32
    }

    pub fn allocated_count(&self) -> u32 {
        self.allocated_count
    }

    /// First fit search for `count` contiguous free descriptors
    pub fn find_free_range(
        &self,
        count: u32,
    ) -> Option<Dx12DescriptorId> {
        let mut free_count = 0;
        let mut free_range_begin = 0;
        for i in 0..self.capacity() {
            if !self.allocated[i as usize] {
                free_count += 1;
            } else {
                free_count = 0;
                free_range_begin = i + 1;
            }

            if free_count >= count {
                return Some(Dx12DescriptorId(free_range_begin));
            }
        }

        None
    }

    pub fn grow(
        &mut self,
        new_capacity: u32,
    ) {
        self.allocated.resize(new_capacity as usize, false);
    }

    pub fn mark_allocated(
        &mut self,
        first: Dx12DescriptorId,
        count: u32,
    ) {
        for i in first.0..(first.0 + count) {
            self.allocated[i as usize] = true;
        }
        self.allocated_count += count;
    }

    pub fn free(
        &mut self,
        first: Dx12DescriptorId,
        count: u32,
    ) {
        for i in first.0..(first.0 + count) {
            debug_assert!(self.allocated[i as usize]);
            self.allocated[i as usize] = false;
        }
        self.allocated_count -= count;
    }
}

/// A descriptor heap with per-descriptor allocation. CPU-only heaps grow when full; shader
/// visible heaps are bound to the command list and have a fixed size.
pub struct Dx12DescriptorHeap {
    heap: d3d12::ID3D12DescriptorHeap,
    heap_type: d3d12::D3D12_DESCRIPTOR_HEAP_TYPE,
    stride: u32,
    cpu_first_handle: d3d12::D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_first_handle: Option<d3d12::D3D12_GPU_DESCRIPTOR_HANDLE>,
    allocator: Dx12DescriptorAllocator,
}

impl Dx12DescriptorHeap {
    pub fn new(
        device: &d3d12::ID3D12Device,
        heap_type: d3d12::D3D12_DESCRIPTOR_HEAP_TYPE,
        descriptor_count: u32,
        shader_visible: bool,
    ) -> SgfxResult<Self> {
        let heap = create_heap(device, heap_type, descriptor_count, shader_visible)?;
        let stride = unsafe { device.GetDescriptorHandleIncrementSize(heap_type) };

        Ok(Dx12DescriptorHeap {
            heap: heap.heap,
            heap_type,
            stride,
            cpu_first_handle: heap.cpu_first_handle,
            gpu_first_handle: heap.gpu_first_handle,
            allocator: Dx12DescriptorAllocator::new(descriptor_count),
        })
    }

    pub fn dx12_heap(&self) -> &d3d12::ID3D12DescriptorHeap {
        &self.heap
    }

    pub fn capacity(&self) -> u32 {
        self.allocator.capacity()
    }

    fn grow(
        &mut self,
        device: &d3d12::ID3D12Device,
        minimum_required_descriptors: u32,
    ) -> SgfxResult<()> {
        if self.gpu_first_handle.is_some() {
            return Err(format!(
                "shader visible descriptor heap of type {:?} is full ({} descriptors)",
                self.heap_type,
                self.capacity()
            )
            .into());
        }

        let old_size = self.capacity();
        let new_size = next_power_of_two(old_size + minimum_required_descriptors);
        log::debug!(
            "Growing descriptor heap of type {:?} {} -> {}",
            self.heap_type,
            old_size,
            new_size
        );

        let new_heap = create_heap(device, self.heap_type, new_size, false)?;
        unsafe {
            device.CopyDescriptorsSimple(
                old_size,
                new_heap.cpu_first_handle,
                self.cpu_first_handle,
                self.heap_type,
            );
        }

        // Drops the old smaller heap. Only CPU heaps grow and those are read when recording.
        self.heap = new_heap.heap;
        self.cpu_first_handle = new_heap.cpu_first_handle;
        self.allocator.grow(new_size);
        Ok(())
    }

    pub fn allocate(
        &mut self,
        device: &d3d12::ID3D12Device,
        count: u32,
    ) -> SgfxResult<Dx12DescriptorId> {
        let first = match self.allocator.find_free_range(count) {
            Some(first) => first,
            None => {
                self.grow(device, count)?;
                self.allocator
                    .find_free_range(count)
                    .ok_or("descriptor heap has no free range after growing")?
            }
        };

        self.allocator.mark_allocated(first, count);
        Ok(first)
    }

    pub fn free(
        &mut self,
        first: Dx12DescriptorId,
        count: u32,
    ) {
        self.allocator.free(first, count)
    }

    pub fn id_to_cpu_handle(
        &self,
        id: Dx12DescriptorId,
    ) -> d3d12::D3D12_CPU_DESCRIPTOR_HANDLE {
        d3d12::D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_first_handle.ptr + (id.0 * self.stride) as usize,
        }
    }

    pub fn id_to_gpu_handle(
        &self,
        id: Dx12DescriptorId,
    ) -> SgfxResult<d3d12::D3D12_GPU_DESCRIPTOR_HANDLE> {
        let first = self
            .gpu_first_handle
            .ok_or("descriptor heap is not shader visible")?;
        Ok(d3d12::D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: first.ptr + (id.0 * self.stride) as u64,
        })
    }
}

/// Splits a descriptor count into one linear segment per frame in flight
#[derive(Debug)]
pub struct Dx12RingSegments {
    segment_size: u32,
    segment: u32,
    cursor: u32,
}

impl Dx12RingSegments {
    pub fn new(
        descriptor_count: u32,
        segment_count: u32,
    ) -> Self {
        Dx12RingSegments {
            segment_size: descriptor_count / segment_count,
            segment: 0,
            cursor: 0,
        }
    }

    pub fn allocate(
        &mut self,
        count: u32,
    ) -> Option<Dx12DescriptorId> {
        if self.cursor + count > self.segment_size {
            return None;
        }

        let id = Dx12DescriptorId(self.segment * self.segment_size + self.cursor);
        self.cursor += count;
        Some(id)
    }

    /// The caller guarantees the GPU is done with the segment being entered
    pub fn begin_segment(
        &mut self,
        segment: u32,
    ) {
        self.segment = segment;
        self.cursor = 0;
    }
}

/// Shader visible CBV/SRV/UAV heap written linearly every frame. Tables are copied into it
/// whenever a draw or dispatch changes them.
pub struct Dx12DescriptorRing {
    heap: Dx12DescriptorHeap,
    segments: Dx12RingSegments,
}

impl Dx12DescriptorRing {
    pub fn new(
        device: &d3d12::ID3D12Device,
        descriptor_count: u32,
        frame_count: u32,
    ) -> SgfxResult<Self> {
        Ok(Dx12DescriptorRing {
            heap: Dx12DescriptorHeap::new(
                device,
                d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                descriptor_count,
                true,
            )?,
            segments: Dx12RingSegments::new(descriptor_count, frame_count),
        })
    }

    pub fn heap(&self) -> &Dx12DescriptorHeap {
        &self.heap
    }

    pub fn allocate(
        &mut self,
        count: u32,
    ) -> SgfxResult<Dx12DescriptorId> {
        self.segments.allocate(count).ok_or_else(|| {
            "shader visible descriptors for this frame are exhausted, flush more often".into()
        })
    }

    pub fn begin_frame(
        &mut self,
        frame_index: u32,
    ) {
        self.segments.begin_segment(frame_index);
    }
}

/// Every descriptor heap a device uses. The non shader visible heaps hold the views created with
/// resources; tables are copied from them into the two shader visible heaps.
pub struct Dx12DescriptorHeapSet {
    pub cbv_srv_uav_heap: Dx12DescriptorHeap,
    pub sampler_heap: Dx12DescriptorHeap,
    pub rtv_heap: Dx12DescriptorHeap,
    pub dsv_heap: Dx12DescriptorHeap,
    pub gpu_cbv_srv_uav_ring: Dx12DescriptorRing,
    pub gpu_sampler_heap: Dx12DescriptorHeap,
    // Fills table slots nothing is bound to
    null_cbv: Dx12DescriptorId,
    null_srv: Dx12DescriptorId,
    null_uav: Dx12DescriptorId,
    null_sampler: Dx12DescriptorId,
}

impl Dx12DescriptorHeapSet {
    pub fn new(
        device: &d3d12::ID3D12Device,
        frame_count: u32,
    ) -> SgfxResult<Self> {
        let mut cbv_srv_uav_heap = Dx12DescriptorHeap::new(
            device,
            d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            4096,
            false,
        )?;
        let mut sampler_heap =
            Dx12DescriptorHeap::new(device, d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, 256, false)?;
        let rtv_heap =
            Dx12DescriptorHeap::new(device, d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_RTV, 256, false)?;
        let dsv_heap =
            Dx12DescriptorHeap::new(device, d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 64, false)?;
        let gpu_cbv_srv_uav_ring =
            Dx12DescriptorRing::new(device, 65536 * frame_count, frame_count)?;
        // Largest shader visible sampler heap D3D12 allows
        let gpu_sampler_heap =
            Dx12DescriptorHeap::new(device, d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, 2048, true)?;

        let null_cbv = cbv_srv_uav_heap.allocate(device, 1)?;
        let null_srv = cbv_srv_uav_heap.allocate(device, 1)?;
        let null_uav = cbv_srv_uav_heap.allocate(device, 1)?;
        let null_sampler = sampler_heap.allocate(device, 1)?;

        unsafe {
            let cbv_desc = d3d12::D3D12_CONSTANT_BUFFER_VIEW_DESC {
                BufferLocation: 0,
                SizeInBytes: 0,
            };
            device.CreateConstantBufferView(
                Some(&cbv_desc as *const _),
                cbv_srv_uav_heap.id_to_cpu_handle(null_cbv),
            );

            let mut srv_desc = d3d12::D3D12_SHADER_RESOURCE_VIEW_DESC {
                Format: dxgi_common::DXGI_FORMAT_R8G8B8A8_UNORM,
                ViewDimension: d3d12::D3D12_SRV_DIMENSION_TEXTURE2D,
                Shader4ComponentMapping: DEFAULT_SHADER_4_COMPONENT_MAPPING,
                ..Default::default()
            };
            srv_desc.Anonymous.Texture2D = d3d12::D3D12_TEX2D_SRV {
                MostDetailedMip: 0,
                MipLevels: 1,
                PlaneSlice: 0,
                ResourceMinLODClamp: 0.0,
            };
            device.CreateShaderResourceView(
                None::<&d3d12::ID3D12Resource>,
                Some(&srv_desc as *const _),
                cbv_srv_uav_heap.id_to_cpu_handle(null_srv),
            );

            let mut uav_desc = d3d12::D3D12_UNORDERED_ACCESS_VIEW_DESC {
                Format: dxgi_common::DXGI_FORMAT_R8G8B8A8_UNORM,
                ViewDimension: d3d12::D3D12_UAV_DIMENSION_TEXTURE2D,
                ..Default::default()
            };
            uav_desc.Anonymous.Texture2D = d3d12::D3D12_TEX2D_UAV {
                MipSlice: 0,
                PlaneSlice: 0,
            };
            device.CreateUnorderedAccessView(
                None::<&d3d12::ID3D12Resource>,
                None::<&d3d12::ID3D12Resource>,
                Some(&uav_desc as *const _),
                cbv_srv_uav_heap.id_to_cpu_handle(null_uav),
            );

            let sampler_desc = d3d12::D3D12_SAMPLER_DESC {
                Filter: d3d12::D3D12_FILTER_MIN_MAG_MIP_POINT,
                AddressU: d3d12::D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
                AddressV: d3d12::D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
                AddressW: d3d12::D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
                MaxAnisotropy: 1,
                ComparisonFunc: d3d12::D3D12_COMPARISON_FUNC_NEVER,
                MaxLOD: f32::MAX,
                ..Default::default()
            };
            device.CreateSampler(&sampler_desc, sampler_heap.id_to_cpu_handle(null_sampler));
        }

        Ok(Dx12DescriptorHeapSet {
            cbv_srv_uav_heap,
            sampler_heap,
            rtv_heap,
            dsv_heap,
            gpu_cbv_srv_uav_ring,
            gpu_sampler_heap,
            null_cbv,
            null_srv,
            null_uav,
            null_sampler,
        })
    }

    pub fn null_descriptor(
        &self,
        kind: SgfxBindingKind,
    ) -> Dx12DescriptorId {
        match kind {
            SgfxBindingKind::ConstantBuffer => self.null_cbv,
            SgfxBindingKind::ShaderResource => self.null_srv,
            SgfxBindingKind::Sampler => self.null_sampler,
            SgfxBindingKind::UnorderedAccess => self.null_uav,
        }
    }

    /// Must be bound again whenever the command list is reset
    pub fn shader_visible_heaps(&self) -> [Option<d3d12::ID3D12DescriptorHeap>; 2] {
        [
            Some(self.gpu_cbv_srv_uav_ring.heap().dx12_heap().clone()),
            Some(self.gpu_sampler_heap.dx12_heap().clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(5), 8);
        assert_eq!(next_power_of_two(512), 512);
        assert_eq!(next_power_of_two(513), 1024);
    }

    #[test]
    fn test_allocator_first_fit() {
        let mut allocator = Dx12DescriptorAllocator::new(8);
        let a = allocator.find_free_range(3).unwrap();
        allocator.mark_allocated(a, 3);
        let b = allocator.find_free_range(2).unwrap();
        allocator.mark_allocated(b, 2);
        assert_eq!(a, Dx12DescriptorId(0));
        assert_eq!(b, Dx12DescriptorId(3));

        allocator.free(a, 3);
        assert_eq!(allocator.allocated_count(), 2);
        // The hole left by `a` is reused
        assert_eq!(allocator.find_free_range(3), Some(Dx12DescriptorId(0)));
        assert_eq!(allocator.find_free_range(4), None);

        allocator.grow(16);
        assert_eq!(allocator.find_free_range(4), Some(Dx12DescriptorId(5)));
    }

    #[test]
    fn test_ring_segments() {
        let mut ring = Dx12RingSegments::new(30, 3);
        assert_eq!(ring.allocate(4), Some(Dx12DescriptorId(0)));
        assert_eq!(ring.allocate(4), Some(Dx12DescriptorId(4)));
        assert_eq!(ring.allocate(4), None);

        ring.begin_segment(2);
        assert_eq!(ring.allocate(10), Some(Dx12DescriptorId(20)));
        assert_eq!(ring.allocate(1), None);
    }
}
