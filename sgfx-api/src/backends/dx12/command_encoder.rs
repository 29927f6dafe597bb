use super::device::{Dx12CommandSignatures, Dx12Released, SgfxDeviceDx12};
use super::internal::d3d12;
use super::internal::descriptor_heap::{Dx12DescriptorHeapSet, Dx12DescriptorId};
use super::internal::resource_state::{uav_barrier, Dx12BarrierBatch, SHADER_RESOURCE_STATES};
use super::internal::upload_ring::Dx12UploadRing;
use crate::binding::{
    SgfxBinding, SgfxBindingKind, SgfxBindingResource, SgfxIndexBufferBinding,
    SgfxVertexBufferBinding,
};
use crate::internal_shared::{SgfxCommandEncoder, SgfxResourceTables};
use crate::*;
use fnv::FnvHashMap;
use sgfx_base::DynamicArray;

/// Root parameter holding the descriptor table of the given kind. The root signature declares
/// one table per kind, in `SgfxBindingKind::ALL` order.
pub(super) fn root_parameter_index(kind: SgfxBindingKind) -> usize {
    match kind {
        SgfxBindingKind::ConstantBuffer => 0,
        SgfxBindingKind::ShaderResource => 1,
        SgfxBindingKind::Sampler => 2,
        SgfxBindingKind::UnorderedAccess => 3,
    }
}

fn required_state(kind: SgfxBindingKind) -> d3d12::D3D12_RESOURCE_STATES {
    match kind {
        SgfxBindingKind::ConstantBuffer => d3d12::D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        SgfxBindingKind::ShaderResource => SHADER_RESOURCE_STATES,
        SgfxBindingKind::UnorderedAccess => d3d12::D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
        SgfxBindingKind::Sampler => d3d12::D3D12_RESOURCE_STATE_COMMON,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) struct Dx12TableSlot {
    pub resource: SgfxBindingResource,
    // Non shader visible descriptor copied into the table when it is flushed
    pub descriptor: Dx12DescriptorId,
}

/// Device-wide binding state. Slots keep their contents across queues, like D3D11 context state,
/// and tables are copied into the shader visible heap when a draw or dispatch finds them dirty.
pub(super) struct Dx12BindingTables {
    tables: [Vec<Dx12TableSlot>; 4],
    null_descriptors: [Dx12DescriptorId; 4],
    dirty: [bool; 4],
    // Shader visible sampler tables keyed by the CPU descriptors they were copied from
    sampler_tables: FnvHashMap<Vec<Dx12DescriptorId>, Dx12DescriptorId>,
}

impl Dx12BindingTables {
    pub fn new(heaps: &Dx12DescriptorHeapSet) -> Self {
        let mut null_descriptors = [Dx12DescriptorId(0); 4];
        for kind in SgfxBindingKind::ALL {
            null_descriptors[root_parameter_index(kind)] = heaps.null_descriptor(kind);
        }

        let table = |kind: SgfxBindingKind| {
            vec![
                Dx12TableSlot {
                    resource: SgfxBindingResource::Unbound,
                    descriptor: null_descriptors[root_parameter_index(kind)],
                };
                kind.slot_count() as usize
            ]
        };

        Dx12BindingTables {
            tables: [
                table(SgfxBindingKind::ConstantBuffer),
                table(SgfxBindingKind::ShaderResource),
                table(SgfxBindingKind::Sampler),
                table(SgfxBindingKind::UnorderedAccess),
            ],
            null_descriptors,
            dirty: [true; 4],
            sampler_tables: Default::default(),
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = [true; 4];
    }

    pub fn slots(
        &self,
        kind: SgfxBindingKind,
    ) -> &[Dx12TableSlot] {
        &self.tables[root_parameter_index(kind)]
    }

    pub fn set(
        &mut self,
        kind: SgfxBindingKind,
        slot: u32,
        resource: SgfxBindingResource,
        descriptor: Option<Dx12DescriptorId>,
    ) {
        let index = root_parameter_index(kind);
        let value = Dx12TableSlot {
            resource,
            descriptor: descriptor.unwrap_or(self.null_descriptors[index]),
        };

        let current = &mut self.tables[index][slot as usize];
        if *current != value {
            *current = value;
            self.dirty[index] = true;
        }
    }

    /// Clears every slot of the given kind that refers to `resource`
    pub fn unbind(
        &mut self,
        kind: SgfxBindingKind,
        resource: SgfxBindingResource,
    ) {
        let index = root_parameter_index(kind);
        for slot in 0..self.tables[index].len() {
            if self.tables[index][slot].resource == resource {
                self.set(kind, slot as u32, SgfxBindingResource::Unbound, None);
            }
        }
    }

    /// Clears every slot that still refers to a view about to be freed
    pub fn unbind_descriptor(
        &mut self,
        kind: SgfxBindingKind,
        descriptor: Dx12DescriptorId,
    ) {
        let index = root_parameter_index(kind);
        for slot in 0..self.tables[index].len() {
            if self.tables[index][slot].descriptor == descriptor {
                self.set(kind, slot as u32, SgfxBindingResource::Unbound, None);
            }
        }
    }

    pub fn unbind_all(
        &mut self,
        kind: SgfxBindingKind,
    ) {
        for slot in 0..kind.slot_count() {
            self.set(kind, slot, SgfxBindingResource::Unbound, None);
        }
    }

    /// Drops cached sampler tables built from the given sampler descriptor. Returns their
    /// shader visible descriptors, which the GPU may still be reading.
    pub fn evict_sampler_tables(
        &mut self,
        sampler_descriptor: Dx12DescriptorId,
    ) -> Vec<Dx12DescriptorId> {
        let mut evicted = Vec::default();
        self.sampler_tables.retain(|key, table| {
            if key.contains(&sampler_descriptor) {
                evicted.push(*table);
                false
            } else {
                true
            }
        });

        evicted
    }
}

/// Shared view of the per-device objects a submission writes to
pub(super) struct Dx12EncoderContext<'a> {
    pub device: &'a d3d12::ID3D12Device,
    pub command_list: &'a d3d12::ID3D12GraphicsCommandList,
    pub resources: &'a SgfxResourceTables<SgfxDeviceDx12>,
    pub heaps: &'a mut Dx12DescriptorHeapSet,
    pub tables: &'a mut Dx12BindingTables,
    pub uploads: &'a mut Dx12UploadRing,
    pub released: &'a mut Vec<Dx12Released>,
    pub command_signatures: &'a Dx12CommandSignatures,
}

/// Records replayed queue commands into the device's command list. All stages share one set of
/// root descriptor tables, so bindings arrive already merged across stages.
pub(super) struct Dx12CommandEncoder<'a> {
    context: Dx12EncoderContext<'a>,
    compute: bool,
    barriers: Dx12BarrierBatch,
}

impl<'a> Dx12CommandEncoder<'a> {
    pub fn new(
        context: Dx12EncoderContext<'a>,
        compute: bool,
    ) -> Self {
        context.tables.mark_all_dirty();
        Dx12CommandEncoder {
            context,
            compute,
            barriers: Dx12BarrierBatch::default(),
        }
    }

    fn transition_resource(
        &mut self,
        resource: SgfxBindingResource,
        required: d3d12::D3D12_RESOURCE_STATES,
    ) -> SgfxResult<()> {
        match resource {
            SgfxBindingResource::Buffer(buffer) => {
                let native = &self.context.resources.buffer(buffer)?.native;
                native
                    .state
                    .transition(&native.resource, required, &mut self.barriers);
                if let Some((counter, counter_state)) = &native.counter {
                    if required == d3d12::D3D12_RESOURCE_STATE_UNORDERED_ACCESS {
                        counter_state.transition(counter, required, &mut self.barriers);
                    }
                }
            }
            SgfxBindingResource::Texture(texture) => {
                let native = &self.context.resources.texture(texture)?.native;
                native
                    .state
                    .transition(&native.resource, required, &mut self.barriers);
            }
            SgfxBindingResource::Sampler(_) | SgfxBindingResource::Unbound => {}
        }

        Ok(())
    }

    fn binding_descriptor(
        &self,
        kind: SgfxBindingKind,
        resource: SgfxBindingResource,
    ) -> SgfxResult<Option<Dx12DescriptorId>> {
        let resources = self.context.resources;
        let descriptor = match (kind, resource) {
            (_, SgfxBindingResource::Unbound) => return Ok(None),
            (SgfxBindingKind::ConstantBuffer, SgfxBindingResource::Buffer(buffer)) => {
                resources.buffer(buffer)?.native.cbv
            }
            (SgfxBindingKind::ShaderResource, SgfxBindingResource::Buffer(buffer)) => {
                resources.buffer(buffer)?.native.srv
            }
            (SgfxBindingKind::ShaderResource, SgfxBindingResource::Texture(texture)) => {
                resources.texture(texture)?.native.srv
            }
            (SgfxBindingKind::UnorderedAccess, SgfxBindingResource::Buffer(buffer)) => {
                resources.buffer(buffer)?.native.uav
            }
            (SgfxBindingKind::UnorderedAccess, SgfxBindingResource::Texture(texture)) => {
                resources.texture(texture)?.native.uav
            }
            (SgfxBindingKind::Sampler, SgfxBindingResource::Sampler(sampler)) => {
                Some(resources.sampler(sampler)?.native.descriptor)
            }
            _ => None,
        };

        descriptor
            .map(Some)
            .ok_or_else(|| format!("resource has no {} view", kind.name()).into())
    }

    fn write_counter(
        &mut self,
        buffer: SgfxBufferHandle,
        count: u32,
    ) -> SgfxResult<()> {
        let native = &self.context.resources.buffer(buffer)?.native;
        let (counter, counter_state) = native
            .counter
            .as_ref()
            .ok_or("initial counts require a buffer created with APPEND_COUNTER")?;

        let upload = self
            .context
            .uploads
            .allocate(self.context.device, 4, 4)?;
        unsafe {
            upload.write(0, &count.to_ne_bytes());
        }

        counter_state.transition(
            counter,
            d3d12::D3D12_RESOURCE_STATE_COPY_DEST,
            &mut self.barriers,
        );
        self.barriers.record(self.context.command_list);
        unsafe {
            self.context
                .command_list
                .CopyBufferRegion(counter, 0, &upload.resource, upload.offset, 4);
        }

        if upload.dedicated {
            self.context
                .released
                .push(Dx12Released::Resource(upload.resource));
        }

        Ok(())
    }

    /// Copies one table into the shader visible heap. Sampler tables are cached since the
    /// sampler heap is small.
    fn table_gpu_handle(
        &mut self,
        kind: SgfxBindingKind,
    ) -> SgfxResult<d3d12::D3D12_GPU_DESCRIPTOR_HANDLE> {
        let heaps = &mut *self.context.heaps;
        let device = self.context.device;
        let slots = self.context.tables.slots(kind);

        if kind == SgfxBindingKind::Sampler {
            let key: Vec<_> = slots.iter().map(|slot| slot.descriptor).collect();
            if let Some(table) = self.context.tables.sampler_tables.get(&key) {
                return heaps.gpu_sampler_heap.id_to_gpu_handle(*table);
            }

            let table = heaps
                .gpu_sampler_heap
                .allocate(device, key.len() as u32)
                .map_err(|_| "too many distinct sampler combinations are in use")?;
            for (i, descriptor) in key.iter().enumerate() {
                unsafe {
                    device.CopyDescriptorsSimple(
                        1,
                        heaps
                            .gpu_sampler_heap
                            .id_to_cpu_handle(table.add_offset(i as u32)),
                        heaps.sampler_heap.id_to_cpu_handle(*descriptor),
                        d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
                    );
                }
            }

            let handle = heaps.gpu_sampler_heap.id_to_gpu_handle(table)?;
            self.context.tables.sampler_tables.insert(key, table);
            return Ok(handle);
        }

        let table = heaps.gpu_cbv_srv_uav_ring.allocate(slots.len() as u32)?;
        let ring_heap = heaps.gpu_cbv_srv_uav_ring.heap();
        for (i, slot) in slots.iter().enumerate() {
            unsafe {
                device.CopyDescriptorsSimple(
                    1,
                    ring_heap.id_to_cpu_handle(table.add_offset(i as u32)),
                    heaps.cbv_srv_uav_heap.id_to_cpu_handle(slot.descriptor),
                    d3d12::D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                );
            }
        }

        ring_heap.id_to_gpu_handle(table)
    }

    /// Transitions everything the dirty tables refer to, then binds fresh copies of them
    fn flush_tables(&mut self) -> SgfxResult<()> {
        for kind in SgfxBindingKind::ALL {
            let index = root_parameter_index(kind);
            if !self.context.tables.dirty[index] {
                continue;
            }

            let required = required_state(kind);
            let mut resources = DynamicArray::<SgfxBindingResource, 32>::new();
            for slot in self.context.tables.slots(kind) {
                if slot.resource != SgfxBindingResource::Unbound {
                    resources.push(slot.resource);
                }
            }
            for resource in resources.iter() {
                self.transition_resource(*resource, required)?;
            }

            let handle = self.table_gpu_handle(kind)?;
            unsafe {
                if self.compute {
                    self.context
                        .command_list
                        .SetComputeRootDescriptorTable(index as u32, handle);
                } else {
                    self.context
                        .command_list
                        .SetGraphicsRootDescriptorTable(index as u32, handle);
                }
            }
            self.context.tables.dirty[index] = false;
        }

        self.barriers.record(self.context.command_list);
        Ok(())
    }

    fn indirect_arguments(
        &mut self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<d3d12::ID3D12Resource> {
        let native = &self.context.resources.buffer(buffer)?.native;
        native.state.transition(
            &native.resource,
            d3d12::D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
            &mut self.barriers,
        );
        Ok(native.resource.clone())
    }
}

impl<'a> SgfxCommandEncoder for Dx12CommandEncoder<'a> {
    fn bind_run(
        &mut self,
        _stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        for binding in run {
            let descriptor = self.binding_descriptor(kind, binding.resource)?;

            if kind == SgfxBindingKind::UnorderedAccess {
                // A resource cannot be read and written at once
                self.context
                    .tables
                    .unbind(SgfxBindingKind::ShaderResource, binding.resource);

                if let (SgfxBindingResource::Buffer(buffer), Some(count)) =
                    (binding.resource, binding.uav_initial_count)
                {
                    self.write_counter(buffer, count)?;
                }
            }

            self.context
                .tables
                .set(kind, binding.slot, binding.resource, descriptor);
        }

        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        run: &[SgfxVertexBufferBinding],
    ) -> SgfxResult<()> {
        let mut views = DynamicArray::<d3d12::D3D12_VERTEX_BUFFER_VIEW, 16>::new();
        for binding in run {
            views.push(match binding.buffer {
                Some(buffer) => {
                    let entry = self.context.resources.buffer(buffer)?;
                    entry.native.state.transition(
                        &entry.native.resource,
                        d3d12::D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
                        &mut self.barriers,
                    );
                    d3d12::D3D12_VERTEX_BUFFER_VIEW {
                        BufferLocation: entry.native.gpu_address + binding.byte_offset as u64,
                        SizeInBytes: (entry.def.size - binding.byte_offset as u64) as u32,
                        StrideInBytes: binding.stride,
                    }
                }
                None => d3d12::D3D12_VERTEX_BUFFER_VIEW::default(),
            });
        }

        unsafe {
            self.context
                .command_list
                .IASetVertexBuffers(run[0].slot, Some(views.as_slice()));
        }

        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        binding: &SgfxIndexBufferBinding,
    ) -> SgfxResult<()> {
        let entry = self.context.resources.buffer(binding.buffer)?;
        entry.native.state.transition(
            &entry.native.resource,
            d3d12::D3D12_RESOURCE_STATE_INDEX_BUFFER,
            &mut self.barriers,
        );

        let view = d3d12::D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: entry.native.gpu_address + binding.byte_offset as u64,
            SizeInBytes: (entry.def.size - binding.byte_offset as u64) as u32,
            Format: binding.format.dxgi_format(),
        };
        unsafe {
            self.context
                .command_list
                .IASetIndexBuffer(Some(&view as *const _));
        }

        Ok(())
    }

    fn set_stencil_reference(
        &mut self,
        reference: u32,
    ) -> SgfxResult<()> {
        unsafe {
            self.context.command_list.OMSetStencilRef(reference);
        }

        Ok(())
    }

    fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) -> SgfxResult<()> {
        unsafe {
            self.context
                .command_list
                .OMSetBlendFactor(Some(factor.as_ptr()));
        }

        Ok(())
    }

    fn draw(
        &mut self,
        params: &SgfxDrawParams,
    ) -> SgfxResult<()> {
        let signatures = self.context.command_signatures;
        let indirect = match *params {
            SgfxDrawParams::DrawIndirect {
                buffer,
                byte_offset,
            } => Some((
                self.indirect_arguments(buffer)?,
                byte_offset,
                &signatures.draw,
            )),
            SgfxDrawParams::DrawIndexedIndirect {
                buffer,
                byte_offset,
            } => Some((
                self.indirect_arguments(buffer)?,
                byte_offset,
                &signatures.draw_indexed,
            )),
            _ => None,
        };

        self.flush_tables()?;

        let command_list = self.context.command_list;
        unsafe {
            if let Some((buffer, byte_offset, signature)) = indirect {
                command_list.ExecuteIndirect(
                    signature,
                    1,
                    &buffer,
                    byte_offset as u64,
                    None::<&d3d12::ID3D12Resource>,
                    0,
                );
                return Ok(());
            }

            match *params {
                SgfxDrawParams::Draw {
                    vertex_count,
                    first_vertex,
                } => command_list.DrawInstanced(vertex_count, 1, first_vertex, 0),
                SgfxDrawParams::DrawInstanced {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => command_list.DrawInstanced(
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                ),
                SgfxDrawParams::DrawIndexed {
                    index_count,
                    first_index,
                    base_vertex,
                } => command_list.DrawIndexedInstanced(index_count, 1, first_index, base_vertex, 0),
                SgfxDrawParams::DrawIndexedInstanced {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                } => command_list.DrawIndexedInstanced(
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                ),
                SgfxDrawParams::DrawIndirect { .. }
                | SgfxDrawParams::DrawIndexedIndirect { .. } => {}
            }
        }

        Ok(())
    }

    fn dispatch(
        &mut self,
        params: &SgfxDispatchParams,
    ) -> SgfxResult<()> {
        let indirect = match *params {
            SgfxDispatchParams::DispatchIndirect {
                buffer,
                byte_offset,
            } => Some((self.indirect_arguments(buffer)?, byte_offset)),
            SgfxDispatchParams::Dispatch { .. } => None,
        };

        self.flush_tables()?;

        let command_list = self.context.command_list;
        unsafe {
            if let Some((buffer, byte_offset)) = indirect {
                command_list.ExecuteIndirect(
                    &self.context.command_signatures.dispatch,
                    1,
                    &buffer,
                    byte_offset as u64,
                    None::<&d3d12::ID3D12Resource>,
                    0,
                );
            } else if let SgfxDispatchParams::Dispatch {
                group_count_x,
                group_count_y,
                group_count_z,
            } = *params
            {
                command_list.Dispatch(group_count_x, group_count_y, group_count_z);
            }

            // Dispatches observe each other's writes, as they do on D3D11
            command_list.ResourceBarrier(&[uav_barrier(None)]);
        }

        Ok(())
    }
}
