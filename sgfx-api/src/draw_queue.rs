use crate::binding::{
    check_slot, check_vertex_buffer_slot, SgfxBinding, SgfxBindingKind, SgfxBindingResource,
    SgfxIndexBufferBinding, SgfxVertexBufferBinding,
};
use crate::{
    SgfxBufferHandle, SgfxIndexFormat, SgfxPipelineStateHandle, SgfxResourceView, SgfxResult,
    SgfxSamplerHandle, SgfxShaderStage,
};
use sgfx_base::DynamicArray;

/// Parameters of one recorded draw
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SgfxDrawParams {
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    /// Arguments read from the buffer: vertex count, instance count, first vertex, first instance
    DrawIndirect {
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    },
    /// Arguments read from the buffer: index count, instance count, first index, base vertex,
    /// first instance
    DrawIndexedIndirect {
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    },
}

impl SgfxDrawParams {
    pub fn is_indexed(&self) -> bool {
        matches!(
            self,
            SgfxDrawParams::DrawIndexed { .. }
                | SgfxDrawParams::DrawIndexedInstanced { .. }
                | SgfxDrawParams::DrawIndexedIndirect { .. }
        )
    }

    pub fn indirect_buffer(&self) -> Option<SgfxBufferHandle> {
        match *self {
            SgfxDrawParams::DrawIndirect { buffer, .. }
            | SgfxDrawParams::DrawIndexedIndirect { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// True if the draw produces no primitives. Backends skip these without issuing the draw, but
    /// the command's bindings are still applied.
    pub fn is_empty(&self) -> bool {
        match *self {
            SgfxDrawParams::Draw { vertex_count, .. } => vertex_count == 0,
            SgfxDrawParams::DrawIndexed { index_count, .. } => index_count == 0,
            SgfxDrawParams::DrawInstanced {
                vertex_count,
                instance_count,
                ..
            } => vertex_count == 0 || instance_count == 0,
            SgfxDrawParams::DrawIndexedInstanced {
                index_count,
                instance_count,
                ..
            } => index_count == 0 || instance_count == 0,
            SgfxDrawParams::DrawIndirect { .. } | SgfxDrawParams::DrawIndexedIndirect { .. } => {
                false
            }
        }
    }
}

/// A recorded draw and the state changes that precede it. Bindings and vertex buffers are ranges
/// into the queue's shared storage, see `SgfxDrawQueue::bindings_for`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SgfxDrawCommand {
    pub params: SgfxDrawParams,
    pub binding_start: u32,
    pub binding_count: u32,
    pub vertex_buffer_start: u32,
    pub vertex_buffer_count: u32,
    pub index_buffer: Option<SgfxIndexBufferBinding>,
    pub stencil_reference: Option<u32>,
    pub blend_factor: Option<[f32; 4]>,
}

/// Records draws for a single pipeline state. Nothing touches the GPU until the queue is submitted
/// with `SgfxDevice::submit_draw_queue`.
///
/// State set between two draws is attached to the second draw as a delta. On submit the pipeline is
/// bound once and each draw's delta is applied before it is issued, so state persists from one draw
/// to the next within the queue. Slots a queue never sets keep whatever the device had bound.
///
/// Submitting does not consume the queue. A queue describing static geometry can be recorded once
/// and submitted every frame. Call `clear()` to re-record, which keeps the storage.
pub struct SgfxDrawQueue {
    pipeline: SgfxPipelineStateHandle,

    commands: DynamicArray<SgfxDrawCommand, 16>,
    bindings: DynamicArray<SgfxBinding, 64>,
    vertex_buffers: DynamicArray<SgfxVertexBufferBinding, 16>,

    // Set since the last draw
    pending_bindings: DynamicArray<SgfxBinding, 32>,
    pending_vertex_buffers: DynamicArray<SgfxVertexBufferBinding, 16>,
    pending_index_buffer: Option<SgfxIndexBufferBinding>,
    pending_stencil_reference: Option<u32>,
    pending_blend_factor: Option<[f32; 4]>,

    has_index_buffer: bool,
}

impl SgfxDrawQueue {
    pub fn new(pipeline: SgfxPipelineStateHandle) -> Self {
        SgfxDrawQueue {
            pipeline,
            commands: Default::default(),
            bindings: Default::default(),
            vertex_buffers: Default::default(),
            pending_bindings: Default::default(),
            pending_vertex_buffers: Default::default(),
            pending_index_buffer: None,
            pending_stencil_reference: None,
            pending_blend_factor: None,
            has_index_buffer: false,
        }
    }

    /// Preallocates room for `draw_capacity` draws
    pub fn with_capacity(
        pipeline: SgfxPipelineStateHandle,
        draw_capacity: usize,
    ) -> Self {
        let mut queue = Self::new(pipeline);
        queue.commands.reserve(draw_capacity);
        queue
    }

    pub fn pipeline(&self) -> SgfxPipelineStateHandle {
        self.pipeline
    }

    fn set_binding(
        &mut self,
        binding: SgfxBinding,
    ) -> SgfxResult<()> {
        check_slot(binding.kind, binding.slot)?;

        if binding.stage == SgfxShaderStage::Compute {
            return Err("compute stage bindings must be recorded in a compute queue".into());
        }

        if binding.kind == SgfxBindingKind::UnorderedAccess
            && binding.stage != SgfxShaderStage::Pixel
        {
            return Err(format!(
                "unordered access views cannot be bound to the {} stage of a draw",
                binding.stage.name()
            )
            .into());
        }

        if let Some(existing) = self
            .pending_bindings
            .iter_mut()
            .find(|existing| existing.same_target(&binding))
        {
            *existing = binding;
        } else {
            self.pending_bindings.push(binding);
        }

        Ok(())
    }

    pub fn set_constant_buffer(
        &mut self,
        stage: SgfxShaderStage,
        slot: u32,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<()> {
        self.set_binding(SgfxBinding {
            stage,
            kind: SgfxBindingKind::ConstantBuffer,
            slot,
            resource: SgfxBindingResource::Buffer(buffer),
            uav_initial_count: None,
        })
    }

    pub fn set_shader_resource<V: Into<SgfxResourceView>>(
        &mut self,
        stage: SgfxShaderStage,
        slot: u32,
        view: V,
    ) -> SgfxResult<()> {
        let view: SgfxResourceView = view.into();
        self.set_binding(SgfxBinding {
            stage,
            kind: SgfxBindingKind::ShaderResource,
            slot,
            resource: view.into(),
            uav_initial_count: None,
        })
    }

    pub fn set_sampler(
        &mut self,
        stage: SgfxShaderStage,
        slot: u32,
        sampler: SgfxSamplerHandle,
    ) -> SgfxResult<()> {
        self.set_binding(SgfxBinding {
            stage,
            kind: SgfxBindingKind::Sampler,
            slot,
            resource: SgfxBindingResource::Sampler(sampler),
            uav_initial_count: None,
        })
    }

    /// Binds a UAV to the pixel stage. `initial_count` resets the append counter of the buffer.
    pub fn set_unordered_access<V: Into<SgfxResourceView>>(
        &mut self,
        slot: u32,
        view: V,
        initial_count: Option<u32>,
    ) -> SgfxResult<()> {
        let view: SgfxResourceView = view.into();
        self.set_binding(SgfxBinding {
            stage: SgfxShaderStage::Pixel,
            kind: SgfxBindingKind::UnorderedAccess,
            slot,
            resource: view.into(),
            uav_initial_count: initial_count,
        })
    }

    /// Clears a slot, for example to release a texture that a later pass renders into
    pub fn unbind(
        &mut self,
        stage: SgfxShaderStage,
        kind: SgfxBindingKind,
        slot: u32,
    ) -> SgfxResult<()> {
        self.set_binding(SgfxBinding {
            stage,
            kind,
            slot,
            resource: SgfxBindingResource::Unbound,
            uav_initial_count: None,
        })
    }

    pub fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: Option<SgfxBufferHandle>,
        byte_offset: u32,
        stride: u32,
    ) -> SgfxResult<()> {
        check_vertex_buffer_slot(slot)?;

        let binding = SgfxVertexBufferBinding {
            slot,
            buffer,
            byte_offset,
            stride,
        };

        if let Some(existing) = self
            .pending_vertex_buffers
            .iter_mut()
            .find(|existing| existing.slot == slot)
        {
            *existing = binding;
        } else {
            self.pending_vertex_buffers.push(binding);
        }

        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u32,
        format: SgfxIndexFormat,
    ) -> SgfxResult<()> {
        if byte_offset % format.size_in_bytes() != 0 {
            return Err(format!(
                "index buffer offset {} is not aligned to the {} byte index size",
                byte_offset,
                format.size_in_bytes()
            )
            .into());
        }

        self.pending_index_buffer = Some(SgfxIndexBufferBinding {
            buffer,
            byte_offset,
            format,
        });
        self.has_index_buffer = true;
        Ok(())
    }

    pub fn set_stencil_reference(
        &mut self,
        value: u32,
    ) {
        self.pending_stencil_reference = Some(value);
    }

    pub fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) {
        self.pending_blend_factor = Some(factor);
    }

    fn record(
        &mut self,
        params: SgfxDrawParams,
    ) -> SgfxResult<()> {
        if params.is_indexed() && !self.has_index_buffer {
            return Err("indexed draw recorded before any index buffer was set".into());
        }

        if let Some(offset) = match params {
            SgfxDrawParams::DrawIndirect { byte_offset, .. }
            | SgfxDrawParams::DrawIndexedIndirect { byte_offset, .. } => Some(byte_offset),
            _ => None,
        } {
            if offset % 4 != 0 {
                return Err(format!(
                    "indirect argument offset {} is not 4 byte aligned",
                    offset
                )
                .into());
            }
        }

        self.pending_bindings
            .sort_by_key(|binding| binding.sort_key());
        self.pending_vertex_buffers
            .sort_by_key(|binding| binding.slot);

        let binding_start = self.bindings.len() as u32;
        let vertex_buffer_start = self.vertex_buffers.len() as u32;
        self.bindings.extend_from_slice(&self.pending_bindings);
        self.vertex_buffers
            .extend_from_slice(&self.pending_vertex_buffers);

        self.commands.push(SgfxDrawCommand {
            params,
            binding_start,
            binding_count: self.pending_bindings.len() as u32,
            vertex_buffer_start,
            vertex_buffer_count: self.pending_vertex_buffers.len() as u32,
            index_buffer: self.pending_index_buffer.take(),
            stencil_reference: self.pending_stencil_reference.take(),
            blend_factor: self.pending_blend_factor.take(),
        });

        self.pending_bindings.clear();
        self.pending_vertex_buffers.clear();
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        first_vertex: u32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::Draw {
            vertex_count,
            first_vertex,
        })
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        })
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::DrawInstanced {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::DrawIndexedInstanced {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        })
    }

    pub fn draw_indirect(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::DrawIndirect {
            buffer,
            byte_offset,
        })
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    ) -> SgfxResult<()> {
        self.record(SgfxDrawParams::DrawIndexedIndirect {
            buffer,
            byte_offset,
        })
    }

    /// Drops all recorded draws and pending state. Storage is kept for re-recording.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.bindings.clear();
        self.vertex_buffers.clear();
        self.pending_bindings.clear();
        self.pending_vertex_buffers.clear();
        self.pending_index_buffer = None;
        self.pending_stencil_reference = None;
        self.pending_blend_factor = None;
        self.has_index_buffer = false;
    }

    pub fn draw_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[SgfxDrawCommand] {
        &self.commands
    }

    /// Bindings set before the command, sorted by stage, kind and slot
    pub fn bindings_for(
        &self,
        command: &SgfxDrawCommand,
    ) -> &[SgfxBinding] {
        let start = command.binding_start as usize;
        &self.bindings[start..start + command.binding_count as usize]
    }

    /// Vertex buffers set before the command, sorted by slot
    pub fn vertex_buffers_for(
        &self,
        command: &SgfxDrawCommand,
    ) -> &[SgfxVertexBufferBinding] {
        let start = command.vertex_buffer_start as usize;
        &self.vertex_buffers[start..start + command.vertex_buffer_count as usize]
    }

    /// Every binding recorded by the queue, in draw order
    pub fn all_bindings(&self) -> &[SgfxBinding] {
        &self.bindings
    }

    pub fn all_vertex_buffers(&self) -> &[SgfxVertexBufferBinding] {
        &self.vertex_buffers
    }

    /// True if state was set after the last draw. That state is not part of any draw and is
    /// ignored by submit.
    pub fn has_pending_state(&self) -> bool {
        !self.pending_bindings.is_empty()
            || !self.pending_vertex_buffers.is_empty()
            || self.pending_index_buffer.is_some()
            || self.pending_stencil_reference.is_some()
            || self.pending_blend_factor.is_some()
    }

    /// True once the queue's storage has outgrown its inline capacity
    pub fn spilled(&self) -> bool {
        self.commands.spilled() || self.bindings.spilled() || self.vertex_buffers.spilled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SgfxTextureHandle;

    fn queue() -> SgfxDrawQueue {
        SgfxDrawQueue::new(SgfxPipelineStateHandle::INVALID)
    }

    #[test]
    fn test_bindings_attach_to_next_draw() {
        let mut queue = queue();
        let buffer = SgfxBufferHandle::INVALID;
        let texture = SgfxTextureHandle::INVALID;

        queue
            .set_shader_resource(SgfxShaderStage::Pixel, 3, texture)
            .unwrap();
        queue
            .set_constant_buffer(SgfxShaderStage::Vertex, 1, buffer)
            .unwrap();
        queue
            .set_constant_buffer(SgfxShaderStage::Vertex, 0, buffer)
            .unwrap();
        queue.draw(3, 0).unwrap();
        queue.draw(6, 3).unwrap();

        assert_eq!(queue.draw_count(), 2);
        let first = queue.commands()[0];
        let bindings: Vec<_> = queue
            .bindings_for(&first)
            .iter()
            .map(|binding| (binding.stage, binding.kind, binding.slot))
            .collect();
        assert_eq!(
            bindings,
            vec![
                (SgfxShaderStage::Vertex, SgfxBindingKind::ConstantBuffer, 0),
                (SgfxShaderStage::Vertex, SgfxBindingKind::ConstantBuffer, 1),
                (SgfxShaderStage::Pixel, SgfxBindingKind::ShaderResource, 3),
            ]
        );

        // Nothing changed between the draws
        let second = queue.commands()[1];
        assert!(queue.bindings_for(&second).is_empty());
        assert!(!queue.has_pending_state());
    }

    #[test]
    fn test_same_slot_keeps_last_value() {
        let mut queue = queue();
        let first = SgfxBufferHandle::INVALID;
        queue
            .set_vertex_buffer(0, Some(first), 0, 12)
            .unwrap();
        queue.set_vertex_buffer(0, None, 16, 24).unwrap();
        queue
            .set_sampler(SgfxShaderStage::Pixel, 0, SgfxSamplerHandle::INVALID)
            .unwrap();
        queue
            .unbind(SgfxShaderStage::Pixel, SgfxBindingKind::Sampler, 0)
            .unwrap();
        queue.draw(3, 0).unwrap();

        let command = queue.commands()[0];
        let vertex_buffers = queue.vertex_buffers_for(&command);
        assert_eq!(vertex_buffers.len(), 1);
        assert_eq!(vertex_buffers[0].buffer, None);
        assert_eq!(vertex_buffers[0].stride, 24);

        let bindings = queue.bindings_for(&command);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].resource, SgfxBindingResource::Unbound);
    }

    #[test]
    fn test_indexed_draw_requires_index_buffer() {
        let mut queue = queue();
        assert!(queue.draw_indexed(36, 0, 0).is_err());
        assert!(queue.is_empty());

        queue
            .set_index_buffer(SgfxBufferHandle::INVALID, 0, SgfxIndexFormat::Uint16)
            .unwrap();
        queue.draw_indexed(36, 0, 0).unwrap();
        // Index buffer state carries over to later draws
        queue.draw_indexed_instanced(36, 4, 0, 0, 0).unwrap();

        assert!(queue.commands()[0].index_buffer.is_some());
        assert!(queue.commands()[1].index_buffer.is_none());

        queue.clear();
        assert!(queue.draw_indexed(36, 0, 0).is_err());
    }

    #[test]
    fn test_record_time_errors() {
        let mut queue = queue();
        let buffer = SgfxBufferHandle::INVALID;
        assert!(queue
            .set_constant_buffer(SgfxShaderStage::Vertex, 14, buffer)
            .is_err());
        assert!(queue
            .set_constant_buffer(SgfxShaderStage::Compute, 0, buffer)
            .is_err());
        assert!(queue
            .set_shader_resource(SgfxShaderStage::Pixel, 32, buffer)
            .is_err());
        assert!(queue.set_unordered_access(8, buffer, None).is_err());
        assert!(queue
            .unbind(SgfxShaderStage::Vertex, SgfxBindingKind::UnorderedAccess, 0)
            .is_err());
        assert!(queue.set_vertex_buffer(16, None, 0, 0).is_err());
        assert!(queue
            .set_index_buffer(buffer, 3, SgfxIndexFormat::Uint32)
            .is_err());
        assert!(queue.draw_indirect(buffer, 2).is_err());
        assert!(!queue.has_pending_state());
    }

    #[test]
    fn test_pending_state_after_last_draw() {
        let mut queue = queue();
        queue.draw(3, 0).unwrap();
        queue.set_stencil_reference(1);
        assert!(queue.has_pending_state());

        queue.draw(3, 0).unwrap();
        assert_eq!(queue.commands()[1].stencil_reference, Some(1));
        assert!(!queue.has_pending_state());
    }

    #[test]
    fn test_zero_counts_are_recorded_but_empty() {
        let mut queue = queue();
        queue.draw_instanced(3, 0, 0, 0).unwrap();
        queue.draw(0, 0).unwrap();
        queue.draw(3, 0).unwrap();
        let empty: Vec<bool> = queue
            .commands()
            .iter()
            .map(|command| command.params.is_empty())
            .collect();
        assert_eq!(empty, vec![true, true, false]);
    }

    #[test]
    fn test_clear_keeps_storage() {
        let mut queue = queue();
        for i in 0..100 {
            queue
                .set_constant_buffer(SgfxShaderStage::Vertex, 0, SgfxBufferHandle::INVALID)
                .unwrap();
            queue.draw(3, i).unwrap();
        }
        assert!(queue.spilled());
        assert_eq!(queue.all_bindings().len(), 100);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.spilled());
    }
}
