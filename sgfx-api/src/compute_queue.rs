use crate::binding::{check_slot, SgfxBinding, SgfxBindingKind, SgfxBindingResource};
use crate::{
    SgfxBufferHandle, SgfxComputePipelineHandle, SgfxResourceView, SgfxResult, SgfxSamplerHandle,
    SgfxShaderStage,
};
use sgfx_base::DynamicArray;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SgfxDispatchParams {
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    /// Group counts read from three u32s in the buffer
    DispatchIndirect {
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    },
}

impl SgfxDispatchParams {
    /// True if any group count is zero. Backends skip these after applying their bindings.
    pub fn is_empty(&self) -> bool {
        match *self {
            SgfxDispatchParams::Dispatch {
                group_count_x,
                group_count_y,
                group_count_z,
            } => group_count_x == 0 || group_count_y == 0 || group_count_z == 0,
            SgfxDispatchParams::DispatchIndirect { .. } => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SgfxDispatchCommand {
    pub params: SgfxDispatchParams,
    pub binding_start: u32,
    pub binding_count: u32,
}

/// Records dispatches for a single compute pipeline. Works like `SgfxDrawQueue`: bindings set
/// between dispatches are attached to the next dispatch, state persists across dispatches of the
/// queue, and submitting leaves the queue intact.
pub struct SgfxComputeQueue {
    pipeline: SgfxComputePipelineHandle,
    commands: DynamicArray<SgfxDispatchCommand, 8>,
    bindings: DynamicArray<SgfxBinding, 32>,
    pending_bindings: DynamicArray<SgfxBinding, 16>,
}

impl SgfxComputeQueue {
    pub fn new(pipeline: SgfxComputePipelineHandle) -> Self {
        SgfxComputeQueue {
            pipeline,
            commands: Default::default(),
            bindings: Default::default(),
            pending_bindings: Default::default(),
        }
    }

    pub fn pipeline(&self) -> SgfxComputePipelineHandle {
        self.pipeline
    }

    fn set_binding(
        &mut self,
        binding: SgfxBinding,
    ) -> SgfxResult<()> {
        check_slot(binding.kind, binding.slot)?;

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

    fn compute_binding(
        kind: SgfxBindingKind,
        slot: u32,
        resource: SgfxBindingResource,
        uav_initial_count: Option<u32>,
    ) -> SgfxBinding {
        SgfxBinding {
            stage: SgfxShaderStage::Compute,
            kind,
            slot,
            resource,
            uav_initial_count,
        }
    }

    pub fn set_constant_buffer(
        &mut self,
        slot: u32,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<()> {
        self.set_binding(Self::compute_binding(
            SgfxBindingKind::ConstantBuffer,
            slot,
            SgfxBindingResource::Buffer(buffer),
            None,
        ))
    }

    pub fn set_shader_resource<V: Into<SgfxResourceView>>(
        &mut self,
        slot: u32,
        view: V,
    ) -> SgfxResult<()> {
        let view: SgfxResourceView = view.into();
        self.set_binding(Self::compute_binding(
            SgfxBindingKind::ShaderResource,
            slot,
            view.into(),
            None,
        ))
    }

    pub fn set_sampler(
        &mut self,
        slot: u32,
        sampler: SgfxSamplerHandle,
    ) -> SgfxResult<()> {
        self.set_binding(Self::compute_binding(
            SgfxBindingKind::Sampler,
            slot,
            SgfxBindingResource::Sampler(sampler),
            None,
        ))
    }

    /// `initial_count` resets the append counter of the buffer when it is bound
    pub fn set_unordered_access<V: Into<SgfxResourceView>>(
        &mut self,
        slot: u32,
        view: V,
        initial_count: Option<u32>,
    ) -> SgfxResult<()> {
        let view: SgfxResourceView = view.into();
        self.set_binding(Self::compute_binding(
            SgfxBindingKind::UnorderedAccess,
            slot,
            view.into(),
            initial_count,
        ))
    }

    pub fn unbind(
        &mut self,
        kind: SgfxBindingKind,
        slot: u32,
    ) -> SgfxResult<()> {
        self.set_binding(Self::compute_binding(
            kind,
            slot,
            SgfxBindingResource::Unbound,
            None,
        ))
    }

    fn record(
        &mut self,
        params: SgfxDispatchParams,
    ) {
        self.pending_bindings
            .sort_by_key(|binding| binding.sort_key());

        let binding_start = self.bindings.len() as u32;
        self.bindings.extend_from_slice(&self.pending_bindings);
        self.commands.push(SgfxDispatchCommand {
            params,
            binding_start,
            binding_count: self.pending_bindings.len() as u32,
        });
        self.pending_bindings.clear();
    }

    pub fn dispatch(
        &mut self,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) {
        self.record(SgfxDispatchParams::Dispatch {
            group_count_x,
            group_count_y,
            group_count_z,
        });
    }

    pub fn dispatch_indirect(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u32,
    ) -> SgfxResult<()> {
        if byte_offset % 4 != 0 {
            return Err(format!(
                "indirect argument offset {} is not 4 byte aligned",
                byte_offset
            )
            .into());
        }

        self.record(SgfxDispatchParams::DispatchIndirect {
            buffer,
            byte_offset,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.bindings.clear();
        self.pending_bindings.clear();
    }

    pub fn dispatch_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[SgfxDispatchCommand] {
        &self.commands
    }

    pub fn bindings_for(
        &self,
        command: &SgfxDispatchCommand,
    ) -> &[SgfxBinding] {
        let start = command.binding_start as usize;
        &self.bindings[start..start + command.binding_count as usize]
    }

    pub fn all_bindings(&self) -> &[SgfxBinding] {
        &self.bindings
    }

    pub fn has_pending_state(&self) -> bool {
        !self.pending_bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SgfxTextureHandle;

    #[test]
    fn test_dispatch_bindings() {
        let mut queue = SgfxComputeQueue::new(SgfxComputePipelineHandle::INVALID);
        let buffer = SgfxBufferHandle::INVALID;

        queue
            .set_unordered_access(1, buffer, Some(0))
            .unwrap();
        queue.set_unordered_access(0, buffer, None).unwrap();
        queue.set_constant_buffer(0, buffer).unwrap();
        queue.dispatch(64, 1, 1);

        queue
            .set_shader_resource(0, SgfxTextureHandle::INVALID)
            .unwrap();
        queue.dispatch(0, 1, 1);

        assert_eq!(queue.dispatch_count(), 2);
        let first = queue.commands()[0];
        let bindings = queue.bindings_for(&first);
        assert_eq!(bindings.len(), 3);
        assert!(bindings
            .iter()
            .all(|binding| binding.stage == SgfxShaderStage::Compute));
        assert_eq!(bindings[0].kind, SgfxBindingKind::ConstantBuffer);
        assert_eq!(bindings[1].slot, 0);
        assert_eq!(bindings[2].uav_initial_count, Some(0));

        let second = queue.commands()[1];
        assert_eq!(queue.bindings_for(&second).len(), 1);
        assert!(second.params.is_empty());
        assert!(!first.params.is_empty());
    }

    #[test]
    fn test_compute_errors_and_clear() {
        let mut queue = SgfxComputeQueue::new(SgfxComputePipelineHandle::INVALID);
        let buffer = SgfxBufferHandle::INVALID;
        assert!(queue.set_unordered_access(8, buffer, None).is_err());
        assert!(queue.dispatch_indirect(buffer, 6).is_err());

        queue.set_sampler(0, SgfxSamplerHandle::INVALID).unwrap();
        assert!(queue.has_pending_state());
        queue.dispatch_indirect(buffer, 12).unwrap();
        assert!(!queue.has_pending_state());

        queue.unbind(SgfxBindingKind::Sampler, 0).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.has_pending_state());
    }
}
