use crate::binding::{
    binding_runs, kind_only, merge_stages, stage_and_kind, vertex_buffer_runs, SgfxBinding,
    SgfxBindingKind, SgfxIndexBufferBinding, SgfxSharedBindingOwners, SgfxVertexBufferBinding,
};
use crate::{
    SgfxComputeQueue, SgfxDispatchParams, SgfxDrawParams, SgfxDrawQueue, SgfxResult,
    SgfxShaderStage,
};
use sgfx_base::DynamicArray;

/// How a backend's binding points are laid out
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SgfxBindingModel {
    /// Every stage has its own slots (D3D11)
    PerStage,
    /// All stages share one set of slots per kind (GL, the D3D12 root tables)
    SharedAcrossStages,
}

/// Receives the native operations a submitted queue turns into. Each backend implements this for
/// its command context.
pub(crate) trait SgfxCommandEncoder {
    /// `stage` is None for backends with shared binding points. `run` covers contiguous slots
    /// starting at `run[0].slot`.
    fn bind_run(
        &mut self,
        stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        run: &[SgfxBinding],
    ) -> SgfxResult<()>;

    /// `run` covers contiguous slots starting at `run[0].slot`
    fn set_vertex_buffers(
        &mut self,
        run: &[SgfxVertexBufferBinding],
    ) -> SgfxResult<()>;

    fn set_index_buffer(
        &mut self,
        binding: &SgfxIndexBufferBinding,
    ) -> SgfxResult<()>;

    fn set_stencil_reference(
        &mut self,
        reference: u32,
    ) -> SgfxResult<()>;

    fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) -> SgfxResult<()>;

    fn draw(
        &mut self,
        params: &SgfxDrawParams,
    ) -> SgfxResult<()>;

    fn dispatch(
        &mut self,
        params: &SgfxDispatchParams,
    ) -> SgfxResult<()>;
}

fn apply_bindings<E: SgfxCommandEncoder>(
    encoder: &mut E,
    bindings: &[SgfxBinding],
    model: SgfxBindingModel,
    merged: &mut DynamicArray<SgfxBinding, 32>,
    owners: &mut SgfxSharedBindingOwners,
) -> SgfxResult<()> {
    match model {
        SgfxBindingModel::PerStage => {
            for run in binding_runs(bindings, stage_and_kind) {
                encoder.bind_run(Some(run[0].stage), run[0].kind, run)?;
            }
        }
        SgfxBindingModel::SharedAcrossStages => {
            merge_stages(bindings, merged);
            owners.apply(merged);
            for run in binding_runs(merged, kind_only) {
                encoder.bind_run(None, run[0].kind, run)?;
            }
        }
    }

    Ok(())
}

/// Walks the recorded draws, applying each draw's state delta before issuing it. The caller binds
/// the queue's pipeline first.
pub(crate) fn replay_draw_queue<E: SgfxCommandEncoder>(
    encoder: &mut E,
    queue: &SgfxDrawQueue,
    model: SgfxBindingModel,
) -> SgfxResult<()> {
    profiling::scope!("replay_draw_queue");

    let mut merged = DynamicArray::<SgfxBinding, 32>::new();
    let mut owners = SgfxSharedBindingOwners::default();
    for command in queue.commands() {
        apply_bindings(
            encoder,
            queue.bindings_for(command),
            model,
            &mut merged,
            &mut owners,
        )?;

        for run in vertex_buffer_runs(queue.vertex_buffers_for(command)) {
            encoder.set_vertex_buffers(run)?;
        }

        if let Some(index_buffer) = &command.index_buffer {
            encoder.set_index_buffer(index_buffer)?;
        }

        if let Some(reference) = command.stencil_reference {
            encoder.set_stencil_reference(reference)?;
        }

        if let Some(factor) = command.blend_factor {
            encoder.set_blend_factor(factor)?;
        }

        if command.params.is_empty() {
            log::trace!("Skipping empty draw {:?}", command.params);
            continue;
        }

        encoder.draw(&command.params)?;
    }

    Ok(())
}

/// Compute counterpart of `replay_draw_queue`. Barriers after the queue are the caller's job.
pub(crate) fn replay_compute_queue<E: SgfxCommandEncoder>(
    encoder: &mut E,
    queue: &SgfxComputeQueue,
    model: SgfxBindingModel,
) -> SgfxResult<()> {
    profiling::scope!("replay_compute_queue");

    let mut merged = DynamicArray::<SgfxBinding, 32>::new();
    let mut owners = SgfxSharedBindingOwners::default();
    for command in queue.commands() {
        apply_bindings(
            encoder,
            queue.bindings_for(command),
            model,
            &mut merged,
            &mut owners,
        )?;

        if command.params.is_empty() {
            log::trace!("Skipping empty dispatch {:?}", command.params);
            continue;
        }

        encoder.dispatch(&command.params)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SgfxBindingResource;
    use crate::{
        SgfxBufferHandle, SgfxComputePipelineHandle, SgfxIndexFormat, SgfxPipelineStateHandle,
        SgfxSamplerHandle, SgfxTextureHandle,
    };

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Vec<String>,
    }

    impl SgfxCommandEncoder for RecordingEncoder {
        fn bind_run(
            &mut self,
            stage: Option<SgfxShaderStage>,
            kind: SgfxBindingKind,
            run: &[SgfxBinding],
        ) -> SgfxResult<()> {
            self.calls.push(format!(
                "bind {:?} {:?} {}+{}",
                stage,
                kind,
                run[0].slot,
                run.len()
            ));
            Ok(())
        }

        fn set_vertex_buffers(
            &mut self,
            run: &[SgfxVertexBufferBinding],
        ) -> SgfxResult<()> {
            self.calls
                .push(format!("vb {}+{}", run[0].slot, run.len()));
            Ok(())
        }

        fn set_index_buffer(
            &mut self,
            binding: &SgfxIndexBufferBinding,
        ) -> SgfxResult<()> {
            self.calls.push(format!("ib {:?}", binding.format));
            Ok(())
        }

        fn set_stencil_reference(
            &mut self,
            reference: u32,
        ) -> SgfxResult<()> {
            self.calls.push(format!("stencil {}", reference));
            Ok(())
        }

        fn set_blend_factor(
            &mut self,
            _factor: [f32; 4],
        ) -> SgfxResult<()> {
            self.calls.push("blend".to_string());
            Ok(())
        }

        fn draw(
            &mut self,
            _params: &SgfxDrawParams,
        ) -> SgfxResult<()> {
            self.calls.push("draw".to_string());
            Ok(())
        }

        fn dispatch(
            &mut self,
            _params: &SgfxDispatchParams,
        ) -> SgfxResult<()> {
            self.calls.push("dispatch".to_string());
            Ok(())
        }
    }

    fn record_queue() -> SgfxDrawQueue {
        let texture = SgfxTextureHandle::INVALID;
        let buffer = SgfxBufferHandle::INVALID;

        let mut queue = SgfxDrawQueue::new(SgfxPipelineStateHandle::INVALID);
        queue
            .set_shader_resource(SgfxShaderStage::Pixel, 0, texture)
            .unwrap();
        queue
            .set_shader_resource(SgfxShaderStage::Pixel, 1, texture)
            .unwrap();
        queue
            .set_shader_resource(SgfxShaderStage::Vertex, 1, buffer)
            .unwrap();
        queue
            .set_sampler(SgfxShaderStage::Pixel, 0, SgfxSamplerHandle::INVALID)
            .unwrap();
        queue.set_vertex_buffer(0, Some(buffer), 0, 32).unwrap();
        queue.set_vertex_buffer(1, Some(buffer), 0, 64).unwrap();
        queue.set_vertex_buffer(3, Some(buffer), 0, 16).unwrap();
        queue
            .set_index_buffer(buffer, 0, SgfxIndexFormat::Uint16)
            .unwrap();
        queue.draw_indexed(36, 0, 0).unwrap();

        queue.set_stencil_reference(3);
        queue.draw_indexed(0, 0, 0).unwrap();
        queue
    }

    #[test]
    fn test_per_stage_runs() {
        let queue = record_queue();
        let mut encoder = RecordingEncoder::default();
        replay_draw_queue(&mut encoder, &queue, SgfxBindingModel::PerStage).unwrap();

        assert_eq!(
            encoder.calls,
            vec![
                "bind Some(Vertex) ShaderResource 1+1",
                "bind Some(Pixel) ShaderResource 0+2",
                "bind Some(Pixel) Sampler 0+1",
                "vb 0+2",
                "vb 3+1",
                "ib Uint16",
                "draw",
                "stencil 3",
            ]
        );
    }

    #[test]
    fn test_shared_runs() {
        let queue = record_queue();
        let mut encoder = RecordingEncoder::default();
        replay_draw_queue(&mut encoder, &queue, SgfxBindingModel::SharedAcrossStages).unwrap();

        // The vertex stage's slot 1 is overridden by the pixel stage's
        assert_eq!(encoder.calls[0], "bind None ShaderResource 0+2");
        assert_eq!(encoder.calls[1], "bind None Sampler 0+1");
        assert_eq!(encoder.calls.iter().filter(|call| *call == "draw").count(), 1);
    }

    #[test]
    fn test_shared_slot_rebound_by_later_draw() {
        let mut queue = SgfxDrawQueue::new(SgfxPipelineStateHandle::INVALID);
        queue
            .set_shader_resource(SgfxShaderStage::Pixel, 0, SgfxTextureHandle::INVALID)
            .unwrap();
        queue.draw(3, 0).unwrap();
        queue
            .set_shader_resource(SgfxShaderStage::Vertex, 0, SgfxBufferHandle::INVALID)
            .unwrap();
        queue.draw(3, 0).unwrap();

        // Per stage the pixel binding survives, shared points lose it to the vertex binding
        let mut per_stage = RecordingEncoder::default();
        replay_draw_queue(&mut per_stage, &queue, SgfxBindingModel::PerStage).unwrap();
        assert_eq!(per_stage.calls[2], "bind Some(Vertex) ShaderResource 0+1");

        let mut shared = RecordingEncoder::default();
        replay_draw_queue(&mut shared, &queue, SgfxBindingModel::SharedAcrossStages).unwrap();
        assert_eq!(
            shared.calls,
            vec![
                "bind None ShaderResource 0+1",
                "draw",
                "bind None ShaderResource 0+1",
                "draw",
            ]
        );

        let mut owners = SgfxSharedBindingOwners::default();
        let first = queue.bindings_for(&queue.commands()[0]);
        let second = queue.bindings_for(&queue.commands()[1]);
        assert_eq!(owners.apply(first), 0);
        assert_eq!(owners.apply(second), 1);
    }

    #[test]
    fn test_compute_replay_skips_empty() {
        let mut queue = SgfxComputeQueue::new(SgfxComputePipelineHandle::INVALID);
        queue
            .set_unordered_access(0, SgfxBufferHandle::INVALID, None)
            .unwrap();
        queue.dispatch(0, 1, 1);
        queue.dispatch(4, 1, 1);

        let mut encoder = RecordingEncoder::default();
        replay_compute_queue(&mut encoder, &queue, SgfxBindingModel::PerStage).unwrap();
        assert_eq!(
            encoder.calls,
            vec!["bind Some(Compute) UnorderedAccess 0+1", "dispatch"]
        );

        let resource = queue.all_bindings()[0].resource;
        assert_eq!(resource, SgfxBindingResource::Buffer(SgfxBufferHandle::INVALID));
    }
}
