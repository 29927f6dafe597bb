//! Resource bindings recorded by the queues, and the run-length batching backends use to turn a
//! set of bindings into as few native multi-bind calls as possible.

use crate::{
    SgfxBindFlags, SgfxBufferDef, SgfxBufferFlags, SgfxBufferHandle, SgfxIndexFormat,
    SgfxResourceView, SgfxResult, SgfxSamplerHandle, SgfxShaderStage, SgfxTextureDef,
    SgfxTextureHandle, MAX_CONSTANT_BUFFER_SLOTS, MAX_SAMPLER_SLOTS, MAX_SHADER_RESOURCE_SLOTS,
    MAX_UNORDERED_ACCESS_SLOTS, MAX_VERTEX_BUFFER_SLOTS,
};
use fnv::FnvHashMap;
use sgfx_base::DynamicArray;

/// The register space a binding occupies (b#, t#, s# and u# in HLSL)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SgfxBindingKind {
    ConstantBuffer,
    ShaderResource,
    Sampler,
    UnorderedAccess,
}

impl SgfxBindingKind {
    pub const ALL: [SgfxBindingKind; 4] = [
        SgfxBindingKind::ConstantBuffer,
        SgfxBindingKind::ShaderResource,
        SgfxBindingKind::Sampler,
        SgfxBindingKind::UnorderedAccess,
    ];

    pub fn slot_count(self) -> u32 {
        match self {
            SgfxBindingKind::ConstantBuffer => MAX_CONSTANT_BUFFER_SLOTS,
            SgfxBindingKind::ShaderResource => MAX_SHADER_RESOURCE_SLOTS,
            SgfxBindingKind::Sampler => MAX_SAMPLER_SLOTS,
            SgfxBindingKind::UnorderedAccess => MAX_UNORDERED_ACCESS_SLOTS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SgfxBindingKind::ConstantBuffer => "constant buffer",
            SgfxBindingKind::ShaderResource => "shader resource",
            SgfxBindingKind::Sampler => "sampler",
            SgfxBindingKind::UnorderedAccess => "unordered access",
        }
    }

    pub fn required_bind_flag(self) -> SgfxBindFlags {
        match self {
            SgfxBindingKind::ConstantBuffer => SgfxBindFlags::CONSTANT_BUFFER,
            SgfxBindingKind::ShaderResource => SgfxBindFlags::SHADER_RESOURCE,
            SgfxBindingKind::Sampler => SgfxBindFlags::empty(),
            SgfxBindingKind::UnorderedAccess => SgfxBindFlags::UNORDERED_ACCESS,
        }
    }
}

/// The object bound to a slot
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SgfxBindingResource {
    Buffer(SgfxBufferHandle),
    Texture(SgfxTextureHandle),
    Sampler(SgfxSamplerHandle),
    /// Clears the slot
    Unbound,
}

impl From<SgfxResourceView> for SgfxBindingResource {
    fn from(view: SgfxResourceView) -> Self {
        match view {
            SgfxResourceView::Buffer(buffer) => SgfxBindingResource::Buffer(buffer),
            SgfxResourceView::Texture(texture) => SgfxBindingResource::Texture(texture),
        }
    }
}

/// A single slot assignment recorded by a queue
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SgfxBinding {
    pub stage: SgfxShaderStage,
    pub kind: SgfxBindingKind,
    pub slot: u32,
    pub resource: SgfxBindingResource,
    /// Value loaded into an append/consume counter when the UAV is bound. None keeps the counter.
    pub uav_initial_count: Option<u32>,
}

impl SgfxBinding {
    /// Order used by the queues: grouped by stage, then kind, then ascending slot
    pub fn sort_key(&self) -> (SgfxShaderStage, SgfxBindingKind, u32) {
        (self.stage, self.kind, self.slot)
    }

    pub fn same_target(
        &self,
        other: &SgfxBinding,
    ) -> bool {
        self.stage == other.stage && self.kind == other.kind && self.slot == other.slot
    }
}

/// Errors if the slot is outside the range for the binding kind
pub fn check_slot(
    kind: SgfxBindingKind,
    slot: u32,
) -> SgfxResult<()> {
    if slot >= kind.slot_count() {
        return Err(format!(
            "{} slot {} is out of range (limit {})",
            kind.name(),
            slot,
            kind.slot_count()
        )
        .into());
    }

    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SgfxVertexBufferBinding {
    pub slot: u32,
    /// None unbinds the slot
    pub buffer: Option<SgfxBufferHandle>,
    pub byte_offset: u32,
    pub stride: u32,
}

pub fn check_vertex_buffer_slot(slot: u32) -> SgfxResult<()> {
    if slot >= MAX_VERTEX_BUFFER_SLOTS {
        return Err(format!(
            "vertex buffer slot {} is out of range (limit {})",
            slot, MAX_VERTEX_BUFFER_SLOTS
        )
        .into());
    }

    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SgfxIndexBufferBinding {
    pub buffer: SgfxBufferHandle,
    pub byte_offset: u32,
    pub format: SgfxIndexFormat,
}

/// Iterator over maximal runs of bindings that share a key and occupy contiguous slots. Each run
/// can be issued as a single native call (`VSSetShaderResources(first, count, ..)`,
/// `glBindTextures(first, count, ..)`).
pub struct SgfxBindingRuns<'a, K, F>
where
    F: Fn(&SgfxBinding) -> K,
{
    remaining: &'a [SgfxBinding],
    key: F,
}

impl<'a, K: PartialEq, F: Fn(&SgfxBinding) -> K> Iterator for SgfxBindingRuns<'a, K, F> {
    type Item = &'a [SgfxBinding];

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.remaining.first()?;
        let first_key = (self.key)(first);

        let mut run_length = 1;
        for (offset, binding) in self.remaining.iter().enumerate().skip(1) {
            if (self.key)(binding) != first_key || binding.slot != first.slot + offset as u32 {
                break;
            }
            run_length += 1;
        }

        let (run, rest) = self.remaining.split_at(run_length);
        self.remaining = rest;
        Some(run)
    }
}

/// Splits bindings (already sorted so equal keys are adjacent with ascending slots) into runs
pub fn binding_runs<K, F>(
    bindings: &[SgfxBinding],
    key: F,
) -> SgfxBindingRuns<'_, K, F>
where
    K: PartialEq,
    F: Fn(&SgfxBinding) -> K,
{
    SgfxBindingRuns {
        remaining: bindings,
        key,
    }
}

/// Key for APIs with per-stage binding points (D3D11)
pub fn stage_and_kind(binding: &SgfxBinding) -> (SgfxShaderStage, SgfxBindingKind) {
    (binding.stage, binding.kind)
}

/// Key for APIs whose binding points are shared by every stage (GL, the D3D12 root tables)
pub fn kind_only(binding: &SgfxBinding) -> SgfxBindingKind {
    binding.kind
}

/// Folds per-stage bindings onto binding points that every stage shares. The result is sorted by
/// kind then slot. When two stages assign different resources to the same slot, the later stage
/// in pipeline order wins and a warning is logged. This only sees one draw's changes, conflicts
/// with earlier draws are caught by `SgfxSharedBindingOwners`.
pub fn merge_stages<const N: usize>(
    bindings: &[SgfxBinding],
    merged: &mut DynamicArray<SgfxBinding, N>,
) {
    merged.clear();
    merged.extend_from_slice(bindings);
    merged.sort_by_key(|binding| (binding.kind, binding.slot, binding.stage));

    let mut write = 0;
    for read in 0..merged.len() {
        let binding = merged[read];
        if write > 0 {
            let previous = merged[write - 1];
            if previous.kind == binding.kind && previous.slot == binding.slot {
                if previous.resource != binding.resource {
                    log::warn!(
                        "{} slot {} is bound by both the {} and {} stages, using the {} binding",
                        binding.kind.name(),
                        binding.slot,
                        previous.stage.name(),
                        binding.stage.name(),
                        binding.stage.name()
                    );
                }
                merged[write - 1] = binding;
                continue;
            }
        }

        merged[write] = binding;
        write += 1;
    }

    merged.truncate(write);
}

/// The binding last applied to each shared binding point while a queue replays. A draw whose
/// stage replaces a resource that a different stage bound in an earlier draw leaves that stage
/// reading the new resource, which is logged.
#[derive(Default)]
pub struct SgfxSharedBindingOwners {
    owners: FnvHashMap<(SgfxBindingKind, u32), SgfxBinding>,
}

impl SgfxSharedBindingOwners {
    /// Records a merged delta. Returns how many bindings replaced another stage's resource.
    pub fn apply(
        &mut self,
        merged: &[SgfxBinding],
    ) -> usize {
        let mut replaced = 0;
        for binding in merged {
            let previous = self.owners.insert((binding.kind, binding.slot), *binding);
            if let Some(previous) = previous {
                if previous.stage != binding.stage && previous.resource != binding.resource {
                    log::warn!(
                        "{} slot {} bound by the {} stage replaces an earlier {} stage binding",
                        binding.kind.name(),
                        binding.slot,
                        binding.stage.name(),
                        previous.stage.name()
                    );
                    replaced += 1;
                }
            }
        }

        replaced
    }
}

/// Splits vertex buffer bindings (sorted by slot) into runs of contiguous slots
pub fn vertex_buffer_runs(
    bindings: &[SgfxVertexBufferBinding]
) -> impl Iterator<Item = &[SgfxVertexBufferBinding]> {
    let mut remaining = bindings;
    std::iter::from_fn(move || {
        let first = remaining.first()?;
        let run_length = remaining
            .iter()
            .enumerate()
            .take_while(|(offset, binding)| binding.slot == first.slot + *offset as u32)
            .count();

        let (run, rest) = remaining.split_at(run_length);
        remaining = rest;
        Some(run)
    })
}

/// Checks a buffer was created with the bind flag the binding kind needs
pub fn check_buffer_binding(
    kind: SgfxBindingKind,
    def: &SgfxBufferDef,
    uav_initial_count: Option<u32>,
) -> SgfxResult<()> {
    if kind == SgfxBindingKind::Sampler {
        return Err("a buffer cannot be bound to a sampler slot".into());
    }

    if !def.bind_flags.contains(kind.required_bind_flag()) {
        return Err(format!(
            "buffer bound as {} was not created with {:?} (has {:?})",
            kind.name(),
            kind.required_bind_flag(),
            def.bind_flags
        )
        .into());
    }

    if uav_initial_count.is_some() && !def.flags.contains(SgfxBufferFlags::APPEND_COUNTER) {
        return Err("an initial UAV count was given for a buffer without an append counter".into());
    }

    Ok(())
}

/// Checks a texture was created with the bind flag the binding kind needs
pub fn check_texture_binding(
    kind: SgfxBindingKind,
    def: &SgfxTextureDef,
    uav_initial_count: Option<u32>,
) -> SgfxResult<()> {
    if kind == SgfxBindingKind::ConstantBuffer || kind == SgfxBindingKind::Sampler {
        return Err(format!("a texture cannot be bound to a {} slot", kind.name()).into());
    }

    if !def.bind_flags.contains(kind.required_bind_flag()) {
        return Err(format!(
            "texture bound as {} was not created with {:?} (has {:?})",
            kind.name(),
            kind.required_bind_flag(),
            def.bind_flags
        )
        .into());
    }

    if uav_initial_count.is_some() {
        return Err("texture UAVs do not have counters".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SgfxUsage;

    fn srv(
        stage: SgfxShaderStage,
        slot: u32,
        texture: SgfxTextureHandle,
    ) -> SgfxBinding {
        SgfxBinding {
            stage,
            kind: SgfxBindingKind::ShaderResource,
            slot,
            resource: SgfxBindingResource::Texture(texture),
            uav_initial_count: None,
        }
    }

    fn cb(
        stage: SgfxShaderStage,
        slot: u32,
    ) -> SgfxBinding {
        SgfxBinding {
            stage,
            kind: SgfxBindingKind::ConstantBuffer,
            slot,
            resource: SgfxBindingResource::Unbound,
            uav_initial_count: None,
        }
    }

    #[test]
    fn test_runs_split_on_gaps_and_keys() {
        let texture = SgfxTextureHandle::INVALID;
        let mut bindings = vec![
            srv(SgfxShaderStage::Pixel, 0, texture),
            srv(SgfxShaderStage::Pixel, 1, texture),
            srv(SgfxShaderStage::Pixel, 2, texture),
            srv(SgfxShaderStage::Pixel, 5, texture),
            cb(SgfxShaderStage::Vertex, 0),
            cb(SgfxShaderStage::Vertex, 1),
            cb(SgfxShaderStage::Pixel, 1),
        ];
        bindings.sort_by_key(|binding| binding.sort_key());

        let runs: Vec<(u32, usize)> = binding_runs(&bindings, stage_and_kind)
            .map(|run| (run[0].slot, run.len()))
            .collect();

        // vertex cb 0-1, pixel cb 1, pixel srv 0-2, pixel srv 5
        assert_eq!(runs, vec![(0, 2), (1, 1), (0, 3), (5, 1)]);
    }

    #[test]
    fn test_empty_runs() {
        assert_eq!(binding_runs(&[], kind_only).count(), 0);
        assert_eq!(vertex_buffer_runs(&[]).count(), 0);
    }

    #[test]
    fn test_merge_stages_later_stage_wins() {
        let a = SgfxTextureHandle::INVALID;
        let bindings = [
            cb(SgfxShaderStage::Vertex, 0),
            srv(SgfxShaderStage::Vertex, 0, a),
            srv(SgfxShaderStage::Vertex, 1, a),
            cb(SgfxShaderStage::Pixel, 0),
            cb(SgfxShaderStage::Pixel, 1),
            srv(SgfxShaderStage::Pixel, 1, a),
        ];

        let mut merged = DynamicArray::<SgfxBinding, 8>::new();
        merge_stages(&bindings, &mut merged);

        let summary: Vec<_> = merged
            .iter()
            .map(|binding| (binding.kind, binding.slot, binding.stage))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SgfxBindingKind::ConstantBuffer, 0, SgfxShaderStage::Pixel),
                (SgfxBindingKind::ConstantBuffer, 1, SgfxShaderStage::Pixel),
                (SgfxBindingKind::ShaderResource, 0, SgfxShaderStage::Vertex),
                (SgfxBindingKind::ShaderResource, 1, SgfxShaderStage::Pixel),
            ]
        );

        // Shared binding points collapse into one run per kind
        assert_eq!(binding_runs(&merged, kind_only).count(), 2);
    }

    #[test]
    fn test_shared_owners_across_draws() {
        let texture = SgfxTextureHandle::INVALID;
        let mut owners = SgfxSharedBindingOwners::default();

        // First draw reads slot 0 in the pixel stage
        assert_eq!(owners.apply(&[srv(SgfxShaderStage::Pixel, 0, texture)]), 0);

        // Rebinding the same resource from another stage is harmless
        assert_eq!(owners.apply(&[srv(SgfxShaderStage::Vertex, 0, texture)]), 0);

        // A later vertex binding replaces what the pixel stage still reads
        let mut other = srv(SgfxShaderStage::Vertex, 0, texture);
        other.resource = SgfxBindingResource::Unbound;
        let mut pixel_owned = SgfxSharedBindingOwners::default();
        pixel_owned.apply(&[srv(SgfxShaderStage::Pixel, 0, texture)]);
        assert_eq!(pixel_owned.apply(&[other]), 1);

        // The same stage changing its own binding is not a conflict
        assert_eq!(pixel_owned.apply(&[other]), 0);
        let mut same_stage = other;
        same_stage.resource = SgfxBindingResource::Texture(texture);
        assert_eq!(pixel_owned.apply(&[same_stage]), 0);
    }

    #[test]
    fn test_vertex_buffer_runs() {
        let vb = |slot| SgfxVertexBufferBinding {
            slot,
            buffer: None,
            byte_offset: 0,
            stride: 12,
        };
        let bindings = [vb(0), vb(1), vb(3), vb(4), vb(5), vb(9)];
        let runs: Vec<usize> = vertex_buffer_runs(&bindings).map(|run| run.len()).collect();
        assert_eq!(runs, vec![2, 3, 1]);
    }

    #[test]
    fn test_check_slot() {
        assert!(check_slot(SgfxBindingKind::ConstantBuffer, 13).is_ok());
        assert!(check_slot(SgfxBindingKind::ConstantBuffer, 14).is_err());
        assert!(check_slot(SgfxBindingKind::UnorderedAccess, 8).is_err());
        assert!(check_vertex_buffer_slot(16).is_err());
    }

    #[test]
    fn test_bind_flag_checks() {
        let constant = SgfxBufferDef::for_constant_buffer(64);
        assert!(check_buffer_binding(SgfxBindingKind::ConstantBuffer, &constant, None).is_ok());
        assert!(check_buffer_binding(SgfxBindingKind::ShaderResource, &constant, None).is_err());

        let mut append = SgfxBufferDef::for_structured_buffer(
            16,
            64,
            SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::SHADER_RESOURCE,
        );
        assert!(check_buffer_binding(SgfxBindingKind::UnorderedAccess, &append, Some(0)).is_err());
        append.flags |= SgfxBufferFlags::APPEND_COUNTER;
        assert!(check_buffer_binding(SgfxBindingKind::UnorderedAccess, &append, Some(0)).is_ok());

        let texture = SgfxTextureDef {
            usage: SgfxUsage::Default,
            ..SgfxTextureDef::for_texture_2d(4, 4, crate::SgfxFormat::R8G8B8A8Unorm)
        };
        assert!(check_texture_binding(SgfxBindingKind::ShaderResource, &texture, None).is_ok());
        assert!(check_texture_binding(SgfxBindingKind::UnorderedAccess, &texture, None).is_err());
        assert!(check_texture_binding(SgfxBindingKind::ConstantBuffer, &texture, None).is_err());
    }
}
