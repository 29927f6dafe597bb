use super::d3d12;
use std::cell::Cell;

const READ_ONLY_STATES: i32 = d3d12::D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER.0
    | d3d12::D3D12_RESOURCE_STATE_INDEX_BUFFER.0
    | d3d12::D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE.0
    | d3d12::D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE.0
    | d3d12::D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT.0
    | d3d12::D3D12_RESOURCE_STATE_COPY_SOURCE.0
    | d3d12::D3D12_RESOURCE_STATE_DEPTH_READ.0;

pub const SHADER_RESOURCE_STATES: d3d12::D3D12_RESOURCE_STATES = d3d12::D3D12_RESOURCE_STATES(
    d3d12::D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE.0
        | d3d12::D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE.0,
);

fn is_read_only(state: d3d12::D3D12_RESOURCE_STATES) -> bool {
    state.0 != 0 && (state.0 & !READ_ONLY_STATES) == 0
}

/// State a resource must move to before it can be used in `required`, or None if no barrier is
/// needed. Read states accumulate so that a resource read in several ways only transitions once.
pub fn resolve_transition(
    current: d3d12::D3D12_RESOURCE_STATES,
    required: d3d12::D3D12_RESOURCE_STATES,
) -> Option<d3d12::D3D12_RESOURCE_STATES> {
    if current == required {
        return None;
    }

    if is_read_only(current) && is_read_only(required) {
        if current.0 & required.0 == required.0 {
            return None;
        }

        return Some(d3d12::D3D12_RESOURCE_STATES(current.0 | required.0));
    }

    Some(required)
}

pub fn transition_barrier(
    resource: &d3d12::ID3D12Resource,
    before: d3d12::D3D12_RESOURCE_STATES,
    after: d3d12::D3D12_RESOURCE_STATES,
) -> d3d12::D3D12_RESOURCE_BARRIER {
    d3d12::D3D12_RESOURCE_BARRIER {
        Type: d3d12::D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: d3d12::D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: d3d12::D3D12_RESOURCE_BARRIER_0 {
            Transition: std::mem::ManuallyDrop::new(d3d12::D3D12_RESOURCE_TRANSITION_BARRIER {
                // Borrowed without an AddRef, the barrier never outlives the resource
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: d3d12::D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

pub fn uav_barrier(resource: Option<&d3d12::ID3D12Resource>) -> d3d12::D3D12_RESOURCE_BARRIER {
    d3d12::D3D12_RESOURCE_BARRIER {
        Type: d3d12::D3D12_RESOURCE_BARRIER_TYPE_UAV,
        Flags: d3d12::D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: d3d12::D3D12_RESOURCE_BARRIER_0 {
            UAV: std::mem::ManuallyDrop::new(d3d12::D3D12_RESOURCE_UAV_BARRIER {
                pResource: match resource {
                    Some(resource) => unsafe { std::mem::transmute_copy(resource) },
                    None => std::mem::ManuallyDrop::new(None),
                },
            }),
        },
    }
}

/// Whole-resource state tracking. Interior mutability lets command encoders holding shared
/// references to the resource tables record transitions.
pub struct Dx12TrackedState {
    state: Cell<d3d12::D3D12_RESOURCE_STATES>,
    // Readback and upload heap resources cannot leave their initial state
    fixed: bool,
}

impl Dx12TrackedState {
    pub fn new(initial: d3d12::D3D12_RESOURCE_STATES) -> Self {
        Dx12TrackedState {
            state: Cell::new(initial),
            fixed: false,
        }
    }

    pub fn fixed(state: d3d12::D3D12_RESOURCE_STATES) -> Self {
        Dx12TrackedState {
            state: Cell::new(state),
            fixed: true,
        }
    }

    pub fn current(&self) -> d3d12::D3D12_RESOURCE_STATES {
        self.state.get()
    }

    pub fn transition(
        &self,
        resource: &d3d12::ID3D12Resource,
        required: d3d12::D3D12_RESOURCE_STATES,
        barriers: &mut Dx12BarrierBatch,
    ) {
        if self.fixed {
            return;
        }

        let current = self.state.get();
        if let Some(next) = resolve_transition(current, required) {
            barriers.push(transition_barrier(resource, current, next));
            self.state.set(next);
        }
    }
}

/// Barriers collected while resolving the bindings of a draw, recorded together before it
#[derive(Default)]
pub struct Dx12BarrierBatch {
    barriers: Vec<d3d12::D3D12_RESOURCE_BARRIER>,
}

impl Dx12BarrierBatch {
    pub fn push(
        &mut self,
        barrier: d3d12::D3D12_RESOURCE_BARRIER,
    ) {
        self.barriers.push(barrier);
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn record(
        &mut self,
        command_list: &d3d12::ID3D12GraphicsCommandList,
    ) {
        if !self.barriers.is_empty() {
            unsafe {
                command_list.ResourceBarrier(&self.barriers);
            }
            self.barriers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_transition() {
        let srv = d3d12::D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE;
        let vb = d3d12::D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER;
        let uav = d3d12::D3D12_RESOURCE_STATE_UNORDERED_ACCESS;
        let common = d3d12::D3D12_RESOURCE_STATE_COMMON;

        assert_eq!(resolve_transition(srv, srv), None);
        assert_eq!(
            resolve_transition(srv, vb),
            Some(d3d12::D3D12_RESOURCE_STATES(srv.0 | vb.0))
        );
        assert_eq!(
            resolve_transition(d3d12::D3D12_RESOURCE_STATES(srv.0 | vb.0), vb),
            None
        );
        assert_eq!(resolve_transition(srv, uav), Some(uav));
        assert_eq!(resolve_transition(uav, srv), Some(srv));
        assert_eq!(resolve_transition(common, srv), Some(srv));
    }

    #[test]
    fn test_depth_read_combines_with_sampling() {
        let depth_read = d3d12::D3D12_RESOURCE_STATE_DEPTH_READ;
        assert_eq!(
            resolve_transition(depth_read, SHADER_RESOURCE_STATES),
            Some(d3d12::D3D12_RESOURCE_STATES(
                depth_read.0 | SHADER_RESOURCE_STATES.0
            ))
        );
        assert_eq!(
            resolve_transition(depth_read, d3d12::D3D12_RESOURCE_STATE_DEPTH_WRITE),
            Some(d3d12::D3D12_RESOURCE_STATE_DEPTH_WRITE)
        );
    }
}
