//! Translation of GL-style attribute and depth state into the keys wgpu
//! pipelines are built from.

use crate::gpu::{BufferHandle, ProgramHandle};
use monet_render::{AttribPointer, CompareFunction};
use std::collections::BTreeMap;

/// What `vertex_attrib_pointer`, `enable_vertex_attrib_array` and
/// `vertex_attrib_divisor` have set for one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AttributeState {
    pub pointer: Option<(BufferHandle, AttribPointer)>,
    pub enabled: bool,
    pub divisor: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AttributeKey {
    pub location: u32,
    pub components: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LayoutKey {
    pub stride: u32,
    pub per_instance: bool,
    pub attributes: Vec<AttributeKey>,
}

/// One vertex buffer slot of a draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VertexSlot {
    pub buffer: BufferHandle,
    /// Byte offset the slot's slice starts at.
    pub base: u64,
    pub layout: LayoutKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramHandle,
    pub format: wgpu::TextureFormat,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub layouts: Vec<LayoutKey>,
}

/// Groups the attributes a program reads into vertex buffer slots.
///
/// Attributes that share a buffer, stride and step mode share a slot. An
/// offset past the stride moves the slot's base instead.
pub(crate) fn vertex_slots(
    state: &BTreeMap<u32, AttributeState>,
    locations: &[u32],
) -> Result<Vec<VertexSlot>, String> {
    let mut slots: Vec<VertexSlot> = Vec::new();

    for &location in locations {
        let Some((buffer, pointer, divisor)) = state
            .get(&location)
            .filter(|attr| attr.enabled)
            .and_then(|attr| attr.pointer.map(|(b, p)| (b, p, attr.divisor)))
        else {
            return Err(format!(
                "attribute @location({location}) is not enabled with a buffer"
            ));
        };
        if divisor > 1 {
            return Err(format!(
                "attribute @location({location}) has divisor {divisor}; only 0 and 1 are supported"
            ));
        }
        if !(1..=4).contains(&pointer.components) {
            return Err(format!(
                "attribute @location({location}) has {} components",
                pointer.components
            ));
        }

        let stride = pointer.effective_stride();
        let offset = pointer.offset % stride;
        if offset + pointer.components * 4 > stride {
            return Err(format!(
                "attribute @location({location}) overruns its {stride}-byte stride"
            ));
        }
        let base = u64::from(pointer.offset - offset);
        let per_instance = divisor == 1;
        let attribute = AttributeKey {
            location,
            components: pointer.components,
            offset,
        };

        match slots.iter_mut().find(|slot| {
            slot.buffer == buffer
                && slot.base == base
                && slot.layout.stride == stride
                && slot.layout.per_instance == per_instance
        }) {
            Some(slot) => slot.layout.attributes.push(attribute),
            None => slots.push(VertexSlot {
                buffer,
                base,
                layout: LayoutKey {
                    stride,
                    per_instance,
                    attributes: vec![attribute],
                },
            }),
        }
    }

    Ok(slots)
}

/// With the depth test off nothing is tested or written.
pub(crate) fn depth_state(test: bool, func: CompareFunction, write: bool) -> (bool, CompareFunction) {
    if test {
        (write, func)
    } else {
        (false, CompareFunction::Always)
    }
}

pub(crate) fn compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub(crate) fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(buffer: u64, pointer: AttribPointer, divisor: u32) -> AttributeState {
        AttributeState {
            pointer: Some((BufferHandle(buffer), pointer)),
            enabled: true,
            divisor,
        }
    }

    #[test]
    fn instanced_batch_uses_two_slots() {
        let state = BTreeMap::from([
            (0, bound(1, AttribPointer::floats(3, 0, 0), 0)),
            (1, bound(2, AttribPointer::floats(3, 32, 0), 1)),
            (2, bound(2, AttribPointer::floats(2, 32, 12), 1)),
            (3, bound(2, AttribPointer::floats(3, 32, 20), 1)),
        ]);
        let slots = vertex_slots(&state, &[0, 1, 2, 3]).unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].buffer, BufferHandle(1));
        assert_eq!(slots[0].layout.stride, 12);
        assert!(!slots[0].layout.per_instance);
        assert_eq!(slots[1].buffer, BufferHandle(2));
        assert!(slots[1].layout.per_instance);
        let offsets: Vec<u32> = slots[1].layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
    }

    #[test]
    fn unread_locations_are_ignored() {
        let state = BTreeMap::from([
            (0, bound(1, AttribPointer::floats(3, 0, 0), 0)),
            (5, AttributeState::default()),
        ]);
        assert_eq!(vertex_slots(&state, &[0]).unwrap().len(), 1);
    }

    #[test]
    fn disabled_attribute_is_rejected() {
        let mut attr = bound(1, AttribPointer::floats(3, 0, 0), 0);
        attr.enabled = false;
        let state = BTreeMap::from([(0, attr)]);
        assert!(vertex_slots(&state, &[0]).unwrap_err().contains("@location(0)"));
    }

    #[test]
    fn divisor_above_one_is_rejected() {
        let state = BTreeMap::from([(1, bound(2, AttribPointer::floats(3, 32, 0), 2))]);
        assert!(vertex_slots(&state, &[1]).unwrap_err().contains("divisor 2"));
    }

    #[test]
    fn offset_past_stride_moves_base() {
        let state = BTreeMap::from([(0, bound(1, AttribPointer::floats(2, 8, 24), 0))]);
        let slots = vertex_slots(&state, &[0]).unwrap();
        assert_eq!(slots[0].base, 24);
        assert_eq!(slots[0].layout.attributes[0].offset, 0);
    }

    #[test]
    fn depth_test_off_disables_writes() {
        assert_eq!(
            depth_state(false, CompareFunction::Less, true),
            (false, CompareFunction::Always)
        );
        assert_eq!(
            depth_state(true, CompareFunction::Always, false),
            (false, CompareFunction::Always)
        );
        assert_eq!(
            depth_state(true, CompareFunction::Less, true),
            (true, CompareFunction::Less)
        );
    }
}
