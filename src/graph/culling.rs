//! Visibility, Filtering & Draw Sorting
//!
//! The host culls the scene and hands the outline pipeline a [`CullResults`]
//! list. The identification pass turns it into a draw list with
//! [`build_draw_list`]:
//!
//! ```text
//! CullResults ──► FilteringSettings (layer mask, render queue range)
//!             ──► DrawingSettings   (shader tags, sort criteria)
//!             ──► Vec<RendererId>   (stable-sorted)
//! ```
//!
//! Renderers rejected by either filter are invisible to the draw entirely.

use std::cmp::Ordering;
use std::ops::RangeInclusive;

use bitflags::bitflags;
use smallvec::SmallVec;

pub use crate::core::RendererId;
use crate::settings::LayerMask;

// ============================================================================
// Shader tags
// ============================================================================

/// Light-mode tag of a renderer's shader pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTag {
    SrpDefaultUnlit,
    UniversalForward,
    UniversalForwardOnly,
    ShadowCaster,
    DepthOnly,
    Meta,
}

impl ShaderTag {
    /// Tags the identification pass draws.
    pub const OUTLINE_TAGS: [ShaderTag; 3] = [
        ShaderTag::SrpDefaultUnlit,
        ShaderTag::UniversalForward,
        ShaderTag::UniversalForwardOnly,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SrpDefaultUnlit => "SRPDefaultUnlit",
            Self::UniversalForward => "UniversalForward",
            Self::UniversalForwardOnly => "UniversalForwardOnly",
            Self::ShadowCaster => "ShadowCaster",
            Self::DepthOnly => "DepthOnly",
            Self::Meta => "Meta",
        }
    }
}

// ============================================================================
// Cull results
// ============================================================================

/// A renderer that survived host culling for the current camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRenderer {
    pub id: RendererId,
    /// Layer index, `0..32`.
    pub layer: u8,
    pub shader_tag: ShaderTag,
    pub render_queue: u32,
    /// View-space distance from the camera.
    pub distance: f32,
    /// Key grouping renderers that share GPU state.
    pub material_key: u64,
}

impl VisibleRenderer {
    /// Opaque-queue renderer with the default forward tag.
    #[must_use]
    pub fn new(id: RendererId, layer: u8) -> Self {
        Self {
            id,
            layer,
            shader_tag: ShaderTag::UniversalForward,
            render_queue: RenderQueueRange::GEOMETRY,
            distance: 0.0,
            material_key: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CullResults {
    pub renderers: Vec<VisibleRenderer>,
}

impl CullResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, renderer: VisibleRenderer) {
        self.renderers.push(renderer);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl FromIterator<VisibleRenderer> for CullResults {
    fn from_iter<T: IntoIterator<Item = VisibleRenderer>>(iter: T) -> Self {
        Self {
            renderers: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Inclusive render queue range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderQueueRange(pub RangeInclusive<u32>);

impl RenderQueueRange {
    pub const GEOMETRY: u32 = 2000;
    pub const ALPHA_TEST: u32 = 2450;
    pub const TRANSPARENT: u32 = 3000;

    #[must_use]
    pub const fn all() -> Self {
        Self(0..=5000)
    }

    #[must_use]
    pub const fn opaque() -> Self {
        Self(0..=2500)
    }

    #[must_use]
    pub const fn transparent() -> Self {
        Self(2501..=5000)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, queue: u32) -> bool {
        self.0.contains(&queue)
    }
}

impl Default for RenderQueueRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Which renderers a draw considers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteringSettings {
    pub layer_mask: LayerMask,
    pub render_queue_range: RenderQueueRange,
}

impl FilteringSettings {
    #[must_use]
    pub fn new(render_queue_range: RenderQueueRange, layer_mask: LayerMask) -> Self {
        Self {
            layer_mask,
            render_queue_range,
        }
    }

    #[inline]
    #[must_use]
    pub fn accepts(&self, renderer: &VisibleRenderer) -> bool {
        self.layer_mask.contains_layer(renderer.layer)
            && self.render_queue_range.contains(renderer.render_queue)
    }
}

// ============================================================================
// Sorting
// ============================================================================

bitflags! {
    /// How a draw list is ordered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SortingCriteria: u8 {
        const RENDER_QUEUE = 1 << 0;
        const FRONT_TO_BACK = 1 << 1;
        const BACK_TO_FRONT = 1 << 2;
        const OPTIMIZE_STATE_CHANGES = 1 << 3;

        const COMMON_OPAQUE = Self::RENDER_QUEUE.bits()
            | Self::FRONT_TO_BACK.bits()
            | Self::OPTIMIZE_STATE_CHANGES.bits();
        const COMMON_TRANSPARENT = Self::RENDER_QUEUE.bits()
            | Self::BACK_TO_FRONT.bits()
            | Self::OPTIMIZE_STATE_CHANGES.bits();
    }
}

/// Which shader passes a draw renders and in what order.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingSettings {
    pub shader_tags: SmallVec<[ShaderTag; 4]>,
    pub sorting: SortingCriteria,
}

impl DrawingSettings {
    #[must_use]
    pub fn new(shader_tag: ShaderTag, sorting: SortingCriteria) -> Self {
        let mut shader_tags = SmallVec::new();
        shader_tags.push(shader_tag);
        Self {
            shader_tags,
            sorting,
        }
    }

    /// Settings drawing every tag in `tags`.
    #[must_use]
    pub fn with_tags(tags: &[ShaderTag], sorting: SortingCriteria) -> Self {
        Self {
            shader_tags: tags.iter().copied().collect(),
            sorting,
        }
    }

    pub fn add_shader_tag(&mut self, tag: ShaderTag) {
        if !self.shader_tags.contains(&tag) {
            self.shader_tags.push(tag);
        }
    }

    #[inline]
    #[must_use]
    pub fn accepts(&self, renderer: &VisibleRenderer) -> bool {
        self.shader_tags.contains(&renderer.shader_tag)
    }

    fn compare(&self, a: &VisibleRenderer, b: &VisibleRenderer) -> Ordering {
        let mut ord = Ordering::Equal;
        if self.sorting.contains(SortingCriteria::RENDER_QUEUE) {
            ord = ord.then(a.render_queue.cmp(&b.render_queue));
        }
        if self.sorting.contains(SortingCriteria::FRONT_TO_BACK) {
            ord = ord.then(a.distance.total_cmp(&b.distance));
        } else if self.sorting.contains(SortingCriteria::BACK_TO_FRONT) {
            ord = ord.then(b.distance.total_cmp(&a.distance));
        }
        if self.sorting.contains(SortingCriteria::OPTIMIZE_STATE_CHANGES) {
            ord = ord.then(a.material_key.cmp(&b.material_key));
        }
        ord
    }
}

/// Filters and sorts `cull` into the renderer list of one draw call.
///
/// The sort is stable: renderers comparing equal keep their cull order.
#[must_use]
pub fn build_draw_list(
    cull: &CullResults,
    drawing: &DrawingSettings,
    filtering: &FilteringSettings,
) -> Vec<RendererId> {
    let mut visible: Vec<&VisibleRenderer> = cull
        .renderers
        .iter()
        .filter(|r| filtering.accepts(r) && drawing.accepts(r))
        .collect();

    if !drawing.sorting.is_empty() {
        visible.sort_by(|a, b| drawing.compare(a, b));
    }

    visible.into_iter().map(|r| r.id).collect()
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn renderer(
        ids: &mut SlotMap<RendererId, ()>,
        layer: u8,
        queue: u32,
        distance: f32,
    ) -> VisibleRenderer {
        VisibleRenderer {
            render_queue: queue,
            distance,
            ..VisibleRenderer::new(ids.insert(()), layer)
        }
    }

    #[test]
    fn test_layer_and_tag_filtering() {
        let mut ids = SlotMap::with_key();
        let on_layer = renderer(&mut ids, 3, 2000, 1.0);
        let off_layer = renderer(&mut ids, 4, 2000, 1.0);
        let shadow = VisibleRenderer {
            shader_tag: ShaderTag::ShadowCaster,
            ..renderer(&mut ids, 3, 2000, 1.0)
        };
        let cull: CullResults = [on_layer, off_layer, shadow].into_iter().collect();

        let drawing = DrawingSettings::with_tags(&ShaderTag::OUTLINE_TAGS, SortingCriteria::empty());
        let filtering = FilteringSettings::new(RenderQueueRange::all(), LayerMask::from_layer(3));

        assert_eq!(build_draw_list(&cull, &drawing, &filtering), vec![on_layer.id]);

        let nothing = FilteringSettings::new(RenderQueueRange::all(), LayerMask::NOTHING);
        assert!(build_draw_list(&cull, &drawing, &nothing).is_empty());
    }

    #[test]
    fn test_opaque_sort_is_queue_then_front_to_back() {
        let mut ids = SlotMap::with_key();
        let far = renderer(&mut ids, 0, 2000, 10.0);
        let near = renderer(&mut ids, 0, 2000, 1.0);
        let alpha_test = renderer(&mut ids, 0, 2450, 0.5);
        let cull: CullResults = [alpha_test, far, near].into_iter().collect();

        let drawing = DrawingSettings::new(ShaderTag::UniversalForward, SortingCriteria::COMMON_OPAQUE);
        let list = build_draw_list(&cull, &drawing, &FilteringSettings::new(RenderQueueRange::all(), LayerMask::EVERYTHING));
        assert_eq!(list, vec![near.id, far.id, alpha_test.id]);

        let back_to_front = DrawingSettings::new(ShaderTag::UniversalForward, SortingCriteria::BACK_TO_FRONT);
        let list = build_draw_list(&cull, &back_to_front, &FilteringSettings::new(RenderQueueRange::all(), LayerMask::EVERYTHING));
        assert_eq!(list, vec![far.id, near.id, alpha_test.id]);
    }

    #[test]
    fn test_render_queue_range() {
        let mut ids = SlotMap::with_key();
        let opaque = renderer(&mut ids, 0, RenderQueueRange::GEOMETRY, 1.0);
        let transparent = renderer(&mut ids, 0, RenderQueueRange::TRANSPARENT, 1.0);
        let cull: CullResults = [opaque, transparent].into_iter().collect();

        let drawing = DrawingSettings::new(ShaderTag::UniversalForward, SortingCriteria::empty());
        let filtering = FilteringSettings::new(RenderQueueRange::opaque(), LayerMask::EVERYTHING);
        assert_eq!(build_draw_list(&cull, &drawing, &filtering), vec![opaque.id]);
    }
}
