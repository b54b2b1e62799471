// ============================================================================
// MERGE VISITOR — composites one layer at a time into a shared projection
// ============================================================================
//
// The caller picks a dirty rect, binds a visitor to the destination and the
// rect, then visits nodes bottom to top.  Each visit reads the node's
// up-to-date pixels (refreshing groups, external layers and clone sources
// first), composites them for the rect and marks exactly the composited
// sub-rectangle clean on the node.  A visit that fails does so before
// touching the destination, and the node is not marked clean.

use tracing::{debug, trace, warn};

use crate::blend::BlendMode;
use crate::compositor::Compositor;
use crate::error::{MergeError, MergeResult};
use crate::filter::{FilterConfiguration, FilterRegistry, apply_filter};
use crate::geometry::Rect;
use crate::indirect::{StrokeOverlay, paint_indirect, paint_indirect_mask};
use crate::node::{LayerNode, NodeId, NodeKind};
use crate::selection::SelectionMask;
use crate::tiles::PixelBuffer;
use crate::tree::LayerTree;

/// Why a visit left the destination alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The layer is hidden.
    Hidden,
    /// An adjustment layer was visited without a destination.
    NoProjection,
    /// Nothing of the layer falls inside the working rect.
    EmptyRect,
    /// The adjustment layer's selection misses the working rect.
    EmptySelection,
    /// The layer has no pixels to read (e.g. an external layer without a
    /// document).
    NoSource,
}

/// Outcome of a successful visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// The destination was updated over this rect, now clean on the node.
    Composited(Rect),
    Skipped(SkipReason),
}

impl Visit {
    pub fn composited_rect(&self) -> Option<Rect> {
        match self {
            Visit::Composited(rect) => Some(*rect),
            Visit::Skipped(_) => None,
        }
    }
}

/// Composites nodes into one destination for one rect.
pub struct MergeVisitor<'a> {
    projection: Option<&'a mut PixelBuffer>,
    rect: Rect,
    filters: &'a FilterRegistry,
}

impl<'a> MergeVisitor<'a> {
    pub fn new(projection: &'a mut PixelBuffer, rect: Rect, filters: &'a FilterRegistry) -> Self {
        Self { projection: Some(projection), rect, filters }
    }

    /// A visitor with no destination.  Raster, external, group and clone
    /// visits fail; adjustment visits are skipped.
    pub fn detached(rect: Rect, filters: &'a FilterRegistry) -> Self {
        Self { projection: None, rect, filters }
    }

    /// The working rect.  An adjustment layer with a stroke in progress
    /// narrows it for every later visit.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Visit `ids` in order, stopping at the first failure.
    pub fn visit_all(&mut self, tree: &mut LayerTree, ids: &[NodeId]) -> MergeResult<Vec<Visit>> {
        ids.iter().map(|&id| self.visit(tree, id)).collect()
    }

    /// Composite one node into the destination.
    pub fn visit(&mut self, tree: &mut LayerTree, id: NodeId) -> MergeResult<Visit> {
        let filters = self.filters;
        let node = tree.node(id).ok_or(MergeError::UnknownNode)?;

        let Some(projection) = self.projection.as_deref_mut() else {
            if let NodeKind::Adjustment { .. } = node.kind {
                debug!(node = %node.name, "no destination, skipping adjustment");
                return Ok(Visit::Skipped(SkipReason::NoProjection));
            }
            warn!(node = %node.name, kind = node.kind.name(), "no destination projection");
            return Err(MergeError::MissingProjection { node: node.name.clone() });
        };
        if !node.visible {
            trace!(node = %node.name, "hidden");
            return Ok(Visit::Skipped(SkipReason::Hidden));
        }

        debug!(node = %node.name, kind = node.kind.name(), rect = ?self.rect, "visiting");
        let visit = match &node.kind {
            NodeKind::Raster { paint, overlay } => composite_raster(projection, self.rect, node, paint, overlay.as_ref()),
            NodeKind::External { .. } | NodeKind::Group { .. } | NodeKind::Clone { .. } => {
                composite_projection(projection, self.rect, tree, id, filters)?
            }
            NodeKind::Adjustment { filter, selection, overlay } => apply_adjustment(
                projection,
                &mut self.rect,
                node,
                filter.as_ref(),
                selection.as_ref(),
                overlay.as_ref(),
                filters,
            )?,
        };

        if let Visit::Composited(rc) = visit {
            let node = tree.node_mut(id).ok_or(MergeError::UnknownNode)?;
            if let NodeKind::Adjustment { .. } = node.kind {
                let cache = node.cache.get_or_insert_with(PixelBuffer::new);
                Compositor::new(BlendMode::Copy).blit(cache, rc.top_left(), projection, rc);
            }
            node.set_clean(rc);
        }
        Ok(visit)
    }
}

/// Blit `rc` of `source` with the node's own mode, opacity and channels.
fn composite_node(projection: &mut PixelBuffer, node: &LayerNode, source: &PixelBuffer, rc: Rect) -> Visit {
    if rc.is_empty() {
        return Visit::Skipped(SkipReason::EmptyRect);
    }
    Compositor::new(node.blend_mode)
        .with_opacity(node.opacity)
        .with_channels(node.channels)
        .blit(projection, rc.top_left(), source, rc);
    Visit::Composited(rc)
}

fn composite_raster(
    projection: &mut PixelBuffer,
    rect: Rect,
    node: &LayerNode,
    paint: &PixelBuffer,
    overlay: Option<&StrokeOverlay>,
) -> Visit {
    match overlay {
        Some(stroke) => {
            let rc = (paint.extent() | stroke.buffer().extent()) & rect;
            let mut merged = PixelBuffer::new();
            paint_indirect(paint, &mut merged, stroke, rc);
            composite_node(projection, node, &merged, rc)
        }
        None => composite_node(projection, node, paint, paint.extent() & rect),
    }
}

/// Group, external and clone layers: refresh the node's projection for the
/// rect, then composite it.
fn composite_projection(
    projection: &mut PixelBuffer,
    rect: Rect,
    tree: &mut LayerTree,
    id: NodeId,
    filters: &FilterRegistry,
) -> MergeResult<Visit> {
    tree.refresh_projection(id, rect, filters)?;
    let node = tree.node(id).ok_or(MergeError::UnknownNode)?;
    let Some(source) = tree.projection(id) else {
        trace!(node = %node.name, "no source pixels");
        return Ok(Visit::Skipped(SkipReason::NoSource));
    };
    Ok(composite_node(projection, node, source, source.extent() & rect))
}

fn apply_adjustment(
    projection: &mut PixelBuffer,
    rect: &mut Rect,
    node: &LayerNode,
    filter: Option<&FilterConfiguration>,
    selection: Option<&SelectionMask>,
    overlay: Option<&StrokeOverlay>,
    filters: &FilterRegistry,
) -> MergeResult<Visit> {
    if let Some(stroke) = overlay {
        let node_extent = selection.map_or_else(|| projection.extent(), SelectionMask::bounds);
        *rect = (node_extent | stroke.buffer().extent()) & *rect;
    }
    let rc = *rect;
    if rc.is_empty() {
        return Ok(Visit::Skipped(SkipReason::EmptyRect));
    }

    let Some(config) = filter else {
        warn!(node = %node.name, "adjustment layer without filter configuration");
        return Err(MergeError::MissingFilterConfiguration { node: node.name.clone() });
    };
    let Some(step) = filters.resolve(config.name()) else {
        warn!(node = %node.name, filter = config.name(), "unknown filter");
        return Err(MergeError::UnknownFilter { name: config.name().to_string() });
    };

    // Scratch holding what the filter runs over: only the selected bits when
    // there is a selection, the whole destination otherwise.
    let (mut scratch, merged_selection) = match selection {
        Some(mask) => {
            let selected = mask.selected_rect() & rc;
            if selected.is_empty() {
                return Ok(Visit::Skipped(SkipReason::EmptySelection));
            }
            let (sx, sy) = mask.origin();
            let mut scratch = PixelBuffer::with_offset(sx, sy);
            Compositor::new(BlendMode::Copy).blit(&mut scratch, selected.top_left(), projection, selected);
            let merged = overlay.map(|stroke| paint_indirect_mask(mask, stroke, rc));
            (scratch, merged)
        }
        None => (projection.duplicate(), None),
    };

    apply_filter(step.as_ref(), &mut scratch, rc, config);

    let over = Compositor::new(BlendMode::OVER).with_opacity(node.opacity);
    match merged_selection.as_ref().or(selection) {
        Some(mask) => over.blit_masked(projection, rc.top_left(), &scratch, mask, rc),
        None => over.blit(projection, rc.top_left(), &scratch, rc),
    }
    Ok(Visit::Composited(rc))
}
