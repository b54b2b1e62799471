// ============================================================================
// LAYER NODES — the five layer kinds and their shared state
// ============================================================================

use slotmap::new_key_type;

use crate::blend::{BlendMode, ChannelFlags, OPACITY_OPAQUE, Opacity};
use crate::error::MergeResult;
use crate::filter::FilterConfiguration;
use crate::geometry::{Rect, Region};
use crate::indirect::StrokeOverlay;
use crate::selection::SelectionMask;
use crate::tiles::PixelBuffer;

new_key_type! {
    /// Handle to a node in a [`crate::tree::LayerTree`].
    pub struct NodeId;
}

/// Content rendered by an external (embedded document) layer.
pub trait EmbeddedDocument: Send {
    /// Render `rect` of the document into `target`, overwriting what is there.
    fn render(&mut self, rect: Rect, target: &mut PixelBuffer) -> MergeResult<()>;

    /// Area the document can paint into.
    fn bounds(&self) -> Rect;
}

/// Per-kind data of a layer node.
pub enum NodeKind {
    /// Committed pixels plus an optional in-progress stroke.
    Raster {
        paint: PixelBuffer,
        overlay: Option<StrokeOverlay>,
    },
    /// Pixels produced by an embedded document.  `None` means the layer has
    /// nothing to render from.
    External {
        document: Option<Box<dyn EmbeddedDocument>>,
    },
    /// Children ordered bottom to top.
    Group { children: Vec<NodeId> },
    /// Filters everything below it.  An in-progress stroke on an adjustment
    /// layer paints into its selection.
    Adjustment {
        filter: Option<FilterConfiguration>,
        selection: Option<SelectionMask>,
        overlay: Option<StrokeOverlay>,
    },
    /// Re-composites another node's projection with its own settings.
    Clone { source: NodeId },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Raster { .. } => "raster",
            NodeKind::External { .. } => "external",
            NodeKind::Group { .. } => "group",
            NodeKind::Adjustment { .. } => "adjustment",
            NodeKind::Clone { .. } => "clone",
        }
    }
}

/// One layer: shared compositing settings, a lazily allocated projection
/// cache and the clean region of that cache.
///
/// Inside the clean region the cache holds the fully composited result of
/// the node; elsewhere its content is undefined.
pub struct LayerNode {
    pub name: String,
    pub visible: bool,
    pub opacity: Opacity,
    pub blend_mode: BlendMode,
    pub channels: ChannelFlags,
    pub kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) cache: Option<PixelBuffer>,
    pub(crate) clean: Region,
}

impl LayerNode {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            visible: true,
            opacity: OPACITY_OPAQUE,
            blend_mode: BlendMode::Normal,
            channels: ChannelFlags::all(),
            kind,
            parent: None,
            cache: None,
            clean: Region::new(),
        }
    }

    pub fn raster(name: impl Into<String>, paint: PixelBuffer) -> Self {
        Self::with_kind(name, NodeKind::Raster { paint, overlay: None })
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group { children: Vec::new() })
    }

    pub fn adjustment(name: impl Into<String>, filter: Option<FilterConfiguration>) -> Self {
        Self::with_kind(name, NodeKind::Adjustment { filter, selection: None, overlay: None })
    }

    pub fn clone_of(name: impl Into<String>, source: NodeId) -> Self {
        Self::with_kind(name, NodeKind::Clone { source })
    }

    pub fn external(name: impl Into<String>, document: Box<dyn EmbeddedDocument>) -> Self {
        Self::with_kind(name, NodeKind::External { document: Some(document) })
    }

    /// External layer with no document behind it.
    pub fn detached_external(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::External { document: None })
    }

    // ---- builders -----------------------------------------------------------

    pub fn with_opacity(mut self, opacity: Opacity) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_channels(mut self, channels: ChannelFlags) -> Self {
        self.channels = channels;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Restrict an adjustment layer to `selection`.  No effect on other kinds.
    pub fn with_selection(mut self, mask: SelectionMask) -> Self {
        if let NodeKind::Adjustment { selection, .. } = &mut self.kind {
            *selection = Some(mask);
        }
        self
    }

    // ---- accessors ----------------------------------------------------------

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The projection cache of group, external and adjustment layers, if one
    /// has been allocated.
    pub fn cached_projection(&self) -> Option<&PixelBuffer> {
        self.cache.as_ref()
    }

    /// Committed pixels of a raster layer.
    pub fn paint(&self) -> Option<&PixelBuffer> {
        match &self.kind {
            NodeKind::Raster { paint, .. } => Some(paint),
            _ => None,
        }
    }

    pub fn paint_mut(&mut self) -> Option<&mut PixelBuffer> {
        match &mut self.kind {
            NodeKind::Raster { paint, .. } => Some(paint),
            _ => None,
        }
    }

    // ---- clean / dirty ------------------------------------------------------

    pub fn clean_region(&self) -> &Region {
        &self.clean
    }

    pub fn is_clean(&self, rect: Rect) -> bool {
        self.clean.contains_rect(&rect)
    }

    pub fn set_clean(&mut self, rect: Rect) {
        self.clean.add(rect);
    }

    pub fn set_dirty(&mut self, rect: Rect) {
        self.clean.remove(rect);
    }

    pub fn set_all_dirty(&mut self) {
        self.clean.clear();
    }

    // ---- indirect painting --------------------------------------------------

    /// Start a stroke on a raster or adjustment layer and return the buffer
    /// to paint it into.  Any stroke already in progress is discarded.
    /// Other kinds cannot be painted on and return `None`.
    pub fn begin_stroke(&mut self, blend_mode: BlendMode, opacity: Opacity) -> Option<&mut PixelBuffer> {
        match &mut self.kind {
            NodeKind::Raster { overlay, .. } | NodeKind::Adjustment { overlay, .. } => {
                Some(overlay.insert(StrokeOverlay::new(blend_mode, opacity)).buffer_mut())
            }
            _ => None,
        }
    }

    pub fn stroke(&self) -> Option<&StrokeOverlay> {
        match &self.kind {
            NodeKind::Raster { overlay, .. } | NodeKind::Adjustment { overlay, .. } => overlay.as_ref(),
            _ => None,
        }
    }

    pub fn stroke_buffer_mut(&mut self) -> Option<&mut PixelBuffer> {
        match &mut self.kind {
            NodeKind::Raster { overlay, .. } | NodeKind::Adjustment { overlay, .. } => {
                overlay.as_mut().map(StrokeOverlay::buffer_mut)
            }
            _ => None,
        }
    }

    /// Finish the stroke in progress.  With `commit` the stroke is merged
    /// into the layer (raster: committed pixels; adjustment: selection
    /// weights), otherwise it is dropped.  Returns the area whose composite
    /// changed, empty when there was no stroke.
    pub fn end_stroke(&mut self, commit: bool) -> Rect {
        match &mut self.kind {
            NodeKind::Raster { paint, overlay } => match overlay.take() {
                Some(stroke) if commit => stroke.commit_into(paint),
                Some(stroke) => stroke.buffer().extent(),
                None => Rect::EMPTY,
            },
            NodeKind::Adjustment { selection, overlay, .. } => match overlay.take() {
                Some(stroke) if commit => {
                    let mask = selection.get_or_insert_with(|| SelectionMask::new(Rect::EMPTY));
                    stroke.commit_into_mask(mask)
                }
                Some(stroke) => stroke.buffer().extent(),
                None => Rect::EMPTY,
            },
            _ => Rect::EMPTY,
        }
    }
}
