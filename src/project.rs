use std::path::Path;

use image::RgbaImage;
use uuid::Uuid;

use crate::blend::BlendMode;
use crate::compositor::Compositor;
use crate::error::MergeResult;
use crate::filter::FilterRegistry;
use crate::geometry::Rect;
use crate::node::{EmbeddedDocument, LayerNode, NodeId};
use crate::tiles::PixelBuffer;
use crate::tree::LayerTree;

/// A layer tree plus the filters it can resolve, identified by a uuid.
///
/// A document is also an [`EmbeddedDocument`], so one document can be shown
/// inside another through an external layer.
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    tree: LayerTree,
    filters: FilterRegistry,
}

impl Document {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            width,
            height,
            tree: LayerTree::new(),
            filters: FilterRegistry::with_builtins(),
        }
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut LayerTree {
        &mut self.tree
    }

    /// Canvas area.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn add_layer(&mut self, parent: NodeId, node: LayerNode) -> MergeResult<NodeId> {
        self.tree.add_node(parent, node)
    }

    /// Decode `path` into a raster layer on top of `parent`, growing the
    /// canvas to fit it.
    pub fn add_image_layer(&mut self, parent: NodeId, path: &Path) -> MergeResult<NodeId> {
        let image = image::open(path)?.to_rgba8();
        self.width = self.width.max(image.width());
        self.height = self.height.max(image.height());
        let paint = PixelBuffer::from_rgba_image(0, 0, &image);
        tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "loaded layer");
        self.add_layer(parent, LayerNode::raster(file_name(path), paint))
    }

    /// Recompute `rect` of the whole document.
    pub fn recompute(&mut self, rect: Rect) -> MergeResult<&PixelBuffer> {
        self.tree.recompute(rect, &self.filters)
    }

    /// The flattened canvas as a flat image.
    pub fn flatten(&mut self) -> MergeResult<RgbaImage> {
        let bounds = self.bounds();
        Ok(self.recompute(bounds)?.read_rect(bounds))
    }
}

/// Renders the document clipped to its canvas; nothing outside
/// [`Document::bounds`] is written to the target.
impl EmbeddedDocument for Document {
    fn render(&mut self, rect: Rect, target: &mut PixelBuffer) -> MergeResult<()> {
        let rect = rect & self.bounds();
        if rect.is_empty() {
            return Ok(());
        }
        tracing::debug!(document = %self.id, ?rect, "rendering embedded document");
        let projection = self.tree.recompute(rect, &self.filters)?;
        Compositor::new(BlendMode::Copy).blit(target, rect.top_left(), projection, rect);
        Ok(())
    }

    fn bounds(&self) -> Rect {
        Document::bounds(self)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
