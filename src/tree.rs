// ============================================================================
// LAYER TREE — arena of nodes, invalidation and projection refresh
// ============================================================================

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::error::{MergeError, MergeResult};
use crate::filter::FilterRegistry;
use crate::geometry::Rect;
use crate::merge::MergeVisitor;
use crate::node::{LayerNode, NodeId, NodeKind};
use crate::tiles::PixelBuffer;

/// Owns every node of a document.  The root is always a group.
pub struct LayerTree {
    nodes: SlotMap<NodeId, LayerNode>,
    root: NodeId,
    /// Groups and clones whose projection is being refreshed right now,
    /// innermost last.  Seeing one again means a clone cycle.
    refreshing: Vec<NodeId>,
}

impl Default for LayerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(LayerNode::group("root"));
        Self { nodes, root, refreshing: Vec::new() }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&LayerNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut LayerNode> {
        self.nodes.get_mut(id)
    }

    /// Children of a group, bottom to top.  Empty for other kinds.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Group { children }) => children.as_slice(),
            _ => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(LayerNode::parent)
    }

    /// Add `node` on top of `parent`'s children.
    pub fn add_node(&mut self, parent: NodeId, node: LayerNode) -> MergeResult<NodeId> {
        let index = self.children(parent).len();
        self.insert_node(parent, index, node)
    }

    /// Insert `node` among `parent`'s children at `index` (0 = bottom,
    /// clamped to the top).
    pub fn insert_node(&mut self, parent: NodeId, index: usize, mut node: LayerNode) -> MergeResult<NodeId> {
        let parent_node = self.nodes.get(parent).ok_or(MergeError::UnknownNode)?;
        if !matches!(parent_node.kind, NodeKind::Group { .. }) {
            return Err(MergeError::NotAGroup { node: parent_node.name.clone() });
        }
        node.parent = Some(parent);
        let id = self.nodes.insert(node);
        if let Some(NodeKind::Group { children }) = self.nodes.get_mut(parent).map(|n| &mut n.kind) {
            children.insert(index.min(children.len()), id);
        }
        self.dirty_upwards(parent);
        Ok(id)
    }

    /// The pixels other nodes see for `id`: committed paint for raster
    /// layers, the projection cache for groups, external and adjustment
    /// layers, and the source's projection for clones.
    pub fn projection(&self, id: NodeId) -> Option<&PixelBuffer> {
        let mut current = id;
        // A clone chain longer than the tree is a cycle.
        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(current)?;
            match &node.kind {
                NodeKind::Raster { paint, .. } => return Some(paint),
                NodeKind::Clone { source } => current = *source,
                _ => return node.cache.as_ref(),
            }
        }
        None
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Mark `rect` dirty on `id`, every ancestor, and every clone (and its
    /// ancestors) that shows any of them.
    pub fn invalidate(&mut self, id: NodeId, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let clones: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .filter_map(|(clone, n)| match n.kind {
                NodeKind::Clone { source } => Some((source, clone)),
                _ => None,
            })
            .collect();

        let mut pending = vec![id];
        let mut seen: Vec<NodeId> = Vec::new();
        while let Some(start) = pending.pop() {
            let mut cursor = Some(start);
            while let Some(current) = cursor {
                if seen.contains(&current) {
                    break;
                }
                seen.push(current);
                let Some(node) = self.nodes.get_mut(current) else {
                    break;
                };
                node.set_dirty(rect);
                cursor = node.parent;
                pending.extend(clones.iter().filter(|(source, _)| *source == current).map(|(_, clone)| *clone));
            }
        }
        debug!(?rect, nodes = seen.len(), "invalidated");
    }

    /// Forget every clean region.
    pub fn dirty_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.set_all_dirty();
        }
    }

    fn dirty_upwards(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get_mut(current) else {
                break;
            };
            node.set_all_dirty();
            cursor = node.parent;
        }
    }

    /// Finish the stroke in progress on `id` and invalidate what it touched.
    pub fn end_stroke(&mut self, id: NodeId, commit: bool) -> MergeResult<Rect> {
        let rect = self.nodes.get_mut(id).ok_or(MergeError::UnknownNode)?.end_stroke(commit);
        self.invalidate(id, rect);
        Ok(rect)
    }

    // ========================================================================
    // PROJECTION REFRESH
    // ========================================================================

    /// Bring the projection of `id` up to date over `rect`.
    ///
    /// Groups recomposite their children, external layers re-render their
    /// document, clones refresh their source.  Raster and adjustment layers
    /// have nothing to refresh.  Already-clean rects are left alone.
    pub fn refresh_projection(&mut self, id: NodeId, rect: Rect, filters: &FilterRegistry) -> MergeResult<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let node = self.nodes.get(id).ok_or(MergeError::UnknownNode)?;
        match &node.kind {
            NodeKind::Raster { .. } | NodeKind::Adjustment { .. } => Ok(()),
            NodeKind::Group { children } => {
                if node.cache.is_some() && node.is_clean(rect) {
                    return Ok(());
                }
                let children = children.clone();
                self.guarded(id, |tree| tree.refresh_group(id, &children, rect, filters))
            }
            NodeKind::External { .. } => self.refresh_external(id, rect),
            NodeKind::Clone { source } => {
                let source = *source;
                self.guarded(id, |tree| tree.refresh_projection(source, rect, filters))
            }
        }
    }

    /// Recompute the whole document over `rect` and return the root's
    /// projection.
    pub fn recompute(&mut self, rect: Rect, filters: &FilterRegistry) -> MergeResult<&PixelBuffer> {
        debug!(?rect, "recomputing document");
        let root = self.root;
        self.refresh_projection(root, rect, filters)?;
        let node = self.nodes.get_mut(root).ok_or(MergeError::UnknownNode)?;
        node.set_clean(rect);
        Ok(&*node.cache.get_or_insert_with(PixelBuffer::new))
    }

    fn guarded(&mut self, id: NodeId, refresh: impl FnOnce(&mut Self) -> MergeResult<()>) -> MergeResult<()> {
        if self.refreshing.contains(&id) {
            let name = self.nodes.get(id).map(|n| n.name.clone()).unwrap_or_default();
            warn!(node = %name, "clone cycle");
            return Err(MergeError::CloneCycle { node: name });
        }
        self.refreshing.push(id);
        let result = refresh(self);
        self.refreshing.pop();
        result
    }

    fn refresh_group(&mut self, id: NodeId, children: &[NodeId], rect: Rect, filters: &FilterRegistry) -> MergeResult<()> {
        // The cache is moved out while the children are composited into it,
        // so the visitor can hold it alongside `&mut self`.
        let mut cache = self.nodes.get_mut(id).and_then(|n| n.cache.take()).unwrap_or_default();
        cache.clear_rect(rect);

        let mut result = Ok(());
        for &child in children {
            // Each child gets the full rect; an adjustment narrowing its
            // visitor's rect must not hide the layers above it.
            let mut visitor = MergeVisitor::new(&mut cache, rect, filters);
            if let Err(err) = visitor.visit(self, child) {
                result = Err(err);
                break;
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.cache = Some(cache);
        }
        result
    }

    /// Re-render the part of `rect` the embedded document covers.  The cache
    /// never extends past the document's bounds.
    fn refresh_external(&mut self, id: NodeId, rect: Rect) -> MergeResult<()> {
        let node = self.nodes.get_mut(id).ok_or(MergeError::UnknownNode)?;
        let LayerNode { kind, cache, clean, .. } = node;
        let NodeKind::External { document: Some(document) } = kind else {
            return Ok(());
        };
        let rect = rect & document.bounds();
        if rect.is_empty() || (cache.is_some() && clean.contains_rect(&rect)) {
            return Ok(());
        }
        let cache = cache.get_or_insert_with(PixelBuffer::new);
        cache.clear_rect(rect);
        document.render(rect, cache)
    }
}
