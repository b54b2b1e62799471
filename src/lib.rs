//! Layer-tree compositing.
//!
//! A document is a tree of layers (raster, external, group, adjustment and
//! clone) whose flattened "projection" is recomputed one dirty rectangle at
//! a time.  [`MergeVisitor`] composites each node into a shared destination
//! with the node's blend mode, opacity and channel flags, honouring
//! in-progress strokes ([`StrokeOverlay`]) and selection-restricted
//! filtering, and marks exactly the composited rectangle clean.
//!
//! ```no_run
//! use image::Rgba;
//! use layer_merge::{FilterRegistry, LayerNode, LayerTree, MergeVisitor, PixelBuffer, Rect};
//!
//! let filters = FilterRegistry::with_builtins();
//! let mut tree = LayerTree::new();
//! let root = tree.root();
//! let red = tree.add_node(root, LayerNode::raster("red", PixelBuffer::filled(Rect::new(0, 0, 10, 10), Rgba([255, 0, 0, 255])))).unwrap();
//! let blue = tree.add_node(root, LayerNode::raster("blue", PixelBuffer::filled(Rect::new(0, 0, 10, 10), Rgba([0, 0, 255, 255])))).unwrap();
//!
//! let mut projection = PixelBuffer::new();
//! let mut visitor = MergeVisitor::new(&mut projection, Rect::new(0, 0, 10, 10), &filters);
//! visitor.visit(&mut tree, red).unwrap();
//! visitor.visit(&mut tree, blue).unwrap();
//! ```

pub mod blend;
pub mod compositor;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod indirect;
pub mod logger;
pub mod merge;
pub mod node;
pub mod ops;
pub mod project;
pub mod selection;
pub mod tiles;
pub mod tree;

pub use blend::{BlendMode, ChannelFlags, OPACITY_OPAQUE, OPACITY_TRANSPARENT, Opacity, blend_pixel};
pub use compositor::{Compositor, blit, blit_masked};
pub use error::{MergeError, MergeResult};
pub use filter::{BufferSnapshot, FilterConfiguration, FilterRegistry, FilterStep, ParamValue, apply_filter};
pub use geometry::{Rect, Region};
pub use indirect::{IndirectPainting, StrokeOverlay, paint_indirect, paint_indirect_mask};
pub use merge::{MergeVisitor, SkipReason, Visit};
pub use node::{EmbeddedDocument, LayerNode, NodeId, NodeKind};
pub use project::Document;
pub use selection::{SelectionMask, SelectionMode, SelectionShape};
pub use tiles::PixelBuffer;
pub use tree::LayerTree;
