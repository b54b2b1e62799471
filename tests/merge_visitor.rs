use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::Rgba;
use layer_merge::{
    BlendMode, ChannelFlags, Document, EmbeddedDocument, FilterConfiguration, FilterRegistry, LayerNode, LayerTree,
    MergeError, MergeResult, MergeVisitor, NodeId, PixelBuffer, Rect, Region, SelectionMask, SkipReason, Visit,
};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn solid(rect: Rect, color: Rgba<u8>) -> PixelBuffer {
    PixelBuffer::filled(rect, color)
}

fn gradient(rect: Rect) -> PixelBuffer {
    let mut buffer = PixelBuffer::new();
    for y in rect.rows() {
        for x in rect.columns() {
            buffer.put_pixel(x, y, Rgba([(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8, 255]));
        }
    }
    buffer
}

fn add(tree: &mut LayerTree, node: LayerNode) -> NodeId {
    let root = tree.root();
    tree.add_node(root, node).unwrap()
}

/// Renders a solid colour over its bounds and counts render calls.
struct SolidDocument {
    bounds: Rect,
    color: Rgba<u8>,
    renders: Arc<AtomicUsize>,
}

impl EmbeddedDocument for SolidDocument {
    fn render(&mut self, rect: Rect, target: &mut PixelBuffer) -> MergeResult<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        target.fill_rect(rect & self.bounds, self.color);
        Ok(())
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }
}

// ============================================================================
// Compositing properties
// ============================================================================

#[test]
fn red_under_blue_gives_solid_blue() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 10, 10);
    let red = add(&mut tree, LayerNode::raster("red", solid(rect, RED)));
    let blue = add(&mut tree, LayerNode::raster("blue", solid(rect, BLUE)));

    let mut dst = PixelBuffer::new();
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    assert_eq!(visitor.visit(&mut tree, red).unwrap(), Visit::Composited(rect));
    assert_eq!(visitor.visit(&mut tree, blue).unwrap(), Visit::Composited(rect));

    assert!(dst.same_pixels(&solid(rect, BLUE), rect));
    assert_eq!(tree.node(red).unwrap().clean_region(), &Region::from_rect(rect));
    assert_eq!(tree.node(blue).unwrap().clean_region(), &Region::from_rect(rect));
}

#[test]
fn opaque_over_replaces_covered_pixels() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 40, 40);
    let bottom = add(&mut tree, LayerNode::raster("bottom", gradient(rect)));
    let top = add(&mut tree, LayerNode::raster("top", solid(Rect::new(10, 10, 20, 20), BLUE)));

    let mut dst = PixelBuffer::new();
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    visitor.visit_all(&mut tree, &[bottom, top]).unwrap();

    assert_eq!(dst.pixel(10, 10), BLUE);
    assert_eq!(dst.pixel(29, 29), BLUE);
    assert_eq!(dst.pixel(9, 9), gradient(rect).pixel(9, 9));
}

#[test]
fn copy_at_full_opacity_reproduces_source() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(-20, -20, 90, 90);
    let mut source = gradient(rect);
    source.clear_rect(Rect::new(0, 0, 10, 10));
    let id = add(&mut tree, LayerNode::raster("copy", source.clone()).with_blend_mode(BlendMode::Copy));

    let mut dst = solid(rect, WHITE);
    MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert!(dst.same_pixels(&source, rect));
    assert_eq!(dst.pixel(5, 5), CLEAR);
}

#[test]
fn zero_opacity_or_no_channels_leave_destination() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 30, 30);
    let faded = add(&mut tree, LayerNode::raster("faded", gradient(rect)).with_opacity(0));
    let masked = add(&mut tree, LayerNode::raster("masked", gradient(rect)).with_channels(ChannelFlags::empty()));

    let mut dst = solid(rect, WHITE);
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    visitor.visit(&mut tree, faded).unwrap();
    visitor.visit(&mut tree, masked).unwrap();
    assert!(dst.same_pixels(&solid(rect, WHITE), rect));
}

#[test]
fn channel_flags_limit_written_channels() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 4, 4);
    let id = add(&mut tree, LayerNode::raster("r", solid(rect, BLUE)).with_channels(ChannelFlags::BLUE));

    let mut dst = solid(rect, RED);
    MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert_eq!(dst.pixel(0, 0), Rgba([255, 0, 255, 255]));
}

#[test]
fn clean_region_grows_by_visited_part_of_extent() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let id = add(&mut tree, LayerNode::raster("r", solid(Rect::new(0, 0, 10, 10), RED)));
    tree.node_mut(id).unwrap().set_clean(Rect::new(20, 20, 5, 5));

    let mut dst = PixelBuffer::new();
    let visit = MergeVisitor::new(&mut dst, Rect::new(5, 5, 10, 10), &filters).visit(&mut tree, id).unwrap();
    assert_eq!(visit, Visit::Composited(Rect::new(5, 5, 5, 5)));

    let mut expected = Region::from_rect(Rect::new(20, 20, 5, 5));
    expected.add(Rect::new(5, 5, 5, 5));
    assert_eq!(tree.node(id).unwrap().clean_region(), &expected);
    assert_eq!(dst.pixel(4, 4), CLEAR);
    assert_eq!(dst.pixel(5, 5), RED);
}

#[test]
fn stroke_outside_committed_paint_widens_composited_rect() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let id = add(&mut tree, LayerNode::raster("r", solid(Rect::new(0, 0, 10, 10), RED)));
    if let Some(stroke) = tree.node_mut(id).unwrap().begin_stroke(BlendMode::Normal, 255) {
        stroke.fill_rect(Rect::new(8, 8, 6, 6), BLUE);
    }

    let mut dst = PixelBuffer::new();
    let visit = MergeVisitor::new(&mut dst, Rect::new(0, 0, 20, 20), &filters).visit(&mut tree, id).unwrap();
    assert_eq!(visit, Visit::Composited(Rect::new(0, 0, 14, 14)));
    assert_eq!(dst.pixel(13, 13), BLUE);
    assert_eq!(dst.pixel(9, 9), BLUE);
    assert_eq!(dst.pixel(2, 2), RED);
    assert_eq!(dst.pixel(14, 14), CLEAR);
    assert_eq!(tree.node(id).unwrap().clean_region(), &Region::from_rect(Rect::new(0, 0, 14, 14)));
    // The stroke is still uncommitted.
    assert_eq!(tree.node(id).unwrap().paint().unwrap().extent(), Rect::new(0, 0, 10, 10));
}

#[test]
fn hidden_layers_are_skipped() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 8, 8);
    let raster = add(&mut tree, LayerNode::raster("r", solid(rect, RED)).hidden());
    let adjustment = add(&mut tree, LayerNode::adjustment("a", Some(FilterConfiguration::new("invert"))).hidden());

    let mut dst = solid(rect, WHITE);
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    assert_eq!(visitor.visit(&mut tree, raster).unwrap(), Visit::Skipped(SkipReason::Hidden));
    assert_eq!(visitor.visit(&mut tree, adjustment).unwrap(), Visit::Skipped(SkipReason::Hidden));
    assert!(dst.same_pixels(&solid(rect, WHITE), rect));
    assert!(tree.node(raster).unwrap().clean_region().is_empty());
}

#[test]
fn missing_destination_fails_except_for_adjustments() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 8, 8);
    let raster = add(&mut tree, LayerNode::raster("r", solid(rect, RED)));
    let group = add(&mut tree, LayerNode::group("g"));
    let clone = add(&mut tree, LayerNode::clone_of("c", raster));
    let external = add(&mut tree, LayerNode::detached_external("e"));
    let adjustment = add(&mut tree, LayerNode::adjustment("a", None));

    let mut visitor = MergeVisitor::detached(rect, &filters);
    for id in [raster, group, clone, external] {
        assert!(matches!(visitor.visit(&mut tree, id), Err(MergeError::MissingProjection { .. })));
        assert!(tree.node(id).unwrap().clean_region().is_empty());
    }
    assert_eq!(visitor.visit(&mut tree, adjustment).unwrap(), Visit::Skipped(SkipReason::NoProjection));
}

// ============================================================================
// Adjustment layers
// ============================================================================

#[test]
fn adjustment_without_configuration_fails_without_touching_destination() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 16, 16);
    let id = add(&mut tree, LayerNode::adjustment("a", None));

    let mut dst = gradient(rect);
    let result = MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id);
    assert!(matches!(result, Err(MergeError::MissingFilterConfiguration { .. })));
    assert!(dst.same_pixels(&gradient(rect), rect));
    assert!(tree.node(id).unwrap().clean_region().is_empty());
}

#[test]
fn adjustment_with_unknown_filter_fails() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 16, 16);
    let id = add(&mut tree, LayerNode::adjustment("a", Some(FilterConfiguration::new("no_such_filter"))));

    let mut dst = gradient(rect);
    let result = MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id);
    assert!(matches!(result, Err(MergeError::UnknownFilter { ref name }) if name == "no_such_filter"));
    assert!(dst.same_pixels(&gradient(rect), rect));
}

#[test]
fn adjustment_filters_whole_rect_without_selection() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 16, 16);
    let id = add(&mut tree, LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert"))));

    let mut dst = solid(Rect::new(0, 0, 32, 32), WHITE);
    let visit = MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert_eq!(visit, Visit::Composited(rect));
    assert_eq!(dst.pixel(0, 0), BLACK);
    assert_eq!(dst.pixel(15, 15), BLACK);
    assert_eq!(dst.pixel(16, 16), WHITE);

    let node = tree.node(id).unwrap();
    assert!(node.is_clean(rect));
    assert_eq!(node.cached_projection().unwrap().pixel(3, 3), BLACK);
}

#[test]
fn adjustment_selection_restricts_filtering() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 64, 64);
    let selected = Rect::new(8, 8, 20, 12);
    let id = add(
        &mut tree,
        LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert")))
            .with_selection(SelectionMask::from_rect(selected)),
    );

    let before = gradient(rect);
    let mut dst = before.duplicate();
    MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();

    for y in rect.rows() {
        for x in rect.columns() {
            let original = before.pixel(x, y);
            if selected.contains(x, y) {
                let inverted = Rgba([255 - original[0], 255 - original[1], 255 - original[2], original[3]]);
                assert_eq!(dst.pixel(x, y), inverted, "({x}, {y})");
            } else {
                assert_eq!(dst.pixel(x, y), original, "({x}, {y})");
            }
        }
    }
}

#[test]
fn adjustment_selection_outside_rect_is_a_successful_noop() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 16, 16);
    let id = add(
        &mut tree,
        LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert")))
            .with_selection(SelectionMask::from_rect(Rect::new(100, 100, 8, 8))),
    );
    tree.node_mut(id).unwrap().set_clean(Rect::new(50, 50, 1, 1));

    let mut dst = gradient(rect);
    let visit = MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert_eq!(visit, Visit::Skipped(SkipReason::EmptySelection));
    assert!(dst.same_pixels(&gradient(rect), rect));
    assert_eq!(tree.node(id).unwrap().clean_region(), &Region::from_rect(Rect::new(50, 50, 1, 1)));
}

#[test]
fn adjustment_opacity_blends_filtered_result() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 4, 4);
    let id = add(
        &mut tree,
        LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert"))).with_opacity(0),
    );
    let mut dst = solid(rect, WHITE);
    MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert_eq!(dst.pixel(2, 2), WHITE);
}

#[test]
fn adjustment_stroke_narrows_working_rect() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let id = add(
        &mut tree,
        LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert")))
            .with_selection(SelectionMask::from_rect(Rect::new(0, 0, 4, 4))),
    );
    if let Some(stroke) = tree.node_mut(id).unwrap().begin_stroke(BlendMode::Normal, 255) {
        stroke.fill_rect(Rect::new(10, 10, 2, 2), WHITE);
    }

    let mut dst = solid(Rect::new(0, 0, 100, 100), WHITE);
    let mut visitor = MergeVisitor::new(&mut dst, Rect::new(0, 0, 100, 100), &filters);
    let visit = visitor.visit(&mut tree, id).unwrap();
    assert_eq!(visitor.rect(), Rect::new(0, 0, 12, 12));
    assert_eq!(visit, Visit::Composited(Rect::new(0, 0, 12, 12)));
    assert!(tree.node(id).unwrap().is_clean(Rect::new(0, 0, 12, 12)));
    assert!(!tree.node(id).unwrap().is_clean(Rect::new(0, 0, 13, 13)));
    assert_eq!(dst.pixel(1, 1), BLACK);
}

#[test]
fn blur_adjustment_only_writes_inside_rect() {
    let filters = FilterRegistry::with_builtins();
    let mut tree = LayerTree::new();
    let canvas = Rect::new(0, 0, 40, 40);
    let mut base_pixels = solid(canvas, WHITE);
    base_pixels.fill_rect(Rect::new(12, 12, 2, 2), BLACK);
    let base = add(&mut tree, LayerNode::raster("base", base_pixels));
    let blur = add(
        &mut tree,
        LayerNode::adjustment("blur", Some(FilterConfiguration::new("gaussian_blur").with("sigma", 2.0))),
    );

    let rect = Rect::new(10, 10, 10, 10);
    let mut dst = solid(canvas, WHITE);
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    visitor.visit_all(&mut tree, &[base, blur]).unwrap();

    // Within blur reach of the black block, but outside the rect.
    assert_eq!(dst.pixel(9, 12), WHITE);
    assert_eq!(dst.pixel(12, 9), WHITE);
    assert_ne!(dst.pixel(12, 12), BLACK);
    assert_ne!(dst.pixel(15, 12), WHITE);
}

// ============================================================================
// Group, clone and external layers
// ============================================================================

#[test]
fn group_composites_children_with_its_own_opacity() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 8, 8);
    let group = add(&mut tree, LayerNode::group("g").with_opacity(128));
    let child = tree.add_node(group, LayerNode::raster("red", solid(rect, RED))).unwrap();

    let mut dst = solid(rect, BLACK);
    let visit = MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, group).unwrap();
    assert_eq!(visit, Visit::Composited(rect));

    let px = dst.pixel(3, 3);
    assert!((127..=128).contains(&px[0]), "{px:?}");
    assert_eq!((px[1], px[2], px[3]), (0, 0, 255));

    assert_eq!(tree.node(group).unwrap().cached_projection().unwrap().pixel(3, 3), RED);
    assert!(tree.node(group).unwrap().is_clean(rect));
    assert!(tree.node(child).unwrap().is_clean(rect));
}

#[test]
fn nested_groups_match_flat_stack() {
    let filters = FilterRegistry::with_builtins();
    let rect = Rect::new(0, 0, 32, 32);

    let mut flat = LayerTree::new();
    add(&mut flat, LayerNode::raster("base", gradient(rect)));
    add(&mut flat, LayerNode::raster("top", solid(Rect::new(4, 4, 8, 8), BLUE)));
    let flat_result = flat.recompute(rect, &filters).unwrap().duplicate();

    let mut nested = LayerTree::new();
    let outer = add(&mut nested, LayerNode::group("outer"));
    let inner = nested.add_node(outer, LayerNode::group("inner")).unwrap();
    nested.add_node(inner, LayerNode::raster("base", gradient(rect))).unwrap();
    nested.add_node(outer, LayerNode::raster("top", solid(Rect::new(4, 4, 8, 8), BLUE))).unwrap();
    let nested_result = nested.recompute(rect, &filters).unwrap();

    assert!(nested_result.same_pixels(&flat_result, rect));
}

#[test]
fn clone_uses_source_pixels_with_own_settings() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 6, 6);
    let source = add(&mut tree, LayerNode::raster("blue", solid(rect, BLUE)).hidden());
    let clone = add(&mut tree, LayerNode::clone_of("copy", source).with_blend_mode(BlendMode::Multiply));

    let mut dst = solid(rect, WHITE);
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    visitor.visit_all(&mut tree, &[source, clone]).unwrap();
    assert_eq!(dst.pixel(2, 2), BLUE);
    assert!(tree.node(clone).unwrap().is_clean(rect));
}

#[test]
fn clone_follows_source_after_invalidation() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let rect = Rect::new(0, 0, 10, 10);
    let group = add(&mut tree, LayerNode::group("g").hidden());
    let paint = tree.add_node(group, LayerNode::raster("p", solid(rect, RED))).unwrap();
    add(&mut tree, LayerNode::clone_of("c", group));

    assert_eq!(tree.recompute(rect, &filters).unwrap().pixel(5, 5), RED);

    let changed = Rect::new(0, 0, 5, 5);
    tree.node_mut(paint).unwrap().paint_mut().unwrap().fill_rect(changed, BLUE);
    tree.invalidate(paint, changed);

    let projection = tree.recompute(rect, &filters).unwrap();
    assert_eq!(projection.pixel(2, 2), BLUE);
    assert_eq!(projection.pixel(7, 7), RED);
}

#[test]
fn external_layer_renders_and_reuses_clean_cache() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let renders = Arc::new(AtomicUsize::new(0));
    let document = SolidDocument { bounds: Rect::new(0, 0, 20, 20), color: RED, renders: renders.clone() };
    let id = add(&mut tree, LayerNode::external("ext", Box::new(document)));

    let rect = Rect::new(5, 5, 10, 10);
    let mut dst = PixelBuffer::new();
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    assert_eq!(visitor.visit(&mut tree, id).unwrap(), Visit::Composited(rect));
    assert_eq!(visitor.visit(&mut tree, id).unwrap(), Visit::Composited(rect));
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(dst.pixel(5, 5), RED);
    assert_eq!(dst.pixel(4, 4), CLEAR);

    tree.invalidate(id, Rect::new(5, 5, 1, 1));
    MergeVisitor::new(&mut dst, rect, &filters).visit(&mut tree, id).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
}

#[test]
fn external_layer_without_document_is_skipped() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let id = add(&mut tree, LayerNode::detached_external("empty"));
    let mut dst = PixelBuffer::new();
    let visit = MergeVisitor::new(&mut dst, Rect::new(0, 0, 4, 4), &filters).visit(&mut tree, id).unwrap();
    assert_eq!(visit, Visit::Skipped(SkipReason::NoSource));
}

#[test]
fn document_can_be_embedded_as_external_layer() {
    let mut inner = Document::new("inner", 8, 8);
    let inner_root = inner.tree().root();
    inner.add_layer(inner_root, LayerNode::raster("red", solid(Rect::new(0, 0, 8, 8), RED))).unwrap();

    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let id = add(&mut tree, LayerNode::external("embedded", Box::new(inner)));
    let projection = tree.recompute(Rect::new(0, 0, 16, 16), &filters).unwrap();
    assert_eq!(projection.pixel(7, 7), RED);
    assert_eq!(projection.pixel(8, 8), CLEAR);
    let node = tree.node(id).unwrap();
    assert_eq!(node.clean_region(), &Region::from_rect(Rect::new(0, 0, 8, 8)));
    assert_eq!(node.cached_projection().unwrap().extent(), Rect::new(0, 0, 8, 8));
}

#[test]
fn external_layer_is_clipped_to_document_bounds() {
    let filters = FilterRegistry::new();
    let mut tree = LayerTree::new();
    let renders = Arc::new(AtomicUsize::new(0));
    let document = SolidDocument { bounds: Rect::new(0, 0, 6, 6), color: BLUE, renders: renders.clone() };
    let id = add(&mut tree, LayerNode::external("ext", Box::new(document)));

    let rect = Rect::new(2, 2, 10, 10);
    let mut dst = PixelBuffer::new();
    let mut visitor = MergeVisitor::new(&mut dst, rect, &filters);
    assert_eq!(visitor.visit(&mut tree, id).unwrap(), Visit::Composited(Rect::new(2, 2, 4, 4)));
    // Clean over everything the document covers, so no second render.
    assert_eq!(visitor.visit(&mut tree, id).unwrap(), Visit::Composited(Rect::new(2, 2, 4, 4)));
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(tree.node(id).unwrap().clean_region(), &Region::from_rect(Rect::new(2, 2, 4, 4)));
    assert_eq!(dst.extent(), Rect::new(2, 2, 4, 4));

    let outside = MergeVisitor::new(&mut dst, Rect::new(20, 20, 4, 4), &filters).visit(&mut tree, id).unwrap();
    assert_eq!(outside, Visit::Skipped(SkipReason::EmptyRect));
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[test]
fn recompute_matches_manual_visits() {
    let filters = FilterRegistry::with_builtins();
    let rect = Rect::new(0, 0, 24, 24);
    let mut tree = LayerTree::new();
    let a = add(&mut tree, LayerNode::raster("a", gradient(rect)));
    let b = add(&mut tree, LayerNode::raster("b", solid(Rect::new(3, 3, 9, 9), RED)).with_blend_mode(BlendMode::Screen));
    let c = add(&mut tree, LayerNode::adjustment("c", Some(FilterConfiguration::new("desaturate"))));

    let mut manual = PixelBuffer::new();
    for id in [a, b, c] {
        MergeVisitor::new(&mut manual, rect, &filters).visit(&mut tree, id).unwrap();
    }
    let recomputed = tree.recompute(rect, &filters).unwrap();
    assert!(recomputed.same_pixels(&manual, rect));
}
