use image::Rgba;
use layer_merge::{
    BlendMode, FilterConfiguration, FilterRegistry, LayerNode, LayerTree, MergeError, NodeId, NodeKind, PixelBuffer,
    Rect, SelectionMask,
};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const CANVAS: Rect = Rect::new(0, 0, 20, 20);

fn red_document() -> (LayerTree, NodeId) {
    let mut tree = LayerTree::new();
    let root = tree.root();
    let id = tree.add_node(root, LayerNode::raster("paint", PixelBuffer::filled(CANVAS, RED))).unwrap();
    (tree, id)
}

fn paint_stroke(tree: &mut LayerTree, id: NodeId, area: Rect) {
    let buffer = tree.node_mut(id).unwrap().begin_stroke(BlendMode::Normal, 128).unwrap();
    buffer.fill_rect(area, GREEN);
    tree.invalidate(id, area);
}

#[test]
fn stroke_preview_matches_committed_result() {
    let filters = FilterRegistry::new();
    let (mut tree, id) = red_document();
    let baseline = tree.recompute(CANVAS, &filters).unwrap().duplicate();

    let area = Rect::new(5, 5, 6, 6);
    paint_stroke(&mut tree, id, area);
    let preview = tree.recompute(CANVAS, &filters).unwrap().duplicate();
    assert_ne!(preview.pixel(6, 6), baseline.pixel(6, 6));
    assert_eq!(preview.pixel(4, 4), RED);
    // Committed pixels are untouched while the stroke is in progress.
    assert_eq!(tree.node(id).unwrap().paint().unwrap().pixel(6, 6), RED);

    assert_eq!(tree.end_stroke(id, true).unwrap(), area);
    assert!(tree.node(id).unwrap().stroke().is_none());
    let committed = tree.recompute(CANVAS, &filters).unwrap();
    assert!(committed.same_pixels(&preview, CANVAS));
    assert_eq!(tree.node(id).unwrap().paint().unwrap().pixel(6, 6), preview.pixel(6, 6));
}

#[test]
fn discarded_stroke_restores_original() {
    let filters = FilterRegistry::new();
    let (mut tree, id) = red_document();
    let baseline = tree.recompute(CANVAS, &filters).unwrap().duplicate();

    paint_stroke(&mut tree, id, Rect::new(0, 0, 8, 8));
    assert_ne!(tree.recompute(CANVAS, &filters).unwrap().pixel(1, 1), RED);

    assert_eq!(tree.end_stroke(id, false).unwrap(), Rect::new(0, 0, 8, 8));
    let restored = tree.recompute(CANVAS, &filters).unwrap();
    assert!(restored.same_pixels(&baseline, CANVAS));
    assert_eq!(tree.node(id).unwrap().paint().unwrap().pixel(1, 1), RED);
}

#[test]
fn clean_projection_is_reused_until_invalidated() {
    let filters = FilterRegistry::new();
    let (mut tree, id) = red_document();
    tree.recompute(CANVAS, &filters).unwrap();

    let area = Rect::new(2, 2, 3, 3);
    let buffer = tree.node_mut(id).unwrap().begin_stroke(BlendMode::Normal, 255).unwrap();
    buffer.fill_rect(area, GREEN);
    assert_eq!(tree.recompute(CANVAS, &filters).unwrap().pixel(3, 3), RED);

    tree.invalidate(id, area);
    assert_eq!(tree.recompute(CANVAS, &filters).unwrap().pixel(3, 3), GREEN);
}

#[test]
fn restarting_a_stroke_drops_the_previous_one() {
    let (mut tree, id) = red_document();
    let node = tree.node_mut(id).unwrap();
    node.begin_stroke(BlendMode::Normal, 255).unwrap().fill_rect(Rect::new(0, 0, 2, 2), GREEN);
    node.begin_stroke(BlendMode::Normal, 255).unwrap().fill_rect(Rect::new(10, 10, 2, 2), GREEN);

    assert_eq!(tree.end_stroke(id, true).unwrap(), Rect::new(10, 10, 2, 2));
    let paint = tree.node(id).unwrap().paint().unwrap();
    assert_eq!(paint.pixel(0, 0), RED);
    assert_eq!(paint.pixel(10, 10), GREEN);
}

#[test]
fn adjustment_stroke_paints_its_selection() {
    let filters = FilterRegistry::with_builtins();
    let canvas = Rect::new(0, 0, 10, 10);
    let mut tree = LayerTree::new();
    let root = tree.root();
    tree.add_node(root, LayerNode::raster("white", PixelBuffer::filled(canvas, WHITE))).unwrap();

    // A solid block plus one isolated pixel, so the selected rect spans
    // the area the stroke will cover.
    let mut selection = SelectionMask::new(Rect::new(0, 0, 8, 4));
    for y in 0..4 {
        for x in 0..4 {
            selection.set_weight(x, y, 255);
        }
    }
    selection.set_weight(7, 3, 255);
    let id = tree
        .add_node(
            root,
            LayerNode::adjustment("invert", Some(FilterConfiguration::new("invert"))).with_selection(selection),
        )
        .unwrap();

    tree.node_mut(id)
        .unwrap()
        .begin_stroke(BlendMode::Normal, 255)
        .unwrap()
        .fill_rect(Rect::new(6, 0, 2, 2), WHITE);
    tree.invalidate(id, Rect::new(6, 0, 2, 2));

    let preview = tree.recompute(canvas, &filters).unwrap().duplicate();
    assert_eq!(preview.pixel(1, 1), BLACK);
    assert_eq!(preview.pixel(6, 0), BLACK);
    assert_eq!(preview.pixel(7, 3), BLACK);
    assert_eq!(preview.pixel(5, 0), WHITE);
    assert_eq!(preview.pixel(6, 3), WHITE);

    tree.end_stroke(id, true).unwrap();
    match &tree.node(id).unwrap().kind {
        NodeKind::Adjustment { selection: Some(mask), overlay: None, .. } => {
            assert_eq!(mask.weight_at(6, 0), 255);
            assert_eq!(mask.weight_at(1, 1), 255);
            assert_eq!(mask.weight_at(5, 0), 0);
        }
        other => panic!("unexpected kind {}", other.name()),
    }
    let committed = tree.recompute(canvas, &filters).unwrap();
    assert!(committed.same_pixels(&preview, canvas));
}

#[test]
fn adjustment_stroke_without_selection_creates_one() {
    let mut tree = LayerTree::new();
    let root = tree.root();
    let id = tree.add_node(root, LayerNode::adjustment("a", Some(FilterConfiguration::new("invert")))).unwrap();
    tree.node_mut(id)
        .unwrap()
        .begin_stroke(BlendMode::Normal, 255)
        .unwrap()
        .fill_rect(Rect::new(3, 3, 2, 2), WHITE);

    assert_eq!(tree.end_stroke(id, true).unwrap(), Rect::new(3, 3, 2, 2));
    match &tree.node(id).unwrap().kind {
        NodeKind::Adjustment { selection: Some(mask), .. } => {
            assert_eq!(mask.selected_rect(), Rect::new(3, 3, 2, 2));
        }
        other => panic!("unexpected kind {}", other.name()),
    }
}

#[test]
fn only_raster_and_adjustment_layers_take_strokes() {
    let mut tree = LayerTree::new();
    let root = tree.root();
    let group = tree.add_node(root, LayerNode::group("g")).unwrap();
    assert!(tree.node_mut(group).unwrap().begin_stroke(BlendMode::Normal, 255).is_none());
    assert_eq!(tree.end_stroke(group, true).unwrap(), Rect::EMPTY);

    let mut other = LayerTree::new();
    let other_root = other.root();
    other.add_node(other_root, LayerNode::group("a")).unwrap();
    let foreign = other.add_node(other_root, LayerNode::group("b")).unwrap();
    assert!(matches!(tree.end_stroke(foreign, true), Err(MergeError::UnknownNode)));
}
