//! Ordering, combine levels, degenerate input and bridging.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use strata_slicer::infill::combine_spacing;
use strata_slicer::model::{Layer, Mesh, Model, Part, SkinPart};
use strata_slicer::{
    Event, EventLog, Feature, FillGenerator, FillParams, FillPattern, LayerSequencer,
    MeshSettings, NoProgress, PathOrderOptimizer, Point2, Polygon, Polyline, ScanlineFill,
    Settings,
};

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Polygon> {
    vec![Polygon::rect(Point2::new(x0, y0), Point2::new(x1, y1))]
}

fn single_mesh(layers: Vec<Vec<Part>>) -> Model {
    Model {
        meshes: vec![Mesh {
            settings: MeshSettings::default(),
            layers: layers
                .into_iter()
                .enumerate()
                .map(|(i, parts)| Layer {
                    print_z: 0.3 + 0.1 * i as f64,
                    parts,
                    open_lines: Vec::new(),
                })
                .collect(),
        }],
        ..Default::default()
    }
}

fn extrusions(events: &[Event], feature: Feature) -> Vec<(Point2, Point2)> {
    let mut position = Point2::origin();
    let mut current = Feature::Travel;
    let mut moves = Vec::new();
    for event in events {
        match event {
            Event::Feature(f) => current = *f,
            Event::Travel { to, .. } => position = *to,
            Event::Extrude { to, .. } => {
                if current == feature {
                    moves.push((position, *to));
                }
                position = *to;
            }
            _ => {}
        }
    }
    moves
}

#[test]
fn test_optimizer_never_worse_than_input_order_for_two_shapes() {
    let coords = [-7.0, -1.5, 0.0, 2.0, 9.0];
    for &ax in &coords {
        for &by in &coords {
            let start = Point2::new(0.5, -0.5);
            let points = [Point2::new(ax, 3.0), Point2::new(-2.0, by)];
            let mut optimizer = PathOrderOptimizer::new(start);
            for p in points {
                optimizer.add_point(p);
            }
            let order = optimizer.optimize();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1]);

            let tour = |idx: &[usize]| {
                let mut at = start;
                let mut total = 0.0;
                for &i in idx {
                    total += (points[i] - at).norm();
                    at = points[i];
                }
                total
            };
            assert!(tour(&order) <= tour(&[0, 1]) + 1e-12);
        }
    }
}

#[test]
fn test_optimizer_visits_every_shape_once() {
    let mut optimizer = PathOrderOptimizer::new(Point2::origin());
    for i in 0..25 {
        let x = ((i * 7) % 11) as f64;
        let y = ((i * 3) % 5) as f64;
        optimizer.add_point(Point2::new(x, y));
    }
    let mut order = optimizer.optimize();
    order.sort_unstable();
    assert_eq!(order, (0..25).collect::<Vec<_>>());
}

/// Records the spacing of every non-empty line request.
#[derive(Clone, Default)]
struct SpacingRecorder(Rc<RefCell<Vec<f64>>>);

impl FillGenerator for SpacingRecorder {
    fn lines(&self, region: &[Polygon], params: &FillParams) -> Vec<Polyline> {
        if !region.is_empty() {
            self.0.borrow_mut().push(params.spacing);
        }
        ScanlineFill.lines(region, params)
    }

    fn concentric(&self, region: &[Polygon], params: &FillParams) -> Vec<Polygon> {
        ScanlineFill.concentric(region, params)
    }

    fn zigzag(&self, region: &[Polygon], params: &FillParams, connected: bool) -> Vec<Polyline> {
        ScanlineFill.zigzag(region, params, connected)
    }
}

#[test]
fn test_combine_levels_widen_spacing() {
    assert_relative_eq!(combine_spacing(3.0, 0), 3.0);
    assert_relative_eq!(combine_spacing(3.0, 2), 9.0);

    let part = Part {
        outline: rect(0.0, 0.0, 30.0, 30.0),
        sparse_outline: vec![
            rect(1.0, 1.0, 29.0, 10.0),
            rect(1.0, 10.0, 29.0, 20.0),
            rect(1.0, 20.0, 29.0, 29.0),
        ],
        ..Default::default()
    };
    let settings = Settings {
        wall_line_count: 0,
        fill_pattern: FillPattern::Lines,
        infill_line_distance: 3.0,
        ..Default::default()
    };
    let recorder = SpacingRecorder::default();
    let mut sequencer = LayerSequencer::new(settings).with_fill(recorder.clone());
    let result = sequencer.run(&single_mesh(vec![vec![part]]), &mut EventLog::new(), &mut NoProgress);
    assert!(result.is_ok());

    // Thicker levels print first, the single-layer level last
    assert_eq!(*recorder.0.borrow(), vec![6.0, 9.0, 3.0]);
}

#[test]
fn test_zero_area_outline_emits_nothing() {
    let flat = vec![Polygon::new(vec![
        Point2::new(0.0, 0.0),
        Point2::new(10.0, 0.0),
        Point2::new(5.0, 0.0),
    ])];
    let part = Part {
        outline: flat.clone(),
        insets: vec![flat.clone()],
        sparse_outline: vec![flat.clone()],
        skin_parts: vec![SkinPart {
            outline: flat.clone(),
            ..Default::default()
        }],
        perimeter_gaps: flat,
    };
    let mut log = EventLog::new();
    let result = LayerSequencer::new(Settings::default()).run(
        &single_mesh(vec![vec![part]]),
        &mut log,
        &mut NoProgress,
    );
    assert!(result.is_ok());
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, Event::Extrude { .. } | Event::Feature(_))));
}

/// Layer 2 carries a skin region spanning `0..30` in Y; layer 1 optionally
/// has two islands holding up its ends.
fn bridge_job(supported: bool) -> Vec<(Point2, Point2)> {
    let anchor = |y0: f64, y1: f64| Part {
        outline: rect(0.0, y0, 10.0, y1),
        ..Default::default()
    };
    let base = vec![anchor(0.0, 5.0), anchor(25.0, 30.0)];
    let layer1 = if supported { base.clone() } else { Vec::new() };
    let top = Part {
        outline: rect(0.0, 0.0, 10.0, 30.0),
        skin_parts: vec![SkinPart {
            outline: rect(1.0, 1.0, 9.0, 29.0),
            ..Default::default()
        }],
        ..Default::default()
    };
    let settings = Settings {
        wall_line_count: 0,
        infill_line_distance: 0.0,
        top_bottom_pattern: FillPattern::Lines,
        skin_alternate_rotation: true,
        top_layers: 4,
        ..Default::default()
    };
    let mut log = EventLog::new();
    let result = LayerSequencer::new(settings).run(
        &single_mesh(vec![base, layer1, vec![top]]),
        &mut log,
        &mut NoProgress,
    );
    assert!(result.is_ok());

    let layer2 = log
        .events()
        .iter()
        .position(|e| *e == Event::Layer(2))
        .unwrap_or(0);
    extrusions(&log.events()[layer2..], Feature::Skin)
}

fn direction(m: &(Point2, Point2)) -> f64 {
    let d = m.1 - m.0;
    d.y.atan2(d.x).to_degrees().rem_euclid(180.0)
}

#[test]
fn test_bridge_direction_is_not_rotated() {
    let moves = bridge_job(true);
    assert!(!moves.is_empty());
    for m in &moves {
        assert_relative_eq!(direction(m), 90.0, epsilon = 1e-6);
    }
}

#[test]
fn test_unsupported_skin_gets_alternate_rotation() {
    // Layer 2: 45° fill angle minus the 45° rotation
    let moves = bridge_job(false);
    assert!(!moves.is_empty());
    for m in &moves {
        let angle = direction(m);
        assert!(angle < 1e-6 || angle > 180.0 - 1e-6, "angle {angle}");
    }
}

#[test]
fn test_unknown_infill_pattern_leaves_infill_empty() {
    let settings: Settings = serde_json::from_str(r#"{ "fill_pattern": "honeycomb" }"#).unwrap();
    let part = Part {
        outline: rect(0.0, 0.0, 20.0, 20.0),
        insets: vec![rect(0.2, 0.2, 19.8, 19.8)],
        sparse_outline: vec![rect(1.0, 1.0, 19.0, 19.0)],
        ..Default::default()
    };
    let mut log = EventLog::new();
    let result = LayerSequencer::new(settings).run(
        &single_mesh(vec![vec![part]]),
        &mut log,
        &mut NoProgress,
    );
    assert!(result.is_ok());
    assert!(extrusions(log.events(), Feature::Infill(0)).is_empty());
    assert!(!extrusions(log.events(), Feature::OuterWall).is_empty());
}
