use docket::{DocketError, DocketResult, ErrorKind};
use serde_json::{json, Value};

/// A point in 2D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A 2D shape usable as a geo predicate argument.
///
/// Only `Box` is exactly representable as an index range; `Circle` and
/// `Polygon` are approximated by their bounding box at the index level and
/// re-checked client-side.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Axis-aligned rectangle: lower-left and upper-right corners.
    Box {
        lower_left: Point,
        upper_right: Point,
    },
    Circle {
        center: Point,
        radius: f64,
    },
    Polygon(Vec<Point>),
}

impl Shape {
    /// True geometric containment check, used to weed out false positives
    /// returned by the bounding-box index query.
    pub fn contains(&self, point: &Point) -> bool {
        match self {
            Shape::Box {
                lower_left,
                upper_right,
            } => {
                point.x >= lower_left.x
                    && point.x <= upper_right.x
                    && point.y >= lower_left.y
                    && point.y <= upper_right.y
            }
            Shape::Circle { center, radius } => center.distance_to(point) <= radius.abs(),
            Shape::Polygon(vertices) => point_in_polygon(point, vertices),
        }
    }

    /// Whether the index range for this shape is exact (no client-side
    /// re-check needed).
    pub fn is_exact(&self) -> bool {
        matches!(self, Shape::Box { .. })
    }
}

/// Ray-casting point-in-polygon test. Points on an edge count as inside.
fn point_in_polygon(point: &Point, vertices: &[Point]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (&vertices[i], &vertices[j]);
        if on_segment(point, a, b) {
            return true;
        }
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(point: &Point, a: &Point, b: &Point) -> bool {
    let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
    if cross.abs() > f64::EPSILON {
        return false;
    }
    point.x >= a.x.min(b.x)
        && point.x <= a.x.max(b.x)
        && point.y >= a.y.min(b.y)
        && point.y <= a.y.max(b.y)
}

/// Computes the bounding box approximation for a "near" query (max distance
/// from a point of origin). Negative distances are treated as positive.
///
/// Returns `[x_min, y_min, x_max, y_max]`.
pub fn bounding_box_for_near(origin: &Point, distance: f64) -> [f64; 4] {
    let max_distance = distance.abs();
    [
        origin.x - max_distance,
        origin.y - max_distance,
        origin.x + max_distance,
        origin.y + max_distance,
    ]
}

/// Appends a shape's 2D bounding box to a pair of start/end range arrays.
pub fn extend_ranges_with_shape(
    start_range: &mut Vec<Value>,
    end_range: &mut Vec<Value>,
    shape: &Shape,
) -> DocketResult<()> {
    match shape {
        Shape::Box {
            lower_left,
            upper_right,
        } => {
            extend_ranges_with_points(
                start_range,
                end_range,
                true,
                &[*lower_left, *upper_right],
            )?;
        }
        Shape::Circle { center, radius } => {
            let r = radius.abs();
            start_range.push(json!(center.x - r));
            start_range.push(json!(center.y - r));
            end_range.push(json!(center.x + r));
            end_range.push(json!(center.y + r));
        }
        Shape::Polygon(vertices) => {
            extend_ranges_with_points(start_range, end_range, false, vertices)?;
        }
    }
    Ok(())
}

/// Appends the bounding box of a sequence of points to a pair of start/end
/// range arrays.
///
/// With `is_bounding_box` set, exactly two points are required and the first
/// must sit on the lower left of the second. Otherwise the points are treated
/// as a polygon outline and the lowest/highest X and Y coordinates are used.
pub fn extend_ranges_with_points(
    start_range: &mut Vec<Value>,
    end_range: &mut Vec<Value>,
    is_bounding_box: bool,
    points: &[Point],
) -> DocketResult<()> {
    if points.is_empty() {
        return Err(DocketError::new(
            "Needs points to convert",
            ErrorKind::Extension("spatial".to_string()),
        ));
    }

    if is_bounding_box {
        if points.len() != 2 {
            return Err(DocketError::new(
                "Bounding box must be made of 2 points",
                ErrorKind::Extension("spatial".to_string()),
            ));
        }
        if points[0].x > points[1].x || points[0].y > points[1].y {
            return Err(DocketError::new(
                "Bounding box must have point A on the lower left of point B",
                ErrorKind::Extension("spatial".to_string()),
            ));
        }
        start_range.push(json!(points[0].x));
        start_range.push(json!(points[0].y));
        end_range.push(json!(points[1].x));
        end_range.push(json!(points[1].y));
    } else {
        let mut x_min = f64::INFINITY;
        let mut y_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for point in points {
            x_min = x_min.min(point.x);
            x_max = x_max.max(point.x);
            y_min = y_min.min(point.y);
            y_max = y_max.max(point.y);
        }
        start_range.push(json!(x_min));
        start_range.push(json!(y_min));
        end_range.push(json!(x_max));
        end_range.push(json!(y_max));
    }
    Ok(())
}
