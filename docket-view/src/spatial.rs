//! Dimensional (spatial) view derivation.
//!
//! A spatial view indexes entities under a numeric multi-dimensional key.
//! Derivation accumulates two parallel range arrays (start/end) across the
//! view's dimensions; shapes that are not exactly representable as an
//! axis-aligned range (circle, polygon, arbitrary point list, near) are
//! approximated by their bounding box at the index level and re-checked
//! client-side, so the index result is always a superset of the true result.

use docket::common::JsonObject;
use docket::part::{PartKeyword, PartTree};
use docket::{DocketError, DocketResult, ErrorKind};
use serde_json::{json, Value};
use std::slice::Iter;

use crate::geo::{
    bounding_box_for_near, extend_ranges_with_points, extend_ranges_with_shape, Point, Shape,
};
use crate::view_query::ViewQuery;

fn spatial_error(message: &str) -> DocketError {
    DocketError::new(message, ErrorKind::Extension("spatial".to_string()))
}

/// A runtime argument to a spatial derivation.
///
/// Geo predicates take typed geometry; non-geographic extra dimensions take
/// plain numbers. `Range` passes raw index range arrays through unchecked
/// and is discouraged since it ties the method signature to the index
/// layout.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialArg {
    Number(f64),
    Point(Point),
    Shape(Shape),
    /// Polygon outline given as a point list.
    Points(Vec<Point>),
    /// Maximum distance for a `Near` predicate.
    Distance(f64),
    Range(Vec<Value>),
}

/// Re-checks true geometric containment on a returned row. Returns `false`
/// when the row is a false positive of the bounding-box index query.
pub type FalsePositiveEvaluator = Box<dyn Fn(&JsonObject) -> bool + Send + Sync>;

/// A built spatial view query paired with the client-side containment
/// checks the execution layer must run on each returned row.
pub struct SpatialViewQueryWrapper {
    pub built_query: ViewQuery,
    pub is_limited: bool,
    evaluators: Vec<FalsePositiveEvaluator>,
}

impl std::fmt::Debug for SpatialViewQueryWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialViewQueryWrapper")
            .field("built_query", &self.built_query)
            .field("is_limited", &self.is_limited)
            .field("evaluators", &self.evaluators.len())
            .finish()
    }
}

impl SpatialViewQueryWrapper {
    pub fn has_evaluators(&self) -> bool {
        !self.evaluators.is_empty()
    }

    /// Drops rows that fail any containment re-check. Rows without a
    /// readable coordinate key cannot be verified and are dropped too.
    pub fn eliminate(&self, rows: Vec<JsonObject>) -> Vec<JsonObject> {
        if self.evaluators.is_empty() {
            return rows;
        }
        let before = rows.len();
        let kept: Vec<JsonObject> = rows
            .into_iter()
            .filter(|row| self.evaluators.iter().all(|evaluator| evaluator(row)))
            .collect();
        log::debug!(
            "eliminated {} false positive(s) out of {} row(s)",
            before - kept.len(),
            before
        );
        kept
    }
}

/// Derives a spatial [`ViewQuery`] from a parsed method-name part tree.
///
/// Supported keywords:
///
/// - `Within`: a [`Shape`], a pair of [`Point`]s (lower-left + upper-right
///   bounding box), a point list (polygon), or a pair of raw range arrays
/// - `Near`: a [`Point`] plus a maximum [`SpatialArg::Distance`]
/// - `GreaterThan(Equal)`: start range element, null end (extra dimensions)
/// - `LessThan(Equal)`: null start, end range element
/// - a plain property (`Is`/`Equals`): the same element in both ranges
/// - `Between`: one element in each range
///
/// Ranges shorter than the view's dimension count are padded with nulls.
/// Sort is not supported on spatial views and fails at construction.
#[derive(Debug)]
pub struct SpatialViewQueryCreator {
    dimensions: usize,
    tree: PartTree,
}

impl SpatialViewQueryCreator {
    pub fn new(dimensions: usize, tree: PartTree) -> DocketResult<SpatialViewQueryCreator> {
        if tree.or_groups().len() > 1 {
            return Err(spatial_error("Or is not supported for view-based queries"));
        }
        if !tree.sort().is_empty() {
            return Err(spatial_error("Sort is not supported on spatial view queries"));
        }
        for group in tree.or_groups() {
            for part in group {
                if !Self::supports(part.keyword) {
                    log::error!(
                        "unsupported keyword {:?} in spatial view query derivation",
                        part.keyword
                    );
                    return Err(spatial_error(&format!(
                        "Unsupported keyword in spatial view query derivation: {:?}",
                        part.keyword
                    )));
                }
            }
        }
        Ok(SpatialViewQueryCreator { dimensions, tree })
    }

    fn supports(keyword: PartKeyword) -> bool {
        matches!(
            keyword,
            PartKeyword::Within
                | PartKeyword::Near
                | PartKeyword::GreaterThan
                | PartKeyword::GreaterThanEqual
                | PartKeyword::LessThan
                | PartKeyword::LessThanEqual
                | PartKeyword::SimpleProperty
                | PartKeyword::Between
        )
    }

    /// Builds the range restrictions, limit and false-positive evaluators
    /// for `query`.
    pub fn derive(
        &self,
        mut query: ViewQuery,
        args: &[SpatialArg],
    ) -> DocketResult<SpatialViewQueryWrapper> {
        let mut start_range: Vec<Value> = Vec::new();
        let mut end_range: Vec<Value> = Vec::new();
        let mut evaluators: Vec<FalsePositiveEvaluator> = Vec::new();
        let mut args = args.iter();

        for group in self.tree.or_groups() {
            for part in group {
                self.apply(
                    part.keyword,
                    &mut args,
                    &mut start_range,
                    &mut end_range,
                    &mut evaluators,
                )?;
            }
        }

        let is_limited = self.tree.subject().limit.is_some();
        if let Some(limit) = self.tree.subject().limit {
            query = query.limit(limit);
        }

        if !start_range.is_empty() || !end_range.is_empty() {
            pad_range(&mut start_range, self.dimensions);
            pad_range(&mut end_range, self.dimensions);
            query = query.range(start_range, end_range);
        }

        Ok(SpatialViewQueryWrapper {
            built_query: query,
            is_limited,
            evaluators,
        })
    }

    fn apply(
        &self,
        keyword: PartKeyword,
        args: &mut Iter<'_, SpatialArg>,
        start_range: &mut Vec<Value>,
        end_range: &mut Vec<Value>,
        evaluators: &mut Vec<FalsePositiveEvaluator>,
    ) -> DocketResult<()> {
        match keyword {
            PartKeyword::Within => apply_within(args, start_range, end_range, evaluators),
            PartKeyword::Near => apply_near(args, start_range, end_range, evaluators),
            PartKeyword::GreaterThan | PartKeyword::GreaterThanEqual => {
                start_range.push(json!(next_number(args)?));
                end_range.push(Value::Null);
                Ok(())
            }
            PartKeyword::LessThan | PartKeyword::LessThanEqual => {
                start_range.push(Value::Null);
                end_range.push(json!(next_number(args)?));
                Ok(())
            }
            PartKeyword::SimpleProperty => {
                let value = next_number(args)?;
                start_range.push(json!(value));
                end_range.push(json!(value));
                Ok(())
            }
            PartKeyword::Between => {
                start_range.push(json!(next_number(args)?));
                end_range.push(json!(next_number(args)?));
                Ok(())
            }
            // ruled out at construction
            other => Err(spatial_error(&format!(
                "Unsupported keyword in spatial view query derivation: {:?}",
                other
            ))),
        }
    }
}

fn apply_within(
    args: &mut Iter<'_, SpatialArg>,
    start_range: &mut Vec<Value>,
    end_range: &mut Vec<Value>,
    evaluators: &mut Vec<FalsePositiveEvaluator>,
) -> DocketResult<()> {
    match args.next() {
        Some(SpatialArg::Shape(shape)) => {
            extend_ranges_with_shape(start_range, end_range, shape)?;
            if !shape.is_exact() {
                evaluators.push(containment_evaluator(shape.clone()));
            }
            Ok(())
        }
        Some(SpatialArg::Point(lower_left)) => {
            // a second point gives the other corner of the bounding box
            let upper_right = match args.next() {
                Some(SpatialArg::Point(point)) => *point,
                _ => {
                    return Err(spatial_error(
                        "Cannot compute a bounding box for within, 2 points needed",
                    ))
                }
            };
            extend_ranges_with_points(start_range, end_range, true, &[*lower_left, upper_right])
        }
        Some(SpatialArg::Points(vertices)) => {
            extend_ranges_with_points(start_range, end_range, false, vertices)?;
            evaluators.push(containment_evaluator(Shape::Polygon(vertices.clone())));
            Ok(())
        }
        Some(SpatialArg::Range(start)) => {
            let end = match args.next() {
                Some(SpatialArg::Range(end)) => end,
                _ => {
                    return Err(spatial_error(
                        "2 range arrays required for within: start and end",
                    ))
                }
            };
            start_range.extend(start.iter().cloned());
            end_range.extend(end.iter().cloned());
            Ok(())
        }
        Some(other) => Err(spatial_error(&format!(
            "Unsupported parameter type for within: {:?}",
            other
        ))),
        None => Err(spatial_error("Not enough parameters for within")),
    }
}

fn apply_near(
    args: &mut Iter<'_, SpatialArg>,
    start_range: &mut Vec<Value>,
    end_range: &mut Vec<Value>,
    evaluators: &mut Vec<FalsePositiveEvaluator>,
) -> DocketResult<()> {
    let origin = match args.next() {
        Some(SpatialArg::Point(point)) => *point,
        _ => return Err(spatial_error("Near queries need a point as first argument")),
    };
    let distance = match args.next() {
        Some(SpatialArg::Distance(distance)) => *distance,
        _ => {
            return Err(spatial_error(
                "Near queries need a maximum distance as second argument",
            ))
        }
    };

    let bbox = bounding_box_for_near(&origin, distance);
    start_range.push(json!(bbox[0]));
    start_range.push(json!(bbox[1]));
    end_range.push(json!(bbox[2]));
    end_range.push(json!(bbox[3]));

    // the bounding box overshoots the circle, re-check true distance
    evaluators.push(containment_evaluator(Shape::Circle {
        center: origin,
        radius: distance.abs(),
    }));
    Ok(())
}

fn next_number(args: &mut Iter<'_, SpatialArg>) -> DocketResult<f64> {
    match args.next() {
        Some(SpatialArg::Number(value)) => Ok(*value),
        Some(other) => Err(spatial_error(&format!(
            "Expected a numeric range parameter, got {:?}",
            other
        ))),
        None => Err(spatial_error("Expected an additional numeric range parameter")),
    }
}

fn pad_range(range: &mut Vec<Value>, dimensions: usize) {
    while range.len() < dimensions {
        range.push(Value::Null);
    }
}

fn containment_evaluator(shape: Shape) -> FalsePositiveEvaluator {
    Box::new(move |row| match row_point(row) {
        Some(point) => shape.contains(&point),
        None => {
            log::debug!("row carries no coordinate key, treating as false positive");
            false
        }
    })
}

/// Reads the first two coordinates of the row's emitted view key.
fn row_point(row: &JsonObject) -> Option<Point> {
    let key = row.get("key")?.as_array()?;
    let x = key.first()?.as_f64()?;
    let y = key.get(1)?.as_f64()?;
    Some(Point::new(x, y))
}

/// Spatial views never grew a reactive execution path; the declaration is
/// kept so callers get a deliberate error instead of a missing symbol.
#[derive(Debug)]
pub struct ReactiveSpatialViewQueryCreator {
    _private: (),
}

impl ReactiveSpatialViewQueryCreator {
    pub fn new(_dimensions: usize, _tree: PartTree) -> DocketResult<ReactiveSpatialViewQueryCreator> {
        Err(DocketError::new(
            "Spatial view queries are not supported on the reactive execution path",
            ErrorKind::InvalidOperation,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creator(method_name: &str, dimensions: usize) -> DocketResult<SpatialViewQueryCreator> {
        let tree = PartTree::parse(method_name).unwrap();
        SpatialViewQueryCreator::new(dimensions, tree)
    }

    fn base() -> ViewQuery {
        ViewQuery::from("places", "by_location")
    }

    fn row(x: f64, y: f64) -> JsonObject {
        let mut row = JsonObject::new();
        row.insert("key".to_string(), json!([x, y]));
        row
    }

    #[test]
    fn test_sort_is_rejected_at_construction() {
        let err = creator("findByLocationWithinOrderByNameAsc", 2).unwrap_err();
        assert!(err.message().contains("Sort is not supported"));
    }

    #[test]
    fn test_unsupported_keyword_is_rejected_at_construction() {
        let err = creator("findByNameContaining", 2).unwrap_err();
        assert!(err.message().contains("Unsupported keyword"));
        assert_eq!(err.kind(), &ErrorKind::Extension("spatial".to_string()));
    }

    #[test]
    fn test_within_box_is_exact() {
        let shape = Shape::Box {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(10.0, 10.0),
        };
        let wrapper = creator("findByLocationWithin", 2)
            .unwrap()
            .derive(base(), &[SpatialArg::Shape(shape)])
            .unwrap();
        let params = wrapper.built_query.params();
        assert_eq!(params["start_range"], json!([0.0, 0.0]));
        assert_eq!(params["end_range"], json!([10.0, 10.0]));
        assert!(!wrapper.has_evaluators());
    }

    #[test]
    fn test_within_circle_registers_eliminator() {
        let shape = Shape::Circle {
            center: Point::new(0.0, 0.0),
            radius: 5.0,
        };
        let wrapper = creator("findByLocationWithin", 2)
            .unwrap()
            .derive(base(), &[SpatialArg::Shape(shape)])
            .unwrap();
        assert!(wrapper.has_evaluators());

        // the bounding box corner is indexed but outside the circle
        let rows = vec![row(3.0, 4.0), row(4.9, 4.9)];
        let kept = wrapper.eliminate(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["key"], json!([3.0, 4.0]));
    }

    #[test]
    fn test_within_two_points_must_be_ordered() {
        let err = creator("findByLocationWithin", 2)
            .unwrap()
            .derive(
                base(),
                &[
                    SpatialArg::Point(Point::new(5.0, 5.0)),
                    SpatialArg::Point(Point::new(0.0, 0.0)),
                ],
            )
            .unwrap_err();
        assert!(err.message().contains("lower left"));
    }

    #[test]
    fn test_within_point_list_registers_polygon_eliminator() {
        let triangle = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ];
        let wrapper = creator("findByLocationWithin", 2)
            .unwrap()
            .derive(base(), &[SpatialArg::Points(triangle)])
            .unwrap();
        let kept = wrapper.eliminate(vec![row(1.0, 1.0), row(9.0, 9.0)]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_near_builds_bounding_box_and_eliminator() {
        let wrapper = creator("findByLocationNear", 2)
            .unwrap()
            .derive(
                base(),
                &[
                    SpatialArg::Point(Point::new(10.0, 10.0)),
                    SpatialArg::Distance(2.0),
                ],
            )
            .unwrap();
        let params = wrapper.built_query.params();
        assert_eq!(params["start_range"], json!([8.0, 8.0]));
        assert_eq!(params["end_range"], json!([12.0, 12.0]));

        let kept = wrapper.eliminate(vec![row(11.0, 10.0), row(11.9, 11.9)]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_near_requires_point_and_distance() {
        let err = creator("findByLocationNear", 2)
            .unwrap()
            .derive(base(), &[SpatialArg::Point(Point::new(0.0, 0.0))])
            .unwrap_err();
        assert!(err.message().contains("maximum distance"));
    }

    #[test]
    fn test_extra_dimension_pads_with_null() {
        let shape = Shape::Box {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(10.0, 10.0),
        };
        let wrapper = creator("findByLocationWithin", 3)
            .unwrap()
            .derive(base(), &[SpatialArg::Shape(shape)])
            .unwrap();
        let params = wrapper.built_query.params();
        assert_eq!(params["start_range"], json!([0.0, 0.0, null]));
        assert_eq!(params["end_range"], json!([10.0, 10.0, null]));
    }

    #[test]
    fn test_numeric_dimension_keywords() {
        let shape = Shape::Box {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(10.0, 10.0),
        };
        let wrapper = creator("findByLocationWithinAndYearGreaterThan", 3)
            .unwrap()
            .derive(
                base(),
                &[SpatialArg::Shape(shape), SpatialArg::Number(1990.0)],
            )
            .unwrap();
        let params = wrapper.built_query.params();
        assert_eq!(params["start_range"], json!([0.0, 0.0, 1990.0]));
        assert_eq!(params["end_range"], json!([10.0, 10.0, null]));
    }

    #[test]
    fn test_limiting_method_sets_limit() {
        let wrapper = creator("findTop3ByLocationNear", 2)
            .unwrap()
            .derive(
                base(),
                &[
                    SpatialArg::Point(Point::new(0.0, 0.0)),
                    SpatialArg::Distance(1.0),
                ],
            )
            .unwrap();
        assert!(wrapper.is_limited);
        assert_eq!(wrapper.built_query.params()["limit"], json!(3));
    }

    #[test]
    fn test_row_without_coordinates_is_eliminated() {
        let wrapper = creator("findByLocationNear", 2)
            .unwrap()
            .derive(
                base(),
                &[
                    SpatialArg::Point(Point::new(0.0, 0.0)),
                    SpatialArg::Distance(1.0),
                ],
            )
            .unwrap();
        let kept = wrapper.eliminate(vec![JsonObject::new()]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_reactive_creator_is_unsupported() {
        let tree = PartTree::parse("findByLocationNear").unwrap();
        let err = ReactiveSpatialViewQueryCreator::new(2, tree).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
