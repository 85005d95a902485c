use crate::prelude::Rect;

pub struct GeometryHelper;

impl GeometryHelper {
    /// Area shared by two axis-aligned rectangles; zero when they only touch or are disjoint.
    pub fn intersection_area(a: &Rect, b: &Rect) -> f64 {
        let x1 = f64::from(a.x1.max(b.x1));
        let y1 = f64::from(a.y1.max(b.y1));
        let x2 = f64::from(a.x2.min(b.x2));
        let y2 = f64::from(a.y2.min(b.y2));
        let w = x2 - x1;
        let h = y2 - y1;
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Fraction of `reference` covered by `other`.
    pub fn coverage(reference: &Rect, other: &Rect) -> f64 {
        let area = reference.area();
        if area <= 0.0 {
            return 0.0;
        }
        Self::intersection_area(reference, other) / area
    }

    pub fn iou(a: &Rect, b: &Rect) -> f64 {
        let inter = Self::intersection_area(a, b);
        let union = a.area() + b.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(GeometryHelper::intersection_area(&a, &b), 0.0);
    }

    #[test]
    fn coverage_is_relative_to_reference_area() {
        let slot = Rect::new(0.0, 0.0, 10.0, 10.0);
        let car = Rect::new(5.0, 0.0, 15.0, 10.0);
        assert_eq!(GeometryHelper::coverage(&slot, &car), 0.5);

        let big = Rect::new(-100.0, -100.0, 100.0, 100.0);
        assert_eq!(GeometryHelper::coverage(&slot, &big), 1.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Rect::new(1.0, 1.0, 4.0, 4.0);
        assert_eq!(GeometryHelper::iou(&a, &a), 1.0);
        let b = Rect::new(2.5, 1.0, 5.5, 4.0);
        assert!((GeometryHelper::iou(&a, &b) - 4.5 / 13.5).abs() < 1e-9);
    }
}
