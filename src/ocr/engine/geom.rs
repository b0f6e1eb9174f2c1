use crate::ocr::Quad;

/// Axis-aligned rectangle spanned by a quad's 0-2 diagonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct AxisRect {
    pub(super) x1: f32,
    pub(super) y1: f32,
    pub(super) x2: f32,
    pub(super) y2: f32,
}

impl AxisRect {
    pub(super) fn from_diagonal(quad: &Quad) -> Self {
        let [a, _, c, _] = quad;
        Self {
            x1: a[0].min(c[0]),
            y1: a[1].min(c[1]),
            x2: a[0].max(c[0]),
            y2: a[1].max(c[1]),
        }
    }

    pub(super) fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }
}

/// Intersection over union of the diagonal rectangles of two quads.
///
/// Returns 0 for disjoint rectangles and for rectangles without positive area.
pub fn iou(a: &Quad, b: &Quad) -> f32 {
    let a = AxisRect::from_diagonal(a);
    let b = AxisRect::from_diagonal(b);

    let area_a = a.area();
    let area_b = b.area();
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }

    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }

    let inter = (ix2 - ix1) * (iy2 - iy1);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    (inter / union).clamp(0.0, 1.0)
}

pub(super) fn vcenter(quad: &Quad) -> f32 {
    quad.iter().map(|point| point[1]).sum::<f32>() / quad.len() as f32
}

pub(super) fn hcenter(quad: &Quad) -> f32 {
    quad.iter().map(|point| point[0]).sum::<f32>() / quad.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Quad {
        [[x1, y1], [x2, y1], [x2, y2], [x1, y2]]
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = rect(10.0, 10.0, 100.0, 30.0);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let boxes = [
            rect(0.0, 0.0, 10.0, 10.0),
            rect(5.0, 5.0, 15.0, 15.0),
            rect(9.0, 0.0, 30.0, 4.0),
            rect(20.0, 20.0, 40.0, 40.0),
            rect(3.0, 3.0, 3.0, 8.0),
        ];
        for a in &boxes {
            for b in &boxes {
                let ab = iou(a, b);
                assert_eq!(ab, iou(b, a));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn iou_partial_overlap() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 0.0, 15.0, 10.0);
        let value = iou(&a, &b);
        assert!((value - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn iou_uses_diagonal_regardless_of_corner_order() {
        let a = [[100.0, 30.0], [10.0, 30.0], [10.0, 10.0], [100.0, 10.0]];
        let b = rect(10.0, 10.0, 100.0, 30.0);
        assert_eq!(iou(&a, &b), 1.0);
    }

    #[test]
    fn iou_is_zero_for_disjoint_or_degenerate() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &rect(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert_eq!(iou(&a, &rect(10.0, 0.0, 20.0, 10.0)), 0.0);
        let flat = rect(2.0, 5.0, 8.0, 5.0);
        assert_eq!(iou(&flat, &flat), 0.0);
    }

    #[test]
    fn centers_average_all_points() {
        let quad = [[0.0, 0.0], [10.0, 2.0], [10.0, 12.0], [0.0, 10.0]];
        assert_eq!(hcenter(&quad), 5.0);
        assert_eq!(vcenter(&quad), 6.0);
    }
}
