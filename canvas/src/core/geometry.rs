//! Board dimensions and cell coordinates.

use std::fmt;

/// Width and height of the board in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        (0..i64::from(self.width)).contains(&x) && (0..i64::from(self.height)).contains(&y)
    }

    /// Convert raw (possibly negative) coordinates into a point on this board.
    pub fn point(&self, x: i64, y: i64) -> Option<Point> {
        if !self.contains(x, y) {
            return None;
        }
        Some(Point {
            x: x as u32,
            y: y as u32,
        })
    }

    /// Dense index of `point`, column-major (ascending x, then ascending y).
    pub fn index(&self, point: Point) -> usize {
        point.x as usize * self.height as usize + point.y as usize
    }

    /// All points in index order.
    pub fn points(&self) -> impl Iterator<Item = Point> + use<> {
        let height = self.height;
        (0..self.width).flat_map(move |x| (0..height).map(move |y| Point { x, y }))
    }
}

/// A coordinate known to be on the board it was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    /// Storage/wire key for this point: `"x,y"`.
    pub fn key(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// Parse a `"x,y"` key. Does not check bounds.
    pub fn parse_key(key: &str) -> Option<Point> {
        let (x, y) = key.split_once(',')?;
        Some(Point {
            x: x.trim().parse().ok()?,
            y: y.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_half_open() {
        let dims = Dimensions::new(2, 3);
        assert!(dims.contains(0, 0));
        assert!(dims.contains(1, 2));
        assert!(!dims.contains(2, 0));
        assert!(!dims.contains(0, 3));
        assert!(!dims.contains(-1, 0));
        assert_eq!(dims.point(1, 2), Some(Point { x: 1, y: 2 }));
        assert_eq!(dims.point(0, -1), None);
    }

    #[test]
    fn points_walk_x_then_y() {
        let dims = Dimensions::new(2, 2);
        let keys: Vec<String> = dims.points().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["0,0", "0,1", "1,0", "1,1"]);
        for (i, point) in dims.points().enumerate() {
            assert_eq!(dims.index(point), i);
        }
    }

    #[test]
    fn parses_keys() {
        assert_eq!(Point::parse_key("12,7"), Some(Point { x: 12, y: 7 }));
        assert_eq!(Point::parse_key("12"), None);
        assert_eq!(Point::parse_key("-1,2"), None);
    }
}
