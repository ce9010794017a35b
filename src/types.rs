/// A coordinate relative to the parent node.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Coord {
    /// Offset in surface units.
    Absolute(f64),
    /// Fraction of the parent's measured extent (`0.5` = middle).
    Percent(f64),
}

impl Coord {
    /// Resolves the coordinate against the parent's extent on the same axis.
    pub fn resolve(self, extent: f64) -> f64 {
        match self {
            Self::Absolute(v) => v,
            Self::Percent(p) => p * extent,
        }
    }
}

impl Default for Coord {
    fn default() -> Self {
        Self::Absolute(0.0)
    }
}

/// Accumulated (absolute) placement of a node on the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        x: 0.0,
        y: 0.0,
        scale: 1.0,
        rotation: 0.0,
    };

    /// Composes a child's local offset/scale/rotation onto this (parent) transform.
    ///
    /// The offset is expressed in the parent's space, so it is rotated and scaled by the
    /// parent before being translated.
    pub fn then(self, dx: f64, dy: f64, scale: f64, rotation: f64) -> Transform {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let (rx, ry) = (dx * cos - dy * sin, dx * sin + dy * cos);
        Transform {
            x: self.x + rx * self.scale,
            y: self.y + ry * self.scale,
            scale: self.scale * scale,
            rotation: self.rotation + rotation,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A measured bounding box in the node's local space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lifecycle {
    #[default]
    New,
    Initializing,
    Inited,
}

/// Visibility substate, orthogonal to [`Lifecycle`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    Showing,
    Hiding,
}

impl Visibility {
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Showing | Self::Hiding)
    }
}

/// How a container arranges its enabled children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// Children keep their own coordinates.
    #[default]
    Absolute,
    /// Children are stacked left to right by measured width.
    Horizontal,
    /// Children are stacked top to bottom by measured height.
    Vertical,
}

/// The edge of a zoom window that stays put while the other one is adjusted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    #[default]
    Start,
    End,
}

impl Priority {
    pub fn opposite(self) -> Self {
        match self {
            Self::Start => Self::End,
            Self::End => Self::Start,
        }
    }
}

/// A fractional window request (`0.0..=1.0` spans the whole data set).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoomRange {
    pub start: f64,
    pub end: f64,
    pub priority: Option<Priority>,
}

impl ZoomRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// A half-open range of item indexes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexRange {
    pub start_index: usize,
    pub end_index: usize, // exclusive
}

impl IndexRange {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn offsets_follow_the_parent_scale() {
        let parent = Transform {
            x: 5.0,
            y: 5.0,
            scale: 2.0,
            rotation: 0.0,
        };
        let t = parent.then(10.0, 1.0, 0.5, 0.0);
        assert!(close(t.x, 25.0) && close(t.y, 7.0));
        assert!(close(t.scale, 1.0));
    }

    #[test]
    fn offsets_are_rotated_by_the_parent() {
        let parent = Transform {
            rotation: 90.0,
            ..Transform::IDENTITY
        };
        let t = parent.then(10.0, 0.0, 1.0, 15.0);
        assert!(close(t.x, 0.0), "x = {}", t.x);
        assert!(close(t.y, 10.0), "y = {}", t.y);
        assert!(close(t.rotation, 105.0));

        let half_turn = Transform {
            x: 1.0,
            y: 1.0,
            scale: 1.0,
            rotation: 180.0,
        };
        let t = half_turn.then(3.0, 4.0, 1.0, 0.0);
        assert!(close(t.x, -2.0) && close(t.y, -3.0));
    }
}
