use serde::{Deserialize, Serialize};

/// Normalized position on a plan, both axes in `[0, 1]` relative to the plan's
/// intrinsic width and height. Serialized as `{"dx": .., "dy": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Offset {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.dx) && (0.0..=1.0).contains(&self.dy)
    }
}

/// Scale-to-fit transform of a plan image centered inside a viewport.
///
/// Both marker rendering and tap interpretation go through the same value, so
/// a picked position always lands where its marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub source_width: f64,
    pub source_height: f64,
}

impl Letterbox {
    fn image_width(&self) -> f64 {
        self.source_width * self.scale
    }

    fn image_height(&self) -> f64 {
        self.source_height * self.scale
    }

    /// Screen pixel to plan coordinate. `None` when the tap misses the image.
    pub fn to_normalized(&self, px: f64, py: f64) -> Option<Offset> {
        let width = self.image_width();
        let height = self.image_height();
        if !(width > 0.0 && height > 0.0) {
            return None;
        }

        let offset = Offset::new((px - self.offset_x) / width, (py - self.offset_y) / height);
        offset.is_normalized().then_some(offset)
    }

    /// Plan coordinate to screen pixel, used for marker placement.
    pub fn to_screen(&self, offset: Offset) -> (f64, f64) {
        (
            self.offset_x + offset.dx * self.image_width(),
            self.offset_y + offset.dy * self.image_height(),
        )
    }
}

/// Fit a `source_width x source_height` image into the viewport without ever
/// enlarging it past native resolution, centered with uniform margins.
///
/// Degenerate sizes (zero, negative or NaN) produce a zero scale; every tap is
/// then outside the image.
pub fn scale_to_fit(
    source_width: f64,
    source_height: f64,
    viewport_width: f64,
    viewport_height: f64,
) -> Letterbox {
    let valid = [source_width, source_height, viewport_width, viewport_height]
        .iter()
        .all(|v| *v > 0.0);

    let scale = if valid {
        (viewport_width / source_width)
            .min(viewport_height / source_height)
            .min(1.0)
    } else {
        0.0
    };

    Letterbox {
        scale,
        offset_x: (viewport_width.max(0.0) - source_width.max(0.0) * scale) / 2.0,
        offset_y: (viewport_height.max(0.0) - source_height.max(0.0) * scale) / 2.0,
        source_width,
        source_height,
    }
}

pub fn screen_to_normalized(
    px: f64,
    py: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    source_width: f64,
    source_height: f64,
) -> Option<Offset> {
    Letterbox {
        scale,
        offset_x,
        offset_y,
        source_width,
        source_height,
    }
    .to_normalized(px, py)
}

pub fn normalized_to_screen(
    offset: Offset,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    source_width: f64,
    source_height: f64,
) -> (f64, f64) {
    Letterbox {
        scale,
        offset_x,
        offset_y,
        source_width,
        source_height,
    }
    .to_screen(offset)
}

/// Arithmetic mean of the vertices. Only meant for label placement, this is not
/// the area-weighted centroid.
pub fn polygon_centroid(vertices: &[Offset]) -> Option<Offset> {
    if vertices.is_empty() {
        return None;
    }

    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), v| (sx + v.dx, sy + v.dy));
    Some(Offset::new(sx / n, sy / n))
}

/// Index of the marker closest to the tap, if any lies within `radius` pixels.
pub fn hit_test<I>(markers: I, tap: (f64, f64), radius: f64) -> Option<usize>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    markers
        .into_iter()
        .enumerate()
        .map(|(index, (x, y))| (index, (x - tap.0).hypot(y - tap.1)))
        .filter(|(_, distance)| *distance <= radius)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// Bring a per-plan list to exactly `plans` entries: the last known value is
/// repeated forward, extra entries are dropped. An empty list stays empty.
/// Returns true when the list changed.
pub fn pad_to_plans<T: Clone>(items: &mut Vec<T>, plans: usize) -> bool {
    let before = items.len();
    if before > plans {
        items.truncate(plans);
    } else if let Some(last) = items.last().cloned() {
        items.resize(plans, last);
    }
    items.len() != before
}
