use serde::{Deserialize, Serialize};

/// Point or extent in the shared scene frame. Serialized as `[x, y, z]` to
/// match the scene wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn distance_xy(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Orientation quaternion, serialized as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.norm() - 1.0).abs() <= tolerance
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl From<[f64; 4]> for Quat {
    fn from(v: [f64; 4]) -> Self {
        Quat::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Quat> for [f64; 4] {
    fn from(q: Quat) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

/// Smallest extent any object is allowed to have along an axis; keeps
/// degenerate flat boxes out of the overlap math.
pub const MIN_OBJECT_SIZE: f64 = 0.01;

/// Axis-aligned bounding box derived from a node's pose and size. Relation
/// tests treat every OBB as axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    pub half: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center,
            half: Vec3::new(
                size.x.max(MIN_OBJECT_SIZE) / 2.0,
                size.y.max(MIN_OBJECT_SIZE) / 2.0,
                size.z.max(MIN_OBJECT_SIZE) / 2.0,
            ),
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center.sub(&self.half)
    }

    pub fn max(&self) -> Vec3 {
        self.center.add(&self.half)
    }

    /// Z coordinate of the bottom face.
    pub fn bottom(&self) -> f64 {
        self.center.z - self.half.z
    }

    /// Z coordinate of the top face.
    pub fn top(&self) -> f64 {
        self.center.z + self.half.z
    }

    pub fn footprint_area(&self) -> f64 {
        (self.half.x * 2.0) * (self.half.y * 2.0)
    }

    pub fn contains_point(&self, p: &Vec3) -> bool {
        let min = self.min();
        let max = self.max();
        p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && p.z >= min.z && p.z <= max.z
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let (amin, amax) = (self.min(), self.max());
        let (bmin, bmax) = (other.min(), other.max());
        !(amax.x <= bmin.x
            || bmax.x <= amin.x
            || amax.y <= bmin.y
            || bmax.y <= amin.y
            || amax.z <= bmin.z
            || bmax.z <= amin.z)
    }

    /// Area where the XY projections of the two boxes overlap.
    pub fn xy_overlap_area(&self, other: &Aabb) -> f64 {
        let (amin, amax) = (self.min(), self.max());
        let (bmin, bmax) = (other.min(), other.max());
        let dx = amax.x.min(bmax.x) - amin.x.max(bmin.x);
        let dy = amax.y.min(bmax.y) - amin.y.max(bmin.y);
        if dx <= 0.0 || dy <= 0.0 {
            0.0
        } else {
            dx * dy
        }
    }

    /// Fraction of this box's footprint covered by `other`'s XY projection.
    pub fn xy_overlap_fraction(&self, other: &Aabb) -> f64 {
        let area = self.footprint_area();
        if area <= 0.0 {
            0.0
        } else {
            self.xy_overlap_area(other) / area
        }
    }

    /// Slab test: does the segment from `from` to `to` pass through this box?
    pub fn intersects_segment(&self, from: &Vec3, to: &Vec3) -> bool {
        let min: [f64; 3] = self.min().into();
        let max: [f64; 3] = self.max().into();
        let origin: [f64; 3] = (*from).into();
        let dir: [f64; 3] = to.sub(from).into();

        let mut t_enter: f64 = 0.0;
        let mut t_exit: f64 = 1.0;
        for axis in 0..3 {
            if dir[axis].abs() < 1e-12 {
                if origin[axis] < min[axis] || origin[axis] > max[axis] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir[axis];
            let mut t0 = (min[axis] - origin[axis]) * inv;
            let mut t1 = (max[axis] - origin[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return false;
            }
        }
        true
    }
}

/// Center position that sits a box of `size` flat on the floor at `floor_z`.
pub fn align_to_ground(center: &Vec3, size: &Vec3, floor_z: f64) -> Vec3 {
    Vec3::new(center.x, center.y, floor_z + size.z.max(MIN_OBJECT_SIZE) / 2.0)
}

/// Center position that rests a box of `size` on `surface`'s top face,
/// shifted by an XY offset from the surface center.
pub fn place_on_surface(surface: &Aabb, size: &Vec3, offset: (f64, f64)) -> Vec3 {
    Vec3::new(
        surface.center.x + offset.0,
        surface.center.y + offset.1,
        surface.top() + size.z.max(MIN_OBJECT_SIZE) / 2.0,
    )
}

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}
