// q_shared.rs - math helpers and types shared by every collision query

pub type Vec3 = [f32; 3];

pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

// ============================================================
// Content flags
// ============================================================

bitflags::bitflags! {
    /// Contents bitmask carried by leaves, brushes and trace results.
    /// Unknown bits are retained so masks like `MASK_ALL` round-trip.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Contents: i32 {
        const SOLID         = 1;
        const WINDOW        = 2;
        const AUX           = 4;
        const LAVA          = 8;
        const SLIME         = 16;
        const WATER         = 32;
        const MIST          = 64;
        const AREAPORTAL    = 0x8000;
        const PLAYERCLIP    = 0x10000;
        const MONSTERCLIP   = 0x20000;
        const CURRENT_0     = 0x40000;
        const CURRENT_90    = 0x80000;
        const CURRENT_180   = 0x100000;
        const CURRENT_270   = 0x200000;
        const CURRENT_UP    = 0x400000;
        const CURRENT_DOWN  = 0x800000;
        const ORIGIN        = 0x1000000;
        const MONSTER       = 0x2000000;
        const DEADMONSTER   = 0x4000000;
        const DETAIL        = 0x8000000;
        const TRANSLUCENT   = 0x10000000;
        const LADDER        = 0x20000000;
    }
}

pub const CONTENTS_EMPTY: Contents = Contents::empty();
pub const CONTENTS_SOLID: Contents = Contents::SOLID;
pub const CONTENTS_WATER: Contents = Contents::WATER;
pub const CONTENTS_MONSTER: Contents = Contents::MONSTER;

// ============================================================
// Content masks
// ============================================================

pub const MASK_ALL: Contents = Contents::from_bits_retain(-1);
pub const MASK_SOLID: Contents = Contents::SOLID.union(Contents::WINDOW);
pub const MASK_PLAYERSOLID: Contents = Contents::SOLID
    .union(Contents::PLAYERCLIP)
    .union(Contents::WINDOW)
    .union(Contents::MONSTER);
pub const MASK_DEADSOLID: Contents = Contents::SOLID
    .union(Contents::PLAYERCLIP)
    .union(Contents::WINDOW);
pub const MASK_MONSTERSOLID: Contents = Contents::SOLID
    .union(Contents::MONSTERCLIP)
    .union(Contents::WINDOW)
    .union(Contents::MONSTER);
pub const MASK_WATER: Contents = Contents::WATER.union(Contents::LAVA).union(Contents::SLIME);
pub const MASK_OPAQUE: Contents = Contents::SOLID.union(Contents::SLIME).union(Contents::LAVA);
pub const MASK_SHOT: Contents = Contents::SOLID
    .union(Contents::MONSTER)
    .union(Contents::WINDOW)
    .union(Contents::DEADMONSTER);

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    /// Bit `j` set when `normal[j] < 0`; selects the box corners in
    /// [`box_on_plane_side`].
    pub signbits: u8,
}

impl CPlane {
    pub fn new(normal: Vec3, dist: f32, plane_type: u8) -> Self {
        Self {
            normal,
            dist,
            plane_type,
            signbits: signbits_for_plane(&normal),
        }
    }

    /// True for the three axial types, where the normal is a unit axis and
    /// a raw coordinate can stand in for the dot product.
    #[inline]
    pub fn is_axial(&self) -> bool {
        self.plane_type < 3
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        if self.is_axial() {
            p[self.plane_type as usize] - self.dist
        } else {
            dot_product(&self.normal, p) - self.dist
        }
    }
}

pub fn signbits_for_plane(normal: &Vec3) -> u8 {
    let mut bits = 0u8;
    for (j, n) in normal.iter().enumerate() {
        if *n < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// Collision model / surface
// ============================================================

/// An inline brush model (`*1`, `*2`, ...). Model 0 is the world itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CSurface {
    pub name: [u8; 16],
    pub flags: i32,
    pub value: i32,
}

impl CSurface {
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSurface {
    pub c: CSurface,
    /// Full texture name; `c.name` is truncated to 15 characters.
    pub rname: [u8; 32],
}

// ============================================================
// Trace
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// The whole sweep stayed inside solid.
    pub allsolid: bool,
    /// The sweep started inside solid.
    pub startsolid: bool,
    pub fraction: f32,
    pub endpos: Vec3,
    /// Plane struck; None when nothing was hit or for position tests.
    pub plane: Option<CPlane>,
    pub surface: Option<CSurface>,
    pub contents: Contents,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: [0.0; 3],
            plane: None,
            surface: None,
            contents: Contents::empty(),
        }
    }
}

// ============================================================
// MATHLIB
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_lerp(a: &Vec3, b: &Vec3, frac: f32) -> Vec3 {
    [
        a[0] + frac * (b[0] - a[0]),
        a[1] + frac * (b[1] - a[1]),
        a[2] + frac * (b[2] - a[2]),
    ]
}

#[inline]
pub fn vector_is_zero(v: &Vec3) -> bool {
    v[0] == 0.0 && v[1] == 0.0 && v[2] == 0.0
}

/// Returns (forward, right, up) for pitch/yaw/roll angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Rotates `v` into the frame described by forward/right/up. Right is
/// negated because model space is left-handed in y.
#[inline]
pub fn rotate_into_frame(v: &Vec3, forward: &Vec3, right: &Vec3, up: &Vec3) -> Vec3 {
    [
        dot_product(v, forward),
        -dot_product(v, right),
        dot_product(v, up),
    ]
}

/// Box-versus-plane test: 1 = entirely in front, 2 = entirely behind,
/// 3 = crossing.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.is_axial() {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // pick the corner furthest along the normal and its opposite
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for j in 0..3 {
        if p.signbits & (1 << j) != 0 {
            far[j] = emins[j];
            near[j] = emaxs[j];
        } else {
            far[j] = emaxs[j];
            near[j] = emins[j];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}
