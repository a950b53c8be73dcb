use glam::Affine3A;
use ovr_overlay::pose::Matrix3x4;

/// Longest overlay friendly name OpenVR accepts, excluding the terminator.
const MAX_NAME_LEN: usize = 127;

pub trait Affine3AConvert {
    fn from_affine(affine: &Affine3A) -> Self;
}

impl Affine3AConvert for Matrix3x4 {
    fn from_affine(affine: &Affine3A) -> Self {
        Self([
            [
                affine.matrix3.x_axis.x,
                affine.matrix3.y_axis.x,
                affine.matrix3.z_axis.x,
                affine.translation.x,
            ],
            [
                affine.matrix3.x_axis.y,
                affine.matrix3.y_axis.y,
                affine.matrix3.z_axis.y,
                affine.translation.y,
            ],
            [
                affine.matrix3.x_axis.z,
                affine.matrix3.y_axis.z,
                affine.matrix3.z_axis.z,
                affine.translation.z,
            ],
        ])
    }
}

/// Turns a bottom-up RGBA upload back into top-down rows.
pub fn rows_top_down(rgba: &[u8], width: u32) -> Vec<u8> {
    let stride = width as usize * 4;
    if stride == 0 {
        return Vec::new();
    }
    rgba.chunks_exact(stride).rev().flatten().copied().collect()
}

/// Cuts `name` to the friendly-name limit on a char boundary.
pub fn friendly_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
