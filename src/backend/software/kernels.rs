//! CPU mirrors of the outline WGSL programs.
//!
//! Every kernel evaluates one destination texel at a time, sampling its
//! inputs the way a linear clamp-to-edge sampler would. When an input has the
//! same size as the destination, texel centers line up exactly and the texel
//! is fetched directly, which keeps same-size copies bit exact.

use glam::{Vec2, Vec3, Vec4};

/// Threshold below which a color channel counts as "no signal".
pub const SIGNAL_EPSILON: f32 = 1e-4;

/// Owned snapshot of a texture's texels, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec4>,
}

impl Image {
    #[must_use]
    pub fn filled(width: u32, height: u32, value: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    /// 1x1 black texel bound in place of a missing texture.
    #[must_use]
    pub fn fallback() -> Self {
        Self::filled(1, 1, Vec4::ZERO)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Texel at `(x, y)`, clamped to the edge.
    #[must_use]
    pub fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.pixels[self.index(x, y)]
    }

    /// Bilinear sample at normalized `uv`.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let px = uv.x * self.width as f32 - 0.5;
        let py = uv.y * self.height as f32 - 0.5;
        let x0 = px.floor();
        let y0 = py.floor();
        let fx = px - x0;
        let fy = py - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), fx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    #[inline]
    fn same_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Value seen by destination texel `(x, y)` of a `width`x`height` target,
    /// offset by `offset` source texels.
    fn fetch(&self, x: u32, y: u32, width: u32, height: u32, offset: Vec2) -> Vec4 {
        if self.same_size(width, height) {
            return self.texel(
                i64::from(x) + offset.x as i64,
                i64::from(y) + offset.y as i64,
            );
        }
        let uv = texel_center_uv(x, y, width, height);
        let texel_size = Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32);
        self.sample(uv + offset * texel_size)
    }
}

#[inline]
fn texel_center_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

fn for_each_texel(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Vec4) -> Vec<Vec4> {
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            out.push(f(x, y));
        }
    }
    out
}

// ============================================================================
// Kernels
// ============================================================================

/// Plain blit: copy, rescaling with bilinear filtering when sizes differ.
#[must_use]
pub fn copy(source: &Image, width: u32, height: u32) -> Vec<Vec4> {
    for_each_texel(width, height, |x, y| source.fetch(x, y, width, height, Vec2::ZERO))
}

/// `outlines/copy_identification`: resample the identification buffer.
#[must_use]
pub fn copy_identification(identification: &Image, width: u32, height: u32) -> Vec<Vec4> {
    copy(identification, width, height)
}

/// `outlines/blur`: one axis of the separable gaussian.
///
/// `weights[0]` is the center tap, `weights[i]` applies at `±i` texels.
#[must_use]
pub fn blur(source: &Image, width: u32, height: u32, horizontal: bool, weights: &[f32]) -> Vec<Vec4> {
    let axis = if horizontal { Vec2::X } else { Vec2::Y };
    for_each_texel(width, height, |x, y| {
        let mut color = Vec4::ZERO;
        for (i, weight) in weights.iter().enumerate() {
            if i == 0 {
                color += source.fetch(x, y, width, height, Vec2::ZERO) * *weight;
                continue;
            }
            let offset = axis * i as f32;
            color += source.fetch(x, y, width, height, offset) * *weight;
            color += source.fetch(x, y, width, height, -offset) * *weight;
        }
        color
    })
}

/// `outlines/mask` for a single texel.
#[must_use]
pub fn mask_texel(blurred: Vec4, raw: Vec4, saved: Vec4, opacity: f32) -> Vec4 {
    let intensity = blurred.truncate().max_element();
    let interior = if raw.truncate().max_element() > SIGNAL_EPSILON {
        1.0
    } else {
        0.0
    };
    let weight = opacity * intensity.clamp(0.0, 1.0) * (1.0 - interior);
    let tint: Vec3 = blurred.truncate() / intensity.max(SIGNAL_EPSILON);
    saved.truncate().lerp(tint, weight).extend(saved.w)
}

/// `outlines/mask`: combine blurred signal, raw identification and the
/// saved camera color.
#[must_use]
pub fn mask(
    blurred: &Image,
    raw: &Image,
    saved: &Image,
    opacity: f32,
    width: u32,
    height: u32,
) -> Vec<Vec4> {
    for_each_texel(width, height, |x, y| {
        mask_texel(
            blurred.fetch(x, y, width, height, Vec2::ZERO),
            raw.fetch(x, y, width, height, Vec2::ZERO),
            saved.fetch(x, y, width, height, Vec2::ZERO),
            opacity,
        )
    })
}
