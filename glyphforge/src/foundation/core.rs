use serde::{Deserialize, Serialize};

use crate::foundation::error::{ForgeError, ForgeResult};

/// Writing direction of a rendered text line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::LeftToRight | Self::RightToLeft)
    }

    pub fn is_vertical(self) -> bool {
        !self.is_horizontal()
    }
}

/// Line alignment. Left/center/right apply to horizontal directions,
/// top/center/bottom to vertical ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlignment {
    Left,
    Center,
    Right,
    Top,
    Bottom,
}

impl TextAlignment {
    pub fn valid_for(self, direction: Direction) -> bool {
        match self {
            Self::Center => true,
            Self::Left | Self::Right => direction.is_horizontal(),
            Self::Top | Self::Bottom => direction.is_vertical(),
        }
    }
}

/// Plain 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Relative luminance with ITU-R 601 weights, in [0, 1].
    pub fn luminance(self) -> f64 {
        (0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b)) / 255.0
    }

    /// Maximum-contrast counterpart: white for dark colors, black for light.
    pub fn contrasting(self) -> Rgb {
        if self.luminance() < 0.5 {
            Rgb::WHITE
        } else {
            Rgb::BLACK
        }
    }
}

/// Axis-aligned character bounding box in the pixel frame of whatever surface
/// currently owns it. `line_index` is 0 for single-line images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterBox {
    #[serde(rename = "char")]
    pub ch: char,
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
    pub line_index: u32,
    #[serde(default)]
    pub truncated: bool,
}

impl CharacterBox {
    pub fn new(ch: char, x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            ch,
            x0,
            y0,
            x1,
            y1,
            line_index: 0,
            truncated: false,
        }
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.x0 += dx;
        self.x1 += dx;
        self.y0 += dy;
        self.y1 += dy;
    }

    /// The four corners in clockwise order from the top-left.
    pub fn corners(&self) -> [(f32, f32); 4] {
        [
            (self.x0 as f32, self.y0 as f32),
            (self.x1 as f32, self.y0 as f32),
            (self.x1 as f32, self.y1 as f32),
            (self.x0 as f32, self.y1 as f32),
        ]
    }

    /// Replace coordinates with the axis-aligned hull of `corners`.
    pub fn set_from_hull(&mut self, corners: &[(f32, f32)]) {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for &(x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        self.x0 = min_x.floor() as i32;
        self.y0 = min_y.floor() as i32;
        self.x1 = max_x.ceil() as i32;
        self.y1 = max_y.ceil() as i32;
    }

    /// Clip to `[0, w) x [0, h)`, setting `truncated` when anything was cut.
    /// Returns false when nothing of the box remains.
    pub fn clip_to(&mut self, w: u32, h: u32) -> bool {
        let (w, h) = (w as i32, h as i32);
        let cx0 = self.x0.clamp(0, w);
        let cy0 = self.y0.clamp(0, h);
        let cx1 = self.x1.clamp(0, w);
        let cy1 = self.y1.clamp(0, h);
        if (cx0, cy0, cx1, cy1) != (self.x0, self.y0, self.x1, self.y1) {
            self.truncated = true;
        }
        self.x0 = cx0;
        self.y0 = cy0;
        self.x1 = cx1;
        self.y1 = cy1;
        cx1 > cx0 && cy1 > cy0
    }
}

/// Separable Gaussian blur of a single 8-bit channel, fixed-point Q16.
///
/// Integer arithmetic keeps the result bit-stable across platforms, which the
/// determinism contract relies on for alpha-channel effects.
pub(crate) fn blur_channel(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> ForgeResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| ForgeError::invariant("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(ForgeError::invariant(
            "blur_channel expects src matching width*height",
        ));
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let taps = blur_taps_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    let r = (taps.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ti, &tap) in taps.iter().enumerate() {
                let sx = (x + ti as i32 - r).clamp(0, w - 1);
                acc += u64::from(tap) * u64::from(src[(y * w + sx) as usize]);
            }
            tmp[(y * w + x) as usize] = round_q16(acc);
        }
    }
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u64;
            for (ti, &tap) in taps.iter().enumerate() {
                let sy = (y + ti as i32 - r).clamp(0, h - 1);
                acc += u64::from(tap) * u64::from(tmp[(sy * w + x) as usize]);
            }
            out[(y * w + x) as usize] = round_q16(acc);
        }
    }
    Ok(out)
}

/// Gaussian taps in Q16 fixed point. The last tap absorbs rounding drift so
/// the taps always sum to exactly one, which is what keeps a constant channel
/// invariant under blurring.
fn blur_taps_q16(radius: u32, sigma: f32) -> ForgeResult<Vec<u32>> {
    const ONE_Q16: i64 = 1 << 16;

    if radius == 0 {
        return Ok(vec![ONE_Q16 as u32]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ForgeError::invariant("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let raw: Vec<f64> = (-r..=r)
        .map(|i| (-f64::from(i * i) / denom).exp())
        .collect();
    let total: f64 = raw.iter().sum();

    let mut taps = Vec::with_capacity(raw.len());
    let mut assigned: i64 = 0;
    for (i, &weight) in raw.iter().enumerate() {
        let q = if i + 1 == raw.len() {
            (ONE_Q16 - assigned).clamp(0, ONE_Q16)
        } else {
            (((weight / total) * ONE_Q16 as f64).round() as i64).clamp(0, ONE_Q16)
        };
        assigned += q;
        taps.push(q as u32);
    }
    Ok(taps)
}

fn round_q16(acc: u64) -> u8 {
    (((acc + (1 << 15)) >> 16).min(255)) as u8
}
