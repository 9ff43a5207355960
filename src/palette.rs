// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

const FALLBACK_STOP: [u8; 4] = [255, 255, 255, 255];

/// 1xN RGBA lookup table sampled by velocity magnitude.
///
/// Built once from the configured color stops. A single stop is doubled so
/// the table always has a valid two-stop gradient, and an empty list falls
/// back to white-to-white.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteTexture {
    texels: Vec<[u8; 4]>,
}

impl PaletteTexture {
    pub fn from_stops<S: AsRef<str>>(stops: &[S]) -> Self {
        let mut texels: Vec<[u8; 4]> = stops
            .iter()
            .map(|stop| {
                parse_hex_color(stop.as_ref()).unwrap_or_else(|| {
                    log::warn!("Unrecognised color stop {:?}, using white", stop.as_ref());
                    FALLBACK_STOP
                })
            })
            .collect();

        match texels.len() {
            0 => {
                log::warn!("Empty color list, using a white gradient");
                texels = vec![FALLBACK_STOP; 2];
            }
            1 => texels.push(texels[0]),
            _ => {}
        }

        Self { texels }
    }

    pub fn width(&self) -> u32 {
        self.texels.len() as u32
    }

    pub fn texels(&self) -> &[[u8; 4]] {
        &self.texels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Linear-filtered, clamp-to-edge lookup at `u` in [0, 1], matching what
    /// the GPU sampler returns for the same coordinate.
    pub fn sample(&self, u: f32) -> [f32; 3] {
        let n = self.texels.len();
        let x = (u.clamp(0.0, 1.0) * n as f32 - 0.5).max(0.0);
        let i0 = (x.floor() as usize).min(n - 1);
        let i1 = (i0 + 1).min(n - 1);
        let t = x - x.floor();

        let a = self.texels[i0];
        let b = self.texels[i1];
        let mut rgb = [0.0; 3];
        for (c, out) in rgb.iter_mut().enumerate() {
            let lo = a[c] as f32 / 255.0;
            let hi = b[c] as f32 / 255.0;
            *out = lo + (hi - lo) * t;
        }
        rgb
    }
}

/// Parses `#rgb`, `#rrggbb` and `#rrggbbaa` (leading `#` optional).
/// Palette stops are always opaque, any alpha digits are ignored.
pub fn parse_hex_color(text: &str) -> Option<[u8; 4]> {
    let hex = text.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 16 + v;
            }
            Some([rgb[0], rgb[1], rgb[2], 255])
        }
        6 | 8 => Some([channel(0)?, channel(2)?, channel(4)?, 255]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex() {
        assert_eq!(parse_hex_color("#5227FF"), Some([0x52, 0x27, 0xff, 255]));
        assert_eq!(parse_hex_color("fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("#b19eef80"), Some([0xb1, 0x9e, 0xef, 255]));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);
    }

    #[test]
    fn single_stop_is_doubled() {
        let palette = PaletteTexture::from_stops(&["#ffffff"]);
        assert_eq!(palette.width(), 2);
        assert_eq!(palette.texels()[0], palette.texels()[1]);
    }

    #[test]
    fn empty_list_falls_back_to_white() {
        let palette = PaletteTexture::from_stops::<&str>(&[]);
        assert_eq!(palette.texels(), &[[255, 255, 255, 255]; 2]);
    }

    #[test]
    fn invalid_stop_becomes_white() {
        let palette = PaletteTexture::from_stops(&["#000000", "not-a-color"]);
        assert_eq!(palette.texels()[1], [255, 255, 255, 255]);
    }

    #[test]
    fn sample_interpolates_between_texel_centers() {
        let palette = PaletteTexture::from_stops(&["#000000", "#ffffff"]);
        assert_eq!(palette.sample(0.0), [0.0; 3]);
        assert_eq!(palette.sample(1.0), [1.0; 3]);
        let mid = palette.sample(0.5);
        assert!((mid[0] - 0.5).abs() < 1e-6);
    }
}
