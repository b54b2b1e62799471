// ============================================================================
// BLEND MODES — per-pixel compositing functions
// ============================================================================

use bitflags::bitflags;
use image::Rgba;

/// Layer opacity, `0` = transparent, `255` = opaque.
pub type Opacity = u8;

pub const OPACITY_TRANSPARENT: Opacity = 0;
pub const OPACITY_OPAQUE: Opacity = 255;

bitflags! {
    /// Which channels a composite is allowed to write.  Disabled channels keep
    /// the destination's value.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChannelFlags: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
    }
}

impl Default for ChannelFlags {
    fn default() -> Self {
        ChannelFlags::all()
    }
}

impl ChannelFlags {
    const ORDER: [ChannelFlags; 4] = [
        ChannelFlags::RED,
        ChannelFlags::GREEN,
        ChannelFlags::BLUE,
        ChannelFlags::ALPHA,
    ];
}

/// Compositing mode.  `Normal` is the usual "over" operator, `Copy`
/// replaces the destination (interpolated by opacity).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Copy,
    Multiply,
    Screen,
    Additive,
    Reflect,
    Glow,
    ColorBurn,
    ColorDodge,
    Overlay,
    Difference,
    Negation,
    Lighten,
    Darken,
    Xor,
    HardLight,
    SoftLight,
    Exclusion,
    Subtract,
    Divide,
    LinearBurn,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
}

impl BlendMode {
    /// Alias for the "over" operator.
    pub const OVER: BlendMode = BlendMode::Normal;

    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Copy,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Additive,
            BlendMode::Overlay,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Lighten,
            BlendMode::Darken,
            BlendMode::ColorBurn,
            BlendMode::ColorDodge,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Negation,
            BlendMode::Reflect,
            BlendMode::Glow,
            BlendMode::Subtract,
            BlendMode::Divide,
            BlendMode::LinearBurn,
            BlendMode::VividLight,
            BlendMode::LinearLight,
            BlendMode::PinLight,
            BlendMode::HardMix,
            BlendMode::Xor,
        ]
    }

    /// Stable identifier, used to look modes up by name.
    pub fn id(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Copy => "copy",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Additive => "additive",
            BlendMode::Reflect => "reflect",
            BlendMode::Glow => "glow",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::Overlay => "overlay",
            BlendMode::Difference => "difference",
            BlendMode::Negation => "negation",
            BlendMode::Lighten => "lighten",
            BlendMode::Darken => "darken",
            BlendMode::Xor => "xor",
            BlendMode::HardLight => "hard_light",
            BlendMode::SoftLight => "soft_light",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Subtract => "subtract",
            BlendMode::Divide => "divide",
            BlendMode::LinearBurn => "linear_burn",
            BlendMode::VividLight => "vivid_light",
            BlendMode::LinearLight => "linear_light",
            BlendMode::PinLight => "pin_light",
            BlendMode::HardMix => "hard_mix",
        }
    }

    /// Look a mode up by [`BlendMode::id`].  `"over"` is accepted for `Normal`.
    pub fn from_id(id: &str) -> Option<BlendMode> {
        if id.eq_ignore_ascii_case("over") {
            return Some(BlendMode::Normal);
        }
        Self::all().iter().copied().find(|mode| mode.id().eq_ignore_ascii_case(id))
    }
}

/// Composite `top` onto `base`.
///
/// `opacity` is the effective 0–1 weight of `top` (layer opacity times any
/// selection weight).  Channels not present in `channels` keep `base`'s value.
/// An opacity of zero or an empty channel set returns `base` untouched.
pub fn blend_pixel(
    base: Rgba<u8>,
    top: Rgba<u8>,
    mode: BlendMode,
    opacity: f32,
    channels: ChannelFlags,
) -> Rgba<u8> {
    if opacity <= 0.0 || channels.is_empty() {
        return base;
    }
    let blended = match mode {
        BlendMode::Copy => copy_pixel(base, top, opacity.min(1.0)),
        _ => blend_over(base, top, mode, opacity),
    };
    if channels.is_all() {
        return blended;
    }
    let mut out = base;
    for (i, flag) in ChannelFlags::ORDER.iter().enumerate() {
        if channels.contains(*flag) {
            out[i] = blended[i];
        }
    }
    out
}

/// Linear interpolation from `base` to `top`; exact `top` at full opacity.
fn copy_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if opacity >= 1.0 {
        return top;
    }
    let mut out = base;
    for i in 0..4 {
        let (b, t) = (base[i] as f32, top[i] as f32);
        out[i] = (b + (t - b) * opacity).round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn blend_over(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel
    if top[3] == 0 {
        return base;
    }

    // Fast path: opaque top pixel at full opacity overwrites
    if matches!(mode, BlendMode::Normal) && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    if mode == BlendMode::Xor {
        let xor_a = base_a * (1.0 - top_a) + top_a * (1.0 - base_a);
        if xor_a == 0.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let xor_r = (base_r * base_a * (1.0 - top_a) + top_r * top_a * (1.0 - base_a)) / xor_a;
        let xor_g = (base_g * base_a * (1.0 - top_a) + top_g * top_a * (1.0 - base_a)) / xor_a;
        let xor_b = (base_b * base_a * (1.0 - top_a) + top_b * top_a * (1.0 - base_a)) / xor_a;
        return to_pixel(xor_r, xor_g, xor_b, xor_a);
    }

    let channel = |f: fn(f32, f32) -> f32| (f(base_r, top_r), f(base_g, top_g), f(base_b, top_b));

    let (r, g, b) = match mode {
        BlendMode::Normal | BlendMode::Copy | BlendMode::Xor => (top_r, top_g, top_b),
        BlendMode::Multiply => channel(|b, t| b * t),
        BlendMode::Screen => channel(|b, t| 1.0 - (1.0 - b) * (1.0 - t)),
        BlendMode::Additive => channel(|b, t| (b + t).min(1.0)),
        BlendMode::Overlay => channel(overlay_channel),
        BlendMode::Lighten => channel(f32::max),
        BlendMode::Darken => channel(f32::min),
        BlendMode::Difference => channel(|b, t| (b - t).abs()),
        BlendMode::Negation => channel(|b, t| 1.0 - (1.0 - b - t).abs()),
        BlendMode::ColorBurn => channel(color_burn_channel),
        BlendMode::ColorDodge => channel(color_dodge_channel),
        BlendMode::Reflect => channel(reflect_channel),
        BlendMode::Glow => channel(|b, t| reflect_channel(t, b)),
        BlendMode::HardLight => channel(|b, t| overlay_channel(t, b)),
        BlendMode::SoftLight => channel(soft_light_channel),
        BlendMode::Exclusion => channel(|b, t| b + t - 2.0 * b * t),
        BlendMode::Subtract => channel(|b, t| (b - t).max(0.0)),
        BlendMode::Divide => channel(divide_channel),
        BlendMode::LinearBurn => channel(|b, t| (b + t - 1.0).max(0.0)),
        BlendMode::VividLight => channel(vivid_light_channel),
        BlendMode::LinearLight => channel(|b, t| (b + 2.0 * t - 1.0).clamp(0.0, 1.0)),
        BlendMode::PinLight => channel(pin_light_channel),
        BlendMode::HardMix => channel(|b, t| if b + t >= 1.0 { 1.0 } else { 0.0 }),
    };

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    to_pixel(out_r, out_g, out_b, out_a)
}

#[inline]
fn to_pixel(r: f32, g: f32, b: f32, a: f32) -> Rgba<u8> {
    Rgba([
        (r * 255.0).clamp(0.0, 255.0) as u8,
        (g * 255.0).clamp(0.0, 255.0) as u8,
        (b * 255.0).clamp(0.0, 255.0) as u8,
        (a * 255.0).clamp(0.0, 255.0) as u8,
    ])
}

// Blend mode helper functions
fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

fn reflect_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base * base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

fn divide_channel(base: f32, top: f32) -> f32 {
    if top <= 0.0 { 1.0 } else { (base / top).min(1.0) }
}

fn vivid_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        // Color Burn with 2*top
        let t2 = 2.0 * top;
        if t2 <= 0.0 { 0.0 } else { (1.0 - (1.0 - base) / t2).max(0.0) }
    } else {
        // Color Dodge with 2*(top-0.5)
        let t2 = 2.0 * (top - 0.5);
        if t2 >= 1.0 { 1.0 } else { (base / (1.0 - t2)).min(1.0) }
    }
}

fn pin_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base.min(2.0 * top)
    } else {
        base.max(2.0 * (top - 0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Rgba<u8> = Rgba([10, 200, 30, 180]);
    const TOP: Rgba<u8> = Rgba([250, 5, 90, 255]);

    #[test]
    fn zero_opacity_or_no_channels_leaves_base() {
        for &mode in BlendMode::all() {
            assert_eq!(blend_pixel(BASE, TOP, mode, 0.0, ChannelFlags::all()), BASE, "{mode:?}");
            assert_eq!(blend_pixel(BASE, TOP, mode, 1.0, ChannelFlags::empty()), BASE, "{mode:?}");
        }
    }

    #[test]
    fn copy_at_full_opacity_is_exact() {
        let transparent = Rgba([1, 2, 3, 0]);
        assert_eq!(blend_pixel(BASE, TOP, BlendMode::Copy, 1.0, ChannelFlags::all()), TOP);
        assert_eq!(blend_pixel(BASE, transparent, BlendMode::Copy, 1.0, ChannelFlags::all()), transparent);
    }

    #[test]
    fn copy_interpolates_by_opacity() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([200, 100, 50, 255]), BlendMode::Copy, 0.5, ChannelFlags::all());
        assert_eq!(out, Rgba([100, 50, 25, 128]));
    }

    #[test]
    fn opaque_normal_replaces() {
        assert_eq!(blend_pixel(BASE, TOP, BlendMode::Normal, 1.0, ChannelFlags::all()), TOP);
    }

    #[test]
    fn channel_flags_restrict_writes() {
        let out = blend_pixel(BASE, TOP, BlendMode::Normal, 1.0, ChannelFlags::RED | ChannelFlags::ALPHA);
        assert_eq!(out, Rgba([250, 200, 30, 255]));
    }

    #[test]
    fn multiply_by_black_is_black() {
        let white = Rgba([255, 255, 255, 255]);
        let black = Rgba([0, 0, 0, 255]);
        let out = blend_pixel(white, black, BlendMode::Multiply, 1.0, ChannelFlags::all());
        assert_eq!(out, black);
    }

    #[test]
    fn ids_round_trip() {
        for &mode in BlendMode::all() {
            assert_eq!(BlendMode::from_id(mode.id()), Some(mode));
        }
        assert_eq!(BlendMode::from_id("over"), Some(BlendMode::OVER));
        assert_eq!(BlendMode::from_id("nope"), None);
    }
}
