use crate::{
    core::Rect,
    error::{TreadleError, TreadleResult},
    frame::Frame,
};

pub type PremulRgba8 = [u8; 4];

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> TreadleResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(TreadleError::validation(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Scale `src` into `rect` of `dst` (nearest neighbor) and alpha-composite it
/// over the existing content. The rect is clipped to the dst bounds; an empty
/// intersection is a no-op.
pub fn blit_scaled_over(dst: &mut Frame, src: &Frame, rect: Rect, opacity: f32) {
    let rect_w = rect.width();
    let rect_h = rect.height();
    if rect_w <= 0.0 || rect_h <= 0.0 || src.width == 0 || src.height == 0 {
        return;
    }

    let x_lo = rect.x0.floor().max(0.0) as i64;
    let y_lo = rect.y0.floor().max(0.0) as i64;
    let x_hi = (rect.x1.ceil() as i64).min(i64::from(dst.width));
    let y_hi = (rect.y1.ceil() as i64).min(i64::from(dst.height));
    if x_lo >= x_hi || y_lo >= y_hi {
        return;
    }

    let src_w = src.width as usize;
    let dst_w = dst.width as usize;
    let src_max_x = src.width - 1;
    let src_max_y = src.height - 1;
    // Cheap Arc clone: src and dst may share a payload, and data_mut below
    // un-shares dst without copying src.
    let src_data = src.data_arc();
    let dst_data = dst.data_mut();

    for dy in y_lo..y_hi {
        let v = (dy as f64 + 0.5 - rect.y0) / rect_h;
        let sy = ((v * f64::from(src.height)) as i64).clamp(0, i64::from(src_max_y)) as usize;
        for dx in x_lo..x_hi {
            let u = (dx as f64 + 0.5 - rect.x0) / rect_w;
            let sx = ((u * f64::from(src.width)) as i64).clamp(0, i64::from(src_max_x)) as usize;

            let si = (sy * src_w + sx) * 4;
            let di = (dy as usize * dst_w + dx as usize) * 4;
            let s = [
                src_data[si],
                src_data[si + 1],
                src_data[si + 2],
                src_data[si + 3],
            ];
            let d = [
                dst_data[di],
                dst_data[di + 1],
                dst_data[di + 2],
                dst_data[di + 3],
            ];
            dst_data[di..di + 4].copy_from_slice(&over(d, s, opacity));
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fps, Profile, Rgba8Premul};

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        let src = [255, 255, 255, 0];
        assert_eq!(over(dst, src, 1.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    fn profile(w: u32, h: u32) -> Profile {
        Profile::new(w, h, Fps::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn blit_places_scaled_source_in_rect() {
        let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
        let blue = Rgba8Premul::from_straight_rgba(0, 0, 255, 255);
        let mut bg = Frame::solid(profile(10, 10), red, 0);
        let fg = Frame::solid(profile(4, 4), blue, 0);

        blit_scaled_over(&mut bg, &fg, Rect::new(0.0, 0.0, 2.0, 2.0), 1.0);

        assert_eq!(bg.pixel(0, 0), blue);
        assert_eq!(bg.pixel(1, 1), blue);
        assert_eq!(bg.pixel(2, 2), red);
        assert_eq!(bg.pixel(9, 9), red);
    }

    #[test]
    fn blit_clips_to_destination_bounds() {
        let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
        let blue = Rgba8Premul::from_straight_rgba(0, 0, 255, 255);
        let mut bg = Frame::solid(profile(4, 4), red, 0);
        let fg = Frame::solid(profile(2, 2), blue, 0);

        blit_scaled_over(&mut bg, &fg, Rect::new(2.0, 2.0, 8.0, 8.0), 1.0);

        assert_eq!(bg.pixel(1, 1), red);
        assert_eq!(bg.pixel(3, 3), blue);
    }

    #[test]
    fn blit_empty_rect_is_noop() {
        let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
        let mut bg = Frame::solid(profile(4, 4), red, 0);
        let fg = Frame::solid(profile(2, 2), Rgba8Premul::transparent(), 0);
        blit_scaled_over(&mut bg, &fg, Rect::new(3.0, 3.0, 3.0, 3.0), 1.0);
        assert_eq!(bg.pixel(3, 3), red);
    }
}
