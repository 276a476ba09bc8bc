//! グラフィックROMのデコードと描画
//!
//! レイアウトはプレーン・X・Yそれぞれのビットオフセットで表す。
//! プレーン0がペン値の最上位ビットになる

use super::bitmap::{Bitmap, Rect};

/// タイル/スプライトのビット配置
#[derive(Debug, Clone, Copy)]
pub struct GfxLayout {
    pub width: usize,
    pub height: usize,
    /// 要素数（ROMが足りなければ切り詰める）
    pub total: usize,
    pub plane_offsets: &'static [u32],
    pub x_offsets: &'static [u32],
    pub y_offsets: &'static [u32],
    /// 1要素あたりのビット数
    pub char_increment: u32,
}

impl GfxLayout {
    pub fn planes(&self) -> usize {
        self.plane_offsets.len()
    }
}

/// デコード済みの要素集合（1ピクセル1バイト）
#[derive(Debug, Clone)]
pub struct GfxSet {
    pub width: usize,
    pub height: usize,
    pub total: usize,
    /// 1色あたりのペン数（カラーテーブル上の間隔）
    pub granularity: u16,
    pixels: Vec<u8>,
}

/// 透過指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    /// すべて描く
    Opaque,
    /// このピクセル値は描かない
    Pen(u8),
}

fn read_bit(rom: &[u8], bit: u32) -> bool {
    rom.get((bit / 8) as usize).is_some_and(|byte| byte & (0x80u8 >> (bit % 8)) != 0)
}

impl GfxSet {
    /// ROMをレイアウトに従ってデコード
    pub fn decode(layout: &GfxLayout, rom: &[u8]) -> Self {
        let bits = rom.len() as u64 * 8;
        let fit = if layout.char_increment == 0 {
            layout.total
        } else {
            (bits / layout.char_increment as u64) as usize
        };
        let total = layout.total.min(fit.max(1));
        if total < layout.total {
            log::warn!("gfx rom too small: decoding {} of {} elements", total, layout.total);
        }

        let planes = layout.planes();
        let size = layout.width * layout.height;
        let mut pixels = vec![0u8; total * size];
        for code in 0..total {
            let base = code as u32 * layout.char_increment;
            let dst = &mut pixels[code * size..(code + 1) * size];
            for (y, &yo) in layout.y_offsets.iter().enumerate().take(layout.height) {
                for (x, &xo) in layout.x_offsets.iter().enumerate().take(layout.width) {
                    let mut pen = 0u8;
                    for (plane, &po) in layout.plane_offsets.iter().enumerate() {
                        if read_bit(rom, base + po + yo + xo) {
                            pen |= 1 << (planes - 1 - plane);
                        }
                    }
                    dst[y * layout.width + x] = pen;
                }
            }
        }

        GfxSet {
            width: layout.width,
            height: layout.height,
            total,
            granularity: 1 << planes,
            pixels,
        }
    }

    /// 生のピクセル列から作る（テスト・ビューア用）
    pub fn from_pixels(width: usize, height: usize, granularity: u16, pixels: Vec<u8>) -> Self {
        let size = (width * height).max(1);
        GfxSet {
            width,
            height,
            total: pixels.len() / size,
            granularity,
            pixels,
        }
    }

    /// 要素のピクセル（コードは要素数でラップ）
    pub fn element(&self, code: u32) -> &[u8] {
        if self.total == 0 {
            return &[];
        }
        let size = self.width * self.height;
        let code = code as usize % self.total;
        &self.pixels[code * size..(code + 1) * size]
    }

    pub fn pixel(&self, code: u32, x: usize, y: usize) -> u8 {
        self.element(code).get(y * self.width + x).copied().unwrap_or(0)
    }
}

/// 1要素をビットマップに描画する
///
/// 出力ペン = color * granularity + ピクセル値
#[allow(clippy::too_many_arguments)]
pub fn draw_gfx(
    dest: &mut Bitmap,
    gfx: &GfxSet,
    code: u32,
    color: u32,
    flip_x: bool,
    flip_y: bool,
    sx: i32,
    sy: i32,
    clip: &Rect,
    transparency: Transparency,
) {
    let clip = clip.intersect(&dest.bounds());
    let element = gfx.element(code);
    if element.is_empty() || clip.is_empty() {
        return;
    }
    let (w, h) = (gfx.width as i32, gfx.height as i32);
    if sx > clip.max_x || sy > clip.max_y || sx + w <= clip.min_x || sy + h <= clip.min_y {
        return;
    }
    let pen_base = color.wrapping_mul(gfx.granularity as u32);

    for dy in 0..h {
        let y = sy + dy;
        if y < clip.min_y || y > clip.max_y {
            continue;
        }
        let src_y = if flip_y { h - 1 - dy } else { dy };
        for dx in 0..w {
            let x = sx + dx;
            if x < clip.min_x || x > clip.max_x {
                continue;
            }
            let src_x = if flip_x { w - 1 - dx } else { dx };
            let value = element[(src_y * w + src_x) as usize];
            if let Transparency::Pen(t) = transparency {
                if value == t {
                    continue;
                }
            }
            dest.set(x, y, (pen_base + value as u32) as u16);
        }
    }
}

/// 全要素を一覧表示する（グラフィックビューア）
pub fn draw_sheet(dest: &mut Bitmap, gfx: &GfxSet, color: u32, first: u32) -> usize {
    if gfx.width == 0 || gfx.height == 0 {
        return 0;
    }
    let per_row = (dest.width() / gfx.width).max(1);
    let rows = dest.height() / gfx.height;
    let clip = dest.bounds();
    dest.fill(0);
    let mut drawn = 0;
    for slot in 0..per_row * rows {
        let code = first as usize + slot;
        if code >= gfx.total {
            break;
        }
        let sx = ((slot % per_row) * gfx.width) as i32;
        let sy = ((slot / per_row) * gfx.height) as i32;
        draw_gfx(dest, gfx, code as u32, color, false, false, sx, sy, &clip, Transparency::Opaque);
        drawn += 1;
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANES_2: [u32; 2] = [0, 4];
    const X_4: [u32; 4] = [0, 1, 2, 3];
    const Y_2: [u32; 2] = [0, 8];

    /// 4x2, 2bpp, 1要素16ビット
    const LAYOUT: GfxLayout = GfxLayout {
        width: 4,
        height: 2,
        total: 2,
        plane_offsets: &PLANES_2,
        x_offsets: &X_4,
        y_offsets: &Y_2,
        char_increment: 16,
    };

    #[test]
    fn test_decode_plane_order() {
        // 行0: plane0 = 1000, plane1 = 1100 -> ペン 3,1,0,0
        let rom = [0b1000_1100, 0x00, 0xFF, 0xFF];
        let gfx = GfxSet::decode(&LAYOUT, &rom);
        assert_eq!(gfx.total, 2);
        assert_eq!(gfx.granularity, 4);
        assert_eq!(&gfx.element(0)[0..4], &[3, 1, 0, 0]);
        assert_eq!(&gfx.element(1)[0..4], &[3, 3, 3, 3]);
    }

    #[test]
    fn test_code_wraps() {
        let rom = [0b1000_1100, 0x00, 0xFF, 0xFF];
        let gfx = GfxSet::decode(&LAYOUT, &rom);
        assert_eq!(gfx.element(2), gfx.element(0));
    }

    #[test]
    fn test_short_rom_truncates() {
        let gfx = GfxSet::decode(&LAYOUT, &[0xFF, 0x00]);
        assert_eq!(gfx.total, 1);
    }

    #[test]
    fn test_draw_flip_and_transparency() {
        let gfx = GfxSet::from_pixels(2, 1, 4, vec![0, 2]);
        let mut bm = Bitmap::new(4, 1);
        bm.fill(7);
        let clip = bm.bounds();
        draw_gfx(&mut bm, &gfx, 0, 1, false, false, 0, 0, &clip, Transparency::Pen(0));
        assert_eq!(bm.pens(), &[7, 6, 7, 7]);
        draw_gfx(&mut bm, &gfx, 0, 0, true, false, 2, 0, &clip, Transparency::Opaque);
        assert_eq!(bm.pens(), &[7, 6, 2, 0]);
    }

    #[test]
    fn test_draw_clipped() {
        let gfx = GfxSet::from_pixels(2, 2, 4, vec![1, 1, 1, 1]);
        let mut bm = Bitmap::new(2, 2);
        draw_gfx(&mut bm, &gfx, 0, 0, false, false, 1, -1, &Rect::new(0, 1, 0, 1), Transparency::Opaque);
        assert_eq!(bm.pens(), &[0, 1, 0, 0]);
    }
}
