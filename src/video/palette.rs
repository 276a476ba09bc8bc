//! パレットとカラーテーブル
//!
//! ペン（カラーテーブルのインデックス）→ 色番号 → ARGB の2段階で変換する

use super::bitmap::{Bitmap, Rect, TRANSPARENT_PEN};

/// 抵抗ラダーの重み（1kΩ/470Ω/220Ω）
pub const WEIGHTS_3: [u8; 3] = [0x21, 0x47, 0x97];

/// 3ビット分の抵抗ラダー出力
pub fn weigh3(b0: bool, b1: bool, b2: bool) -> u8 {
    WEIGHTS_3[0] * b0 as u8 + WEIGHTS_3[1] * b1 as u8 + WEIGHTS_3[2] * b2 as u8
}

pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<u32>,
    colortable: Vec<u16>,
}

impl Palette {
    /// カラーテーブルなし（ペン = 色番号）
    pub fn new(colors: Vec<u32>) -> Self {
        let colortable = (0..colors.len() as u16).collect();
        Palette { colors, colortable }
    }

    pub fn with_colortable(colors: Vec<u32>, colortable: Vec<u16>) -> Self {
        Palette { colors, colortable }
    }

    /// PROM未ロード時などの仮パレット
    pub fn grayscale(len: usize) -> Self {
        let step = 255 / len.saturating_sub(1).max(1);
        Palette::new((0..len).map(|i| {
            let v = (i * step).min(255) as u8;
            rgb(v, v, v)
        }).collect())
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn colortable(&self) -> &[u16] {
        &self.colortable
    }

    /// ペンをARGBに変換（透過・範囲外は黒）
    pub fn lookup(&self, pen: u16) -> u32 {
        if pen == TRANSPARENT_PEN {
            return rgb(0, 0, 0);
        }
        self.colortable
            .get(pen as usize)
            .and_then(|&c| self.colors.get(c as usize))
            .copied()
            .unwrap_or(rgb(0, 0, 0))
    }

    /// 可視領域をARGBフレームバッファに変換
    pub fn resolve(&self, bitmap: &Bitmap, visible: &Rect, out: &mut Vec<u32>) {
        let r = visible.intersect(&bitmap.bounds());
        out.clear();
        if r.is_empty() {
            return;
        }
        out.reserve((r.width() * r.height()) as usize);
        for y in r.min_y..=r.max_y {
            let row = bitmap.row(y as usize);
            out.extend(row[r.min_x as usize..=r.max_x as usize].iter().map(|&pen| self.lookup(pen)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weigh3_full_scale() {
        assert_eq!(weigh3(true, true, true), 0xFF);
        assert_eq!(weigh3(false, false, false), 0);
        assert_eq!(weigh3(false, true, true), 0x47 + 0x97);
    }

    #[test]
    fn test_lookup_through_colortable() {
        let pal = Palette::with_colortable(vec![rgb(0, 0, 0), rgb(255, 0, 0)], vec![1, 0]);
        assert_eq!(pal.lookup(0), 0xFFFF_0000);
        assert_eq!(pal.lookup(1), 0xFF00_0000);
        assert_eq!(pal.lookup(9), 0xFF00_0000);
        assert_eq!(pal.lookup(TRANSPARENT_PEN), 0xFF00_0000);
    }

    #[test]
    fn test_resolve_visible_area() {
        let pal = Palette::grayscale(2);
        let mut bm = Bitmap::new(2, 3);
        bm.set(1, 1, 1);
        let mut out = Vec::new();
        pal.resolve(&bm, &Rect::new(0, 1, 1, 1), &mut out);
        assert_eq!(out, vec![rgb(0, 0, 0), rgb(255, 255, 255)]);
    }
}
