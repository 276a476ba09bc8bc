//! ペン値ビットマップ
//!
//! 各ピクセルはカラーテーブルのインデックス（ペン）を持つ。
//! ARGBへの変換は `Palette` が最後にまとめて行う

/// 透過ピクセル（非不透明レイヤー用）
pub const TRANSPARENT_PEN: u16 = u16::MAX;

/// クリップ矩形（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Rect {
    pub const fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Rect { min_x, max_x, min_y, max_y }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.max(other.min_x),
            max_x: self.max_x.min(other.max_x),
            min_y: self.min_y.max(other.min_y),
            max_y: self.max_y.min(other.max_y),
        }
    }
}

/// スクロールの種類
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scroll {
    #[default]
    None,
    /// 全体スクロール（転送先 = 転送元 + (x, y)）
    Global { x: i32, y: i32 },
    /// 列ごとの縦スクロール（列数 = 要素数）
    Columns(Vec<i32>),
    /// 行ごとの横スクロール（行数 = 要素数）
    Rows(Vec<i32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pens: Vec<u16>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Bitmap {
            width,
            height,
            pens: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// ビットマップ全体の矩形
    pub fn bounds(&self) -> Rect {
        Rect::new(0, self.width as i32 - 1, 0, self.height as i32 - 1)
    }

    pub fn pens(&self) -> &[u16] {
        &self.pens
    }

    pub fn row(&self, y: usize) -> &[u16] {
        &self.pens[y * self.width..(y + 1) * self.width]
    }

    pub fn fill(&mut self, pen: u16) {
        self.pens.fill(pen);
    }

    pub fn fill_rect(&mut self, rect: &Rect, pen: u16) {
        let r = rect.intersect(&self.bounds());
        if r.is_empty() {
            return;
        }
        for y in r.min_y..=r.max_y {
            let base = y as usize * self.width;
            self.pens[base + r.min_x as usize..=base + r.max_x as usize].fill(pen);
        }
    }

    /// 範囲外は透過ペン
    pub fn pixel(&self, x: i32, y: i32) -> u16 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return TRANSPARENT_PEN;
        }
        self.pens[y as usize * self.width + x as usize]
    }

    /// 範囲外への書き込みは無視
    pub fn set(&mut self, x: i32, y: i32, pen: u16) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        self.pens[y as usize * self.width + x as usize] = pen;
    }

    /// スクロールを適用して `src` をコピーする
    ///
    /// 転送元の座標はラップアラウンドする。`transparent` のとき
    /// `TRANSPARENT_PEN` のピクセルは書き込まない
    pub fn copy_scrolled(&mut self, src: &Bitmap, scroll: &Scroll, clip: &Rect, transparent: bool) {
        let r = clip.intersect(&self.bounds());
        if r.is_empty() || src.width == 0 || src.height == 0 {
            return;
        }
        let (sw, sh) = (src.width as i32, src.height as i32);

        for y in r.min_y..=r.max_y {
            for x in r.min_x..=r.max_x {
                let (sx, sy) = match scroll {
                    Scroll::None => (x, y),
                    Scroll::Global { x: dx, y: dy } => (x - dx, y - dy),
                    Scroll::Columns(cols) if !cols.is_empty() => {
                        let col_width = (sw / cols.len() as i32).max(1);
                        let col = ((x.rem_euclid(sw)) / col_width) as usize;
                        (x, y - cols[col.min(cols.len() - 1)])
                    }
                    Scroll::Rows(rows) if !rows.is_empty() => {
                        let row_height = (sh / rows.len() as i32).max(1);
                        let row = ((y.rem_euclid(sh)) / row_height) as usize;
                        (x - rows[row.min(rows.len() - 1)], y)
                    }
                    _ => (x, y),
                };
                let pen = src.pens[sy.rem_euclid(sh) as usize * src.width + sx.rem_euclid(sw) as usize];
                if transparent && pen == TRANSPARENT_PEN {
                    continue;
                }
                self.pens[y as usize * self.width + x as usize] = pen;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: usize, h: usize) -> Bitmap {
        let mut bm = Bitmap::new(w, h);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                bm.set(x, y, (y * 16 + x) as u16);
            }
        }
        bm
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 255, 16, 239);
        let b = Rect::new(-8, 7, 0, 31);
        assert_eq!(a.intersect(&b), Rect::new(0, 7, 16, 31));
        assert!(Rect::new(4, 3, 0, 0).is_empty());
    }

    #[test]
    fn test_copy_column_scroll_wraps() {
        let src = gradient(4, 4);
        let mut dst = Bitmap::new(4, 4);
        // 2列: 左半分は下に1、右半分はそのまま
        dst.copy_scrolled(&src, &Scroll::Columns(vec![1, 0]), &dst.bounds(), false);
        assert_eq!(dst.pixel(0, 1), src.pixel(0, 0));
        assert_eq!(dst.pixel(1, 0), src.pixel(1, 3));
        assert_eq!(dst.pixel(3, 2), src.pixel(3, 2));
    }

    #[test]
    fn test_copy_global_scroll() {
        let src = gradient(4, 4);
        let mut dst = Bitmap::new(4, 4);
        dst.copy_scrolled(&src, &Scroll::Global { x: -1, y: 2 }, &dst.bounds(), false);
        assert_eq!(dst.pixel(0, 2), src.pixel(1, 0));
        assert_eq!(dst.pixel(3, 0), src.pixel(0, 2));
    }

    #[test]
    fn test_transparent_copy_keeps_background() {
        let mut src = Bitmap::new(2, 1);
        src.fill(TRANSPARENT_PEN);
        src.set(1, 0, 9);
        let mut dst = Bitmap::new(2, 1);
        dst.fill(3);
        dst.copy_scrolled(&src, &Scroll::None, &dst.bounds(), true);
        assert_eq!(dst.pens(), &[3, 9]);
    }

    #[test]
    fn test_copy_respects_clip() {
        let src = gradient(4, 4);
        let mut dst = Bitmap::new(4, 4);
        dst.fill(0xAA);
        dst.copy_scrolled(&src, &Scroll::None, &Rect::new(0, 3, 1, 2), false);
        assert_eq!(dst.pixel(0, 0), 0xAA);
        assert_eq!(dst.pixel(2, 1), src.pixel(2, 1));
        assert_eq!(dst.pixel(2, 3), 0xAA);
    }
}
