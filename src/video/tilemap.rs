//! タイルレイヤー
//!
//! ビデオRAM（コード・カラー・属性の各バイト）をセル単位でデコードして保持し、
//! 変更のあったセルだけをレイヤー用ビットマップに描き直す

use super::bitmap::{Bitmap, Rect, TRANSPARENT_PEN};
use super::gfx::{draw_gfx, GfxSet, Transparency};
use crate::regions::{RegionId, Regions};

/// デコード済みのセル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileCell {
    pub code: u16,
    pub color: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    /// 次のフレームで描き直す
    pub dirty: bool,
}

/// セルを構成するRAMのバイト
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileBytes {
    pub code: u8,
    pub color: u8,
    pub attr: u8,
}

/// ドライバ固有のセルデコード
pub type TileDecoder = fn(TileBytes) -> TileCell;

/// セルの元になるRAMリージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSources {
    pub code: RegionId,
    pub color: Option<RegionId>,
    pub attr: Option<RegionId>,
}

impl TileSources {
    /// このリージョンがレイヤーの元データか
    pub fn uses(&self, region: RegionId) -> bool {
        self.code == region || self.color == Some(region) || self.attr == Some(region)
    }

    pub fn bytes(&self, regions: &Regions, index: usize) -> TileBytes {
        let at = |id: Option<RegionId>| id.and_then(|id| regions.get(id).get(index).copied()).unwrap_or(0);
        TileBytes {
            code: at(Some(self.code)),
            color: at(self.color),
            attr: at(self.attr),
        }
    }
}

pub struct TileLayer {
    pub name: &'static str,
    pub cols: usize,
    pub rows: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    /// 使用するgfxセット番号
    pub gfx: usize,
    pub sources: TileSources,
    /// 不透明レイヤー（false ならペン0を透過）
    pub opaque: bool,
    decode: TileDecoder,
    cells: Vec<TileCell>,
    bitmap: Bitmap,
    flip_screen: bool,
}

impl TileLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        cols: usize,
        rows: usize,
        tile_width: usize,
        tile_height: usize,
        gfx: usize,
        sources: TileSources,
        decode: TileDecoder,
        opaque: bool,
    ) -> Self {
        let mut bitmap = Bitmap::new(cols * tile_width, rows * tile_height);
        if !opaque {
            bitmap.fill(TRANSPARENT_PEN);
        }
        TileLayer {
            name,
            cols,
            rows,
            tile_width,
            tile_height,
            gfx,
            sources,
            opaque,
            decode,
            cells: vec![TileCell { dirty: true, ..Default::default() }; cols * rows],
            bitmap,
            flip_screen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&TileCell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[TileCell] {
        &self.cells
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// RAMの内容からセルを作り直してダーティにする
    pub fn refresh_cell(&mut self, regions: &Regions, index: usize) {
        if index >= self.cells.len() {
            return;
        }
        let mut cell = (self.decode)(self.sources.bytes(regions, index));
        cell.dirty = true;
        self.cells[index] = cell;
    }

    /// 全セルをRAMから作り直す（ステートロード後など）
    pub fn refresh_all(&mut self, regions: &Regions) {
        for index in 0..self.cells.len() {
            self.refresh_cell(regions, index);
        }
    }

    pub fn mark_dirty(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            cell.dirty = true;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.cells.iter_mut().for_each(|c| c.dirty = true);
    }

    pub fn flip_screen(&self) -> bool {
        self.flip_screen
    }

    /// 画面反転が変わったら全セルを無効化
    pub fn set_flip_screen(&mut self, flip: bool) {
        if self.flip_screen != flip {
            self.flip_screen = flip;
            self.mark_all_dirty();
        }
    }

    /// ダーティなセル番号（大きい順）
    pub fn dirty_indices(&self) -> Vec<usize> {
        (0..self.cells.len()).rev().filter(|&i| self.cells[i].dirty).collect()
    }

    /// セルの描画位置と反転（画面反転を反映済み）
    pub fn placement(&self, index: usize) -> (i32, i32, bool, bool) {
        let cell = self.cells[index];
        let (mut col, mut row) = (index % self.cols, index / self.cols);
        let (mut flip_x, mut flip_y) = (cell.flip_x, cell.flip_y);
        if self.flip_screen {
            col = self.cols - 1 - col;
            row = self.rows - 1 - row;
            flip_x = !flip_x;
            flip_y = !flip_y;
        }
        ((col * self.tile_width) as i32, (row * self.tile_height) as i32, flip_x, flip_y)
    }

    /// 1セルを描き直してダーティを落とす
    pub fn redraw_cell(&mut self, index: usize, gfx: &GfxSet) {
        if index >= self.cells.len() {
            return;
        }
        let (sx, sy, flip_x, flip_y) = self.placement(index);
        let cell = self.cells[index];
        let clip = Rect::new(sx, sx + self.tile_width as i32 - 1, sy, sy + self.tile_height as i32 - 1);
        let transparency = if self.opaque {
            Transparency::Opaque
        } else {
            self.bitmap.fill_rect(&clip, TRANSPARENT_PEN);
            Transparency::Pen(0)
        };
        draw_gfx(&mut self.bitmap, gfx, cell.code as u32, cell.color as u32, flip_x, flip_y, sx, sy, &clip, transparency);
        self.cells[index].dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionKind;

    fn decode(bytes: TileBytes) -> TileCell {
        TileCell {
            code: bytes.code as u16 | ((bytes.attr as u16 & 0x03) << 8),
            color: bytes.color,
            flip_x: bytes.attr & 0x04 != 0,
            flip_y: bytes.attr & 0x08 != 0,
            dirty: false,
        }
    }

    fn setup() -> (Regions, TileLayer) {
        let mut regions = Regions::new();
        let code = regions.add("videoram", RegionKind::Ram, 4);
        let attr = regions.add("attrram", RegionKind::Ram, 4);
        let sources = TileSources { code, color: None, attr: Some(attr) };
        (regions, TileLayer::new("bg", 2, 2, 2, 2, 0, sources, decode, true))
    }

    fn gfx() -> GfxSet {
        // コードnは全ピクセルがn
        GfxSet::from_pixels(2, 2, 4, (0..4u8).flat_map(|n| [n; 4]).collect())
    }

    #[test]
    fn test_cells_start_dirty() {
        let (_, layer) = setup();
        assert_eq!(layer.dirty_indices(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_redraw_clears_dirty_and_draws() {
        let (mut regions, mut layer) = setup();
        let code = layer.sources.code;
        regions.get_mut(code)[1] = 2;
        layer.refresh_cell(&regions, 1);
        for i in layer.dirty_indices() {
            layer.redraw_cell(i, &gfx());
        }
        assert!(layer.dirty_indices().is_empty());
        assert_eq!(layer.bitmap().pixel(2, 0), 2);
        assert_eq!(layer.bitmap().pixel(0, 0), 0);
    }

    #[test]
    fn test_attribute_bits_decode() {
        let (mut regions, mut layer) = setup();
        let attr = layer.sources.attr.unwrap();
        regions.get_mut(attr)[0] = 0x0D;
        layer.refresh_cell(&regions, 0);
        let cell = layer.cell(0).unwrap();
        assert_eq!(cell.code, 0x100);
        assert!(cell.flip_x);
        assert!(cell.flip_y);
        assert!(cell.dirty);
    }

    #[test]
    fn test_flip_screen_invalidates_and_mirrors() {
        let (_, mut layer) = setup();
        for i in layer.dirty_indices() {
            layer.redraw_cell(i, &gfx());
        }
        layer.set_flip_screen(true);
        assert_eq!(layer.dirty_indices().len(), 4);
        assert_eq!(layer.placement(0), (2, 2, true, true));
        // 同じ値なら何もしない
        for i in layer.dirty_indices() {
            layer.redraw_cell(i, &gfx());
        }
        layer.set_flip_screen(true);
        assert!(layer.dirty_indices().is_empty());
    }

    #[test]
    fn test_transparent_layer_clears_cell() {
        let mut regions = Regions::new();
        let code = regions.add("fg", RegionKind::Ram, 4);
        let sources = TileSources { code, color: None, attr: None };
        let mut layer = TileLayer::new("fg", 2, 2, 2, 2, 0, sources, decode, false);
        layer.redraw_cell(0, &gfx());
        assert_eq!(layer.bitmap().pixel(0, 0), TRANSPARENT_PEN);
        regions.get_mut(code)[0] = 1;
        layer.refresh_cell(&regions, 0);
        layer.redraw_cell(0, &gfx());
        assert_eq!(layer.bitmap().pixel(1, 1), 1);
    }
}
