//! フレーム合成
//!
//! 1フレームは次の順で進む:
//! Idle → ScanDirtyTiles → RedrawDirtyTiles → BlitWithScroll → DrawSprites → Idle

use super::bitmap::{Bitmap, Rect, Scroll};
use super::gfx::{draw_gfx, draw_sheet, GfxSet, Transparency};
use super::palette::Palette;
use super::sprites::{SpriteGeometry, SpriteSlot};
use super::tilemap::TileLayer;
use crate::regions::{RegionId, Regions};

/// 合成フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScanDirtyTiles,
    RedrawDirtyTiles,
    BlitWithScroll,
    DrawSprites,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::ScanDirtyTiles,
            Phase::ScanDirtyTiles => Phase::RedrawDirtyTiles,
            Phase::RedrawDirtyTiles => Phase::BlitWithScroll,
            Phase::BlitWithScroll => Phase::DrawSprites,
            Phase::DrawSprites => Phase::Idle,
        }
    }
}

/// 直近フレームの統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub tiles_redrawn: usize,
    pub sprites_drawn: usize,
}

pub struct Compositor {
    pub layers: Vec<TileLayer>,
    pub gfx: Vec<GfxSet>,
    pub palette: Palette,
    /// 可視領域
    pub visible: Rect,
    phase: Phase,
    flip_screen: bool,
    stats: FrameStats,
    frames: u64,
}

impl Compositor {
    pub fn new(gfx: Vec<GfxSet>, palette: Palette, visible: Rect) -> Self {
        Compositor {
            layers: Vec::new(),
            gfx,
            palette,
            visible,
            phase: Phase::Idle,
            flip_screen: false,
            stats: FrameStats::default(),
            frames: 0,
        }
    }

    pub fn add_layer(&mut self, layer: TileLayer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn flip_screen(&self) -> bool {
        self.flip_screen
    }

    pub fn set_flip_screen(&mut self, flip: bool) {
        self.flip_screen = flip;
        for layer in &mut self.layers {
            layer.set_flip_screen(flip);
        }
    }

    /// タイルRAMへの書き込みを反映
    ///
    /// `region` を元データに持つレイヤーのセルをダーティにする
    pub fn tile_written(&mut self, layer: usize, regions: &Regions, region: RegionId, index: usize) {
        match self.layers.get_mut(layer) {
            Some(l) if l.sources.uses(region) => l.refresh_cell(regions, index),
            _ => log::debug!("tile write to layer {} ignored (region #{})", layer, region.0),
        }
    }

    /// 全レイヤーをRAMから作り直す
    pub fn sync_layers(&mut self, regions: &Regions) {
        for layer in &mut self.layers {
            layer.refresh_all(regions);
        }
    }

    pub fn invalidate_all(&mut self) {
        for layer in &mut self.layers {
            layer.mark_all_dirty();
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug_assert_eq!(self.phase.next(), phase, "invalid phase transition");
        log::trace!("compositor: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// 1フレームを合成する
    ///
    /// `scrolls` はレイヤーごと（足りなければスクロールなし）、
    /// スプライトはスロット順に描くので後のスロットが上になる
    pub fn render(
        &mut self,
        scrolls: &[Scroll],
        sprites: &[SpriteSlot],
        geometry: &SpriteGeometry,
        frame: &mut Bitmap,
    ) -> FrameStats {
        let mut stats = FrameStats::default();

        self.enter(Phase::ScanDirtyTiles);
        let dirty: Vec<Vec<usize>> = self.layers.iter().map(|l| l.dirty_indices()).collect();

        self.enter(Phase::RedrawDirtyTiles);
        for (layer, indices) in self.layers.iter_mut().zip(&dirty) {
            let Some(gfx) = self.gfx.get(layer.gfx) else {
                log::warn!("layer {} uses missing gfx set {}", layer.name, layer.gfx);
                continue;
            };
            for &index in indices {
                layer.redraw_cell(index, gfx);
            }
            stats.tiles_redrawn += indices.len();
        }

        self.enter(Phase::BlitWithScroll);
        if self.layers.first().map_or(true, |l| !l.opaque) {
            frame.fill_rect(&self.visible, 0);
        }
        for (i, layer) in self.layers.iter().enumerate() {
            let scroll = scrolls.get(i).unwrap_or(&Scroll::None);
            frame.copy_scrolled(layer.bitmap(), scroll, &self.visible, !layer.opaque);
        }

        self.enter(Phase::DrawSprites);
        match self.gfx.get(geometry.gfx) {
            Some(gfx) => {
                for slot in sprites {
                    for draw in geometry.place(slot, self.flip_screen) {
                        draw_gfx(
                            frame,
                            gfx,
                            draw.code,
                            draw.color,
                            draw.flip_x,
                            draw.flip_y,
                            draw.sx,
                            draw.sy,
                            &self.visible,
                            Transparency::Pen(0),
                        );
                        stats.sprites_drawn += 1;
                    }
                }
            }
            None if !sprites.is_empty() => log::warn!("sprites use missing gfx set {}", geometry.gfx),
            None => {}
        }

        self.enter(Phase::Idle);
        self.frames += 1;
        self.stats = stats;
        stats
    }

    /// gfxセットの一覧を描く（F2 ビューア）
    pub fn draw_gfx_sheet(&self, set: usize, color: u32, first: u32, frame: &mut Bitmap) -> usize {
        match self.gfx.get(set) {
            Some(gfx) => draw_sheet(frame, gfx, color, first),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::RegionKind;
    use crate::video::tilemap::{TileBytes, TileCell, TileSources};

    fn decode(bytes: TileBytes) -> TileCell {
        TileCell { code: bytes.code as u16, ..Default::default() }
    }

    const GEOMETRY: SpriteGeometry = SpriteGeometry {
        gfx: 0,
        size: 2,
        y_from_bottom: None,
        flipped_x: None,
        flipped_y: None,
        bank_stride: 0,
    };

    fn setup() -> (Regions, Compositor) {
        let mut regions = Regions::new();
        let code = regions.add("videoram", RegionKind::Ram, 4);
        // コードnは全ピクセルがn（8色 x 4ペン）
        let gfx = GfxSet::from_pixels(2, 2, 4, (0..4u8).flat_map(|n| [n; 4]).collect());
        let mut video = Compositor::new(vec![gfx], Palette::grayscale(32), Rect::new(0, 3, 0, 3));
        let sources = TileSources { code, color: None, attr: None };
        video.add_layer(TileLayer::new("bg", 2, 2, 2, 2, 0, sources, decode, true));
        (regions, video)
    }

    #[test]
    fn test_render_redraws_only_dirty() {
        let (mut regions, mut video) = setup();
        let mut frame = Bitmap::new(4, 4);
        assert_eq!(video.render(&[], &[], &GEOMETRY, &mut frame).tiles_redrawn, 4);
        assert_eq!(video.phase(), Phase::Idle);
        assert_eq!(video.render(&[], &[], &GEOMETRY, &mut frame).tiles_redrawn, 0);

        let code = regions.find("videoram").unwrap();
        regions.get_mut(code)[3] = 1;
        video.tile_written(0, &regions, code, 3);
        let stats = video.render(&[], &[], &GEOMETRY, &mut frame);
        assert_eq!(stats.tiles_redrawn, 1);
        assert_eq!(frame.pixel(3, 3), 1);
    }

    #[test]
    fn test_later_sprite_on_top() {
        let (_, mut video) = setup();
        let mut frame = Bitmap::new(4, 4);
        let a = SpriteSlot { code: 2, enabled: true, ..Default::default() };
        let b = SpriteSlot { code: 3, x: 1, enabled: true, ..Default::default() };
        let stats = video.render(&[], &[a, b], &GEOMETRY, &mut frame);
        assert_eq!(stats.sprites_drawn, 2);
        assert_eq!(frame.pixel(0, 0), 2);
        // 重なった部分は後のスロット
        assert_eq!(frame.pixel(1, 0), 3);
    }

    #[test]
    fn test_sprite_pen_zero_transparent() {
        let (mut regions, mut video) = setup();
        let mut frame = Bitmap::new(4, 4);
        let code = regions.find("videoram").unwrap();
        regions.get_mut(code).fill(1);
        video.sync_layers(&regions);
        let blank = SpriteSlot { code: 0, enabled: true, ..Default::default() };
        video.render(&[], &[blank], &GEOMETRY, &mut frame);
        assert_eq!(frame.pixel(0, 0), 1);
    }

    #[test]
    fn test_flip_invalidates_all_layers() {
        let (_, mut video) = setup();
        let mut frame = Bitmap::new(4, 4);
        video.render(&[], &[], &GEOMETRY, &mut frame);
        video.set_flip_screen(true);
        assert_eq!(video.render(&[], &[], &GEOMETRY, &mut frame).tiles_redrawn, 4);
    }
}
