//! スプライト
//!
//! ドライバはスプライトRAMを `SpriteSlot` の列に読み替え、
//! 座標変換は `SpriteGeometry` が画面反転込みで行う

/// スプライトRAM 1スロット分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteSlot {
    pub code: u16,
    pub x: u8,
    pub y: u8,
    pub color: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    pub enabled: bool,
    /// コードの上位バンク
    pub bank: bool,
    /// 縦2枚（code と code + 1）
    pub tall: bool,
}

/// 画面上の1枚
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteDraw {
    pub code: u32,
    pub color: u32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub sx: i32,
    pub sy: i32,
}

/// ドライバ固有のスプライト座標系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteGeometry {
    pub gfx: usize,
    /// 1枚のピクセルサイズ（縦2枚の間隔）
    pub size: i32,
    /// 非反転時に sy = base - y とする
    pub y_from_bottom: Option<i32>,
    /// 画面反転時に sx = base - x とする
    pub flipped_x: Option<i32>,
    /// 画面反転時に sy = base - y とする
    pub flipped_y: Option<i32>,
    /// `bank` ビットで加算するコード数
    pub bank_stride: u32,
}

impl SpriteGeometry {
    /// スロットを画面上の配置に変換（縦2枚なら2つ）
    pub fn place(&self, slot: &SpriteSlot, flip_screen: bool) -> Vec<SpriteDraw> {
        if !slot.enabled {
            return Vec::new();
        }
        let code = slot.code as u32 + if slot.bank { self.bank_stride } else { 0 };
        let (mut sx, mut sy) = (slot.x as i32, slot.y as i32);
        let (mut flip_x, mut flip_y) = (slot.flip_x, slot.flip_y);
        if flip_screen {
            if let Some(base) = self.flipped_x {
                sx = base - sx;
            }
            if let Some(base) = self.flipped_y {
                sy = base - sy;
            }
            flip_x = !flip_x;
            flip_y = !flip_y;
        } else if let Some(base) = self.y_from_bottom {
            sy = base - sy;
        }

        let draw = |code: u32, sy: i32| SpriteDraw {
            code,
            color: slot.color as u32,
            flip_x,
            flip_y,
            sx,
            sy,
        };
        if !slot.tall {
            return vec![draw(code, sy)];
        }
        // 上半分は非反転時 code が上、反転時は下に回る
        let offset = if flip_screen { self.size } else { -self.size };
        vec![draw(code, sy + offset), draw(code + 1, sy)]
    }
}
