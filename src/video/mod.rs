//! ビデオ合成
//!
//! タイルレイヤー・スプライト・パレットを1枚のペンビットマップに合成する

pub mod bitmap;
pub mod compositor;
pub mod gfx;
pub mod palette;
pub mod sprites;
pub mod tilemap;

pub use bitmap::{Bitmap, Rect, Scroll, TRANSPARENT_PEN};
pub use compositor::{Compositor, FrameStats, Phase};
pub use gfx::{draw_gfx, GfxLayout, GfxSet, Transparency};
pub use palette::{rgb, weigh3, Palette};
pub use sprites::{SpriteDraw, SpriteGeometry, SpriteSlot};
pub use tilemap::{TileBytes, TileCell, TileDecoder, TileLayer, TileSources};
