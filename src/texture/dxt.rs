//! DXT5 tile decompression.

use super::dds::{Tile, TILE_SIZE};
use crate::codec::read_bits;

/// Widens an RGB565 colour with the rounding the game's own decoder uses.
pub fn expand_rgb565(colour: u16) -> [u8; 3] {
    let r = u32::from(colour >> 11) & 0x1F;
    let g = u32::from(colour >> 5) & 0x3F;
    let b = u32::from(colour) & 0x1F;
    [
        ((r * 255 + 16) / 32) as u8,
        ((g * 255 + 32) / 64) as u8,
        ((b * 255 + 16) / 32) as u8,
    ]
}

/// The eight alpha values selectable by a tile's 3-bit codes.
pub fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let (a0w, a1w) = (u32::from(a0), u32::from(a1));
    let mut palette = [a0, a1, 0, 0, 0, 0, 0, 255];
    if a0 > a1 {
        for (i, slot) in palette.iter_mut().enumerate().skip(2) {
            let i = i as u32;
            *slot = (((8 - i) * a0w + (i - 1) * a1w) / 7) as u8;
        }
    } else {
        for (i, slot) in palette.iter_mut().enumerate().take(6).skip(2) {
            let i = i as u32;
            *slot = (((6 - i) * a0w + (i - 1) * a1w) / 5) as u8;
        }
    }
    palette
}

/// The four colours selectable by a tile's 2-bit codes.
pub fn colour_palette(c0: u16, c1: u16) -> [[u8; 3]; 4] {
    let (e0, e1) = (expand_rgb565(c0), expand_rgb565(c1));
    let blend = |w0: u32, w1: u32| -> [u8; 3] {
        std::array::from_fn(|ch| ((w0 * u32::from(e0[ch]) + w1 * u32::from(e1[ch])) / 3) as u8)
    };
    [e0, e1, blend(2, 1), blend(1, 2)]
}

/// Decodes one tile into 16 RGBA pixels, row by row.
pub fn decode_tile(tile: &Tile) -> [[u8; 4]; 16] {
    let alpha = alpha_palette(tile[0], tile[1]);
    let colours = colour_palette(
        u16::from_le_bytes([tile[8], tile[9]]),
        u16::from_le_bytes([tile[10], tile[11]]),
    );

    let mut pixels = [[0u8; 4]; 16];
    for (p, pixel) in pixels.iter_mut().enumerate() {
        let a = read_bits(&tile[2..8], p * 3, 3) as usize;
        let c = read_bits(&tile[12..TILE_SIZE], p * 2, 2) as usize;
        let [r, g, b] = colours[c];
        *pixel = [r, g, b, alpha[a]];
    }
    pixels
}

/// Decompresses a level's tiles into a `width` x `height` RGBA raster.
///
/// Tiles are laid out row-major; pixels of edge tiles that fall outside the
/// image are dropped.
pub fn decode_dxt5(tiles: &[Tile], width: u32, height: u32) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let across = width.div_ceil(4);
    let mut out = vec![0u8; width * height * 4];

    for (index, tile) in tiles.iter().enumerate() {
        let (tx, ty) = (index % across * 4, index / across * 4);
        for (p, pixel) in decode_tile(tile).iter().enumerate() {
            let (x, y) = (tx + p % 4, ty + p / 4);
            if x < width && y < height {
                let at = (y * width + x) * 4;
                out[at..at + 4].copy_from_slice(pixel);
            }
        }
    }
    out
}
