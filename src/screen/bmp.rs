//! The verification-image display codec: the same logical bitmap as the
//! device codec, but as a monochrome BMP file that can be inspected (or
//! parsed back) without any hardware attached.

use super::{Screen, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::Error;

// 14-byte file header + 40-byte info header + two palette entries
const PIXEL_DATA_OFFSET: u32 = 14 + 40 + 8;
const ROW_BYTES: usize = SCREEN_WIDTH as usize / 8; // already 4-byte aligned
const PIXEL_DATA_SIZE: u32 = (ROW_BYTES * SCREEN_HEIGHT as usize) as u32;

/// Encode the screen as an uncompressed 1-bit BMP.
///
/// Palette index 0 is black (unlit), index 1 is white (lit); rows are stored
/// bottom-up as the format demands. The output is byte-for-byte reproducible
/// from the same screen state.
pub fn encode_bmp(screen: &Screen) -> Vec<u8> {
    let mut out = Vec::with_capacity((PIXEL_DATA_OFFSET + PIXEL_DATA_SIZE) as usize);

    // BITMAPFILEHEADER
    out.extend(b"BM");
    out.extend((PIXEL_DATA_OFFSET + PIXEL_DATA_SIZE).to_le_bytes());
    out.extend([0; 4]); // reserved
    out.extend(PIXEL_DATA_OFFSET.to_le_bytes());

    // BITMAPINFOHEADER
    out.extend(40u32.to_le_bytes());
    out.extend(SCREEN_WIDTH.to_le_bytes());
    out.extend(SCREEN_HEIGHT.to_le_bytes());
    out.extend(1u16.to_le_bytes()); // planes
    out.extend(1u16.to_le_bytes()); // bits per pixel
    out.extend(0u32.to_le_bytes()); // no compression
    out.extend(PIXEL_DATA_SIZE.to_le_bytes());
    out.extend([0; 8]); // resolution, unspecified
    out.extend(2u32.to_le_bytes()); // palette entries
    out.extend(2u32.to_le_bytes()); // important colors

    // palette, BGRX
    out.extend([0x00, 0x00, 0x00, 0x00]);
    out.extend([0xFF, 0xFF, 0xFF, 0x00]);

    for y in (0..SCREEN_HEIGHT).rev() {
        for byte_index in 0..ROW_BYTES {
            let mut byte = 0u8;
            for bit in 0..8 {
                if screen.pixel((byte_index * 8 + bit) as i32, y) {
                    byte |= 0x80 >> bit;
                }
            }
            out.push(byte);
        }
    }

    out
}

/// Parse a BMP produced by [`encode_bmp`] back into a pixel grid.
///
/// This is deliberately strict: it accepts exactly the monochrome 128x64
/// layout this library writes, anything else is a [`Error::MalformedImage`].
pub fn decode_bmp(data: &[u8]) -> Result<Screen, Error> {
    let malformed = |reason| Error::MalformedImage { reason };

    if data.len() < PIXEL_DATA_OFFSET as usize {
        return Err(malformed("shorter than the header"));
    }
    if &data[0..2] != b"BM" {
        return Err(malformed("missing BM signature"));
    }

    let offset = u32::from_le_bytes(data[10..14].try_into().unwrap()) as usize;
    let info_size = u32::from_le_bytes(data[14..18].try_into().unwrap());
    let width = i32::from_le_bytes(data[18..22].try_into().unwrap());
    let height = i32::from_le_bytes(data[22..26].try_into().unwrap());
    let bits_per_pixel = u16::from_le_bytes(data[28..30].try_into().unwrap());
    let compression = u32::from_le_bytes(data[30..34].try_into().unwrap());

    if info_size != 40 {
        return Err(malformed("unexpected info header size"));
    }
    if width != SCREEN_WIDTH || height != SCREEN_HEIGHT {
        return Err(malformed("not 128x64"));
    }
    if bits_per_pixel != 1 {
        return Err(malformed("not 1 bit per pixel"));
    }
    if compression != 0 {
        return Err(malformed("compressed"));
    }
    if data.len() < offset + PIXEL_DATA_SIZE as usize {
        return Err(malformed("truncated pixel data"));
    }

    let mut screen = Screen::new();
    for y in 0..SCREEN_HEIGHT {
        let row_start = offset + (SCREEN_HEIGHT - 1 - y) as usize * ROW_BYTES;
        for x in 0..SCREEN_WIDTH {
            let byte = data[row_start + x as usize / 8];
            if byte & (0x80 >> (x % 8)) != 0 {
                screen.set_pixel(x, y, true);
            }
        }
    }

    Ok(screen)
}

impl Screen {
    /// Encode this screen as a monochrome BMP. See [`encode_bmp`].
    pub fn to_bmp(&self) -> Vec<u8> {
        encode_bmp(self)
    }

    /// Write this screen to `path` as a monochrome BMP file.
    pub fn write_bmp<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_bmp())
    }
}
