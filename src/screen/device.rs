//! The device-side display codec: packs a [`Screen`] into the Fire's
//! Write-OLED SysEx message.

use super::{Screen, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Size of the 7-bit OLED payload: ceil(128 * 64 / 7)
const OLED_BITMAP_SIZE: usize = 1171;

/// The OLED controller doesn't address pixels linearly; each group of 7
/// display columns is spread over 8 payload bytes in this order. Reproduced
/// bit-exact from the documented Fire protocol.
const PIXEL_SHUFFLE: [[u16; 8]; 7] = [
    [13, 0, 1, 2, 3, 4, 5, 6],
    [19, 20, 7, 8, 9, 10, 11, 12],
    [25, 26, 27, 14, 15, 16, 17, 18],
    [31, 32, 33, 34, 21, 22, 23, 24],
    [37, 38, 39, 40, 41, 28, 29, 30],
    [43, 44, 45, 46, 47, 48, 35, 36],
    [49, 50, 51, 52, 53, 54, 55, 42],
];

/// Serialize the screen into the complete "write display" SysEx message,
/// ready to be sent to the device.
///
/// The output is byte-for-byte reproducible from the same screen state.
pub fn oled_sysex(screen: &Screen) -> Vec<u8> {
    let mut bitmap = [0u8; OLED_BITMAP_SIZE];

    for y in 0..SCREEN_HEIGHT {
        for x in 0..SCREEN_WIDTH {
            if !screen.pixel(x, y) {
                continue;
            }

            // Fold the row into the 8-pixel page, then shuffle the bit into
            // the controller's layout
            let column = (x + SCREEN_WIDTH * (y / 8)) as u16;
            let shuffled = PIXEL_SHUFFLE[(column % 7) as usize][(y % 8) as usize];
            let index = (column / 7) * 8 + shuffled / 7;
            bitmap[index as usize] |= 1 << (shuffled % 7);
        }
    }

    // Payload length counts the band/column window bytes as well
    let chunk_size = (OLED_BITMAP_SIZE + 4) as u16;

    let mut message = Vec::with_capacity(12 + OLED_BITMAP_SIZE);
    message.extend([
        0xF0, // Start of SysEx
        0x47, // Manufacturer ID (Akai)
        0x7F, // All-Call address
        0x43, // Fire product ID
        0x0E, // Write OLED command
        (chunk_size >> 7) as u8,
        (chunk_size & 0x7F) as u8,
        0x00, // start band
        0x07, // end band
        0x00, // start column
        0x7F, // end column
    ]);
    message.extend(bitmap);
    message.push(0xF7); // End of SysEx

    message
}
