const MAGIC: &[u8; 3] = b"Awa";

/// AWA frame as read by HyperSerialPico.
///
/// The header carries `led_count - 1`; the trailer carries two Fletcher sums
/// plus a position-mixed sum that must never equal the magic's first byte.
pub fn build_awa_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let led_count = (pixel_data.len() / stride) as u16;
    let [count_hi, count_lo] = led_count.saturating_sub(1).to_be_bytes();
    let crc = count_hi ^ count_lo ^ 0x55;

    let mut frame = Vec::with_capacity(6 + pixel_data.len() + 3);
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&[count_hi, count_lo, crc]);
    frame.extend_from_slice(pixel_data);

    let mut fletcher1: u32 = 0;
    let mut fletcher2: u32 = 0;
    let mut fletcher_ext: u32 = 0;

    for (position, &byte) in pixel_data.iter().enumerate() {
        let byte = byte as u32;
        // Position is a 16-bit counter on the receiving side
        let position = position as u16 as u32;
        fletcher1 = (fletcher1 + byte) % 255;
        fletcher2 = (fletcher2 + fletcher1) % 255;
        fletcher_ext = (fletcher_ext + (byte ^ position)) % 255;
    }

    if fletcher_ext == 0x41 {
        fletcher_ext = 0xaa;
    }

    frame.extend_from_slice(&[fletcher1 as u8, fletcher2 as u8, fletcher_ext as u8]);
    frame
}
