const MAGIC: &[u8; 3] = b"Ada";

/// Adalight frame: `Ada`, LED count (big-endian), header checksum, pixels
pub fn build_adalight_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let led_count = (pixel_data.len() / stride) as u16;
    let [count_hi, count_lo] = led_count.to_be_bytes();
    let checksum = count_hi ^ count_lo ^ 0x55;

    let mut frame = Vec::with_capacity(6 + pixel_data.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&[count_hi, count_lo, checksum]);
    frame.extend_from_slice(pixel_data);
    frame
}
