//! Multipart framing for the MJPEG preview stream.

/// Boundary between parts of the preview stream.
pub const BOUNDARY: &str = "MJPEGBOUNDARY";

/// `Content-Type` header value of the whole stream.
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace;boundary={}", BOUNDARY)
}

/// Header that precedes a JPEG of `len` bytes.
pub fn part_header(len: usize) -> String {
    format!(
        "\r\n--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Timestamp: 0.000000\r\n\r\n",
        BOUNDARY, len
    )
}

/// One complete part: header followed by the JPEG bytes.
pub fn part(jpeg: &[u8]) -> Vec<u8> {
    let header = part_header(jpeg.len());
    let mut out = Vec::with_capacity(header.len() + jpeg.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(jpeg);
    out
}
