// src/engine/orientation.rs
//
// Minimal EXIF orientation reader for JPEG streams.
//
// Single forward pass over the stream: find APP1, check the "Exif" header,
// pick the TIFF byte order, jump to IFD0 and scan its entries for tag
// 0x0112. Any malformed or truncated input reads as Unspecified; this
// metadata must never block decoding.

use super::buffer::PixelBuffer;
use super::pool::Parallel;
use super::scanner::ScanRegion;
use super::transform;
use std::io::{self, Read};

const MARKER_SOI: u16 = 0xffd8;
const MARKER_APP1: u16 = 0xffe1;
const EXIF_HEADER: u32 = 0x4578_6966; // "Exif"
const BYTE_ORDER_BE: u16 = 0x4d4d;
const BYTE_ORDER_LE: u16 = 0x4949;
const ORIENTATION_TAG: u16 = 0x0112;

/// EXIF orientation (tag 0x0112) values.
///
/// Rotation variants name the clockwise turn a viewer applies to display
/// the stored pixels upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Orientation {
    #[default]
    Unspecified = 0,
    Normal = 1,
    FlipH = 2,
    Rotate180 = 3,
    FlipV = 4,
    Transpose = 5,
    /// Stored on its side; corrected by a 270° counter-clockwise turn.
    Rotate90 = 6,
    Transverse = 7,
    /// Corrected by a 90° counter-clockwise turn.
    Rotate270 = 8,
}

impl Orientation {
    /// Map a raw tag value; anything outside 1..=8 is Unspecified.
    pub fn from_tag(value: u16) -> Self {
        match value {
            1 => Orientation::Normal,
            2 => Orientation::FlipH,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipV,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => Orientation::Unspecified,
        }
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    /// True when fixing this orientation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

struct ExifReader<R> {
    inner: R,
}

impl<R: Read> ExifReader<R> {
    fn u16(&mut self, order: ByteOrder) -> io::Result<u16> {
        let mut b = [0u8; 2];
        self.inner.read_exact(&mut b)?;
        Ok(match order {
            ByteOrder::Big => u16::from_be_bytes(b),
            ByteOrder::Little => u16::from_le_bytes(b),
        })
    }

    fn u32(&mut self, order: ByteOrder) -> io::Result<u32> {
        let mut b = [0u8; 4];
        self.inner.read_exact(&mut b)?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        })
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(n), &mut io::sink())?;
        if copied < n {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
}

/// Read the orientation tag from a JPEG byte stream.
pub fn read_orientation<R: Read>(r: R) -> Orientation {
    match parse(&mut ExifReader { inner: r }) {
        Ok(o) => o,
        Err(e) => {
            tracing::trace!(error = %e, "no usable EXIF orientation");
            Orientation::Unspecified
        }
    }
}

pub fn read_orientation_from_bytes(data: &[u8]) -> Orientation {
    read_orientation(data)
}

fn parse<R: Read>(r: &mut ExifReader<R>) -> io::Result<Orientation> {
    use Orientation::Unspecified;

    if r.u16(ByteOrder::Big)? != MARKER_SOI {
        return Ok(Unspecified);
    }

    loop {
        let marker = r.u16(ByteOrder::Big)?;
        let size = r.u16(ByteOrder::Big)?;
        if marker >> 8 != 0xff {
            return Ok(Unspecified);
        }
        if marker == MARKER_APP1 {
            break;
        }
        if size < 2 {
            return Ok(Unspecified);
        }
        r.skip(size as u64 - 2)?;
    }

    if r.u32(ByteOrder::Big)? != EXIF_HEADER {
        return Ok(Unspecified);
    }
    r.skip(2)?;

    let order = match r.u16(ByteOrder::Big)? {
        BYTE_ORDER_BE => ByteOrder::Big,
        BYTE_ORDER_LE => ByteOrder::Little,
        _ => return Ok(Unspecified),
    };
    r.skip(2)?;

    let offset = r.u32(order)?;
    if offset < 8 {
        return Ok(Unspecified);
    }
    r.skip(offset as u64 - 8)?;

    let num_tags = r.u16(order)?;
    for _ in 0..num_tags {
        let tag = r.u16(order)?;
        if tag != ORIENTATION_TAG {
            r.skip(10)?;
            continue;
        }
        r.skip(6)?;
        let value = r.u16(order)?;
        return Ok(Orientation::from_tag(value));
    }
    Ok(Unspecified)
}

/// Apply the transform that displays an image with orientation `o` upright.
pub fn fix_orientation<S: ScanRegion + ?Sized>(
    img: &S,
    o: Orientation,
    parallel: &Parallel,
) -> PixelBuffer {
    match o {
        Orientation::Unspecified | Orientation::Normal => transform::clone(img, parallel),
        Orientation::FlipH => transform::flip_h(img, parallel),
        Orientation::FlipV => transform::flip_v(img, parallel),
        Orientation::Rotate180 => transform::rotate180(img, parallel),
        Orientation::Rotate90 => transform::rotate270(img, parallel),
        Orientation::Rotate270 => transform::rotate90(img, parallel),
        Orientation::Transpose => transform::transpose(img, parallel),
        Orientation::Transverse => transform::transverse(img, parallel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI, one unrelated APP0 segment, then an APP1 EXIF block whose IFD0
    /// holds a dummy tag followed by the orientation tag.
    fn exif_jpeg(value: u16, little_endian: bool) -> Vec<u8> {
        let w16 = |v: u16| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        let w32 = |v: u32| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };

        let mut tiff = Vec::new();
        tiff.extend_from_slice(if little_endian { b"II" } else { b"MM" });
        tiff.extend_from_slice(&w16(42));
        tiff.extend_from_slice(&w32(8));
        tiff.extend_from_slice(&w16(2));
        // ImageWidth, LONG
        tiff.extend_from_slice(&w16(0x0100));
        tiff.extend_from_slice(&w16(4));
        tiff.extend_from_slice(&w32(1));
        tiff.extend_from_slice(&w32(640));
        // Orientation, SHORT
        tiff.extend_from_slice(&w16(ORIENTATION_TAG));
        tiff.extend_from_slice(&w16(3));
        tiff.extend_from_slice(&w32(1));
        tiff.extend_from_slice(&w16(value));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&w32(0));

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);

        let mut out = vec![0xff, 0xd8];
        out.extend_from_slice(&[0xff, 0xe0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        out.extend_from_slice(&[0xff, 0xe1]);
        out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&[0xff, 0xd9]);
        out
    }

    #[test]
    fn reads_every_valid_value_in_both_byte_orders() {
        for le in [false, true] {
            for v in 1..=8u16 {
                let o = read_orientation_from_bytes(&exif_jpeg(v, le));
                assert_eq!(o.tag(), v, "value {v}, little endian {le}");
            }
        }
    }

    #[test]
    fn value_six_is_rotate90() {
        assert_eq!(read_orientation_from_bytes(&exif_jpeg(6, false)), Orientation::Rotate90);
    }

    #[test]
    fn out_of_range_value_is_unspecified() {
        assert_eq!(read_orientation_from_bytes(&exif_jpeg(9, false)), Orientation::Unspecified);
        assert_eq!(read_orientation_from_bytes(&exif_jpeg(0, true)), Orientation::Unspecified);
    }

    #[test]
    fn missing_soi_is_unspecified() {
        let mut data = exif_jpeg(6, false);
        data[1] = 0xd9;
        assert_eq!(read_orientation_from_bytes(&data), Orientation::Unspecified);
        assert_eq!(read_orientation_from_bytes(b"\x89PNG\r\n\x1a\n"), Orientation::Unspecified);
        assert_eq!(read_orientation_from_bytes(&[]), Orientation::Unspecified);
    }

    #[test]
    fn malformed_structures_are_unspecified() {
        // bad marker high byte
        assert_eq!(
            read_orientation_from_bytes(&[0xff, 0xd8, 0x12, 0x34, 0x00, 0x10]),
            Orientation::Unspecified
        );
        // segment size below 2
        assert_eq!(
            read_orientation_from_bytes(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x01]),
            Orientation::Unspecified
        );
        // wrong byte order mark
        let mut data = exif_jpeg(6, false);
        let bo = data.windows(2).position(|w| w == b"MM").unwrap();
        data[bo] = b'X';
        assert_eq!(read_orientation_from_bytes(&data), Orientation::Unspecified);
        // truncated inside the IFD
        let data = exif_jpeg(6, false);
        assert_eq!(read_orientation_from_bytes(&data[..data.len() - 12]), Orientation::Unspecified);
    }

    #[test]
    fn no_exif_header_is_unspecified() {
        let mut data = exif_jpeg(3, false);
        let pos = data.windows(4).position(|w| w == b"Exif").unwrap();
        data[pos] = b'e';
        assert_eq!(read_orientation_from_bytes(&data), Orientation::Unspecified);
    }

    #[test]
    fn fix_orientation_restores_upright_image() {
        let p = Parallel::default();
        // upright 2x1: left red, right blue
        let mut upright = PixelBuffer::new(2, 1);
        upright.put_pixel(0, 0, [255, 0, 0, 255]);
        upright.put_pixel(1, 0, [0, 0, 255, 255]);

        // A camera held for tag 6 stores the image turned 90° counter-clockwise.
        let stored = transform::rotate90(&upright, &p);
        assert_eq!(fix_orientation(&stored, Orientation::Rotate90, &p), upright);

        let stored = transform::rotate270(&upright, &p);
        assert_eq!(fix_orientation(&stored, Orientation::Rotate270, &p), upright);

        let stored = transform::flip_h(&upright, &p);
        assert_eq!(fix_orientation(&stored, Orientation::FlipH, &p), upright);

        assert_eq!(fix_orientation(&upright, Orientation::Unspecified, &p), upright);
    }

    #[test]
    fn swaps_dimensions_for_side_orientations() {
        assert!(Orientation::Rotate90.swaps_dimensions());
        assert!(Orientation::Transverse.swaps_dimensions());
        assert!(!Orientation::FlipV.swaps_dimensions());
        assert!(!Orientation::Unspecified.swaps_dimensions());
    }
}
