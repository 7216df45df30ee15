//! Wraps a captured JPEG into a single-page A4 PDF.
//!
//! The JPEG stream is embedded as-is (`DCTDecode`), so no re-encoding happens.
//! The image is scaled to fit the page, keeping its aspect ratio, and
//! centred. The colour space follows the frame header, so CMYK scans stay
//! CMYK.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::error_handling::types::PersistError;

/// A4 portrait in PDF points.
pub const PAGE_WIDTH: i64 = 595;
pub const PAGE_HEIGHT: i64 = 842;

/// Colour model of the embedded JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegColor {
    Gray,
    Rgb,
    /// Adobe-tagged CMYK is stored inverted and needs a `Decode` array.
    Cmyk { inverted: bool },
}

impl JpegColor {
    fn pdf_name(self) -> &'static str {
        match self {
            JpegColor::Gray => "DeviceGray",
            JpegColor::Rgb => "DeviceRGB",
            JpegColor::Cmyk { .. } => "DeviceCMYK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameInfo {
    components: u8,
    adobe: bool,
}

/// Walks the marker segments up to the first start-of-frame.
///
/// `None` when the stream ends or reaches scan data without a frame header.
fn frame_info(jpeg: &[u8]) -> Option<FrameInfo> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    let mut adobe = false;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            return None;
        }
        let marker = jpeg[pos + 1];
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }
        // the length counts its own two bytes
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        let body = jpeg.get(pos + 4..pos + 2 + len)?;
        match marker {
            0xEE if body.starts_with(b"Adobe") => adobe = true,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                return body.get(5).map(|&components| FrameInfo { components, adobe });
            }
            _ => {}
        }
        pos += 2 + len;
    }
    None
}

fn image_dictionary(width: u32, height: u32, color: JpegColor) -> Dictionary {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color.pdf_name(),
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    if color == (JpegColor::Cmyk { inverted: true }) {
        let decode: Vec<Object> = [1i64, 0, 1, 0, 1, 0, 1, 0]
            .into_iter()
            .map(Object::from)
            .collect();
        dict.set("Decode", decode);
    }
    dict
}

pub fn jpeg_to_pdf(jpeg: &[u8]) -> Result<Vec<u8>, PersistError> {
    let frame = frame_info(jpeg);
    if let Some(FrameInfo { components, .. }) = frame {
        if !matches!(components, 1 | 3 | 4) {
            return Err(PersistError::Pdf(format!(
                "unsupported JPEG with {} components",
                components
            )));
        }
    }
    let decoder = JpegDecoder::new(Cursor::new(jpeg))
        .map_err(|e| PersistError::Pdf(format!("invalid JPEG: {}", e)))?;
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return Err(PersistError::Pdf("JPEG has no pixels".to_string()));
    }
    let color = match frame {
        Some(FrameInfo { components: 1, .. }) => JpegColor::Gray,
        Some(FrameInfo {
            components: 4,
            adobe,
        }) => JpegColor::Cmyk { inverted: adobe },
        Some(_) => JpegColor::Rgb,
        None => match decoder.color_type() {
            ColorType::L8 | ColorType::L16 => JpegColor::Gray,
            _ => JpegColor::Rgb,
        },
    };
    let (draw_w, draw_h) = fit(width as i64, height as i64);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        image_dictionary(width, height, color),
        jpeg.to_vec(),
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    draw_w.into(),
                    0.into(),
                    0.into(),
                    draw_h.into(),
                    ((PAGE_WIDTH - draw_w) / 2).into(),
                    ((PAGE_HEIGHT - draw_h) / 2).into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| PersistError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PersistError::Pdf(e.to_string()))?;
    debug!(
        "Wrapped {}x{} {} JPEG ({} byte(s)) into {} byte PDF",
        width,
        height,
        color.pdf_name(),
        jpeg.len(),
        out.len()
    );
    Ok(out)
}

/// Largest size with the image's aspect ratio that fits on the page.
fn fit(width: i64, height: i64) -> (i64, i64) {
    if width * PAGE_HEIGHT > height * PAGE_WIDTH {
        (PAGE_WIDTH, (height * PAGE_WIDTH / width).max(1))
    } else {
        ((width * PAGE_HEIGHT / height).max(1), PAGE_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{DynamicImage, GrayImage, RgbImage};

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new(&mut buf)).unwrap();
        buf
    }

    fn gray_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, image::Luma([90])));
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new(&mut buf)).unwrap();
        buf
    }

    /// Marker segments only: SOI, optional Adobe APP14, a padded SOF0, EOI.
    fn frame_header(components: u8, adobe: bool) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        if adobe {
            out.extend_from_slice(&[0xFF, 0xEE, 0x00, 0x0E]);
            out.extend_from_slice(b"Adobe");
            out.extend_from_slice(&[0, 100, 0, 0, 0, 0, 2]);
        }
        let len = 8 + 3 * components as u16;
        out.push(0xFF);
        out.extend_from_slice(&[0xFF, 0xC0]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&[8, 0, 4, 0, 4, components]);
        for id in 1..=components {
            out.extend_from_slice(&[id, 0x11, 0]);
        }
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn embedded_color_space(pdf: &[u8]) -> Vec<u8> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.objects
            .values()
            .find_map(|object| match object {
                Object::Stream(stream) => match stream.dict.get(b"ColorSpace") {
                    Ok(Object::Name(name)) => Some(name.clone()),
                    _ => None,
                },
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn produces_single_page_pdf() {
        let jpeg = sample_jpeg(60, 80);
        let pdf = jpeg_to_pdf(&jpeg).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        // the JPEG is embedded verbatim
        assert!(pdf.windows(jpeg.len()).any(|w| w == jpeg.as_slice()));
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        assert_eq!(fit(PAGE_WIDTH, PAGE_HEIGHT), (PAGE_WIDTH, PAGE_HEIGHT));
        assert_eq!(fit(1000, 500), (PAGE_WIDTH, 297));
        assert_eq!(fit(100, 1000), (84, PAGE_HEIGHT));
    }

    #[test]
    fn color_space_follows_the_frame_header() {
        let rgb = sample_jpeg(16, 16);
        assert_eq!(
            frame_info(&rgb),
            Some(FrameInfo {
                components: 3,
                adobe: false
            })
        );
        assert_eq!(embedded_color_space(&jpeg_to_pdf(&rgb).unwrap()), b"DeviceRGB");

        let gray = gray_jpeg(16, 16);
        assert_eq!(frame_info(&gray).map(|f| f.components), Some(1));
        assert_eq!(embedded_color_space(&jpeg_to_pdf(&gray).unwrap()), b"DeviceGray");
    }

    #[test]
    fn cmyk_frames_are_embedded_as_cmyk() {
        assert_eq!(
            frame_info(&frame_header(4, true)),
            Some(FrameInfo {
                components: 4,
                adobe: true
            })
        );
        assert_eq!(
            frame_info(&frame_header(4, false)),
            Some(FrameInfo {
                components: 4,
                adobe: false
            })
        );

        let dict = image_dictionary(4, 4, JpegColor::Cmyk { inverted: true });
        assert!(matches!(
            dict.get(b"ColorSpace"),
            Ok(Object::Name(name)) if name.as_slice() == b"DeviceCMYK"
        ));
        assert!(matches!(dict.get(b"Decode"), Ok(Object::Array(values)) if values.len() == 8));

        let plain = image_dictionary(4, 4, JpegColor::Cmyk { inverted: false });
        assert!(plain.get(b"Decode").is_err());
        assert!(image_dictionary(4, 4, JpegColor::Rgb).get(b"Decode").is_err());
    }

    #[test]
    fn unusual_component_counts_are_rejected() {
        let err = jpeg_to_pdf(&frame_header(2, false)).unwrap_err();
        assert!(matches!(err, PersistError::Pdf(ref msg) if msg.contains("2 components")));
        assert_eq!(frame_info(b"\xFF\xD8\xFF\xD9"), None);
    }

    #[test]
    fn rejects_non_jpeg_input() {
        assert!(matches!(
            jpeg_to_pdf(b"not a jpeg"),
            Err(PersistError::Pdf(_))
        ));
    }
}
