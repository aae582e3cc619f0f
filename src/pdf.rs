//! PDF assembly: one A4 page per photo, the image placed at a fixed origin
//! and width with its aspect ratio preserved.

use anyhow::{Context, Result};
use image::{ColorType, GenericImageView};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};

/// Rendering engine surface consumed by the compilation workflow.
pub trait Renderer: Send + Sync {
    /// Assembles `photos` into a PDF at `output`, one page per photo in the
    /// given order. Returns the artifact's byte size.
    fn assemble(&self, photos: &[PathBuf], output: &Path) -> Result<u64>;
}

// Page geometry in PDF points: A4, 10 mm top/left margin, 190 mm image width.
const MM_TO_PT: f32 = 72.0 / 25.4;
const PAGE_WIDTH: f32 = 210.0 * MM_TO_PT;
const PAGE_HEIGHT: f32 = 297.0 * MM_TO_PT;
const MARGIN: f32 = 10.0 * MM_TO_PT;
const IMAGE_WIDTH: f32 = 190.0 * MM_TO_PT;

pub struct PdfRenderer;

impl Renderer for PdfRenderer {
    fn assemble(&self, photos: &[PathBuf], output: &Path) -> Result<u64> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(photos.len());

        for photo in photos {
            let page_id = add_photo_page(&mut doc, pages_id, photo)
                .with_context(|| format!("Failed to place image {}", photo.display()))?;
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(output)
            .with_context(|| format!("Failed to write PDF {}", output.display()))?;

        let size = std::fs::metadata(output)
            .with_context(|| format!("Failed to stat PDF {}", output.display()))?
            .len();
        Ok(size)
    }
}

fn add_photo_page(doc: &mut Document, pages_id: ObjectId, photo: &Path) -> Result<ObjectId> {
    let (image, width_px, height_px) = load_image_xobject(photo)?;
    let image_id = doc.add_object(image);

    let scaled_height = IMAGE_WIDTH * height_px as f32 / width_px as f32;
    // PDF origin is bottom-left; the margin is measured from the top.
    let x = MARGIN;
    let y = PAGE_HEIGHT - MARGIN - scaled_height;

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    IMAGE_WIDTH.into(),
                    0f32.into(),
                    0f32.into(),
                    scaled_height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().context("Failed to encode page content")?,
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0f32.into(), 0f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "Contents" => content_id,
    });
    Ok(page_id)
}

/// Builds the image XObject for one photo. JPEG bytes are embedded as-is via
/// `DCTDecode`; everything else is decoded and embedded as raw RGB, which the
/// document-wide compression pass deflates.
fn load_image_xobject(photo: &Path) -> Result<(Stream, u32, u32)> {
    let decoded = image::open(photo)
        .with_context(|| format!("Failed to decode image {}", photo.display()))?;
    let (width, height) = (decoded.width(), decoded.height());

    let extension = photo
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let is_jpeg = matches!(extension.as_str(), "jpg" | "jpeg");

    if is_jpeg {
        let color_space = match decoded.color() {
            ColorType::Rgb8 => Some("DeviceRGB"),
            ColorType::L8 => Some("DeviceGray"),
            // Unusual JPEG color layouts fall through to the raw RGB path.
            _ => None,
        };
        if let Some(color_space) = color_space {
            let bytes = std::fs::read(photo)
                .with_context(|| format!("Failed to read image {}", photo.display()))?;
            let mut stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8_i64,
                    "Filter" => "DCTDecode",
                },
                bytes,
            );
            // JPEG data is already compressed.
            stream.allows_compression = false;
            return Ok((stream, width, height));
        }
    }

    let rgb = decoded.to_rgb8();
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        rgb.into_raw(),
    );
    Ok((stream, width, height))
}
