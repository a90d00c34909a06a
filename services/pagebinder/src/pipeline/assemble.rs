//! PDF assembly.
//!
//! One page per image, sized exactly to the image's pixel dimensions in PDF
//! units, with the JPEG embedded via DCTDecode and drawn full-bleed. The
//! document is built on the blocking pool.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::error::AssembleError;

/// A normalized image ready to become one document page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Build the output document for `images`, already sorted into page order.
pub async fn assemble(images: Vec<PageImage>) -> Result<Vec<u8>, AssembleError> {
    tokio::task::spawn_blocking(move || build_document(&images))
        .await
        .map_err(|e| AssembleError::Task(e.to_string()))?
}

/// Synchronous document construction.
///
/// With zero images the document still gets a single blank Letter-sized
/// page: several viewers reject a page tree with an empty kid list.
pub fn build_document(images: &[PageImage]) -> Result<Vec<u8>, AssembleError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    if images.is_empty() {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    for (index, image) in images.iter().enumerate() {
        let width = i64::from(image.width);
        let height = i64::from(image.height);
        let name = format!("Im{index}");

        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.jpeg.clone(),
        )
        .with_compression(false);
        let xobject_id = doc.add_object(xobject);

        // q cm Do Q: scale the unit image square up to the page size
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut xobjects = Dictionary::new();
        xobjects.set(name, xobject_id);
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 100, 50]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn media_box(doc: &Document, page_id: lopdf::ObjectId) -> (i64, i64) {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        (
            media_box[2].as_i64().unwrap(),
            media_box[3].as_i64().unwrap(),
        )
    }

    #[test]
    fn one_page_per_image_in_input_order() {
        let images = vec![
            PageImage {
                width: 100,
                height: 40,
                jpeg: jpeg_bytes(100, 40),
            },
            PageImage {
                width: 30,
                height: 70,
                jpeg: jpeg_bytes(30, 70),
            },
        ];

        let bytes = build_document(&images).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let page_ids: Vec<_> = pages.values().copied().collect();
        assert_eq!(media_box(&doc, page_ids[0]), (100, 40));
        assert_eq!(media_box(&doc, page_ids[1]), (30, 70));
    }

    #[test]
    fn zero_images_still_produce_a_valid_document() {
        let bytes = build_document(&[]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn image_stream_uses_dct_filter() {
        let images = vec![PageImage {
            width: 8,
            height: 8,
            jpeg: jpeg_bytes(8, 8),
        }];

        let bytes = build_document(&images).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let has_dct_image = doc.objects.values().any(|object| {
            let Object::Stream(stream) = object else {
                return false;
            };
            stream
                .dict
                .get(b"Filter")
                .and_then(|f| f.as_name())
                .map(|name| name == b"DCTDecode".as_slice())
                .unwrap_or(false)
        });
        assert!(has_dct_image);
    }

    #[tokio::test]
    async fn assemble_runs_off_the_async_thread() {
        let bytes = assemble(vec![PageImage {
            width: 4,
            height: 4,
            jpeg: jpeg_bytes(4, 4),
        }])
        .await
        .unwrap();

        assert!(bytes.starts_with(b"%PDF"));
    }
}
