//! PDF first-page rasterization and single-page PDF output
//!
//! Rasterization is image-based: the page is a white canvas sized from its
//! MediaBox at [`PDF_RASTER_DPI`]. The page content is walked for `Do`
//! operators, and every decodable image XObject is drawn at the rectangle
//! the current transformation matrix maps it to. This covers scanned
//! documents, which is where the bulk of PDF bytes live. Vector text and
//! paths are not drawn.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::collections::HashMap;
use std::io::Read;

use crate::error::AppError;

/// Resolution used when mapping PDF points to pixels
const PDF_RASTER_DPI: u32 = 72;
const POINTS_PER_INCH: f64 = 72.0;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};
const MAX_RASTER_SIDE: u32 = 10_000;
const MAX_PAGE_TREE_DEPTH: usize = 32;
const MAX_FORM_DEPTH: usize = 8;
/// Image placements drawn per page
const MAX_PLACEMENTS: usize = 64;
/// Declared `Width * Height` above which an image XObject is skipped
const MAX_IMAGE_PIXELS: u64 = 40_000_000;
/// Cap on bytes inflated from any single content stream or JPEG payload
const MAX_INFLATED_BYTES: usize = 64 * 1024 * 1024;
/// Largest destination rectangle an image is resampled to
const MAX_DRAW_PIXELS: f64 = 40_000_000.0;

/// Render the first page of `bytes` to an RGB raster.
///
/// # Errors
/// Returns [`AppError::Decode`] if the document cannot be parsed, has no
/// pages, or declares a page too large to rasterize.
pub fn rasterize_first_page(bytes: &[u8]) -> Result<RgbImage, AppError> {
    let doc =
        Document::load_mem(bytes).map_err(|e| AppError::Decode(format!("invalid pdf: {e}")))?;
    let (_, page_id) = doc
        .get_pages()
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Decode("pdf has no pages".to_string()))?;

    let media_box = page_box(&doc, page_id);
    let width = points_to_pixels(media_box.width())?;
    let height = points_to_pixels(media_box.height())?;
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);

    let resources = inherited_page_attribute(&doc, page_id, b"Resources")
        .and_then(|object| resolve(&doc, object).as_dict().ok());
    let mut placements = Vec::new();
    collect_placements(
        &doc,
        &page_operations(&doc, page_id),
        resources,
        Matrix::IDENTITY,
        0,
        &mut placements,
    );

    let mut decoded: HashMap<ObjectId, Option<RgbImage>> = HashMap::new();
    let mut drawn = 0;
    for placement in &placements {
        let image = decoded
            .entry(placement.object_id)
            .or_insert_with(|| decode_image_xobject(&doc, placement.object_id));
        if let Some(image) = image {
            if draw_placement(&mut canvas, image, &placement.ctm, &media_box) {
                drawn += 1;
            }
        }
    }

    tracing::debug!(
        width,
        height,
        placements = placements.len(),
        drawn,
        "Rasterized first page"
    );

    Ok(canvas)
}

/// Wrap an already-encoded JPEG as the only content of a one-page PDF.
///
/// The page is sized so the raster maps back to [`PDF_RASTER_DPI`].
pub(super) fn wrap_jpeg_in_pdf(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AppError> {
    let width_pt = pixels_to_points(width);
    let height_pt = pixels_to_points(height);

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                width_pt.into(),
                0_i64.into(),
                0_i64.into(),
                height_pt.into(),
                0_i64.into(),
                0_i64.into(),
            ],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ];

    single_image_page(jpeg, (width, height), (width_pt, height_pt), operations)
}

/// One page of `page_size` points drawn by `operations`, with `jpeg`
/// registered as the `/Im0` image XObject.
fn single_image_page(
    jpeg: &[u8],
    (width, height): (u32, u32),
    (width_pt, height_pt): (i64, i64),
    operations: Vec<Operation>,
) -> Result<Vec<u8>, AppError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    ));

    let content_bytes = Content { operations }
        .encode()
        .map_err(|e| AppError::Encode(format!("pdf content encode failed: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), width_pt.into(), height_pt.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::with_capacity(jpeg.len() + 1024);
    doc.save_to(&mut out)
        .map_err(|e| AppError::Encode(format!("pdf write failed: {e}")))?;
    Ok(out)
}

fn points_to_pixels(points: f64) -> Result<u32, AppError> {
    let pixels = (points * f64::from(PDF_RASTER_DPI) / POINTS_PER_INCH).round();
    if !pixels.is_finite() || pixels > f64::from(MAX_RASTER_SIDE) {
        return Err(AppError::Decode(format!(
            "page side of {points}pt exceeds the {MAX_RASTER_SIDE}px raster limit"
        )));
    }
    Ok((pixels as u32).max(1))
}

fn pixels_to_points(pixels: u32) -> i64 {
    (f64::from(pixels) * POINTS_PER_INCH / f64::from(PDF_RASTER_DPI)).round() as i64
}

/// Page rectangle in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
struct PageBox {
    llx: f64,
    lly: f64,
    urx: f64,
    ury: f64,
}

impl PageBox {
    fn width(&self) -> f64 {
        self.urx - self.llx
    }

    fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    inherited_page_attribute(doc, page_id, b"MediaBox")
        .map(|object| resolve(doc, object))
        .and_then(|object| object.as_array().ok())
        .and_then(|values| {
            let coords: Vec<f64> = values
                .iter()
                .filter_map(|value| number(resolve(doc, value)))
                .collect();
            match coords.as_slice() {
                [x0, y0, x1, y1] => Some(PageBox {
                    llx: x0.min(*x1),
                    lly: y0.min(*y1),
                    urx: x0.max(*x1),
                    ury: y0.max(*y1),
                }),
                _ => None,
            }
        })
        .filter(|page| page.width() > 0.0 && page.height() > 0.0)
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

/// Page attributes like MediaBox and Resources may live on any ancestor in
/// the page tree.
fn inherited_page_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// Affine transform `[a b c d e f]` mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(doc: &Document, operands: &[Object]) -> Option<Self> {
        let values: Vec<f64> = operands
            .iter()
            .filter_map(|operand| number(resolve(doc, operand)))
            .collect();
        match values.as_slice() {
            [a, b, c, d, e, f] if operands.len() == 6 => Some(Self {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            }),
            _ => None,
        }
    }

    /// Transform applying `self` first, then `next`
    fn then(&self, next: &Self) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// An image XObject painted by `Do` under `ctm`
#[derive(Debug, Clone, Copy)]
struct Placement {
    object_id: ObjectId,
    ctm: Matrix,
}

/// Concatenated, decoded operations of the page's content streams
fn page_operations(doc: &Document, page_id: ObjectId) -> Vec<Operation> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let streams: Vec<&Stream> = match page.get(b"Contents").map(|c| resolve(doc, c)) {
        Ok(Object::Stream(stream)) => vec![stream],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| resolve(doc, item).as_stream().ok())
            .collect(),
        _ => Vec::new(),
    };

    let mut bytes = Vec::new();
    for stream in streams {
        let remaining = MAX_INFLATED_BYTES.saturating_sub(bytes.len());
        if let Some(part) = stream_bytes(doc, stream, remaining) {
            bytes.extend_from_slice(&part);
            bytes.push(b'\n');
        }
    }

    Content::decode(&bytes)
        .map(|content| content.operations)
        .unwrap_or_default()
}

/// Walk `operations`, tracking the graphics-state matrix through `q`, `Q`
/// and `cm`, and record every image painted by `Do`. Form XObjects are
/// entered with their `/Matrix` applied.
fn collect_placements<'a>(
    doc: &'a Document,
    operations: &[Operation],
    resources: Option<&'a Dictionary>,
    base: Matrix,
    depth: usize,
    out: &mut Vec<Placement>,
) {
    let mut ctm = base;
    let mut saved = Vec::new();

    for operation in operations {
        if out.len() >= MAX_PLACEMENTS {
            return;
        }
        match operation.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => {
                if let Some(previous) = saved.pop() {
                    ctm = previous;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(doc, &operation.operands) {
                    ctm = matrix.then(&ctm);
                }
            }
            "Do" => {
                let Some((object_id, stream)) = resources
                    .zip(operation.operands.first().and_then(|o| o.as_name().ok()))
                    .and_then(|(resources, name)| lookup_xobject(doc, resources, name))
                else {
                    continue;
                };

                match subtype(stream) {
                    Some(b"Image") => out.push(Placement { object_id, ctm }),
                    Some(b"Form") if depth < MAX_FORM_DEPTH => {
                        let form_matrix = stream
                            .dict
                            .get(b"Matrix")
                            .ok()
                            .and_then(|m| resolve(doc, m).as_array().ok())
                            .and_then(|values| Matrix::from_operands(doc, values))
                            .unwrap_or(Matrix::IDENTITY);
                        let form_resources = stream
                            .dict
                            .get(b"Resources")
                            .ok()
                            .and_then(|r| resolve(doc, r).as_dict().ok())
                            .or(resources);
                        let form_operations = stream_bytes(doc, stream, MAX_INFLATED_BYTES)
                            .and_then(|bytes| Content::decode(&bytes).ok())
                            .map(|content| content.operations)
                            .unwrap_or_default();
                        collect_placements(
                            doc,
                            &form_operations,
                            form_resources,
                            form_matrix.then(&ctm),
                            depth + 1,
                            out,
                        );
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn lookup_xobject<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    name: &[u8],
) -> Option<(ObjectId, &'a Stream)> {
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?).as_dict().ok()?;
    let object_id = xobjects.get(name).ok()?.as_reference().ok()?;
    let stream = doc.get_object(object_id).ok()?.as_stream().ok()?;
    Some((object_id, stream))
}

fn subtype(stream: &Stream) -> Option<&[u8]> {
    stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|value| value.as_name().ok())
}

/// Scale `image` into the page rectangle `ctm` maps the unit square to, with
/// PDF's bottom-up y axis flipped to raster rows. Returns whether anything
/// was drawn.
fn draw_placement(
    canvas: &mut RgbImage,
    image: &RgbImage,
    ctm: &Matrix,
    media_box: &PageBox,
) -> bool {
    let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(u, v)| ctm.apply(u, v));
    let (min_x, max_x) = corners
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (x, _)| {
            (lo.min(*x), hi.max(*x))
        });
    let (min_y, max_y) = corners
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
            (lo.min(*y), hi.max(*y))
        });

    let scale = f64::from(PDF_RASTER_DPI) / POINTS_PER_INCH;
    let left = ((min_x - media_box.llx) * scale).round();
    let right = ((max_x - media_box.llx) * scale).round();
    let top = ((media_box.ury - max_y) * scale).round();
    let bottom = ((media_box.ury - min_y) * scale).round();

    let (width, height) = (right - left, bottom - top);
    if !(width.is_finite() && height.is_finite())
        || width < 1.0
        || height < 1.0
        || width * height > MAX_DRAW_PIXELS
    {
        return false;
    }
    if right <= 0.0
        || bottom <= 0.0
        || left >= f64::from(canvas.width())
        || top >= f64::from(canvas.height())
    {
        return false;
    }

    let mut scaled = imageops::resize(image, width as u32, height as u32, FilterType::Triangle);
    if ctm.a < 0.0 {
        imageops::flip_horizontal_in_place(&mut scaled);
    }
    if ctm.d < 0.0 {
        imageops::flip_vertical_in_place(&mut scaled);
    }
    imageops::overlay(canvas, &scaled, left as i64, top as i64);
    true
}

fn dimension(stream: &Stream, key: &[u8]) -> Option<u32> {
    stream
        .dict
        .get(key)
        .ok()?
        .as_i64()
        .ok()
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
}

/// Decode a DCT-encoded image, or an 8-bit DeviceRGB / DeviceGray sample
/// stream. Images declaring more than [`MAX_IMAGE_PIXELS`] are skipped
/// before any inflation.
fn decode_image_xobject(doc: &Document, object_id: ObjectId) -> Option<RgbImage> {
    let stream = doc.get_object(object_id).ok()?.as_stream().ok()?;
    let width = dimension(stream, b"Width")?;
    let height = dimension(stream, b"Height")?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_IMAGE_PIXELS {
        tracing::debug!(width, height, "Skipping oversized image XObject");
        return None;
    }

    let filters = stream_filters(doc, stream);
    if filters
        .last()
        .is_some_and(|filter| *filter == b"DCTDecode".as_slice())
    {
        let encoded = unfilter(stream, &filters[..filters.len() - 1], MAX_INFLATED_BYTES)?;
        return image::load_from_memory(&encoded)
            .ok()
            .map(|image| image.to_rgb8());
    }

    let bits_per_component = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|value| value.as_i64().ok())
        .unwrap_or(8);
    if bits_per_component != 8 {
        return None;
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .map(|object| resolve(doc, object))
        .and_then(|object| object.as_name().ok())?;
    let channels = match color_space {
        b"DeviceRGB" => 3,
        b"DeviceGray" => 1,
        _ => return None,
    };

    let expected = usize::try_from(pixels).ok()? * channels;
    let raw = unfilter(stream, &filters, expected)?;
    if raw.len() < expected {
        return None;
    }

    if channels == 3 {
        RgbImage::from_raw(width, height, raw)
    } else {
        image::GrayImage::from_raw(width, height, raw)
            .map(|gray| image::DynamicImage::ImageLuma8(gray).to_rgb8())
    }
}

fn stream_filters<'a>(doc: &'a Document, stream: &'a Stream) -> Vec<&'a [u8]> {
    match stream.dict.get(b"Filter").ok().map(|f| resolve(doc, f)) {
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(items)) => items.iter().filter_map(|i| i.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Content of `stream` with its filters undone, at most `limit` bytes
fn stream_bytes(doc: &Document, stream: &Stream, limit: usize) -> Option<Vec<u8>> {
    unfilter(stream, &stream_filters(doc, stream), limit)
}

/// Undo `filters` on the raw content of `stream`, producing at most `limit`
/// bytes. Only a single FlateDecode without a predictor is supported.
fn unfilter(stream: &Stream, filters: &[&[u8]], limit: usize) -> Option<Vec<u8>> {
    match filters {
        [] => Some(stream.content[..stream.content.len().min(limit)].to_vec()),
        [only] if *only == b"FlateDecode".as_slice() && !has_predictor(stream) => {
            inflate_capped(&stream.content, limit)
        }
        _ => None,
    }
}

fn has_predictor(stream: &Stream) -> bool {
    let params = match stream.dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(params)) => Some(params),
        Ok(Object::Array(items)) => items.first().and_then(|item| item.as_dict().ok()),
        _ => None,
    };
    params
        .and_then(|params| params.get(b"Predictor").ok())
        .and_then(|predictor| predictor.as_i64().ok())
        .is_some_and(|predictor| predictor > 1)
}

fn inflate_capped(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data)
        .take(limit as u64)
        .read_to_end(&mut out)
        .ok()?;
    Some(out)
}
