use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{Exif, In, Tag, Value};
use std::io::Cursor;
use tracing::{debug, warn};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Normalized metadata for one image. Every field is optional; missing or
/// unreadable EXIF simply leaves fields empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `WIDTHxHEIGHT` of the decoded image.
    pub resolution: Option<String>,
}

/// Reads EXIF and dimensions from an in-memory image. Never fails.
pub fn extract_metadata(bytes: &[u8]) -> ImageMetadata {
    let mut metadata = ImageMetadata {
        resolution: read_resolution(bytes),
        ..Default::default()
    };

    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(error = %e, "No readable EXIF data.");
            return metadata;
        }
    };

    metadata.camera_make = ascii_field(&exif, Tag::Make).and_then(|s| sanitize(&s));
    metadata.camera_model = ascii_field(&exif, Tag::Model).and_then(|s| sanitize(&s));
    metadata.taken_at = read_taken_at(&exif);

    if let Some((lat, lon)) = read_gps(&exif) {
        metadata.latitude = Some(lat);
        metadata.longitude = Some(lon);
    }

    metadata
}

fn read_resolution(bytes: &[u8]) -> Option<String> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok((width, height)) => Some(format!("{width}x{height}")),
        Err(e) => {
            debug!(error = %e, "Could not read image dimensions.");
            None
        }
    }
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|raw| String::from_utf8_lossy(raw).into_owned()),
        _ => {
            warn!(%tag, "EXIF field has unexpected type.");
            None
        }
    }
}

/// Trims, drops non-printable characters and collapses inner whitespace.
pub fn sanitize(raw: &str) -> Option<String> {
    let printable: String = raw
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    let collapsed = printable.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn read_taken_at(exif: &Exif) -> Option<DateTime<Utc>> {
    let raw = ascii_field(exif, Tag::DateTimeOriginal).or_else(|| ascii_field(exif, Tag::DateTime))?;
    match NaiveDateTime::parse_from_str(raw.trim_end_matches('\0').trim(), EXIF_DATETIME_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            warn!(value = %raw, error = %e, "Unparsable EXIF timestamp.");
            None
        }
    }
}

fn read_gps(exif: &Exif) -> Option<(f64, f64)> {
    let lat = dms_field(exif, Tag::GPSLatitude)?;
    let lon = dms_field(exif, Tag::GPSLongitude)?;
    let lat_ref = ascii_field(exif, Tag::GPSLatitudeRef).unwrap_or_default();
    let lon_ref = ascii_field(exif, Tag::GPSLongitudeRef).unwrap_or_default();

    let lat = if lat_ref.trim().eq_ignore_ascii_case("S") { -lat } else { lat };
    let lon = if lon_ref.trim().eq_ignore_ascii_case("W") { -lon } else { lon };
    Some((lat, lon))
}

fn dms_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        warn!(%tag, "GPS field is not rational.");
        return None;
    };
    if parts.len() < 3 {
        warn!(%tag, len = parts.len(), "GPS field has too few components.");
        return None;
    }
    let decimal = dms_to_decimal(parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64());
    decimal.is_finite().then_some(decimal)
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
