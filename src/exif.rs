//! EXIF embedding for exported images.
//!
//! Exported JPEGs get an APP1 segment carrying the asset's capture
//! timestamp, the resolved place name and GPS coordinates so the files
//! survive outside the vendor's cloud with their metadata intact. The TIFF
//! payload is assembled here and spliced into the JPEG with `img-parts`;
//! [`read_exif_summary`] reads the same fields back (used for verification).

use crate::error::{AuraError, Result};
use chrono::{DateTime, Utc};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use tracing::warn;

// IFD0 tags
const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_ARTIST: u16 = 0x013B;
const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const TAG_GPS_IFD_POINTER: u16 = 0x8825;

// Exif sub-IFD tags
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

// GPS IFD tags
const TAG_GPS_VERSION_ID: u16 = 0x0000;
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

/// Metadata embedded into an exported image.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub taken_at: Option<DateTime<Utc>>,
    /// Resolved place name, written as the image description
    pub place_name: Option<String>,
    /// Asset owner's display name
    pub artist: Option<String>,
    /// `(latitude, longitude)` in decimal degrees
    pub coordinates: Option<(f64, f64)>,
}

impl ImageMetadata {
    pub fn is_empty(&self) -> bool {
        self.taken_at.is_none()
            && self.place_name.is_none()
            && self.artist.is_none()
            && self.coordinates.is_none()
    }
}

/// One TIFF IFD entry with its encoded value bytes.
struct Entry {
    tag: u16,
    typ: u16,
    count: u32,
    value: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, text: &str) -> Self {
        // The type is nominally ASCII, but UTF-8 bytes go through verbatim
        // so place names keep their accents; readers accept this in practice.
        let mut value = text.as_bytes().to_vec();
        value.push(0);
        Self {
            tag,
            typ: TYPE_ASCII,
            count: value.len() as u32,
            value,
        }
    }

    fn bytes(tag: u16, raw: &[u8]) -> Self {
        Self {
            tag,
            typ: TYPE_BYTE,
            count: raw.len() as u32,
            value: raw.to_vec(),
        }
    }

    fn long(tag: u16, v: u32) -> Self {
        Self {
            tag,
            typ: TYPE_LONG,
            count: 1,
            value: v.to_le_bytes().to_vec(),
        }
    }

    fn rationals(tag: u16, values: &[(u32, u32)]) -> Self {
        let mut raw = Vec::with_capacity(values.len() * 8);
        for (num, den) in values {
            raw.extend_from_slice(&num.to_le_bytes());
            raw.extend_from_slice(&den.to_le_bytes());
        }
        Self {
            tag,
            typ: TYPE_RATIONAL,
            count: values.len() as u32,
            value: raw,
        }
    }
}

/// Convert a decimal coordinate to degrees/minutes/seconds rationals plus
/// the hemisphere reference.
fn to_dms(value: f64, is_longitude: bool) -> ([(u32, u32); 3], &'static str) {
    let reference = if is_longitude {
        if value < 0.0 {
            "W"
        } else {
            "E"
        }
    } else if value < 0.0 {
        "S"
    } else {
        "N"
    };

    let abs = value.abs();
    let degrees = abs.floor();
    let minutes_f = (abs - degrees) * 60.0;
    let minutes = minutes_f.floor();
    let seconds = (minutes_f - minutes) * 60.0;

    (
        [
            (degrees as u32, 1),
            (minutes as u32, 1),
            ((seconds * 10_000.0).round() as u32, 10_000),
        ],
        reference,
    )
}

fn ifd_byte_len(entry_count: usize) -> usize {
    // entry count + 12 bytes per entry + next-IFD offset
    2 + entry_count * 12 + 4
}

/// Serialize one IFD. Values wider than 4 bytes land in the shared data
/// area at `data_base + data.len()`.
fn serialize_ifd(entries: &[Entry], data_base: usize, data: &mut Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(ifd_byte_len(entries.len()));
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());

    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.typ.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.value.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.value.len()].copy_from_slice(&entry.value);
            out.extend_from_slice(&inline);
        } else {
            let offset = (data_base + data.len()) as u32;
            out.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&entry.value);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }

    // No chained IFD
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Build the raw TIFF payload for an APP1 EXIF segment (little-endian).
/// Returns `None` when there is nothing to embed.
pub fn build_exif_payload(meta: &ImageMetadata) -> Option<Vec<u8>> {
    if meta.is_empty() {
        return None;
    }

    let datetime_str = meta
        .taken_at
        .map(|dt| dt.format("%Y:%m:%d %H:%M:%S").to_string());

    let mut ifd0: Vec<Entry> = Vec::new();
    if let Some(description) = &meta.place_name {
        ifd0.push(Entry::ascii(TAG_IMAGE_DESCRIPTION, description));
    }
    if let Some(dt) = &datetime_str {
        ifd0.push(Entry::ascii(TAG_DATE_TIME, dt));
    }
    if let Some(artist) = &meta.artist {
        ifd0.push(Entry::ascii(TAG_ARTIST, artist));
    }

    let mut exif_ifd: Vec<Entry> = Vec::new();
    if let Some(dt) = &datetime_str {
        exif_ifd.push(Entry::ascii(TAG_DATE_TIME_ORIGINAL, dt));
        exif_ifd.push(Entry::ascii(TAG_DATE_TIME_DIGITIZED, dt));
    }

    let mut gps_ifd: Vec<Entry> = Vec::new();
    if let Some((lat, lon)) = meta.coordinates {
        let (lat_dms, lat_ref) = to_dms(lat, false);
        let (lon_dms, lon_ref) = to_dms(lon, true);
        gps_ifd.push(Entry::bytes(TAG_GPS_VERSION_ID, &[2, 3, 0, 0]));
        gps_ifd.push(Entry::ascii(TAG_GPS_LATITUDE_REF, lat_ref));
        gps_ifd.push(Entry::rationals(TAG_GPS_LATITUDE, &lat_dms));
        gps_ifd.push(Entry::ascii(TAG_GPS_LONGITUDE_REF, lon_ref));
        gps_ifd.push(Entry::rationals(TAG_GPS_LONGITUDE, &lon_dms));
    }

    let has_exif = !exif_ifd.is_empty();
    let has_gps = !gps_ifd.is_empty();

    // Layout: header, IFD0, Exif IFD, GPS IFD, overflow data area.
    let ifd0_count = ifd0.len() + usize::from(has_exif) + usize::from(has_gps);
    let ifd0_offset = 8usize;
    let exif_offset = ifd0_offset + ifd_byte_len(ifd0_count);
    let gps_offset = exif_offset
        + if has_exif {
            ifd_byte_len(exif_ifd.len())
        } else {
            0
        };
    let data_offset = gps_offset
        + if has_gps {
            ifd_byte_len(gps_ifd.len())
        } else {
            0
        };

    if has_exif {
        ifd0.push(Entry::long(TAG_EXIF_IFD_POINTER, exif_offset as u32));
    }
    if has_gps {
        ifd0.push(Entry::long(TAG_GPS_IFD_POINTER, gps_offset as u32));
    }
    ifd0.sort_by_key(|e| e.tag);

    let mut payload = Vec::new();
    payload.extend_from_slice(b"II");
    payload.extend_from_slice(&42u16.to_le_bytes());
    payload.extend_from_slice(&(ifd0_offset as u32).to_le_bytes());

    let mut data = Vec::new();
    payload.extend(serialize_ifd(&ifd0, data_offset, &mut data));
    if has_exif {
        payload.extend(serialize_ifd(&exif_ifd, data_offset, &mut data));
    }
    if has_gps {
        payload.extend(serialize_ifd(&gps_ifd, data_offset, &mut data));
    }
    payload.extend(data);

    Some(payload)
}

/// Splice EXIF metadata into a JPEG, replacing any existing EXIF segment.
///
/// Returns the original bytes untouched when there is nothing to embed.
pub fn embed_metadata(image: Vec<u8>, meta: &ImageMetadata) -> Result<Vec<u8>> {
    let Some(payload) = build_exif_payload(meta) else {
        return Ok(image);
    };

    let mut jpeg = Jpeg::from_bytes(Bytes::from(image))
        .map_err(|e| AuraError::Validation(format!("not a valid JPEG: {e}")))?;
    jpeg.set_exif(Some(Bytes::from(payload)));

    let mut out = Vec::new();
    jpeg.encoder()
        .write_to(&mut out)
        .map_err(|e| AuraError::Validation(format!("failed to encode JPEG: {e}")))?;
    Ok(out)
}

/// Embed metadata, falling back to the untouched image when the bytes are
/// not a JPEG the splicer understands (the vendor also serves HEIC/video
/// stills through the proxy).
pub fn embed_metadata_lossy(image: Vec<u8>, meta: &ImageMetadata) -> Vec<u8> {
    let copy = image.clone();
    match embed_metadata(image, meta) {
        Ok(tagged) => tagged,
        Err(e) => {
            warn!(error = %e, "could not embed EXIF, keeping original bytes");
            copy
        }
    }
}

/// Fields read back out of an image's EXIF block.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExifSummary {
    pub date_time: Option<String>,
    pub date_time_original: Option<String>,
    pub description: Option<String>,
    pub artist: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Read the summary fields from a JPEG's EXIF segment, if present.
pub fn read_exif_summary(image: &[u8]) -> Option<ExifSummary> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(image)).ok()?;
    let tiff = jpeg.exif()?;
    parse_tiff(&tiff)
}

fn parse_tiff(tiff: &[u8]) -> Option<ExifSummary> {
    if tiff.len() < 8 || &tiff[0..2] != b"II" {
        return None;
    }
    let ifd0_offset = read_u32(tiff, 4)? as usize;
    let ifd0 = parse_ifd(tiff, ifd0_offset)?;

    let mut summary = ExifSummary {
        description: entry_ascii(&ifd0, TAG_IMAGE_DESCRIPTION, tiff),
        date_time: entry_ascii(&ifd0, TAG_DATE_TIME, tiff),
        artist: entry_ascii(&ifd0, TAG_ARTIST, tiff),
        ..Default::default()
    };

    if let Some(offset) = entry_u32(&ifd0, TAG_EXIF_IFD_POINTER) {
        if let Some(exif_ifd) = parse_ifd(tiff, offset as usize) {
            summary.date_time_original = entry_ascii(&exif_ifd, TAG_DATE_TIME_ORIGINAL, tiff);
        }
    }

    if let Some(offset) = entry_u32(&ifd0, TAG_GPS_IFD_POINTER) {
        if let Some(gps_ifd) = parse_ifd(tiff, offset as usize) {
            summary.latitude = parse_gps_coordinate(
                &gps_ifd,
                TAG_GPS_LATITUDE,
                TAG_GPS_LATITUDE_REF,
                "S",
                tiff,
            );
            summary.longitude = parse_gps_coordinate(
                &gps_ifd,
                TAG_GPS_LONGITUDE,
                TAG_GPS_LONGITUDE_REF,
                "W",
                tiff,
            );
        }
    }

    Some(summary)
}

struct RawEntry {
    tag: u16,
    typ: u16,
    count: u32,
    inline: [u8; 4],
}

fn type_size(typ: u16) -> usize {
    match typ {
        TYPE_BYTE | TYPE_ASCII => 1,
        3 => 2,
        TYPE_LONG => 4,
        TYPE_RATIONAL => 8,
        _ => 1,
    }
}

fn parse_ifd(tiff: &[u8], offset: usize) -> Option<Vec<RawEntry>> {
    let count = read_u16(tiff, offset)? as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = offset + 2 + i * 12;
        let mut inline = [0u8; 4];
        inline.copy_from_slice(tiff.get(base + 8..base + 12)?);
        entries.push(RawEntry {
            tag: read_u16(tiff, base)?,
            typ: read_u16(tiff, base + 2)?,
            count: read_u32(tiff, base + 4)?,
            inline,
        });
    }
    Some(entries)
}

fn entry_value_bytes<'a>(entry: &'a RawEntry, tiff: &'a [u8]) -> Option<&'a [u8]> {
    let len = type_size(entry.typ) * entry.count as usize;
    if len <= 4 {
        Some(&entry.inline[..len])
    } else {
        let offset = u32::from_le_bytes(entry.inline) as usize;
        tiff.get(offset..offset + len)
    }
}

fn find_entry<'a>(entries: &'a [RawEntry], tag: u16) -> Option<&'a RawEntry> {
    entries.iter().find(|e| e.tag == tag)
}

fn entry_ascii(entries: &[RawEntry], tag: u16, tiff: &[u8]) -> Option<String> {
    let entry = find_entry(entries, tag)?;
    let raw = entry_value_bytes(entry, tiff)?;
    let text: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8(text).ok()
}

fn entry_u32(entries: &[RawEntry], tag: u16) -> Option<u32> {
    let entry = find_entry(entries, tag)?;
    Some(u32::from_le_bytes(entry.inline))
}

fn entry_rationals(entries: &[RawEntry], tag: u16, tiff: &[u8]) -> Option<Vec<(u32, u32)>> {
    let entry = find_entry(entries, tag)?;
    let raw = entry_value_bytes(entry, tiff)?;
    Some(
        raw.chunks_exact(8)
            .map(|chunk| {
                (
                    u32::from_le_bytes(chunk[0..4].try_into().unwrap()),
                    u32::from_le_bytes(chunk[4..8].try_into().unwrap()),
                )
            })
            .collect(),
    )
}

fn parse_gps_coordinate(
    entries: &[RawEntry],
    tag: u16,
    ref_tag: u16,
    negative_ref: &str,
    tiff: &[u8],
) -> Option<f64> {
    let dms = entry_rationals(entries, tag, tiff)?;
    if dms.len() != 3 {
        return None;
    }
    let component = |i: usize| -> f64 {
        let (num, den) = dms[i];
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    };
    let mut decimal = component(0) + component(1) / 60.0 + component(2) / 3600.0;
    if entry_ascii(entries, ref_tag, tiff).as_deref() == Some(negative_ref) {
        decimal = -decimal;
    }
    Some(decimal)
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

/// Structurally valid (not decodable) JPEG used by tests across modules.
#[cfg(test)]
pub(crate) fn minimal_jpeg_fixture() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    // APP0 / JFIF header
    bytes.extend([0xFF, 0xE0]);
    bytes.extend(16u16.to_be_bytes());
    bytes.extend(*b"JFIF\0");
    bytes.extend([0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    // Two COM segments so the file has enough segments for img-parts'
    // set_exif, which inserts the APP1 segment at a fixed index of 3
    for _ in 0..2 {
        bytes.extend([0xFF, 0xFE]);
        bytes.extend(4u16.to_be_bytes());
        bytes.extend(*b"ok");
    }
    // SOS with a one-byte scan header (img-parts drops the entropy data on
    // re-encode when the SOS contents are empty), a single entropy byte,
    // then EOI
    bytes.extend([0xFF, 0xDA]);
    bytes.extend(3u16.to_be_bytes());
    bytes.push(0x00);
    bytes.push(0x00);
    bytes.extend([0xFF, 0xD9]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_metadata() -> ImageMetadata {
        ImageMetadata {
            taken_at: Some(Utc.with_ymd_and_hms(2023, 11, 2, 19, 22, 10).unwrap()),
            place_name: Some("Brooklyn, New York".to_string()),
            artist: Some("Test User".to_string()),
            coordinates: Some((40.7128, -74.0060)),
        }
    }

    #[test]
    fn test_to_dms_conversion() {
        let (dms, reference) = to_dms(40.7128, false);
        assert_eq!(reference, "N");
        assert_eq!(dms[0], (40, 1));
        assert_eq!(dms[1], (42, 1));
        // 40.7128 = 40 deg 42 min 46.08 sec
        let seconds = dms[2].0 as f64 / dms[2].1 as f64;
        assert!((seconds - 46.08).abs() < 0.01);

        let (_, reference) = to_dms(-74.0060, true);
        assert_eq!(reference, "W");
    }

    #[test]
    fn test_payload_round_trip_through_tiff_parser() {
        let payload = build_exif_payload(&sample_metadata()).unwrap();
        let summary = parse_tiff(&payload).unwrap();

        assert_eq!(summary.date_time.as_deref(), Some("2023:11:02 19:22:10"));
        assert_eq!(
            summary.date_time_original.as_deref(),
            Some("2023:11:02 19:22:10")
        );
        assert_eq!(summary.description.as_deref(), Some("Brooklyn, New York"));
        assert_eq!(summary.artist.as_deref(), Some("Test User"));
        assert!((summary.latitude.unwrap() - 40.7128).abs() < 0.0001);
        assert!((summary.longitude.unwrap() - (-74.0060)).abs() < 0.0001);
    }

    #[test]
    fn test_non_ascii_place_name_round_trips() {
        let meta = ImageMetadata {
            place_name: Some("Montréal, Québec".to_string()),
            ..Default::default()
        };
        let payload = build_exif_payload(&meta).unwrap();
        let summary = parse_tiff(&payload).unwrap();
        assert_eq!(summary.description.as_deref(), Some("Montréal, Québec"));
    }

    #[test]
    fn test_empty_metadata_produces_no_payload() {
        assert!(build_exif_payload(&ImageMetadata::default()).is_none());
        let image = minimal_jpeg_fixture();
        let out = embed_metadata(image.clone(), &ImageMetadata::default()).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_embed_and_read_back_from_jpeg() {
        let tagged = embed_metadata(minimal_jpeg_fixture(), &sample_metadata()).unwrap();
        let summary = read_exif_summary(&tagged).unwrap();
        assert_eq!(
            summary.date_time_original.as_deref(),
            Some("2023:11:02 19:22:10")
        );
        assert_eq!(summary.description.as_deref(), Some("Brooklyn, New York"));
    }

    #[test]
    fn test_non_jpeg_bytes_are_rejected_but_lossy_keeps_original() {
        let garbage = vec![1u8, 2, 3, 4];
        assert!(matches!(
            embed_metadata(garbage.clone(), &sample_metadata()),
            Err(AuraError::Validation(_))
        ));
        assert_eq!(embed_metadata_lossy(garbage.clone(), &sample_metadata()), garbage);
    }
}
