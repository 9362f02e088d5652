//! Embedded GPS metadata.
//!
//! Missing GPS tags, out-of-range coordinates and unreadable metadata all
//! yield `None`. A photo without a usable location is a normal outcome.

use std::io::Cursor;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{Exif, Field, In, Tag, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vendmap_core::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geotag {
    pub coordinate: Coordinate,
    /// Meters above sea level; negative below.
    pub altitude: Option<f64>,
    /// Horizontal positioning error in meters.
    pub accuracy: Option<f64>,
    /// `DateTimeOriginal`, in the camera's local time.
    pub timestamp: Option<NaiveDateTime>,
}

/// Read the geotag from an image container (JPEG, PNG, WebP, TIFF, HEIF).
#[must_use]
pub fn extract_geotag(bytes: &[u8]) -> Option<Geotag> {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(err) => {
            debug!(error = %err, "no readable EXIF metadata");
            return None;
        }
    };

    let latitude = signed_dms(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = signed_dms(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    let coordinate = Coordinate::new(latitude, longitude);
    if !coordinate.is_valid() {
        debug!(latitude, longitude, "geotag outside coordinate range");
        return None;
    }

    let altitude = field(&exif, Tag::GPSAltitude).and_then(first_rational).map(|alt| {
        let below_sea_level = field(&exif, Tag::GPSAltitudeRef)
            .and_then(|f| f.value.get_uint(0))
            .is_some_and(|r| r == 1);
        if below_sea_level {
            -alt
        } else {
            alt
        }
    });

    Some(Geotag {
        coordinate,
        altitude,
        accuracy: field(&exif, Tag::GPSHPositioningError).and_then(first_rational),
        timestamp: field(&exif, Tag::DateTimeOriginal).and_then(parse_datetime),
    })
}

fn field(exif: &Exif, tag: Tag) -> Option<&Field> {
    exif.get_field(tag, In::PRIMARY)
}

fn first_rational(field: &Field) -> Option<f64> {
    match &field.value {
        Value::Rational(values) => values.first().map(exif::Rational::to_f64),
        _ => None,
    }
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn signed_dms(exif: &Exif, tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let Value::Rational(parts) = &field(exif, tag)?.value else {
        debug!(%tag, "GPS component is not rational");
        return None;
    };
    if parts.len() != 3 || parts.iter().any(|p| p.denom == 0) {
        debug!(%tag, "malformed GPS component");
        return None;
    }
    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;

    let negative = match field(exif, ref_tag).map(|f| &f.value) {
        Some(Value::Ascii(values)) => values
            .first()
            .and_then(|v| v.first())
            .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref)),
        _ => false,
    };
    Some(if negative { -degrees } else { degrees })
}

fn parse_datetime(field: &Field) -> Option<NaiveDateTime> {
    let Value::Ascii(values) = &field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(values.first()?).ok()?;
    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(
            u32::from(dt.hour),
            u32::from(dt.minute),
            u32::from(dt.second),
        )
}

#[cfg(test)]
pub(crate) mod tests {
    use exif::experimental::Writer;
    use exif::Rational;

    use super::*;

    fn rational(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    fn gps_field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    /// TIFF bytes carrying the given fields.
    pub(crate) fn tiff_with(fields: &[Field]) -> Vec<u8> {
        let make = gps_field(Tag::Make, ascii("vendmap"));
        let mut writer = Writer::new();
        writer.push_field(&make);
        for field in fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        buf.into_inner()
    }

    /// 35°41'22.2"N 139°41'30.12"E, the Shinjuku test location.
    pub(crate) fn shinjuku_fields() -> Vec<Field> {
        vec![
            gps_field(
                Tag::GPSLatitude,
                Value::Rational(vec![rational(35, 1), rational(41, 1), rational(222, 10)]),
            ),
            gps_field(Tag::GPSLatitudeRef, ascii("N")),
            gps_field(
                Tag::GPSLongitude,
                Value::Rational(vec![rational(139, 1), rational(41, 1), rational(3012, 100)]),
            ),
            gps_field(Tag::GPSLongitudeRef, ascii("E")),
        ]
    }

    #[test]
    fn reads_coordinate_altitude_accuracy_and_time() {
        let mut fields = shinjuku_fields();
        fields.push(gps_field(Tag::GPSAltitude, Value::Rational(vec![rational(405, 10)])));
        fields.push(gps_field(Tag::GPSAltitudeRef, Value::Byte(vec![0])));
        fields.push(gps_field(
            Tag::GPSHPositioningError,
            Value::Rational(vec![rational(5, 1)]),
        ));
        fields.push(gps_field(Tag::DateTimeOriginal, ascii("2026:04:01 09:15:30")));

        let geotag = extract_geotag(&tiff_with(&fields)).unwrap();
        assert!((geotag.coordinate.latitude - 35.6895).abs() < 1e-4);
        assert!((geotag.coordinate.longitude - 139.6917).abs() < 1e-4);
        assert_eq!(geotag.altitude, Some(40.5));
        assert_eq!(geotag.accuracy, Some(5.0));
        assert_eq!(
            geotag.timestamp,
            NaiveDate::from_ymd_opt(2026, 4, 1).and_then(|d| d.and_hms_opt(9, 15, 30))
        );
    }

    #[test]
    fn southern_and_western_refs_are_negative() {
        let mut fields = shinjuku_fields();
        fields[1] = gps_field(Tag::GPSLatitudeRef, ascii("S"));
        fields[3] = gps_field(Tag::GPSLongitudeRef, ascii("W"));
        fields.push(gps_field(Tag::GPSAltitude, Value::Rational(vec![rational(12, 1)])));
        fields.push(gps_field(Tag::GPSAltitudeRef, Value::Byte(vec![1])));

        let geotag = extract_geotag(&tiff_with(&fields)).unwrap();
        assert!(geotag.coordinate.latitude < 0.0);
        assert!(geotag.coordinate.longitude < 0.0);
        assert_eq!(geotag.altitude, Some(-12.0));
        assert!(geotag.accuracy.is_none());
        assert!(geotag.timestamp.is_none());
    }

    #[test]
    fn out_of_range_latitude_yields_nothing() {
        let mut fields = shinjuku_fields();
        fields[0] = gps_field(
            Tag::GPSLatitude,
            Value::Rational(vec![rational(95, 1), rational(0, 1), rational(0, 1)]),
        );
        assert!(extract_geotag(&tiff_with(&fields)).is_none());
    }

    #[test]
    fn missing_gps_yields_nothing() {
        assert!(extract_geotag(&tiff_with(&[])).is_none());
    }

    #[test]
    fn unparsable_bytes_yield_nothing() {
        assert!(extract_geotag(b"definitely not an image").is_none());
        assert!(extract_geotag(&[]).is_none());
    }
}
