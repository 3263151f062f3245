use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use serde::{Serialize, Deserialize};

use crate::data::example::Example;
use crate::data::record::RecordReader;
use crate::error::{Error, Result};
use crate::math::Tensor3;
use crate::network::ModelConfig;

/// Where the image and label live inside each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    pub image_key: String,
    pub label_key: String,
    pub verify_checksums: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        RecordConfig {
            image_key: "image".into(),
            label_key: "label".into(),
            verify_checksums: true,
        }
    }
}

/// One decoded, labelled image at the network's input size.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub image: RgbImage,
    pub label: usize,
}

impl ImageRecord {
    /// The image as `[0, 1]` floats.
    pub fn tensor(&self) -> Tensor3 {
        Tensor3::from_rgb_image(&self.image)
    }
}

/// Reads every record of a record file into memory.
pub fn load_dataset<P: AsRef<Path>>(
    path: P,
    records: &RecordConfig,
    model: &ModelConfig,
) -> Result<Vec<ImageRecord>> {
    let path = path.as_ref();
    let reader = RecordReader::new(BufReader::new(File::open(path)?))
        .verify_checksums(records.verify_checksums);

    let mut dataset = Vec::new();
    for payload in reader {
        let example = Example::decode_bytes(&payload?)?;
        dataset.push(parse_example(&example, records, model)?);
    }

    if dataset.is_empty() {
        return Err(Error::EmptyDataset(path.to_path_buf()));
    }

    let mut per_class = vec![0usize; model.num_classes];
    for record in &dataset {
        per_class[record.label] += 1;
    }
    tracing::info!(
        path = %path.display(),
        records = dataset.len(),
        per_class = ?per_class,
        "loaded dataset"
    );

    Ok(dataset)
}

/// Turns one example into an `ImageRecord`.
///
/// The image feature is either raw RGB8 bytes of exactly `h * w * 3` bytes,
/// or an encoded PNG/JPEG/BMP/GIF file, which is decoded and resized.
pub fn parse_example(
    example: &Example,
    records: &RecordConfig,
    model: &ModelConfig,
) -> Result<ImageRecord> {
    let width = model.input_width as u32;
    let height = model.input_height as u32;
    let bytes = example.bytes(&records.image_key)?;

    let raw_len = model.input_height * model.input_width * 3;
    let image = if bytes.len() == raw_len {
        RgbImage::from_raw(width, height, bytes.to_vec()).ok_or_else(|| Error::Feature {
            key: records.image_key.clone(),
            reason: "raw image buffer has the wrong size".into(),
        })?
    } else {
        let decoded = image::load_from_memory(bytes)?.to_rgb8();
        if decoded.dimensions() == (width, height) {
            decoded
        } else {
            image::imageops::resize(&decoded, width, height, FilterType::Triangle)
        }
    };

    let label = example.int64(&records.label_key)?;
    if label < 0 || label as usize >= model.num_classes {
        return Err(Error::InvalidLabel { label, num_classes: model.num_classes });
    }

    Ok(ImageRecord { image, label: label as usize })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::RecordWriter;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use prost::Message;
    use std::io::Cursor;

    fn config() -> ModelConfig {
        ModelConfig { input_height: 4, input_width: 6, ..ModelConfig::default() }
    }

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn raw_bytes_are_taken_as_hwc_rgb() {
        let raw: Vec<u8> = (0..4 * 6 * 3).map(|i| i as u8).collect();
        let example = Example::labelled_image("image", raw.clone(), "label", 1);
        let record = parse_example(&example, &RecordConfig::default(), &config()).unwrap();
        assert_eq!(record.label, 1);
        assert_eq!(record.image.as_raw(), &raw);
        assert_eq!(record.image.get_pixel(1, 0).0, [3, 4, 5]);
    }

    #[test]
    fn encoded_images_are_decoded_and_resized() {
        let example = Example::labelled_image("image", png(12, 8, [10, 200, 30]), "label", 2);
        let record = parse_example(&example, &RecordConfig::default(), &config()).unwrap();
        assert_eq!(record.image.dimensions(), (6, 4));
        assert_eq!(record.image.get_pixel(5, 3).0, [10, 200, 30]);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let raw = vec![0u8; 4 * 6 * 3];
        for label in [-1, 3] {
            let example = Example::labelled_image("image", raw.clone(), "label", label);
            let err = parse_example(&example, &RecordConfig::default(), &config()).unwrap_err();
            assert!(matches!(err, Error::InvalidLabel { num_classes: 3, .. }));
        }
    }

    #[test]
    fn custom_feature_keys() {
        let records = RecordConfig { image_key: "pixels".into(), label_key: "class".into(), ..RecordConfig::default() };
        let example = Example::labelled_image("pixels", vec![7u8; 72], "class", 0);
        assert!(parse_example(&example, &records, &config()).is_ok());
        assert!(parse_example(&example, &RecordConfig::default(), &config()).is_err());
    }

    #[test]
    fn loads_a_record_file_and_rejects_an_empty_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tfrecord");
        let mut writer = RecordWriter::new(File::create(&path).unwrap());
        for label in [0, 1, 2, 1] {
            let example = Example::labelled_image("image", vec![label as u8; 72], "label", label);
            writer.write_record(&example.encode_to_vec()).unwrap();
        }
        writer.flush().unwrap();

        let dataset = load_dataset(&path, &RecordConfig::default(), &config()).unwrap();
        let labels: Vec<usize> = dataset.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![0, 1, 2, 1]);

        let empty = dir.path().join("empty.tfrecord");
        File::create(&empty).unwrap();
        assert!(matches!(
            load_dataset(&empty, &RecordConfig::default(), &config()),
            Err(Error::EmptyDataset(_))
        ));
    }
}
