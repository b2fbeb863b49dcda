use crate::{
    error::{Error, Result},
    pattern::{Pattern, one_hot},
};
use flate2::read::GzDecoder;
use ndarray::Array1;
use std::{fs::File, io::Read, path::Path};
use tracing::{info, warn};

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;
pub const DIGIT_CLASSES: usize = 10;

pub const TRAINING_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TRAINING_LABELS: &str = "train-labels-idx1-ubyte.gz";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

pub struct MnistData {
    pub training_data: Vec<Pattern>,
    pub test_data: Vec<Pattern>,
}

impl MnistData {
    /// Loads the four gzipped MNIST files from `dir`.
    ///
    /// A split that decodes to nothing (missing header, wrong magic number) is reported as
    /// [`Error::EmptyDataset`], so nothing downstream ever sees an empty training or test set.
    pub fn load(dir: impl AsRef<Path>) -> Result<MnistData> {
        let dir = dir.as_ref();

        let training_data = patterns_from_idx(
            &read_gz(&dir.join(TRAINING_IMAGES))?,
            &read_gz(&dir.join(TRAINING_LABELS))?,
            DIGIT_CLASSES,
        )?;
        let test_data = patterns_from_idx(
            &read_gz(&dir.join(TEST_IMAGES))?,
            &read_gz(&dir.join(TEST_LABELS))?,
            DIGIT_CLASSES,
        )?;
        info!(
            training = training_data.len(),
            test = test_data.len(),
            "loaded MNIST"
        );

        Ok(MnistData {
            training_data,
            test_data,
        })
    }
}

// Read a whole gzip file into memory, decompressed.
fn read_gz(path: &Path) -> Result<Vec<u8>> {
    info!(path = %path.display(), "reading");
    let mut unzipped_file = GzDecoder::new(File::open(path)?);
    let mut bytes = Vec::new();
    unzipped_file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Pairs decoded images with decoded labels.
pub fn patterns_from_idx(
    image_bytes: &[u8],
    label_bytes: &[u8],
    classes: usize,
) -> Result<Vec<Pattern>> {
    let images = decode_images(image_bytes);
    let labels = decode_labels(label_bytes, classes);

    if images.is_empty() {
        return Err(Error::EmptyDataset("no images decoded".into()));
    }
    if labels.is_empty() {
        return Err(Error::EmptyDataset("no labels decoded".into()));
    }
    // There should be an equal number of images and labels. If not, the files don't belong
    // together.
    if images.len() != labels.len() {
        return Err(Error::DatasetMismatch {
            images: images.len(),
            labels: labels.len(),
        });
    }

    Ok(images
        .into_iter()
        .zip(labels)
        .map(|(input, target)| Pattern::new(input, target))
        .collect())
}

// Reads `count` big-endian u32 header words from the front of `bytes`, or None if there aren't
// enough bytes.
fn read_header(bytes: &[u8], count: usize) -> Option<Vec<u32>> {
    let header = bytes.get(..count * 4)?;
    Some(
        header
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Decodes an IDX image file into one `[rows * columns]` vector per image, each pixel scaled
/// from `0..=255` into `[0, 1]`.
///
/// The header is four big-endian u32s: the magic number (2051), the number of images, the number
/// of rows and the number of columns. Anything that doesn't start with that header decodes to an
/// empty Vec. If the pixel data is cut short, only the complete images are returned.
pub fn decode_images(bytes: &[u8]) -> Vec<Array1<f64>> {
    let Some(header) = read_header(bytes, 4) else {
        warn!(len = bytes.len(), "image data too short for header");
        return Vec::new();
    };
    if header[0] != IMAGE_MAGIC {
        warn!(magic = header[0], "not an IDX image file");
        return Vec::new();
    }
    let images = header[1] as usize;
    let Some(pixels) = (header[2] as usize).checked_mul(header[3] as usize) else {
        warn!(rows = header[2], columns = header[3], "image header sizes overflow");
        return Vec::new();
    };
    if pixels == 0 {
        warn!("images have no pixels");
        return Vec::new();
    }

    let Some(expected) = images.checked_mul(pixels) else {
        warn!(images, pixels, "image header sizes overflow");
        return Vec::new();
    };

    let data = &bytes[16..];
    if data.len() < expected {
        warn!(expected, found = data.len(), "image data truncated");
    }

    data.chunks_exact(pixels)
        .take(images)
        .map(|image| {
            image
                .iter()
                .map(|&value| value as f64 / 255.0)
                .collect::<Array1<f64>>()
        })
        .collect()
}

/// Decodes an IDX label file into one-hot vectors of length `classes`.
///
/// The header is two big-endian u32s: the magic number (2049) and the number of labels. A wrong
/// magic number, or any label outside `0..classes`, decodes to an empty Vec.
pub fn decode_labels(bytes: &[u8], classes: usize) -> Vec<Array1<f64>> {
    let Some(header) = read_header(bytes, 2) else {
        warn!(len = bytes.len(), "label data too short for header");
        return Vec::new();
    };
    if header[0] != LABEL_MAGIC {
        warn!(magic = header[0], "not an IDX label file");
        return Vec::new();
    }
    let expected = header[1] as usize;
    let labels = &bytes[8..];
    if labels.len() < expected {
        warn!(expected, found = labels.len(), "label data truncated");
    }
    let labels = &labels[..labels.len().min(expected)];

    if let Some(&label) = labels.iter().find(|&&label| label as usize >= classes) {
        warn!(label, classes, "label out of range");
        return Vec::new();
    }

    labels
        .iter()
        .map(|&label| one_hot(label as usize, classes))
        .collect()
}
