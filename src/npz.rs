//! NPZ / NPY reader and writer for the synthesizer's intermediate arrays.
//!
//! Handles the subset of the NumPy array format the spectrogram hand-off
//! needs, which is exactly what [`encode_npy`] writes:
//!   - NPY format version 1.0
//!   - little-endian `float32` dtype (`<f4`)
//!   - C-contiguous (row-major) layout
//!
//! NPZ files are ZIP archives whose members are `.npy` files; the member
//! name without `.npy` is the array name.

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Write},
    path::Path,
};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::spectrogram::{Matrix, Spectrograms};

/// Member names used by [`save_spectrograms`].
pub const MEL_OUTPUTS: &str = "mel_outputs";
pub const MEL_OUTPUTS_POSTNET: &str = "mel_outputs_postnet";
pub const ALIGNMENTS: &str = "alignments";

// ─────────────────────────────────────────────────────────────────────────────
// NPY
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a raw `.npy` buffer into its shape and flat f32 data.
pub fn parse_npy(data: &[u8]) -> Result<(Vec<usize>, Vec<f32>)> {
    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        bail!("Not a valid NPY file (bad magic)");
    }

    let (major, minor) = (data[6], data[7]);
    if major != 1 {
        bail!("Unsupported NPY version {}.{}", major, minor);
    }
    let header_start = 10;
    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;

    let header_end = header_start + header_len;
    if data.len() < header_end {
        bail!("NPY file truncated in header");
    }
    let header = std::str::from_utf8(&data[header_start..header_end])
        .context("NPY header is not valid UTF-8")?;

    let dtype = extract_header_field(header, "descr").context("NPY header missing 'descr'")?;
    let dtype = dtype.trim().trim_matches('\'').trim_matches('"');
    if dtype != "<f4" {
        bail!("Unsupported dtype '{}': only little-endian float32 is supported", dtype);
    }

    let fortran = extract_header_field(header, "fortran_order").unwrap_or("False").trim();
    if fortran.eq_ignore_ascii_case("true") {
        bail!("Fortran-order arrays are not supported");
    }

    let shape_str = extract_header_field(header, "shape").context("NPY header missing 'shape'")?;
    let shape = parse_shape(shape_str.trim())?;
    let n_elements: usize = shape.iter().product();

    let data_bytes = &data[header_end..];
    if data_bytes.len() < n_elements * 4 {
        bail!(
            "NPY data section too short: expected {} bytes, got {}",
            n_elements * 4,
            data_bytes.len()
        );
    }

    let values = data_bytes[..n_elements * 4]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((shape, values))
}

/// Encode a C-order float32 array as NPY v1.0.
pub fn encode_npy(shape: &[usize], values: &[f32]) -> Vec<u8> {
    let dims = match shape {
        [d] => format!("{},", d),
        _ => shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
    };
    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({}), }}", dims);
    // magic + version + length + header + '\n' is padded to a multiple of 64
    let unpadded = 10 + header.len() + 1;
    header.extend(std::iter::repeat(' ').take(unpadded.next_multiple_of(64) - unpadded));
    header.push('\n');

    let mut buf = Vec::with_capacity(10 + header.len() + values.len() * 4);
    buf.extend_from_slice(b"\x93NUMPY");
    buf.extend_from_slice(&[1, 0]);
    buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
    buf.extend_from_slice(header.as_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Value of `field` in a Python-literal dict header, e.g. `'<f4'` → `<f4`.
fn extract_header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    let key_sq = format!("'{}':", field);
    let key_dq = format!("\"{}\":", field);

    let start = header
        .find(key_sq.as_str())
        .map(|p| p + key_sq.len())
        .or_else(|| header.find(key_dq.as_str()).map(|p| p + key_dq.len()))?;
    let rest = header[start..].trim_start();

    if rest.starts_with('(') {
        let end = rest.find(')')?;
        Some(&rest[..end + 1])
    } else if rest.starts_with('\'') || rest.starts_with('"') {
        let quote = rest.chars().next()?;
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        Some(&inner[..end])
    } else {
        let end = rest.find([',', '}']).unwrap_or(rest.len());
        Some(rest[..end].trim())
    }
}

/// Parse a Python shape tuple: `(80, 312)`, `(100,)` or `()`.
fn parse_shape(s: &str) -> Result<Vec<usize>> {
    let inner = s.trim_start_matches('(').trim_end_matches(')');
    inner
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().with_context(|| format!("Bad shape dim: '{}'", t)))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// NPZ
// ─────────────────────────────────────────────────────────────────────────────

/// One array: shape + flat f32 data in row-major (C) order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NpyArray {
    /// Interpret a 2-D array as a [`Matrix`].
    pub fn into_matrix(self) -> Result<Matrix> {
        match self.shape[..] {
            [rows, cols] => Matrix::from_vec(self.data, rows, cols).context("NPY data does not match its shape"),
            _ => bail!("expected a 2-D array, got shape {:?}", self.shape),
        }
    }
}

/// Load every array of an NPZ file, keyed by name.
pub fn load_npz(path: &Path) -> Result<HashMap<String, NpyArray>> {
    let file = File::open(path).with_context(|| format!("Cannot open NPZ file: {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Cannot open ZIP archive: {}", path.display()))?;

    let mut arrays = HashMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
        let name = entry.name().trim_end_matches(".npy").to_string();

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).context("Failed to read NPY entry")?;
        let (shape, data) =
            parse_npy(&buf).with_context(|| format!("Failed to parse NPY entry '{}'", name))?;

        arrays.insert(name, NpyArray { shape, data });
    }
    Ok(arrays)
}

/// Write named 2-D matrices as a deflate-compressed NPZ.
pub fn save_npz(path: &Path, arrays: &[(&str, &Matrix)]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create NPZ file: {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, matrix) in arrays {
        let (rows, cols) = matrix.shape();
        zip.start_file(format!("{}.npy", name), options)
            .with_context(|| format!("Cannot add '{}' to {}", name, path.display()))?;
        zip.write_all(&encode_npy(&[rows, cols], matrix.as_slice()))
            .with_context(|| format!("Cannot write '{}'", name))?;
    }
    zip.finish().context("Cannot finalise NPZ archive")?;
    Ok(())
}

/// Export raw mel, post-net mel and alignment for a plotting collaborator.
pub fn save_spectrograms(path: &Path, spectrograms: &Spectrograms) -> Result<()> {
    save_npz(
        path,
        &[
            (MEL_OUTPUTS, &spectrograms.mel),
            (MEL_OUTPUTS_POSTNET, &spectrograms.mel_postnet),
            (ALIGNMENTS, &spectrograms.alignment),
        ],
    )?;
    tracing::info!(path = %path.display(), frames = spectrograms.frames(), "saved spectrograms");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npy_header_is_aligned() {
        let shapes: [&[usize]; 3] = [&[3], &[80, 312], &[]];
        for shape in shapes {
            let n: usize = shape.iter().product();
            let buf = encode_npy(shape, &vec![0.0; n]);
            let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
            assert_eq!((10 + header_len) % 64, 0, "shape {:?}", shape);
            assert_eq!(buf[10 + header_len - 1], b'\n');
        }
    }

    #[test]
    fn test_parse_npy_1d() {
        let values = vec![1.0f32, 2.0, 3.0];
        let (shape, data) = parse_npy(&encode_npy(&[3], &values)).unwrap();
        assert_eq!(shape, vec![3]);
        assert_eq!(data, values);
    }

    #[test]
    fn test_parse_npy_2d() {
        let values = vec![1.5f32, -2.0, 0.25, 8.0, 0.0, -1.0];
        let (shape, data) = parse_npy(&encode_npy(&[2, 3], &values)).unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(data, values);
    }

    #[test]
    fn test_rejects_formats_never_written() {
        // big-endian float32
        let header = "{'descr': '>f4', 'fortran_order': False, 'shape': (1,), }\n";
        let mut buf = b"\x93NUMPY\x01\x00".to_vec();
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&1.5f32.to_be_bytes());
        assert!(parse_npy(&buf).is_err());

        // format version 2.0
        let mut v2 = encode_npy(&[1], &[1.5]);
        v2[6] = 2;
        assert!(parse_npy(&v2).is_err());
    }

    #[test]
    fn test_rejects_other_dtypes() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1,), }\n";
        let mut buf = b"\x93NUMPY\x01\x00".to_vec();
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&[0; 8]);
        assert!(parse_npy(&buf).is_err());
    }

    #[test]
    fn test_bad_magic() {
        assert!(parse_npy(b"NOTANPY").is_err());
    }

    #[test]
    fn test_save_spectrograms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediates.npz");
        let mel = Matrix::from_vec((0..6).map(|x| x as f32).collect(), 2, 3).unwrap();
        let spectrograms = Spectrograms {
            mel: mel.clone(),
            mel_postnet: Matrix::zeros(2, 3),
            alignment: Matrix::from_vec(vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0], 2, 3).unwrap(),
            truncated: false,
        };
        save_spectrograms(&path, &spectrograms).unwrap();

        let mut arrays = load_npz(&path).unwrap();
        assert_eq!(arrays.len(), 3);
        assert_eq!(arrays[ALIGNMENTS].shape, vec![2, 3]);
        let loaded = arrays.remove(MEL_OUTPUTS).unwrap().into_matrix().unwrap();
        assert_eq!(loaded, mel);
        assert_eq!(loaded.row(1), &[3.0, 4.0, 5.0]);
    }
}
