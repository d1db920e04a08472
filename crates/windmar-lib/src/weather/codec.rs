//! Compressed array encoding for grid slices.
//!
//! Every array (latitude axis, longitude axis, 2-D data) is stored as an
//! independent blob:
//!
//! ```text
//! Header (16 bytes):
//!   - Magic: b"WMGS" (4 bytes)
//!   - Version: u8 (1 byte)
//!   - Rank: u8 (1 byte) - 1 for axes, 2 for data
//!   - Reserved: 2 bytes
//!   - Rows: u32 LE (4 bytes)
//!   - Cols: u32 LE (4 bytes)
//!
//! Body:
//!   - postcard-serialized Vec<f32>
//!   - zstd compressed
//!
//! Footer (32 bytes):
//!   - SHA-256 checksum of compressed body
//! ```
//!
//! 32-bit floats survive the round trip bit-for-bit.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::types::{GridSlice, RawGrid};

const SLICE_MAGIC: &[u8; 4] = b"WMGS";
const SLICE_VERSION: u8 = 1;
const HEADER_SIZE: usize = 16;
const CHECKSUM_SIZE: usize = 32;
const COMPRESSION_LEVEL: i32 = 3;

/// The three compressed arrays that make up one stored slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedSlice {
    pub rows: usize,
    pub cols: usize,
    pub lats: Vec<u8>,
    pub lons: Vec<u8>,
    pub data: Vec<u8>,
}

impl CompressedSlice {
    /// Compress a raw grid after checking its shape.
    pub fn compress(grid: &RawGrid) -> Result<Self> {
        grid.validate_shape()?;
        let rows = grid.rows();
        let cols = grid.cols();
        Ok(Self {
            rows,
            cols,
            lats: encode_array(&grid.lats, 1, rows, 1)?,
            lons: encode_array(&grid.lons, 1, cols, 1)?,
            data: encode_array(&grid.data, 2, rows, cols)?,
        })
    }

    /// Decompress into a [`GridSlice`], failing with `CorruptData` if any
    /// array does not reproduce the recorded shape.
    pub fn decompress(
        &self,
        run_id: i64,
        forecast_hour: u32,
        parameter: &str,
    ) -> Result<GridSlice> {
        let lats = decode_array(&self.lats, 1, self.rows, 1)?;
        let lons = decode_array(&self.lons, 1, self.cols, 1)?;
        let data = decode_array(&self.data, 2, self.rows, self.cols)?;
        Ok(GridSlice {
            run_id,
            forecast_hour,
            parameter: parameter.to_string(),
            rows: self.rows,
            cols: self.cols,
            lats,
            lons,
            data,
        })
    }

    /// Total stored bytes across the three blobs.
    pub fn stored_len(&self) -> usize {
        self.lats.len() + self.lons.len() + self.data.len()
    }
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptData {
        message: message.into(),
    }
}

/// Encode a flat array with its logical shape.
pub fn encode_array(values: &[f32], rank: u8, rows: usize, cols: usize) -> Result<Vec<u8>> {
    if values.len() != rows * cols {
        return Err(Error::InvalidShape {
            message: format!("{} values for shape {rows}x{cols}", values.len()),
        });
    }
    let rows_u32 = u32::try_from(rows).map_err(|_| Error::InvalidShape {
        message: format!("{rows} rows exceeds u32"),
    })?;
    let cols_u32 = u32::try_from(cols).map_err(|_| Error::InvalidShape {
        message: format!("{cols} cols exceeds u32"),
    })?;

    let serialized = postcard::to_allocvec(values)
        .map_err(|e| corrupt(format!("postcard serialization failed: {e}")))?;
    let compressed = zstd::encode_all(serialized.as_slice(), COMPRESSION_LEVEL)?;
    let checksum = Sha256::digest(&compressed);

    let mut out = Vec::with_capacity(HEADER_SIZE + compressed.len() + CHECKSUM_SIZE);
    out.extend_from_slice(SLICE_MAGIC);
    out.push(SLICE_VERSION);
    out.push(rank);
    out.extend_from_slice(&[0u8; 2]);
    out.extend_from_slice(&rows_u32.to_le_bytes());
    out.extend_from_slice(&cols_u32.to_le_bytes());
    out.extend_from_slice(&compressed);
    out.extend_from_slice(&checksum);
    Ok(out)
}

/// Decode an array, verifying header, checksum and the expected shape.
pub fn decode_array(bytes: &[u8], rank: u8, rows: usize, cols: usize) -> Result<Vec<f32>> {
    if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(corrupt(format!("blob too short ({} bytes)", bytes.len())));
    }
    let (header, rest) = bytes.split_at(HEADER_SIZE);
    let (compressed, stored_checksum) = rest.split_at(rest.len() - CHECKSUM_SIZE);

    if &header[0..4] != SLICE_MAGIC {
        return Err(corrupt("invalid magic bytes"));
    }
    if header[4] != SLICE_VERSION {
        return Err(corrupt(format!(
            "unsupported version {} (expected {})",
            header[4], SLICE_VERSION
        )));
    }
    if header[5] != rank {
        return Err(corrupt(format!("rank {} (expected {rank})", header[5])));
    }

    let mut word = [0u8; 4];
    word.copy_from_slice(&header[8..12]);
    let header_rows = u32::from_le_bytes(word) as usize;
    word.copy_from_slice(&header[12..16]);
    let header_cols = u32::from_le_bytes(word) as usize;
    if header_rows != rows || header_cols != cols {
        return Err(corrupt(format!(
            "shape {header_rows}x{header_cols} does not match recorded {rows}x{cols}"
        )));
    }

    let computed = Sha256::digest(compressed);
    if computed.as_slice() != stored_checksum {
        return Err(corrupt("checksum mismatch"));
    }

    let decompressed = zstd::decode_all(compressed)
        .map_err(|e| corrupt(format!("zstd decompression failed: {e}")))?;
    let values: Vec<f32> = postcard::from_bytes(&decompressed)
        .map_err(|e| corrupt(format!("postcard deserialization failed: {e}")))?;

    if values.len() != rows * cols {
        return Err(corrupt(format!(
            "decoded {} values for shape {rows}x{cols}",
            values.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RawGrid {
        RawGrid {
            lats: vec![40.0, 40.5, 41.0],
            lons: vec![-10.0, -9.5],
            data: vec![1.5, -2.25, f32::NAN, 0.0, -0.0, 7.125],
        }
    }

    #[test]
    fn slice_round_trip_is_bit_exact() {
        let raw = grid();
        let compressed = CompressedSlice::compress(&raw).unwrap();
        let slice = compressed.decompress(7, 3, "wind_u").unwrap();
        assert_eq!((slice.rows, slice.cols), (3, 2));
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&slice.data), bits(&raw.data));
        assert_eq!(slice.lats, raw.lats);
        assert_eq!(slice.lons, raw.lons);
    }

    #[test]
    fn mismatched_shape_is_invalid() {
        let mut raw = grid();
        raw.data.pop();
        assert!(matches!(
            CompressedSlice::compress(&raw),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn shape_disagreement_on_decode_is_corrupt() {
        let mut compressed = CompressedSlice::compress(&grid()).unwrap();
        compressed.rows = 2;
        assert!(matches!(
            compressed.decompress(1, 0, "wind_u"),
            Err(Error::CorruptData { .. })
        ));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut compressed = CompressedSlice::compress(&grid()).unwrap();
        let mid = HEADER_SIZE + 1;
        compressed.data[mid] ^= 0xFF;
        let err = compressed.decompress(1, 0, "wind_u").unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn truncated_blob_is_corrupt() {
        assert!(matches!(
            decode_array(&[0u8; 10], 1, 1, 1),
            Err(Error::CorruptData { .. })
        ));
    }
}
