//! Baseline TIFF decoder for the uncompressed RGB/RGBA strip output of the
//! screenshot tools.
//!
//! Supports little- and big-endian files, inline SHORT/LONG tag values, and
//! external value arrays. Compressed files are rejected.

use crate::error::TiffError;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_COMPRESSION: u16 = 259;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;

const TYPE_SHORT: u16 = 3;

/// Decoded raw pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u8,
    /// Strip payloads concatenated in order
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn read_u16(&self, data: &[u8], offset: usize) -> Result<u16, TiffError> {
        let bytes: [u8; 2] = data
            .get(offset..offset + 2)
            .ok_or(TiffError::OutOfBounds)?
            .try_into()
            .unwrap();
        Ok(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(&self, data: &[u8], offset: usize) -> Result<u32, TiffError> {
        let bytes: [u8; 4] = data
            .get(offset..offset + 4)
            .ok_or(TiffError::OutOfBounds)?
            .try_into()
            .unwrap();
        Ok(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

/// One 12-byte IFD entry
#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Offset of the 4-byte value slot within the file
    value_slot: usize,
}

impl IfdEntry {
    /// Read a single scalar value.
    ///
    /// A lone SHORT occupies the low two bytes of the value slot; everything
    /// else is taken as an immediate LONG.
    fn scalar(&self, data: &[u8], order: ByteOrder) -> Result<u32, TiffError> {
        if self.count == 1 && self.field_type == TYPE_SHORT {
            Ok(order.read_u16(data, self.value_slot)? as u32)
        } else {
            order.read_u32(data, self.value_slot)
        }
    }

    /// Read the entry as a list of values.
    ///
    /// With `count > 1` the value slot holds an offset to an external array;
    /// SHORT items are 2 bytes, anything else is read as LONG.
    fn values(&self, data: &[u8], order: ByteOrder) -> Result<Vec<u32>, TiffError> {
        if self.count <= 1 {
            return Ok(vec![self.scalar(data, order)?]);
        }

        let base = order.read_u32(data, self.value_slot)? as usize;
        let item_size = if self.field_type == TYPE_SHORT { 2 } else { 4 };
        let mut out = Vec::with_capacity(self.count as usize);
        for i in 0..self.count as usize {
            let offset = base
                .checked_add(i.checked_mul(item_size).ok_or(TiffError::OutOfBounds)?)
                .ok_or(TiffError::OutOfBounds)?;
            let value = if item_size == 2 {
                order.read_u16(data, offset)? as u32
            } else {
                order.read_u32(data, offset)?
            };
            out.push(value);
        }
        Ok(out)
    }
}

/// Decode a baseline strip-based TIFF buffer into raw pixels.
pub fn decode(data: &[u8]) -> Result<RawImage, TiffError> {
    let order = match data.get(0..2) {
        Some([0x49, 0x49]) => ByteOrder::Little,
        Some([0x4D, 0x4D]) => ByteOrder::Big,
        _ => return Err(TiffError::InvalidHeader),
    };
    if order.read_u16(data, 2).map_err(|_| TiffError::InvalidHeader)? != 42 {
        return Err(TiffError::InvalidHeader);
    }

    let ifd_offset = order.read_u32(data, 4)? as usize;
    let entry_count = order.read_u16(data, ifd_offset)? as usize;

    let mut width = None;
    let mut height = None;
    let mut samples_per_pixel = 3u32;
    let mut compression = 1u32;
    let mut strip_offsets = None;
    let mut strip_byte_counts: Vec<u32> = Vec::new();

    for i in 0..entry_count {
        let entry_offset = ifd_offset
            .checked_add(2 + i * 12)
            .ok_or(TiffError::OutOfBounds)?;
        let entry = IfdEntry {
            tag: order.read_u16(data, entry_offset)?,
            field_type: order.read_u16(data, entry_offset + 2)?,
            count: order.read_u32(data, entry_offset + 4)?,
            value_slot: entry_offset + 8,
        };

        match entry.tag {
            TAG_IMAGE_WIDTH => width = Some(entry.scalar(data, order)?),
            TAG_IMAGE_LENGTH => height = Some(entry.scalar(data, order)?),
            TAG_COMPRESSION => compression = entry.scalar(data, order)?,
            TAG_SAMPLES_PER_PIXEL => samples_per_pixel = entry.scalar(data, order)?,
            TAG_STRIP_OFFSETS => strip_offsets = Some(entry.values(data, order)?),
            TAG_STRIP_BYTE_COUNTS => strip_byte_counts = entry.values(data, order)?,
            _ => {}
        }
    }

    if compression != 1 {
        return Err(TiffError::UnsupportedFormat {
            details: format!("compressed TIFF (compression={})", compression),
        });
    }

    let width = width.ok_or(TiffError::MissingTag {
        tag: TAG_IMAGE_WIDTH,
    })?;
    let height = height.ok_or(TiffError::MissingTag {
        tag: TAG_IMAGE_LENGTH,
    })?;
    let strip_offsets = strip_offsets.ok_or(TiffError::MissingTag {
        tag: TAG_STRIP_OFFSETS,
    })?;
    if strip_byte_counts.is_empty() {
        return Err(TiffError::MissingTag {
            tag: TAG_STRIP_BYTE_COUNTS,
        });
    }

    let mut pixels = Vec::new();
    for (i, &offset) in strip_offsets.iter().enumerate() {
        let start = offset as usize;
        let end = match strip_byte_counts.get(i) {
            Some(&count) => start
                .checked_add(count as usize)
                .ok_or(TiffError::OutOfBounds)?,
            // A trailing strip without a byte count runs to end-of-buffer
            None if i + 1 == strip_offsets.len() => data.len(),
            None => return Err(TiffError::OutOfBounds),
        };
        let strip = data.get(start..end).ok_or(TiffError::OutOfBounds)?;
        pixels.extend_from_slice(strip);
    }

    Ok(RawImage {
        width,
        height,
        samples_per_pixel: samples_per_pixel as u8,
        pixels,
    })
}
