use crate::error::UploadError;

const MEGABYTE: u64 = 1024 * 1024; // 1MB
pub const MIN_PART_SIZE_BYTES: u64 = 5 * MEGABYTE;
pub const MAX_PART_SIZE_BYTES: u64 = 5 * 1024 * MEGABYTE;
pub const MAX_PARTS_COUNT: u64 = 10000;

/// Half-open byte range `[start, end)` of the source, uploaded as one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    part_number: u32,
    start: u64,
    end: u64,
}

impl PartRange {
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits `[0, object_size)` into consecutive ranges of `part_size` bytes,
/// numbered from 1. The last range holds the remainder.
pub fn plan(object_size: u64, part_size: u64) -> Result<Vec<PartRange>, UploadError> {
    if part_size == 0 {
        return Err(UploadError::InvalidArgument(
            "part size must be positive".to_string(),
        ));
    }

    let total_parts = object_size.div_ceil(part_size);
    if total_parts > u64::from(u32::MAX) {
        return Err(UploadError::InvalidArgument(format!(
            "{} parts of {} bytes do not fit a part number",
            total_parts, part_size
        )));
    }

    let ranges = (0..total_parts)
        .map(|index| {
            let start = index * part_size;
            PartRange {
                part_number: index as u32 + 1,
                start,
                end: start + part_size.min(object_size - start),
            }
        })
        .collect();
    Ok(ranges)
}

/// Rejects uploads that would exceed the store's part count limit.
pub fn check_limits(object_size: u64, part_size: u64) -> Result<(), UploadError> {
    if part_size == 0 {
        return Err(UploadError::InvalidArgument(
            "part size must be positive".to_string(),
        ));
    }

    let total_parts = object_size.div_ceil(part_size);
    if total_parts > MAX_PARTS_COUNT {
        let min_part_size = object_size.div_ceil(MAX_PARTS_COUNT);
        return Err(UploadError::InvalidArgument(format!(
            "file size ({} bytes) needs {} parts of {} bytes, above the maximum of {}; use a part size of at least {} bytes",
            object_size, total_parts, part_size, MAX_PARTS_COUNT, min_part_size
        )));
    }

    Ok(())
}
