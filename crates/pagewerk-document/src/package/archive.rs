// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Size-bounded ZIP packaging of page images.
//
// Pages are packed greedily in order. Entries are stored uncompressed (the
// images are already PNG/JPEG), so the finished size of an archive is known
// up front from the entry sizes plus fixed ZIP header overhead.

use std::io::{Cursor, Write};
use std::ops::Range;

use pagewerk_core::error::PagewerkError;
use pagewerk_core::types::{ArchivePayload, PageImage};
use tracing::{debug, info, instrument, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Local file header without the name.
const LOCAL_HEADER_BYTES: u64 = 30;
/// Central directory record without the name.
const CENTRAL_RECORD_BYTES: u64 = 46;
/// End of central directory record.
const END_RECORD_BYTES: u64 = 22;
/// Headroom for optional extra fields the writer may add.
const EXTRA_FIELD_SLACK: u64 = 36;

/// Bytes an entry contributes to a finished archive.
pub fn entry_cost(image: &PageImage) -> u64 {
    let name_len = image.file_name().len() as u64;
    image.byte_len()
        + LOCAL_HEADER_BYTES
        + CENTRAL_RECORD_BYTES
        + 2 * name_len
        + EXTRA_FIELD_SLACK
}

/// Fixed bytes of an archive with no entries.
pub fn archive_base_cost() -> u64 {
    END_RECORD_BYTES
}

/// Greedy single-pass bin packing preserving order.
///
/// Each unit's total (`base` plus its costs) stays within `ceiling`, except
/// a unit holding one item that alone is larger than the ceiling.
pub fn plan_units(costs: &[u64], ceiling: u64, base: u64) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut total = base;

    for (index, &cost) in costs.iter().enumerate() {
        if index > start && total.saturating_add(cost) > ceiling {
            units.push(start..index);
            start = index;
            total = base;
        }
        total = total.saturating_add(cost);
    }
    if start < costs.len() {
        units.push(start..costs.len());
    }
    units
}

/// Pack `images` into ZIP payloads of at most `ceiling_bytes` each.
#[instrument(skip(images), fields(images = images.len()))]
pub fn pack_archive(images: &[PageImage], ceiling_bytes: u64) -> Result<Vec<ArchivePayload>, PagewerkError> {
    let costs: Vec<u64> = images.iter().map(entry_cost).collect();
    let units = plan_units(&costs, ceiling_bytes, archive_base_cost());

    let mut payloads = Vec::with_capacity(units.len());
    for unit in units {
        let pages = &images[unit];
        let bytes = write_zip(pages)?;
        if bytes.len() as u64 > ceiling_bytes {
            warn!(
                page = pages[0].page_number,
                bytes = bytes.len(),
                ceiling_bytes,
                "Single page exceeds the archive ceiling, shipping it alone"
            );
        }
        debug!(pages = pages.len(), bytes = bytes.len(), "Archive unit written");
        payloads.push(ArchivePayload {
            bytes,
            first_page: pages[0].page_number,
            last_page: pages[pages.len() - 1].page_number,
            page_count: pages.len(),
        });
    }

    info!(archives = payloads.len(), ceiling_bytes, "Images packed");
    Ok(payloads)
}

fn write_zip(pages: &[PageImage]) -> Result<Vec<u8>, PagewerkError> {
    let archive_err = |err: &dyn std::fmt::Display| PagewerkError::Archive(err.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for page in pages {
        zip.start_file(page.file_name(), options)
            .map_err(|e| archive_err(&e))?;
        zip.write_all(&page.bytes).map_err(|e| archive_err(&e))?;
    }
    let cursor = zip.finish().map_err(|e| archive_err(&e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::test_support::sized_image;
    use pagewerk_core::config::MIB;

    #[test]
    fn thirty_seven_pages_split_twenty_six_and_eleven() {
        let costs = vec![3 * MIB / 2; 37];
        let units = plan_units(&costs, 40 * MIB, 0);
        assert_eq!(units, vec![0..26, 26..37]);
    }

    #[test]
    fn oversize_item_gets_its_own_unit() {
        let units = plan_units(&[10, 500, 10, 10], 100, 0);
        assert_eq!(units, vec![0..1, 1..2, 2..4]);
    }

    #[test]
    fn empty_input_yields_no_units() {
        assert!(plan_units(&[], 100, 0).is_empty());
    }

    #[test]
    fn base_cost_counts_against_ceiling() {
        assert_eq!(plan_units(&[50, 50], 100, 0), vec![0..2]);
        assert_eq!(plan_units(&[50, 50], 100, 1), vec![0..1, 1..2]);
    }

    #[test]
    fn archives_respect_ceiling_and_order() {
        let images: Vec<PageImage> = (1..=10).map(|n| sized_image(n, 1000)).collect();
        let ceiling = 3500;
        let payloads = pack_archive(&images, ceiling).unwrap();

        assert!(payloads.len() > 1);
        let mut next_page = 1;
        for payload in &payloads {
            assert!(payload.bytes.len() as u64 <= ceiling, "{} > {ceiling}", payload.bytes.len());
            assert_eq!(payload.first_page, next_page);
            next_page = payload.last_page + 1;
        }
        assert_eq!(next_page, 11);
        assert_eq!(payloads.iter().map(|p| p.page_count).sum::<usize>(), 10);
    }

    #[test]
    fn archive_entries_are_named_and_intact() {
        let images = vec![sized_image(1, 64), sized_image(2, 128)];
        let payloads = pack_archive(&images, 10 * MIB).unwrap();
        assert_eq!(payloads.len(), 1);

        let mut archive = zip::ZipArchive::new(Cursor::new(payloads[0].bytes.clone())).unwrap();
        assert_eq!(archive.len(), 2);
        let mut entry = archive.by_name("page_002.png").unwrap();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), 128);
    }

    #[test]
    fn lone_oversize_page_still_ships() {
        let images = vec![sized_image(1, 10), sized_image(2, 5000), sized_image(3, 10)];
        let payloads = pack_archive(&images, 1000).unwrap();
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[1].first_page, 2);
        assert!(payloads[1].bytes.len() > 1000);
    }
}
