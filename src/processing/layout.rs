use std::ops::Range;

/// Width of an image uniformly scaled to `target_h`, rounded down.
pub fn scale_to_height(src_w: u32, src_h: u32, target_h: u32) -> u32 {
    let scaled = u64::from(src_w) * u64::from(target_h) / u64::from(src_h.max(1));
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// One packed row: a contiguous run of photos and the sum of their widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    pub members: Range<usize>,
    pub images_width: u32,
}

impl RowPlan {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Width of the row with `border` between neighbours (no outer borders).
    pub fn packed_width(&self, border: u32) -> u64 {
        let gaps = self.len().saturating_sub(1) as u64;
        u64::from(self.images_width) + gaps * u64::from(border)
    }
}

/// Greedily packs `widths` left to right into rows no wider than `canvas_w`.
///
/// A photo joins the open row while `row_width + width + border * row_len`
/// fits; an empty row always takes its first photo, so an over-wide photo
/// ends up alone in its row.
pub fn pack_rows(widths: &[u32], canvas_w: u32, border: u32) -> Vec<RowPlan> {
    let mut rows = Vec::new();
    let mut start = 0usize;
    let mut row_width = 0u64;

    for (idx, &w) in widths.iter().enumerate() {
        let row_len = (idx - start) as u64;
        let needed = row_width + u64::from(w) + u64::from(border) * row_len;
        if row_len > 0 && needed > u64::from(canvas_w) {
            rows.push(RowPlan {
                members: start..idx,
                images_width: row_width as u32,
            });
            start = idx;
            row_width = 0;
        }
        row_width += u64::from(w);
    }

    if start < widths.len() {
        rows.push(RowPlan {
            members: start..widths.len(),
            images_width: row_width.min(u64::from(u32::MAX)) as u32,
        });
    }
    rows
}

/// Margin placed before, between and after the images of a row.
pub fn even_margin(canvas_w: u32, images_width: u32, count: usize) -> u32 {
    let gaps = count as u64 + 1;
    (u64::from(canvas_w.saturating_sub(images_width)) / gaps) as u32
}

/// Left edge of every image in a row painted with [`even_margin`].
pub fn row_offsets(canvas_w: u32, widths: &[u32]) -> Vec<u32> {
    let total: u64 = widths.iter().map(|w| u64::from(*w)).sum();
    let margin = even_margin(canvas_w, total.min(u64::from(u32::MAX)) as u32, widths.len());
    let mut x = margin;
    widths
        .iter()
        .map(|w| {
            let left = x;
            x = x.saturating_add(*w).saturating_add(margin);
            left
        })
        .collect()
}
