//! Page layout decisions for tabular reports.
//!
//! Placement is two-phase: a section is placed using its estimated height,
//! the renderer draws it, and the cursor is then corrected to the measured
//! end-Y (or advanced by the estimate when nothing was measured). The
//! paginator never draws.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Lowest Y a section may end at.
    pub content_height: f64,
    /// Cursor position at the top of every page after the first.
    pub top_margin: f64,
    /// Cursor position on page one, below any title block.
    pub first_page_top: f64,
    /// Space inserted before a section that is not first on its page.
    pub section_gap: f64,
}

impl PageGeometry {
    pub fn new(content_height: f64, top_margin: f64) -> Self {
        Self {
            content_height,
            top_margin,
            first_page_top: top_margin,
            section_gap: 0.0,
        }
    }

    pub fn with_first_page_top(mut self, first_page_top: f64) -> Self {
        self.first_page_top = first_page_top;
        self
    }

    pub fn with_section_gap(mut self, section_gap: f64) -> Self {
        self.section_gap = section_gap;
        self
    }

    /// Portrait PO dashboard report.
    pub fn dashboard() -> Self {
        Self::new(280.0, 20.0)
            .with_first_page_top(45.0)
            .with_section_gap(15.0)
    }

    /// Landscape per-student report.
    pub fn student_report() -> Self {
        Self::new(190.0, 20.0)
            .with_first_page_top(45.0)
            .with_section_gap(8.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section<T> {
    pub estimated_height: f64,
    pub contract: T,
}

impl<T> Section<T> {
    pub fn new(estimated_height: f64, contract: T) -> Self {
        Self {
            estimated_height,
            contract,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement<T> {
    pub page_index: usize,
    pub y: f64,
    pub contract: T,
}

impl<T> Placement<T> {
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }
}

/// Where the next section goes, before it is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub page_index: usize,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct ReportPaginator {
    geometry: PageGeometry,
    cursor: f64,
    page_index: usize,
    sections_on_page: usize,
    pending: Option<(f64, f64)>,
}

impl ReportPaginator {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            cursor: geometry.first_page_top,
            page_index: 0,
            sections_on_page: 0,
            pending: None,
        }
    }

    /// Decides the slot for a section of the given estimated height.
    ///
    /// A section that does not fit below the cursor starts a new page. The
    /// first section on a page only moves on when a fresh page would hold it;
    /// an oversized section sits alone where it is rather than leaving a
    /// blank page behind.
    pub fn place(&mut self, estimated_height: f64) -> Slot {
        if self.pending.is_some() {
            self.commit(None);
        }

        let mut y = self.cursor;
        if self.sections_on_page > 0 {
            y += self.geometry.section_gap;
        }

        let overflows = y + estimated_height > self.geometry.content_height;
        let fits_fresh_page =
            self.geometry.top_margin + estimated_height <= self.geometry.content_height;
        let page_has_content = self.sections_on_page > 0;
        let below_top = y > self.geometry.top_margin;
        if overflows && (page_has_content || (below_top && fits_fresh_page)) {
            self.page_index += 1;
            self.sections_on_page = 0;
            y = self.geometry.top_margin;
            tracing::debug!(
                target: "paginate",
                page = self.page_index + 1,
                estimated_height,
                "page break"
            );
        }

        self.sections_on_page += 1;
        self.cursor = y;
        self.pending = Some((y, estimated_height));

        Slot {
            page_index: self.page_index,
            y,
        }
    }

    /// Moves the cursor past the last placed section. `measured_end` is the
    /// renderer's true end-Y; `None` falls back to the estimate.
    pub fn commit(&mut self, measured_end: Option<f64>) {
        let Some((y, estimated_height)) = self.pending.take() else {
            return;
        };
        self.cursor = match measured_end {
            Some(end) if end.is_finite() => end,
            _ => y + estimated_height,
        };
    }
}

/// Lays out every section in order. `measure` is called right after each
/// placement and returns the section's true end-Y when the renderer knows it.
pub fn paginate<T, F>(
    geometry: PageGeometry,
    sections: Vec<Section<T>>,
    mut measure: F,
) -> Vec<Placement<T>>
where
    F: FnMut(&Placement<T>, f64) -> Option<f64>,
{
    let mut paginator = ReportPaginator::new(geometry);
    let mut placements = Vec::with_capacity(sections.len());

    for section in sections {
        let slot = paginator.place(section.estimated_height);
        let placement = Placement {
            page_index: slot.page_index,
            y: slot.y,
            contract: section.contract,
        };
        let measured_end = measure(&placement, section.estimated_height);
        paginator.commit(measured_end);
        placements.push(placement);
    }

    placements
}

/// Total page count of a laid-out report.
pub fn page_count<T>(placements: &[Placement<T>]) -> usize {
    placements
        .last()
        .map(|placement| placement.page_number())
        .unwrap_or(1)
}
