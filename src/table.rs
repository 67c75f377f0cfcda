use crate::flow::{LayoutCursor, draw_decorations};
use crate::style::{CellStyle, HAlign, VAlign};
use crate::surface::{PaintMode, RenderSurface, TextBaseline};
use crate::types::{Pt, Rect};
use crate::wrap::{widest_token, wrap_text};
use std::collections::HashSet;
use std::sync::OnceLock;

fn table_debug() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| {
        std::env::var("GALLEY_TABLE_DEBUG").is_ok_and(|v| !v.is_empty() && v != "0")
    })
}

/// One cell as supplied by the content producer. Spans below 1 are treated
/// as 1; spans past the grid edge are clamped during model construction.
#[derive(Debug, Clone)]
pub struct CellSource {
    pub text: String,
    pub col_span: u32,
    pub row_span: u32,
    pub style: CellStyle,
    pub is_header: bool,
}

impl CellSource {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            col_span: 1,
            row_span: 1,
            style: CellStyle::default(),
            is_header: false,
        }
    }

    pub fn header(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            col_span: 1,
            row_span: 1,
            style: CellStyle::header(),
            is_header: true,
        }
    }

    pub fn with_span(mut self, col_span: u32, row_span: u32) -> Self {
        self.col_span = col_span;
        self.row_span = row_span;
        self
    }

    pub fn with_style(mut self, style: CellStyle) -> Self {
        self.style = style;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableSource {
    pub rows: Vec<Vec<CellSource>>,
}

impl TableSource {
    pub fn new(rows: Vec<Vec<CellSource>>) -> Self {
        Self { rows }
    }
}

type CellId = usize;

/// Compressed row entry: one per origin cell, carrying its resolved grid
/// placement after clamping.
#[derive(Debug, Clone, Copy)]
pub struct RowEntry {
    cell: CellId,
    pub col_start: usize,
    pub col_span: usize,
    pub row_span: usize,
}

/// Span-aware grid model. Built by expanding the source rows into a full
/// rowCount x columnCount grid (which resolves overlaps last-write-wins)
/// and compressing back to per-row origin-cell entries.
#[derive(Debug)]
pub struct TableModel {
    cells: Vec<CellSource>,
    rows: Vec<Vec<RowEntry>>,
    column_count: usize,
}

impl TableModel {
    pub fn build(source: TableSource) -> Self {
        let row_count = source.rows.len();
        let column_count = source
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.col_span.max(1) as usize)
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0);

        let mut cells: Vec<CellSource> = Vec::new();
        let mut placements: Vec<RowEntry> = Vec::new();
        let mut grid: Vec<Vec<Option<CellId>>> = vec![vec![None; column_count]; row_count];

        for (row_idx, row) in source.rows.into_iter().enumerate() {
            let mut cursor = 0usize;
            for cell in row {
                while cursor < column_count && grid[row_idx][cursor].is_some() {
                    cursor += 1;
                }
                if cursor >= column_count {
                    break;
                }
                let col_span = (cell.col_span.max(1) as usize).min(column_count - cursor);
                let row_span = (cell.row_span.max(1) as usize).min(row_count - row_idx);
                let id = cells.len();
                cells.push(cell);
                placements.push(RowEntry {
                    cell: id,
                    col_start: cursor,
                    col_span,
                    row_span,
                });
                for r in row_idx..row_idx + row_span {
                    for c in cursor..cursor + col_span {
                        // Overlapping explicit spans: the later cell wins.
                        grid[r][c] = Some(id);
                    }
                }
                cursor += col_span;
            }
        }

        let mut rows: Vec<Vec<RowEntry>> = Vec::with_capacity(row_count);
        let mut emitted: HashSet<CellId> = HashSet::new();
        for grid_row in &grid {
            let mut entries = Vec::new();
            for slot in grid_row {
                if let Some(id) = slot {
                    if emitted.insert(*id) {
                        entries.push(placements[*id]);
                    }
                }
            }
            rows.push(entries);
        }

        Self {
            cells,
            rows,
            column_count,
        }
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<RowEntry>] {
        &self.rows
    }

    pub fn cell(&self, entry: &RowEntry) -> &CellSource {
        &self.cells[entry.cell]
    }

    pub fn is_degenerate(&self) -> bool {
        self.column_count == 0 || self.rows.is_empty()
    }
}

/// Resolved geometry for one table. Column widths always sum exactly to the
/// width measure() was given.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub columns: Vec<Pt>,
    pub rows: Vec<Pt>,
}

pub struct TableLayoutEngine {
    family: String,
}

impl TableLayoutEngine {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
        }
    }

    fn apply_cell_font(&self, surface: &mut dyn RenderSurface, style: &CellStyle) {
        let family = style.font_family.as_deref().unwrap_or(&self.family);
        surface.set_font(family, style.variant());
        surface.set_font_size(style.font_size);
    }

    fn cell_line_height(surface: &dyn RenderSurface, style: &CellStyle) -> Pt {
        surface
            .line_height()
            .unwrap_or_else(|| style.font_size.mul_ratio(6, 5))
    }

    /// Column widths and row heights for the model at the given total width.
    /// Column minimums come from each cell's longest unbreakable token plus
    /// padding, split evenly over the columns the cell spans; the minimums
    /// are then reconciled to sum exactly to `max_width` (shrink-to-fit when
    /// over, grow-to-fill when under). Degenerate models resolve to a single
    /// full-width column with no rows.
    pub fn measure(
        &self,
        model: &TableModel,
        surface: &mut dyn RenderSurface,
        max_width: Pt,
    ) -> TableLayout {
        if model.is_degenerate() {
            return TableLayout {
                columns: vec![max_width],
                rows: Vec::new(),
            };
        }
        let column_count = model.column_count();
        let mut minimums = vec![Pt::ZERO; column_count];
        for row in model.rows() {
            for entry in row {
                let cell = model.cell(entry);
                self.apply_cell_font(surface, &cell.style);
                let widest = widest_token(&cell.text, |t| surface.text_width(t))
                    + cell.style.padding * 2;
                let share = widest / entry.col_span as i32;
                for minimum in minimums
                    .iter_mut()
                    .skip(entry.col_start)
                    .take(entry.col_span)
                {
                    *minimum = minimum.max(share);
                }
            }
        }

        let columns = reconcile_columns(&minimums, max_width);

        let mut rows = Vec::with_capacity(model.row_count());
        for row in model.rows() {
            let mut height = Pt::ZERO;
            for entry in row {
                let cell = model.cell(entry);
                self.apply_cell_font(surface, &cell.style);
                let span_width: Pt = columns
                    .iter()
                    .skip(entry.col_start)
                    .take(entry.col_span)
                    .sum();
                let available = span_width - cell.style.padding * 2;
                let lines = wrap_text(&cell.text, available, |t| surface.text_width(t));
                let line_height = Self::cell_line_height(surface, &cell.style);
                let cell_height =
                    line_height.max(line_height * lines.len() as i32) + cell.style.padding * 2;
                height = height.max(cell_height);
            }
            rows.push(height);
        }

        if table_debug() {
            eprintln!(
                "[table] {} cols (milli) {:?}",
                columns.len(),
                columns.iter().map(|c| c.to_milli_i64()).collect::<Vec<_>>()
            );
            eprintln!(
                "[table] {} rows (milli) {:?}",
                rows.len(),
                rows.iter().map(|r| r.to_milli_i64()).collect::<Vec<_>>()
            );
        }

        TableLayout { columns, rows }
    }

    /// Draws the table at the cursor, breaking to a new page before any row
    /// that would cross the bottom boundary. Cell boxes for row-spanning
    /// cells cover the summed heights of the rows they span; their full
    /// height still contributes only to the origin row, so a tall spanning
    /// cell can overhang the rows beneath it.
    pub fn render(
        &self,
        model: &TableModel,
        layout: &TableLayout,
        surface: &mut dyn RenderSurface,
        cursor: &mut LayoutCursor,
    ) {
        if model.is_degenerate() {
            return;
        }
        for (row_idx, row) in model.rows().iter().enumerate() {
            let row_height = layout.rows[row_idx];
            if cursor.y + row_height > cursor.bottom_y {
                surface.add_page();
                cursor.y = cursor.top_y;
            }
            for entry in row {
                let cell = model.cell(entry);
                let x: Pt = cursor.x + layout.columns.iter().take(entry.col_start).sum::<Pt>();
                let width: Pt = layout
                    .columns
                    .iter()
                    .skip(entry.col_start)
                    .take(entry.col_span)
                    .sum();
                let height: Pt = layout
                    .rows
                    .iter()
                    .skip(row_idx)
                    .take(entry.row_span)
                    .sum();
                self.render_cell(surface, cell, x, cursor.y, width, height);
            }
            cursor.y += row_height;
        }
    }

    fn render_cell(
        &self,
        surface: &mut dyn RenderSurface,
        cell: &CellSource,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    ) {
        let style = &cell.style;
        let has_border = style.border_width > Pt::ZERO;
        let mode = match (style.fill.is_some(), has_border) {
            (true, true) => Some(PaintMode::FillStroke),
            (true, false) => Some(PaintMode::Fill),
            (false, true) => Some(PaintMode::Stroke),
            (false, false) => None,
        };
        if let Some(mode) = mode {
            if let Some(fill) = style.fill {
                surface.set_fill_color(fill);
            }
            if has_border {
                surface.set_draw_color(style.border_color);
                surface.set_line_width(style.border_width);
            }
            surface.draw_rect(
                Rect {
                    x,
                    y,
                    width,
                    height,
                },
                mode,
            );
        }

        self.apply_cell_font(surface, style);
        surface.set_text_color(style.color);
        let available = width - style.padding * 2;
        let lines = wrap_text(&cell.text, available, |t| surface.text_width(t));
        let line_height = Self::cell_line_height(surface, style);
        let block_height = line_height * lines.len() as i32;
        let inner_height = height - style.padding * 2;
        let top = match style.valign {
            VAlign::Top => y + style.padding,
            VAlign::Middle => y + style.padding + (inner_height - block_height) / 2,
            VAlign::Bottom => y + style.padding + (inner_height - block_height),
        };

        for (idx, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_width = surface.text_width(line);
            let line_x = match style.halign {
                HAlign::Left => x + style.padding,
                HAlign::Center => x + (width - line_width) / 2,
                HAlign::Right => x + width - style.padding - line_width,
            };
            let line_y = top + line_height * idx as i32;
            surface.draw_text(line, line_x, line_y, TextBaseline::Top);
            draw_decorations(
                surface,
                line_x,
                line_y,
                line_width,
                style.font_size,
                style.color,
                style.underline,
                style.strike,
            );
        }
    }
}

/// Scales or pads the per-column minimums so they sum exactly to the target
/// width. All arithmetic runs in milli-points; the last column absorbs the
/// rounding residue.
fn reconcile_columns(minimums: &[Pt], max_width: Pt) -> Vec<Pt> {
    let count = minimums.len();
    let target = max_width.to_milli_i64();
    let total: i64 = minimums.iter().map(|m| m.to_milli_i64()).sum();

    let mut columns: Vec<Pt> = Vec::with_capacity(count);
    if total == 0 {
        let share = max_width / count as i32;
        for _ in 0..count.saturating_sub(1) {
            columns.push(share);
        }
    } else if total > target {
        for minimum in minimums.iter().take(count - 1) {
            let scaled = (minimum.to_milli_i64() as i128 * target as i128 / total as i128) as i64;
            columns.push(Pt::from_milli_i64(scaled));
        }
    } else {
        let surplus = Pt::from_milli_i64(target - total) / count as i32;
        for minimum in minimums.iter().take(count - 1) {
            columns.push(*minimum + surplus);
        }
    }
    let used: Pt = columns.iter().sum();
    columns.push((max_width - used).max(Pt::ZERO));
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Command, RecordingSurface};

    fn plain_row(texts: &[&str]) -> Vec<CellSource> {
        texts.iter().map(|t| CellSource::text(*t)).collect()
    }

    fn engine() -> TableLayoutEngine {
        TableLayoutEngine::new("NotoSansSC")
    }

    fn cursor_for(surface: &RecordingSurface) -> LayoutCursor {
        let page = surface.page_size();
        LayoutCursor {
            x: Pt::from_f32(40.0),
            y: Pt::from_f32(40.0),
            top_y: Pt::from_f32(40.0),
            bottom_y: page.height - Pt::from_f32(40.0),
            max_x: page.width - Pt::from_f32(40.0),
        }
    }

    #[test]
    fn span_free_model_covers_every_slot_once() {
        let model = TableModel::build(TableSource::new(vec![
            plain_row(&["a", "b", "c"]),
            plain_row(&["d", "e", "f"]),
        ]));
        assert_eq!(model.column_count(), 3);
        assert_eq!(model.row_count(), 2);
        for row in model.rows() {
            assert_eq!(row.len(), 3);
            for entry in row {
                assert_eq!(entry.col_span, 1);
                assert_eq!(entry.row_span, 1);
            }
        }
    }

    #[test]
    fn merged_cell_emits_one_entry_at_its_origin() {
        let model = TableModel::build(TableSource::new(vec![
            vec![CellSource::text("merged").with_span(2, 2), CellSource::text("c")],
            vec![CellSource::text("d")],
        ]));
        assert_eq!(model.column_count(), 3);
        assert_eq!(model.rows()[0].len(), 2);
        // The second grid row only carries the cell that slotted past the span.
        assert_eq!(model.rows()[1].len(), 1);
        let merged = &model.rows()[0][0];
        assert_eq!(merged.col_start, 0);
        assert_eq!(merged.col_span, 2);
        assert_eq!(merged.row_span, 2);
        assert_eq!(model.cell(&model.rows()[1][0]).text, "d");
        assert_eq!(model.rows()[1][0].col_start, 2);
    }

    #[test]
    fn spans_past_the_grid_edge_are_clamped() {
        let model = TableModel::build(TableSource::new(vec![vec![
            CellSource::text("a"),
            CellSource::text("wide").with_span(9, 9),
        ]]));
        assert_eq!(model.column_count(), 10);
        let wide = &model.rows()[0][1];
        assert_eq!(wide.col_span, 9);
        assert_eq!(wide.row_span, 1);
    }

    #[test]
    fn column_widths_sum_exactly_to_max_width() {
        let mut surface = RecordingSurface::a4();
        let model = TableModel::build(TableSource::new(vec![plain_row(&[
            "short", "a much longer cell", "x",
        ])]));
        let max_width = Pt::from_f32(300.0);
        let layout = engine().measure(&model, &mut surface, max_width);
        let total: Pt = layout.columns.iter().sum();
        assert_eq!(total.to_milli_i64(), max_width.to_milli_i64());
    }

    #[test]
    fn shrink_to_fit_keeps_the_exact_sum() {
        let mut surface = RecordingSurface::a4();
        let model = TableModel::build(TableSource::new(vec![plain_row(&[
            "unbreakabletokenone",
            "unbreakabletokentwo",
            "unbreakabletokenthree",
        ])]));
        let max_width = Pt::from_f32(80.0);
        let layout = engine().measure(&model, &mut surface, max_width);
        let total: Pt = layout.columns.iter().sum();
        assert_eq!(total.to_milli_i64(), max_width.to_milli_i64());
    }

    #[test]
    fn long_unbreakable_item_wraps_and_grows_its_row() {
        let mut surface = RecordingSurface::a4();
        let model = TableModel::build(TableSource::new(vec![
            vec![
                CellSource::header("No."),
                CellSource::header("Item"),
                CellSource::header("Qty"),
            ],
            plain_row(&["1", "averyveryverylongitemnamewithoutanyspacesatall", "2"]),
        ]));
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(100.0));
        let one_line = Pt::from_f32(10.0).mul_ratio(6, 5) + Pt::from_f32(4.0);
        assert!(layout.rows[1] > one_line);
    }

    #[test]
    fn degenerate_model_resolves_to_a_trivial_layout() {
        let mut surface = RecordingSurface::a4();
        let model = TableModel::build(TableSource::default());
        assert!(model.is_degenerate());
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(200.0));
        assert_eq!(layout.columns, vec![Pt::from_f32(200.0)]);
        assert!(layout.rows.is_empty());

        let mut cursor = cursor_for(&surface);
        let before = cursor.y;
        engine().render(&model, &layout, &mut surface, &mut cursor);
        assert_eq!(cursor.y, before);
    }

    #[test]
    fn rows_without_cells_render_as_a_no_op() {
        let mut surface = RecordingSurface::a4();
        // Rows exist but no row carries a cell, so the grid has no columns.
        let model = TableModel::build(TableSource::new(vec![vec![], vec![]]));
        assert!(model.is_degenerate());
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(200.0));
        assert!(layout.rows.is_empty());

        let mut cursor = cursor_for(&surface);
        let before = cursor.y;
        engine().render(&model, &layout, &mut surface, &mut cursor);
        assert_eq!(cursor.y, before);
        assert!(surface.current_commands().is_empty());
    }

    #[test]
    fn rows_past_the_page_bottom_start_a_new_page() {
        let mut surface = RecordingSurface::a4();
        let rows: Vec<Vec<CellSource>> = (0..80)
            .map(|i| vec![CellSource::text(i.to_string())])
            .collect();
        let model = TableModel::build(TableSource::new(rows));
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(200.0));
        let mut cursor = cursor_for(&surface);
        // Leave only a little room so pagination must trigger.
        cursor.y = cursor.bottom_y - Pt::from_f32(50.0);
        engine().render(&model, &layout, &mut surface, &mut cursor);
        assert!(surface.completed_pages() >= 1);
        assert!(cursor.y <= cursor.bottom_y);
    }

    fn drawn_text(surface: &RecordingSurface) -> Vec<(String, Pt, Pt)> {
        surface
            .current_commands()
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawText { text, x, y, .. } => Some((text.clone(), *x, *y)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn horizontal_alignment_offsets_within_the_column() {
        let mut surface = RecordingSurface::a4();
        let aligned = |text: &str, halign: HAlign| {
            CellSource::text(text).with_style(CellStyle {
                halign,
                ..CellStyle::default()
            })
        };
        let model = TableModel::build(TableSource::new(vec![
            vec![aligned("ll", HAlign::Left)],
            vec![aligned("cc", HAlign::Center)],
            vec![aligned("rr", HAlign::Right)],
        ]));
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(100.0));
        let mut cursor = cursor_for(&surface);
        engine().render(&model, &layout, &mut surface, &mut cursor);

        // Heuristic metrics: 10pt font, 6pt per char, so each text is 12pt
        // wide in a 100pt column with 2pt padding, starting at x = 40.
        let placed = drawn_text(&surface);
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[0].0, "ll");
        assert_eq!(placed[0].1, Pt::from_f32(42.0));
        assert_eq!(placed[1].1, Pt::from_f32(84.0));
        assert_eq!(placed[2].1, Pt::from_f32(126.0));
    }

    #[test]
    fn vertical_alignment_offsets_within_the_row() {
        let mut surface = RecordingSurface::a4();
        let aligned = |text: &str, valign: VAlign| {
            CellSource::text(text).with_style(CellStyle {
                valign,
                ..CellStyle::default()
            })
        };
        // The three-line cell fixes the row height at 3 x 12 + 4 = 40pt, so
        // the single-line cells have 24pt of slack to align within.
        let model = TableModel::build(TableSource::new(vec![vec![
            aligned("top", VAlign::Top),
            aligned("mid", VAlign::Middle),
            aligned("bot", VAlign::Bottom),
            CellSource::text("x\ny\nz"),
        ]]));
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(400.0));
        let mut cursor = cursor_for(&surface);
        engine().render(&model, &layout, &mut surface, &mut cursor);

        let placed = drawn_text(&surface);
        let y_of = |wanted: &str| {
            placed
                .iter()
                .find(|(text, _, _)| text == wanted)
                .map(|(_, _, y)| *y)
                .expect("cell text drawn")
        };
        assert_eq!(y_of("top"), Pt::from_f32(42.0));
        assert_eq!(y_of("mid"), Pt::from_f32(54.0));
        assert_eq!(y_of("bot"), Pt::from_f32(66.0));
    }

    #[test]
    fn header_cells_paint_a_filled_box() {
        let mut surface = RecordingSurface::a4();
        let model = TableModel::build(TableSource::new(vec![vec![CellSource::header("Col")]]));
        let layout = engine().measure(&model, &mut surface, Pt::from_f32(120.0));
        let mut cursor = cursor_for(&surface);
        engine().render(&model, &layout, &mut surface, &mut cursor);
        assert!(surface.current_commands().iter().any(|cmd| matches!(
            cmd,
            Command::DrawRect {
                mode: PaintMode::FillStroke,
                ..
            }
        )));
    }
}
