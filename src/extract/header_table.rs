use super::{Cell, ExtractError, Grid, LabelMatch, SearchScope};

/// A table inside a grid whose header row is found by keyword
#[derive(Debug, Clone)]
pub struct HeaderTable<'g> {
    grid: &'g Grid,
    header_row: usize,
    columns: Vec<String>,
}

/// One data row below the header
#[derive(Debug, Clone, Copy)]
pub struct HeaderRecord<'g> {
    pub row: usize,
    cells: &'g [Cell],
}

impl<'g> HeaderRecord<'g> {
    pub fn get(&self, col: usize) -> &'g Cell {
        static EMPTY: Cell = Cell::Empty;
        self.cells.get(col).unwrap_or(&EMPTY)
    }
}

impl<'g> HeaderTable<'g> {
    /// The first row (in scan order) holding a cell that contains any keyword
    /// becomes the header. Column names have line breaks removed and are trimmed.
    pub fn locate(grid: &'g Grid, keywords: &[&str]) -> Result<Self, ExtractError> {
        let label = LabelMatch::contains(keywords);
        let (header_row, _) = grid
            .find(&label, &SearchScope::Anywhere)
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::LabelNotFound { label: keywords.join("|") })?;

        let columns = (0..grid.width())
            .map(|col| {
                grid.get(header_row, col)
                    .and_then(Cell::as_text)
                    .map(|name| name.replace(['\r', '\n'], "").trim().to_string())
                    .unwrap_or_default()
            })
            .collect();

        Ok(Self { grid, header_row, columns })
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of the first column whose name contains any keyword
    pub fn column_containing(&self, keywords: &[&str]) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| keywords.iter().any(|k| name.contains(k)))
    }

    /// Rows after the header, in sheet order
    pub fn records(&self) -> impl Iterator<Item = HeaderRecord<'g>> + '_ {
        let grid = self.grid;
        (self.header_row + 1..grid.height()).filter_map(move |row| {
            grid.row(row).map(|cells| HeaderRecord { row, cells })
        })
    }
}
