use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use tracing::debug;

use super::{Cell, ExtractError, Grid};

/// Read the first sheet of an `.xls` or `.xlsx` workbook held in memory
pub fn load_grid(bytes: &[u8]) -> Result<Grid, ExtractError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| ExtractError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|e| ExtractError::Workbook(e.to_string()))?;

    let grid = grid_from_range(&range);
    debug!("Loaded sheet with {} rows x {} columns", grid.height(), grid.width());
    Ok(grid)
}

/// Convert a calamine range into a grid indexed from the sheet origin.
///
/// calamine trims leading empty rows and columns; they are padded back so
/// that fixed positions such as (3, 0) mean the same thing as in the sheet.
pub fn grid_from_range(range: &Range<Data>) -> Grid {
    let (first_row, first_col) = range.start().unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); first_row as usize];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; first_col as usize];
        cells.extend(row.iter().map(cell_from_data));
        rows.push(cells);
    }
    Grid::from_rows(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}
