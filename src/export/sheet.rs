use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook};

use super::ExportError;

pub const SHEET_NAME: &str = "Bugs";
pub const LINKED_ITEMS_HEADER: &str = "Linked Work Items";

/// The output workbook: one "Bugs" worksheet, bold header in row 1, data
/// appended from row 2 with a monotone cursor. The workbook lives in memory
/// until `finalize` saves it, so a failed run leaves no partial file behind
/// beyond whatever already existed at the destination.
pub struct BugSheet {
    workbook: Workbook,
    path: PathBuf,
    /// Next unused row, 0-based. Row 0 is the header.
    next_row: u32,
    columns: u16,
}

impl BugSheet {
    /// Refuses to open when the destination exists and cannot be opened for
    /// writing (held by another program, or not writable). The check is a
    /// best effort: it cannot see advisory locks, but it catches the common
    /// case of the workbook being open in a spreadsheet application.
    pub fn open(path: &Path) -> Result<Self, ExportError> {
        if destination_blocked(path) {
            return Err(ExportError::DestinationBlocked(path.to_path_buf()));
        }
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name(SHEET_NAME)?;
        Ok(Self {
            workbook,
            path: path.to_path_buf(),
            next_row: 1,
            columns: 0,
        })
    }

    /// Row 1: the selected field names, bold, plus the trailing linked-items
    /// column.
    pub fn write_header(&mut self, columns: &[String]) -> Result<(), ExportError> {
        let bold = Format::new().set_bold();
        let sheet = self.workbook.worksheet_from_index(0)?;
        let mut col: u16 = 0;
        for name in columns {
            sheet.write_string_with_format(0, col, name.as_str(), &bold)?;
            col += 1;
        }
        sheet.write_string_with_format(0, col, LINKED_ITEMS_HEADER, &bold)?;
        self.columns = col + 1;
        Ok(())
    }

    pub fn append_row(&mut self, values: &[String]) -> Result<(), ExportError> {
        let sheet = self.workbook.worksheet_from_index(0)?;
        for (col, value) in values.iter().enumerate() {
            sheet.write_string(self.next_row, col as u16, value.as_str())?;
        }
        self.next_row += 1;
        Ok(())
    }

    /// The used range in A1 notation, e.g. "A1:C4".
    pub fn used_range(&self) -> String {
        format!(
            "A1:{}{}",
            column_letter(u32::from(self.columns)),
            self.next_row
        )
    }

    /// Autofit columns, put a filter on the header row, and save. Consumes
    /// the sink; the workbook is released whether or not the save succeeds.
    pub fn finalize(mut self) -> Result<PathBuf, ExportError> {
        let last_row = self.next_row.saturating_sub(1);
        let last_col = self.columns.saturating_sub(1);
        let sheet = self.workbook.worksheet_from_index(0)?;
        sheet.autofit();
        sheet.autofilter(0, 0, last_row, last_col)?;
        self.workbook.save(&self.path)?;
        Ok(self.path)
    }
}

fn destination_blocked(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    OpenOptions::new().write(true).open(path).is_err()
}

/// 1-based column index to spreadsheet letters: 1 -> A, 26 -> Z, 27 -> AA.
/// Bijective base 26; a remainder of zero borrows and maps to Z.
pub fn column_letter(mut column: u32) -> String {
    let mut letters = String::new();
    while column > 0 {
        let remainder = (column - 1) % 26;
        letters.insert(0, char::from(b'A' + remainder as u8));
        column = (column - remainder - 1) / 26;
    }
    letters
}
