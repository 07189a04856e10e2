//! Excel workbook boundary
//!
//! Workbooks are read whole with calamine, the sheets a workflow needs are
//! converted into typed rows (validated here, with the offending row and column
//! named in errors), and the workbook is written back whole with
//! rust_xlsxwriter. Sheets the workflow does not touch are kept, values only.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::{debug, warn};
use rust_xlsxwriter::{Format, Workbook};

use crate::core::duration::{format_duration, parse_duration};
use crate::core::error::{suggest_correction, Error, Result};
use crate::core::reconcile::{Endpoint, OrderedRoute, PairRow};

/// Sheet holding explicit origin/destination pairs
pub const PAIR_SHEET: &str = "A->B";

/// Sheet holding the locations to order
pub const LOCATION_SHEET: &str = "A ordonner";

/// Sheet receiving the ordered legs
pub const RESULTS_SHEET: &str = "Résultats";

const INDEX: &str = "Indice";
const ORIGIN: &str = "Origine";
const ORIGIN_LON: &str = "Origine (longitude)";
const ORIGIN_LAT: &str = "Origine (latitude)";
const DESTINATION: &str = "Destination";
const DESTINATION_LON: &str = "Destination (longitude)";
const DESTINATION_LAT: &str = "Destination (latitude)";
const DISTANCE: &str = "Distance";
const DURATION: &str = "Durée";
const DESCRIPTION: &str = "Description";

/// Column layout of the pair sheet
pub const PAIR_HEADERS: [&str; 9] = [
    INDEX,
    ORIGIN,
    ORIGIN_LON,
    ORIGIN_LAT,
    DESTINATION,
    DESTINATION_LON,
    DESTINATION_LAT,
    DISTANCE,
    DURATION,
];

/// Column layout of the results sheet, after the unnamed index column
pub const RESULT_HEADERS: [&str; 8] = [
    "depart",
    "depart_lon",
    "depart_lat",
    "arrivee",
    "arrivee_lon",
    "arrivee_lat",
    "distance",
    "duree",
];

/// Extra characters added to the widest cell of each column
const COLUMN_PADDING: usize = 5;

/// A cell value, as read from or written to a workbook
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date/time (days since 1899-12-30)
    DateTime(f64),
}

impl Cell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(n) => Cell::Number(*n),
            Data::Int(n) => Cell::Number(*n as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(format!("#{e:?}")),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text shown for the cell, used for labels and column widths
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
            Cell::DateTime(serial) if (0.0..1.0).contains(serial) => {
                format_duration((serial * 86_400.0).round() as u64)
            }
            Cell::DateTime(serial) => format_serial_datetime(*serial),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` for an Excel serial date (1900 date system)
fn format_serial_datetime(serial: f64) -> String {
    let mut days = serial.floor() as i64;
    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    if seconds >= 86_400 {
        days += 1;
        seconds -= 86_400;
    }

    // Serial 25569 is 1970-01-01; civil date from days since the epoch
    let z = days - 25_569 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        seconds / 3_600,
        seconds % 3_600 / 60,
        seconds % 60
    )
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A worksheet as a grid of cells, anchored at A1
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetData {
    /// Index of the first non-empty row, taken as the header row
    fn header_row(&self) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.iter().any(|cell| !cell.is_empty()))
    }

    fn headers(&self, header_row: usize) -> Vec<String> {
        self.rows[header_row]
            .iter()
            .map(|cell| cell.to_text().trim().to_string())
            .collect()
    }

    /// Width of each column: widest displayed cell plus padding
    fn column_widths(&self) -> Vec<usize> {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        (0..columns)
            .map(|col| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| cell.to_text().chars().count())
                    .max()
                    .unwrap_or(0)
                    + COLUMN_PADDING
            })
            .collect()
    }
}

/// All sheets of a workbook, in workbook order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookData {
    pub sheets: Vec<SheetData>,
}

impl WorkbookData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every sheet of an xlsx/xls/ods file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // Missing or unreadable files are I/O errors, not format errors
        std::fs::metadata(path)?;
        let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| {
            Error::Spreadsheet(format!("failed to open '{}': {e}", path.display()))
        })?;
        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let range = workbook.worksheet_range(&name)?;
            let (first_row, first_col) = range
                .start()
                .map(|(row, col)| (row as usize, col as usize))
                .unwrap_or((0, 0));

            let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); first_row];
            for data_row in range.rows() {
                let mut row = vec![Cell::Empty; first_col];
                row.extend(data_row.iter().map(Cell::from_data));
                while row.last().is_some_and(Cell::is_empty) {
                    row.pop();
                }
                rows.push(row);
            }
            debug!("Read sheet '{name}' ({} rows)", rows.len());
            sheets.push(SheetData { name, rows });
        }

        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.clone()).collect()
    }

    /// Sheet by exact name, suggesting a close name when it does not exist
    pub fn sheet(&self, name: &str) -> Result<&SheetData> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| {
                let hint = suggest_correction(name, &self.sheet_names())
                    .map(|s| format!(". Did you mean '{s}'?"))
                    .unwrap_or_default();
                Error::Spreadsheet(format!("sheet '{name}' not found{hint}"))
            })
    }

    /// Replace the sheet called `sheet.name`, or append it
    pub fn set_sheet(&mut self, sheet: SheetData) {
        match self.sheets.iter_mut().find(|s| s.name == sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Typed rows of a pair sheet
    pub fn pair_rows(&self, sheet_name: &str) -> Result<Vec<PairRow>> {
        let sheet = self.sheet(sheet_name)?;
        let Some(header_row) = sheet.header_row() else {
            return Ok(Vec::new());
        };
        let headers = sheet.headers(header_row);

        let index = optional_column(&headers, INDEX);
        let origin = required_column(sheet_name, &headers, ORIGIN)?;
        let origin_lon = required_column(sheet_name, &headers, ORIGIN_LON)?;
        let origin_lat = required_column(sheet_name, &headers, ORIGIN_LAT)?;
        let destination = required_column(sheet_name, &headers, DESTINATION)?;
        let destination_lon = required_column(sheet_name, &headers, DESTINATION_LON)?;
        let destination_lat = required_column(sheet_name, &headers, DESTINATION_LAT)?;
        let distance = required_column(sheet_name, &headers, DISTANCE)?;
        let duration = required_column(sheet_name, &headers, DURATION)?;

        let mut rows = Vec::new();
        for (row_idx, row) in sheet.rows.iter().enumerate().skip(header_row + 1) {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            let at = CellRef {
                sheet: sheet_name,
                row: row_idx,
                row_cells: row,
                headers: &headers,
            };

            rows.push(PairRow {
                index: index
                    .map(|col| at.cell(col).clone())
                    .filter(|cell| !cell.is_empty()),
                origin: Endpoint {
                    description: at.required_text(origin)?,
                    longitude: at.number(origin_lon)?,
                    latitude: at.number(origin_lat)?,
                },
                destination: Endpoint {
                    description: at.required_text(destination)?,
                    longitude: at.number(destination_lon)?,
                    latitude: at.number(destination_lat)?,
                },
                distance_km: at.number(distance)?,
                duration_s: at.duration(duration)?,
            });
        }

        Ok(rows)
    }

    /// Descriptions listed in a location sheet, in sheet order
    pub fn location_descriptions(&self, sheet_name: &str) -> Result<Vec<String>> {
        let sheet = self.sheet(sheet_name)?;
        let Some(header_row) = sheet.header_row() else {
            return Ok(Vec::new());
        };
        let headers = sheet.headers(header_row);
        let description = required_column(sheet_name, &headers, DESCRIPTION)?;

        let mut descriptions = Vec::new();
        for (row_idx, row) in sheet.rows.iter().enumerate().skip(header_row + 1) {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            let at = CellRef {
                sheet: sheet_name,
                row: row_idx,
                row_cells: row,
                headers: &headers,
            };
            match at.description(description)? {
                Some(text) => descriptions.push(text),
                None => warn!(
                    "Sheet '{sheet_name}' row {}: no {DESCRIPTION}, row ignored",
                    row_idx + 1
                ),
            }
        }

        Ok(descriptions)
    }

    /// Replace (or add) a pair sheet with `rows`
    pub fn set_pair_rows(&mut self, sheet_name: &str, rows: &[PairRow]) {
        let mut grid = vec![text_row(&PAIR_HEADERS)];
        for row in rows {
            grid.push(vec![
                row.index.clone().unwrap_or(Cell::Empty),
                Cell::Text(row.origin.description.clone()),
                optional_number(row.origin.longitude),
                optional_number(row.origin.latitude),
                Cell::Text(row.destination.description.clone()),
                optional_number(row.destination.longitude),
                optional_number(row.destination.latitude),
                optional_number(row.distance_km),
                row.duration_s
                    .map(|s| Cell::Text(format_duration(s)))
                    .unwrap_or(Cell::Empty),
            ]);
        }

        self.set_sheet(SheetData {
            name: sheet_name.to_string(),
            rows: grid,
        });
    }

    /// Replace (or add) a results sheet with the legs of `route`
    pub fn set_ordered_route(&mut self, sheet_name: &str, route: &OrderedRoute) {
        let mut header = vec![Cell::Empty];
        header.extend(text_row(&RESULT_HEADERS));
        let mut grid = vec![header];

        for (i, leg) in route.legs.iter().enumerate() {
            grid.push(vec![
                Cell::Number(i as f64),
                Cell::Text(leg.origin.description().to_string()),
                Cell::Number(leg.origin.longitude()),
                Cell::Number(leg.origin.latitude()),
                Cell::Text(leg.destination.description().to_string()),
                Cell::Number(leg.destination.longitude()),
                Cell::Number(leg.destination.latitude()),
                Cell::Number(leg.distance_km),
                Cell::Text(format_duration(leg.duration_s)),
            ]);
        }

        self.set_sheet(SheetData {
            name: sheet_name.to_string(),
            rows: grid,
        });
    }

    /// Write every sheet to `path`, sizing columns to their content
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut workbook = Workbook::new();
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let time_format = Format::new().set_num_format("[h]:mm:ss");

        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet().set_name(&sheet.name)?;

            for (row_idx, row) in sheet.rows.iter().enumerate() {
                let r = u32::try_from(row_idx)
                    .map_err(|_| Error::Spreadsheet(format!("too many rows in '{}'", sheet.name)))?;
                for (col_idx, cell) in row.iter().enumerate() {
                    let c = u16::try_from(col_idx).map_err(|_| {
                        Error::Spreadsheet(format!("too many columns in '{}'", sheet.name))
                    })?;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, s)?;
                        }
                        Cell::Number(n) => {
                            worksheet.write_number(r, c, *n)?;
                        }
                        Cell::Bool(b) => {
                            worksheet.write_boolean(r, c, *b)?;
                        }
                        Cell::DateTime(serial) => {
                            let format = if *serial < 1.0 { &time_format } else { &datetime_format };
                            worksheet.write_number_with_format(r, c, *serial, format)?;
                        }
                    }
                }
            }

            for (col_idx, width) in sheet.column_widths().into_iter().enumerate() {
                if let Ok(c) = u16::try_from(col_idx) {
                    worksheet.set_column_width(c, width as f64)?;
                }
            }
        }

        workbook.save(path.as_ref())?;
        Ok(())
    }
}

fn text_row(headers: &[&str]) -> Vec<Cell> {
    headers.iter().map(|h| Cell::Text(h.to_string())).collect()
}

fn optional_number(value: Option<f64>) -> Cell {
    value.map(Cell::Number).unwrap_or(Cell::Empty)
}

fn optional_column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn required_column(sheet: &str, headers: &[String], name: &str) -> Result<usize> {
    optional_column(headers, name).ok_or_else(|| {
        let known: Vec<String> = headers.iter().filter(|h| !h.is_empty()).cloned().collect();
        let hint = suggest_correction(name, &known)
            .map(|s| format!(" (found '{s}' instead)"))
            .unwrap_or_default();
        Error::Spreadsheet(format!("sheet '{sheet}' has no '{name}' column{hint}"))
    })
}

/// Typed access to the cells of one data row
struct CellRef<'a> {
    sheet: &'a str,
    row: usize,
    row_cells: &'a [Cell],
    headers: &'a [String],
}

impl CellRef<'_> {
    fn cell(&self, col: usize) -> &Cell {
        self.row_cells.get(col).unwrap_or(&Cell::Empty)
    }

    fn invalid(&self, col: usize, expected: &str) -> Error {
        Error::Spreadsheet(format!(
            "sheet '{}' row {}, column '{}': expected {expected}, found '{}'",
            self.sheet,
            self.row + 1,
            self.headers.get(col).map(String::as_str).unwrap_or("?"),
            self.cell(col).to_text()
        ))
    }

    /// Trimmed text of a description cell; dates are not descriptions
    fn description(&self, col: usize) -> Result<Option<String>> {
        if matches!(self.cell(col), Cell::DateTime(_)) {
            return Err(self.invalid(col, "a description"));
        }
        let text = self.cell(col).to_text();
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn required_text(&self, col: usize) -> Result<String> {
        self.description(col)?
            .ok_or_else(|| self.invalid(col, "a description"))
    }

    fn number(&self, col: usize) -> Result<Option<f64>> {
        match self.cell(col) {
            Cell::Empty => Ok(None),
            Cell::Number(n) if n.is_finite() => Ok(Some(*n)),
            Cell::Text(s) => parse_decimal(s)
                .map(Some)
                .ok_or_else(|| self.invalid(col, "a number")),
            _ => Err(self.invalid(col, "a number")),
        }
    }

    fn duration(&self, col: usize) -> Result<Option<u64>> {
        match self.cell(col) {
            Cell::Empty => Ok(None),
            Cell::Number(n) if n.is_finite() && *n >= 0.0 => Ok(Some(n.floor() as u64)),
            Cell::DateTime(days) if *days >= 0.0 => Ok(Some((days * 86_400.0).round() as u64)),
            Cell::Text(s) => parse_duration(s)
                .map(Some)
                .ok_or_else(|| self.invalid(col, "a duration (H:MM:SS)")),
            _ => Err(self.invalid(col, "a duration (H:MM:SS)")),
        }
    }
}

/// Parse a decimal number, accepting a comma as decimal separator
fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    let value = text
        .parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', ".").parse::<f64>().ok())?;
    value.is_finite().then_some(value)
}
