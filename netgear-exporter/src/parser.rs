//! DOCSIS status page parsing.
//!
//! The status page lists channels in HTML tables. Every data row holds ten
//! cells in a fixed order; header, separator and summary rows are matched by
//! the same selector and have to be filtered out.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::ModemConfig;
use crate::error::{FieldParseError, Result, ScrapeError};
use crate::session::Session;

/// A column of the channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Channel,
    LockStatus,
    Modulation,
    ChannelId,
    Frequency,
    Power,
    SnrMer,
    UnerroredCodewords,
    CorrectableCodewords,
    UncorrectableCodewords,
}

/// Cell position to field mapping of a data row.
///
/// Firmware that reorders the table needs a change here and nowhere else.
pub const COLUMNS: [Column; 10] = [
    Column::Channel,
    Column::LockStatus,
    Column::Modulation,
    Column::ChannelId,
    Column::Frequency,
    Column::Power,
    Column::SnrMer,
    Column::UnerroredCodewords,
    Column::CorrectableCodewords,
    Column::UncorrectableCodewords,
];

impl Column {
    /// Field name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::LockStatus => "lock status",
            Self::Modulation => "modulation",
            Self::ChannelId => "channel id",
            Self::Frequency => "frequency",
            Self::Power => "power",
            Self::SnrMer => "snr/mer",
            Self::UnerroredCodewords => "unerrored codewords",
            Self::CorrectableCodewords => "correctable codewords",
            Self::UncorrectableCodewords => "uncorrectable codewords",
        }
    }

    /// Unit printed after numeric values, if any.
    pub fn unit_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Power => Some("dBmV"),
            Self::SnrMer => Some("dB"),
            _ => None,
        }
    }

    /// Whether the column is exported as a numeric series.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Power
                | Self::SnrMer
                | Self::UnerroredCodewords
                | Self::CorrectableCodewords
                | Self::UncorrectableCodewords
        )
    }
}

/// One data row of the channel table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRecord {
    pub channel: String,
    pub lock_status: String,
    pub modulation: String,
    pub channel_id: String,
    /// Frequency as printed, unit included.
    pub frequency: String,
    pub power_dbmv: Option<f64>,
    pub snr_mer_db: Option<f64>,
    pub unerrored_codewords: Option<f64>,
    pub correctable_codewords: Option<f64>,
    pub uncorrectable_codewords: Option<f64>,
}

impl ChannelRecord {
    fn set_text(&mut self, column: Column, text: String) {
        match column {
            Column::Channel => self.channel = text,
            Column::LockStatus => self.lock_status = text,
            Column::Modulation => self.modulation = text,
            Column::ChannelId => self.channel_id = text,
            Column::Frequency => self.frequency = text,
            _ => {}
        }
    }

    fn set_value(&mut self, column: Column, value: f64) {
        match column {
            Column::Power => self.power_dbmv = Some(value),
            Column::SnrMer => self.snr_mer_db = Some(value),
            Column::UnerroredCodewords => self.unerrored_codewords = Some(value),
            Column::CorrectableCodewords => self.correctable_codewords = Some(value),
            Column::UncorrectableCodewords => self.uncorrectable_codewords = Some(value),
            _ => {}
        }
    }
}

/// Parse a numeric cell, stripping the column's unit suffix.
pub fn parse_field(column: Column, text: &str) -> std::result::Result<f64, FieldParseError> {
    let trimmed = text.trim();
    let number = match column.unit_suffix() {
        Some(suffix) => trimmed.strip_suffix(suffix).unwrap_or(trimmed).trim(),
        None => trimmed,
    };

    number.parse::<f64>().map_err(|_| FieldParseError {
        field: column.as_str(),
        text: text.to_string(),
    })
}

/// Records parsed from one status page.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    /// Channel records in document order.
    pub records: Vec<ChannelRecord>,
    /// Rows dropped for not having exactly ten cells (header excluded).
    pub skipped_rows: usize,
    /// Numeric cells that failed to parse.
    pub field_errors: Vec<FieldParseError>,
}

/// Parser for the channel status page.
#[derive(Debug)]
pub struct StatusTableParser {
    rows: Selector,
    cells: Selector,
}

impl StatusTableParser {
    /// Create a parser selecting table rows with `row_selector`.
    pub fn new(row_selector: &str) -> Result<Self> {
        let rows = Selector::parse(row_selector).map_err(|e| {
            ScrapeError::MalformedPage(format!("invalid row selector '{}': {}", row_selector, e))
        })?;
        let cells = Selector::parse("td")
            .map_err(|e| ScrapeError::MalformedPage(format!("invalid cell selector: {}", e)))?;

        Ok(Self { rows, cells })
    }

    /// Fetch the status page with an authenticated session and parse it.
    pub async fn fetch_and_parse(
        &self,
        session: &Session,
        modem: &ModemConfig,
    ) -> Result<StatusTable> {
        let url = modem.endpoint(&modem.status_path);
        debug!(url = %url, "Fetching status page");

        let body = session.client().get(&url).send().await?.text().await?;
        Ok(self.parse(&body))
    }

    /// Parse the channel table out of a status page.
    ///
    /// The first selected row is the header and is skipped by position.
    pub fn parse(&self, html: &str) -> StatusTable {
        let document = Html::parse_document(html);
        let mut table = StatusTable::default();
        let mut row_count = 0;

        for (index, row) in document.select(&self.rows).enumerate() {
            row_count += 1;
            if index == 0 {
                continue;
            }

            let cells: Vec<String> = row.select(&self.cells).map(cell_text).collect();
            if cells.len() != COLUMNS.len() {
                debug!(row = index, cells = cells.len(), "Skipping non-channel row");
                table.skipped_rows += 1;
                continue;
            }

            debug!("{}", cells.join(" - "));

            let mut record = ChannelRecord::default();
            for (column, text) in COLUMNS.iter().zip(cells) {
                if !column.is_numeric() {
                    record.set_text(*column, text);
                    continue;
                }

                match parse_field(*column, &text) {
                    Ok(value) => record.set_value(*column, value),
                    Err(e) => {
                        warn!(channel = %record.channel, error = %e, "Skipping unparsable field");
                        table.field_errors.push(e);
                    }
                }
            }

            table.records.push(record);
        }

        if row_count == 0 {
            warn!("No channel table rows found on status page");
        }

        table
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
        format!("<tr>{}</tr>", tds)
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body><div class="in-frame-table"><table>
                <tr><th>Channel</th><th>Lock Status</th><th>Modulation</th></tr>
                {}
            </table></div></body></html>"#,
            rows.join("\n")
        )
    }

    fn parser() -> StatusTableParser {
        StatusTableParser::new(".in-frame-table table tr").unwrap()
    }

    const ROW_1: [&str; 10] = [
        "1",
        "Locked",
        "QAM256",
        "5",
        "549.0 MHz",
        "3.5 dBmV",
        "38.2 dB",
        "123456",
        "12",
        "0",
    ];

    #[test]
    fn test_parse_single_row() {
        let table = parser().parse(&page(&[row(&ROW_1)]));

        assert_eq!(table.records.len(), 1);
        assert!(table.field_errors.is_empty());

        let record = &table.records[0];
        assert_eq!(record.channel, "1");
        assert_eq!(record.lock_status, "Locked");
        assert_eq!(record.modulation, "QAM256");
        assert_eq!(record.channel_id, "5");
        assert_eq!(record.frequency, "549.0 MHz");
        assert_eq!(record.power_dbmv, Some(3.5));
        assert_eq!(record.snr_mer_db, Some(38.2));
        assert_eq!(record.unerrored_codewords, Some(123456.0));
        assert_eq!(record.correctable_codewords, Some(12.0));
        assert_eq!(record.uncorrectable_codewords, Some(0.0));
    }

    #[test]
    fn test_short_row_between_valid_rows_is_skipped() {
        let mut row_2 = ROW_1;
        row_2[0] = "2";
        let short = row(&["Total", "", "", "", "", "", "", ""]);

        let table = parser().parse(&page(&[row(&ROW_1), short, row(&row_2)]));

        assert_eq!(table.records.len(), 2);
        assert_eq!(table.skipped_rows, 1);
        assert_eq!(table.records[0].channel, "1");
        assert_eq!(table.records[1].channel, "2");
    }

    #[test]
    fn test_record_count_matches_ten_cell_rows() {
        let mut long = ROW_1.to_vec();
        long.push("extra");
        let rows = vec![
            row(&ROW_1),
            row(&ROW_1[..9]),
            row(&long),
            row(&[]),
            row(&ROW_1),
            row(&ROW_1[..1]),
        ];

        let table = parser().parse(&page(&rows));

        assert_eq!(table.records.len(), 2);
        assert_eq!(table.skipped_rows, 4);
    }

    #[test]
    fn test_header_skipped_by_position() {
        // A data-looking first row is still treated as the header.
        let html = format!(
            r#"<div class="in-frame-table"><table>{}{}</table></div>"#,
            row(&ROW_1),
            row(&ROW_1)
        );

        let table = parser().parse(&html);
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn test_malformed_power_leaves_field_unset() {
        let mut cells = ROW_1;
        cells[5] = "N/A";

        let table = parser().parse(&page(&[row(&cells)]));

        assert_eq!(table.records.len(), 1);
        let record = &table.records[0];
        assert_eq!(record.power_dbmv, None);
        assert_eq!(record.snr_mer_db, Some(38.2));
        assert_eq!(record.uncorrectable_codewords, Some(0.0));

        assert_eq!(table.field_errors.len(), 1);
        assert_eq!(table.field_errors[0].field, "power");
        assert_eq!(table.field_errors[0].text, "N/A");
    }

    #[test]
    fn test_cell_text_trimmed_and_flattened() {
        let mut cells = ROW_1;
        cells[0] = "\n   <b>7</b>  ";
        cells[4] = " <span>549.0</span> MHz ";

        let table = parser().parse(&page(&[row(&cells)]));

        assert_eq!(table.records[0].channel, "7");
        assert_eq!(table.records[0].frequency, "549.0 MHz");
    }

    #[test]
    fn test_rows_outside_selector_ignored() {
        let html = format!(
            r#"<table><tr><th>h</th></tr>{}</table>
               <div class="in-frame-table"><table><tr><th>h</th></tr>{}</table></div>"#,
            row(&ROW_1),
            row(&ROW_1)
        );

        let table = parser().parse(&html);
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn test_empty_page() {
        let table = parser().parse("<html><body>Please log in</body></html>");
        assert!(table.records.is_empty());
        assert_eq!(table.skipped_rows, 0);
    }

    #[test]
    fn test_invalid_selector() {
        let result = StatusTableParser::new("tr[[");
        assert!(matches!(result, Err(ScrapeError::MalformedPage(_))));
    }

    #[test]
    fn test_parse_field_with_units() {
        assert_eq!(parse_field(Column::Power, " 3.5dBmV "), Ok(3.5));
        assert_eq!(parse_field(Column::Power, "3.5 dBmV"), Ok(3.5));
        assert_eq!(parse_field(Column::Power, "-7.1 dBmV"), Ok(-7.1));
        assert_eq!(parse_field(Column::SnrMer, "38.2 dB"), Ok(38.2));
        assert_eq!(parse_field(Column::SnrMer, "40"), Ok(40.0));
        assert_eq!(parse_field(Column::UnerroredCodewords, " 123456 "), Ok(123456.0));
    }

    #[test]
    fn test_parse_field_malformed() {
        let err = parse_field(Column::Power, "N/A").unwrap_err();
        assert_eq!(err.field, "power");
        assert!(parse_field(Column::SnrMer, "").is_err());
        assert!(parse_field(Column::CorrectableCodewords, "12 dB").is_err());
        assert!(parse_field(Column::UncorrectableCodewords, "1,024").is_err());
    }

    #[test]
    fn test_column_table_is_complete() {
        let numeric = COLUMNS.iter().filter(|c| c.is_numeric()).count();
        assert_eq!(numeric, 5);
        assert_eq!(COLUMNS[0], Column::Channel);
        assert_eq!(COLUMNS[5], Column::Power);
    }
}
