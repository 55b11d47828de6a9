//! Spreadsheet renderings of reports and the inventory ledger.
//!
//! Every export is built as one or more [`Sheet`]s and then written either as
//! CSV or as an XLSX workbook. CSV output starts with a UTF-8 byte order mark
//! so spreadsheet tools pick the right encoding for Hebrew product names.

use crate::entities::{inventory_item, inventory_transaction};
use crate::errors::ServiceError;
use crate::services::reports::ReportDetail;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_xlsxwriter::{Format, Workbook};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use utoipa::{IntoParams, ToSchema};

const BOM: &[u8] = b"\xEF\xBB\xBF";
const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

pub const REPORT_HEADERS: [&str; 11] = [
    "ID",
    "User",
    "Type",
    "Customer",
    "Project",
    "Installation types",
    "Address",
    "Status",
    "Date",
    "Products",
    "Notes",
];

const INVENTORY_HEADERS: [&str; 4] = ["Product", "Quantity (unit)", "Quantity (meter)", "Updated"];

const TRANSACTION_HEADERS: [&str; 8] = [
    "Product",
    "Change type",
    "Quantity",
    "Unit",
    "Report",
    "User",
    "Notes",
    "Date",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// `?format=csv|xlsx`, CSV when absent
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FormatQuery {
    pub format: Option<ExportFormat>,
}

impl FormatQuery {
    pub fn format(self) -> ExportFormat {
        self.format.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Number(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(f64::from(value))
    }
}

/// A named table: one CSV file or one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

fn naive_date(value: &NaiveDateTime) -> String {
    value.format(DATE_FORMAT).to_string()
}

fn utc_date(value: &DateTime<Utc>) -> String {
    value.format(DATE_FORMAT).to_string()
}

fn optional_id(value: Option<i32>) -> Cell {
    value.map(Cell::from).unwrap_or_else(|| Cell::Text(String::new()))
}

/// "name (qty unit)" per line, joined by ", "
pub fn products_cell(report: &ReportDetail) -> String {
    report
        .products
        .iter()
        .map(|line| format!("{} ({} {})", line.product_name, line.quantity, line.quantity_unit))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn reports_sheet(reports: &[ReportDetail]) -> Sheet {
    let rows = reports
        .iter()
        .map(|report| -> Vec<Cell> {
            vec![
                report.id.into(),
                report.user_name.clone().into(),
                report.report_type.to_string().into(),
                report.customer_name.clone().into(),
                report.company_project.clone().unwrap_or_default().into(),
                report.installation_types.join(", ").into(),
                report.address.clone().into(),
                report.status.to_string().into(),
                naive_date(&report.timestamp).into(),
                products_cell(report).into(),
                report.notes.clone().unwrap_or_default().into(),
            ]
        })
        .collect();
    Sheet {
        name: "Reports",
        headers: &REPORT_HEADERS,
        rows,
    }
}

pub fn inventory_sheet(items: &[inventory_item::Model]) -> Sheet {
    let rows = items
        .iter()
        .map(|item| -> Vec<Cell> {
            vec![
                item.product_name.clone().into(),
                item.quantity_unit.into(),
                item.quantity_meter.into(),
                utc_date(&item.updated_at).into(),
            ]
        })
        .collect();
    Sheet {
        name: "Inventory",
        headers: &INVENTORY_HEADERS,
        rows,
    }
}

/// `user_names` maps user ids to display names; unknown ids print the raw id.
pub fn transactions_sheet(
    transactions: &[inventory_transaction::Model],
    user_names: &HashMap<i32, String>,
) -> Sheet {
    let rows = transactions
        .iter()
        .map(|tx| -> Vec<Cell> {
            let user = tx
                .user_id
                .map(|id| user_names.get(&id).cloned().unwrap_or_else(|| id.to_string()))
                .unwrap_or_default();
            vec![
                tx.product_name.clone().into(),
                tx.change_type.to_string().into(),
                tx.quantity.into(),
                tx.unit.to_string().into(),
                optional_id(tx.report_id),
                user.into(),
                tx.notes.clone().unwrap_or_default().into(),
                utc_date(&tx.created_at).into(),
            ]
        })
        .collect();
    Sheet {
        name: "Inventory transactions",
        headers: &TRANSACTION_HEADERS,
        rows,
    }
}

pub fn to_csv(sheet: &Sheet) -> Result<Vec<u8>, ServiceError> {
    let mut out = csv::WriterBuilder::new().from_writer(BOM.to_vec());
    out.write_record(sheet.headers)?;
    for row in &sheet.rows {
        out.write_record(row.iter().map(Cell::to_string))?;
    }
    out.into_inner()
        .map_err(|e| ServiceError::ExportError(e.to_string()))
}

/// One worksheet per sheet, with a bold header row.
pub fn to_xlsx(sheets: &[Sheet]) -> Result<Vec<u8>, ServiceError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;
        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
        }
        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let row_num = row_idx as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(text) => worksheet.write_string(row_num, col as u16, text)?,
                    Cell::Number(value) => worksheet.write_number(row_num, col as u16, *value)?,
                };
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Renders the sheets in the requested format. CSV carries only the first sheet.
pub fn render(format: ExportFormat, sheets: &[Sheet]) -> Result<Vec<u8>, ServiceError> {
    match format {
        ExportFormat::Csv => sheets
            .first()
            .map(to_csv)
            .unwrap_or_else(|| Ok(BOM.to_vec())),
        ExportFormat::Xlsx => to_xlsx(sheets),
    }
}

/// File name for a download, stamped with the current time.
pub fn attachment_name(prefix: &str, format: ExportFormat) -> String {
    format!(
        "{prefix}_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        report_product,
        sea_orm_active_enums::{ChangeType, QuantityUnit, ReportStatus, ReportType},
    };
    use chrono::NaiveDate;

    fn rows(bytes: &[u8]) -> Vec<Vec<String>> {
        assert!(bytes.starts_with(BOM));
        csv::Reader::from_reader(&bytes[BOM.len()..])
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn sample_report() -> ReportDetail {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap();
        ReportDetail {
            id: 12,
            user_id: 3,
            user_name: "Noa Levi".into(),
            report_type: ReportType::Installation,
            customer_name: "Acme, Ltd".into(),
            company_project: None,
            installation_type: Some("Floor, Walls".into()),
            installation_types: vec!["Floor".into(), "Walls".into()],
            protections_count: Some(4),
            address: "1 Main St".into(),
            status: ReportStatus::Completed,
            timestamp,
            notes: None,
            synced: false,
            products: vec![
                report_product::Model {
                    id: 1,
                    report_id: 12,
                    product_name: "Tape".into(),
                    quantity: 3.0,
                    quantity_unit: QuantityUnit::Unit,
                },
                report_product::Model {
                    id: 2,
                    report_id: 12,
                    product_name: "Roll".into(),
                    quantity: 12.5,
                    quantity_unit: QuantityUnit::Meter,
                },
            ],
            images: vec![],
            documents: vec![],
        }
    }

    fn sample_transaction() -> inventory_transaction::Model {
        inventory_transaction::Model {
            id: 1,
            product_name: "Tape".into(),
            change_type: ChangeType::ReportEdit,
            quantity: -2.0,
            unit: QuantityUnit::Unit,
            report_id: Some(12),
            user_id: Some(3),
            notes: Some("Update Report #12".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn report_rows_carry_products_and_formatted_date() {
        let bytes = to_csv(&reports_sheet(&[sample_report()])).unwrap();
        let rows = rows(&bytes);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row[0], "12");
        assert_eq!(row[2], "installation");
        assert_eq!(row[3], "Acme, Ltd");
        assert_eq!(row[5], "Floor, Walls");
        assert_eq!(row[8], "05/03/2024 14:30");
        assert_eq!(row[9], "Tape (3 unit), Roll (12.5 meter)");
    }

    #[test]
    fn transaction_rows_resolve_user_names() {
        let names = HashMap::from([(3, "Noa Levi".to_string())]);
        let rows = rows(&to_csv(&transactions_sheet(&[sample_transaction()], &names)).unwrap());
        assert_eq!(rows[0][1], "report_edit");
        assert_eq!(rows[0][2], "-2");
        assert_eq!(rows[0][4], "12");
        assert_eq!(rows[0][5], "Noa Levi");
    }

    #[test]
    fn numbers_stay_numeric_in_sheets() {
        let sheet = transactions_sheet(&[sample_transaction()], &HashMap::new());
        assert_eq!(sheet.rows[0][2], Cell::Number(-2.0));
        assert_eq!(sheet.rows[0][4], Cell::Number(12.0));
        assert_eq!(sheet.rows[0][5], Cell::Text("3".into()));
    }

    #[test]
    fn workbooks_are_zip_containers() {
        let sheets = [
            inventory_sheet(&[]),
            transactions_sheet(&[sample_transaction()], &HashMap::new()),
        ];
        let bytes = render(ExportFormat::Xlsx, &sheets).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn csv_render_uses_the_first_sheet() {
        let sheets = [reports_sheet(&[sample_report()]), inventory_sheet(&[])];
        let rows = rows(&render(ExportFormat::Csv, &sheets).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "12");
    }

    #[test]
    fn attachment_names_follow_the_format() {
        let name = attachment_name("reports", ExportFormat::Csv);
        assert!(name.starts_with("reports_"));
        assert!(name.ends_with(".csv"));
        assert!(attachment_name("inventory", ExportFormat::Xlsx).ends_with(".xlsx"));
    }
}
