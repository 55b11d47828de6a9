//! Normalisation and validation of submitted reports.
//!
//! Browsers post forms where every value is text, while the offline queue
//! replays JSON that may carry numbers, lists, or JSON-encoded strings. Both
//! end up in [`ReportSubmission`] and leave as a [`ValidReport`].

use crate::entities::sea_orm_active_enums::{QuantityUnit, ReportStatus, ReportType};
use crate::errors::ServiceError;
use crate::services::ledger::LineItem;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use utoipa::ToSchema;

const MAX_NAME_LEN: usize = 200;
const MAX_ADDRESS_LEN: usize = 300;

/// A value clients send either as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProductLineInput {
    #[serde(alias = "product_name")]
    pub name: Option<String>,
    pub quantity: Option<NumberOrText>,
    pub unit: Option<String>,
}

/// Report fields as received, before any validation
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReportSubmission {
    pub report_type: Option<String>,
    pub customer_name: Option<String>,
    pub company_project: Option<String>,
    pub address: Option<String>,
    pub status: Option<String>,
    /// Local wall-clock time of the job, e.g. `2024-05-01T08:30`
    pub report_datetime: Option<String>,
    /// Older offline clients send the job time here
    pub timestamp: Option<String>,
    pub notes: Option<String>,
    /// List of labels, or the same list JSON-encoded as a string
    #[schema(value_type = Object)]
    pub installation_types: Option<Value>,
    /// Single label sent by older clients
    pub installation_type: Option<String>,
    pub protections_count: Option<NumberOrText>,
    #[serde(default)]
    pub products: Vec<ProductLineInput>,
}

/// Where a submission came from. Offline replays tolerate a missing job time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrigin {
    Online,
    OfflineSync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub report_type: ReportType,
    pub customer_name: String,
    pub company_project: Option<String>,
    pub address: String,
    pub status: ReportStatus,
    pub timestamp: NaiveDateTime,
    pub notes: Option<String>,
    pub installation_types: Vec<String>,
    pub protections_count: Option<i32>,
    pub lines: Vec<LineItem>,
}

impl ValidReport {
    /// Labels joined for display, `None` for delivery reports
    pub fn installation_display(&self) -> Option<String> {
        (!self.installation_types.is_empty()).then(|| self.installation_types.join(", "))
    }

    /// Labels as stored in the list column
    pub fn installation_types_json(&self) -> Option<String> {
        if self.installation_types.is_empty() {
            return None;
        }
        serde_json::to_string(&self.installation_types).ok()
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::ValidationError(format!("{field} is required")))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_len(value: &str, field: &str, max: usize) -> Result<(), ServiceError> {
    if value.chars().count() > max {
        return Err(ServiceError::ValidationError(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Accepts `datetime-local` values with or without seconds, a space separator,
/// or a full RFC 3339 timestamp (its local part is kept).
pub fn parse_report_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_installation_types(raw: Option<Value>, legacy: Option<String>) -> Vec<String> {
    let decoded = match raw {
        Some(Value::String(text)) => serde_json::from_str::<Value>(&text).unwrap_or(Value::Null),
        Some(other) => other,
        None => Value::Null,
    };

    let labels: Vec<String> = match decoded {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|value| match value {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null | Value::Bool(false) => None,
                other => Some(other.to_string()),
            })
            .filter(|label| !label.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    if labels.is_empty() {
        optional(legacy).into_iter().collect()
    } else {
        labels
    }
}

fn parse_protections(raw: Option<NumberOrText>) -> Option<i32> {
    match raw? {
        NumberOrText::Number(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => Some(n as i32),
        NumberOrText::Number(_) => None,
        NumberOrText::Text(text) => text.trim().parse().ok(),
    }
}

fn parse_quantity(raw: Option<NumberOrText>, product: &str) -> Result<Option<f64>, ServiceError> {
    let value = match raw {
        None => return Ok(None),
        Some(NumberOrText::Number(n)) => n,
        Some(NumberOrText::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>().map_err(|_| {
                ServiceError::ValidationError(format!("Quantity for {product} is not a number"))
            })?
        }
    };
    if !value.is_finite() {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for {product} is not a number"
        )));
    }
    Ok((value != 0.0).then_some(value))
}

/// Keeps lines with a name and a non-zero quantity. Unknown units become `unit`.
pub fn parse_lines(products: Vec<ProductLineInput>) -> Result<Vec<LineItem>, ServiceError> {
    let mut lines = Vec::new();
    for product in products {
        let Some(name) = optional(product.name) else {
            continue;
        };
        check_len(&name, "Product name", MAX_NAME_LEN)?;
        let Some(quantity) = parse_quantity(product.quantity, &name)? else {
            continue;
        };
        lines.push(LineItem {
            product_name: name,
            quantity,
            unit: QuantityUnit::coerce(product.unit.as_deref()),
        });
    }
    Ok(lines)
}

impl ReportSubmission {
    pub fn validate(self, origin: ReportOrigin) -> Result<ValidReport, ServiceError> {
        let report_type = required(self.report_type, "report_type")?;
        let report_type = ReportType::from_str(&report_type)
            .map_err(|_| ServiceError::ValidationError(format!("Unknown report_type {report_type}")))?;
        let status = required(self.status, "status")?;
        let status = ReportStatus::from_str(&status)
            .map_err(|_| ServiceError::ValidationError(format!("Unknown status {status}")))?;

        let customer_name = required(self.customer_name, "customer_name")?;
        check_len(&customer_name, "customer_name", MAX_NAME_LEN)?;
        let address = required(self.address, "address")?;
        check_len(&address, "address", MAX_ADDRESS_LEN)?;
        let company_project = optional(self.company_project);
        if let Some(project) = &company_project {
            check_len(project, "company_project", MAX_NAME_LEN)?;
        }

        let timestamp = match origin {
            ReportOrigin::Online => {
                let raw = optional(self.report_datetime)
                    .ok_or_else(|| ServiceError::ValidationError("report_datetime is required".into()))?;
                parse_report_datetime(&raw).ok_or_else(|| {
                    ServiceError::ValidationError(format!("Invalid report_datetime {raw}"))
                })?
            }
            ReportOrigin::OfflineSync => self
                .report_datetime
                .as_deref()
                .and_then(parse_report_datetime)
                .or_else(|| self.timestamp.as_deref().and_then(parse_report_datetime))
                .unwrap_or_else(|| Utc::now().naive_utc()),
        };

        let (installation_types, protections_count) = match report_type {
            ReportType::Installation => {
                let types = parse_installation_types(self.installation_types, self.installation_type);
                if types.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "At least one installation type is required".into(),
                    ));
                }
                (types, parse_protections(self.protections_count))
            }
            ReportType::Delivery => (Vec::new(), None),
        };

        let lines = parse_lines(self.products)?;
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one product with a quantity is required".into(),
            ));
        }

        Ok(ValidReport {
            report_type,
            customer_name,
            company_project,
            address,
            status,
            timestamp,
            notes: optional(self.notes),
            installation_types,
            protections_count,
            lines,
        })
    }
}
