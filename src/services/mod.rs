// Inventory ledger
pub mod ledger;

// Field reports
pub mod report_input;
pub mod reports;
pub mod sync;
pub mod uploads;

// Administration
pub mod projects;
pub mod stats;
pub mod users;

// CSV downloads
pub mod export;
