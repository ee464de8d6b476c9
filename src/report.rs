use csv::Writer;

use crate::balance::BalanceRow;
use crate::error::ApiError;

pub const HEADER: [&str; 6] = [
    "Name",
    "Email",
    "Mobile Number",
    "Total Spent",
    "Total Owed",
    "Net Balance",
];

pub fn balance_sheet_csv(rows: &[BalanceRow]) -> Result<Vec<u8>, ApiError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([
                row.name.clone(),
                row.email.clone(),
                row.mobile_number.clone(),
                format!("{:.2}", row.total_spent),
                format!("{:.2}", row.total_owed),
                format!("{:.2}", row.net_balance),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|err| ApiError::Internal(format!("failed to flush CSV: {err}")))
}

fn csv_error(err: csv::Error) -> ApiError {
    ApiError::Internal(format!("failed to generate CSV: {err}"))
}
