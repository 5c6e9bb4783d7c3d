//! CSV ingestion of the customer, product and transaction tables using Polars
//!
//! Rows with missing fields, duplicate keys or non-positive amounts are
//! dropped here, so the core only ever sees clean records.

use crate::error::{Error, Result};
use crate::records::{Customer, Product, Tables, Transaction};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Read a headered CSV file into a DataFrame
fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Read {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Clean frame plus what was removed on the way
struct Cleaned {
    frame: DataFrame,
    rejected: usize,
    duplicates: usize,
}

/// Drop rows missing any `required` column or failing `valid`, then keep the
/// first row per `key`
fn clean_frame(df: DataFrame, required: &[&str], valid: Option<Expr>, key: &str) -> Result<Cleaned> {
    let raw = df.height();

    let mut filtered = df
        .lazy()
        .drop_nulls(Some(required.iter().copied().map(col).collect()));
    if let Some(predicate) = valid {
        filtered = filtered.filter(predicate);
    }
    let filtered = filtered.collect()?;
    let kept = filtered.height();

    let frame = filtered
        .lazy()
        .unique_stable(Some(vec![key.to_string()]), UniqueKeepStrategy::First)
        .collect()?;

    Ok(Cleaned {
        rejected: raw - kept,
        duplicates: kept - frame.height(),
        frame,
    })
}

// Columns below are read after `clean_frame`, so they hold no nulls

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_no_null_iter()
        .map(|s| s.trim().to_string())
        .collect();
    Ok(values)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_no_null_iter().collect();
    Ok(values)
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_no_null_iter().collect();
    Ok(values)
}

/// Parse a date, accepting a trailing time component
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map(|dt| dt.date()))
        .map_err(|_| Error::Parse {
            column: "date".to_string(),
            value: value.to_string(),
        })
}

/// Parse a timestamp, accepting a bare date as midnight
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| Error::Parse {
            column: "datetime".to_string(),
            value: value.to_string(),
        })
}

/// Load `CustomerID,CustomerName,Region,SignupDate`
pub fn load_customers(path: &Path) -> Result<Vec<Customer>> {
    let cleaned = clean_frame(
        read_csv(path)?,
        &["CustomerID", "CustomerName", "Region", "SignupDate"],
        None,
        "CustomerID",
    )?;
    let df = &cleaned.frame;

    let ids = string_column(df, "CustomerID")?;
    let names = string_column(df, "CustomerName")?;
    let regions = string_column(df, "Region")?;
    let signups = string_column(df, "SignupDate")?;

    let customers = ids
        .into_iter()
        .zip(names)
        .zip(regions)
        .zip(signups)
        .map(|(((customer_id, name), region), signup)| {
            Ok(Customer {
                customer_id,
                name,
                region,
                signup_date: parse_date(&signup)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Loaded {} customers ({} incomplete, {} duplicate rows dropped)",
        customers.len(),
        cleaned.rejected,
        cleaned.duplicates
    );
    Ok(customers)
}

/// Load `ProductID,ProductName,Category,Price`
pub fn load_products(path: &Path) -> Result<Vec<Product>> {
    let cleaned = clean_frame(
        read_csv(path)?,
        &["ProductID", "ProductName", "Category", "Price"],
        None,
        "ProductID",
    )?;
    let df = &cleaned.frame;

    let ids = string_column(df, "ProductID")?;
    let names = string_column(df, "ProductName")?;
    let categories = string_column(df, "Category")?;
    let prices = float_column(df, "Price")?;

    let products: Vec<Product> = ids
        .into_iter()
        .zip(names)
        .zip(categories)
        .zip(prices)
        .map(|(((product_id, name), category), price)| Product {
            product_id,
            name,
            category,
            price,
        })
        .collect();

    info!(
        "Loaded {} products ({} incomplete, {} duplicate rows dropped)",
        products.len(),
        cleaned.rejected,
        cleaned.duplicates
    );
    Ok(products)
}

/// Load `TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue`
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let cleaned = clean_frame(
        read_csv(path)?,
        &[
            "TransactionID",
            "CustomerID",
            "ProductID",
            "TransactionDate",
            "Quantity",
            "TotalValue",
        ],
        // Filter out non-positive amounts and quantities that overflow u32
        Some(
            col("Quantity")
                .gt(lit(0))
                .and(col("Quantity").lt_eq(lit(u32::MAX as i64)))
                .and(col("TotalValue").gt(lit(0.0))),
        ),
        "TransactionID",
    )?;
    let df = &cleaned.frame;

    let ids = string_column(df, "TransactionID")?;
    let customers = string_column(df, "CustomerID")?;
    let products = string_column(df, "ProductID")?;
    let dates = string_column(df, "TransactionDate")?;
    let quantities = int_column(df, "Quantity")?;
    let values = float_column(df, "TotalValue")?;

    let transactions = ids
        .into_iter()
        .zip(customers)
        .zip(products)
        .zip(dates)
        .zip(quantities)
        .zip(values)
        .map(|(((((transaction_id, customer_id), product_id), date), quantity), total_value)| {
            let quantity = u32::try_from(quantity).map_err(|_| Error::Parse {
                column: "Quantity".to_string(),
                value: quantity.to_string(),
            })?;
            Ok(Transaction {
                transaction_id,
                customer_id,
                product_id,
                transaction_date: parse_datetime(&date)?,
                quantity,
                total_value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Loaded {} transactions ({} rejected, {} duplicate rows dropped)",
        transactions.len(),
        cleaned.rejected,
        cleaned.duplicates
    );
    Ok(transactions)
}

/// Load all three input tables
pub fn load_tables(customers: &Path, products: &Path, transactions: &Path) -> Result<Tables> {
    Ok(Tables {
        customers: load_customers(customers)?,
        products: load_products(products)?,
        transactions: load_transactions(transactions)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_customers_drops_incomplete_and_duplicates() {
        let file = csv(&[
            "CustomerID,CustomerName,Region,SignupDate",
            "C0001,Lawrence Carroll,South America,2022-07-10",
            "C0002,Elizabeth Lutz,Asia,2022-02-13",
            "C0002,Elizabeth Lutz,Asia,2022-02-13",
            "C0003,,Europe,2024-03-07",
        ]);

        let customers = load_customers(file.path()).unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].region, "South America");
        assert_eq!(
            customers[1].signup_date,
            NaiveDate::from_ymd_opt(2022, 2, 13).unwrap()
        );
    }

    #[test]
    fn test_load_transactions() {
        let file = csv(&[
            "TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue,Price",
            "T00001,C0199,P067,2024-08-25 12:38:23,1,300.68,300.68",
            "T00112,C0146,P067,2024-05-27 22:23:54,1,300.68,300.68",
            "T00166,C0127,P067,2024-04-25 07:38:55,0,0.0,300.68",
        ]);

        let transactions = load_transactions(file.path()).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].quantity, 1);
        assert_eq!(
            transactions[0].transaction_date,
            NaiveDate::from_ymd_opt(2024, 8, 25)
                .unwrap()
                .and_hms_opt(12, 38, 23)
                .unwrap()
        );
    }

    #[test]
    fn test_clean_frame_counts_dropped_rows() {
        let df = df!(
            "TransactionID" => [Some("T1"), Some("T2"), Some("T2"), Some("T3"), None, Some("T5")],
            "Quantity" => [Some(1i64), Some(2), Some(9), Some(0), Some(1), None],
        )
        .unwrap();

        let cleaned = clean_frame(
            df,
            &["TransactionID", "Quantity"],
            Some(col("Quantity").gt(lit(0))),
            "TransactionID",
        )
        .unwrap();

        // null id, null quantity and zero quantity
        assert_eq!(cleaned.rejected, 3);
        assert_eq!(cleaned.duplicates, 1);
        assert_eq!(string_column(&cleaned.frame, "TransactionID").unwrap(), vec!["T1", "T2"]);
        // first row wins for a duplicate key
        assert_eq!(int_column(&cleaned.frame, "Quantity").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_load_transactions_rejects_and_dedups() {
        let file = csv(&[
            "TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue,Price",
            "T00001,C0199,P067,2024-08-25 12:38:23,1,300.68,300.68",
            "T00001,C0199,P067,2024-08-26 12:38:23,4,900.00,300.68",
            "T00002,,P067,2024-05-27 22:23:54,1,300.68,300.68",
            "T00003,C0146,P067,2024-05-27 22:23:54,-2,300.68,300.68",
            "T00004,C0146,P067,2024-05-27 22:23:54,2,-5.0,300.68",
            "T00005,C0146,P067,2024-05-27 22:23:54,2,601.36,",
        ]);

        let transactions = load_transactions(file.path()).unwrap();
        let ids: Vec<&str> = transactions.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["T00001", "T00005"]);
        assert_eq!(transactions[0].quantity, 1);
    }

    #[test]
    fn test_parse_dates() {
        assert!(parse_date("2022-07-10").is_ok());
        assert!(parse_date("2022-07-10 08:00:00").is_ok());
        assert!(parse_datetime("2024-01-01").is_ok());
        assert!(matches!(parse_date("10/07/2022"), Err(Error::Parse { .. })));
    }
}
