//! Source records and the per-customer profile derived from them

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Customer master record
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub region: String,
    pub signup_date: NaiveDate,
}

/// Product master record
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
}

/// A single purchase line
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub transaction_date: NaiveDateTime,
    pub quantity: u32,
    pub total_value: f64,
}

/// The three cleaned input tables of one run
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub customers: Vec<Customer>,
    pub products: Vec<Product>,
    pub transactions: Vec<Transaction>,
}

/// Behavioural summary of one customer.
///
/// `categories` is a bag: each purchased category with the number of
/// transactions that fell into it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub region: String,
    pub total_quantity: u64,
    pub total_value: f64,
    pub categories: BTreeMap<String, usize>,
}

impl CustomerProfile {
    /// Number of transactions that contributed to this profile
    pub fn transaction_count(&self) -> usize {
        self.categories.values().sum()
    }
}
