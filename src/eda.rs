//! Descriptive summaries of the raw tables, printed before the analytic stages

use crate::profile::CompensatedSum;
use crate::records::Tables;
use chrono::Datelike;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Number of products listed by `top_products` in the summary
pub const TOP_PRODUCTS: usize = 10;

/// Calendar month bucket, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: &impl Datelike) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Sort descending by value, ties by ascending key
fn rank_desc<K: Ord, V: PartialOrd>(entries: &mut [(K, V)]) {
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

/// First entry holding the maximum value
pub fn peak<K, V: PartialOrd>(series: &[(K, V)]) -> Option<&(K, V)> {
    series.iter().fold(None, |best, entry| match best {
        Some(b) if b.1 >= entry.1 => Some(b),
        _ => Some(entry),
    })
}

/// Count customers per region, most common first (ties by region name)
pub fn region_distribution(tables: &Tables) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for customer in &tables.customers {
        *counts.entry(customer.region.as_str()).or_insert(0) += 1;
    }

    let mut distribution: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(region, count)| (region.to_string(), count))
        .collect();
    rank_desc(&mut distribution);
    distribution
}

/// Signups per calendar month, oldest first
pub fn signup_trends(tables: &Tables) -> Vec<(YearMonth, usize)> {
    let mut counts: BTreeMap<YearMonth, usize> = BTreeMap::new();
    for customer in &tables.customers {
        *counts.entry(YearMonth::of(&customer.signup_date)).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

/// Total transaction value per product category, highest first.
///
/// Transactions with an unknown product have no category and are left out.
pub fn category_sales(tables: &Tables) -> Vec<(String, f64)> {
    let categories: HashMap<&str, &str> = tables
        .products
        .iter()
        .map(|p| (p.product_id.as_str(), p.category.as_str()))
        .collect();

    let mut sums: BTreeMap<&str, CompensatedSum> = BTreeMap::new();
    for transaction in &tables.transactions {
        if let Some(category) = categories.get(transaction.product_id.as_str()) {
            sums.entry(*category).or_default().add(transaction.total_value);
        }
    }

    let mut sales: Vec<(String, f64)> = sums
        .into_iter()
        .map(|(category, sum)| (category.to_string(), sum.total()))
        .collect();
    rank_desc(&mut sales);
    sales
}

/// Units sold per product name, highest first, at most `n` entries
pub fn top_products(tables: &Tables, n: usize) -> Vec<(String, u64)> {
    let names: HashMap<&str, &str> = tables
        .products
        .iter()
        .map(|p| (p.product_id.as_str(), p.name.as_str()))
        .collect();

    let mut units: BTreeMap<&str, u64> = BTreeMap::new();
    for transaction in &tables.transactions {
        if let Some(name) = names.get(transaction.product_id.as_str()) {
            *units.entry(*name).or_insert(0) += u64::from(transaction.quantity);
        }
    }

    let mut ranked: Vec<(String, u64)> = units
        .into_iter()
        .map(|(name, quantity)| (name.to_string(), quantity))
        .collect();
    rank_desc(&mut ranked);
    ranked.truncate(n);
    ranked
}

/// Transactions per calendar month, oldest first
pub fn monthly_transactions(tables: &Tables) -> Vec<(YearMonth, usize)> {
    let mut counts: BTreeMap<YearMonth, usize> = BTreeMap::new();
    for transaction in &tables.transactions {
        *counts
            .entry(YearMonth::of(&transaction.transaction_date))
            .or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

/// All table summaries for one run
#[derive(Debug, Clone, PartialEq)]
pub struct EdaSummary {
    pub regions: Vec<(String, usize)>,
    pub signups: Vec<(YearMonth, usize)>,
    pub category_sales: Vec<(String, f64)>,
    pub top_products: Vec<(String, u64)>,
    pub monthly_transactions: Vec<(YearMonth, usize)>,
}

impl EdaSummary {
    pub fn compute(tables: &Tables) -> Self {
        Self {
            regions: region_distribution(tables),
            signups: signup_trends(tables),
            category_sales: category_sales(tables),
            top_products: top_products(tables, TOP_PRODUCTS),
            monthly_transactions: monthly_transactions(tables),
        }
    }

    /// One-line findings, in the order they are printed
    pub fn insights(&self) -> Vec<String> {
        let mut insights = Vec::new();
        if let (Some((most, most_n)), Some((least, least_n))) = (self.regions.first(), self.regions.last()) {
            insights.push(format!(
                "'{most}' has the most customers ({most_n}), '{least}' the fewest ({least_n})"
            ));
        }
        if let Some((month, count)) = peak(&self.signups) {
            insights.push(format!("Peak signup month: {month} ({count} customers)"));
        }
        if let Some((category, total)) = self.category_sales.first() {
            insights.push(format!("Top category by revenue: '{category}' ({total:.2})"));
        }
        if let Some((product, units)) = self.top_products.first() {
            insights.push(format!("Most purchased product: '{product}' ({units} units)"));
        }
        if let Some((month, count)) = peak(&self.monthly_transactions) {
            insights.push(format!("Peak transaction month: {month} ({count} transactions)"));
        }
        insights
    }
}

/// Print the table summaries to console
pub fn print_eda_summary(summary: &EdaSummary) {
    println!("\n=== Customers by Region ===");
    for (region, count) in &summary.regions {
        println!("  {:<15} {}", region, count);
    }

    println!("\n=== Signups by Month ===");
    for (month, count) in &summary.signups {
        println!("  {}  {}", month, count);
    }

    println!("\n=== Sales by Category ===");
    for (category, total) in &summary.category_sales {
        println!("  {:<15} {:>12.2}", category, total);
    }

    println!("\n=== Top {} Products by Quantity ===", TOP_PRODUCTS);
    for (name, units) in &summary.top_products {
        println!("  {:<30} {}", name, units);
    }

    println!("\n=== Transactions by Month ===");
    for (month, count) in &summary.monthly_transactions {
        println!("  {}  {}", month, count);
    }

    println!("\nKey insights:");
    for insight in summary.insights() {
        println!("  - {}", insight);
    }
}
