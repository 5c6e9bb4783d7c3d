//! Roll transactions up into one profile per customer

use crate::error::{JoinTable, Warning};
use crate::records::{CustomerProfile, Tables};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Running totals for one customer while scanning transactions
#[derive(Default)]
struct Accumulator {
    quantity: u64,
    value: CompensatedSum,
    categories: BTreeMap<String, usize>,
}

/// Neumaier summation, keeps long sums of currency values exact to the cent
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub(crate) fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub(crate) fn total(self) -> f64 {
        self.sum + self.compensation
    }
}

/// Aggregate transactions into customer profiles.
///
/// Transactions whose product is unknown are skipped, and customers with no
/// master record are dropped. Each case yields one `MissingJoinKey` warning
/// carrying the number of dropped rows. Profiles come back sorted by id.
pub fn aggregate_profiles(tables: &Tables) -> (Vec<CustomerProfile>, Vec<Warning>) {
    let categories: HashMap<&str, &str> = tables
        .products
        .iter()
        .map(|p| (p.product_id.as_str(), p.category.as_str()))
        .collect();
    let regions: HashMap<&str, &str> = tables
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.region.as_str()))
        .collect();

    let mut accumulators: BTreeMap<&str, Accumulator> = BTreeMap::new();
    let mut unknown_products = 0usize;

    for tx in &tables.transactions {
        let Some(&category) = categories.get(tx.product_id.as_str()) else {
            unknown_products += 1;
            continue;
        };

        let acc = accumulators.entry(tx.customer_id.as_str()).or_default();
        acc.quantity += u64::from(tx.quantity);
        acc.value.add(tx.total_value);
        *acc.categories.entry(category.to_string()).or_insert(0) += 1;
    }

    let mut warnings = Vec::new();
    if unknown_products > 0 {
        warnings.push(
            Warning::MissingJoinKey {
                table: JoinTable::Products,
                dropped: unknown_products,
            }
            .emit(),
        );
    }

    let mut unknown_customers = 0usize;
    let mut profiles = Vec::with_capacity(accumulators.len());
    for (customer_id, acc) in accumulators {
        let Some(&region) = regions.get(customer_id) else {
            unknown_customers += 1;
            continue;
        };
        profiles.push(CustomerProfile {
            customer_id: customer_id.to_string(),
            region: region.to_string(),
            total_quantity: acc.quantity,
            total_value: acc.value.total(),
            categories: acc.categories,
        });
    }

    if unknown_customers > 0 {
        warnings.push(
            Warning::MissingJoinKey {
                table: JoinTable::Customers,
                dropped: unknown_customers,
            }
            .emit(),
        );
    }

    info!(
        "Aggregated {} transactions into {} customer profiles",
        tables.transactions.len() - unknown_products,
        profiles.len()
    );

    (profiles, warnings)
}
