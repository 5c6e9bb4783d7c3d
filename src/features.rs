//! Feature encoding: numeric standardization plus categorical indicators
//!
//! The encoder is fitted once over the full profile set and then used as an
//! immutable value by every consumer, so all vectors of a run share the same
//! dimension layout.

use crate::error::{Error, Result, Warning};
use crate::records::CustomerProfile;
use clap::ValueEnum;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Numeric profile columns. Variant order is the column-name order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
pub enum NumericFeature {
    /// Total units purchased
    Quantity,
    /// Total amount spent
    TotalValue,
}

impl NumericFeature {
    pub fn name(self) -> &'static str {
        match self {
            NumericFeature::Quantity => "Quantity",
            NumericFeature::TotalValue => "TotalValue",
        }
    }

    fn value(self, profile: &CustomerProfile) -> f64 {
        match self {
            NumericFeature::Quantity => profile.total_quantity as f64,
            NumericFeature::TotalValue => profile.total_value,
        }
    }
}

/// Categorical profile columns. Variant order is the column-name order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
pub enum CategoricalFeature {
    /// Purchased product categories (set-valued)
    Category,
    /// Customer region (single-valued)
    Region,
}

impl CategoricalFeature {
    pub fn name(self) -> &'static str {
        match self {
            CategoricalFeature::Category => "Category",
            CategoricalFeature::Region => "Region",
        }
    }

    /// Values a profile is a member of, duplicates collapsed
    fn values(self, profile: &CustomerProfile) -> Vec<&str> {
        match self {
            CategoricalFeature::Category => profile.categories.keys().map(String::as_str).collect(),
            CategoricalFeature::Region => vec![profile.region.as_str()],
        }
    }
}

impl fmt::Display for NumericFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for CategoricalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A selection of feature columns. Sets keep the canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    pub numeric: BTreeSet<NumericFeature>,
    pub categorical: BTreeSet<CategoricalFeature>,
}

impl FeatureSet {
    pub fn new(
        numeric: impl IntoIterator<Item = NumericFeature>,
        categorical: impl IntoIterator<Item = CategoricalFeature>,
    ) -> Self {
        Self {
            numeric: numeric.into_iter().collect(),
            categorical: categorical.into_iter().collect(),
        }
    }

    /// Quantity, TotalValue, Category and Region
    pub fn all() -> Self {
        Self::new(
            [NumericFeature::Quantity, NumericFeature::TotalValue],
            [CategoricalFeature::Category, CategoricalFeature::Region],
        )
    }

    /// Quantity and TotalValue only
    pub fn numeric_only() -> Self {
        Self::new([NumericFeature::Quantity, NumericFeature::TotalValue], [])
    }

    pub fn is_empty(&self) -> bool {
        self.numeric.is_empty() && self.categorical.is_empty()
    }

    pub fn union(&self, other: &FeatureSet) -> FeatureSet {
        FeatureSet {
            numeric: self.numeric.union(&other.numeric).copied().collect(),
            categorical: self.categorical.union(&other.categorical).copied().collect(),
        }
    }
}

/// Fitted standardization parameters for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericScaler {
    pub feature: NumericFeature,
    pub mean: f64,
    pub std_dev: f64,
}

impl NumericScaler {
    fn scale(&self, x: f64) -> f64 {
        (x - self.mean) / self.std_dev
    }
}

/// What a single dimension of an encoded vector stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Dimension {
    Numeric(NumericFeature),
    Indicator {
        feature: CategoricalFeature,
        value: String,
    },
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Numeric(feature) => write!(f, "{feature}"),
            Dimension::Indicator { feature, value } => write!(f, "{feature}={value}"),
        }
    }
}

/// Fitted preprocessor: numeric scalers and the categorical vocabulary
#[derive(Debug, Clone, Serialize)]
pub struct FeatureEncoder {
    scalers: Vec<NumericScaler>,
    /// Sorted observed values per categorical feature
    vocabulary: BTreeMap<CategoricalFeature, Vec<String>>,
    dimensions: Vec<Dimension>,
}

impl FeatureEncoder {
    /// Fit scalers and vocabulary over the full profile set.
    ///
    /// Zero-variance numeric columns get a standard deviation of 1 and a
    /// `DegenerateFeature` warning.
    pub fn fit(profiles: &[CustomerProfile], features: &FeatureSet) -> Result<(Self, Vec<Warning>)> {
        if profiles.is_empty() {
            return Err(Error::InsufficientData {
                required: 1,
                found: 0,
            });
        }
        if features.is_empty() {
            return Err(Error::InvalidConfig("no feature columns selected".to_string()));
        }

        let mut warnings = Vec::new();
        let n = profiles.len() as f64;

        let mut scalers = Vec::with_capacity(features.numeric.len());
        for &feature in &features.numeric {
            let mean = profiles.iter().map(|p| feature.value(p)).sum::<f64>() / n;
            let variance = profiles
                .iter()
                .map(|p| (feature.value(p) - mean).powi(2))
                .sum::<f64>()
                / n;
            let mut std_dev = variance.sqrt();
            if std_dev == 0.0 || !std_dev.is_finite() {
                warnings.push(
                    Warning::DegenerateFeature {
                        feature: feature.name().to_string(),
                    }
                    .emit(),
                );
                std_dev = 1.0;
            }
            debug!("Scaler for {}: mean={:.4}, std={:.4}", feature, mean, std_dev);
            scalers.push(NumericScaler {
                feature,
                mean,
                std_dev,
            });
        }

        let mut vocabulary = BTreeMap::new();
        for &feature in &features.categorical {
            let values: BTreeSet<&str> = profiles.iter().flat_map(|p| feature.values(p)).collect();
            vocabulary.insert(
                feature,
                values.into_iter().map(str::to_string).collect::<Vec<_>>(),
            );
        }

        let mut dimensions: Vec<Dimension> =
            scalers.iter().map(|s| Dimension::Numeric(s.feature)).collect();
        for (&feature, values) in &vocabulary {
            dimensions.extend(values.iter().map(|value| Dimension::Indicator {
                feature,
                value: value.clone(),
            }));
        }

        info!(
            "Fitted encoder: {} numeric + {} indicator dimensions",
            scalers.len(),
            dimensions.len() - scalers.len()
        );

        Ok((
            Self {
                scalers,
                vocabulary,
                dimensions,
            },
            warnings,
        ))
    }

    /// Total dimensionality D of every encoded vector
    pub fn dimension(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }


    /// Encode one profile. Categorical values outside the vocabulary are ignored.
    pub fn encode(&self, profile: &CustomerProfile) -> Array1<f64> {
        let mut vector = Array1::zeros(self.dimension());
        for (i, scaler) in self.scalers.iter().enumerate() {
            vector[i] = scaler.scale(scaler.feature.value(profile));
        }

        let mut offset = self.scalers.len();
        for (&feature, values) in &self.vocabulary {
            for value in feature.values(profile) {
                if let Ok(pos) = values.binary_search_by(|v| v.as_str().cmp(value)) {
                    vector[offset + pos] = 1.0;
                }
            }
            offset += values.len();
        }
        vector
    }

    /// Encode every profile into one row-per-customer matrix
    pub fn transform(&self, profiles: &[CustomerProfile]) -> EncodedFeatures {
        let mut matrix = Array2::zeros((profiles.len(), self.dimension()));
        for (mut row, profile) in matrix.axis_iter_mut(Axis(0)).zip(profiles) {
            row.assign(&self.encode(profile));
        }

        EncodedFeatures {
            customer_ids: profiles.iter().map(|p| p.customer_id.clone()).collect(),
            matrix,
            dimensions: self.dimensions.clone(),
        }
    }
}

/// Encoded vectors for a run, rows aligned with `customer_ids`
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatures {
    pub customer_ids: Vec<String>,
    pub matrix: Array2<f64>,
    pub dimensions: Vec<Dimension>,
}

impl EncodedFeatures {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    /// Row index of a customer
    pub fn position(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids.iter().position(|id| id == customer_id)
    }

    /// Project onto a subset of the fitted columns.
    ///
    /// The values are the ones the shared encoder produced, so a numeric-only
    /// view is scaled with the same mean and deviation as the full one.
    pub fn select(&self, features: &FeatureSet) -> Result<EncodedFeatures> {
        let keep: Vec<usize> = self
            .dimensions
            .iter()
            .enumerate()
            .filter(|(_, dim)| match dim {
                Dimension::Numeric(f) => features.numeric.contains(f),
                Dimension::Indicator { feature, .. } => features.categorical.contains(feature),
            })
            .map(|(i, _)| i)
            .collect();

        if keep.is_empty() {
            return Err(Error::InvalidConfig(
                "selected feature columns are not part of the fitted encoding".to_string(),
            ));
        }

        Ok(EncodedFeatures {
            customer_ids: self.customer_ids.clone(),
            matrix: self.matrix.select(Axis(1), &keep),
            dimensions: keep.iter().map(|&i| self.dimensions[i].clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile(id: &str, region: &str, qty: u64, value: f64, cats: &[&str]) -> CustomerProfile {
        CustomerProfile {
            customer_id: id.to_string(),
            region: region.to_string(),
            total_quantity: qty,
            total_value: value,
            categories: cats.iter().map(|c| (c.to_string(), 1)).collect(),
        }
    }

    fn sample_profiles() -> Vec<CustomerProfile> {
        vec![
            profile("C1", "Europe", 10, 100.0, &["Books", "Toys"]),
            profile("C2", "Asia", 4, 40.0, &["Books"]),
            profile("C3", "Europe", 1, 5.0, &["Electronics"]),
        ]
    }

    #[test]
    fn test_dimension_order_is_stable() {
        let (encoder, warnings) = FeatureEncoder::fit(&sample_profiles(), &FeatureSet::all()).unwrap();
        assert!(warnings.is_empty());

        let labels: Vec<String> = encoder.dimensions().iter().map(|d| d.to_string()).collect();
        assert_eq!(
            labels,
            vec![
                "Quantity",
                "TotalValue",
                "Category=Books",
                "Category=Electronics",
                "Category=Toys",
                "Region=Asia",
                "Region=Europe",
            ]
        );
        assert_eq!(encoder.dimension(), 7);
    }

    #[test]
    fn test_standardized_columns_have_zero_mean_unit_variance() {
        let profiles = sample_profiles();
        let (encoder, _) = FeatureEncoder::fit(&profiles, &FeatureSet::numeric_only()).unwrap();
        let encoded = encoder.transform(&profiles);

        for column in encoded.matrix.axis_iter(Axis(1)) {
            let mean = column.mean().unwrap();
            let var = column.mapv(|x| (x - mean).powi(2)).mean().unwrap();
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_indicators_mark_membership() {
        let profiles = sample_profiles();
        let (encoder, _) = FeatureEncoder::fit(&profiles, &FeatureSet::all()).unwrap();
        let v = encoder.encode(&profiles[0]);

        assert_eq!(v.slice(ndarray::s![2..]).to_vec(), vec![1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_zero_variance_column_is_not_scaled() {
        let profiles = vec![
            profile("C1", "Asia", 5, 10.0, &["Books"]),
            profile("C2", "Asia", 5, 20.0, &["Books"]),
        ];
        let (encoder, warnings) = FeatureEncoder::fit(&profiles, &FeatureSet::numeric_only()).unwrap();

        assert_eq!(
            warnings,
            vec![Warning::DegenerateFeature {
                feature: "Quantity".to_string()
            }]
        );
        let encoded = encoder.transform(&profiles);
        assert!(encoded.matrix.iter().all(|x| x.is_finite()));
        assert_eq!(encoded.matrix[[0, 0]], 0.0);
    }

    #[test]
    fn test_unknown_category_is_ignored() {
        let (encoder, _) = FeatureEncoder::fit(&sample_profiles(), &FeatureSet::all()).unwrap();
        let newcomer = profile("C9", "Mars", 4, 40.0, &["Garden"]);
        let v = encoder.encode(&newcomer);

        assert_eq!(v.len(), encoder.dimension());
        assert_eq!(v.slice(ndarray::s![2..]).sum(), 0.0);
    }

    #[test]
    fn test_select_keeps_shared_scaling() {
        let profiles = sample_profiles();
        let (encoder, _) = FeatureEncoder::fit(&profiles, &FeatureSet::all()).unwrap();
        let full = encoder.transform(&profiles);
        let numeric = full.select(&FeatureSet::numeric_only()).unwrap();

        assert_eq!(numeric.matrix.ncols(), 2);
        assert_eq!(numeric.matrix.column(1), full.matrix.column(1));
        assert_eq!(numeric.customer_ids, full.customer_ids);
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let result = FeatureEncoder::fit(&[], &FeatureSet::all());
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }

    proptest! {
        #[test]
        fn prop_encoding_is_idempotent(
            qty in 0u64..1000,
            value in 0.0f64..10_000.0,
            region in prop::sample::select(vec!["Asia", "Europe", "Mars"]),
        ) {
            let (encoder, _) = FeatureEncoder::fit(&sample_profiles(), &FeatureSet::all()).unwrap();
            let p = profile("CX", region, qty, value, &["Books"]);
            let first = encoder.encode(&p);
            let second = encoder.encode(&p);
            prop_assert_eq!(first.len(), encoder.dimension());
            prop_assert_eq!(first, second);
        }
    }
}
