//! Pretrained shot scorers (xG, xA) and their feature manifests

pub mod dense;
pub mod manifest;
pub mod scorer;

pub use dense::{Activation, DenseLayer, DenseNetwork};
pub use manifest::{Calibration, CategoricalEncoder, FeatureKind, FeatureManifest, FeatureSpec, FeatureVectorBuilder, FillPolicy};
pub use scorer::{ScoringModel, ShotScorer};
