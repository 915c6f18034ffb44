//! Property-based tests for configuration validation using proptest.

use proptest::prelude::*;

use jigsaw_core::config::{LabelSpec, PipelineConfig, SplitKind, SplitterConfig, TripletConfig};

fn split_kind() -> impl Strategy<Value = SplitKind> {
    prop_oneof![
        Just(SplitKind::Kfold),
        Just(SplitKind::Skfold),
        Just(SplitKind::Mlskfold),
    ]
}

// --- Splitter validation properties ---

proptest! {
    #[test]
    fn splitter_with_two_or_more_splits_is_valid(
        kind in split_kind(),
        n_splits in 2usize..50,
    ) {
        let config = PipelineConfig {
            splitter: Some(SplitterConfig { kind, n_splits, labels: None }),
            ..Default::default()
        };
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn splitter_below_two_splits_is_rejected(kind in split_kind(), n_splits in 0usize..2) {
        let config = PipelineConfig {
            splitter: Some(SplitterConfig { kind, n_splits, labels: None }),
            ..Default::default()
        };
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn valid_fold_must_be_below_n_splits(n_splits in 2usize..20, fold in 0usize..40) {
        let config = PipelineConfig {
            splitter: Some(SplitterConfig { kind: SplitKind::Skfold, n_splits, labels: None }),
            valid_fold: Some(fold),
            ..Default::default()
        };
        prop_assert_eq!(config.validate().is_ok(), fold < n_splits);
    }
}

// --- Triplet validation properties ---

proptest! {
    #[test]
    fn triplet_counts_must_be_positive(n_negatives in 0usize..10, n_samples in 0usize..10) {
        let config = PipelineConfig {
            triplet: Some(TripletConfig {
                anchor_column: "rule".into(),
                sample_column: "body".into(),
                n_negatives,
                n_samples,
                reversed: false,
            }),
            ..Default::default()
        };
        prop_assert_eq!(config.validate().is_ok(), n_negatives > 0 && n_samples > 0);
    }

    #[test]
    fn labels_roundtrip_through_toml(cols in prop::collection::vec("[a-z]{1,8}", 1..5)) {
        let splitter = SplitterConfig {
            kind: SplitKind::Mlskfold,
            n_splits: 5,
            labels: Some(LabelSpec::Multi(cols)),
        };
        let text = toml::to_string(&splitter).unwrap();
        let back: SplitterConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(back, splitter);
    }
}
