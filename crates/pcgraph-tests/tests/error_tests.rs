//! Failure paths: malformed data, degenerate tests and bad parameters.

mod fixtures;

use pcgraph_core::{
    learn, Dataset, DatasetKind, ErrorCategory, LearnError, LearnParams, OptionValue,
    SparseStrataPolicy,
};

#[test]
fn ragged_records_are_format_errors() {
    let err = Dataset::from_records(
        DatasetKind::Categorical,
        &["A", "B"],
        &[vec!["0", "1"], vec!["1"]],
    )
    .unwrap_err();
    assert!(matches!(err, LearnError::Format(_)), "{}", err);
}

#[test]
fn unparsable_numbers_are_format_errors() {
    let err = Dataset::from_records(
        DatasetKind::Continuous,
        &["X", "Y"],
        &[vec!["1.0", "2.0"], vec!["3.5", "n/a"]],
    )
    .unwrap_err();
    assert!(matches!(err, LearnError::Format(_)), "{}", err);
    assert_eq!(err.category(), ErrorCategory::Construction);
}

#[test]
fn too_few_rows_or_variables_are_value_errors() {
    let one_row = Dataset::from_records(DatasetKind::Categorical, &["A", "B"], &[vec!["0", "1"]]);
    assert!(matches!(one_row, Err(LearnError::Value(_))));
    let one_var = Dataset::continuous(&["X"], vec![vec![1.0, 2.0, 3.0]]);
    assert!(matches!(one_var, Err(LearnError::Value(_))));
    let dup = Dataset::continuous(&["X", "X"], vec![vec![1.0, 2.0], vec![2.0, 1.0]]);
    assert!(matches!(dup, Err(LearnError::Value(_))));
}

#[test]
fn too_many_categories_is_value_error() {
    let labels = |n: usize| (0..n).map(|i| i.to_string()).collect::<Vec<_>>();
    let err = Dataset::categorical_with_max_categories(
        &["A", "B"],
        vec![labels(3), labels(2)],
        vec![vec![0, 1, 2], vec![0, 1, 0]],
        2,
    )
    .unwrap_err();
    assert!(matches!(err, LearnError::Value(_)), "{}", err);
}

#[test]
fn collinear_gaussian_data_reports_singular_conditioning() {
    // C is exactly A + B with A and B uncorrelated: A and B separate at
    // level 0, then testing A _|_ C | B meets a singular slice.
    let base = fixtures::gaussian_collider(200, 5);
    let a = base.values(fixtures::id(&base, "A")).unwrap().to_vec();
    let b = base.values(fixtures::id(&base, "B")).unwrap().to_vec();
    let c: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
    let data = fixtures::continuous(&["A", "B", "C"], vec![a, b, c]);
    let err = learn(&data, &LearnParams::default()).unwrap_err();
    match &err {
        LearnError::SingularConditioning { x, y, conditioning, .. } => {
            assert_eq!((x.as_str(), y.as_str()), ("A", "C"));
            assert_eq!(conditioning, &vec!["B".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.category(), ErrorCategory::Test);
}

#[test]
fn sparse_strata_can_be_rejected() {
    let params = LearnParams {
        min_stratum_count: 1000,
        sparse_strata: SparseStrataPolicy::Reject,
        ..LearnParams::default()
    };
    let err = learn(&fixtures::collider(), &params).unwrap_err();
    assert!(
        matches!(err, LearnError::InsufficientSupport { stratum_size: 400, minimum: 1000, .. }),
        "{}",
        err
    );
    let skipping = LearnParams {
        min_stratum_count: 1000,
        ..LearnParams::default()
    };
    // Every stratum is skipped, so every pair looks independent.
    let (pdag, _) = learn(&fixtures::collider(), &skipping).unwrap();
    assert_eq!(pdag.edge_count(), 0);
}

#[test]
fn option_map_errors_are_typed() {
    let err = LearnParams::from_options(vec![("alpha", OptionValue::Int(1))]).unwrap_err();
    assert!(matches!(err, LearnError::Type(_)));
    let err = LearnParams::from_options(vec![("test", OptionValue::from("zf"))])
        .and_then(|p| learn(&fixtures::chain(), &p))
        .unwrap_err();
    assert!(matches!(err, LearnError::Value(_)), "{}", err);
}

#[test]
fn unknown_names_are_invalid_variables() {
    let data = fixtures::chain();
    assert!(matches!(
        data.with_variable_order(&["A", "B", "Q"]),
        Err(LearnError::InvalidVariable(_))
    ));
    assert!(matches!(
        data.with_variable_order(&["A", "B", "B"]),
        Err(LearnError::DuplicateVariable(_))
    ));
    assert!(matches!(data.with_sample_size(1), Err(LearnError::Value(_))));
}
